//! Full local startup followed by a clean shutdown.
//!
//! Every service must come up in order, and shutdown must signal each
//! spawned child exactly once.

use devstack_common::{names, DeploymentMode};
use devstack_process_state::ServiceState;
use e2e_tests::assertions::{assert_port_listening, assert_running, assert_terminated_once};
use e2e_tests::{finish, init_test_logging, print_banner, TestEnvironment};

const TESTEXE: &str = env!("CARGO_BIN_EXE_testexe");

#[tokio::test]
async fn test_startup_order() {
    init_test_logging();
    print_banner("Startup Order");

    let mut env = TestEnvironment::new(TESTEXE, "startup-order").await;
    env.config.mode = DeploymentMode::local();
    let mut orch = env.orchestrator(&[]);

    let result: Result<(), String> = async {
        println!("Step 1: Running startup...");
        orch.run_startup().await.map_err(|e| e.to_string())?;
        println!("✓ Startup finished\n");

        println!("Step 2: Checking every service is running...");
        let expected = [
            names::CACHE,
            names::WORKER,
            names::WORKER_MONITOR,
            names::WEB_SERVER,
            names::MAIL_CAPTURE,
        ];
        for service in expected {
            assert_running(&orch, service)?;
        }
        assert_eq!(
            orch.service_state(names::SCHEDULER),
            Some(ServiceState::Declared)
        );
        let order: Vec<String> = orch
            .start_order()
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();
        if order != expected {
            return Err(format!("Unexpected start order: {:?}", order));
        }
        println!("✓ Start order: {:?}\n", order);

        let web_port = orch
            .service(names::WEB_SERVER)
            .and_then(|r| r.port)
            .ok_or("web-server has no port")?;
        assert_port_listening(web_port, true).await?;

        println!("Step 3: Shutting down...");
        let report = orch.shutdown().await;
        if !report.is_clean() || !report.force_killed.is_empty() {
            return Err(format!("Unclean shutdown: {:?}", report));
        }
        if report.stopped.len() != expected.len() {
            return Err(format!("Expected {} stopped, got {:?}", expected.len(), report.stopped));
        }
        println!("✓ Shutdown report: {:?}\n", report);

        println!("Step 4: Checking each child was signalled once...");
        for service in expected {
            assert_terminated_once(&orch, service)?;
            let signals = env.signals_received(service);
            if signals.len() != 1 {
                return Err(format!("{} received {:?}", service, signals));
            }
            if orch.service_state(service) != Some(ServiceState::Stopped) {
                return Err(format!("{} is {:?} after shutdown", service, orch.service_state(service)));
            }
        }
        assert_port_listening(web_port, false).await?;
        println!("✓ Every child stopped gracefully\n");
        Ok(())
    }
    .await;

    finish("Startup Order", result);
}

#[tokio::test]
async fn test_mail_capture_skipped_outside_local_mode() {
    init_test_logging();
    print_banner("Mail Capture Skipped");

    let mut env = TestEnvironment::new(TESTEXE, "mail-skipped")
        .await
        .only(&[names::MAIL_CAPTURE, names::WORKER]);
    env.config.mode = DeploymentMode::from("staging");
    let mut orch = env.orchestrator(&[]);

    let result: Result<(), String> = async {
        orch.run_startup().await.map_err(|e| e.to_string())?;
        assert_running(&orch, names::WORKER)?;
        e2e_tests::assertions::assert_never_started(&orch, names::MAIL_CAPTURE)?;
        println!("✓ mail-capture was not started in staging mode\n");

        let report = orch.shutdown().await;
        if report.stopped.len() != 2 {
            return Err(format!("Expected cache and worker stopped, got {:?}", report));
        }
        Ok(())
    }
    .await;

    finish("Mail Capture Skipped", result);
}
