//! An occupied worker-monitor port is renegotiated through the prompt.

use devstack_common::{names, Error};
use devstack_process_state::ServiceState;
use e2e_tests::assertions::{assert_port_listening, assert_running, assert_state};
use e2e_tests::{finish, free_port, init_test_logging, occupy_port, print_banner, TestEnvironment};

const TESTEXE: &str = env!("CARGO_BIN_EXE_testexe");

#[tokio::test]
async fn test_port_negotiation() {
    init_test_logging();
    print_banner("Port Negotiation");

    let (_listener, occupied) = occupy_port().await;
    let replacement = free_port().await;

    let mut env = TestEnvironment::new(TESTEXE, "port-negotiation")
        .await
        .only(&[names::WORKER_MONITOR]);
    env.config
        .service_mut(names::WORKER_MONITOR)
        .expect("worker-monitor declared")
        .port = Some(occupied);
    let replacement_answer = replacement.to_string();
    let mut orch = env.orchestrator(&["not-a-port", replacement_answer.as_str()]);

    let result: Result<(), String> = async {
        println!("Step 1: Starting worker-monitor on occupied port {}...", occupied);
        orch.run_startup().await.map_err(|e| e.to_string())?;
        assert_running(&orch, names::WORKER_MONITOR)?;
        let monitor = orch.service(names::WORKER_MONITOR).ok_or("worker-monitor missing")?;
        if monitor.port != Some(replacement) {
            return Err(format!("Expected port {}, got {:?}", replacement, monitor.port));
        }
        assert_port_listening(replacement, true).await?;
        println!("✓ worker-monitor moved to port {}\n", replacement);

        orch.shutdown().await;
        Ok(())
    }
    .await;

    finish("Port Negotiation", result);
}

#[tokio::test]
async fn test_port_negotiation_aborted() {
    init_test_logging();
    print_banner("Port Negotiation Aborted");

    let (_listener, occupied) = occupy_port().await;

    let mut env = TestEnvironment::new(TESTEXE, "port-negotiation-aborted")
        .await
        .only(&[names::WORKER_MONITOR, names::WEB_SERVER]);
    env.config
        .service_mut(names::WORKER_MONITOR)
        .expect("worker-monitor declared")
        .port = Some(occupied);
    // No answers: the prompt behaves like a closed terminal.
    let mut orch = env.orchestrator(&[]);

    let result: Result<(), String> = async {
        let err = match orch.run_startup().await {
            Ok(()) => return Err("startup should have failed".to_string()),
            Err(e) => e,
        };
        if !matches!(err, Error::PortNegotiationAborted { .. }) {
            return Err(format!("Unexpected error: {:?}", err));
        }
        assert_state(&orch, names::WORKER_MONITOR, ServiceState::Failed)?;
        assert_state(&orch, names::WEB_SERVER, ServiceState::Declared)?;
        println!("✓ Startup aborted at worker-monitor: {}\n", err);

        let report = orch.shutdown().await;
        if report.stopped.iter().map(|s| s.as_str()).ne([names::CACHE]) {
            return Err(format!("Expected only the cache stopped: {:?}", report));
        }
        Ok(())
    }
    .await;

    finish("Port Negotiation Aborted", result);
}
