//! Waiting on children ends when they all exit or when interrupted.

use devstack_common::names;
use devstack_orchestrator::WaitOutcome;
use devstack_process_state::ServiceState;
use e2e_tests::assertions::assert_state;
use e2e_tests::{finish, init_test_logging, print_banner, TestEnvironment};
use std::time::Duration;

const TESTEXE: &str = env!("CARGO_BIN_EXE_testexe");

#[tokio::test]
async fn test_children_exit_on_their_own() {
    init_test_logging();
    print_banner("Children Exit");

    let env = TestEnvironment::new(TESTEXE, "children-exit")
        .await
        .only(&[names::WORKER])
        .with_args(names::CACHE, &["--exit-after-ms", "1500"])
        .with_args(names::WORKER, &["--exit-after-ms", "1500", "--exit-code", "3"]);
    let mut orch = env.orchestrator(&[]);

    let result: Result<(), String> = async {
        orch.run_startup().await.map_err(|e| e.to_string())?;

        println!("Step 1: Waiting for both children to exit...");
        let outcome = tokio::time::timeout(Duration::from_secs(10), orch.wait_for_children())
            .await
            .map_err(|_| "children did not exit".to_string())?;
        let failed = match outcome {
            WaitOutcome::AllExited { failed } => failed,
            other => return Err(format!("Unexpected outcome: {:?}", other)),
        };
        if failed.iter().map(|s| s.as_str()).ne([names::WORKER]) {
            return Err(format!("Expected only the worker to fail: {:?}", failed));
        }
        assert_state(&orch, names::CACHE, ServiceState::Stopped)?;
        assert_state(&orch, names::WORKER, ServiceState::Failed)?;
        println!("✓ Cache exited cleanly, worker exited with code 3\n");

        println!("Step 2: Shutdown has nothing left to signal...");
        let report = orch.shutdown().await;
        for service in [names::CACHE, names::WORKER] {
            let r = orch.service(service).ok_or("service missing")?;
            if r.termination_requests != 0 {
                return Err(format!("{} was signalled after exiting", service));
            }
        }
        if !report.is_clean() {
            return Err(format!("Unclean shutdown: {:?}", report));
        }
        println!("✓ No signals sent to exited children\n");
        Ok(())
    }
    .await;

    finish("Children Exit", result);
}

#[tokio::test]
async fn test_wait_interrupted() {
    init_test_logging();
    print_banner("Wait Interrupted");

    let env = TestEnvironment::new(TESTEXE, "wait-interrupted")
        .await
        .only(&[names::WORKER]);
    let mut orch = env.orchestrator(&[]);

    let result: Result<(), String> = async {
        orch.run_startup().await.map_err(|e| e.to_string())?;

        let token = orch.cancellation_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            token.cancel();
        });

        println!("Step 1: Waiting until interrupted...");
        let outcome = tokio::time::timeout(Duration::from_secs(10), orch.wait_for_children())
            .await
            .map_err(|_| "interrupt was not observed".to_string())?;
        if outcome != WaitOutcome::Interrupted {
            return Err(format!("Unexpected outcome: {:?}", outcome));
        }
        println!("✓ Wait interrupted\n");

        println!("Step 2: Shutting down...");
        let report = orch.shutdown().await;
        if report.stopped.len() != 2 || !report.is_clean() {
            return Err(format!("Unexpected shutdown report: {:?}", report));
        }
        for service in [names::CACHE, names::WORKER] {
            if env.signals_received(service).len() != 1 {
                return Err(format!("{} was not signalled exactly once", service));
            }
        }
        println!("✓ Both children signalled once\n");
        Ok(())
    }
    .await;

    finish("Wait Interrupted", result);
}
