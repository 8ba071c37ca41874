//! Forced stop of a child that ignores termination requests.

use devstack_common::names;
use e2e_tests::assertions::assert_running;
use e2e_tests::{finish, init_test_logging, print_banner, TestEnvironment};
use std::time::{Duration, Instant};

const TESTEXE: &str = env!("CARGO_BIN_EXE_testexe");

#[tokio::test]
async fn test_forced_stop() {
    init_test_logging();
    print_banner("Forced Stop");

    let mut env = TestEnvironment::new(TESTEXE, "forced-stop")
        .await
        .only(&[names::WORKER])
        .with_args(names::WORKER, &["--ignore-sigterm"]);
    env.config
        .service_mut(names::WORKER)
        .expect("worker declared")
        .graceful_timeout = Duration::from_millis(300);
    let mut orch = env.orchestrator(&[]);

    let result: Result<(), String> = async {
        println!("Step 1: Starting cache and a stubborn worker...");
        orch.run_startup().await.map_err(|e| e.to_string())?;
        assert_running(&orch, names::WORKER)?;
        println!("✓ Worker is running\n");

        println!("Step 2: Shutting down with a 300ms grace period...");
        let started = Instant::now();
        let report = orch.shutdown().await;
        let elapsed = started.elapsed();
        println!("Shutdown took {:?}: {:?}", elapsed, report);

        if !report.is_clean() {
            return Err(format!("Unclean shutdown: {:?}", report));
        }
        if report.force_killed.iter().map(|s| s.as_str()).ne([names::WORKER]) {
            return Err(format!("Expected only the worker force-killed: {:?}", report));
        }
        let worker = orch.service(names::WORKER).ok_or("worker missing")?;
        if !worker.force_killed {
            return Err("Worker report does not show a forced kill".to_string());
        }
        if elapsed > Duration::from_secs(5) {
            return Err(format!("Forced stop took too long: {:?}", elapsed));
        }
        println!("✓ Worker was force-killed\n");

        println!("Step 3: Checking the worker saw the graceful request first...");
        let signals = env.signals_received(names::WORKER);
        if signals.is_empty() {
            return Err("Worker never recorded a termination request".to_string());
        }
        println!("✓ Worker recorded {:?}\n", signals);
        Ok(())
    }
    .await;

    finish("Forced Stop", result);
}
