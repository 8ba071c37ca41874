//! A cache that never opens its port aborts startup before anything else runs.

use devstack_common::{names, Error};
use devstack_process_state::ServiceState;
use e2e_tests::assertions::{assert_never_started, assert_state};
use e2e_tests::{finish, init_test_logging, print_banner, TestEnvironment};
use std::time::Duration;

const TESTEXE: &str = env!("CARGO_BIN_EXE_testexe");

#[tokio::test]
async fn test_cache_failure() {
    init_test_logging();
    print_banner("Cache Failure");

    let mut env = TestEnvironment::new(TESTEXE, "cache-failure").await;
    let signal_log = env.signal_log(names::CACHE).to_string_lossy().into_owned();
    let cache = env.config.service_mut(names::CACHE).expect("cache declared");
    // Runs, but never listens.
    cache.args = vec!["--signal-log".to_string(), signal_log];
    cache.readiness_timeout = Duration::from_millis(800);
    let mut orch = env.orchestrator(&[]);

    let result: Result<(), String> = async {
        println!("Step 1: Running startup against a silent cache...");
        let err = match orch.run_startup().await {
            Ok(()) => return Err("startup should have failed".to_string()),
            Err(e) => e,
        };
        match &err {
            Error::CacheUnreachable { attempts, .. } if *attempts > 0 => {}
            other => return Err(format!("Unexpected error: {:?}", other)),
        }
        println!("✓ Startup failed with: {}\n", err);

        println!("Step 2: Checking the half-started cache was stopped...");
        assert_state(&orch, names::CACHE, ServiceState::Failed)?;
        let cache = orch.service(names::CACHE).ok_or("cache missing")?;
        if cache.termination_requests != 1 {
            return Err(format!("Cache got {} termination requests", cache.termination_requests));
        }
        if env.signals_received(names::CACHE).len() != 1 {
            return Err("Cache did not record its termination signal".to_string());
        }
        println!("✓ Cache stopped and marked failed\n");

        println!("Step 3: Checking nothing else was attempted...");
        for service in [names::WORKER, names::WORKER_MONITOR, names::WEB_SERVER] {
            assert_never_started(&orch, service)?;
        }
        println!("✓ No further services started\n");

        let report = orch.shutdown().await;
        if !report.is_clean() {
            return Err(format!("Unclean shutdown: {:?}", report));
        }
        Ok(())
    }
    .await;

    finish("Cache Failure", result);
}
