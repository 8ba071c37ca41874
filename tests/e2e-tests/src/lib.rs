//! End-to-end test support for devstack.
//!
//! Scenarios run the real orchestrator against `testexe`, a stand-in
//! service that can listen on a port, record termination signals, ignore
//! them, or exit on its own.

pub mod assertions;

use devstack_common::names;
use devstack_orchestrator::{Orchestrator, OrchestratorConfig, ScriptedPrompt};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::net::TcpListener;

/// Port nobody is listening on right now.
pub async fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind ephemeral port");
    listener.local_addr().expect("No local address").port()
}

/// A bound listener standing in for an already running service.
pub async fn occupy_port() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind ephemeral port");
    let port = listener.local_addr().expect("No local address").port();
    (listener, port)
}

/// Install a test subscriber once; later calls are no-ops.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_test_writer()
        .try_init();
}

/// Fresh scratch directory for one test.
pub fn create_test_dir(test_name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "devstack-e2e-{}-{}",
        test_name,
        std::process::id()
    ));
    if dir.exists() {
        std::fs::remove_dir_all(&dir).ok();
    }
    std::fs::create_dir_all(&dir).expect("Failed to create test directory");
    dir
}

pub fn cleanup_test_dir(dir: &Path) {
    if dir.exists() {
        std::fs::remove_dir_all(dir).ok();
    }
}

/// Builds configurations where every service is a `testexe`.
pub struct TestEnvironment {
    pub testexe: PathBuf,
    pub dir: PathBuf,
    pub config: OrchestratorConfig,
}

impl TestEnvironment {
    /// Every service runs `testexe` on a free port (worker and scheduler have none),
    /// records its signals under `dir`, and uses short timeouts.
    /// The database step and virtualenv activation are off.
    pub async fn new(testexe: &str, test_name: &str) -> Self {
        let dir = create_test_dir(test_name);
        let mut config = OrchestratorConfig::default();
        config.database.enabled = false;
        config.environment.virtualenv = None;

        for service in &mut config.services {
            service.program = testexe.to_string();
            service.args = vec![
                "--signal-log".to_string(),
                signal_log_path(&dir, service.name.as_str())
                    .to_string_lossy()
                    .into_owned(),
            ];
            if service.port.is_some() {
                service.port = Some(free_port().await);
                service.args.push("--port".to_string());
                service.args.push("{port}".to_string());
            }
            service.readiness_timeout = Duration::from_secs(5);
            service.settle_time = Duration::from_millis(200);
            service.graceful_timeout = Duration::from_secs(3);
        }

        Self {
            testexe: PathBuf::from(testexe),
            dir,
            config,
        }
    }

    /// Disable everything except the cache and `keep`.
    pub fn only(mut self, keep: &[&str]) -> Self {
        for service in &mut self.config.services {
            let name = service.name.as_str();
            if name != names::CACHE && !keep.contains(&name) {
                service.enabled = false;
            }
        }
        self
    }

    /// Append extra testexe arguments for `service`.
    pub fn with_args(mut self, service: &str, extra: &[&str]) -> Self {
        if let Some(s) = self.config.service_mut(service) {
            s.args.extend(extra.iter().map(|a| a.to_string()));
        }
        self
    }

    pub fn signal_log(&self, service: &str) -> PathBuf {
        signal_log_path(&self.dir, service)
    }

    /// Signals recorded by `service`'s testexe, one per entry.
    pub fn signals_received(&self, service: &str) -> Vec<String> {
        std::fs::read_to_string(self.signal_log(service))
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// An orchestrator for this configuration that answers port prompts from `answers`.
    pub fn orchestrator(&self, answers: &[&str]) -> Orchestrator {
        Orchestrator::new(self.config.clone())
            .with_prompt(Box::new(ScriptedPrompt::new(answers.iter().copied())))
    }
}

impl Drop for TestEnvironment {
    fn drop(&mut self) {
        cleanup_test_dir(&self.dir);
    }
}

fn signal_log_path(dir: &Path, service: &str) -> PathBuf {
    dir.join(format!("{}.signals", service))
}

pub fn print_banner(title: &str) {
    println!("\n========================================");
    println!("TEST: {}", title);
    println!("========================================\n");
}

/// Print the outcome banner and fail the test on error.
pub fn finish(title: &str, result: Result<(), String>) {
    match result {
        Ok(()) => {
            println!("\n========================================");
            println!("✓ TEST PASSED: {}", title);
            println!("========================================\n");
        }
        Err(e) => {
            println!("\n========================================");
            println!("✗ TEST FAILED: {}", title);
            println!("Error: {}", e);
            println!("========================================\n");
            panic!("Test failed: {}", e);
        }
    }
}
