//! The startup sequence and its teardown.

use crate::config::{OrchestratorConfig, PortPolicy, ServiceConfig};
use crate::database::{self, CommandDatabaseClient, DatabaseClient};
use crate::environment::{activate_environment, ActivatedEnvironment};
use crate::lifecycle::{startup_plan, StartupStep};
use crate::ports::{get_available_port, PortPrompt, TerminalPrompt};
use crate::supervisor::{ServiceHandle, ServiceReport, ShutdownReport, Supervisor, WaitOutcome};
use devstack_common::{names, Error, Result, ServiceName};
use devstack_log_collection::{LogCollectionConfig, LogCollectionService};
use devstack_monitoring::{
    is_service_running, poll_with_backoff, wait_until_alive, ProbeError, ProbeOutcome,
    ProbeResult, ReadinessConfig,
};
use devstack_process::{CommandSpec, OutputMode};
use devstack_process_state::ServiceState;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Brings the environment up step by step and tears down what it started.
pub struct Orchestrator {
    config: OrchestratorConfig,
    supervisor: Supervisor,
    prompt: Box<dyn PortPrompt>,
    database_client: Option<Box<dyn DatabaseClient>>,
    environment: ActivatedEnvironment,
    logs: LogCollectionService,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        let logs = LogCollectionService::new(
            LogCollectionConfig {
                capture_stdout: config.log_relay.capture_stdout,
                capture_stderr: config.log_relay.capture_stderr,
            },
            // Readers stop on EOF or at the very end of shutdown, never before the children.
            CancellationToken::new(),
        );

        Self {
            supervisor: Supervisor::new(config.services.clone()),
            prompt: Box::new(TerminalPrompt::new()),
            database_client: None,
            environment: ActivatedEnvironment::inactive(),
            logs,
            cancel: CancellationToken::new(),
            config,
        }
    }

    pub fn with_prompt(mut self, prompt: Box<dyn PortPrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn with_database_client(mut self, client: Box<dyn DatabaseClient>) -> Self {
        self.database_client = Some(client);
        self
    }

    /// Cancelling this token interrupts startup, prompts and waiting.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn environment(&self) -> &ActivatedEnvironment {
        &self.environment
    }

    pub fn services(&self) -> Vec<ServiceReport> {
        self.supervisor.reports()
    }

    pub fn service(&self, name: &str) -> Option<ServiceReport> {
        self.supervisor.get(name).map(|s| s.report())
    }

    pub fn service_state(&self, name: &str) -> Option<ServiceState> {
        self.supervisor.get(name).map(|s| s.state.current_state())
    }

    /// Services this run spawned, oldest first.
    pub fn start_order(&self) -> Vec<ServiceName> {
        self.supervisor.start_order()
    }

    /// Run every startup step in order, stopping at the first fatal failure.
    pub async fn run_startup(&mut self) -> Result<()> {
        info!(mode = %self.config.mode, "Starting local environment");

        for step in startup_plan(&self.config) {
            if self.cancel.is_cancelled() {
                return Err(Error::Interrupted);
            }
            debug!(step = %step, "Startup step");

            match step {
                StartupStep::ActivateEnvironment => self.activate_environment(),
                StartupStep::EnsureCache => self.ensure_cache_running().await?,
                StartupStep::EnsureDatabase => self.ensure_database_exists().await?,
                StartupStep::StartService(name) => self.start_service(name.as_str()).await?,
            }
        }

        let running = self
            .supervisor
            .reports()
            .iter()
            .filter(|r| matches!(r.state, ServiceState::Running | ServiceState::Adopted))
            .count();
        info!(services = running, "Startup complete");
        Ok(())
    }

    pub fn activate_environment(&mut self) {
        self.environment = activate_environment(&self.config.environment);
    }

    /// Adopt a cache already listening on its port, or launch one and wait for it.
    ///
    /// Any failure here is fatal; a half-started cache is stopped again.
    pub async fn ensure_cache_running(&mut self) -> Result<()> {
        let config = self.service_config(names::CACHE)?;
        let port = config
            .port
            .ok_or_else(|| Error::configuration("the cache requires a port"))?;

        if is_service_running(port).await {
            info!(service = %config.name, port, "Cache already running, adopting it");
            self.mark_adopted(names::CACHE, port);
            return Ok(());
        }

        if let Err(e) = self.spawn_service(&config, Some(port)) {
            self.mark_failed(names::CACHE, e.to_string());
            return Err(e);
        }

        match self.await_readiness(&config, Some(port)).await {
            Ok(attempts) => {
                self.mark_running(names::CACHE);
                info!(service = %config.name, port, attempts, "Cache ready");
                Ok(())
            }
            Err(ProbeError::Cancelled) => Err(Error::Interrupted),
            Err(e) => {
                error!(service = %config.name, port, error = %e, "Cache did not become reachable");
                self.mark_failed(names::CACHE, e.to_string());
                self.supervisor.stop_service(names::CACHE).await;
                Err(Error::CacheUnreachable {
                    port,
                    attempts: e.attempts(),
                })
            }
        }
    }

    /// Create the application database if it is missing.
    pub async fn ensure_database_exists(&mut self) -> Result<()> {
        let db = self.config.database.clone();
        if !db.enabled {
            return Ok(());
        }

        let fallback;
        let client: &dyn DatabaseClient = match self.database_client {
            Some(ref client) => client.as_ref(),
            None => {
                fallback = CommandDatabaseClient::new(&db.client, &self.environment);
                &fallback
            }
        };

        let result = tokio::select! {
            _ = self.cancel.cancelled() => return Err(Error::Interrupted),
            result = database::ensure_database_exists(client, &db.name) => result,
        };

        match result {
            Ok(outcome) => {
                info!(database = %db.name, ?outcome, "Database ready");
                Ok(())
            }
            Err(e) if db.required => Err(e),
            Err(e) => {
                warn!(database = %db.name, error = %e, "Database provisioning failed, continuing");
                Ok(())
            }
        }
    }

    pub async fn start_worker(&mut self) -> Result<()> {
        self.start_service(names::WORKER).await
    }

    pub async fn start_worker_monitor(&mut self) -> Result<()> {
        self.start_service(names::WORKER_MONITOR).await
    }

    pub async fn start_scheduler(&mut self) -> Result<()> {
        self.start_service(names::SCHEDULER).await
    }

    pub async fn start_web_server(&mut self) -> Result<()> {
        self.start_service(names::WEB_SERVER).await
    }

    /// Mail capture only ever runs in `local` mode.
    pub async fn start_mail_capture(&mut self) -> Result<()> {
        if !self.config.mode.is_local() {
            debug!(mode = %self.config.mode, "Not in local mode, mail capture skipped");
            return Ok(());
        }
        self.start_service(names::MAIL_CAPTURE).await
    }

    /// Start one service and wait for it to become ready.
    ///
    /// Failures of services not marked `required` are logged and swallowed.
    pub async fn start_service(&mut self, name: &str) -> Result<()> {
        let config = self.service_config(name)?;
        if !config.enabled {
            debug!(service = %config.name, "Service disabled, skipping");
            return Ok(());
        }

        match self.launch(&config).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_interrupted() || config.required => Err(e),
            Err(e) => {
                warn!(service = %config.name, error = %e, "Optional service failed, continuing without it");
                Ok(())
            }
        }
    }

    /// Block until every spawned child has exited or the cancellation token fires.
    pub async fn wait_for_children(&mut self) -> WaitOutcome {
        self.supervisor.wait_all(&self.cancel).await
    }

    /// Cancel everything still in flight and stop every spawned child, newest first.
    pub async fn shutdown(&mut self) -> ShutdownReport {
        self.cancel.cancel();
        info!("Shutting down");

        let report = self.supervisor.shutdown().await;
        self.logs.shutdown().await;

        if report.is_clean() {
            info!(stopped = report.stopped.len(), "Shutdown complete");
        } else {
            error!(unkillable = ?report.unkillable, "Shutdown left processes running");
        }
        report
    }

    async fn launch(&mut self, config: &ServiceConfig) -> Result<()> {
        let name = config.name.as_str();

        let port = match (config.port, config.port_policy) {
            (None, _) => None,
            (Some(port), PortPolicy::Adopt) => {
                if is_service_running(port).await {
                    info!(service = %config.name, port, "Already running, adopting it");
                    self.mark_adopted(name, port);
                    return Ok(());
                }
                Some(port)
            }
            (Some(port), PortPolicy::Negotiate) => {
                match get_available_port(port, &config.name, self.prompt.as_mut(), &self.cancel)
                    .await
                {
                    Ok(port) => Some(port),
                    Err(e) => {
                        if !e.is_interrupted() {
                            self.mark_failed(name, e.to_string());
                        }
                        return Err(e);
                    }
                }
            }
        };

        if let Err(e) = self.spawn_service(config, port) {
            self.mark_failed(name, e.to_string());
            return Err(e);
        }

        match self.await_readiness(config, port).await {
            Ok(attempts) => {
                self.mark_running(name);
                info!(service = %config.name, port = ?port, attempts, "Service ready");
                Ok(())
            }
            Err(ProbeError::Cancelled) => Err(Error::Interrupted),
            Err(e) => {
                self.mark_failed(name, e.to_string());
                Err(Error::service_failed(name, e.to_string()))
            }
        }
    }

    fn spawn_service(&mut self, config: &ServiceConfig, port: Option<u16>) -> Result<()> {
        let name = config.name.as_str();

        let mut spec = CommandSpec {
            program: config.program.clone(),
            args: config.resolved_args(port),
            env: config.env.clone(),
            working_directory: config.working_directory.clone(),
        };
        self.environment.apply(&mut spec);

        let child = devstack_process::spawn(name, &spec, OutputMode::Capture)?;
        let handle = ServiceHandle::new(config.name.clone(), child, &self.logs)?;
        info!(service = %config.name, pid = handle.pid(), command = %spec.display(), "Service spawned");

        if let Some(service) = self.supervisor.get_mut(name) {
            service.port = port;
        }
        self.supervisor.attach(name, handle);
        Ok(())
    }

    /// Ready means listening on `port`, or for portless services, alive after the settle window.
    async fn await_readiness(&self, config: &ServiceConfig, port: Option<u16>) -> ProbeResult<u32> {
        let exit_rx = match self
            .supervisor
            .get(config.name.as_str())
            .and_then(|s| s.handle.as_ref())
        {
            Some(handle) => handle.exit_receiver(),
            None => {
                return Err(ProbeError::Exited {
                    reason: "never spawned".to_string(),
                    attempts: 0,
                })
            }
        };

        match port {
            Some(port) => {
                let readiness = ReadinessConfig::with_timeout(config.readiness_timeout);
                poll_with_backoff(&readiness, &self.cancel, move || {
                    let exited = exit_rx.borrow().clone();
                    async move {
                        if let Some(record) = exited {
                            ProbeOutcome::Abort(record.description)
                        } else if is_service_running(port).await {
                            ProbeOutcome::Ready
                        } else {
                            ProbeOutcome::Pending
                        }
                    }
                })
                .await
            }
            None => wait_until_alive(config.settle_time, &self.cancel, move || {
                exit_rx.borrow().as_ref().map(|r| r.description.clone())
            })
            .await
            .map(|()| 1),
        }
    }

    fn service_config(&self, name: &str) -> Result<ServiceConfig> {
        self.supervisor
            .get(name)
            .map(|s| s.config.clone())
            .ok_or_else(|| Error::configuration(format!("unknown service: {}", name)))
    }

    fn mark_adopted(&mut self, name: &str, port: u16) {
        if let Some(service) = self.supervisor.get_mut(name) {
            service.port = Some(port);
            service.set_state(ServiceState::Adopted, Some(format!("port {} already in use", port)));
        }
    }

    fn mark_running(&mut self, name: &str) {
        if let Some(service) = self.supervisor.get_mut(name) {
            service.set_state(ServiceState::Running, Some("ready".to_string()));
        }
    }

    fn mark_failed(&mut self, name: &str, reason: String) {
        if let Some(service) = self.supervisor.get_mut(name) {
            service.set_state(ServiceState::Failed, Some(reason));
        }
    }
}
