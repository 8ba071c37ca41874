//! Supervision of spawned services.
//!
//! The supervisor owns every [`ServiceHandle`]. Shutdown walks the services
//! in reverse start order and stops each one before moving to the next.

mod handle;

pub use handle::{ExitRecord, ServiceHandle, StopOutcome, FORCE_KILL_TIMEOUT};

use crate::config::ServiceConfig;
use devstack_common::{ProcessError, ServiceName};
use devstack_process_state::{ServiceState, ServiceStateMachine};
use serde::Serialize;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// A declared service and what happened to it.
#[derive(Debug)]
pub struct ManagedService {
    pub config: ServiceConfig,
    pub state: ServiceStateMachine,
    /// Port finally used (after negotiation), if any.
    pub port: Option<u16>,
    pub handle: Option<ServiceHandle>,
}

impl ManagedService {
    fn new(config: ServiceConfig) -> Self {
        let state = ServiceStateMachine::new(config.name.as_str());
        Self {
            config,
            state,
            port: None,
            handle: None,
        }
    }

    pub fn name(&self) -> &ServiceName {
        &self.config.name
    }

    /// Record a state change. Invalid changes are logged, not propagated.
    pub fn set_state(&mut self, target: ServiceState, reason: Option<String>) {
        if let Err(e) = self.state.transition_to(target, reason) {
            warn!(service = %self.config.name, error = %e, "Ignoring invalid state change");
        }
    }

    pub fn report(&self) -> ServiceReport {
        ServiceReport {
            name: self.config.name.clone(),
            state: self.state.current_state(),
            port: self.port,
            pid: self.handle.as_ref().map(ServiceHandle::pid),
            termination_requests: self
                .handle
                .as_ref()
                .map(ServiceHandle::termination_requests)
                .unwrap_or(0),
            force_killed: self
                .handle
                .as_ref()
                .map(ServiceHandle::force_killed)
                .unwrap_or(false),
            failure: self.state.failure_reason().map(str::to_string),
        }
    }
}

/// Snapshot of one service, for display and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceReport {
    pub name: ServiceName,
    pub state: ServiceState,
    pub port: Option<u16>,
    pub pid: Option<u32>,
    pub termination_requests: u32,
    pub force_killed: bool,
    pub failure: Option<String>,
}

/// Why waiting on the children ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The cancellation token fired.
    Interrupted,
    /// Every spawned child exited on its own; lists those that exited unsuccessfully.
    AllExited { failed: Vec<ServiceName> },
}

/// Summary of a shutdown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub stopped: Vec<ServiceName>,
    pub force_killed: Vec<ServiceName>,
    pub unkillable: Vec<ServiceName>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.unkillable.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct Supervisor {
    services: Vec<ManagedService>,
    /// Indices into `services`, in spawn order.
    start_order: Vec<usize>,
}

impl Supervisor {
    /// Declare `configs`, in order.
    pub fn new(configs: impl IntoIterator<Item = ServiceConfig>) -> Self {
        Self {
            services: configs.into_iter().map(ManagedService::new).collect(),
            start_order: Vec::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ManagedService> {
        self.services.iter().find(|s| s.name().as_str() == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ManagedService> {
        self.services.iter_mut().find(|s| s.name().as_str() == name)
    }

    /// Hand ownership of a freshly spawned child to the supervisor.
    pub fn attach(&mut self, name: &str, handle: ServiceHandle) {
        if let Some(index) = self.services.iter().position(|s| s.name().as_str() == name) {
            self.services[index].handle = Some(handle);
            self.services[index].set_state(ServiceState::Starting, Some("Spawned".to_string()));
            self.start_order.push(index);
        }
    }

    /// Names of spawned services, in spawn order.
    pub fn start_order(&self) -> Vec<ServiceName> {
        self.start_order
            .iter()
            .map(|&i| self.services[i].name().clone())
            .collect()
    }

    pub fn reports(&self) -> Vec<ServiceReport> {
        self.services.iter().map(ManagedService::report).collect()
    }

    /// Block until every spawned child has exited or `cancel` fires.
    pub async fn wait_all(&mut self, cancel: &CancellationToken) -> WaitOutcome {
        let mut exits = JoinSet::new();
        for &index in &self.start_order {
            let service = &self.services[index];
            if let Some(ref handle) = service.handle {
                let name = service.name().clone();
                let exit_rx = handle.exit_receiver();
                let pid = handle.pid();
                exits.spawn(async move { (name, handle::wait_for_exit(exit_rx, pid).await) });
            }
        }

        let mut failed = Vec::new();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return WaitOutcome::Interrupted,
                joined = exits.join_next() => {
                    let Some(joined) = joined else {
                        return WaitOutcome::AllExited { failed };
                    };
                    let Ok((name, record)) = joined else {
                        continue;
                    };
                    if self.record_exit(&name, &record) {
                        failed.push(name);
                    }
                }
            }
        }
    }

    /// Note an exit that happened outside of shutdown. Returns true if it was a failure.
    fn record_exit(&mut self, name: &ServiceName, record: &ExitRecord) -> bool {
        let Some(service) = self.get_mut(name.as_str()) else {
            return false;
        };
        let already_failed = service.state.current_state() == ServiceState::Failed;

        if record.success {
            info!(service = %name, status = %record.description, "Service exited");
            if !already_failed {
                service.set_state(ServiceState::Stopped, Some(record.description.clone()));
            }
            false
        } else {
            error!(service = %name, status = %record.description, "Service exited unexpectedly");
            if !already_failed {
                service.set_state(
                    ServiceState::Failed,
                    Some(format!("exited: {}", record.description)),
                );
            }
            true
        }
    }

    /// Stop one spawned service. Returns `None` if it was never spawned.
    pub async fn stop_service(&mut self, name: &str) -> Option<Result<StopOutcome, ProcessError>> {
        let index = self.services.iter().position(|s| s.name().as_str() == name)?;
        self.stop_at(index).await
    }

    /// Stop every spawned child, newest first. Adopted services are left alone.
    pub async fn shutdown(&mut self) -> ShutdownReport {
        let mut report = ShutdownReport::default();
        let order: Vec<usize> = self.start_order.iter().rev().copied().collect();

        for index in order {
            let name = self.services[index].name().clone();
            match self.stop_at(index).await {
                None | Some(Ok(StopOutcome::AlreadyExited(_))) => {}
                Some(Ok(StopOutcome::Graceful(_))) => report.stopped.push(name),
                Some(Ok(StopOutcome::Forced(_))) => {
                    report.stopped.push(name.clone());
                    report.force_killed.push(name);
                }
                Some(Err(_)) => report.unkillable.push(name),
            }
        }

        report
    }

    async fn stop_at(&mut self, index: usize) -> Option<Result<StopOutcome, ProcessError>> {
        let service = &mut self.services[index];
        let handle = service.handle.as_mut()?;
        let name = service.config.name.clone();
        let failed = service.state.current_state() == ServiceState::Failed;

        if !service.state.current_state().is_terminal() {
            if let Err(e) = service.state.transition_to_stopping() {
                warn!(service = %name, error = %e, "Ignoring invalid state change");
            }
        }

        let result = handle.stop(service.config.graceful_timeout).await;
        match result {
            Ok(ref outcome) => {
                // A failed service stays failed even once it is gone.
                if !failed {
                    let record = match outcome {
                        StopOutcome::AlreadyExited(r)
                        | StopOutcome::Graceful(r)
                        | StopOutcome::Forced(r) => r,
                    };
                    service.set_state(ServiceState::Stopped, Some(record.description.clone()));
                }
            }
            Err(ref e) => {
                error!(service = %name, error = %e, "Could not stop service");
                service.set_state(ServiceState::Failed, Some(e.to_string()));
            }
        }
        Some(result)
    }
}
