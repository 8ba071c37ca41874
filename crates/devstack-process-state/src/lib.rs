//! Lifecycle state of a service managed by the orchestrator.

use chrono::{DateTime, Utc};
use devstack_common::{ProcessError, ProcessResult};
use serde::{Deserialize, Serialize};
use std::fmt;

const MAX_HISTORY: usize = 32;

/// Where a service is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    /// Known from configuration; nothing has happened yet
    Declared,
    /// Spawned, readiness not yet confirmed
    Starting,
    /// Readiness confirmed
    Running,
    /// An instance was already listening on the port; never spawned by us
    Adopted,
    /// Termination requested
    Stopping,
    /// Reaped after termination, or exited on its own
    Stopped,
    /// Failed to spawn, become ready, or stop
    Failed,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceState::Declared => "declared",
            ServiceState::Starting => "starting",
            ServiceState::Running => "running",
            ServiceState::Adopted => "adopted",
            ServiceState::Stopping => "stopping",
            ServiceState::Stopped => "stopped",
            ServiceState::Failed => "failed",
        };
        f.write_str(s)
    }
}

impl ServiceState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ServiceState::Stopped | ServiceState::Failed)
    }

    /// Whether the orchestrator spawned a child for this service that may still be alive.
    pub fn owns_process(&self) -> bool {
        matches!(
            self,
            ServiceState::Starting | ServiceState::Running | ServiceState::Stopping
        )
    }
}

/// One recorded state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from_state: ServiceState,
    pub to_state: ServiceState,
    pub timestamp: DateTime<Utc>,
    pub reason: Option<String>,
}

/// Tracks a single service's state and validates every change.
#[derive(Debug, Clone)]
pub struct ServiceStateMachine {
    service: String,
    current_state: ServiceState,
    history: Vec<StateTransition>,
    last_transition_time: DateTime<Utc>,
}

impl ServiceStateMachine {
    pub fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
            current_state: ServiceState::Declared,
            history: Vec::new(),
            last_transition_time: Utc::now(),
        }
    }

    pub fn current_state(&self) -> ServiceState {
        self.current_state
    }

    pub fn history(&self) -> &[StateTransition] {
        &self.history
    }

    pub fn last_transition(&self) -> Option<&StateTransition> {
        self.history.last()
    }

    pub fn last_transition_time(&self) -> DateTime<Utc> {
        self.last_transition_time
    }

    pub fn is_valid_transition(&self, target: ServiceState) -> bool {
        use ServiceState::*;

        match (self.current_state, target) {
            (state, target) if state == target => true,

            (Declared, Starting | Adopted | Failed) => true,
            (Starting, Running | Stopping | Stopped | Failed) => true,
            (Running, Stopping | Stopped | Failed) => true,
            (Stopping, Stopped | Failed) => true,

            _ => false,
        }
    }

    /// Move to `target`. Moving to the current state is a no-op and is not recorded.
    pub fn transition_to(
        &mut self,
        target: ServiceState,
        reason: Option<String>,
    ) -> ProcessResult<()> {
        if !self.is_valid_transition(target) {
            return Err(ProcessError::invalid_state(
                &self.service,
                target.to_string(),
                self.current_state.to_string(),
            ));
        }

        if target == self.current_state {
            return Ok(());
        }

        let now = Utc::now();
        let from = self.current_state;
        self.history.push(StateTransition {
            from_state: from,
            to_state: target,
            timestamp: now,
            reason,
        });
        if self.history.len() > MAX_HISTORY {
            self.history.remove(0);
        }

        self.current_state = target;
        self.last_transition_time = now;

        tracing::debug!(
            service = %self.service,
            from = %from,
            to = %target,
            "Service state changed"
        );

        Ok(())
    }

    pub fn transition_to_starting(&mut self) -> ProcessResult<()> {
        self.transition_to(ServiceState::Starting, Some("Spawned".to_string()))
    }

    pub fn transition_to_running(&mut self) -> ProcessResult<()> {
        self.transition_to(ServiceState::Running, Some("Ready".to_string()))
    }

    pub fn transition_to_adopted(&mut self, port: u16) -> ProcessResult<()> {
        self.transition_to(
            ServiceState::Adopted,
            Some(format!("Port {} already in use", port)),
        )
    }

    pub fn transition_to_stopping(&mut self) -> ProcessResult<()> {
        self.transition_to(ServiceState::Stopping, Some("Stop requested".to_string()))
    }

    pub fn transition_to_stopped(&mut self, reason: impl Into<String>) -> ProcessResult<()> {
        self.transition_to(ServiceState::Stopped, Some(reason.into()))
    }

    pub fn transition_to_failed(&mut self, reason: impl Into<String>) -> ProcessResult<()> {
        self.transition_to(ServiceState::Failed, Some(reason.into()))
    }

    /// Reason attached to the most recent move into `Failed`, if any.
    pub fn failure_reason(&self) -> Option<&str> {
        self.history
            .iter()
            .rev()
            .find(|t| t.to_state == ServiceState::Failed)
            .and_then(|t| t.reason.as_deref())
    }
}
