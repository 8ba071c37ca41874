//! Error types for devstack.
//!
//! Two layers:
//! - [`ProcessError`] for low-level spawn/stop/state failures of a single child.
//! - [`Error`] for the orchestration sequence as a whole.
//!
//! Operator typing mistakes (non-numeric port answers) never become errors;
//! they are handled where the prompt is read.

use crate::types::ServiceName;
use thiserror::Error;

/// Result type alias for orchestration operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the orchestrator.
#[derive(Debug, Error)]
pub enum Error {
    /// The cache never answered on its port after being launched.
    #[error("Cache not reachable on port {port} after {attempts} probe(s)")]
    CacheUnreachable { port: u16, attempts: u32 },

    /// A service marked as required failed to start or become ready.
    #[error("Service {service} failed to start: {reason}")]
    ServiceFailed { service: ServiceName, reason: String },

    /// The operator could not supply a usable port (input closed, or prompting disabled).
    #[error("Port negotiation aborted for {service}: {reason}")]
    PortNegotiationAborted { service: ServiceName, reason: String },

    /// Invalid or inconsistent configuration.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Database listing or creation failed.
    #[error("Database provisioning failed for '{database}': {reason}")]
    Database { database: String, reason: String },

    /// Startup was cancelled by an interrupt.
    #[error("Interrupted")]
    Interrupted,

    /// Low-level process failure.
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// I/O error (wraps std::io::Error).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn service_failed(service: impl Into<ServiceName>, reason: impl Into<String>) -> Self {
        Self::ServiceFailed {
            service: service.into(),
            reason: reason.into(),
        }
    }

    pub fn port_negotiation_aborted(
        service: impl Into<ServiceName>,
        reason: impl Into<String>,
    ) -> Self {
        Self::PortNegotiationAborted {
            service: service.into(),
            reason: reason.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn database(database: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Database {
            database: database.into(),
            reason: reason.into(),
        }
    }

    /// True when the error came from an interrupt rather than a failure.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Error::Interrupted)
    }
}

// ==============================================================================
// Process Errors
// ==============================================================================

/// Failures of a single child process.
#[derive(Error, Debug, Clone)]
pub enum ProcessError {
    #[error("Process not found: {id}")]
    NotFound { id: String },

    #[error("Process spawn failed: {id} - {reason}")]
    SpawnFailed { id: String, reason: String },

    #[error("Process stop failed: {id} - {reason}")]
    StopFailed { id: String, reason: String },

    #[error("Process timeout: {id} - {operation}")]
    Timeout { id: String, operation: String },

    #[error("Process state error: {id} - cannot move from {actual} to {expected}")]
    InvalidState {
        id: String,
        expected: String,
        actual: String,
    },

    #[error("Process configuration error: {id} - {reason}")]
    Configuration { id: String, reason: String },
}

impl ProcessError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    pub fn spawn_failed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SpawnFailed {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn stop_failed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StopFailed {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn timeout(id: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Timeout {
            id: id.into(),
            operation: operation.into(),
        }
    }

    pub fn invalid_state(
        id: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::InvalidState {
            id: id.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn configuration(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Configuration {
            id: id.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for process operations.
pub type ProcessResult<T> = std::result::Result<T, ProcessError>;
