//! # devstack monitoring
//!
//! Reachability checks for managed services:
//! - TCP port probes
//! - Bounded readiness polling with exponential backoff
//! - Liveness settling for services without a port

pub mod port;
pub mod readiness;

pub use port::{is_service_running, probe_port, PortProbe, PROBE_CONNECT_TIMEOUT};
pub use readiness::{
    poll_with_backoff, wait_until_alive, wait_until_ready, Backoff, ProbeOutcome,
    ReadinessConfig,
};

use std::time::Duration;
use thiserror::Error;

/// Readiness failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("not ready after {attempts} attempt(s) over {waited:?}")]
    NotReady { attempts: u32, waited: Duration },

    #[error("process exited before becoming ready: {reason}")]
    Exited { reason: String, attempts: u32 },

    #[error("readiness wait cancelled")]
    Cancelled,
}

impl ProbeError {
    /// Probes made before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            ProbeError::NotReady { attempts, .. } | ProbeError::Exited { attempts, .. } => *attempts,
            ProbeError::Cancelled => 0,
        }
    }
}

pub type ProbeResult<T> = Result<T, ProbeError>;
