//! Domain types used throughout devstack.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The deployment mode literal that enables local-only services such as mail capture.
pub const LOCAL_MODE: &str = "local";

/// Logical names of the services devstack knows how to start.
pub mod names {
    pub const CACHE: &str = "cache";
    pub const WORKER: &str = "worker";
    pub const WORKER_MONITOR: &str = "worker-monitor";
    pub const SCHEDULER: &str = "scheduler";
    pub const WEB_SERVER: &str = "web-server";
    pub const MAIL_CAPTURE: &str = "mail-capture";
}

/// Logical service name, e.g. `cache` or `web-server`.
///
/// # Example
/// ```
/// use devstack_common::ServiceName;
///
/// let name = ServiceName::from("cache");
/// assert_eq!(name.as_str(), "cache");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceName(String);

impl ServiceName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ServiceName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ServiceName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&ServiceName> for ServiceName {
    fn from(s: &ServiceName) -> Self {
        s.clone()
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Deployment mode, a free-form string such as `local` or `production`.
///
/// Only exact equality with [`LOCAL_MODE`] has meaning to the orchestrator;
/// any other value, including an unset mode, behaves the same.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentMode(Option<String>);

impl DeploymentMode {
    pub fn new(value: Option<String>) -> Self {
        Self(value)
    }

    pub fn unset() -> Self {
        Self(None)
    }

    pub fn local() -> Self {
        Self(Some(LOCAL_MODE.to_string()))
    }

    pub fn as_str(&self) -> Option<&str> {
        self.0.as_deref()
    }

    /// True iff the mode is exactly `local` (case-sensitive, no trimming).
    pub fn is_local(&self) -> bool {
        self.0.as_deref() == Some(LOCAL_MODE)
    }
}

impl From<&str> for DeploymentMode {
    fn from(s: &str) -> Self {
        Self(Some(s.to_string()))
    }
}

impl fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(mode) => write!(f, "{}", mode),
            None => write!(f, "<unset>"),
        }
    }
}
