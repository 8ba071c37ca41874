//! # devstack log collection
//!
//! Relays the stdout/stderr of managed services into the orchestrator's
//! structured log, one event per line, tagged with the service name and
//! stream.

pub mod service;
pub mod types;

pub use service::LogCollectionService;
pub use types::{LogCollectionConfig, ServiceLogStatus, StreamType};
