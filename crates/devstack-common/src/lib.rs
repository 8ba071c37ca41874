//! # devstack common
//!
//! Error types and small domain types shared by every devstack crate.
//!
//! Everything above the OS layer reports failures through [`Error`];
//! low-level process primitives use [`ProcessError`], which converts into
//! [`Error`] with `?`.

pub mod errors;
pub mod types;

// Re-export commonly used items
pub use errors::{Error, ProcessError, ProcessResult, Result};
pub use types::{names, DeploymentMode, ServiceName, LOCAL_MODE};
