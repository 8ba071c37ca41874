//! # devstack process
//!
//! Low-level process operations used by the orchestrator.
//!
//! This crate provides cross-platform primitives for:
//! - Building and spawning child processes
//! - Process existence checks
//! - Graceful termination and force kill
//! - Validation of launch parameters

pub mod check;
pub mod execute;
pub mod terminate;
pub mod validation;

#[cfg(windows)]
pub mod terminate_windows;

// Re-export main types
pub use check::*;
pub use execute::*;
pub use terminate::*;
pub use validation::*;
