//! Validation of launch parameters.

use devstack_common::{ProcessError, ProcessResult};

/// Validate a service name: non-empty, at most 64 characters,
/// alphanumerics plus `-` and `_`.
pub fn validate_service_name(name: &str) -> ProcessResult<()> {
    if name.is_empty() {
        return Err(ProcessError::configuration(
            "validation",
            "Service name cannot be empty",
        ));
    }

    if name.len() > 64 {
        return Err(ProcessError::configuration(
            name,
            "Service name too long (max 64 characters)",
        ));
    }

    if !name.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_') {
        return Err(ProcessError::configuration(
            name,
            "Service name can only contain alphanumeric characters, hyphens, and underscores",
        ));
    }

    Ok(())
}

/// Validate that a program to launch was given.
///
/// Whether the program is actually on `PATH` is only known at spawn time,
/// after the runtime environment has been activated.
pub fn validate_program(service: &str, program: &str) -> ProcessResult<()> {
    if program.trim().is_empty() {
        return Err(ProcessError::configuration(
            service,
            "Program to launch cannot be empty",
        ));
    }
    Ok(())
}
