//! Assertions over orchestrator state for E2E tests

use devstack_orchestrator::{Orchestrator, ServiceReport};
use devstack_process_state::ServiceState;

fn report(orch: &Orchestrator, service: &str) -> Result<ServiceReport, String> {
    orch.service(service)
        .ok_or_else(|| format!("Unknown service '{}'", service))
}

/// Assert that a service is in `expected`
pub fn assert_state(orch: &Orchestrator, service: &str, expected: ServiceState) -> Result<(), String> {
    let r = report(orch, service)?;
    if r.state == expected {
        Ok(())
    } else {
        Err(format!(
            "Service '{}' is {} but expected {}. Report: {:?}",
            service, r.state, expected, r
        ))
    }
}

/// Assert that a service was spawned by us and is running
pub fn assert_running(orch: &Orchestrator, service: &str) -> Result<(), String> {
    assert_state(orch, service, ServiceState::Running)?;
    match report(orch, service)?.pid {
        Some(_) => Ok(()),
        None => Err(format!("Service '{}' is running but has no PID", service)),
    }
}

/// Assert that nothing was ever attempted for a service
pub fn assert_never_started(orch: &Orchestrator, service: &str) -> Result<(), String> {
    assert_state(orch, service, ServiceState::Declared)?;
    match report(orch, service)?.pid {
        None => Ok(()),
        Some(pid) => Err(format!("Service '{}' was spawned as PID {}", service, pid)),
    }
}

/// Assert that shutdown sent exactly one termination request
pub fn assert_terminated_once(orch: &Orchestrator, service: &str) -> Result<(), String> {
    let r = report(orch, service)?;
    if r.termination_requests == 1 {
        Ok(())
    } else {
        Err(format!(
            "Service '{}' got {} termination requests, expected 1",
            service, r.termination_requests
        ))
    }
}

/// Assert that the port answers (or not)
pub async fn assert_port_listening(port: u16, expected: bool) -> Result<(), String> {
    let listening = devstack_monitoring::is_service_running(port).await;
    if listening == expected {
        Ok(())
    } else {
        Err(format!(
            "Port {} listening={} but expected {}",
            port, listening, expected
        ))
    }
}
