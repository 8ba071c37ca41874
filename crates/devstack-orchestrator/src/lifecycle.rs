//! Startup ordering.

use crate::config::OrchestratorConfig;
use devstack_common::{names, ServiceName};
use std::fmt;

/// One step of the startup sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupStep {
    ActivateEnvironment,
    EnsureCache,
    EnsureDatabase,
    StartService(ServiceName),
}

impl fmt::Display for StartupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartupStep::ActivateEnvironment => write!(f, "activate environment"),
            StartupStep::EnsureCache => write!(f, "ensure cache"),
            StartupStep::EnsureDatabase => write!(f, "ensure database"),
            StartupStep::StartService(name) => write!(f, "start {}", name),
        }
    }
}

/// The ordered steps for `config`.
///
/// Each step begins only after the previous one is ready (or, for an
/// optional service, has failed). The scheduler is included only when
/// enabled and mail capture only in `local` mode.
pub fn startup_plan(config: &OrchestratorConfig) -> Vec<StartupStep> {
    let mut plan = vec![StartupStep::ActivateEnvironment, StartupStep::EnsureCache];

    if config.database.enabled {
        plan.push(StartupStep::EnsureDatabase);
    }

    plan.extend(
        config
            .planned_services()
            .filter(|s| s.name.as_str() != names::CACHE)
            .map(|s| StartupStep::StartService(s.name.clone())),
    );

    plan
}
