//! # devstack orchestrator
//!
//! Brings up the processes a web application needs for local development,
//! in dependency order, and tears down everything it started.
//!
//! - [`config`]: configuration resolved once from defaults, YAML and environment
//! - [`environment`]: virtual environment activation for children
//! - [`ports`]: port negotiation with the operator
//! - [`database`]: database provisioning
//! - [`lifecycle`]: startup ordering
//! - [`supervisor`]: ownership and teardown of spawned children
//! - [`orchestrator`]: the sequence itself

pub mod config;
pub mod database;
pub mod environment;
pub mod lifecycle;
pub mod orchestrator;
pub mod ports;
pub mod supervisor;

pub use config::{EnvSnapshot, OrchestratorConfig, PortPolicy, ServiceConfig};
pub use database::{CommandDatabaseClient, DatabaseClient, DatabaseOutcome};
pub use lifecycle::{startup_plan, StartupStep};
pub use orchestrator::Orchestrator;
pub use ports::{
    get_available_port, NonInteractivePrompt, PortPrompt, ScriptedPrompt, TerminalPrompt,
};
pub use supervisor::{ServiceReport, ShutdownReport, WaitOutcome};
