//! Orchestrator configuration.
//!
//! Everything the orchestrator needs is resolved once into an
//! [`OrchestratorConfig`]: built-in defaults, then the optional YAML file,
//! then the process environment captured in an [`EnvSnapshot`], then CLI
//! overrides. Nothing downstream reads the process environment again.

mod file;
pub mod validation;

pub use file::{ConfigFile, DatabaseOverride, ServiceOverride};

use anyhow::{Context, Result};
use devstack_common::{names, DeploymentMode, ServiceName};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "devstack.yaml";

/// How a service reacts when its port is already bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortPolicy {
    /// Treat the existing listener as a compatible, already running instance.
    Adopt,
    /// Ask the operator for a replacement port.
    Negotiate,
}

/// One managed service.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub name: ServiceName,
    pub enabled: bool,
    /// Failure aborts startup when set; otherwise it is logged and startup continues.
    pub required: bool,
    pub program: String,
    /// May contain `{port}`, replaced with the port finally used.
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub working_directory: Option<PathBuf>,
    pub port: Option<u16>,
    pub port_policy: PortPolicy,
    pub readiness_timeout: Duration,
    /// Portless services count as ready once alive for this long.
    pub settle_time: Duration,
    pub graceful_timeout: Duration,
}

impl ServiceConfig {
    fn new(name: &str, program: &str, args: &[&str]) -> Self {
        Self {
            name: ServiceName::from(name),
            enabled: true,
            required: false,
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            env: BTreeMap::new(),
            working_directory: None,
            port: None,
            port_policy: PortPolicy::Negotiate,
            readiness_timeout: Duration::from_secs(20),
            settle_time: Duration::from_secs(1),
            graceful_timeout: Duration::from_secs(10),
        }
    }

    fn with_port(mut self, port: u16, policy: PortPolicy) -> Self {
        self.port = Some(port);
        self.port_policy = policy;
        self
    }

    /// Arguments with `{port}` replaced.
    pub fn resolved_args(&self, port: Option<u16>) -> Vec<String> {
        match port {
            Some(port) => {
                let port = port.to_string();
                self.args.iter().map(|a| a.replace("{port}", &port)).collect()
            }
            None => self.args.clone(),
        }
    }
}

/// How database listing and creation commands are run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseClientConfig {
    pub program: String,
    /// Connection arguments placed before the query arguments.
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for DatabaseClientConfig {
    fn default() -> Self {
        Self {
            program: "psql".to_string(),
            args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub enabled: bool,
    pub name: String,
    pub required: bool,
    pub client: DatabaseClientConfig,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            name: "app".to_string(),
            required: false,
            client: DatabaseClientConfig::default(),
        }
    }
}

/// Runtime environment handed to children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentConfig {
    /// Virtual environment directory whose executables go first on `PATH`.
    pub virtualenv: Option<PathBuf>,
    /// `PATH` as captured at startup.
    pub base_path: Option<String>,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            virtualenv: Some(PathBuf::from("venv")),
            base_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRelayConfig {
    #[serde(default = "default_true")]
    pub capture_stdout: bool,
    #[serde(default = "default_true")]
    pub capture_stderr: bool,
}

impl Default for LogRelayConfig {
    fn default() -> Self {
        Self {
            capture_stdout: true,
            capture_stderr: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Process environment values read once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSnapshot {
    pub environment: Option<String>,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub path: Option<String>,
}

impl EnvSnapshot {
    pub fn capture() -> Self {
        let read = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());
        Self {
            environment: read("ENVIRONMENT"),
            database_url: read("DATABASE_URL"),
            redis_url: read("REDIS_URL"),
            path: read("PATH"),
        }
    }
}

/// Fully resolved configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    pub mode: DeploymentMode,
    pub environment: EnvironmentConfig,
    pub database: DatabaseConfig,
    pub log_relay: LogRelayConfig,
    /// In startup order.
    pub services: Vec<ServiceConfig>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        let celery = ["-A", "src.celery_tasks.celery_app"];
        let with_celery = |rest: &[&'static str]| -> Vec<&'static str> {
            celery.iter().chain(rest.iter()).copied().collect()
        };

        let mut cache = ServiceConfig::new(names::CACHE, "redis-server", &["--port", "{port}"])
            .with_port(6379, PortPolicy::Adopt);
        cache.required = true;
        cache.readiness_timeout = Duration::from_secs(10);

        let worker = ServiceConfig::new(
            names::WORKER,
            "celery",
            &with_celery(&["worker", "--loglevel=info"]),
        );

        let worker_monitor = ServiceConfig::new(
            names::WORKER_MONITOR,
            "celery",
            &with_celery(&["flower", "--port={port}"]),
        )
        .with_port(5555, PortPolicy::Negotiate);

        let mut scheduler = ServiceConfig::new(
            names::SCHEDULER,
            "celery",
            &with_celery(&["beat", "--loglevel=info"]),
        );
        scheduler.enabled = false;

        let web_server = ServiceConfig::new(
            names::WEB_SERVER,
            "uvicorn",
            &["src:app", "--reload", "--port", "{port}"],
        )
        .with_port(8000, PortPolicy::Negotiate);

        let mut mail_capture = ServiceConfig::new(
            names::MAIL_CAPTURE,
            "mailpit",
            &[
                "--smtp",
                "127.0.0.1:{port}",
                "--smtp-auth-accept-any",
                "--smtp-auth-allow-insecure",
            ],
        )
        .with_port(1025, PortPolicy::Negotiate);
        mail_capture.readiness_timeout = Duration::from_secs(10);

        Self {
            mode: DeploymentMode::unset(),
            environment: EnvironmentConfig::default(),
            database: DatabaseConfig::default(),
            log_relay: LogRelayConfig::default(),
            services: vec![
                cache,
                worker,
                worker_monitor,
                scheduler,
                web_server,
                mail_capture,
            ],
        }
    }
}

impl OrchestratorConfig {
    /// Resolve configuration: defaults, then `file`, then `env`, then `cli_mode`.
    pub fn resolve(
        file: Option<ConfigFile>,
        env: &EnvSnapshot,
        cli_mode: Option<String>,
    ) -> Result<Self> {
        let mut config = Self::default();

        if let Some(file) = file {
            file.apply_to(&mut config)?;
        }

        if let Some(ref environment) = env.environment {
            config.mode = DeploymentMode::from(environment.as_str());
        }
        if let Some(mode) = cli_mode {
            config.mode = DeploymentMode::new(Some(mode));
        }

        if let Some(ref url) = env.redis_url {
            if let Some(port) = port_from_url(url) {
                if let Some(cache) = config.service_mut(names::CACHE) {
                    cache.port = Some(port);
                }
            }
        }

        if let Some(ref url) = env.database_url {
            match database_name_from_url(url) {
                Some(name) => config.database.name = name,
                None => tracing::warn!(
                    "DATABASE_URL has no database name; using '{}'",
                    config.database.name
                ),
            }
            // Explicit client arguments win over the application's URL.
            if config.database.client.args.is_empty() {
                match maintenance_url(url) {
                    Some(conninfo) => {
                        config.database.client.args = vec!["-d".to_string(), conninfo]
                    }
                    None => tracing::warn!(
                        "DATABASE_URL names no PostgreSQL server; using the client's default connection"
                    ),
                }
            }
        }

        config.environment.base_path = env.path.clone();

        config.validate()?;
        Ok(config)
    }

    /// Load the YAML file at `path` and resolve against `env`.
    pub fn load_from_file<P: AsRef<Path>>(
        path: P,
        env: &EnvSnapshot,
        cli_mode: Option<String>,
    ) -> Result<Self> {
        let file = ConfigFile::load_from_file(path)?;
        Self::resolve(Some(file), env, cli_mode)
    }

    /// Resolve from `path` if given, else from `devstack.yaml` when present, else defaults only.
    pub fn load(
        path: Option<&Path>,
        env: &EnvSnapshot,
        cli_mode: Option<String>,
    ) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_file(path, env, cli_mode)
                .with_context(|| format!("Invalid configuration in {}", path.display())),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::load_from_file(DEFAULT_CONFIG_FILE, env, cli_mode)
            }
            None => Self::resolve(None, env, cli_mode),
        }
    }

    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }

    pub fn service(&self, name: &str) -> Option<&ServiceConfig> {
        self.services.iter().find(|s| s.name.as_str() == name)
    }

    pub fn service_mut(&mut self, name: &str) -> Option<&mut ServiceConfig> {
        self.services.iter_mut().find(|s| s.name.as_str() == name)
    }

    /// Services that will actually be started, in order.
    pub fn planned_services(&self) -> impl Iterator<Item = &ServiceConfig> {
        self.services.iter().filter(|s| {
            s.enabled && (s.name.as_str() != names::MAIL_CAPTURE || self.mode.is_local())
        })
    }
}

/// Last path segment of a database URL, without query string.
///
/// `postgresql://user:pw@localhost:5432/shop?sslmode=disable` gives `shop`.
pub fn database_name_from_url(url: &str) -> Option<String> {
    let rest = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    let (_, path) = rest.split_once('/')?;
    let path = path.split(['?', '#']).next().unwrap_or_default();
    path.rsplit('/')
        .find(|segment| !segment.is_empty())
        .map(str::to_string)
}

/// Connection string for the server's `postgres` database, derived from the
/// application's URL so listing and creation reach the same server as the
/// same user.
///
/// `postgresql+asyncpg://u:pw@db:5432/shop?sslmode=disable` gives
/// `postgresql://u:pw@db:5432/postgres?sslmode=disable`.
pub fn maintenance_url(url: &str) -> Option<String> {
    let (scheme, rest) = url.split_once("://")?;
    let scheme = scheme.split('+').next().unwrap_or(scheme);
    if scheme != "postgresql" && scheme != "postgres" {
        return None;
    }

    let authority_end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let (authority, tail) = rest.split_at(authority_end);
    if authority.is_empty() {
        return None;
    }
    let tail = tail.split('#').next().unwrap_or_default();
    let query = tail.find('?').map(|i| &tail[i..]).unwrap_or_default();

    Some(format!("{}://{}/postgres{}", scheme, authority, query))
}

/// Port component of a URL such as `redis://:secret@localhost:6380/0`.
pub fn port_from_url(url: &str) -> Option<u16> {
    let rest = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    let authority = rest.split(['/', '?', '#']).next()?;
    let host_port = authority.rsplit_once('@').map(|(_, hp)| hp).unwrap_or(authority);
    let (host, port) = host_port.rsplit_once(':')?;
    if host.ends_with(']') || !host.contains('[') {
        port.parse().ok()
    } else {
        None
    }
}
