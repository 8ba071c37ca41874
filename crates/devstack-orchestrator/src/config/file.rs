//! YAML configuration file.
//!
//! Every field is optional; whatever is present overrides the built-in
//! defaults. Durations use the `"10s"`, `"500ms"`, `"1m"` format.
//!
//! ```yaml
//! mode: local
//! virtualenv: .venv
//! database:
//!   name: shop
//! services:
//!   web-server:
//!     port: 8080
//!     readiness_timeout: 30s
//!   scheduler:
//!     enabled: true
//! ```

use super::{DatabaseClientConfig, LogRelayConfig, OrchestratorConfig, PortPolicy};
use anyhow::{anyhow, Context, Result};
use devstack_common::DeploymentMode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,

    /// Set to an empty string to disable activation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtualenv: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<DatabaseOverride>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_collection: Option<LogRelayConfig>,

    #[serde(default)]
    pub services: BTreeMap<String, ServiceOverride>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<DatabaseClientConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_policy: Option<PortPolicy>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "option_duration_serde"
    )]
    pub readiness_timeout: Option<Duration>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "option_duration_serde"
    )]
    pub settle_time: Option<Duration>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "option_duration_serde"
    )]
    pub graceful_timeout: Option<Duration>,
}

impl ConfigFile {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        Self::load_from_string(&content)
    }

    pub fn load_from_string(content: &str) -> Result<Self> {
        // An empty document parses as unit, not as an empty map.
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).context("Failed to parse YAML configuration")
    }

    /// Overlay this file onto `config`.
    pub fn apply_to(self, config: &mut OrchestratorConfig) -> Result<()> {
        if let Some(mode) = self.mode {
            config.mode = DeploymentMode::new(Some(mode));
        }

        if let Some(venv) = self.virtualenv {
            config.environment.virtualenv = if venv.is_empty() {
                None
            } else {
                Some(PathBuf::from(venv))
            };
        }

        if let Some(db) = self.database {
            if let Some(enabled) = db.enabled {
                config.database.enabled = enabled;
            }
            if let Some(name) = db.name {
                config.database.name = name;
            }
            if let Some(required) = db.required {
                config.database.required = required;
            }
            if let Some(client) = db.client {
                config.database.client = client;
            }
        }

        if let Some(log_collection) = self.log_collection {
            config.log_relay = log_collection;
        }

        for (name, o) in self.services {
            let service = config
                .service_mut(&name)
                .ok_or_else(|| anyhow!("Unknown service in configuration: {}", name))?;

            if let Some(v) = o.enabled {
                service.enabled = v;
            }
            if let Some(v) = o.required {
                service.required = v;
            }
            if let Some(v) = o.program {
                service.program = v;
            }
            if let Some(v) = o.args {
                service.args = v;
            }
            if let Some(v) = o.env {
                service.env.extend(v);
            }
            if let Some(v) = o.working_directory {
                service.working_directory = Some(v);
            }
            if let Some(v) = o.port {
                service.port = Some(v);
            }
            if let Some(v) = o.port_policy {
                service.port_policy = v;
            }
            if let Some(v) = o.readiness_timeout {
                service.readiness_timeout = v;
            }
            if let Some(v) = o.settle_time {
                service.settle_time = v;
            }
            if let Some(v) = o.graceful_timeout {
                service.graceful_timeout = v;
            }
        }

        Ok(())
    }
}

mod duration_serde {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    pub(super) fn parse_duration(s: &str) -> Result<Duration, String> {
        let invalid = || format!("Invalid duration: {}", s);
        // "ms" before "s": both end with 's'
        if let Some(num) = s.strip_suffix("ms") {
            num.trim().parse().map(Duration::from_millis).map_err(|_| invalid())
        } else if let Some(num) = s.strip_suffix('s') {
            num.trim().parse().map(Duration::from_secs).map_err(|_| invalid())
        } else if let Some(num) = s.strip_suffix('m') {
            num.trim()
                .parse::<u64>()
                .map(|mins| Duration::from_secs(mins * 60))
                .map_err(|_| invalid())
        } else {
            Err(format!("Duration must end with 's', 'ms', or 'm': {}", s))
        }
    }
}

mod option_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => super::duration_serde::serialize(d, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt: Option<String> = Option::deserialize(deserializer)?;
        opt.map(|s| super::duration_serde::parse_duration(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
