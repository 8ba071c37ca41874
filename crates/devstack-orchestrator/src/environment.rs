//! Runtime environment activation.
//!
//! Activating a virtual environment only changes what children see: its
//! executables directory goes first on their `PATH` and `VIRTUAL_ENV` names
//! it. The orchestrator's own environment is left untouched.

use crate::config::EnvironmentConfig;
use devstack_process::CommandSpec;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[cfg(windows)]
const EXECUTABLES_DIR: &str = "Scripts";
#[cfg(not(windows))]
const EXECUTABLES_DIR: &str = "bin";

/// Variables added to every child's environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivatedEnvironment {
    vars: BTreeMap<String, String>,
}

impl ActivatedEnvironment {
    /// Nothing activated.
    pub fn inactive() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.vars.contains_key("VIRTUAL_ENV")
    }

    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }

    /// Add the activated variables to `spec`; the service's own settings win.
    pub fn apply(&self, spec: &mut CommandSpec) {
        for (key, value) in &self.vars {
            spec.env
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }
}

/// Activate the configured virtual environment, if any.
///
/// A missing directory is reported and startup continues with the
/// inherited `PATH`.
pub fn activate_environment(config: &EnvironmentConfig) -> ActivatedEnvironment {
    let Some(ref venv) = config.virtualenv else {
        return ActivatedEnvironment::inactive();
    };

    let executables = venv.join(EXECUTABLES_DIR);
    if !executables.is_dir() {
        warn!(
            virtualenv = %venv.display(),
            "Virtual environment not found; using the inherited PATH"
        );
        return ActivatedEnvironment::inactive();
    }

    let root = absolute(venv);
    let executables = root.join(EXECUTABLES_DIR);

    let mut entries = vec![executables.clone()];
    if let Some(ref base) = config.base_path {
        entries.extend(std::env::split_paths(base));
    }

    let mut vars = BTreeMap::new();
    match std::env::join_paths(entries) {
        Ok(path) => {
            vars.insert("PATH".to_string(), path.to_string_lossy().into_owned());
        }
        Err(e) => {
            warn!(error = %e, "Cannot build PATH for the virtual environment");
            return ActivatedEnvironment::inactive();
        }
    }
    vars.insert(
        "VIRTUAL_ENV".to_string(),
        root.to_string_lossy().into_owned(),
    );

    info!(virtualenv = %root.display(), "Virtual environment activated");
    ActivatedEnvironment { vars }
}

fn absolute(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
