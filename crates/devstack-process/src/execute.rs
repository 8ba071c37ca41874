//! Process spawning.
//!
//! Children are placed in their own process group so that a Ctrl+C typed
//! in the orchestrator's terminal reaches only the orchestrator. Teardown of
//! children is then driven explicitly by the supervisor.

use devstack_common::{ProcessError, ProcessResult};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::debug;

/// What to do with a child's stdout/stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Pipe both streams so they can be relayed into the orchestrator's logs.
    Capture,
    /// Let the child write straight to the orchestrator's terminal.
    Inherit,
}

/// Fully resolved launch parameters for one child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub working_directory: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            working_directory: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Program and arguments joined for log output.
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }

    /// Build a tokio command for this spec.
    pub fn to_command(&self, output: OutputMode) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.envs(&self.env);

        if let Some(ref wd) = self.working_directory {
            cmd.current_dir(wd);
        }

        let (stdout, stderr) = match output {
            OutputMode::Capture => (Stdio::piped(), Stdio::piped()),
            OutputMode::Inherit => (Stdio::inherit(), Stdio::inherit()),
        };
        cmd.stdout(stdout).stderr(stderr).stdin(Stdio::null());

        #[cfg(unix)]
        {
            cmd.process_group(0);
        }

        #[cfg(windows)]
        {
            const CREATE_NEW_PROCESS_GROUP: u32 = 0x00000200;
            cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);
        }

        cmd
    }
}

/// Spawn a child for `service` from the given spec.
pub fn spawn(service: &str, spec: &CommandSpec, output: OutputMode) -> ProcessResult<Child> {
    debug!(service, command = %spec.display(), "Spawning process");
    spec.to_command(output)
        .spawn()
        .map_err(|e| ProcessError::spawn_failed(service, format!("{}: {}", spec.program, e)))
}
