//! Ownership of one spawned child.

use devstack_common::{ProcessError, ProcessResult, ServiceName};
use devstack_log_collection::{LogCollectionService, StreamType};
use std::time::Duration;
use tokio::process::Child;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// How long to wait for the exit after a forced kill.
pub const FORCE_KILL_TIMEOUT: Duration = Duration::from_secs(3);

/// How a child ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitRecord {
    pub success: bool,
    pub code: Option<i32>,
    pub description: String,
}

impl ExitRecord {
    fn from_status(status: std::process::ExitStatus) -> Self {
        Self {
            success: status.success(),
            code: status.code(),
            description: status.to_string(),
        }
    }

    fn lost(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            code: None,
            description: reason.into(),
        }
    }
}

/// How a stop request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    /// The child was already gone when the stop was requested.
    AlreadyExited(ExitRecord),
    Graceful(ExitRecord),
    Forced(ExitRecord),
}

/// A spawned child plus the task that reaps it.
///
/// The exit monitor owns the [`Child`]; everything else addresses the
/// process by PID and learns about its exit through a watch channel.
#[derive(Debug)]
pub struct ServiceHandle {
    service: ServiceName,
    pid: u32,
    exit_rx: watch::Receiver<Option<ExitRecord>>,
    termination_requests: u32,
    force_killed: bool,
}

impl ServiceHandle {
    /// Take ownership of `child`: relay its output into `logs` and start reaping it.
    pub fn new(
        service: ServiceName,
        mut child: Child,
        logs: &LogCollectionService,
    ) -> ProcessResult<Self> {
        let pid = child
            .id()
            .ok_or_else(|| ProcessError::spawn_failed(service.as_str(), "child exited before its PID was read"))?;

        if let Some(stdout) = child.stdout.take() {
            logs.collect_from_stream(service.as_str(), stdout, StreamType::Stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            logs.collect_from_stream(service.as_str(), stderr, StreamType::Stderr);
        }

        let (exit_tx, exit_rx) = watch::channel(None);
        let monitor_service = service.clone();
        tokio::spawn(async move {
            let record = match child.wait().await {
                Ok(status) => {
                    debug!(service = %monitor_service, pid, %status, "Process reaped");
                    ExitRecord::from_status(status)
                }
                Err(e) => {
                    error!(service = %monitor_service, pid, error = %e, "Failed to wait for process");
                    ExitRecord::lost(format!("wait failed: {}", e))
                }
            };
            exit_tx.send_replace(Some(record));
        });

        Ok(Self {
            service,
            pid,
            exit_rx,
            termination_requests: 0,
            force_killed: false,
        })
    }

    pub fn service(&self) -> &ServiceName {
        &self.service
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Number of graceful termination requests sent.
    pub fn termination_requests(&self) -> u32 {
        self.termination_requests
    }

    pub fn force_killed(&self) -> bool {
        self.force_killed
    }

    /// The exit, if the child has been reaped.
    pub fn exit_record(&self) -> Option<ExitRecord> {
        self.exit_rx.borrow().clone()
    }

    /// A receiver that sees the exit once it happens.
    pub fn exit_receiver(&self) -> watch::Receiver<Option<ExitRecord>> {
        self.exit_rx.clone()
    }

    /// Wait until the child is reaped.
    pub async fn wait_for_exit(&self) -> ExitRecord {
        wait_for_exit(self.exit_receiver(), self.pid).await
    }

    /// Stop the child: one termination request, then a forced kill after `graceful_timeout`.
    ///
    /// Returns once the child is reaped; errors if it survives the forced kill too.
    pub async fn stop(&mut self, graceful_timeout: Duration) -> ProcessResult<StopOutcome> {
        if let Some(record) = self.exit_record() {
            debug!(service = %self.service, "Process already exited");
            return Ok(StopOutcome::AlreadyExited(record));
        }

        info!(service = %self.service, pid = self.pid, "Sending termination request");
        self.termination_requests += 1;
        if let Err(e) = devstack_process::terminate_gracefully(self.pid) {
            warn!(service = %self.service, pid = self.pid, error = %e, "Termination request failed");
        }

        if let Ok(record) = timeout(graceful_timeout, self.wait_for_exit()).await {
            info!(service = %self.service, status = %record.description, "Process stopped");
            return Ok(StopOutcome::Graceful(record));
        }

        warn!(
            service = %self.service,
            pid = self.pid,
            "Did not exit within {:?}, force killing",
            graceful_timeout
        );
        self.force_killed = true;
        if let Err(e) = devstack_process::force_kill(self.pid) {
            error!(service = %self.service, pid = self.pid, error = %e, "Force kill failed");
        }

        if let Ok(record) = timeout(FORCE_KILL_TIMEOUT, self.wait_for_exit()).await {
            info!(service = %self.service, status = %record.description, "Process killed");
            return Ok(StopOutcome::Forced(record));
        }

        Err(ProcessError::timeout(
            self.service.as_str(),
            format!(
                "stop (did not exit after graceful timeout {:?} + force-kill timeout {:?})",
                graceful_timeout, FORCE_KILL_TIMEOUT
            ),
        ))
    }
}

/// Wait on an exit channel. If the monitor vanished without reporting,
/// fall back to polling the PID.
pub(crate) async fn wait_for_exit(
    mut exit_rx: watch::Receiver<Option<ExitRecord>>,
    pid: u32,
) -> ExitRecord {
    if let Ok(record) = exit_rx.wait_for(Option::is_some).await {
        if let Some(ref record) = *record {
            return record.clone();
        }
    }

    loop {
        match devstack_process::process_exists(pid) {
            Ok(true) => tokio::time::sleep(Duration::from_millis(100)).await,
            Ok(false) => return ExitRecord::lost("exit monitor lost; process is gone"),
            Err(e) => return ExitRecord::lost(format!("exit monitor lost: {}", e)),
        }
    }
}
