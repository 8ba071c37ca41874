//! Bounded readiness polling.
//!
//! A service is polled with exponential backoff until it answers, the
//! overall timeout elapses, or the cancellation token fires.

use crate::port::is_service_running;
use crate::{ProbeError, ProbeResult};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Polling parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadinessConfig {
    pub timeout: Duration,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub multiplier: f64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }
}

impl ReadinessConfig {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    pub fn backoff(&self) -> Backoff {
        Backoff::new(self.initial_interval, self.max_interval, self.multiplier)
    }
}

/// Exponential backoff delays: `initial * multiplier^n`, capped at `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    max: Duration,
    multiplier: f64,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration, multiplier: f64) -> Self {
        Self {
            next: initial.min(max),
            max,
            multiplier,
        }
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let current = self.next;
        let grown = self.next.as_secs_f64() * self.multiplier;
        self.next = Duration::from_secs_f64(grown.min(self.max.as_secs_f64()));
        Some(current)
    }
}

/// Result of a single readiness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Ready,
    Pending,
    /// Stop polling; the service can no longer become ready.
    Abort(String),
}

/// Run `check` until it reports ready, aborts, the timeout elapses, or `cancel` fires.
///
/// Returns the number of attempts it took.
pub async fn poll_with_backoff<F, Fut>(
    config: &ReadinessConfig,
    cancel: &CancellationToken,
    mut check: F,
) -> ProbeResult<u32>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ProbeOutcome>,
{
    let started = Instant::now();
    let deadline = started + config.timeout;
    let mut delays = config.backoff();
    let mut attempts = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(ProbeError::Cancelled);
        }

        attempts += 1;
        match check().await {
            ProbeOutcome::Ready => return Ok(attempts),
            ProbeOutcome::Abort(reason) => return Err(ProbeError::Exited { reason, attempts }),
            ProbeOutcome::Pending => {}
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(ProbeError::NotReady {
                attempts,
                waited: now - started,
            });
        }

        let delay = delays
            .next()
            .unwrap_or(config.max_interval)
            .min(deadline - now);
        debug!(attempt = attempts, ?delay, "Not ready yet, backing off");

        tokio::select! {
            _ = cancel.cancelled() => return Err(ProbeError::Cancelled),
            _ = sleep(delay) => {}
        }
    }
}

/// Wait until something listens on `port`.
pub async fn wait_until_ready(
    port: u16,
    config: &ReadinessConfig,
    cancel: &CancellationToken,
) -> ProbeResult<u32> {
    poll_with_backoff(config, cancel, || async move {
        if is_service_running(port).await {
            ProbeOutcome::Ready
        } else {
            ProbeOutcome::Pending
        }
    })
    .await
}

/// Readiness for portless services: the process must stay up for the whole settle window.
///
/// `exited` returns the exit description once the process is gone.
pub async fn wait_until_alive<F>(
    settle: Duration,
    cancel: &CancellationToken,
    mut exited: F,
) -> ProbeResult<()>
where
    F: FnMut() -> Option<String>,
{
    const CHECK_INTERVAL: Duration = Duration::from_millis(100);
    let deadline = Instant::now() + settle;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        if let Some(reason) = exited() {
            return Err(ProbeError::Exited { reason, attempts });
        }

        let now = Instant::now();
        if now >= deadline {
            return Ok(());
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(ProbeError::Cancelled),
            _ = sleep(CHECK_INTERVAL.min(deadline - now)) => {}
        }
    }
}
