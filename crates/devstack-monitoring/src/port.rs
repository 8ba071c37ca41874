//! TCP port probing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::trace;

/// Upper bound on a single connection attempt.
pub const PROBE_CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

/// Outcome of one probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortProbe {
    pub port: u16,
    pub is_listening: bool,
    pub checked_at: DateTime<Utc>,
    pub response_time_ms: u64,
    pub error_message: Option<String>,
}

/// Try to open a TCP connection to `localhost:port` and drop it immediately.
///
/// Refusals and timeouts are reported as "not listening", never as errors.
pub async fn probe_port(port: u16) -> PortProbe {
    let start = Instant::now();

    let (is_listening, error_message) =
        match timeout(PROBE_CONNECT_TIMEOUT, TcpStream::connect(("localhost", port))).await {
            Ok(Ok(stream)) => {
                drop(stream);
                (true, None)
            }
            Ok(Err(e)) => (false, Some(e.to_string())),
            Err(_) => (
                false,
                Some(format!("connect timed out after {:?}", PROBE_CONNECT_TIMEOUT)),
            ),
        };

    let probe = PortProbe {
        port,
        is_listening,
        checked_at: Utc::now(),
        response_time_ms: start.elapsed().as_millis() as u64,
        error_message,
    };
    trace!(port, listening = probe.is_listening, "Port probed");
    probe
}

/// True iff something accepts connections on `localhost:port`.
pub async fn is_service_running(port: u16) -> bool {
    probe_port(port).await.is_listening
}
