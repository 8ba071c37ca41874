//! Log relay service implementation

use crate::types::{LogCollectionConfig, ServiceLogStatus, StreamType};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How long a reader may keep draining after its service has exited.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Relays child output into tracing events.
pub struct LogCollectionService {
    config: LogCollectionConfig,
    collectors: RwLock<HashMap<String, Arc<ServiceCollector>>>,
    total_lines: Arc<AtomicI64>,
    cancel_token: CancellationToken,
}

impl std::fmt::Debug for LogCollectionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogCollectionService")
            .field("config", &self.config)
            .field("services", &self.collectors.read().len())
            .field("total_lines", &self.total_lines.load(Ordering::SeqCst))
            .finish()
    }
}

impl LogCollectionService {
    /// Create a relay whose readers stop when `cancel_token` fires.
    pub fn new(config: LogCollectionConfig, cancel_token: CancellationToken) -> Self {
        Self {
            config,
            collectors: RwLock::new(HashMap::new()),
            total_lines: Arc::new(AtomicI64::new(0)),
            cancel_token,
        }
    }

    /// Start relaying `stream` for `service`. Returns immediately; reading happens on a task.
    pub fn collect_from_stream(
        &self,
        service: &str,
        stream: impl AsyncRead + Unpin + Send + 'static,
        stream_type: StreamType,
    ) {
        if !self.config.captures(stream_type) {
            return;
        }

        let collector = self
            .collectors
            .write()
            .entry(service.to_string())
            .or_insert_with(|| Arc::new(ServiceCollector::new(service)))
            .clone();

        let total_lines = Arc::clone(&self.total_lines);
        let cancel_token = self.cancel_token.child_token();
        let reader = Arc::clone(&collector);
        collector.active.fetch_add(1, Ordering::SeqCst);

        let task = tokio::spawn(async move {
            reader
                .stream_reader(stream, stream_type, total_lines, cancel_token)
                .await;
        });
        collector.tasks.write().push(task);
    }

    /// Wait for the readers of `service` to reach end of stream.
    pub async fn finish_service(&self, service: &str) {
        let collector = self.collectors.read().get(service).cloned();
        if let Some(collector) = collector {
            collector.join(DRAIN_TIMEOUT).await;
        }
    }

    /// Stop every reader and wait for them to return.
    pub async fn shutdown(&self) {
        self.cancel_token.cancel();
        let collectors: Vec<_> = self.collectors.read().values().cloned().collect();
        for collector in collectors {
            collector.join(DRAIN_TIMEOUT).await;
        }
        debug!(
            total_lines = self.total_lines.load(Ordering::SeqCst),
            "Log collection stopped"
        );
    }

    pub fn status(&self, service: &str) -> Option<ServiceLogStatus> {
        self.collectors.read().get(service).map(|c| c.status())
    }

    pub fn total_lines(&self) -> i64 {
        self.total_lines.load(Ordering::SeqCst)
    }
}

/// Per-service reader bookkeeping.
struct ServiceCollector {
    service: String,
    active: AtomicUsize,
    lines_relayed: AtomicI64,
    bytes_relayed: AtomicI64,
    errors: RwLock<Vec<String>>,
    tasks: RwLock<Vec<JoinHandle<()>>>,
}

impl ServiceCollector {
    fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
            active: AtomicUsize::new(0),
            lines_relayed: AtomicI64::new(0),
            bytes_relayed: AtomicI64::new(0),
            errors: RwLock::new(Vec::new()),
            tasks: RwLock::new(Vec::new()),
        }
    }

    async fn stream_reader(
        &self,
        stream: impl AsyncRead + Unpin,
        stream_type: StreamType,
        total_lines: Arc<AtomicI64>,
        cancel_token: CancellationToken,
    ) {
        let mut lines = BufReader::new(stream).lines();

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    debug!(service = %self.service, stream = %stream_type, "Stream reader cancelled");
                    break;
                }
                result = lines.next_line() => {
                    match result {
                        Ok(Some(line)) => {
                            self.lines_relayed.fetch_add(1, Ordering::SeqCst);
                            self.bytes_relayed.fetch_add(line.len() as i64, Ordering::SeqCst);
                            total_lines.fetch_add(1, Ordering::SeqCst);
                            info!(service = %self.service, stream = %stream_type, "{}", line);
                        }
                        Ok(None) => break,
                        Err(e) => {
                            warn!(service = %self.service, error = %e, "Error reading from stream");
                            self.errors.write().push(format!("{}: {}", stream_type, e));
                            break;
                        }
                    }
                }
            }
        }

        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    async fn join(&self, timeout: Duration) {
        let tasks: Vec<_> = self.tasks.write().drain(..).collect();
        for task in tasks {
            if tokio::time::timeout(timeout, task).await.is_err() {
                debug!(service = %self.service, "Stream reader still busy, leaving it behind");
            }
        }
    }

    fn status(&self) -> ServiceLogStatus {
        ServiceLogStatus {
            service: self.service.clone(),
            active_streams: self.active.load(Ordering::SeqCst),
            lines_relayed: self.lines_relayed.load(Ordering::SeqCst),
            bytes_relayed: self.bytes_relayed.load(Ordering::SeqCst),
            errors: self.errors.read().clone(),
        }
    }
}
