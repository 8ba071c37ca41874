//! Core types for log collection

use serde::{Deserialize, Serialize};

/// Stream type (stdout or stderr)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StreamType {
    Stdout,
    Stderr,
}

impl std::fmt::Display for StreamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamType::Stdout => write!(f, "stdout"),
            StreamType::Stderr => write!(f, "stderr"),
        }
    }
}

/// Which streams are relayed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogCollectionConfig {
    pub capture_stdout: bool,
    pub capture_stderr: bool,
}

impl Default for LogCollectionConfig {
    fn default() -> Self {
        Self {
            capture_stdout: true,
            capture_stderr: true,
        }
    }
}

impl LogCollectionConfig {
    pub fn captures(&self, stream: StreamType) -> bool {
        match stream {
            StreamType::Stdout => self.capture_stdout,
            StreamType::Stderr => self.capture_stderr,
        }
    }
}

/// Counters for one service.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceLogStatus {
    pub service: String,
    pub active_streams: usize,
    pub lines_relayed: i64,
    pub bytes_relayed: i64,
    pub errors: Vec<String>,
}
