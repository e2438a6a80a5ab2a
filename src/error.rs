// src/error.rs

use thiserror::Error;

/// Errors that abort a whole decode call. Per-frame corruption is never
/// reported here; it is counted and surfaced as warnings on the parse result.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("failed to read log file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid header field '{field}': {reason}")]
    InvalidHeader { field: String, reason: String },
}

/// Errors reported by the analyzers.
///
/// `InsufficientData` is the user-facing, retryable condition (no hover data,
/// no step inputs). Callers are expected to offer a retry or to skip ahead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("insufficient data: {0}")]
    InsufficientData(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl AnalysisError {
    pub fn is_insufficient_data(&self) -> bool {
        matches!(self, AnalysisError::InsufficientData(_))
    }
}

/// Failure of one of the device command channels.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChannelError {
    #[error("device disconnected")]
    Disconnected,
    #[error("device rejected command: {0}")]
    Rejected(String),
    #[error("timed out waiting for device response")]
    Timeout,
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("unsupported parameter group: {0}")]
    Unsupported(String),
    #[error("link I/O failure: {0}")]
    Io(String),
}

impl From<std::io::Error> for ChannelError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => ChannelError::Timeout,
            std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::UnexpectedEof => ChannelError::Disconnected,
            _ => ChannelError::Io(err.to_string()),
        }
    }
}

/// Misuse of the apply state machine (not a device failure).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrchestratorError {
    #[error("cannot {action} while orchestrator is {state}")]
    InvalidState { action: &'static str, state: &'static str },
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("failed to write export file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to write CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to write JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("session has no decoded frames")]
    EmptySession,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config value '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}
