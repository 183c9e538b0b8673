use std::time::Duration;
use stonegate_core::ErrorInfo;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Establishing the connection, sending or receiving failed.
    #[error("transport error: {0}")]
    Transport(String),
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: String,
        timeout: Duration,
    },
    /// The backend answered with `ok: false`.
    #[error("{0}")]
    Rpc(ErrorInfo),
    /// The connection went away while the call was outstanding.
    #[error("connection closed")]
    Closed,
    /// Rejected locally before anything was sent.
    #[error("invalid argument: {0}")]
    Validation(String),
    #[error("unexpected result from {method}: {reason}")]
    UnexpectedResult { method: String, reason: String },
    #[error("no {metric} reading for {device_id}")]
    MissingReading { device_id: String, metric: String },
}

impl ClientError {
    pub fn rpc_info(&self) -> Option<&ErrorInfo> {
        match self {
            ClientError::Rpc(info) => Some(info),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ClientError::Timeout { .. })
    }
}

impl From<tungstenite::Error> for ClientError {
    fn from(err: tungstenite::Error) -> Self {
        ClientError::Transport(err.to_string())
    }
}

impl From<ErrorInfo> for ClientError {
    fn from(info: ErrorInfo) -> Self {
        ClientError::Rpc(info)
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
