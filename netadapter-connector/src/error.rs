//! Connector error types.

use netadapter_protocol::{ErrorKind, ProtocolError, ReturnCode};
use thiserror::Error;

/// Connector errors.
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("operation timed out")]
    Timeout,

    #[error("short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    #[error("illegal operation: {0}")]
    IllegalOperation(&'static str),

    #[error("command rejected by adapter host: {0:?}")]
    Rejected(ReturnCode),
}

impl ConnectorError {
    /// Returns the error kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConnectorError::Io(_) => ErrorKind::Transport,
            ConnectorError::Protocol(e) => e.kind(),
            ConnectorError::Timeout => ErrorKind::Timeout,
            ConnectorError::ShortRead { .. } => ErrorKind::ShortRead,
            ConnectorError::IllegalOperation(_) => ErrorKind::IllegalOperation,
            ConnectorError::Rejected(_) => ErrorKind::ProtocolMismatch,
        }
    }

    /// Returns whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}
