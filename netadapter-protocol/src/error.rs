//! Protocol error types and error kinds.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors raised while framing or parsing protocol values.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("text too long: {len} bytes (max {max})")]
    TextTooLong { len: usize, max: usize },

    #[error("invalid UTF-8 in text payload")]
    InvalidUtf8,

    #[error("incomplete value: need {needed} more bytes")]
    Incomplete { needed: usize },

    #[error("unknown command code: {0:#04x}")]
    UnknownCommand(u8),

    #[error("unknown return code: {0:#04x}")]
    UnknownReturnCode(u8),

    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(i32),

    #[error("invalid terminator byte: {0:#04x}")]
    InvalidTerminator(u8),

    #[error("malformed discovery reply: {len} bytes")]
    MalformedReply { len: usize },
}

impl ProtocolError {
    /// Returns the error kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProtocolError::Incomplete { .. } => ErrorKind::ShortRead,
            _ => ErrorKind::ProtocolMismatch,
        }
    }
}

/// Classification shared by every error type of the transport layer.
///
/// Callers decide on retries from the kind alone; no layer retries
/// internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// No data within the deadline.
    Timeout,
    /// The stream ended before the required bytes arrived.
    ShortRead,
    /// Socket, bind, join or send failure.
    Transport,
    /// Operation invoked on an empty or released connector.
    IllegalOperation,
    /// Data did not have the expected shape.
    ProtocolMismatch,
}

impl ErrorKind {
    /// Returns whether an operation failing with this kind may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Timeout)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Timeout => write!(f, "TIMEOUT"),
            ErrorKind::ShortRead => write!(f, "SHORT_READ"),
            ErrorKind::Transport => write!(f, "TRANSPORT_ERROR"),
            ErrorKind::IllegalOperation => write!(f, "ILLEGAL_OPERATION"),
            ErrorKind::ProtocolMismatch => write!(f, "PROTOCOL_MISMATCH"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_retryable() {
        assert!(ErrorKind::Timeout.is_retryable());

        assert!(!ErrorKind::ShortRead.is_retryable());
        assert!(!ErrorKind::Transport.is_retryable());
        assert!(!ErrorKind::IllegalOperation.is_retryable());
        assert!(!ErrorKind::ProtocolMismatch.is_retryable());
    }

    #[test]
    fn test_error_kind_display() {
        assert_eq!(format!("{}", ErrorKind::Timeout), "TIMEOUT");
        assert_eq!(format!("{}", ErrorKind::ShortRead), "SHORT_READ");
        assert_eq!(format!("{}", ErrorKind::Transport), "TRANSPORT_ERROR");
        assert_eq!(
            format!("{}", ErrorKind::IllegalOperation),
            "ILLEGAL_OPERATION"
        );
        assert_eq!(
            format!("{}", ErrorKind::ProtocolMismatch),
            "PROTOCOL_MISMATCH"
        );
    }

    #[test]
    fn test_error_kind_serialization() {
        let json = serde_json::to_string(&ErrorKind::ShortRead).unwrap();
        assert_eq!(json, "\"SHORT_READ\"");

        let parsed: ErrorKind = serde_json::from_str("\"TIMEOUT\"").unwrap();
        assert_eq!(parsed, ErrorKind::Timeout);
    }

    #[test]
    fn test_protocol_error_display() {
        let err = ProtocolError::TextTooLong {
            len: 70000,
            max: 65535,
        };
        assert!(err.to_string().contains("70000"));

        let err = ProtocolError::UnknownCommand(0x42);
        assert!(err.to_string().contains("0x42"));

        let err = ProtocolError::InvalidUtf8;
        assert!(err.to_string().contains("UTF-8"));

        let err = ProtocolError::Incomplete { needed: 3 };
        assert!(err.to_string().contains('3'));
        assert_eq!(err.kind(), ErrorKind::ShortRead);

        let err = ProtocolError::InvalidTerminator(0x00);
        assert_eq!(err.kind(), ErrorKind::ProtocolMismatch);
    }
}
