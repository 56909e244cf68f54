//! Discovery error types.

use netadapter_protocol::{ErrorKind, ProtocolError};
use std::net::Ipv4Addr;
use thiserror::Error;

/// Discovery errors.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("receive timed out")]
    Timeout,

    #[error("failed to join multicast group {group}: {source}")]
    JoinGroup {
        group: Ipv4Addr,
        #[source]
        source: std::io::Error,
    },

    #[error("no send target configured")]
    NoTarget,

    #[error("datagram transport is closed")]
    Closed,

    #[error("responder already started")]
    AlreadyStarted,
}

impl DiscoveryError {
    /// Returns the error kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DiscoveryError::Io(_) => ErrorKind::Transport,
            DiscoveryError::Protocol(e) => e.kind(),
            DiscoveryError::Timeout => ErrorKind::Timeout,
            DiscoveryError::JoinGroup { .. } => ErrorKind::Transport,
            DiscoveryError::NoTarget => ErrorKind::IllegalOperation,
            DiscoveryError::Closed => ErrorKind::IllegalOperation,
            DiscoveryError::AlreadyStarted => ErrorKind::IllegalOperation,
        }
    }

    /// Returns whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}
