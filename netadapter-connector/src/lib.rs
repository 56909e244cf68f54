//! # netadapter-connector
//!
//! Connector abstraction for netadapter.
//!
//! This crate provides:
//! - The [`Connector`] capability: framed reads and writes of bytes,
//!   booleans, int32 and length-prefixed text
//! - [`StreamConnector`], the TCP-backed implementation, with connection
//!   sharing (`duplicate`) and hand-off (`transfer_control`)
//! - [`ConnectorHandle`], a tagged handle whose empty variant fails every
//!   operation
//! - The protocol version handshake

pub mod connector;
pub mod error;
pub mod handshake;
pub mod stream;

pub use connector::{Connector, ConnectorHandle};
pub use error::ConnectorError;
pub use stream::{ConnectorConfig, StreamConnector};
