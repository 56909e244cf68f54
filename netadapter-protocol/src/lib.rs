//! # netadapter-protocol
//!
//! Wire protocol for netadapter, the network transport that lets a remote
//! client drive a 1-Wire bus adapter as if it were locally attached.
//!
//! This crate provides:
//! - Command and return code tables
//! - Primitive value framing (byte, bool, int32, length-prefixed text)
//! - Discovery beacon and reply datagram shapes
//! - Error kinds shared by the connector and discovery crates

pub mod command;
pub mod discovery;
pub mod error;
pub mod wire;

pub use command::{Command, CommandCategory, ReturnCode};
pub use discovery::{decode_discovery_reply, encode_discovery_reply, version_beacon};
pub use error::{ErrorKind, ProtocolError};

use std::net::Ipv4Addr;
use std::time::Duration;

/// Protocol version tag exchanged in the handshake and the discovery beacon.
pub const PROTOCOL_VERSION: i32 = 1;

/// Default TCP port of an adapter host.
pub const DEFAULT_PORT: u16 = 6161;

/// Default multicast group used for discovery.
pub const DEFAULT_MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(228, 5, 6, 7);

/// Default UDP port used for discovery.
pub const DEFAULT_MULTICAST_PORT: u16 = 6163;

/// Multicast time-to-live. Discovery never leaves the local segment.
pub const MULTICAST_TTL: u32 = 0;

/// Receive timeout of the discovery responder loop.
pub const RESPONDER_TIMEOUT: Duration = Duration::from_secs(3);

/// Receive timeout of the discovery collector.
pub const COLLECTOR_TIMEOUT: Duration = Duration::from_millis(500);

/// Interval at which a stopping responder is polled.
pub const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Number of poll intervals a responder shutdown may take.
pub const SHUTDOWN_POLL_CYCLES: u32 = 300;

/// Sentinel closing the version handshake and the discovery reply.
pub const TERMINATOR: u8 = 0xFF;
