//! Multicast discovery of adapter hosts.
//!
//! An adapter host runs a [`DiscoveryResponder`]; clients call [`collect`]
//! to find every host on the local segment.

pub mod collector;
pub mod datagram;
pub mod error;
pub mod responder;

pub use collector::{collect, CollectorConfig, DiscoveryRecord};
pub use datagram::{DatagramConfig, DatagramStats, DatagramTransport, InboundPacket, ReceiveMode};
pub use error::DiscoveryError;
pub use responder::{DiscoveryResponder, ListenerState, ResponderConfig};
