//! Discovery collector.
//!
//! Sends the version beacon to the discovery group and gathers adapter
//! host replies until the group goes quiet for one receive timeout.

use crate::datagram::{DatagramConfig, DatagramTransport};
use crate::error::DiscoveryError;
use bytes::Bytes;
use netadapter_protocol::{
    decode_discovery_reply, version_beacon, COLLECTOR_TIMEOUT, DEFAULT_MULTICAST_GROUP,
    DEFAULT_MULTICAST_PORT,
};
use serde::Serialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Collector configuration.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub group: Ipv4Addr,
    /// Port the beacon is sent to.
    pub port: u16,
    /// Port to bind locally; 0 picks an ephemeral port.
    pub local_port: u16,
    pub interface: Ipv4Addr,
    pub timeout: Duration,
    /// Sends the beacon here instead of the group, for probing a known host.
    pub target: Option<SocketAddr>,
    pub beacon: Bytes,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            group: DEFAULT_MULTICAST_GROUP,
            port: DEFAULT_MULTICAST_PORT,
            local_port: DEFAULT_MULTICAST_PORT,
            interface: Ipv4Addr::UNSPECIFIED,
            timeout: COLLECTOR_TIMEOUT,
            target: None,
            beacon: Bytes::copy_from_slice(&version_beacon()),
        }
    }
}

impl CollectorConfig {
    pub fn with_group(mut self, group: Ipv4Addr) -> Self {
        self.group = group;
        self
    }

    /// Sets both the beacon port and the local port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self.local_port = port;
        self
    }

    pub fn with_local_port(mut self, port: u16) -> Self {
        self.local_port = port;
        self
    }

    pub fn with_interface(mut self, interface: Ipv4Addr) -> Self {
        self.interface = interface;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_target(mut self, target: SocketAddr) -> Self {
        self.target = Some(target);
        self
    }

    fn beacon_target(&self) -> SocketAddr {
        self.target
            .unwrap_or_else(|| SocketAddr::from((self.group, self.port)))
    }
}

/// One adapter host that answered the beacon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveryRecord {
    /// `host:listen_port`, ready to hand to a stream connector.
    pub address: String,
    pub host: IpAddr,
    pub listen_port: i32,
}

impl DiscoveryRecord {
    fn new(host: IpAddr, listen_port: i32) -> Self {
        Self {
            address: format!("{}:{}", host, listen_port),
            host,
            listen_port,
        }
    }
}

/// Runs one discovery round.
///
/// Fails only if the group cannot be joined or the beacon cannot be sent.
/// Replies that are not exactly 5 bytes ending in the terminator are
/// skipped. Every valid reply yields a record, duplicates included, in
/// arrival order.
pub async fn collect(config: &CollectorConfig) -> Result<Vec<DiscoveryRecord>, DiscoveryError> {
    let datagram_config = DatagramConfig::new(config.local_port)
        .with_interface(config.interface)
        .with_timeout(config.timeout);
    let mut transport = DatagramTransport::open(&datagram_config)?;
    transport.join_group(config.group)?;

    let result = exchange(&mut transport, config).await;

    if let Err(e) = transport.leave_group(config.group) {
        tracing::debug!("Failed to leave group {}: {}", config.group, e);
    }
    transport.close();
    result
}

async fn exchange(
    transport: &mut DatagramTransport,
    config: &CollectorConfig,
) -> Result<Vec<DiscoveryRecord>, DiscoveryError> {
    transport.set_target(config.beacon_target());
    transport.send(&config.beacon).await?;
    tracing::debug!("Sent discovery beacon to {}", config.beacon_target());

    let mut records = Vec::new();
    loop {
        let packet = match transport.receive().await {
            Ok(packet) => packet,
            Err(DiscoveryError::Timeout) => break,
            Err(e) => {
                tracing::debug!("Discovery receive failed, ending round: {}", e);
                break;
            }
        };

        match decode_discovery_reply(&packet.payload) {
            Ok(listen_port) => {
                let record = DiscoveryRecord::new(packet.source.ip(), listen_port);
                tracing::debug!("Discovered adapter host at {}", record.address);
                records.push(record);
            }
            Err(e) => {
                tracing::trace!("Ignoring datagram from {}: {}", packet.source, e);
            }
        }
    }

    tracing::info!("Discovery found {} adapter host(s)", records.len());
    Ok(records)
}
