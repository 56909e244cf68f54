//! Multicast-capable datagram transport.
//!
//! Two receive modes:
//! - synchronous: `receive` waits on the socket up to the configured timeout
//! - continuous: a background task drains the socket into a bounded FIFO and
//!   `receive` pops from it without waiting

use crate::error::DiscoveryError;
use bytes::Bytes;
use netadapter_protocol::MULTICAST_TTL;
use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};
use std::collections::VecDeque;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Default receive timeout in synchronous mode.
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_millis(500);

/// Default capacity of the continuous-mode inbound queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Receive buffer size. Covers the largest UDP payload, so a datagram is
/// never truncated before payloads are compared.
pub const MAX_DATAGRAM_SIZE: usize = 65_536;

/// How `receive` obtains datagrams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReceiveMode {
    /// Each receive waits on the socket.
    #[default]
    Synchronous,
    /// A background task queues datagrams as they arrive.
    Continuous,
}

/// Datagram transport configuration.
#[derive(Debug, Clone)]
pub struct DatagramConfig {
    /// Local port to bind; 0 picks an ephemeral port.
    pub port: u16,
    pub mode: ReceiveMode,
    /// Interface used for group membership and outgoing multicast.
    pub interface: Ipv4Addr,
    pub timeout: Duration,
    pub ttl: u32,
    pub queue_capacity: usize,
}

impl Default for DatagramConfig {
    fn default() -> Self {
        Self {
            port: 0,
            mode: ReceiveMode::Synchronous,
            interface: Ipv4Addr::UNSPECIFIED,
            timeout: DEFAULT_RECEIVE_TIMEOUT,
            ttl: MULTICAST_TTL,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl DatagramConfig {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    pub fn continuous(mut self) -> Self {
        self.mode = ReceiveMode::Continuous;
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

    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }
}

/// A received datagram and its sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundPacket {
    pub source: SocketAddr,
    pub payload: Bytes,
}

/// Traffic counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DatagramStats {
    /// Datagrams received from the socket.
    pub received: u64,
    /// Datagrams discarded because the queue was full.
    pub dropped: u64,
    /// Datagrams waiting in the queue.
    pub queued: usize,
}

#[derive(Default)]
struct Counters {
    received: AtomicU64,
    dropped: AtomicU64,
}

struct InboundQueue {
    packets: Mutex<VecDeque<InboundPacket>>,
    capacity: usize,
}

impl InboundQueue {
    fn new(capacity: usize) -> Self {
        Self {
            packets: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_QUEUE_CAPACITY))),
            capacity,
        }
    }

    /// Appends a packet; returns false if the queue is full.
    fn push(&self, packet: InboundPacket) -> bool {
        let mut packets = self.packets.lock();
        if packets.len() >= self.capacity {
            return false;
        }
        packets.push_back(packet);
        true
    }

    fn pop(&self) -> Option<InboundPacket> {
        self.packets.lock().pop_front()
    }

    fn len(&self) -> usize {
        self.packets.lock().len()
    }
}

/// UDP endpoint used by discovery.
pub struct DatagramTransport {
    socket: Option<Arc<UdpSocket>>,
    local_addr: SocketAddr,
    mode: ReceiveMode,
    interface: Ipv4Addr,
    timeout: Duration,
    target: Option<SocketAddr>,
    queue: Arc<InboundQueue>,
    counters: Arc<Counters>,
    shutdown_tx: watch::Sender<bool>,
    receiver: Option<JoinHandle<()>>,
}

impl DatagramTransport {
    /// Binds the configured port with address reuse enabled.
    ///
    /// Must be called from within a Tokio runtime. In continuous mode the
    /// background receiver starts immediately.
    pub fn open(config: &DatagramConfig) -> Result<Self, DiscoveryError> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        let bind_addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, config.port));
        socket.bind(&bind_addr.into())?;
        socket.set_multicast_ttl_v4(config.ttl)?;
        socket.set_multicast_loop_v4(true)?;
        if !config.interface.is_unspecified() {
            socket.set_multicast_if_v4(&config.interface)?;
        }
        socket.set_nonblocking(true)?;

        let socket = Arc::new(UdpSocket::from_std(socket.into())?);
        let local_addr = socket.local_addr()?;
        let queue = Arc::new(InboundQueue::new(config.queue_capacity));
        let counters = Arc::new(Counters::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let receiver = match config.mode {
            ReceiveMode::Synchronous => None,
            ReceiveMode::Continuous => Some(tokio::spawn(receive_loop(
                Arc::clone(&socket),
                Arc::clone(&queue),
                Arc::clone(&counters),
                shutdown_rx,
            ))),
        };

        tracing::debug!(
            "Datagram transport bound to {} ({:?} mode)",
            local_addr,
            config.mode
        );

        Ok(Self {
            socket: Some(socket),
            local_addr,
            mode: config.mode,
            interface: config.interface,
            timeout: config.timeout,
            target: None,
            queue,
            counters,
            shutdown_tx,
            receiver,
        })
    }

    fn socket(&self) -> Result<&Arc<UdpSocket>, DiscoveryError> {
        self.socket.as_ref().ok_or(DiscoveryError::Closed)
    }

    /// Returns the bound local address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn mode(&self) -> ReceiveMode {
        self.mode
    }

    pub fn is_closed(&self) -> bool {
        self.socket.is_none()
    }

    /// Joins a multicast group on the configured interface.
    ///
    /// The group, at the bound port, becomes the send target unless one was
    /// already set.
    pub fn join_group(&mut self, group: Ipv4Addr) -> Result<(), DiscoveryError> {
        self.socket()?
            .join_multicast_v4(group, self.interface)
            .map_err(|source| DiscoveryError::JoinGroup { group, source })?;
        if self.target.is_none() {
            self.target = Some(SocketAddr::V4(SocketAddrV4::new(
                group,
                self.local_addr.port(),
            )));
        }
        tracing::debug!("Joined multicast group {} on {}", group, self.interface);
        Ok(())
    }

    /// Leaves a multicast group.
    pub fn leave_group(&mut self, group: Ipv4Addr) -> Result<(), DiscoveryError> {
        self.socket()?.leave_multicast_v4(group, self.interface)?;
        tracing::debug!("Left multicast group {}", group);
        Ok(())
    }

    /// Sets where `send` delivers datagrams.
    pub fn set_target(&mut self, target: SocketAddr) {
        self.target = Some(target);
    }

    pub fn target(&self) -> Option<SocketAddr> {
        self.target
    }

    /// Sends a datagram to the current target.
    pub async fn send(&self, payload: &[u8]) -> Result<(), DiscoveryError> {
        let target = self.target.ok_or(DiscoveryError::NoTarget)?;
        self.send_to(payload, target).await
    }

    /// Sends a datagram to `target`.
    ///
    /// In continuous mode the send is handed to a background task and
    /// failures are only logged.
    pub async fn send_to(&self, payload: &[u8], target: SocketAddr) -> Result<(), DiscoveryError> {
        let socket = self.socket()?;
        match self.mode {
            ReceiveMode::Synchronous => {
                socket.send_to(payload, target).await?;
            }
            ReceiveMode::Continuous => {
                let socket = Arc::clone(socket);
                let payload = payload.to_vec();
                tokio::spawn(async move {
                    if let Err(e) = socket.send_to(&payload, target).await {
                        tracing::warn!("Background send to {} failed: {}", target, e);
                    }
                });
            }
        }
        Ok(())
    }

    /// Receives the next datagram.
    ///
    /// Synchronous mode waits up to the timeout. Continuous mode returns the
    /// oldest queued datagram, or `Timeout` at once if none is queued.
    pub async fn receive(&self) -> Result<InboundPacket, DiscoveryError> {
        let socket = self.socket()?;
        match self.mode {
            ReceiveMode::Synchronous => {
                let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
                let (len, source) = tokio::time::timeout(self.timeout, socket.recv_from(&mut buf))
                    .await
                    .map_err(|_| DiscoveryError::Timeout)??;
                buf.truncate(len);
                self.counters.received.fetch_add(1, Ordering::Relaxed);
                Ok(InboundPacket {
                    source,
                    payload: Bytes::from(buf),
                })
            }
            ReceiveMode::Continuous => self.queue.pop().ok_or(DiscoveryError::Timeout),
        }
    }

    /// Sets the synchronous receive timeout.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn stats(&self) -> DatagramStats {
        DatagramStats {
            received: self.counters.received.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            queued: self.queue.len(),
        }
    }

    /// Stops the background receiver and releases the socket.
    ///
    /// Later operations fail with `Closed`. Closing twice is harmless.
    pub fn close(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(receiver) = self.receiver.take() {
            receiver.abort();
        }
        if self.socket.take().is_some() {
            tracing::debug!("Datagram transport on {} closed", self.local_addr);
        }
    }
}

impl Drop for DatagramTransport {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for DatagramTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatagramTransport")
            .field("local_addr", &self.local_addr)
            .field("mode", &self.mode)
            .field("target", &self.target)
            .field("closed", &self.is_closed())
            .finish()
    }
}

async fn receive_loop(
    socket: Arc<UdpSocket>,
    queue: Arc<InboundQueue>,
    counters: Arc<Counters>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            result = socket.recv_from(&mut buf) => match result {
                Ok((len, source)) => {
                    counters.received.fetch_add(1, Ordering::Relaxed);
                    let packet = InboundPacket {
                        source,
                        payload: Bytes::copy_from_slice(&buf[..len]),
                    };
                    if !queue.push(packet) {
                        counters.dropped.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!("Inbound queue full, dropped datagram from {}", source);
                    }
                }
                Err(e) => {
                    tracing::debug!("Background receive error: {}", e);
                }
            }
        }
    }
    tracing::trace!("Background receiver stopped");
}
