//! Discovery responder.
//!
//! Listens on the discovery group and answers every datagram that matches
//! the expected beacon byte-for-byte with a fixed reply, sent back to the
//! beacon's source address.

use crate::datagram::{DatagramConfig, DatagramTransport, InboundPacket};
use crate::error::DiscoveryError;
use bytes::Bytes;
use netadapter_protocol::{
    encode_discovery_reply, version_beacon, DEFAULT_MULTICAST_GROUP, DEFAULT_MULTICAST_PORT,
    RESPONDER_TIMEOUT, SHUTDOWN_POLL_CYCLES, SHUTDOWN_POLL_INTERVAL,
};
use parking_lot::Mutex;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Responder configuration.
#[derive(Debug, Clone)]
pub struct ResponderConfig {
    pub group: Ipv4Addr,
    /// Port the responder binds and listens on.
    pub port: u16,
    pub interface: Ipv4Addr,
    /// Receive timeout; cancellation is also observed while waiting.
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub poll_cycles: u32,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            group: DEFAULT_MULTICAST_GROUP,
            port: DEFAULT_MULTICAST_PORT,
            interface: Ipv4Addr::UNSPECIFIED,
            timeout: RESPONDER_TIMEOUT,
            poll_interval: SHUTDOWN_POLL_INTERVAL,
            poll_cycles: SHUTDOWN_POLL_CYCLES,
        }
    }
}

impl ResponderConfig {
    pub fn with_group(mut self, group: Ipv4Addr) -> Self {
        self.group = group;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
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

    /// Longest time `stop` waits for the listener to exit.
    pub fn stop_bound(&self) -> Duration {
        self.poll_interval * self.poll_cycles
    }
}

/// Lifecycle of the listening loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Idle,
    Running,
    StopRequested,
    Stopped,
}

/// Answers discovery beacons until stopped.
pub struct DiscoveryResponder {
    config: ResponderConfig,
    expected: Bytes,
    reply: Bytes,
    state: Arc<Mutex<ListenerState>>,
    replies_sent: Arc<AtomicU64>,
    local_addr: Mutex<Option<SocketAddr>>,
    shutdown_tx: watch::Sender<bool>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl DiscoveryResponder {
    /// Creates an idle responder.
    pub fn new(config: ResponderConfig, expected: impl Into<Bytes>, reply: impl Into<Bytes>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            config,
            expected: expected.into(),
            reply: reply.into(),
            state: Arc::new(Mutex::new(ListenerState::Idle)),
            replies_sent: Arc::new(AtomicU64::new(0)),
            local_addr: Mutex::new(None),
            shutdown_tx,
            listener: Mutex::new(None),
        }
    }

    /// Creates a responder that advertises an adapter host on `listen_port`.
    ///
    /// It answers the protocol version beacon with the standard 5-byte reply.
    pub fn for_adapter_host(listen_port: u16, config: ResponderConfig) -> Self {
        Self::new(
            config,
            Bytes::copy_from_slice(&version_beacon()),
            Bytes::copy_from_slice(&encode_discovery_reply(i32::from(listen_port))),
        )
    }

    pub fn state(&self) -> ListenerState {
        *self.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.state() == ListenerState::Running
    }

    /// Address the listener is bound to, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    pub fn replies_sent(&self) -> u64 {
        self.replies_sent.load(Ordering::Relaxed)
    }

    /// Binds, joins the group and starts answering beacons.
    ///
    /// A responder starts at most once.
    pub async fn start(&self) -> Result<(), DiscoveryError> {
        {
            let mut state = self.state.lock();
            if *state != ListenerState::Idle {
                return Err(DiscoveryError::AlreadyStarted);
            }
            *state = ListenerState::Running;
        }

        let transport = match self.open_transport() {
            Ok(transport) => transport,
            Err(e) => {
                *self.state.lock() = ListenerState::Stopped;
                return Err(e);
            }
        };
        *self.local_addr.lock() = Some(transport.local_addr());

        tracing::info!(
            "Discovery responder listening on {} (group {})",
            transport.local_addr(),
            self.config.group
        );

        let task = tokio::spawn(listen(
            transport,
            self.config.group,
            self.expected.clone(),
            self.reply.clone(),
            Arc::clone(&self.state),
            Arc::clone(&self.replies_sent),
            self.shutdown_tx.subscribe(),
        ));
        *self.listener.lock() = Some(task);
        Ok(())
    }

    fn open_transport(&self) -> Result<DatagramTransport, DiscoveryError> {
        let config = DatagramConfig::new(self.config.port)
            .with_interface(self.config.interface)
            .with_timeout(self.config.timeout);
        let mut transport = DatagramTransport::open(&config)?;
        transport.join_group(self.config.group)?;
        Ok(transport)
    }

    /// Requests shutdown and waits for the listener to exit.
    ///
    /// The wait is bounded by `poll_interval * poll_cycles`; a listener still
    /// running after that is aborted. A caller arriving while another stop is
    /// in progress polls until the listener has stopped, within the same
    /// bound. Calling `stop` on a stopped responder, or on one that never
    /// started, returns immediately.
    pub async fn stop(&self) {
        {
            let mut state = self.state.lock();
            match *state {
                ListenerState::Idle | ListenerState::Stopped => {
                    *state = ListenerState::Stopped;
                    return;
                }
                ListenerState::Running => *state = ListenerState::StopRequested,
                ListenerState::StopRequested => {}
            }
        }

        let _ = self.shutdown_tx.send(true);
        let task = self.listener.lock().take();
        let Some(mut task) = task else {
            self.wait_stopped().await;
            return;
        };

        let bound = self.config.stop_bound();
        if tokio::time::timeout(bound, &mut task).await.is_err() {
            tracing::warn!("Discovery responder did not stop within {:?}, aborting", bound);
            task.abort();
        }
        *self.state.lock() = ListenerState::Stopped;
        tracing::info!("Discovery responder stopped");
    }

    async fn wait_stopped(&self) {
        for _ in 0..self.config.poll_cycles {
            if self.state() == ListenerState::Stopped {
                return;
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
        tracing::warn!("Discovery responder still stopping after {:?}", self.config.stop_bound());
    }
}

impl Drop for DiscoveryResponder {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

async fn listen(
    mut transport: DatagramTransport,
    group: Ipv4Addr,
    expected: Bytes,
    reply: Bytes,
    state: Arc<Mutex<ListenerState>>,
    replies_sent: Arc<AtomicU64>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        tokio::select! {
            _ = shutdown_rx.changed() => break,
            result = transport.receive() => match result {
                Ok(packet) => {
                    answer(&transport, &packet, &expected, &reply, &replies_sent).await;
                }
                Err(DiscoveryError::Timeout) => {}
                Err(e) => {
                    tracing::debug!("Discovery receive error (ignored): {}", e);
                }
            }
        }
    }

    if let Err(e) = transport.leave_group(group) {
        tracing::debug!("Failed to leave group {}: {}", group, e);
    }
    transport.close();
    *state.lock() = ListenerState::Stopped;
}

/// A payload matches only with the same length and identical bytes.
fn matches_beacon(payload: &[u8], expected: &[u8]) -> bool {
    payload == expected
}

async fn answer(
    transport: &DatagramTransport,
    packet: &InboundPacket,
    expected: &Bytes,
    reply: &Bytes,
    replies_sent: &AtomicU64,
) {
    if !matches_beacon(&packet.payload, expected) {
        tracing::trace!(
            "Ignoring {}-byte datagram from {}",
            packet.payload.len(),
            packet.source
        );
        return;
    }

    match transport.send_to(reply, packet.source).await {
        Ok(()) => {
            replies_sent.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Answered discovery beacon from {}", packet.source);
        }
        Err(e) => {
            tracing::debug!("Failed to answer {}: {}", packet.source, e);
        }
    }
}
