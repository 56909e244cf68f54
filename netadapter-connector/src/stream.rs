//! Stream connector backed by a TCP connection.

use crate::connector::Connector;
use crate::error::ConnectorError;
use async_trait::async_trait;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

/// Default read buffer size (8 KiB).
pub const DEFAULT_BUFFER_SIZE: usize = 8 * 1024;

/// Minimum read buffer size (1 KiB).
pub const MIN_BUFFER_SIZE: usize = 1024;

/// Maximum read buffer size (1 MiB).
pub const MAX_BUFFER_SIZE: usize = 1024 * 1024;

/// Smallest accepted read deadline.
pub const MIN_TIMEOUT: Duration = Duration::from_millis(1);

/// Connector configuration.
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    /// Adapter host address, `host:port`.
    pub addr: String,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Deadline for each read and flush.
    pub read_timeout: Duration,
    /// Buffer size for socket reads and writes.
    pub buffer_size: usize,
}

impl ConnectorConfig {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(10),
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout.max(MIN_TIMEOUT);
        self
    }

    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.clamp(MIN_BUFFER_SIZE, MAX_BUFFER_SIZE);
        self
    }
}

/// The connection shared by every handle that wraps it.
///
/// Dropping the last reference closes the socket.
struct Transport {
    reader: Mutex<BufReader<OwnedReadHalf>>,
    writer: Mutex<BufWriter<OwnedWriteHalf>>,
    peer: SocketAddr,
}

impl Transport {
    fn new(stream: TcpStream, buffer_size: usize) -> Result<Self, ConnectorError> {
        let peer = stream.peer_addr()?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: Mutex::new(BufReader::with_capacity(buffer_size, read_half)),
            writer: Mutex::new(BufWriter::with_capacity(buffer_size, write_half)),
            peer,
        })
    }
}

const RELEASED: &str = "connector has been closed or transferred";

/// A connector over a TCP stream.
///
/// Reads and flushes are bounded by the configured timeout; expired
/// operations are reported, never retried.
pub struct StreamConnector {
    transport: Option<Arc<Transport>>,
    timeout: Duration,
    address: String,
}

impl StreamConnector {
    /// Dials the adapter host described by `config`.
    pub async fn connect(config: &ConnectorConfig) -> Result<Self, ConnectorError> {
        tracing::debug!("Connecting to {}...", config.addr);

        let stream = tokio::time::timeout(
            config.connect_timeout,
            TcpStream::connect(config.addr.as_str()),
        )
        .await
        .map_err(|_| {
            tracing::debug!("Connection timeout");
            ConnectorError::Timeout
        })?
        .map_err(|e| {
            tracing::debug!("Connection failed: {}", e);
            ConnectorError::Io(e)
        })?;

        stream.set_nodelay(true).ok();
        tracing::debug!("Connected to {}", config.addr);

        Self::from_stream(
            stream,
            config.addr.clone(),
            config.read_timeout,
            config.buffer_size,
        )
    }

    /// Accepts the next connection on `listener`.
    pub async fn accept(listener: &TcpListener, timeout: Duration) -> Result<Self, ConnectorError> {
        let (stream, addr) = listener.accept().await?;
        stream.set_nodelay(true).ok();
        tracing::debug!("Accepted connection from {}", addr);
        Self::from_stream(stream, addr.to_string(), timeout, DEFAULT_BUFFER_SIZE)
    }

    /// Wraps an established stream.
    pub fn from_stream(
        stream: TcpStream,
        address: String,
        timeout: Duration,
        buffer_size: usize,
    ) -> Result<Self, ConnectorError> {
        let buffer_size = buffer_size.clamp(MIN_BUFFER_SIZE, MAX_BUFFER_SIZE);
        Ok(Self {
            transport: Some(Arc::new(Transport::new(stream, buffer_size)?)),
            timeout: timeout.max(MIN_TIMEOUT),
            address,
        })
    }

    /// Returns whether this handle still holds a connection.
    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    /// Returns the current read deadline.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the peer address of the connection.
    pub fn peer_addr(&self) -> Result<SocketAddr, ConnectorError> {
        Ok(self.transport()?.peer)
    }

    /// Returns how many handles share this connection.
    pub fn share_count(&self) -> usize {
        self.transport.as_ref().map_or(0, Arc::strong_count)
    }

    fn transport(&self) -> Result<&Arc<Transport>, ConnectorError> {
        self.transport
            .as_ref()
            .ok_or(ConnectorError::IllegalOperation(RELEASED))
    }

    /// Returns a second handle sharing the same connection.
    ///
    /// The connection is closed when the last sharing handle is closed or
    /// dropped.
    pub fn duplicate(&self) -> Result<Self, ConnectorError> {
        let transport = self.transport()?.clone();
        Ok(Self {
            transport: Some(transport),
            timeout: self.timeout,
            address: self.address.clone(),
        })
    }

    /// Moves control of the connection to `other`, leaving `self` released.
    ///
    /// If `other` already holds a connection it must be this one.
    pub fn transfer_control(&mut self, other: &mut StreamConnector) -> Result<(), ConnectorError> {
        let transport = self.transport()?;
        if let Some(existing) = &other.transport {
            if !Arc::ptr_eq(existing, transport) {
                return Err(ConnectorError::IllegalOperation(
                    "target already controls a different connection",
                ));
            }
        }
        other.transport = self.transport.take();
        other.address = std::mem::take(&mut self.address);
        tracing::debug!("Transferred control of connection to {}", other.address);
        Ok(())
    }

    /// Moves the connection into a new handle, leaving `self` released.
    pub fn take_control(&mut self) -> Result<StreamConnector, ConnectorError> {
        self.transport()?;
        Ok(Self {
            transport: self.transport.take(),
            timeout: self.timeout,
            address: std::mem::take(&mut self.address),
        })
    }

    async fn with_deadline<T, F>(&self, op: F) -> Result<T, ConnectorError>
    where
        F: std::future::Future<Output = Result<T, ConnectorError>>,
    {
        tokio::time::timeout(self.timeout, op)
            .await
            .map_err(|_| ConnectorError::Timeout)?
    }
}

impl fmt::Debug for StreamConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamConnector")
            .field("address", &self.address)
            .field("timeout", &self.timeout)
            .field("open", &self.is_open())
            .field("shared", &self.share_count())
            .finish()
    }
}

#[async_trait]
impl Connector for StreamConnector {
    async fn read_into(&mut self, buf: &mut [u8]) -> Result<usize, ConnectorError> {
        let transport = self.transport()?.clone();
        self.with_deadline(async {
            let mut reader = transport.reader.lock().await;
            Ok(reader.read(buf).await?)
        })
        .await
    }

    async fn read_fully(&mut self, buf: &mut [u8]) -> Result<(), ConnectorError> {
        let transport = self.transport()?.clone();
        let expected = buf.len();
        self.with_deadline(async {
            let mut reader = transport.reader.lock().await;
            let mut filled = 0;
            while filled < expected {
                let n = reader.read(&mut buf[filled..]).await?;
                if n == 0 {
                    tracing::debug!(
                        "Stream from {} ended after {} of {} bytes",
                        transport.peer,
                        filled,
                        expected
                    );
                    return Err(ConnectorError::ShortRead {
                        expected,
                        actual: filled,
                    });
                }
                filled += n;
            }
            Ok(())
        })
        .await
    }

    async fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), ConnectorError> {
        let transport = self.transport()?.clone();
        self.with_deadline(async {
            let mut writer = transport.writer.lock().await;
            writer.write_all(bytes).await?;
            Ok(())
        })
        .await
    }

    async fn flush(&mut self) -> Result<(), ConnectorError> {
        let transport = self.transport()?.clone();
        self.with_deadline(async {
            let mut writer = transport.writer.lock().await;
            writer.flush().await?;
            Ok(())
        })
        .await
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), ConnectorError> {
        self.transport()?;
        self.timeout = timeout.max(MIN_TIMEOUT);
        Ok(())
    }

    fn reconnect_address(&self) -> &str {
        &self.address
    }

    /// Releases this handle. The last handle sharing the connection flushes
    /// and shuts it down; closing a released handle is a no-op.
    async fn close(&mut self) -> Result<(), ConnectorError> {
        let Some(transport) = self.transport.take() else {
            return Ok(());
        };

        match Arc::try_unwrap(transport) {
            Ok(transport) => {
                tracing::debug!("Closing connection to {}", transport.peer);
                let mut writer = transport.writer.into_inner();
                let result = tokio::time::timeout(self.timeout, async {
                    writer.flush().await?;
                    writer.shutdown().await
                })
                .await;
                match result {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(ConnectorError::Io(e)),
                    Err(_) => Err(ConnectorError::Timeout),
                }
            }
            Err(shared) => {
                tracing::debug!(
                    "Released shared connection to {} ({} handles remain)",
                    shared.peer,
                    Arc::strong_count(&shared) - 1
                );
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netadapter_protocol::{Command, ErrorKind, ReturnCode};

    async fn pair() -> (StreamConnector, StreamConnector) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let config = ConnectorConfig::new(addr.to_string())
            .with_read_timeout(Duration::from_millis(500));

        let (client, server) = tokio::join!(
            StreamConnector::connect(&config),
            StreamConnector::accept(&listener, Duration::from_millis(500)),
        );
        (client.unwrap(), server.unwrap())
    }

    #[test]
    fn test_config_defaults() {
        let config = ConnectorConfig::new("127.0.0.1:6161");
        assert_eq!(config.buffer_size, DEFAULT_BUFFER_SIZE);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.read_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_config_buffer_clamping() {
        let config = ConnectorConfig::new("127.0.0.1:6161").with_buffer_size(100);
        assert_eq!(config.buffer_size, MIN_BUFFER_SIZE);

        let config = ConnectorConfig::new("127.0.0.1:6161").with_buffer_size(10 * 1024 * 1024);
        assert_eq!(config.buffer_size, MAX_BUFFER_SIZE);
    }

    #[tokio::test]
    async fn test_primitive_framing_on_the_wire() {
        let (mut client, mut server) = pair().await;

        client.write_byte(0x42).await.unwrap();
        client.write_bool(true).await.unwrap();
        client.write_bool(false).await.unwrap();
        client.write_int(0x0102_0304).await.unwrap();
        client.write_text("hé").await.unwrap();
        client.flush().await.unwrap();

        let mut raw = [0u8; 12];
        server.read_fully(&mut raw).await.unwrap();
        assert_eq!(
            raw,
            [0x42, 0xFF, 0x00, 0x01, 0x02, 0x03, 0x04, 0x00, 0x03, b'h', 0xC3, 0xA9]
        );
    }

    #[tokio::test]
    async fn test_primitive_roundtrip() {
        let (mut client, mut server) = pair().await;

        client.write_byte(7).await.unwrap();
        client.write_bool(true).await.unwrap();
        client.write_int(i32::MIN).await.unwrap();
        client.write_int(-1).await.unwrap();
        client.write_text("Adapter").await.unwrap();
        client.write_text("").await.unwrap();
        client.flush().await.unwrap();

        assert_eq!(server.read_byte().await.unwrap(), 7);
        assert!(server.read_bool().await.unwrap());
        assert_eq!(server.read_int().await.unwrap(), i32::MIN);
        assert_eq!(server.read_int().await.unwrap(), -1);
        assert_eq!(server.read_text().await.unwrap(), "Adapter");
        assert_eq!(server.read_text().await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_text_too_long_is_rejected_before_writing() {
        let (mut client, mut server) = pair().await;

        let text = "x".repeat(70_000);
        let err = client.write_text(&text).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProtocolMismatch);

        client.write_byte(1).await.unwrap();
        client.flush().await.unwrap();
        assert_eq!(server.read_byte().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_read_timeout() {
        let (_client, mut server) = pair().await;
        server.set_timeout(Duration::from_millis(50)).unwrap();

        let err = server.read_byte().await.unwrap_err();
        assert!(matches!(err, ConnectorError::Timeout));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_short_read() {
        let (mut client, mut server) = pair().await;

        client.write_bytes(&[1, 2]).await.unwrap();
        client.close().await.unwrap();

        let mut buf = [0u8; 4];
        let err = server.read_fully(&mut buf).await.unwrap_err();
        assert!(matches!(
            err,
            ConnectorError::ShortRead {
                expected: 4,
                actual: 2
            }
        ));
    }

    #[tokio::test]
    async fn test_read_into_is_best_effort() {
        let (mut client, mut server) = pair().await;

        client.write_bytes(&[9, 8, 7]).await.unwrap();
        client.flush().await.unwrap();

        let mut buf = [0u8; 16];
        let mut total = 0;
        while total < 3 {
            total += server.read_into(&mut buf[total..]).await.unwrap();
        }
        assert_eq!(&buf[..3], &[9, 8, 7]);

        client.close().await.unwrap();
        assert_eq!(server.read_into(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_command_and_return_code() {
        let (mut client, mut server) = pair().await;

        client.write_command(Command::PingConnection).await.unwrap();
        client.flush().await.unwrap();
        assert_eq!(
            Command::try_from(server.read_byte().await.unwrap()).unwrap(),
            Command::PingConnection
        );

        server.write_byte(ReturnCode::Success.code()).await.unwrap();
        server.write_byte(ReturnCode::Failure.code()).await.unwrap();
        server.flush().await.unwrap();

        client.expect_success().await.unwrap();
        assert!(matches!(
            client.expect_success().await,
            Err(ConnectorError::Rejected(ReturnCode::Failure))
        ));
    }

    #[tokio::test]
    async fn test_transfer_control_to_unconnected_handle() {
        let (mut a, mut server) = pair().await;
        let address = a.reconnect_address().to_string();

        let mut b = a.take_control().unwrap();
        assert!(!a.is_open());
        assert!(b.is_open());
        assert_eq!(b.reconnect_address(), address);

        let err = a.write_byte(1).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IllegalOperation);
        let err = a.read_byte().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IllegalOperation);
        assert!(a.set_timeout(Duration::from_secs(1)).is_err());
        assert!(a.duplicate().is_err());

        b.write_int(6165).await.unwrap();
        b.flush().await.unwrap();
        assert_eq!(server.read_int().await.unwrap(), 6165);
    }

    #[tokio::test]
    async fn test_transfer_control_to_sharing_handle() {
        let (mut a, mut server) = pair().await;
        let mut b = a.duplicate().unwrap();
        assert_eq!(a.share_count(), 2);

        a.transfer_control(&mut b).unwrap();
        assert!(!a.is_open());
        assert_eq!(b.share_count(), 1);

        b.write_byte(0x55).await.unwrap();
        b.flush().await.unwrap();
        assert_eq!(server.read_byte().await.unwrap(), 0x55);
    }

    #[tokio::test]
    async fn test_transfer_control_to_foreign_connection_fails() {
        let (mut a, _server_a) = pair().await;
        let (mut b, _server_b) = pair().await;

        let err = a.transfer_control(&mut b).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IllegalOperation);
        assert!(a.is_open());
        assert!(b.is_open());
    }

    #[tokio::test]
    async fn test_duplicate_keeps_connection_until_last_close() {
        let (mut a, mut server) = pair().await;
        let mut b = a.duplicate().unwrap();

        a.close().await.unwrap();
        assert!(!a.is_open());

        b.write_byte(1).await.unwrap();
        b.flush().await.unwrap();
        assert_eq!(server.read_byte().await.unwrap(), 1);

        b.close().await.unwrap();
        let mut buf = [0u8; 1];
        assert_eq!(server.read_into(&mut buf).await.unwrap(), 0);

        // Closing again is a no-op
        b.close().await.unwrap();
    }
}
