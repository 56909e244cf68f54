//! The connector capability and its tagged handle.
//!
//! Implementors supply raw byte reads and writes; the typed primitives are
//! provided methods built on top of them so every connector frames values
//! the same way.

use crate::error::ConnectorError;
use crate::stream::StreamConnector;
use async_trait::async_trait;
use netadapter_protocol::wire::{self, INT_SIZE};
use netadapter_protocol::{Command, ReturnCode};
use std::time::Duration;

/// Framed primitive I/O over one connection.
#[async_trait]
pub trait Connector: Send {
    /// Reads whatever is available, up to `buf.len()` bytes.
    ///
    /// Returns the number of bytes read; 0 means the peer closed the stream.
    async fn read_into(&mut self, buf: &mut [u8]) -> Result<usize, ConnectorError>;

    /// Fills `buf` completely or fails.
    async fn read_fully(&mut self, buf: &mut [u8]) -> Result<(), ConnectorError>;

    /// Writes raw bytes.
    async fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), ConnectorError>;

    /// Flushes buffered writes to the peer.
    async fn flush(&mut self) -> Result<(), ConnectorError>;

    /// Sets the deadline applied to each read and flush.
    fn set_timeout(&mut self, timeout: Duration) -> Result<(), ConnectorError>;

    /// Describes where to dial to reach the same peer again.
    fn reconnect_address(&self) -> &str;

    /// Releases this handle's hold on the connection.
    async fn close(&mut self) -> Result<(), ConnectorError>;

    async fn read_byte(&mut self) -> Result<u8, ConnectorError> {
        let mut byte = [0u8; 1];
        self.read_fully(&mut byte).await?;
        Ok(byte[0])
    }

    async fn read_bool(&mut self) -> Result<bool, ConnectorError> {
        Ok(wire::decode_bool(self.read_byte().await?))
    }

    async fn read_int(&mut self) -> Result<i32, ConnectorError> {
        let mut bytes = [0u8; INT_SIZE];
        for byte in bytes.iter_mut() {
            *byte = self.read_byte().await?;
        }
        Ok(wire::decode_int(bytes))
    }

    async fn read_text(&mut self) -> Result<String, ConnectorError> {
        let hi = self.read_byte().await?;
        let lo = self.read_byte().await?;
        let len = u16::from_be_bytes([hi, lo]) as usize;

        let mut bytes = Vec::with_capacity(len);
        for _ in 0..len {
            bytes.push(self.read_byte().await?);
        }
        Ok(wire::decode_text(bytes)?)
    }

    async fn write_byte(&mut self, byte: u8) -> Result<(), ConnectorError> {
        self.write_bytes(&[byte]).await
    }

    async fn write_bool(&mut self, value: bool) -> Result<(), ConnectorError> {
        self.write_byte(wire::encode_bool(value)).await
    }

    async fn write_int(&mut self, value: i32) -> Result<(), ConnectorError> {
        for byte in wire::encode_int(value) {
            self.write_byte(byte).await?;
        }
        Ok(())
    }

    async fn write_text(&mut self, text: &str) -> Result<(), ConnectorError> {
        let len = wire::text_len(text)?;
        for byte in len.to_be_bytes() {
            self.write_byte(byte).await?;
        }
        for &byte in text.as_bytes() {
            self.write_byte(byte).await?;
        }
        Ok(())
    }

    /// Writes a command code.
    async fn write_command(&mut self, command: Command) -> Result<(), ConnectorError> {
        tracing::trace!("Sending command {}", command);
        self.write_byte(command.code()).await
    }

    /// Reads the return code that follows every command.
    async fn read_return_code(&mut self) -> Result<ReturnCode, ConnectorError> {
        let code = self.read_byte().await?;
        Ok(ReturnCode::try_from(code)?)
    }

    /// Reads a return code and fails unless it reports success.
    async fn expect_success(&mut self) -> Result<(), ConnectorError> {
        match self.read_return_code().await? {
            ReturnCode::Success => Ok(()),
            code => Err(ConnectorError::Rejected(code)),
        }
    }
}

const EMPTY: &str = "connector is not connected";

/// A connector that may not be connected yet.
///
/// `Empty` stands in before a connection exists and fails every
/// operation with [`ConnectorError::IllegalOperation`].
#[derive(Debug, Default)]
pub enum ConnectorHandle {
    #[default]
    Empty,
    Stream(StreamConnector),
}

impl ConnectorHandle {
    /// Returns whether this handle holds no connector.
    pub fn is_empty(&self) -> bool {
        matches!(self, ConnectorHandle::Empty)
    }

    /// Returns the stream connector, if any.
    pub fn as_stream(&self) -> Option<&StreamConnector> {
        match self {
            ConnectorHandle::Stream(stream) => Some(stream),
            ConnectorHandle::Empty => None,
        }
    }

    /// Returns the stream connector mutably, if any.
    pub fn as_stream_mut(&mut self) -> Option<&mut StreamConnector> {
        match self {
            ConnectorHandle::Stream(stream) => Some(stream),
            ConnectorHandle::Empty => None,
        }
    }

    fn stream(&mut self) -> Result<&mut StreamConnector, ConnectorError> {
        self.as_stream_mut()
            .ok_or(ConnectorError::IllegalOperation(EMPTY))
    }

    /// Returns a second handle sharing this handle's connection.
    pub fn duplicate(&self) -> Result<Self, ConnectorError> {
        match self {
            ConnectorHandle::Stream(stream) => Ok(ConnectorHandle::Stream(stream.duplicate()?)),
            ConnectorHandle::Empty => Err(ConnectorError::IllegalOperation(EMPTY)),
        }
    }

    /// Moves control of the connection to `other`.
    ///
    /// An empty `other` receives the connection; a connected `other` must
    /// already share it. Afterwards `self` is empty.
    pub fn transfer_control(&mut self, other: &mut Self) -> Result<(), ConnectorError> {
        let ConnectorHandle::Stream(source) = self else {
            return Err(ConnectorError::IllegalOperation(EMPTY));
        };
        match other {
            ConnectorHandle::Stream(target) => source.transfer_control(target)?,
            ConnectorHandle::Empty => *other = ConnectorHandle::Stream(source.take_control()?),
        }
        *self = ConnectorHandle::Empty;
        Ok(())
    }
}

impl From<StreamConnector> for ConnectorHandle {
    fn from(stream: StreamConnector) -> Self {
        ConnectorHandle::Stream(stream)
    }
}

#[async_trait]
impl Connector for ConnectorHandle {
    async fn read_into(&mut self, buf: &mut [u8]) -> Result<usize, ConnectorError> {
        self.stream()?.read_into(buf).await
    }

    async fn read_fully(&mut self, buf: &mut [u8]) -> Result<(), ConnectorError> {
        self.stream()?.read_fully(buf).await
    }

    async fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), ConnectorError> {
        self.stream()?.write_bytes(bytes).await
    }

    async fn flush(&mut self) -> Result<(), ConnectorError> {
        self.stream()?.flush().await
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), ConnectorError> {
        self.stream()?.set_timeout(timeout)
    }

    fn reconnect_address(&self) -> &str {
        match self {
            ConnectorHandle::Stream(stream) => stream.reconnect_address(),
            ConnectorHandle::Empty => "",
        }
    }

    async fn close(&mut self) -> Result<(), ConnectorError> {
        self.stream()?.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::ConnectorConfig;
    use netadapter_protocol::ErrorKind;
    use tokio::net::TcpListener;

    async fn pair() -> (ConnectorHandle, StreamConnector) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = ConnectorConfig::new(listener.local_addr().unwrap().to_string())
            .with_read_timeout(Duration::from_millis(500));
        let (client, host) = tokio::join!(
            StreamConnector::connect(&config),
            StreamConnector::accept(&listener, Duration::from_millis(500)),
        );
        (client.unwrap().into(), host.unwrap())
    }

    fn assert_illegal<T: std::fmt::Debug>(result: Result<T, ConnectorError>) {
        match result {
            Err(e) => assert_eq!(e.kind(), ErrorKind::IllegalOperation),
            Ok(v) => panic!("expected IllegalOperation, got {:?}", v),
        }
    }

    #[tokio::test]
    async fn test_empty_handle_fails_every_operation() {
        let mut handle = ConnectorHandle::default();
        assert!(handle.is_empty());

        let mut buf = [0u8; 4];
        assert_illegal(handle.read_byte().await);
        assert_illegal(handle.read_bool().await);
        assert_illegal(handle.read_int().await);
        assert_illegal(handle.read_text().await);
        assert_illegal(handle.read_into(&mut buf).await);
        assert_illegal(handle.read_fully(&mut buf).await);
        assert_illegal(handle.write_byte(1).await);
        assert_illegal(handle.write_bool(true).await);
        assert_illegal(handle.write_int(1).await);
        assert_illegal(handle.write_text("x").await);
        assert_illegal(handle.write_bytes(&buf).await);
        assert_illegal(handle.write_command(Command::PingConnection).await);
        assert_illegal(handle.flush().await);
        assert_illegal(handle.set_timeout(Duration::from_secs(1)));
        assert_illegal(handle.close().await);
        assert_illegal(handle.duplicate());

        let mut other = ConnectorHandle::Empty;
        assert_illegal(handle.transfer_control(&mut other));
        assert!(other.is_empty());

        assert_eq!(handle.reconnect_address(), "");
    }

    #[tokio::test]
    async fn test_transfer_control_into_empty_handle() {
        let (mut a, mut host) = pair().await;
        let mut b = ConnectorHandle::Empty;

        a.transfer_control(&mut b).unwrap();
        assert!(a.is_empty());
        assert!(!b.is_empty());

        assert_illegal(a.write_byte(1).await);
        assert_illegal(a.read_byte().await);
        // The released source is an empty handle, so close fails too.
        assert_illegal(a.close().await);

        b.write_text("moved").await.unwrap();
        b.flush().await.unwrap();
        assert_eq!(host.read_text().await.unwrap(), "moved");
    }

    #[tokio::test]
    async fn test_duplicate_handle_shares_connection() {
        let (a, mut host) = pair().await;
        let mut b = a.duplicate().unwrap();
        assert_eq!(a.as_stream().unwrap().share_count(), 2);

        b.write_bool(true).await.unwrap();
        b.flush().await.unwrap();
        assert!(host.read_bool().await.unwrap());
    }
}
