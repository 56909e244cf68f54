//! Protocol version handshake.
//!
//! Before command traffic the adapter host sends its version tag followed
//! by the terminator byte; the client refuses to continue on a mismatch.

use crate::connector::Connector;
use crate::error::ConnectorError;
use netadapter_protocol::{ProtocolError, PROTOCOL_VERSION, TERMINATOR};

/// Host side: announces the protocol version.
pub async fn offer<C>(conn: &mut C) -> Result<(), ConnectorError>
where
    C: Connector + ?Sized,
{
    conn.write_int(PROTOCOL_VERSION).await?;
    conn.write_byte(TERMINATOR).await?;
    conn.flush().await
}

/// Client side: reads and checks the announced protocol version.
pub async fn accept<C>(conn: &mut C) -> Result<i32, ConnectorError>
where
    C: Connector + ?Sized,
{
    let version = conn.read_int().await?;
    if version != PROTOCOL_VERSION {
        tracing::warn!(
            "Adapter host at {} speaks protocol version {} (expected {})",
            conn.reconnect_address(),
            version,
            PROTOCOL_VERSION
        );
        return Err(ProtocolError::UnsupportedVersion(version).into());
    }

    let terminator = conn.read_byte().await?;
    if terminator != TERMINATOR {
        return Err(ProtocolError::InvalidTerminator(terminator).into());
    }

    tracing::debug!("Handshake with {} complete", conn.reconnect_address());
    Ok(version)
}
