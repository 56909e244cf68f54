//! Discovery datagram shapes.
//!
//! ```text
//! beacon (collector -> group):   | version int32 BE |
//! reply  (responder -> sender):  | listen port int32 BE | 0xFF |
//! ```

use crate::error::ProtocolError;
use crate::wire::{decode_int, encode_int, INT_SIZE};
use crate::{PROTOCOL_VERSION, TERMINATOR};

/// Size of a discovery reply from an adapter host.
pub const DISCOVERY_REPLY_SIZE: usize = INT_SIZE + 1;

/// Returns the beacon a collector multicasts to provoke replies.
pub fn version_beacon() -> [u8; INT_SIZE] {
    encode_int(PROTOCOL_VERSION)
}

/// Encodes the reply an adapter host listening on `listen_port` sends.
pub fn encode_discovery_reply(listen_port: i32) -> [u8; DISCOVERY_REPLY_SIZE] {
    let mut reply = [TERMINATOR; DISCOVERY_REPLY_SIZE];
    reply[..INT_SIZE].copy_from_slice(&encode_int(listen_port));
    reply
}

/// Decodes a discovery reply into the advertised listen port.
///
/// The payload must be exactly [`DISCOVERY_REPLY_SIZE`] bytes and end in
/// the terminator.
pub fn decode_discovery_reply(payload: &[u8]) -> Result<i32, ProtocolError> {
    if payload.len() != DISCOVERY_REPLY_SIZE {
        return Err(ProtocolError::MalformedReply {
            len: payload.len(),
        });
    }
    let terminator = payload[INT_SIZE];
    if terminator != TERMINATOR {
        return Err(ProtocolError::InvalidTerminator(terminator));
    }
    let mut port = [0u8; INT_SIZE];
    port.copy_from_slice(&payload[..INT_SIZE]);
    Ok(decode_int(port))
}
