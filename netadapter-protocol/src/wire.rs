//! Primitive value framing for the command stream.
//!
//! ```text
//! +---------+--------------------------------------------------+
//! | byte    | 1 byte, verbatim                                 |
//! | boolean | 1 byte, 0xFF = true, 0x00 = false                |
//! | int32   | 4 bytes, big-endian                              |
//! | text    | 2-byte big-endian byte length + UTF-8 bytes      |
//! +---------+--------------------------------------------------+
//! ```

use crate::error::ProtocolError;
use bytes::{Buf, BufMut, BytesMut};

/// Encoded size of an int32.
pub const INT_SIZE: usize = 4;

/// Size of the length prefix in front of text.
pub const TEXT_LEN_SIZE: usize = 2;

/// Largest text payload, in bytes, that fits the length prefix.
pub const MAX_TEXT_LEN: usize = u16::MAX as usize;

/// Encoding of `true`.
pub const TRUE_BYTE: u8 = 0xFF;

/// Encoding of `false`.
pub const FALSE_BYTE: u8 = 0x00;

/// Encodes a boolean.
pub fn encode_bool(value: bool) -> u8 {
    if value {
        TRUE_BYTE
    } else {
        FALSE_BYTE
    }
}

/// Decodes a boolean. Any non-zero byte reads as `true`.
pub fn decode_bool(byte: u8) -> bool {
    byte != FALSE_BYTE
}

/// Encodes an int32, most significant byte first.
pub fn encode_int(value: i32) -> [u8; INT_SIZE] {
    value.to_be_bytes()
}

/// Decodes a big-endian int32.
pub fn decode_int(bytes: [u8; INT_SIZE]) -> i32 {
    i32::from_be_bytes(bytes)
}

/// Returns the length prefix for `text`, or an error if it does not fit.
pub fn text_len(text: &str) -> Result<u16, ProtocolError> {
    u16::try_from(text.len()).map_err(|_| ProtocolError::TextTooLong {
        len: text.len(),
        max: MAX_TEXT_LEN,
    })
}

/// Appends length-prefixed text to `buf`.
pub fn put_text(buf: &mut impl BufMut, text: &str) -> Result<(), ProtocolError> {
    let len = text_len(text)?;
    buf.put_u16(len);
    buf.put_slice(text.as_bytes());
    Ok(())
}

/// Encodes length-prefixed text into a fresh buffer.
pub fn encode_text(text: &str) -> Result<BytesMut, ProtocolError> {
    let mut buf = BytesMut::with_capacity(TEXT_LEN_SIZE + text.len());
    put_text(&mut buf, text)?;
    Ok(buf)
}

/// Reads length-prefixed text from `buf`.
///
/// Nothing is consumed when the buffer holds less than a complete value.
pub fn get_text(buf: &mut BytesMut) -> Result<String, ProtocolError> {
    if buf.len() < TEXT_LEN_SIZE {
        return Err(ProtocolError::Incomplete {
            needed: TEXT_LEN_SIZE - buf.len(),
        });
    }

    let len = u16::from_be_bytes([buf[0], buf[1]]) as usize;
    let available = buf.len() - TEXT_LEN_SIZE;
    if available < len {
        return Err(ProtocolError::Incomplete {
            needed: len - available,
        });
    }

    buf.advance(TEXT_LEN_SIZE);
    let payload = buf.split_to(len);
    decode_text(payload.to_vec())
}

/// Converts a received text payload into a string.
pub fn decode_text(bytes: Vec<u8>) -> Result<String, ProtocolError> {
    String::from_utf8(bytes).map_err(|_| ProtocolError::InvalidUtf8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_bool_encoding() {
        assert_eq!(encode_bool(true), 0xFF);
        assert_eq!(encode_bool(false), 0x00);
        assert!(decode_bool(0xFF));
        assert!(!decode_bool(0x00));
        assert!(decode_bool(0x01));
    }

    #[test]
    fn test_int_is_big_endian() {
        assert_eq!(encode_int(0x0102_0304), [0x01, 0x02, 0x03, 0x04]);
        assert_eq!(encode_int(-1), [0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(encode_int(i32::MIN), [0x80, 0x00, 0x00, 0x00]);
        assert_eq!(decode_int([0x00, 0x00, 0x18, 0x15]), 6165);
    }

    #[test]
    fn test_text_layout() {
        let encoded = encode_text("hi").unwrap();
        assert_eq!(&encoded[..], &[0x00, 0x02, b'h', b'i']);

        // Length counts bytes, not chars
        let encoded = encode_text("é").unwrap();
        assert_eq!(&encoded[..], &[0x00, 0x02, 0xC3, 0xA9]);
    }

    #[test]
    fn test_empty_text() {
        let encoded = encode_text("").unwrap();
        assert_eq!(&encoded[..], &[0x00, 0x00]);

        let mut buf = encoded;
        assert_eq!(get_text(&mut buf).unwrap(), "");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_text_at_limit() {
        let text = "a".repeat(MAX_TEXT_LEN);
        let encoded = encode_text(&text).unwrap();
        assert_eq!(encoded.len(), MAX_TEXT_LEN + TEXT_LEN_SIZE);
        assert_eq!(&encoded[..2], &[0xFF, 0xFF]);
    }

    #[test]
    fn test_text_too_long() {
        let text = "a".repeat(MAX_TEXT_LEN + 1);
        let result = encode_text(&text);
        assert!(matches!(
            result,
            Err(ProtocolError::TextTooLong { len, max }) if len == MAX_TEXT_LEN + 1 && max == MAX_TEXT_LEN
        ));
    }

    #[test]
    fn test_incomplete_text_is_not_consumed() {
        let mut buf = BytesMut::from(&[0x00, 0x05, b'a', b'b'][..]);
        let result = get_text(&mut buf);
        assert!(matches!(result, Err(ProtocolError::Incomplete { needed: 3 })));
        assert_eq!(buf.len(), 4);

        let mut buf = BytesMut::from(&[0x00][..]);
        let result = get_text(&mut buf);
        assert!(matches!(result, Err(ProtocolError::Incomplete { needed: 1 })));
    }

    #[test]
    fn test_invalid_utf8() {
        let mut buf = BytesMut::from(&[0x00, 0x02, 0xC3, 0x28][..]);
        assert!(matches!(get_text(&mut buf), Err(ProtocolError::InvalidUtf8)));
    }

    #[test]
    fn test_multiple_values_in_buffer() {
        let mut buf = BytesMut::new();
        put_text(&mut buf, "first").unwrap();
        put_text(&mut buf, "second").unwrap();

        assert_eq!(get_text(&mut buf).unwrap(), "first");
        assert_eq!(get_text(&mut buf).unwrap(), "second");
    }

    proptest! {
        #[test]
        fn prop_int_roundtrip(value in any::<i32>()) {
            prop_assert_eq!(decode_int(encode_int(value)), value);
        }

        #[test]
        fn prop_text_roundtrip(text in ".{0,512}") {
            let mut buf = encode_text(&text).unwrap();
            prop_assert_eq!(get_text(&mut buf).unwrap(), text);
        }
    }
}
