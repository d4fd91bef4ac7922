//! Wire codec for controller↔renderer frames.
//!
//! Length-prefixed frames with a type tag:
//!
//! ```text
//! [u64 NE payload_length] [u32 NE message_type] [payload: payload_length bytes]
//! ```
//!
//! Both peers are the same build on the same machine, so integers are in
//! host-native byte order and the type tag is the [`MessageType`] ordinal.
//! `payload_length` covers the payload only.
//!
//! The codec never interprets the payload; turning bytes into a typed
//! message is the caller's job, keyed off the returned [`MessageType`].

// Rust guideline compliant 2026-02

use thiserror::Error;

use crate::constants::{LENGTH_FIELD_SIZE, MAX_FRAME_SIZE, TYPE_FIELD_SIZE};
use crate::transport::{ByteSink, ByteSource, TransportError};

use super::MessageType;

/// Framing failures. Every variant is fatal to the connection.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The advertised payload length exceeds [`MAX_FRAME_SIZE`].
    #[error("frame too large: {length} bytes (max {max})")]
    FrameTooLarge {
        /// Advertised payload length.
        length: u64,
        /// The hard ceiling.
        max: u64,
    },

    /// The stream ended in the middle of a frame.
    #[error("short read: stream ended after {received} of {expected} bytes")]
    ShortRead {
        /// Bytes required to complete the current field.
        expected: usize,
        /// Bytes that arrived before end of stream.
        received: usize,
    },

    /// The type tag is not part of the message catalogue.
    #[error("unknown message type: {0}")]
    UnknownType(u32),

    /// The peer closed the connection cleanly between two frames.
    #[error("connection closed")]
    ConnectionClosed,

    /// Underlying transport failure (broken pipe, I/O error).
    #[error(transparent)]
    Transport(TransportError),
}

impl FrameError {
    /// `true` when the peer simply went away (clean close or broken pipe).
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            FrameError::ConnectionClosed
                | FrameError::ShortRead { .. }
                | FrameError::Transport(
                    TransportError::BrokenPipe | TransportError::ConnectionClosed { .. }
                )
        )
    }
}

/// Encode one frame into a wire-format byte vector.
///
/// Returns `[u64 length][u32 type][payload]` with no padding.
pub fn encode(ty: MessageType, payload: &[u8]) -> Vec<u8> {
    let length = payload.len() as u64;
    let mut buf = Vec::with_capacity(LENGTH_FIELD_SIZE + TYPE_FIELD_SIZE + payload.len());
    buf.extend_from_slice(&length.to_ne_bytes());
    buf.extend_from_slice(&ty.as_u32().to_ne_bytes());
    buf.extend_from_slice(payload);
    buf
}

/// Encode and write one frame with a single `write_all`.
///
/// Refuses payloads above the ceiling so a well-behaved peer never sends a
/// frame the other side is bound to reject.
pub fn write_frame<S: ByteSink + ?Sized>(
    sink: &mut S,
    ty: MessageType,
    payload: &[u8],
) -> Result<(), FrameError> {
    let length = payload.len() as u64;
    if length > MAX_FRAME_SIZE {
        return Err(FrameError::FrameTooLarge {
            length,
            max: MAX_FRAME_SIZE,
        });
    }
    sink.write_all_bytes(&encode(ty, payload))
        .map_err(FrameError::Transport)
}

/// Read exactly one frame from `source`.
///
/// The length is validated before anything else is read or allocated; an
/// oversized length leaves the rest of the stream untouched.
pub fn read_frame<S: ByteSource + ?Sized>(
    source: &mut S,
) -> Result<(MessageType, Vec<u8>), FrameError> {
    let mut len_buf = [0u8; LENGTH_FIELD_SIZE];
    source.read_exact_bytes(&mut len_buf).map_err(|e| match e {
        TransportError::ConnectionClosed { received: 0, .. } => FrameError::ConnectionClosed,
        other => mid_frame(other),
    })?;

    let length = u64::from_ne_bytes(len_buf);
    if length > MAX_FRAME_SIZE {
        return Err(FrameError::FrameTooLarge {
            length,
            max: MAX_FRAME_SIZE,
        });
    }

    let mut type_buf = [0u8; TYPE_FIELD_SIZE];
    source.read_exact_bytes(&mut type_buf).map_err(mid_frame)?;
    let raw_type = u32::from_ne_bytes(type_buf);
    let ty = MessageType::from_u32(raw_type).ok_or(FrameError::UnknownType(raw_type))?;

    let mut payload = vec![0u8; length as usize];
    source.read_exact_bytes(&mut payload).map_err(mid_frame)?;

    Ok((ty, payload))
}

/// Once the length prefix has started, any early end of stream is a torn frame.
fn mid_frame(e: TransportError) -> FrameError {
    match e {
        TransportError::ConnectionClosed { expected, received } => {
            FrameError::ShortRead { expected, received }
        }
        other => FrameError::Transport(other),
    }
}

// ─── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_round_trip() {
        let payload = br#"{"mid":"abc@example.com","hidden":true}"#;
        let encoded = encode(MessageType::Hidden, payload);
        let mut cursor = Cursor::new(encoded);
        let (ty, decoded) = read_frame(&mut cursor).unwrap();
        assert_eq!(ty, MessageType::Hidden);
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_header_layout() {
        let encoded = encode(MessageType::Ack, b"xyz");
        assert_eq!(encoded.len(), LENGTH_FIELD_SIZE + TYPE_FIELD_SIZE + 3);
        assert_eq!(&encoded[..8], &3u64.to_ne_bytes());
        assert_eq!(&encoded[8..12], &MessageType::Ack.as_u32().to_ne_bytes());
        assert_eq!(&encoded[12..], b"xyz");
    }

    #[test]
    fn test_empty_payload_round_trip() {
        let mut cursor = Cursor::new(encode(MessageType::ClearMessages, b""));
        let (ty, payload) = read_frame(&mut cursor).unwrap();
        assert_eq!(ty, MessageType::ClearMessages);
        assert!(payload.is_empty());
    }

    #[test]
    fn test_back_to_back_frames_decode_in_order() {
        let mut buf = Vec::new();
        write_frame(&mut buf, MessageType::AddMessage, b"first").unwrap();
        write_frame(&mut buf, MessageType::Navigate, b"second").unwrap();

        let mut cursor = Cursor::new(buf);
        let (t1, p1) = read_frame(&mut cursor).unwrap();
        let (t2, p2) = read_frame(&mut cursor).unwrap();
        assert_eq!((t1, p1.as_slice()), (MessageType::AddMessage, &b"first"[..]));
        assert_eq!((t2, p2.as_slice()), (MessageType::Navigate, &b"second"[..]));
        assert!(matches!(read_frame(&mut cursor), Err(FrameError::ConnectionClosed)));
    }

    #[test]
    fn test_oversized_frame_rejected_without_consuming_more() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(MAX_FRAME_SIZE + 1).to_ne_bytes());
        buf.extend_from_slice(&MessageType::State.as_u32().to_ne_bytes());
        buf.extend_from_slice(&[0u8; 16]);

        let mut cursor = Cursor::new(buf);
        match read_frame(&mut cursor) {
            Err(FrameError::FrameTooLarge { length, max }) => {
                assert_eq!(length, MAX_FRAME_SIZE + 1);
                assert_eq!(max, MAX_FRAME_SIZE);
            }
            other => panic!("expected FrameTooLarge, got {other:?}"),
        }
        assert_eq!(cursor.position(), LENGTH_FIELD_SIZE as u64);
    }

    #[test]
    fn test_frame_at_ceiling_length_is_not_rejected_early() {
        // Exactly MAX_FRAME_SIZE is allowed; the stream then ends early.
        let mut buf = Vec::new();
        buf.extend_from_slice(&MAX_FRAME_SIZE.to_ne_bytes());
        buf.extend_from_slice(&MessageType::State.as_u32().to_ne_bytes());
        let mut cursor = Cursor::new(buf);
        assert!(matches!(
            read_frame(&mut cursor),
            Err(FrameError::ShortRead { received: 0, .. })
        ));
    }

    #[test]
    fn test_truncated_payload_is_short_read() {
        let mut encoded = encode(MessageType::Debug, b"hello world");
        encoded.truncate(encoded.len() - 4);
        let mut cursor = Cursor::new(encoded);
        match read_frame(&mut cursor) {
            Err(FrameError::ShortRead { expected, received }) => {
                assert_eq!(expected, 11);
                assert_eq!(received, 7);
            }
            other => panic!("expected ShortRead, got {other:?}"),
        }
    }

    #[test]
    fn test_truncated_length_prefix_is_short_read() {
        let mut cursor = Cursor::new(vec![5u8, 0, 0]);
        assert!(matches!(
            read_frame(&mut cursor),
            Err(FrameError::ShortRead { expected: 8, received: 3 })
        ));
    }

    #[test]
    fn test_unknown_frame_type_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&4u64.to_ne_bytes());
        buf.extend_from_slice(&0xFFu32.to_ne_bytes());
        buf.extend_from_slice(b"test");
        let mut cursor = Cursor::new(buf);
        assert!(matches!(read_frame(&mut cursor), Err(FrameError::UnknownType(0xFF))));
    }

    #[test]
    fn test_clean_close_between_frames() {
        let mut cursor = Cursor::new(Vec::new());
        let err = read_frame(&mut cursor).unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
        assert!(err.is_disconnect());
    }

    #[test]
    fn test_large_payload_round_trip() {
        let payload = vec![0x42u8; 256 * 1024];
        let mut cursor = Cursor::new(encode(MessageType::State, &payload));
        let (_, decoded) = read_frame(&mut cursor).unwrap();
        assert_eq!(decoded.len(), payload.len());
    }

    #[test]
    fn test_round_trip_over_socket() {
        let (mut a, mut b) = std::os::unix::net::UnixStream::pair().unwrap();
        let writer = std::thread::spawn(move || {
            write_frame(&mut a, MessageType::Page, b"<html/>").unwrap();
            write_frame(&mut a, MessageType::Focus, b"{}").unwrap();
        });
        assert_eq!(read_frame(&mut b).unwrap(), (MessageType::Page, b"<html/>".to_vec()));
        assert_eq!(read_frame(&mut b).unwrap(), (MessageType::Focus, b"{}".to_vec()));
        writer.join().unwrap();
        assert!(matches!(read_frame(&mut b), Err(FrameError::ConnectionClosed)));
    }
}
