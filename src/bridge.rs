//! Controller-side request/acknowledge bridge.
//!
//! The controller talks to the renderer through one duplex stream split into
//! a read half and a write half, each behind its own lock:
//!
//! - [`Bridge::send_async`] takes only the write lock and sends one frame.
//!   Reserved for types the renderer never acknowledges (`Debug`).
//! - [`Bridge::send_sync`] takes the read lock, then the write lock, holds
//!   both for the whole round trip, and returns the renderer's `Ack`.
//!
//! Lock order is always read → write, so concurrent `send_sync` callers are
//! strictly serialized and an `Ack` is never consumed by the wrong caller.
//!
//! # Failure model
//!
//! - Protocol violations ([`BridgeError::UnexpectedFrame`],
//!   [`BridgeError::NoReply`], [`BridgeError::MalformedAck`]) do not surface
//!   as errors from `send_sync`; they are logged and reported as a failed
//!   [`AckResult`] carrying the last known focus. The caller should resync.
//! - A dead peer marks the bridge closed; later calls fail fast with
//!   [`BridgeError::Closed`].
//! - Transport failures while writing and corrupt frames propagate.

// Rust guideline compliant 2026-02

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;

use crate::protocol::framing::{read_frame, write_frame, FrameError};
use crate::protocol::{AckResult, MessageType, Payload};
use crate::state::FocusCursor;

/// Bridge failures.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Framing or transport failure.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// The renderer connection was already lost.
    #[error("renderer connection is closed")]
    Closed,

    /// An acknowledged type was passed to `send_async`.
    #[error("{0:?} frames are acknowledged and must be sent with send_sync")]
    RequiresAck(MessageType),

    /// A payload could not be serialized.
    #[error("encode payload: {0}")]
    Encode(#[from] serde_json::Error),

    /// The renderer answered with something other than `Ack`.
    #[error("expected Ack in reply to {sent:?}, got {received:?}")]
    UnexpectedFrame {
        /// Type of the request.
        sent: MessageType,
        /// Type of the reply.
        received: MessageType,
    },

    /// The renderer went away before acknowledging.
    #[error("renderer disconnected before acknowledging {0:?}")]
    NoReply(MessageType),

    /// The `Ack` payload could not be decoded.
    #[error("malformed Ack payload: {0}")]
    MalformedAck(serde_json::Error),
}

impl BridgeError {
    /// Protocol violations are reported as a failed ack rather than an error.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            BridgeError::UnexpectedFrame { .. }
                | BridgeError::NoReply(_)
                | BridgeError::MalformedAck(_)
        )
    }
}

/// Synchronous command channel to the renderer.
#[derive(Debug)]
pub struct Bridge<R, W> {
    reader: Mutex<R>,
    writer: Mutex<W>,
    last_focus: Mutex<FocusCursor>,
    closed: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<R: Read, W: Write> Bridge<R, W> {
    /// Wrap the two halves of an established connection.
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            last_focus: Mutex::new(FocusCursor::unset()),
            closed: AtomicBool::new(false),
        }
    }

    /// Send a frame that expects no reply.
    pub fn send_async(&self, ty: MessageType, payload: &[u8]) -> Result<(), BridgeError> {
        if ty.expects_ack() {
            return Err(BridgeError::RequiresAck(ty));
        }
        self.ensure_open()?;

        let mut writer = lock(&self.writer);
        write_frame(&mut *writer, ty, payload).map_err(|e| self.on_frame_error(e))
    }

    /// Send a frame and block until the renderer acknowledges it.
    pub fn send_sync(&self, ty: MessageType, payload: &[u8]) -> Result<AckResult, BridgeError> {
        self.ensure_open()?;

        match self.exchange(ty, payload) {
            Ok(ack) => {
                *lock(&self.last_focus) = ack.focus.clone();
                Ok(ack)
            }
            Err(e) if e.is_protocol_error() => {
                log::error!("[bridge] {e}; reporting failure");
                Ok(AckResult::failed(self.last_focus()))
            }
            Err(e) => Err(e),
        }
    }

    /// Serialize and send a typed payload with [`Bridge::send_sync`].
    pub fn send_sync_payload<P: Payload>(&self, payload: &P) -> Result<AckResult, BridgeError> {
        let bytes = payload.to_bytes()?;
        self.send_sync(P::TYPE, &bytes)
    }

    /// Serialize and send a typed payload with [`Bridge::send_async`].
    pub fn send_async_payload<P: Payload>(&self, payload: &P) -> Result<(), BridgeError> {
        let bytes = payload.to_bytes()?;
        self.send_async(P::TYPE, &bytes)
    }

    /// Focus reported by the most recent successful `Ack`.
    pub fn last_focus(&self) -> FocusCursor {
        lock(&self.last_focus).clone()
    }

    /// Whether the renderer connection has been lost.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn exchange(&self, ty: MessageType, payload: &[u8]) -> Result<AckResult, BridgeError> {
        let mut reader = lock(&self.reader);
        let mut writer = lock(&self.writer);

        write_frame(&mut *writer, ty, payload).map_err(|e| self.on_frame_error(e))?;

        let (reply, bytes) = match read_frame(&mut *reader) {
            Ok(frame) => frame,
            Err(e) if e.is_disconnect() => {
                self.closed.store(true, Ordering::Release);
                return Err(BridgeError::NoReply(ty));
            }
            Err(e) => return Err(self.on_frame_error(e)),
        };

        if reply != MessageType::Ack {
            return Err(BridgeError::UnexpectedFrame {
                sent: ty,
                received: reply,
            });
        }
        AckResult::from_bytes(&bytes).map_err(BridgeError::MalformedAck)
    }

    fn ensure_open(&self) -> Result<(), BridgeError> {
        if self.is_closed() {
            Err(BridgeError::Closed)
        } else {
            Ok(())
        }
    }

    fn on_frame_error(&self, e: FrameError) -> BridgeError {
        log::error!("[bridge] connection failed: {e}");
        self.closed.store(true, Ordering::Release);
        BridgeError::Frame(e)
    }
}

// ─── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{DebugLog, RemoveMessage, StateSnapshot};
    use std::io::ErrorKind;
    use std::os::unix::net::UnixStream;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn bridge_pair() -> (Bridge<UnixStream, UnixStream>, UnixStream) {
        let (ours, theirs) = UnixStream::pair().unwrap();
        let reader = ours.try_clone().unwrap();
        (Bridge::new(reader, ours), theirs)
    }

    fn ack(stream: &mut UnixStream, focus: FocusCursor) {
        let bytes = AckResult {
            success: true,
            focus,
        }
        .to_bytes()
        .unwrap();
        write_frame(stream, MessageType::Ack, &bytes).unwrap();
    }

    #[test]
    fn test_send_sync_returns_ack_and_tracks_focus() {
        let (bridge, mut peer) = bridge_pair();
        let renderer = thread::spawn(move || {
            let (ty, payload) = read_frame(&mut peer).unwrap();
            assert_eq!(ty, MessageType::RemoveMessage);
            let cmd = RemoveMessage::from_bytes(&payload).unwrap();
            ack(&mut peer, FocusCursor::at(cmd.mid, 0));
        });

        let result = bridge
            .send_sync_payload(&RemoveMessage { mid: "m2".into() })
            .unwrap();
        renderer.join().unwrap();

        assert!(result.success);
        assert_eq!(result.focus, FocusCursor::at("m2", 0));
        assert_eq!(bridge.last_focus(), FocusCursor::at("m2", 0));
    }

    #[test]
    fn test_send_async_writes_debug_without_waiting() {
        let (bridge, mut peer) = bridge_pair();
        bridge
            .send_async_payload(&DebugLog { msg: "hello".into() })
            .unwrap();
        let (ty, payload) = read_frame(&mut peer).unwrap();
        assert_eq!(ty, MessageType::Debug);
        assert_eq!(DebugLog::from_bytes(&payload).unwrap().msg, "hello");
    }

    #[test]
    fn test_send_async_refuses_acknowledged_types() {
        let (bridge, _peer) = bridge_pair();
        assert!(matches!(
            bridge.send_async(MessageType::AddMessage, b"{}"),
            Err(BridgeError::RequiresAck(MessageType::AddMessage))
        ));
    }

    #[test]
    fn test_unexpected_reply_is_failed_ack_with_last_focus() {
        let (bridge, mut peer) = bridge_pair();
        let renderer = thread::spawn(move || {
            read_frame(&mut peer).unwrap();
            ack(&mut peer, FocusCursor::at("m1", 1));
            read_frame(&mut peer).unwrap();
            let snapshot = StateSnapshot {
                messages: Vec::new(),
                focus: FocusCursor::unset(),
            };
            write_frame(&mut peer, MessageType::State, &snapshot.to_bytes().unwrap()).unwrap();
            peer
        });

        bridge.send_sync(MessageType::Mark, b"{}").unwrap();
        let result = bridge.send_sync(MessageType::Hidden, b"{}").unwrap();
        let _peer = renderer.join().unwrap();

        assert!(!result.success);
        assert_eq!(result.focus, FocusCursor::at("m1", 1));
        assert!(!bridge.is_closed());
    }

    #[test]
    fn test_disconnect_before_ack_fails_then_closes() {
        let (bridge, mut peer) = bridge_pair();
        let renderer = thread::spawn(move || {
            read_frame(&mut peer).unwrap();
            drop(peer);
        });

        let result = bridge.send_sync(MessageType::Focus, b"{}").unwrap();
        renderer.join().unwrap();

        assert!(!result.success);
        assert!(bridge.is_closed());
        assert!(matches!(
            bridge.send_sync(MessageType::Focus, b"{}"),
            Err(BridgeError::Closed)
        ));
    }

    #[test]
    fn test_malformed_ack_is_failed_ack() {
        let (bridge, mut peer) = bridge_pair();
        let renderer = thread::spawn(move || {
            read_frame(&mut peer).unwrap();
            write_frame(&mut peer, MessageType::Ack, b"not json").unwrap();
            peer
        });
        let result = bridge.send_sync(MessageType::Navigate, b"{}").unwrap();
        let _peer = renderer.join().unwrap();
        assert!(!result.success);
    }

    #[test]
    fn test_write_to_dead_peer_is_error() {
        let (bridge, peer) = bridge_pair();
        drop(peer);
        let err = bridge.send_sync(MessageType::Mark, b"{}").unwrap_err();
        assert!(matches!(err, BridgeError::Frame(_)), "got {err:?}");
        assert!(bridge.is_closed());
    }

    #[test]
    fn test_concurrent_send_sync_is_serialized() {
        let (bridge, mut peer) = bridge_pair();
        let bridge = Arc::new(bridge);
        const CALLS: usize = 8;

        let renderer = thread::spawn(move || {
            for i in 0..CALLS {
                let (ty, _) = read_frame(&mut peer).unwrap();
                assert_eq!(ty, MessageType::Focus);

                // No other request may arrive until this one is acknowledged.
                peer.set_read_timeout(Some(Duration::from_millis(30))).unwrap();
                let mut byte = [0u8; 1];
                match std::io::Read::read(&mut peer, &mut byte) {
                    Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
                    other => panic!("request {i} overlapped with another: {other:?}"),
                }
                peer.set_read_timeout(None).unwrap();

                ack(&mut peer, FocusCursor::at(format!("m{i}"), 0));
            }
        });

        let callers: Vec<_> = (0..CALLS)
            .map(|_| {
                let bridge = Arc::clone(&bridge);
                thread::spawn(move || bridge.send_sync(MessageType::Focus, b"{}").unwrap())
            })
            .collect();

        let mut focuses: Vec<String> = callers
            .into_iter()
            .map(|h| {
                let ack = h.join().unwrap();
                assert!(ack.success);
                ack.focus.message_id.unwrap()
            })
            .collect();
        renderer.join().unwrap();

        focuses.sort();
        let mut expected: Vec<String> = (0..CALLS).map(|i| format!("m{i}")).collect();
        expected.sort();
        assert_eq!(focuses, expected);
    }
}
