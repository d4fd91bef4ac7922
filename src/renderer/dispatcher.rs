//! Renderer frame loop.
//!
//! ```text
//! socket ──► reader thread ──mpsc──► Dispatcher::run ──► Renderer::handle
//!                                         │
//!                                         └──► Ack frames ──► socket
//! ```
//!
//! The reader thread only decodes frames; it never touches renderer state.
//! Framing errors are fatal: the reader reports them and exits, and the
//! dispatcher returns the error so the process terminates.

use std::io::{Read, Write};
use std::path::Path;
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};

use crate::protocol::framing::{read_frame, write_frame, FrameError};
use crate::protocol::{MessageType, Payload};
use crate::transport::Channel;

use super::dom::Dom;
use super::{Renderer, Surface};

/// What the reader thread hands to the mutation context.
#[derive(Debug)]
pub enum Inbound {
    /// A complete frame.
    Frame(MessageType, Vec<u8>),
    /// The controller closed the connection between frames.
    Closed,
    /// The stream is corrupt or the transport failed.
    Failed(FrameError),
}

/// Spawn the reader thread.
pub fn spawn_reader<R: Read + Send + 'static>(
    mut reader: R,
) -> Result<(Receiver<Inbound>, JoinHandle<()>)> {
    let (tx, rx) = mpsc::channel();
    let handle = thread::Builder::new()
        .name("renderer-reader".to_string())
        .spawn(move || {
            loop {
                let inbound = match read_frame(&mut reader) {
                    Ok((ty, payload)) => Inbound::Frame(ty, payload),
                    Err(FrameError::ConnectionClosed) => Inbound::Closed,
                    Err(e) => Inbound::Failed(e),
                };
                let done = !matches!(inbound, Inbound::Frame(..));
                if tx.send(inbound).is_err() || done {
                    break;
                }
            }
            log::debug!("[dispatcher] reader thread exiting");
        })
        .context("spawn renderer reader thread")?;
    Ok((rx, handle))
}

/// Single-threaded mutation context: applies frames and writes `Ack`s.
#[derive(Debug)]
pub struct Dispatcher<S, W> {
    renderer: Renderer<S>,
    writer: W,
    inbound: Receiver<Inbound>,
}

impl<S: Surface, W: Write> Dispatcher<S, W> {
    /// Create a dispatcher over a renderer, the socket's write half, and the
    /// reader thread's channel.
    pub fn new(renderer: Renderer<S>, writer: W, inbound: Receiver<Inbound>) -> Self {
        Self {
            renderer,
            writer,
            inbound,
        }
    }

    /// Process frames until the controller disconnects.
    ///
    /// Returns the renderer on a clean close; any framing or transport
    /// failure is returned as an error.
    pub fn run(mut self) -> Result<Renderer<S>> {
        while let Ok(inbound) = self.inbound.recv() {
            match inbound {
                Inbound::Frame(ty, payload) => self.dispatch(ty, &payload)?,
                Inbound::Closed => {
                    log::info!("[dispatcher] controller disconnected");
                    return Ok(self.renderer);
                }
                Inbound::Failed(e) => {
                    log::error!("[dispatcher] fatal framing error: {e}");
                    return Err(e).context("read controller frame");
                }
            }
        }
        log::info!("[dispatcher] reader channel closed");
        Ok(self.renderer)
    }

    fn dispatch(&mut self, ty: MessageType, payload: &[u8]) -> Result<()> {
        let Some(ack) = self.renderer.handle(ty, payload) else {
            return Ok(());
        };
        let bytes = ack.to_bytes().context("encode Ack")?;
        write_frame(&mut self.writer, MessageType::Ack, &bytes)
            .with_context(|| format!("send Ack for {ty:?}"))
    }
}

/// Renderer process entry point: connect, serve, exit when the controller
/// goes away.
pub fn run_renderer(socket: &Path) -> Result<()> {
    let channel = Channel::connect(socket)?;
    let (reader, writer) = channel.split()?;
    let (inbound, reader_thread) = spawn_reader(reader)?;

    let renderer = Renderer::new(Dom::default());
    let result = Dispatcher::new(renderer, writer, inbound).run();

    if reader_thread.join().is_err() {
        log::warn!("[dispatcher] reader thread panicked");
    }
    result.map(|renderer| {
        log::info!(
            "[dispatcher] exiting with {} message(s) loaded",
            renderer.conversation().len()
        );
    })
}

// ─── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PageConfig;
    use crate::protocol::{AckResult, DebugLog, PageLoad};
    use std::io::Cursor;
    use std::os::unix::net::UnixStream;

    fn page_bytes() -> Vec<u8> {
        PageLoad {
            markup: "<html/>".into(),
            stylesheet: String::new(),
            config: PageConfig::default(),
        }
        .to_bytes()
        .unwrap()
    }

    #[test]
    fn test_reader_forwards_frames_then_closed() {
        let mut wire = Vec::new();
        write_frame(&mut wire, MessageType::Page, &page_bytes()).unwrap();
        let (rx, handle) = spawn_reader(Cursor::new(wire)).unwrap();

        assert!(matches!(rx.recv().unwrap(), Inbound::Frame(MessageType::Page, _)));
        assert!(matches!(rx.recv().unwrap(), Inbound::Closed));
        handle.join().unwrap();
    }

    #[test]
    fn test_reader_reports_corrupt_stream() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&0u64.to_ne_bytes());
        wire.extend_from_slice(&99u32.to_ne_bytes());
        let (rx, handle) = spawn_reader(Cursor::new(wire)).unwrap();
        assert!(matches!(
            rx.recv().unwrap(),
            Inbound::Failed(FrameError::UnknownType(99))
        ));
        handle.join().unwrap();
    }

    #[test]
    fn test_dispatcher_acks_commands_but_not_debug() {
        let (controller, renderer_end) = UnixStream::pair().unwrap();
        let reader = renderer_end.try_clone().unwrap();
        let (rx, reader_thread) = spawn_reader(reader).unwrap();
        let dispatcher = Dispatcher::new(Renderer::new(Dom::new(0.0)), renderer_end, rx);
        let serve = thread::spawn(move || dispatcher.run());

        let mut controller_read = controller.try_clone().unwrap();
        let mut controller_write = controller;
        write_frame(
            &mut controller_write,
            MessageType::Debug,
            &DebugLog { msg: "x".into() }.to_bytes().unwrap(),
        )
        .unwrap();
        write_frame(&mut controller_write, MessageType::Page, &page_bytes()).unwrap();

        let (ty, payload) = read_frame(&mut controller_read).unwrap();
        assert_eq!(ty, MessageType::Ack);
        assert!(AckResult::from_bytes(&payload).unwrap().success);

        controller_write
            .shutdown(std::net::Shutdown::Write)
            .unwrap();
        let renderer = serve.join().unwrap().unwrap();
        reader_thread.join().unwrap();
        assert!(renderer.is_ready());
    }

    #[test]
    fn test_dispatcher_fails_on_corrupt_stream() {
        let (tx, rx) = mpsc::channel();
        tx.send(Inbound::Failed(FrameError::FrameTooLarge {
            length: u64::MAX,
            max: 1,
        }))
        .unwrap();
        let dispatcher = Dispatcher::new(Renderer::new(Dom::new(0.0)), Vec::new(), rx);
        assert!(dispatcher.run().is_err());
    }
}
