//! Local byte-stream transport between the controller and the renderer.
//!
//! The controller is the *listener*: it binds an ephemeral, per-user Unix
//! domain socket, spawns the renderer with the socket path on its command
//! line, and waits for exactly one connection. The renderer is the single
//! *client* and connects once at startup.
//!
//! ```text
//! Controller                             Renderer process
//! ┌────────────────────┐  spawn --socket ┌──────────────────┐
//! │ Listener::bind     │────────────────►│ Channel::connect │
//! │ accept_timeout()   │◄────────────────│                  │
//! └─────────┬──────────┘   UnixStream    └────────┬─────────┘
//!           ▼                                     ▼
//!        Bridge                              Dispatcher
//! ```
//!
//! The transport implies no message boundaries; that is entirely the job
//! of [`crate::protocol::framing`]. What it does provide is a precise error
//! vocabulary: [`ByteSource`] and [`ByteSink`] map OS-level failures onto
//! [`TransportError::ConnectionClosed`] and [`TransportError::BrokenPipe`]
//! so the codec can tell a clean peer exit from a torn frame.

// Rust guideline compliant 2026-02

use std::io::{self, Read, Write};
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use thiserror::Error;

use crate::constants::{ACCEPT_POLL_INTERVAL, MAX_SOCK_PATH};

/// Byte-level transport failures.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The peer closed its end before `expected` bytes could be read.
    #[error("connection closed by peer after {received} of {expected} bytes")]
    ConnectionClosed {
        /// Bytes the caller asked for.
        expected: usize,
        /// Bytes that actually arrived before end of stream.
        received: usize,
    },

    /// The peer is gone; the write could not be delivered.
    #[error("broken pipe: peer is no longer reading")]
    BrokenPipe,

    /// Any other I/O failure.
    #[error("transport I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Blocking read side of a byte channel.
///
/// Implemented for every [`Read`], so the codec works the same over a
/// `UnixStream`, a `Cursor` in tests, or any other duplex stream.
pub trait ByteSource {
    /// Block until `buf` is completely filled or the peer disconnects.
    fn read_exact_bytes(&mut self, buf: &mut [u8]) -> Result<(), TransportError>;
}

/// Blocking write side of a byte channel.
pub trait ByteSink {
    /// Block until all of `bytes` is accepted by the OS, then flush.
    fn write_all_bytes(&mut self, bytes: &[u8]) -> Result<(), TransportError>;
}

impl<R: Read + ?Sized> ByteSource for R {
    fn read_exact_bytes(&mut self, buf: &mut [u8]) -> Result<(), TransportError> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.read(&mut buf[filled..]) {
                Ok(0) => {
                    return Err(TransportError::ConnectionClosed {
                        expected: buf.len(),
                        received: filled,
                    })
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) if e.kind() == io::ErrorKind::ConnectionReset => {
                    return Err(TransportError::ConnectionClosed {
                        expected: buf.len(),
                        received: filled,
                    })
                }
                Err(e) => return Err(TransportError::Io(e)),
            }
        }
        Ok(())
    }
}

impl<W: Write + ?Sized> ByteSink for W {
    fn write_all_bytes(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.write_all(bytes)
            .and_then(|()| self.flush())
            .map_err(classify_write_error)
    }
}

fn classify_write_error(e: io::Error) -> TransportError {
    match e.kind() {
        io::ErrorKind::BrokenPipe
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::NotConnected
        | io::ErrorKind::WriteZero => TransportError::BrokenPipe,
        _ => TransportError::Io(e),
    }
}

// ─── Rendezvous address ────────────────────────────────────────────────────

/// Default directory for rendezvous sockets: `/tmp/threadview-{uid}`.
pub fn default_socket_dir() -> PathBuf {
    // SAFETY: `getuid` has no preconditions and cannot fail.
    let uid = unsafe { libc::getuid() };
    PathBuf::from(format!("/tmp/threadview-{uid}"))
}

/// Build a fresh, unique rendezvous socket path inside `dir`.
///
/// Format: `{dir}/tv-{uuid}.sock`. Length is validated against the macOS
/// 104-byte kernel limit.
pub fn socket_path(dir: &Path) -> Result<PathBuf> {
    let name = format!("tv-{}.sock", uuid::Uuid::new_v4().simple());
    let path = dir.join(name);
    let path_str = path.to_string_lossy();
    if path_str.len() > MAX_SOCK_PATH {
        anyhow::bail!(
            "renderer socket path too long ({} > {MAX_SOCK_PATH}): {path_str}",
            path_str.len()
        );
    }
    Ok(path)
}

// ─── Listener (controller side) ────────────────────────────────────────────

/// Controller-side rendezvous listener.
///
/// Owns the socket file and removes it on drop.
#[derive(Debug)]
pub struct Listener {
    listener: UnixListener,
    path: PathBuf,
}

impl Listener {
    /// Bind a new ephemeral socket inside `dir`, creating the directory
    /// (owner-only, `0o700`) if needed. The socket file is made owner-only
    /// (`0o600`).
    pub fn bind_ephemeral(dir: &Path) -> Result<Self> {
        std::fs::DirBuilder::new()
            .recursive(true)
            .mode(0o700)
            .create(dir)
            .with_context(|| format!("create renderer socket dir: {}", dir.display()))?;
        let path = socket_path(dir)?;
        Self::bind(path)
    }

    /// Bind a listener at an explicit path, replacing any stale socket file.
    pub fn bind(path: PathBuf) -> Result<Self> {
        // Remove stale socket file from a previous run.
        let _ = std::fs::remove_file(&path);

        let listener = UnixListener::bind(&path)
            .with_context(|| format!("bind renderer socket: {}", path.display()))?;

        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("restrict renderer socket: {}", path.display()))?;

        log::info!("[transport] listening on {}", path.display());
        Ok(Self { listener, path })
    }

    /// The rendezvous address to hand to the renderer out-of-band.
    pub fn address(&self) -> &Path {
        &self.path
    }

    /// Wait for the renderer connection within a timeout window.
    ///
    /// Polls a non-blocking accept so the caller can give up on a renderer
    /// that never starts. Returns `None` on timeout. The accepted stream is
    /// switched back to blocking mode.
    pub fn accept_timeout(&self, timeout: Duration) -> Result<Option<Channel>> {
        self.listener.set_nonblocking(true)?;
        let deadline = Instant::now() + timeout;

        loop {
            match self.listener.accept() {
                Ok((stream, _)) => {
                    stream
                        .set_nonblocking(false)
                        .context("set renderer stream blocking")?;
                    log::info!("[transport] renderer connected");
                    return Ok(Some(Channel::from_stream(stream)));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        return Ok(None);
                    }
                    std::thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e).context("accept renderer connection"),
            }
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

// ─── Channel ───────────────────────────────────────────────────────────────

/// An established duplex connection between controller and renderer.
#[derive(Debug)]
pub struct Channel {
    stream: UnixStream,
}

impl Channel {
    /// Connect to the controller's rendezvous socket (renderer side).
    pub fn connect(path: &Path) -> Result<Self> {
        let stream = UnixStream::connect(path)
            .with_context(|| format!("connect to controller socket: {}", path.display()))?;
        log::info!("[transport] connected to {}", path.display());
        Ok(Self { stream })
    }

    /// Wrap an already-connected stream (e.g. one end of `UnixStream::pair`).
    pub fn from_stream(stream: UnixStream) -> Self {
        Self { stream }
    }

    /// Split into independently owned read and write halves.
    ///
    /// Both halves refer to the same socket; reading and writing may proceed
    /// from different threads.
    pub fn split(self) -> Result<(UnixStream, UnixStream)> {
        let reader = self
            .stream
            .try_clone()
            .context("clone renderer socket for reader")?;
        Ok((reader, self.stream))
    }

    /// Shut down both directions, unblocking any pending read on the peer.
    pub fn shutdown(&self) {
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }
}

// ─── Tests ─────────────────────────────────────────────────────────────────
