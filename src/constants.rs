//! Protocol-wide constants for threadview.
//!
//! This module centralizes the magic numbers shared by the controller and
//! the renderer. Both processes are built from the same crate, so these
//! values never need to be negotiated over the wire.
//!
//! # Categories
//!
//! - **Framing**: wire header sizes and the payload ceiling
//! - **Transport**: rendezvous socket limits and handshake timeouts
//! - **Layout**: metrics used by the headless renderer surface
//! - **Scrolling**: default viewport and step sizes

use std::time::Duration;

// ============================================================================
// Framing
// ============================================================================

/// Size of the `payload_length` field that starts every frame (`u64`).
pub const LENGTH_FIELD_SIZE: usize = std::mem::size_of::<u64>();

/// Size of the `message_type` field that follows the length (`u32`).
pub const TYPE_FIELD_SIZE: usize = std::mem::size_of::<u32>();

/// Hard ceiling on a single frame payload (200 MiB).
///
/// A peer advertising more than this is treated as corrupt and the
/// connection is torn down before any payload buffer is allocated.
pub const MAX_FRAME_SIZE: u64 = 200 * 1024 * 1024;

// ============================================================================
// Transport
// ============================================================================

/// Maximum path length for a Unix domain socket (macOS kernel limit).
pub const MAX_SOCK_PATH: usize = 104;

/// How long the controller waits for a freshly spawned renderer to connect.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Poll interval while waiting for the renderer connection.
pub const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(25);

// ============================================================================
// Layout (headless surface)
// ============================================================================

/// Height of a message header block (sender, subject, date rows).
pub const HEADER_HEIGHT: f64 = 80.0;

/// Height of one line of viewable body text.
pub const LINE_HEIGHT: f64 = 18.0;

/// Height of an alternative / non-preferred body part block.
pub const PART_HEIGHT: f64 = 120.0;

/// Height of an attachment row.
pub const ATTACHMENT_HEIGHT: f64 = 48.0;

/// Height of a nested (forwarded / attached) message block.
pub const MIME_MESSAGE_HEIGHT: f64 = 160.0;

/// Height of a warning or info notice banner.
pub const NOTICE_HEIGHT: f64 = 24.0;

/// Horizontal indentation per thread nesting level, in pixels.
pub const INDENT_PX: u32 = 20;

// ============================================================================
// Scrolling
// ============================================================================

/// Default viewport height used when the config does not set one.
pub const DEFAULT_VIEWPORT_HEIGHT: f64 = 600.0;

/// Default small scroll step (`VisualSmall`).
pub const DEFAULT_SCROLL_STEP: f64 = 40.0;

/// Fraction of the viewport scrolled by a `VisualBig` step.
pub const PAGE_STEP_FRACTION: f64 = 0.9;

/// Maximum characters of subject shown in the collapsed header preview.
pub const MAX_PREVIEW_LEN: usize = 80;
