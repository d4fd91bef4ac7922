//! threadview - controller/renderer synchronization for a sandboxed mail
//! thread view.
//!
//! A mail client renders conversations in a separate, DOM-owning renderer
//! process. The controller keeps the authoritative message structure; the
//! renderer owns layout and reports where keyboard focus ends up. This crate
//! implements both ends of the link between them.
//!
//! # Architecture
//!
//! ```text
//! ThreadView ──► Bridge ──frames──► Dispatcher ──► Renderer<Surface>
//!     ▲             │                                   │
//!     └── AckResult ◄───────────── Ack frames ◄─────────┘
//! ```
//!
//! # Modules
//!
//! - [`protocol`] - message catalogue, payloads and the wire codec
//! - [`transport`] - Unix socket rendezvous and byte-level I/O
//! - [`bridge`] - controller-side `send_sync` / `send_async`
//! - [`renderer`] - frame dispatcher, handlers and the headless DOM
//! - [`state`] - mirrored conversation model and focus reconciliation
//! - [`navigation`] - focus navigation state machine
//! - [`controller`] - the controller's `ThreadView` API
//! - [`config`] - configuration loading/saving

// Library modules
pub mod bridge;
pub mod commands;
pub mod controller;
pub mod navigation;
pub mod protocol;
pub mod renderer;
pub mod state;
pub mod transport;

pub mod config;
pub mod constants;

// Re-export commonly used types
pub use bridge::{Bridge, BridgeError};
pub use config::{Config, PageConfig};
pub use controller::ThreadView;
pub use navigation::{Direction, NavigationKind, Navigate, Navigator};
pub use protocol::{AckResult, MessageType};
pub use renderer::{Dom, Renderer, Surface};
pub use state::{Conversation, Element, ElementType, FocusCursor, MessageRecord};
