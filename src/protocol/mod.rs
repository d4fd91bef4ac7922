//! Message catalogue and typed payloads for the controller↔renderer link.
//!
//! Every frame carries a [`MessageType`] tag and a JSON payload. Each tag has
//! exactly one payload struct implementing [`Payload`]; the renderer turns
//! raw `(type, bytes)` pairs into a [`Command`] with [`Command::decode`].
//!
//! # Acknowledgement rules
//!
//! - Every state-mutating command is sent with `send_sync` and answered by
//!   exactly one [`MessageType::Ack`] carrying an [`AckResult`].
//! - [`MessageType::Debug`] is fire-and-forget and is never acknowledged.
//! - [`MessageType::Ack`] flows renderer → controller only.

// Rust guideline compliant 2026-02

pub mod framing;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::PageConfig;
use crate::state::{FocusCursor, MessageRecord};

pub use crate::navigation::{Direction, FocusTarget, NavigationKind, Navigate};

// ─── Message types ─────────────────────────────────────────────────────────

/// Closed enumeration of frame types. The ordinal is the wire tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum MessageType {
    /// Log line for the peer's log (controller → renderer).
    Debug = 0,
    /// Set or clear an info/warning notice on a message.
    Info = 1,
    /// Install the base page and mark the renderer ready.
    Page = 2,
    /// Replace the renderer's mirror with a full snapshot.
    State = 3,
    /// Move focus without scrolling.
    Focus = 4,
    /// Navigation intent.
    Navigate = 5,
    /// Mark or unmark a message.
    Mark = 6,
    /// Collapse or expand a message.
    Hidden = 7,
    /// Tear down every message.
    ClearMessages = 8,
    /// Append a message.
    AddMessage = 9,
    /// Replace a message's visible parts or patch its tags.
    UpdateMessage = 10,
    /// Remove a message.
    RemoveMessage = 11,
    /// Acknowledgement (renderer → controller).
    Ack = 12,
}

impl MessageType {
    /// All message types in ordinal order.
    pub const ALL: [MessageType; 13] = [
        MessageType::Debug,
        MessageType::Info,
        MessageType::Page,
        MessageType::State,
        MessageType::Focus,
        MessageType::Navigate,
        MessageType::Mark,
        MessageType::Hidden,
        MessageType::ClearMessages,
        MessageType::AddMessage,
        MessageType::UpdateMessage,
        MessageType::RemoveMessage,
        MessageType::Ack,
    ];

    /// Wire tag for this type.
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Parse a wire tag; `None` for tags outside the catalogue.
    pub fn from_u32(raw: u32) -> Option<Self> {
        Self::ALL.get(raw as usize).copied()
    }

    /// Whether the renderer answers this type with exactly one `Ack`.
    pub fn expects_ack(self) -> bool {
        !matches!(self, MessageType::Debug | MessageType::Ack)
    }
}

// ─── Payloads ──────────────────────────────────────────────────────────────

/// A payload bound to one [`MessageType`].
pub trait Payload: Serialize + DeserializeOwned {
    /// The frame type this payload travels in.
    const TYPE: MessageType;

    /// Serialize to frame payload bytes.
    fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize from frame payload bytes.
    fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// `Debug`: a line for the renderer's log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugLog {
    /// Log text.
    pub msg: String,
}

/// Notice banner flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NoticeKind {
    /// Informational banner.
    Info,
    /// Warning banner.
    Warning,
}

impl NoticeKind {
    /// CSS class / DOM id suffix for the banner.
    pub fn class(self) -> &'static str {
        match self {
            NoticeKind::Info => "info",
            NoticeKind::Warning => "warning",
        }
    }
}

/// `Info`: show (`text = Some`) or hide (`text = None`) a notice on a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    /// Target message id.
    pub mid: String,
    /// Banner flavor.
    pub kind: NoticeKind,
    /// Banner text; `None` hides the banner.
    #[serde(default)]
    pub text: Option<String>,
}

/// `Page`: base markup, stylesheet and session settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageLoad {
    /// Base document markup.
    pub markup: String,
    /// Theme stylesheet.
    #[serde(default)]
    pub stylesheet: String,
    /// Settings threaded into the renderer.
    #[serde(default)]
    pub config: PageConfig,
}

/// `State`: full mirror replacement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Messages in display order.
    pub messages: Vec<MessageRecord>,
    /// Cursor to restore.
    #[serde(default)]
    pub focus: FocusCursor,
}

/// `Focus`: set the cursor without scrolling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusElement {
    /// Target message id.
    pub mid: String,
    /// Target element index.
    #[serde(default)]
    pub element: usize,
}

/// `Mark`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkMessage {
    /// Target message id.
    pub mid: String,
    /// New mark state.
    pub marked: bool,
}

/// `Hidden`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HideMessage {
    /// Target message id.
    pub mid: String,
    /// New collapse state.
    pub hidden: bool,
}

/// `ClearMessages`. Carries no data; any payload is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearMessages;

/// `AddMessage`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddMessage {
    /// The record to append.
    pub message: MessageRecord,
}

/// What an `UpdateMessage` replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateKind {
    /// Full re-render of the visible parts; element sequence must not change.
    VisibleParts,
    /// Patch tags only.
    Tags,
}

/// `UpdateMessage`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateMessage {
    /// Update flavor.
    pub kind: UpdateKind,
    /// The updated record.
    pub message: MessageRecord,
}

/// `RemoveMessage`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveMessage {
    /// Message to remove.
    pub mid: String,
}

/// `Ack`: outcome of one synchronous command plus the authoritative focus.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckResult {
    /// Whether the command was applied.
    pub success: bool,
    /// Where focus ended up on the renderer.
    pub focus: FocusCursor,
}

impl AckResult {
    /// A failed result carrying the given focus.
    pub fn failed(focus: FocusCursor) -> Self {
        Self {
            success: false,
            focus,
        }
    }
}

macro_rules! bind_payload {
    ($($payload:ty => $ty:ident),* $(,)?) => {
        $(impl Payload for $payload {
            const TYPE: MessageType = MessageType::$ty;
        })*
    };
}

bind_payload! {
    DebugLog => Debug,
    Notice => Info,
    PageLoad => Page,
    StateSnapshot => State,
    FocusElement => Focus,
    Navigate => Navigate,
    MarkMessage => Mark,
    HideMessage => Hidden,
    ClearMessages => ClearMessages,
    AddMessage => AddMessage,
    UpdateMessage => UpdateMessage,
    RemoveMessage => RemoveMessage,
    AckResult => Ack,
}

// ─── Commands ──────────────────────────────────────────────────────────────

/// A decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// See [`DebugLog`].
    Debug(DebugLog),
    /// See [`Notice`].
    Info(Notice),
    /// See [`PageLoad`].
    Page(PageLoad),
    /// See [`StateSnapshot`].
    State(StateSnapshot),
    /// See [`FocusElement`].
    Focus(FocusElement),
    /// See [`Navigate`].
    Navigate(Navigate),
    /// See [`MarkMessage`].
    Mark(MarkMessage),
    /// See [`HideMessage`].
    Hidden(HideMessage),
    /// See [`ClearMessages`].
    ClearMessages,
    /// See [`AddMessage`].
    AddMessage(AddMessage),
    /// See [`UpdateMessage`].
    UpdateMessage(UpdateMessage),
    /// See [`RemoveMessage`].
    RemoveMessage(RemoveMessage),
    /// See [`AckResult`].
    Ack(AckResult),
}

impl Command {
    /// Decode a payload according to its frame type.
    pub fn decode(ty: MessageType, bytes: &[u8]) -> Result<Self, serde_json::Error> {
        Ok(match ty {
            MessageType::Debug => Command::Debug(DebugLog::from_bytes(bytes)?),
            MessageType::Info => Command::Info(Notice::from_bytes(bytes)?),
            MessageType::Page => Command::Page(PageLoad::from_bytes(bytes)?),
            MessageType::State => Command::State(StateSnapshot::from_bytes(bytes)?),
            MessageType::Focus => Command::Focus(FocusElement::from_bytes(bytes)?),
            MessageType::Navigate => Command::Navigate(Navigate::from_bytes(bytes)?),
            MessageType::Mark => Command::Mark(MarkMessage::from_bytes(bytes)?),
            MessageType::Hidden => Command::Hidden(HideMessage::from_bytes(bytes)?),
            MessageType::ClearMessages => Command::ClearMessages,
            MessageType::AddMessage => Command::AddMessage(AddMessage::from_bytes(bytes)?),
            MessageType::UpdateMessage => {
                Command::UpdateMessage(UpdateMessage::from_bytes(bytes)?)
            }
            MessageType::RemoveMessage => {
                Command::RemoveMessage(RemoveMessage::from_bytes(bytes)?)
            }
            MessageType::Ack => Command::Ack(AckResult::from_bytes(bytes)?),
        })
    }

    /// Frame type of this command.
    pub fn message_type(&self) -> MessageType {
        match self {
            Command::Debug(_) => MessageType::Debug,
            Command::Info(_) => MessageType::Info,
            Command::Page(_) => MessageType::Page,
            Command::State(_) => MessageType::State,
            Command::Focus(_) => MessageType::Focus,
            Command::Navigate(_) => MessageType::Navigate,
            Command::Mark(_) => MessageType::Mark,
            Command::Hidden(_) => MessageType::Hidden,
            Command::ClearMessages => MessageType::ClearMessages,
            Command::AddMessage(_) => MessageType::AddMessage,
            Command::UpdateMessage(_) => MessageType::UpdateMessage,
            Command::RemoveMessage(_) => MessageType::RemoveMessage,
            Command::Ack(_) => MessageType::Ack,
        }
    }
}

// ─── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordinals_are_stable() {
        assert_eq!(MessageType::Debug.as_u32(), 0);
        assert_eq!(MessageType::Navigate.as_u32(), 5);
        assert_eq!(MessageType::Ack.as_u32(), 12);
        for (i, ty) in MessageType::ALL.iter().enumerate() {
            assert_eq!(ty.as_u32() as usize, i);
            assert_eq!(MessageType::from_u32(i as u32), Some(*ty));
        }
        assert_eq!(MessageType::from_u32(13), None);
    }

    #[test]
    fn test_only_debug_and_ack_skip_acknowledgement() {
        let unacked: Vec<_> = MessageType::ALL
            .iter()
            .filter(|t| !t.expects_ack())
            .collect();
        assert_eq!(unacked, vec![&MessageType::Debug, &MessageType::Ack]);
    }

    #[test]
    fn test_decode_dispatches_on_type() {
        let bytes = HideMessage {
            mid: "m1".into(),
            hidden: true,
        }
        .to_bytes()
        .unwrap();
        let cmd = Command::decode(MessageType::Hidden, &bytes).unwrap();
        assert_eq!(cmd.message_type(), MessageType::Hidden);
        assert!(matches!(cmd, Command::Hidden(HideMessage { hidden: true, .. })));
    }

    #[test]
    fn test_clear_messages_ignores_payload() {
        assert_eq!(
            Command::decode(MessageType::ClearMessages, b"").unwrap(),
            Command::ClearMessages
        );
    }

    #[test]
    fn test_decode_rejects_mismatched_payload() {
        let bytes = RemoveMessage { mid: "m1".into() }.to_bytes().unwrap();
        assert!(Command::decode(MessageType::AddMessage, &bytes).is_err());
    }

    #[test]
    fn test_ack_defaults_focus_when_missing() {
        let ack = AckResult::from_bytes(br#"{"success":true,"focus":{}}"#).unwrap();
        assert!(ack.success);
        assert!(!ack.focus.is_set());
    }

    #[test]
    fn test_notice_without_text_hides() {
        let n = Notice::from_bytes(br#"{"mid":"m1","kind":"Warning"}"#).unwrap();
        assert_eq!(n.kind, NoticeKind::Warning);
        assert_eq!(n.text, None);
    }

    #[test]
    fn test_payload_types() {
        assert_eq!(<AckResult as Payload>::TYPE, MessageType::Ack);
        assert_eq!(<Navigate as Payload>::TYPE, MessageType::Navigate);
        assert_eq!(<PageLoad as Payload>::TYPE, MessageType::Page);
    }
}
