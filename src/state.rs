//! Mirrored conversation state.
//!
//! The controller and the renderer each own an independent [`Conversation`].
//! The controller is the source of truth for structure (which messages
//! exist, in which order, with which elements); the renderer is the source
//! of truth for layout-derived facts and reports the resulting focus back in
//! every [`crate::protocol::AckResult`].
//!
//! Both replicas run the same [`Conversation::reconcile`] after every
//! structural change, so they converge on the same cursor without either
//! side trusting the other's partial view.

// Rust guideline compliant 2026-02

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by conversation mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    /// The referenced message id is not part of the conversation.
    #[error("unknown message: {0}")]
    UnknownMessage(String),

    /// A message with this id is already present.
    #[error("duplicate message: {0}")]
    DuplicateMessage(String),

    /// The element index does not exist in the message.
    #[error("element {index} out of range for message {mid} ({len} elements)")]
    ElementOutOfRange {
        /// Message id.
        mid: String,
        /// Requested element index.
        index: usize,
        /// Number of elements in the message.
        len: usize,
    },

    /// A visible-parts update tried to reorder, add or drop elements.
    #[error("element sequence of message {0} changed")]
    ElementsChanged(String),
}

// ─── Elements ──────────────────────────────────────────────────────────────

/// Kind of a focusable sub-unit of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementType {
    /// The synthetic element standing for the message itself (always index 0).
    Empty,
    /// An alternative or non-preferred body part.
    Part,
    /// An attachment.
    Attachment,
    /// A nested (attached or forwarded) message.
    MimeMessage,
}

/// One element of a message, keyed in the renderer DOM by `dom_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    /// Element kind.
    #[serde(rename = "type")]
    pub kind: ElementType,
    /// Part id assigned by the message-parsing layer (`-1` for the message).
    pub id: i32,
    /// Stable DOM id; never renumbered while the record lives.
    pub dom_id: String,
    /// `false` for elements that exist in the DOM but are skipped by
    /// keyboard navigation (e.g. the hidden sibling of a shown alternative).
    pub focusable: bool,
    /// Short label shown by the renderer (file name, part type, subject).
    #[serde(default)]
    pub label: String,
}

impl Element {
    /// The synthetic element representing the message header/body.
    pub fn message(dom_id: impl Into<String>) -> Self {
        Self {
            kind: ElementType::Empty,
            id: -1,
            dom_id: dom_id.into(),
            focusable: true,
            label: String::new(),
        }
    }
}

// ─── Message records ───────────────────────────────────────────────────────

/// A mail address as resolved by the message-parsing layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    /// Display name (may be empty).
    #[serde(default)]
    pub name: String,
    /// Bare `user@domain` address.
    pub email: String,
}

impl Address {
    /// Create an address from a display name and email.
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// `Name <email>`, or just the email when there is no name.
    pub fn full_address(&self) -> String {
        if self.name.is_empty() {
            self.email.clone()
        } else {
            format!("{} <{}>", self.name, self.email)
        }
    }
}

/// One message of a conversation, as forwarded by the indexing layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Message id; identity for the lifetime of the record.
    pub mid: String,
    /// Thread nesting level (0 for the thread root).
    #[serde(default)]
    pub level: u32,
    /// Sender.
    pub sender: Address,
    /// Primary recipients.
    #[serde(default)]
    pub to: Vec<Address>,
    /// Carbon-copy recipients.
    #[serde(default)]
    pub cc: Vec<Address>,
    /// Decoded subject line.
    #[serde(default)]
    pub subject: String,
    /// Message date.
    pub date: DateTime<Utc>,
    /// Tags from the index.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Viewable body text.
    #[serde(default)]
    pub body: String,
    /// The message file is gone; only indexed fields are available.
    #[serde(default)]
    pub missing_content: bool,
    /// Collapsed in the view.
    #[serde(default)]
    pub hidden: bool,
    /// Marked for a bulk action.
    #[serde(default)]
    pub marked: bool,
    /// Ordered elements; element 0 is always [`ElementType::Empty`].
    #[serde(default)]
    pub elements: Vec<Element>,
}

impl MessageRecord {
    /// A record with only the synthetic message element.
    pub fn new(mid: impl Into<String>, sender: Address, date: DateTime<Utc>) -> Self {
        let mid = mid.into();
        let elements = vec![Element::message(message_dom_id(&mid))];
        Self {
            mid,
            level: 0,
            sender,
            to: Vec::new(),
            cc: Vec::new(),
            subject: String::new(),
            date,
            tags: Vec::new(),
            body: String::new(),
            missing_content: false,
            hidden: false,
            marked: false,
            elements,
        }
    }

    /// Append an element, assigning the next part id and a stable DOM id.
    pub fn with_element(mut self, kind: ElementType, focusable: bool) -> Self {
        let id = self.elements.len() as i32;
        self.elements.push(Element {
            kind,
            id,
            dom_id: element_dom_id(&self.mid, id),
            focusable,
            label: String::new(),
        });
        self
    }

    /// DOM id of the message node.
    pub fn dom_id(&self) -> String {
        message_dom_id(&self.mid)
    }

    /// Date as shown in a collapsed header.
    pub fn date_pretty(&self) -> String {
        self.date.format("%b %e").to_string()
    }

    /// Date as shown in an expanded header.
    pub fn date_verbose(&self) -> String {
        self.date.format("%A %e %B %Y, %H:%M").to_string()
    }

    /// Whether keyboard navigation may land on element `index`.
    ///
    /// Element 0 always qualifies. Other elements must be focusable and the
    /// message must be expanded.
    pub fn is_navigable(&self, index: usize) -> bool {
        match self.elements.get(index) {
            None => false,
            Some(_) if index == 0 => true,
            Some(e) => e.focusable && !self.hidden,
        }
    }

    /// First navigable element strictly after `from`.
    pub fn next_navigable(&self, from: usize) -> Option<usize> {
        (from + 1..self.elements.len()).find(|&i| self.is_navigable(i))
    }

    /// Last navigable element strictly before `from`.
    pub fn prev_navigable(&self, from: usize) -> Option<usize> {
        (0..from.min(self.elements.len()))
            .rev()
            .find(|&i| self.is_navigable(i))
    }

    /// Last navigable element of the message (0 if collapsed).
    pub fn last_navigable(&self) -> usize {
        self.prev_navigable(self.elements.len()).unwrap_or(0)
    }

    /// Enforce the element-0 invariant on records coming from outside.
    fn normalize(&mut self) {
        let dom_id = self.dom_id();
        match self.elements.first_mut() {
            Some(first) if first.kind == ElementType::Empty => first.focusable = true,
            _ => self.elements.insert(0, Element::message(dom_id)),
        }
    }

    fn same_elements(&self, other: &MessageRecord) -> bool {
        self.elements.len() == other.elements.len()
            && self
                .elements
                .iter()
                .zip(&other.elements)
                .all(|(a, b)| a.kind == b.kind && a.id == b.id && a.dom_id == b.dom_id)
    }
}

/// DOM id of a message node: `message_{mid}`.
///
/// Every node kind has its own prefix, so no message id can produce the id
/// of another message's element, body or notice.
pub fn message_dom_id(mid: &str) -> String {
    format!("message_{mid}")
}

/// DOM id of element `id` of message `mid`: `element_{mid}_{id}`.
pub fn element_dom_id(mid: &str, id: i32) -> String {
    format!("element_{mid}_{id}")
}

// ─── Focus cursor ──────────────────────────────────────────────────────────

/// The (message, element) pair focused for keyboard navigation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusCursor {
    /// Focused message, if any.
    pub message_id: Option<String>,
    /// Focused element of that message.
    pub element_index: Option<usize>,
}

impl FocusCursor {
    /// No focus.
    pub fn unset() -> Self {
        Self::default()
    }

    /// Focus element `element` of message `mid`.
    pub fn at(mid: impl Into<String>, element: usize) -> Self {
        Self {
            message_id: Some(mid.into()),
            element_index: Some(element),
        }
    }

    /// Whether a message is focused.
    pub fn is_set(&self) -> bool {
        self.message_id.is_some()
    }

    /// Focused message id.
    pub fn message(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    /// Focused element index (0 when only the message is set).
    pub fn element(&self) -> usize {
        self.element_index.unwrap_or(0)
    }
}

impl std::fmt::Display for FocusCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.message() {
            Some(mid) => write!(f, "{mid}:{}", self.element()),
            None => write!(f, "(none)"),
        }
    }
}

// ─── Conversation ──────────────────────────────────────────────────────────

/// One replica of the conversation model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    messages: Vec<MessageRecord>,
    cursor: FocusCursor,
}

impl Conversation {
    /// An empty conversation with an unset cursor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages in display order.
    pub fn messages(&self) -> &[MessageRecord] {
        &self.messages
    }

    /// The current cursor.
    pub fn cursor(&self) -> &FocusCursor {
        &self.cursor
    }

    /// Number of messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// `true` when there are no messages.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Display position of a message.
    pub fn position(&self, mid: &str) -> Option<usize> {
        self.messages.iter().position(|m| m.mid == mid)
    }

    /// Look up a message by id.
    pub fn get(&self, mid: &str) -> Option<&MessageRecord> {
        self.messages.iter().find(|m| m.mid == mid)
    }

    /// Position and element of the focused message, if the cursor is set.
    pub fn focused(&self) -> Option<(usize, usize)> {
        let mid = self.cursor.message()?;
        self.position(mid).map(|pos| (pos, self.cursor.element()))
    }

    fn get_mut(&mut self, mid: &str) -> Result<&mut MessageRecord, StateError> {
        self.messages
            .iter_mut()
            .find(|m| m.mid == mid)
            .ok_or_else(|| StateError::UnknownMessage(mid.to_owned()))
    }

    /// Append a message in display order. The cursor is left untouched.
    pub fn add(&mut self, mut record: MessageRecord) -> Result<(), StateError> {
        if self.get(&record.mid).is_some() {
            return Err(StateError::DuplicateMessage(record.mid));
        }
        record.normalize();
        self.messages.push(record);
        Ok(())
    }

    /// Remove a message.
    ///
    /// If it held the focus, focus moves to the message that takes its
    /// place (or the new last message), element 0; an emptied conversation
    /// unsets the cursor.
    pub fn remove(&mut self, mid: &str) -> Result<MessageRecord, StateError> {
        let pos = self
            .position(mid)
            .ok_or_else(|| StateError::UnknownMessage(mid.to_owned()))?;
        let removed = self.messages.remove(pos);

        if self.cursor.message() == Some(mid) {
            self.cursor = match self.messages.get(pos).or_else(|| self.messages.last()) {
                Some(next) => FocusCursor::at(next.mid.clone(), 0),
                None => FocusCursor::unset(),
            };
        }
        Ok(removed)
    }

    /// Replace a record after a full re-render of its visible parts.
    ///
    /// The element sequence must be unchanged; only `focusable` and content
    /// may differ. The cursor is reconciled afterwards.
    pub fn update_visible_parts(&mut self, mut record: MessageRecord) -> Result<(), StateError> {
        record.normalize();
        let existing = self.get_mut(&record.mid)?;
        if !existing.same_elements(&record) {
            return Err(StateError::ElementsChanged(record.mid));
        }
        *existing = record;
        self.reconcile();
        Ok(())
    }

    /// Patch only the tags of a message.
    pub fn update_tags(&mut self, mid: &str, tags: Vec<String>) -> Result<(), StateError> {
        self.get_mut(mid)?.tags = tags;
        Ok(())
    }

    /// Collapse or expand a message.
    pub fn set_hidden(&mut self, mid: &str, hidden: bool) -> Result<(), StateError> {
        self.get_mut(mid)?.hidden = hidden;
        self.reconcile();
        Ok(())
    }

    /// Mark or unmark a message.
    pub fn set_marked(&mut self, mid: &str, marked: bool) -> Result<(), StateError> {
        self.get_mut(mid)?.marked = marked;
        Ok(())
    }

    /// Move the cursor to an explicit element and reconcile.
    pub fn focus(&mut self, mid: &str, element: usize) -> Result<(), StateError> {
        let record = self
            .get(mid)
            .ok_or_else(|| StateError::UnknownMessage(mid.to_owned()))?;
        if element >= record.elements.len() {
            return Err(StateError::ElementOutOfRange {
                mid: mid.to_owned(),
                index: element,
                len: record.elements.len(),
            });
        }
        let previous = self.cursor.element_index;
        self.cursor = FocusCursor::at(mid, element);
        self.reconcile_from(previous.filter(|_| self.cursor.message() == Some(mid)));
        Ok(())
    }

    /// Adopt a cursor reported by the peer and reconcile it locally.
    pub fn set_cursor(&mut self, cursor: FocusCursor) {
        self.cursor = cursor;
        self.reconcile();
    }

    /// Drop every message and unset the cursor.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.cursor = FocusCursor::unset();
    }

    /// Clone the replica into a snapshot suitable for a `State` frame.
    pub fn snapshot(&self) -> (Vec<MessageRecord>, FocusCursor) {
        (self.messages.clone(), self.cursor.clone())
    }

    /// Replace the whole replica from a snapshot.
    pub fn replace(
        &mut self,
        messages: Vec<MessageRecord>,
        cursor: FocusCursor,
    ) -> Result<(), StateError> {
        let mut fresh = Conversation::new();
        for record in messages {
            fresh.add(record)?;
        }
        fresh.cursor = cursor;
        fresh.reconcile();
        *self = fresh;
        Ok(())
    }

    /// Reconcile the cursor against the current model.
    pub fn reconcile(&mut self) {
        self.reconcile_from(None);
    }

    /// Reconcile the cursor, searching backward from `previous` if needed.
    ///
    /// If the cursor's element is not navigable, search forward in the same
    /// message; if none remains, search backward from the previous position;
    /// if still none, fall back to element 0. A cursor naming a vanished
    /// message falls back to the first message. An unset cursor stays unset.
    pub fn reconcile_from(&mut self, previous: Option<usize>) {
        if self.messages.is_empty() {
            self.cursor = FocusCursor::unset();
            return;
        }
        let Some(mid) = self.cursor.message_id.clone() else {
            self.cursor.element_index = None;
            return;
        };
        let Some(record) = self.get(&mid) else {
            self.cursor = FocusCursor::at(self.messages[0].mid.clone(), 0);
            return;
        };

        let index = self.cursor.element();
        let resolved = if record.is_navigable(index) {
            index
        } else {
            let back_from = previous.unwrap_or(index);
            record
                .next_navigable(index)
                .or_else(|| {
                    if record.is_navigable(back_from) {
                        Some(back_from)
                    } else {
                        record.prev_navigable(back_from)
                    }
                })
                .unwrap_or(0)
        };
        self.cursor.element_index = Some(resolved);
    }

    /// The focus invariant: unset, or a navigable element of a present message.
    pub fn cursor_is_valid(&self) -> bool {
        match self.cursor.message() {
            None => self.cursor.element_index.is_none(),
            Some(mid) => self.get(mid).is_some_and(|m| {
                let index = self.cursor.element();
                m.elements.get(index).is_some_and(|e| e.focusable) && m.is_navigable(index)
            }),
        }
    }
}

// ─── Tests ─────────────────────────────────────────────────────────────────
