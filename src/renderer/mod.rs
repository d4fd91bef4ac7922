//! Renderer side of the protocol.
//!
//! The renderer owns the DOM and its own [`Conversation`] replica. Frames are
//! decoded by a reader thread ([`dispatcher::spawn_reader`]) and applied one
//! at a time by a single mutation context ([`dispatcher::Dispatcher`]) that
//! drives a [`Renderer`].
//!
//! Every acknowledged command yields exactly one [`AckResult`], success or
//! not; a failing handler never takes the connection down.

// Rust guideline compliant 2026-02

pub mod dispatcher;
pub mod dom;

pub use dispatcher::{run_renderer, spawn_reader, Dispatcher, Inbound};
pub use dom::{Dom, NodeHandle};

use anyhow::{bail, Result};

use crate::config::PageConfig;
use crate::navigation::{Layout, Navigator};
use crate::protocol::{
    AckResult, Command, HideMessage, MarkMessage, MessageType, Notice, NoticeKind, PageLoad,
    StateSnapshot, UpdateKind, UpdateMessage,
};
use crate::state::{message_dom_id, Conversation, FocusCursor, MessageRecord};

/// Everything the renderer needs from a DOM-capable surface.
///
/// Nodes are addressed by message id; the surface derives DOM ids with
/// [`message_dom_id`] and the elements' stable ids.
pub trait Surface: Layout {
    /// Install base markup and stylesheet, dropping all messages.
    fn install_page(&mut self, page: &PageLoad);

    /// Whether a message node exists for `mid`.
    fn contains_message(&self, mid: &str) -> bool;

    /// Append a message node.
    fn insert_message(&mut self, record: &MessageRecord, indent: bool);

    /// Re-render a message in place. `false` if it is not in the DOM.
    fn replace_message(&mut self, record: &MessageRecord, indent: bool) -> bool;

    /// Remove a message node. `false` if it is not in the DOM.
    fn remove_message(&mut self, mid: &str) -> bool;

    /// Remove every message node.
    fn clear_messages(&mut self);

    /// Update the tag list shown for a message.
    fn set_tags(&mut self, mid: &str, tags: &[String]) -> bool;

    /// Toggle the `hide` class.
    fn set_hidden(&mut self, mid: &str, hidden: bool) -> bool;

    /// Toggle the `marked` class.
    fn set_marked(&mut self, mid: &str, marked: bool) -> bool;

    /// Show (`Some`) or remove (`None`) a notice banner.
    fn set_notice(&mut self, mid: &str, kind: NoticeKind, text: Option<&str>) -> bool;

    /// Move the `focused` class to exactly these nodes.
    fn show_focus(&mut self, message_dom_id: Option<&str>, element_dom_id: Option<&str>);
}

/// The renderer's mutation context.
#[derive(Debug)]
pub struct Renderer<S> {
    surface: S,
    conversation: Conversation,
    navigator: Navigator,
    config: PageConfig,
    ready: bool,
}

impl<S: Surface> Renderer<S> {
    /// Wrap a surface. Commands other than `Page` are refused until a page
    /// is installed.
    pub fn new(surface: S) -> Self {
        Self {
            surface,
            conversation: Conversation::new(),
            navigator: Navigator::default(),
            config: PageConfig::default(),
            ready: false,
        }
    }

    /// Whether a page has been installed.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// The renderer's replica.
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// The surface.
    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Settings received in the last `Page`.
    pub fn config(&self) -> &PageConfig {
        &self.config
    }

    /// Decode and apply one frame. Returns the `Ack` to send, if any.
    pub fn handle(&mut self, ty: MessageType, payload: &[u8]) -> Option<AckResult> {
        if self.config.log_frames {
            log::debug!("[renderer] <- {ty:?} ({} bytes)", payload.len());
        }
        match Command::decode(ty, payload) {
            Ok(command) => self.apply(command),
            Err(e) => {
                log::warn!("[renderer] undecodable {ty:?} payload: {e}");
                ty.expects_ack().then(|| self.ack(false))
            }
        }
    }

    /// Apply one decoded command. Returns the `Ack` to send, if any.
    pub fn apply(&mut self, command: Command) -> Option<AckResult> {
        let ty = command.message_type();
        let result: Result<()> = match command {
            Command::Debug(d) => {
                log::info!("[renderer] controller: {}", d.msg);
                return None;
            }
            Command::Ack(_) => {
                log::warn!("[renderer] ignoring Ack sent to the renderer");
                return None;
            }
            Command::Page(page) => {
                self.load_page(&page);
                Ok(())
            }
            _ if !self.ready => Err(anyhow::anyhow!("page not loaded")),
            Command::State(snapshot) => self.replace_state(snapshot),
            Command::ClearMessages => {
                self.conversation.clear();
                self.surface.clear_messages();
                Ok(())
            }
            Command::AddMessage(add) => self.add_message(add.message),
            Command::UpdateMessage(update) => self.update_message(update),
            Command::RemoveMessage(remove) => self.remove_message(&remove.mid),
            Command::Mark(mark) => self.mark(&mark),
            Command::Hidden(hide) => self.hide(&hide),
            Command::Focus(focus) => self
                .conversation
                .focus(&focus.mid, focus.element)
                .map_err(Into::into),
            Command::Navigate(request) => self
                .navigator
                .navigate(&mut self.conversation, &mut self.surface, &request)
                .map_err(Into::into),
            Command::Info(notice) => self.notice(&notice),
        };

        if let Err(e) = &result {
            log::warn!("[renderer] {ty:?} failed: {e:#}");
        }
        self.sync_focus();
        Some(self.ack(result.is_ok()))
    }

    fn ack(&self, success: bool) -> AckResult {
        AckResult {
            success,
            focus: self.conversation.cursor().clone(),
        }
    }

    fn indent(&self) -> bool {
        self.config.indent_messages
    }

    fn load_page(&mut self, page: &PageLoad) {
        self.config = page.config.clone();
        self.navigator = Navigator::new(self.config.scroll_step);
        self.conversation.clear();
        self.surface.install_page(page);
        self.ready = true;
        log::info!("[renderer] page loaded ({} bytes markup)", page.markup.len());
    }

    fn replace_state(&mut self, snapshot: StateSnapshot) -> Result<()> {
        self.conversation.replace(snapshot.messages, snapshot.focus)?;
        self.surface.clear_messages();
        let indent = self.indent();
        for record in self.conversation.messages() {
            self.surface.insert_message(record, indent);
        }
        self.navigator
            .scroll_cursor_into_view(&self.conversation, &mut self.surface, false);
        Ok(())
    }

    fn add_message(&mut self, record: MessageRecord) -> Result<()> {
        let mid = record.mid.clone();
        self.conversation.add(record)?;
        if let Some(stored) = self.conversation.get(&mid) {
            self.surface.insert_message(stored, self.config.indent_messages);
        }
        Ok(())
    }

    fn update_message(&mut self, update: UpdateMessage) -> Result<()> {
        let mid = update.message.mid.clone();
        match update.kind {
            UpdateKind::Tags => {
                self.conversation
                    .update_tags(&mid, update.message.tags.clone())?;
                self.surface.set_tags(&mid, &update.message.tags);
            }
            UpdateKind::VisibleParts => {
                if self.conversation.get(&mid).is_some() && !self.surface.contains_message(&mid) {
                    bail!("message {mid} has no DOM node");
                }
                let before = self.conversation.cursor().clone();
                self.conversation.update_visible_parts(update.message)?;
                if let Some(stored) = self.conversation.get(&mid) {
                    self.surface.replace_message(stored, self.config.indent_messages);
                }
                self.keep_focus_visible(&before);
            }
        }
        Ok(())
    }

    fn remove_message(&mut self, mid: &str) -> Result<()> {
        let before = self.conversation.cursor().clone();
        self.conversation.remove(mid)?;
        self.surface.remove_message(mid);
        self.keep_focus_visible(&before);
        Ok(())
    }

    fn mark(&mut self, mark: &MarkMessage) -> Result<()> {
        self.conversation.set_marked(&mark.mid, mark.marked)?;
        self.surface.set_marked(&mark.mid, mark.marked);
        self.rescroll_if_displaced(&mark.mid);
        Ok(())
    }

    fn hide(&mut self, hide: &HideMessage) -> Result<()> {
        let before = self.conversation.cursor().clone();
        self.conversation.set_hidden(&hide.mid, hide.hidden)?;
        self.surface.set_hidden(&hide.mid, hide.hidden);
        self.keep_focus_visible(&before);
        self.rescroll_if_displaced(&hide.mid);
        Ok(())
    }

    fn notice(&mut self, notice: &Notice) -> Result<()> {
        if self.conversation.get(&notice.mid).is_none() {
            bail!("unknown message: {}", notice.mid);
        }
        self.surface
            .set_notice(&notice.mid, notice.kind, notice.text.as_deref());
        Ok(())
    }

    /// When the cursor moved as a side effect, bring it into view.
    fn keep_focus_visible(&mut self, before: &FocusCursor) {
        if self.conversation.cursor() != before {
            self.navigator
                .scroll_cursor_into_view(&self.conversation, &mut self.surface, false);
        }
    }

    /// Toggling another message can push the focused one out of view.
    fn rescroll_if_displaced(&mut self, toggled: &str) {
        let Some(focused) = self.conversation.cursor().message() else {
            return;
        };
        if focused == toggled {
            return;
        }
        let viewport = self.surface.viewport();
        let visible = self
            .surface
            .message_rect(focused)
            .is_none_or(|rect| viewport.overlap(rect) > 0.0);
        if !visible {
            self.navigator
                .scroll_cursor_into_view(&self.conversation, &mut self.surface, false);
        }
    }

    fn sync_focus(&mut self) {
        let cursor = self.conversation.cursor();
        let Some(mid) = cursor.message() else {
            self.surface.show_focus(None, None);
            return;
        };
        let message_id = message_dom_id(mid);
        let element_id = self
            .conversation
            .get(mid)
            .filter(|_| cursor.element() > 0)
            .and_then(|m| m.elements.get(cursor.element()))
            .map(|e| e.dom_id.clone());
        self.surface
            .show_focus(Some(&message_id), element_id.as_deref());
    }
}

// ─── Tests ─────────────────────────────────────────────────────────────────
