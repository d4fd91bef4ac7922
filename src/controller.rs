//! Controller-side thread view.
//!
//! [`ThreadView`] owns the controller's [`Conversation`] replica and the
//! [`Bridge`] to the renderer. Each operation applies the change locally,
//! sends the matching command synchronously, and adopts the focus reported
//! in the renderer's `Ack`.
//!
//! A failed `Ack` marks the view as diverged; callers recover with
//! [`ThreadView::resync`], which pushes a full `State` snapshot.

// Rust guideline compliant 2026-02

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};

use crate::bridge::Bridge;
use crate::config::Config;
use crate::navigation::{Direction, NavigationKind, Navigate};
use crate::protocol::{
    AckResult, AddMessage, ClearMessages, DebugLog, FocusElement, HideMessage, MarkMessage,
    Notice, NoticeKind, PageLoad, Payload, RemoveMessage, StateSnapshot, UpdateKind,
    UpdateMessage,
};
use crate::state::{Conversation, FocusCursor, MessageRecord};
use crate::transport::{Channel, Listener};

/// Base document installed by [`ThreadView::launch`].
pub const DEFAULT_PAGE_MARKUP: &str =
    "<!DOCTYPE html><html><head></head><body><div id=\"message_container\"></div></body></html>";

/// How long a closing renderer gets to exit before it is killed.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

// ─── Renderer process ──────────────────────────────────────────────────────

/// A spawned renderer child process.
#[derive(Debug)]
pub struct RendererProcess {
    child: Child,
}

impl RendererProcess {
    /// Spawn `exe renderer --socket <socket>`.
    pub fn spawn(exe: &Path, socket: &Path) -> Result<Self> {
        let child = Command::new(exe)
            .arg("renderer")
            .arg("--socket")
            .arg(socket)
            .stdin(Stdio::null())
            .spawn()
            .with_context(|| format!("spawn renderer: {}", exe.display()))?;
        log::info!("[controller] spawned renderer pid {}", child.id());
        Ok(Self { child })
    }

    /// Process id.
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Wait briefly for the renderer to exit on its own, then kill it.
    pub fn shutdown(mut self) {
        let deadline = Instant::now() + SHUTDOWN_GRACE;
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    log::info!("[controller] renderer exited: {status}");
                    return;
                }
                Ok(None) if Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(20));
                }
                Ok(None) | Err(_) => break,
            }
        }
        log::warn!("[controller] renderer did not exit, killing pid {}", self.child.id());
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

// ─── Thread view ───────────────────────────────────────────────────────────

/// The controller's handle on one rendered conversation.
#[derive(Debug)]
pub struct ThreadView<R, W> {
    bridge: Bridge<R, W>,
    conversation: Conversation,
    diverged: bool,
    process: Option<RendererProcess>,
}

impl ThreadView<UnixStream, UnixStream> {
    /// Spawn a renderer process, wait for it to connect, and load the page.
    pub fn launch(config: &Config) -> Result<Self> {
        let listener = Listener::bind_ephemeral(&config.socket_dir)?;
        let exe = renderer_exe(config)?;
        let process = RendererProcess::spawn(&exe, listener.address())?;

        let mut guard = scopeguard::guard(Some(process), |process| {
            if let Some(process) = process {
                process.shutdown();
            }
        });

        let channel = listener
            .accept_timeout(config.connect_timeout())?
            .ok_or_else(|| {
                anyhow!(
                    "renderer did not connect within {}s",
                    config.connect_timeout
                )
            })?;

        let mut view = Self::from_channel(channel)?;
        view.process = guard.take();

        let page = PageLoad {
            markup: DEFAULT_PAGE_MARKUP.to_string(),
            stylesheet: config.load_stylesheet()?,
            config: config.page_config(),
        };
        view.load_page(&page)?;
        Ok(view)
    }

    /// Build a view over an already-connected channel.
    pub fn from_channel(channel: Channel) -> Result<Self> {
        let (reader, writer) = channel.split()?;
        Ok(Self::new(Bridge::new(reader, writer)))
    }
}

impl<R: Read, W: Write> ThreadView<R, W> {
    /// Wrap a bridge.
    pub fn new(bridge: Bridge<R, W>) -> Self {
        Self {
            bridge,
            conversation: Conversation::new(),
            diverged: false,
            process: None,
        }
    }

    /// Current (renderer-confirmed) cursor.
    pub fn cursor(&self) -> &FocusCursor {
        self.conversation.cursor()
    }

    /// The controller's replica.
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Whether a command failed since the last successful resync.
    pub fn is_diverged(&self) -> bool {
        self.diverged
    }

    /// Install the base page; the renderer refuses everything else until then.
    pub fn load_page(&mut self, page: &PageLoad) -> Result<FocusCursor> {
        let ack = self.send(page)?;
        if !ack.success {
            anyhow::bail!("renderer refused the page");
        }
        self.conversation.clear();
        Ok(self.commit(ack))
    }

    /// Replace the displayed conversation with `messages`.
    pub fn open(&mut self, messages: Vec<MessageRecord>) -> Result<FocusCursor> {
        self.close()?;
        for record in messages {
            self.add_message(record)?;
        }
        Ok(self.cursor().clone())
    }

    /// Tear down every message.
    pub fn close(&mut self) -> Result<FocusCursor> {
        self.conversation.clear();
        self.sync(&ClearMessages)
    }

    /// Append a message.
    pub fn add_message(&mut self, record: MessageRecord) -> Result<FocusCursor> {
        self.conversation.add(record.clone())?;
        self.sync(&AddMessage { message: record })
    }

    /// Remove a message.
    pub fn remove_message(&mut self, mid: &str) -> Result<FocusCursor> {
        self.conversation.remove(mid)?;
        self.sync(&RemoveMessage {
            mid: mid.to_string(),
        })
    }

    /// Push a re-rendered message (same elements, new focusability/content).
    pub fn update_message(&mut self, record: MessageRecord) -> Result<FocusCursor> {
        self.conversation.update_visible_parts(record.clone())?;
        self.sync(&UpdateMessage {
            kind: UpdateKind::VisibleParts,
            message: record,
        })
    }

    /// Patch the tags of a message.
    pub fn update_tags(&mut self, mid: &str, tags: Vec<String>) -> Result<FocusCursor> {
        self.conversation.update_tags(mid, tags)?;
        let record = self
            .conversation
            .get(mid)
            .cloned()
            .ok_or_else(|| anyhow!("unknown message: {mid}"))?;
        self.sync(&UpdateMessage {
            kind: UpdateKind::Tags,
            message: record,
        })
    }

    /// Mark or unmark a message.
    pub fn mark(&mut self, mid: &str, marked: bool) -> Result<FocusCursor> {
        self.conversation.set_marked(mid, marked)?;
        self.sync(&MarkMessage {
            mid: mid.to_string(),
            marked,
        })
    }

    /// Collapse or expand a message.
    pub fn hide(&mut self, mid: &str, hidden: bool) -> Result<FocusCursor> {
        self.conversation.set_hidden(mid, hidden)?;
        self.sync(&HideMessage {
            mid: mid.to_string(),
            hidden,
        })
    }

    /// Focus an element without scrolling.
    pub fn focus_element(&mut self, mid: &str, element: usize) -> Result<FocusCursor> {
        self.conversation.focus(mid, element)?;
        self.sync(&FocusElement {
            mid: mid.to_string(),
            element,
        })
    }

    /// Navigate; the renderer decides where focus lands.
    pub fn navigate(&mut self, direction: Direction, kind: NavigationKind) -> Result<FocusCursor> {
        self.navigate_request(&Navigate::new(direction, kind))
    }

    /// Send an arbitrary navigation request.
    pub fn navigate_request(&mut self, request: &Navigate) -> Result<FocusCursor> {
        if let Some(target) = &request.target {
            // Validate locally so a bad target never reaches the renderer.
            let mut scratch = self.conversation.clone();
            scratch.focus(&target.mid, target.element)?;
        }
        self.sync(request)
    }

    /// Show (`Some`) or hide (`None`) an info/warning notice on a message.
    pub fn set_notice(
        &mut self,
        mid: &str,
        kind: NoticeKind,
        text: Option<&str>,
    ) -> Result<FocusCursor> {
        if self.conversation.get(mid).is_none() {
            anyhow::bail!("unknown message: {mid}");
        }
        self.sync(&Notice {
            mid: mid.to_string(),
            kind,
            text: text.map(str::to_string),
        })
    }

    /// Write a line to the renderer's log. Not acknowledged.
    pub fn debug(&self, msg: &str) -> Result<()> {
        self.bridge.send_async_payload(&DebugLog {
            msg: msg.to_string(),
        })?;
        Ok(())
    }

    /// Push the full controller replica to the renderer.
    pub fn resync(&mut self) -> Result<FocusCursor> {
        let (messages, focus) = self.conversation.snapshot();
        let ack = self.send(&StateSnapshot { messages, focus })?;
        if ack.success {
            self.diverged = false;
        }
        Ok(self.commit(ack))
    }

    /// Shut the renderer process down, if this view spawned it.
    pub fn shutdown(mut self) {
        if let Some(process) = self.process.take() {
            drop(self.bridge);
            process.shutdown();
        }
    }

    /// Send one acknowledged command. A transport failure leaves the replica
    /// ahead of the renderer, so the view is marked diverged.
    fn send<P: Payload>(&mut self, payload: &P) -> Result<AckResult> {
        match self.bridge.send_sync_payload(payload) {
            Ok(ack) => Ok(ack),
            Err(e) => {
                log::warn!("[controller] {:?} not delivered: {e}", P::TYPE);
                self.diverged = true;
                Err(e.into())
            }
        }
    }

    fn sync<P: Payload>(&mut self, payload: &P) -> Result<FocusCursor> {
        let ack = self.send(payload)?;
        Ok(self.commit(ack))
    }

    /// Adopt the renderer's focus.
    fn commit(&mut self, ack: AckResult) -> FocusCursor {
        if !ack.success {
            log::warn!("[controller] renderer reported failure; focus {}", ack.focus);
            self.diverged = true;
        }
        self.conversation.set_cursor(ack.focus);
        self.conversation.cursor().clone()
    }
}

/// Renderer binary for a config: the configured path or the running executable.
pub fn renderer_exe(config: &Config) -> Result<PathBuf> {
    match &config.renderer_exe {
        Some(exe) => Ok(exe.clone()),
        None => std::env::current_exe().context("locate renderer executable"),
    }
}

// ─── Tests ─────────────────────────────────────────────────────────────────
