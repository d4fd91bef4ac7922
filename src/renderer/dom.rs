//! Headless DOM arena.
//!
//! Nodes live in a slot vector addressed by [`NodeHandle`] and are indexed by
//! their stable DOM id, so a message can be re-rendered in place without
//! renumbering anything. Layout is a simple vertical stack:
//!
//! ```text
//! message   header (HEADER_HEIGHT)
//!   notice  banner (NOTICE_HEIGHT)          shown even when collapsed
//!   body    lines * LINE_HEIGHT             hidden with the `hide` class
//!   element PART / ATTACHMENT / MIME height hidden with `hide`; 0 if unfocusable
//! ```

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::constants::{
    ATTACHMENT_HEIGHT, HEADER_HEIGHT, INDENT_PX, LINE_HEIGHT, MAX_PREVIEW_LEN,
    MIME_MESSAGE_HEIGHT, NOTICE_HEIGHT, PART_HEIGHT,
};
use crate::navigation::{Layout, Rect, Viewport};
use crate::protocol::{NoticeKind, PageLoad};
use crate::state::{Address, Element, ElementType, MessageRecord};

use super::Surface;

/// Text of the banner shown for messages whose file is gone.
pub const MISSING_CONTENT_WARNING: &str =
    "The message file is missing, only fields cached in the index are shown.";

/// Index of a node in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHandle(usize);

/// What a node renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A message container (its own height is the header).
    Message,
    /// A notice banner inside a message.
    Notice(NoticeKind),
    /// The viewable body text of a message.
    Body,
    /// A focusable element of a message.
    Element(ElementType),
}

/// One DOM node.
#[derive(Debug, Clone)]
pub struct Node {
    /// Stable DOM id.
    pub dom_id: String,
    /// Node kind.
    pub kind: NodeKind,
    /// Parent node; `None` for messages (children of the container).
    pub parent: Option<NodeHandle>,
    /// Children in document order.
    pub children: Vec<NodeHandle>,
    /// CSS classes.
    pub classes: BTreeSet<String>,
    /// Attributes (`data-*`, `style`).
    pub attrs: BTreeMap<String, String>,
    /// Rendered text.
    pub text: String,
    /// Own height, excluding children.
    pub height: f64,
}

impl Node {
    fn new(dom_id: impl Into<String>, kind: NodeKind, height: f64) -> Self {
        Self {
            dom_id: dom_id.into(),
            kind,
            parent: None,
            children: Vec::new(),
            classes: BTreeSet::new(),
            attrs: BTreeMap::new(),
            text: String::new(),
            height,
        }
    }

    fn toggle_class(&mut self, class: &str, on: bool) {
        if on {
            self.classes.insert(class.to_owned());
        } else {
            self.classes.remove(class);
        }
    }
}

/// The headless renderer surface.
#[derive(Debug, Default)]
pub struct Dom {
    nodes: Vec<Option<Node>>,
    free: Vec<usize>,
    by_id: HashMap<String, NodeHandle>,
    messages: HashMap<String, NodeHandle>,
    container: Vec<NodeHandle>,
    markup: String,
    stylesheet: String,
    scroll_top: f64,
    viewport_height: f64,
    focused: Vec<NodeHandle>,
}

impl Dom {
    /// An empty document with the given viewport height (`0` = unbounded).
    pub fn new(viewport_height: f64) -> Self {
        Self {
            viewport_height: viewport_height.max(0.0),
            ..Self::default()
        }
    }

    /// Installed base markup.
    pub fn markup(&self) -> &str {
        &self.markup
    }

    /// Installed stylesheet.
    pub fn stylesheet(&self) -> &str {
        &self.stylesheet
    }

    /// Number of live nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    /// Look up a node handle by DOM id.
    pub fn lookup(&self, dom_id: &str) -> Option<NodeHandle> {
        self.by_id.get(dom_id).copied()
    }

    /// Borrow a node.
    pub fn get(&self, handle: NodeHandle) -> Option<&Node> {
        self.nodes.get(handle.0).and_then(Option::as_ref)
    }

    /// Borrow a node by DOM id.
    pub fn node(&self, dom_id: &str) -> Option<&Node> {
        self.lookup(dom_id).and_then(|h| self.get(h))
    }

    /// Whether the node carries `class`.
    pub fn has_class(&self, dom_id: &str, class: &str) -> bool {
        self.node(dom_id).is_some_and(|n| n.classes.contains(class))
    }

    /// Attribute value of a node.
    pub fn attr(&self, dom_id: &str, key: &str) -> Option<&str> {
        self.node(dom_id)
            .and_then(|n| n.attrs.get(key))
            .map(String::as_str)
    }

    /// DOM ids of the message nodes in display order.
    pub fn message_ids(&self) -> Vec<&str> {
        self.container
            .iter()
            .filter_map(|&h| self.get(h))
            .map(|n| n.dom_id.as_str())
            .collect()
    }

    /// DOM ids of every node carrying `focused`.
    pub fn focused_ids(&self) -> Vec<&str> {
        self.focused
            .iter()
            .filter_map(|&h| self.get(h))
            .map(|n| n.dom_id.as_str())
            .collect()
    }

    fn get_mut(&mut self, handle: NodeHandle) -> Option<&mut Node> {
        self.nodes.get_mut(handle.0).and_then(Option::as_mut)
    }

    /// Message node for `mid`; never an element or notice that happens to
    /// share its DOM id.
    fn message_handle(&self, mid: &str) -> Option<NodeHandle> {
        self.messages.get(mid).copied()
    }

    fn alloc(&mut self, node: Node) -> NodeHandle {
        let dom_id = node.dom_id.clone();
        let handle = match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = Some(node);
                NodeHandle(slot)
            }
            None => {
                self.nodes.push(Some(node));
                NodeHandle(self.nodes.len() - 1)
            }
        };
        match self.by_id.entry(dom_id) {
            Entry::Occupied(taken) => {
                log::warn!("[dom] duplicate DOM id {}, keeping the first node", taken.key());
            }
            Entry::Vacant(slot) => {
                slot.insert(handle);
            }
        }
        handle
    }

    fn release(&mut self, handle: NodeHandle) {
        let Some(node) = self.nodes.get_mut(handle.0).and_then(Option::take) else {
            return;
        };
        if self.by_id.get(&node.dom_id) == Some(&handle) {
            self.by_id.remove(&node.dom_id);
        }
        if let Some(mid) = node.attrs.get("data-mid") {
            if self.messages.get(mid) == Some(&handle) {
                self.messages.remove(mid);
            }
        }
        self.focused.retain(|&h| h != handle);
        self.free.push(handle.0);
        for child in node.children {
            self.release(child);
        }
    }

    fn append_child(&mut self, parent: NodeHandle, mut node: Node) -> NodeHandle {
        node.parent = Some(parent);
        let handle = self.alloc(node);
        if let Some(p) = self.get_mut(parent) {
            p.children.push(handle);
        }
        handle
    }

    // ─── Rendering ─────────────────────────────────────────────────────────

    fn header_text(record: &MessageRecord) -> String {
        let subject: String = if record.hidden {
            record.subject.chars().take(MAX_PREVIEW_LEN).collect()
        } else {
            record.subject.clone()
        };
        let date = if record.hidden {
            record.date_pretty()
        } else {
            record.date_verbose()
        };
        format!("{} | {} | {}", record.sender.full_address(), subject, date)
    }

    fn apply_header(node: &mut Node, record: &MessageRecord, indent: bool) {
        node.text = Self::header_text(record);
        node.classes.insert("message".to_owned());
        node.toggle_class("hide", record.hidden);
        node.toggle_class("marked", record.marked);
        node.attrs.insert("data-mid".to_owned(), record.mid.clone());
        node.attrs.insert("data-tags".to_owned(), record.tags.join(","));
        let recipients = |list: &[Address]| {
            list.iter()
                .map(Address::full_address)
                .collect::<Vec<_>>()
                .join(", ")
        };
        node.attrs.insert("data-to".to_owned(), recipients(&record.to));
        node.attrs.insert("data-cc".to_owned(), recipients(&record.cc));
        if indent && record.level > 0 {
            node.attrs.insert(
                "style".to_owned(),
                format!("margin-left: {}px", record.level * INDENT_PX),
            );
        } else {
            node.attrs.remove("style");
        }
    }

    fn element_node(element: &Element) -> Node {
        let (class, height) = match element.kind {
            ElementType::Empty => ("empty", 0.0),
            ElementType::Part => ("part", PART_HEIGHT),
            ElementType::Attachment => ("attachment", ATTACHMENT_HEIGHT),
            ElementType::MimeMessage => ("mime-message", MIME_MESSAGE_HEIGHT),
        };
        let mut node = Node::new(element.dom_id.clone(), NodeKind::Element(element.kind), height);
        node.classes.insert(class.to_owned());
        node.toggle_class("unfocusable", !element.focusable);
        node.text = element.label.clone();
        node
    }

    fn body_node(record: &MessageRecord) -> Node {
        let lines = record.body.lines().count();
        let mut node = Node::new(
            format!("body_{}", record.mid),
            NodeKind::Body,
            lines as f64 * LINE_HEIGHT,
        );
        node.classes.insert("body".to_owned());
        node.text = record.body.clone();
        node
    }

    fn notice_dom_id(mid: &str, kind: NoticeKind) -> String {
        format!("notice_{}_{mid}", kind.class())
    }

    /// Append the body and element nodes of `record` under `message`,
    /// reusing existing element nodes from `reuse` by DOM id.
    fn render_content(
        &mut self,
        message: NodeHandle,
        record: &MessageRecord,
        mut reuse: HashMap<String, NodeHandle>,
    ) {
        let body = Self::body_node(record);
        self.append_child(message, body);

        for element in record.elements.iter().skip(1) {
            let fresh = Self::element_node(element);
            match reuse.remove(&element.dom_id) {
                Some(handle) => {
                    if let Some(node) = self.get_mut(handle) {
                        let keep_focus = node.classes.contains("focused");
                        node.classes = fresh.classes;
                        node.toggle_class("focused", keep_focus);
                        node.text = fresh.text;
                        node.height = fresh.height;
                    }
                    if let Some(m) = self.get_mut(message) {
                        m.children.push(handle);
                    }
                }
                None => {
                    self.append_child(message, fresh);
                }
            }
        }

        for (_, stale) in reuse {
            self.release(stale);
        }
    }

    fn build_message(&mut self, record: &MessageRecord, indent: bool) -> NodeHandle {
        let mut node = Node::new(record.dom_id(), NodeKind::Message, HEADER_HEIGHT);
        Self::apply_header(&mut node, record, indent);
        let handle = self.alloc(node);
        self.messages.insert(record.mid.clone(), handle);
        if record.missing_content {
            self.set_notice_node(
                handle,
                &record.mid,
                NoticeKind::Warning,
                Some(MISSING_CONTENT_WARNING),
            );
        }
        self.render_content(handle, record, HashMap::new());
        handle
    }

    fn set_notice_node(
        &mut self,
        message: NodeHandle,
        mid: &str,
        kind: NoticeKind,
        text: Option<&str>,
    ) {
        let id = Self::notice_dom_id(mid, kind);
        let existing = self.get(message).and_then(|m| {
            m.children
                .iter()
                .copied()
                .find(|&c| self.get(c).is_some_and(|n| n.kind == NodeKind::Notice(kind)))
        });
        match (existing, text) {
            (Some(existing), Some(text)) => {
                if let Some(n) = self.get_mut(existing) {
                    n.text = text.to_owned();
                }
            }
            (Some(existing), None) => {
                if let Some(m) = self.get_mut(message) {
                    m.children.retain(|&c| c != existing);
                }
                self.release(existing);
            }
            (None, Some(text)) => {
                let mut node = Node::new(id, NodeKind::Notice(kind), NOTICE_HEIGHT);
                node.classes.insert(kind.class().to_owned());
                node.text = text.to_owned();
                node.parent = Some(message);
                let handle = self.alloc(node);
                if let Some(m) = self.get_mut(message) {
                    // Notices sit directly under the header.
                    m.children.insert(0, handle);
                }
            }
            (None, None) => {}
        }
    }

    // ─── Layout ────────────────────────────────────────────────────────────

    fn subtree_height(&self, handle: NodeHandle) -> f64 {
        let Some(node) = self.get(handle) else {
            return 0.0;
        };
        match node.kind {
            NodeKind::Message => {
                let collapsed = node.classes.contains("hide");
                node.height
                    + node
                        .children
                        .iter()
                        .filter_map(|&c| self.get(c).map(|n| (c, n)))
                        .filter(|(_, n)| !collapsed || matches!(n.kind, NodeKind::Notice(_)))
                        .map(|(c, _)| self.subtree_height(c))
                        .sum::<f64>()
            }
            NodeKind::Element(_) if node.classes.contains("unfocusable") => 0.0,
            _ => node.height,
        }
    }

    fn content_height(&self) -> f64 {
        self.container.iter().map(|&h| self.subtree_height(h)).sum()
    }

    fn message_top(&self, handle: NodeHandle) -> Option<f64> {
        let mut top = 0.0;
        for &h in &self.container {
            if h == handle {
                return Some(top);
            }
            top += self.subtree_height(h);
        }
        None
    }

    fn child_rect(&self, message: NodeHandle, child: NodeHandle) -> Option<Rect> {
        let node = self.get(message)?;
        let collapsed = node.classes.contains("hide");
        let mut top = self.message_top(message)? + node.height;
        for &c in &node.children {
            let Some(n) = self.get(c) else {
                continue;
            };
            let shown = !collapsed || matches!(n.kind, NodeKind::Notice(_));
            let height = if shown { self.subtree_height(c) } else { 0.0 };
            if c == child {
                return Some(Rect::new(top, height));
            }
            top += height;
        }
        None
    }

    fn element_handle(&self, message: NodeHandle, index: usize) -> Option<NodeHandle> {
        let node = self.get(message)?;
        node.children
            .iter()
            .copied()
            .filter(|&c| matches!(self.get(c).map(|n| n.kind), Some(NodeKind::Element(_))))
            .nth(index.checked_sub(1)?)
    }

    fn clamp_scroll(&mut self) {
        let viewport = self.viewport();
        self.scroll_top = viewport.clamp(self.scroll_top);
    }
}

impl Layout for Dom {
    fn viewport(&self) -> Viewport {
        let content_height = self.content_height();
        let viewport = Viewport {
            scroll_top: self.scroll_top,
            height: self.viewport_height,
            content_height,
        };
        Viewport {
            scroll_top: viewport.clamp(self.scroll_top),
            ..viewport
        }
    }

    fn message_rect(&self, mid: &str) -> Option<Rect> {
        let handle = self.message_handle(mid)?;
        Some(Rect::new(self.message_top(handle)?, self.subtree_height(handle)))
    }

    fn element_rect(&self, mid: &str, index: usize) -> Option<Rect> {
        if index == 0 {
            return self.message_rect(mid);
        }
        let message = self.message_handle(mid)?;
        let element = self.element_handle(message, index)?;
        self.child_rect(message, element)
    }

    fn scroll_to(&mut self, offset: f64) -> f64 {
        self.scroll_top = self.viewport().clamp(offset);
        self.scroll_top
    }
}

impl Surface for Dom {
    fn install_page(&mut self, page: &PageLoad) {
        self.clear_messages();
        self.markup = page.markup.clone();
        self.stylesheet = page.stylesheet.clone();
        self.viewport_height = page.config.viewport_height.max(0.0);
        self.scroll_top = 0.0;
    }

    fn contains_message(&self, mid: &str) -> bool {
        self.message_handle(mid).is_some()
    }

    fn insert_message(&mut self, record: &MessageRecord, indent: bool) {
        if let Some(existing) = self.message_handle(&record.mid) {
            log::warn!("[dom] replacing stale node for {}", record.mid);
            self.container.retain(|&h| h != existing);
            self.release(existing);
        }
        let handle = self.build_message(record, indent);
        self.container.push(handle);
    }

    fn replace_message(&mut self, record: &MessageRecord, indent: bool) -> bool {
        let Some(handle) = self.message_handle(&record.mid) else {
            return false;
        };
        let mut reuse = HashMap::new();
        let mut notices = Vec::new();
        let children = self
            .get_mut(handle)
            .map(|n| std::mem::take(&mut n.children))
            .unwrap_or_default();
        for child in children {
            match self.get(child).map(|n| (n.kind, n.dom_id.clone())) {
                Some((NodeKind::Element(_), id)) => {
                    reuse.insert(id, child);
                }
                Some((NodeKind::Notice(_), _)) => notices.push(child),
                _ => self.release(child),
            }
        }
        if let Some(node) = self.get_mut(handle) {
            Self::apply_header(node, record, indent);
            node.children = notices;
        }
        self.render_content(handle, record, reuse);
        self.clamp_scroll();
        true
    }

    fn remove_message(&mut self, mid: &str) -> bool {
        let Some(handle) = self.message_handle(mid) else {
            return false;
        };
        self.container.retain(|&h| h != handle);
        self.release(handle);
        self.clamp_scroll();
        true
    }

    fn clear_messages(&mut self) {
        for handle in std::mem::take(&mut self.container) {
            self.release(handle);
        }
        self.scroll_top = 0.0;
    }

    fn set_tags(&mut self, mid: &str, tags: &[String]) -> bool {
        let Some(node) = self.message_handle(mid).and_then(|h| self.get_mut(h)) else {
            return false;
        };
        node.attrs.insert("data-tags".to_owned(), tags.join(","));
        true
    }

    fn set_hidden(&mut self, mid: &str, hidden: bool) -> bool {
        let Some(node) = self.message_handle(mid).and_then(|h| self.get_mut(h)) else {
            return false;
        };
        node.toggle_class("hide", hidden);
        self.clamp_scroll();
        true
    }

    fn set_marked(&mut self, mid: &str, marked: bool) -> bool {
        let Some(node) = self.message_handle(mid).and_then(|h| self.get_mut(h)) else {
            return false;
        };
        node.toggle_class("marked", marked);
        true
    }

    fn set_notice(&mut self, mid: &str, kind: NoticeKind, text: Option<&str>) -> bool {
        let Some(handle) = self.message_handle(mid) else {
            return false;
        };
        self.set_notice_node(handle, mid, kind, text);
        true
    }

    fn show_focus(&mut self, message_dom_id: Option<&str>, element_dom_id: Option<&str>) {
        for handle in std::mem::take(&mut self.focused) {
            if let Some(node) = self.get_mut(handle) {
                node.classes.remove("focused");
            }
        }
        for id in message_dom_id.into_iter().chain(element_dom_id) {
            if let Some(handle) = self.lookup(id) {
                if let Some(node) = self.get_mut(handle) {
                    node.classes.insert("focused".to_owned());
                }
                self.focused.push(handle);
            }
        }
    }
}

// ─── Tests ─────────────────────────────────────────────────────────────────
