//! Focus navigation state machine.
//!
//! Turns a [`Navigate`] intent into a cursor move on a [`Conversation`] plus
//! scroll side effects on a [`Layout`]. The renderer runs it against the real
//! (or headless) surface and reports the outcome back in its `Ack`.
//!
//! Intents:
//!
//! | kind            | behavior                                                      |
//! |-----------------|---------------------------------------------------------------|
//! | `VisualSmall`   | scroll one step, then re-derive focus if it left the view     |
//! | `VisualBig`     | scroll one page, then re-derive focus                         |
//! | `VisualElement` | step to the adjacent element only if it is fully in view      |
//! | `Element`       | always step, rolling over into the adjacent message           |
//! | `Message`       | adjacent message, element 0 (or its last element with `bottom`) |
//! | `FocusView`     | re-derive focus from the viewport                             |
//! | `Extreme`       | first/last navigable element of the conversation              |
//!
//! `Direction::Specific` jumps to an explicit target and scrolls it to the top.

// Rust guideline compliant 2026-02

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{DEFAULT_SCROLL_STEP, PAGE_STEP_FRACTION};
use crate::state::{Conversation, StateError};

// ─── Intents ───────────────────────────────────────────────────────────────

/// Direction of a navigation intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Toward the start of the conversation.
    Up,
    /// Toward the end of the conversation.
    Down,
    /// Explicit target given in [`Navigate::target`].
    Specific,
}

/// Granularity of a navigation intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NavigationKind {
    /// Scroll a small step.
    VisualSmall,
    /// Scroll a page.
    VisualBig,
    /// Step one element if it is visible, otherwise scroll.
    VisualElement,
    /// Step one element unconditionally.
    Element,
    /// Step one message.
    Message,
    /// Focus whatever message is in view.
    FocusView,
    /// Jump to the first or last element.
    Extreme,
}

/// Explicit target for [`Direction::Specific`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusTarget {
    /// Target message id.
    pub mid: String,
    /// Target element index.
    #[serde(default)]
    pub element: usize,
}

/// `Navigate` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Navigate {
    /// Direction.
    pub direction: Direction,
    /// Granularity.
    pub kind: NavigationKind,
    /// For backward `Message` moves: enter the message at its last element.
    #[serde(default)]
    pub bottom: bool,
    /// Target for `Direction::Specific`.
    #[serde(default)]
    pub target: Option<FocusTarget>,
}

impl Navigate {
    /// An intent without target or bottom entry.
    pub fn new(direction: Direction, kind: NavigationKind) -> Self {
        Self {
            direction,
            kind,
            bottom: false,
            target: None,
        }
    }

    /// Jump to an explicit element.
    pub fn specific(mid: impl Into<String>, element: usize) -> Self {
        Self {
            direction: Direction::Specific,
            kind: NavigationKind::Element,
            bottom: false,
            target: Some(FocusTarget {
                mid: mid.into(),
                element,
            }),
        }
    }
}

/// Navigation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NavigationError {
    /// `Direction::Specific` without a target.
    #[error("specific navigation requires a target")]
    MissingTarget,

    /// The target does not exist in the conversation.
    #[error(transparent)]
    State(#[from] StateError),
}

// ─── Layout ────────────────────────────────────────────────────────────────

/// Vertical extent of a laid-out node, in document coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    /// Distance from the top of the document.
    pub top: f64,
    /// Height.
    pub height: f64,
}

impl Rect {
    /// Create a rect.
    pub fn new(top: f64, height: f64) -> Self {
        Self { top, height }
    }

    /// Bottom edge.
    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }
}

/// The scrollable viewport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// Current scroll offset.
    pub scroll_top: f64,
    /// Visible height; `0` means the surface does not page.
    pub height: f64,
    /// Total document height.
    pub content_height: f64,
}

impl Viewport {
    /// Whether the surface has a bounded viewport.
    pub fn is_paged(&self) -> bool {
        self.height > 0.0
    }

    /// Bottom edge of the visible window.
    pub fn bottom(&self) -> f64 {
        self.scroll_top + self.height
    }

    /// Largest valid scroll offset.
    pub fn max_scroll(&self) -> f64 {
        (self.content_height - self.height).max(0.0)
    }

    /// Scrolled to the very top.
    pub fn at_top(&self) -> bool {
        !self.is_paged() || self.scroll_top <= 0.0
    }

    /// Scrolled to the very bottom.
    pub fn at_bottom(&self) -> bool {
        !self.is_paged() || self.scroll_top >= self.max_scroll()
    }

    /// Visible height of `rect`.
    pub fn overlap(&self, rect: Rect) -> f64 {
        if !self.is_paged() {
            return rect.height;
        }
        (rect.bottom().min(self.bottom()) - rect.top.max(self.scroll_top)).max(0.0)
    }

    /// `rect` is entirely visible.
    pub fn contains(&self, rect: Rect) -> bool {
        !self.is_paged() || (rect.top >= self.scroll_top && rect.bottom() <= self.bottom())
    }

    /// Clamp an offset into `[0, max_scroll]`.
    pub fn clamp(&self, offset: f64) -> f64 {
        offset.clamp(0.0, self.max_scroll())
    }
}

/// Geometry and scrolling provided by the renderer surface.
pub trait Layout {
    /// Current viewport.
    fn viewport(&self) -> Viewport;

    /// Extent of a whole message.
    fn message_rect(&self, mid: &str) -> Option<Rect>;

    /// Extent of element `index` of a message. Index 0 is the message itself.
    fn element_rect(&self, mid: &str, index: usize) -> Option<Rect>;

    /// Scroll to `offset` (clamped); returns the resulting offset.
    fn scroll_to(&mut self, offset: f64) -> f64;
}

// ─── Navigator ─────────────────────────────────────────────────────────────

/// Stateless navigation engine parameterised by scroll step sizes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Navigator {
    scroll_step: f64,
}

impl Default for Navigator {
    fn default() -> Self {
        Self::new(DEFAULT_SCROLL_STEP)
    }
}

impl Navigator {
    /// Create a navigator with the given small scroll step.
    pub fn new(scroll_step: f64) -> Self {
        Self {
            scroll_step: if scroll_step > 0.0 {
                scroll_step
            } else {
                DEFAULT_SCROLL_STEP
            },
        }
    }

    /// Apply one navigation intent.
    pub fn navigate<L: Layout + ?Sized>(
        &self,
        conversation: &mut Conversation,
        layout: &mut L,
        request: &Navigate,
    ) -> Result<(), NavigationError> {
        let down = match request.direction {
            Direction::Specific => {
                let target = request.target.as_ref().ok_or(NavigationError::MissingTarget)?;
                conversation.focus(&target.mid, target.element)?;
                self.scroll_cursor_into_view(conversation, layout, true);
                return Ok(());
            }
            Direction::Down => true,
            Direction::Up => false,
        };

        match request.kind {
            NavigationKind::VisualSmall => {
                self.scroll_by(layout, down, self.scroll_step);
                self.focus_to_view(conversation, layout, down)?;
            }
            NavigationKind::VisualBig => {
                let page = layout.viewport().height * PAGE_STEP_FRACTION;
                self.scroll_by(layout, down, page.max(self.scroll_step));
                self.focus_to_view(conversation, layout, down)?;
            }
            NavigationKind::FocusView => self.focus_to_view(conversation, layout, down)?,
            NavigationKind::VisualElement => self.visual_element(conversation, layout, down)?,
            NavigationKind::Element => self.element(conversation, layout, down)?,
            NavigationKind::Message => self.message(conversation, layout, down, request.bottom)?,
            NavigationKind::Extreme => self.extreme(conversation, layout, down)?,
        }
        Ok(())
    }

    /// Re-derive focus from the viewport.
    ///
    /// Does nothing while the focused message still overlaps the view.
    /// Otherwise focuses the message with the largest visible area, ties
    /// going to the one closest to the previous focus. Moving down lands on
    /// element 0; moving up lands on the message's last navigable element.
    pub fn focus_to_view<L: Layout + ?Sized>(
        &self,
        conversation: &mut Conversation,
        layout: &L,
        down: bool,
    ) -> Result<(), NavigationError> {
        if conversation.is_empty() {
            return Ok(());
        }
        let viewport = layout.viewport();
        let focused = conversation.focused();

        if let Some((pos, _)) = focused {
            let mid = &conversation.messages()[pos].mid;
            let in_view = layout
                .message_rect(mid)
                .is_none_or(|rect| viewport.overlap(rect) > 0.0);
            if in_view {
                return Ok(());
            }
        }

        let anchor = focused.map_or(0, |(pos, _)| pos);
        let mut best: Option<(usize, f64)> = None;
        for (i, record) in conversation.messages().iter().enumerate() {
            let Some(rect) = layout.message_rect(&record.mid) else {
                continue;
            };
            let visible = viewport.overlap(rect);
            if visible <= 0.0 {
                continue;
            }
            best = match best {
                Some((j, v))
                    if v > visible
                        || (v == visible && j.abs_diff(anchor) <= i.abs_diff(anchor)) =>
                {
                    Some((j, v))
                }
                _ => Some((i, visible)),
            };
        }

        let Some((pos, _)) = best else {
            return Ok(());
        };
        let record = &conversation.messages()[pos];
        let element = if down { 0 } else { record.last_navigable() };
        let mid = record.mid.clone();
        conversation.focus(&mid, element)?;
        Ok(())
    }

    /// Scroll the focused element (or message) into view.
    ///
    /// With `force` the target is aligned to the top of the viewport;
    /// otherwise the view only moves when the target is not fully visible.
    pub fn scroll_cursor_into_view<L: Layout + ?Sized>(
        &self,
        conversation: &Conversation,
        layout: &mut L,
        force: bool,
    ) {
        let Some(mid) = conversation.cursor().message() else {
            return;
        };
        let index = conversation.cursor().element();
        let rect = if index == 0 {
            layout.message_rect(mid)
        } else {
            layout.element_rect(mid, index)
        };
        if let Some(rect) = rect {
            scroll_into_view(layout, rect, force);
        }
    }

    fn scroll_by<L: Layout + ?Sized>(&self, layout: &mut L, down: bool, amount: f64) -> f64 {
        let current = layout.viewport().scroll_top;
        let target = if down { current + amount } else { current - amount };
        layout.scroll_to(target)
    }

    fn visual_element<L: Layout + ?Sized>(
        &self,
        conversation: &mut Conversation,
        layout: &mut L,
        down: bool,
    ) -> Result<(), NavigationError> {
        let Some((pos, index)) = conversation.focused() else {
            return self.initialize(conversation, layout, down);
        };
        let record = &conversation.messages()[pos];
        let mid = record.mid.clone();
        let viewport = layout.viewport();

        let candidate = if down {
            record.next_navigable(index)
        } else {
            record.prev_navigable(index)
        };
        if let Some(next) = candidate {
            let visible = next == 0
                || layout
                    .element_rect(&mid, next)
                    .is_none_or(|rect| viewport.contains(rect));
            let at_extreme = if down {
                viewport.at_bottom()
            } else {
                viewport.at_top()
            };
            if visible || at_extreme {
                conversation.focus(&mid, next)?;
                return Ok(());
            }
        }

        let before = viewport.scroll_top;
        let after = self.scroll_by(layout, down, self.scroll_step);
        if after != before {
            return self.focus_to_view(conversation, layout, down);
        }

        // Cannot scroll further: step into the adjacent message.
        self.adjacent_message(conversation, pos, down, !down)
    }

    fn element<L: Layout + ?Sized>(
        &self,
        conversation: &mut Conversation,
        layout: &mut L,
        down: bool,
    ) -> Result<(), NavigationError> {
        let Some((pos, index)) = conversation.focused() else {
            return self.initialize(conversation, layout, down);
        };
        let record = &conversation.messages()[pos];
        let candidate = if down {
            record.next_navigable(index)
        } else {
            record.prev_navigable(index)
        };
        match candidate {
            Some(next) => {
                let mid = record.mid.clone();
                conversation.focus(&mid, next)?;
            }
            None => self.adjacent_message(conversation, pos, down, !down)?,
        }
        self.scroll_cursor_into_view(conversation, layout, false);
        Ok(())
    }

    fn message<L: Layout + ?Sized>(
        &self,
        conversation: &mut Conversation,
        layout: &mut L,
        down: bool,
        bottom: bool,
    ) -> Result<(), NavigationError> {
        match conversation.focused() {
            Some((pos, _)) => self.adjacent_message(conversation, pos, down, bottom && !down)?,
            None if conversation.is_empty() => return Ok(()),
            None => {
                let pos = if down { 0 } else { conversation.len() - 1 };
                let record = &conversation.messages()[pos];
                let element = if bottom && !down {
                    record.last_navigable()
                } else {
                    0
                };
                let mid = record.mid.clone();
                conversation.focus(&mid, element)?;
            }
        }
        self.scroll_cursor_into_view(conversation, layout, false);
        Ok(())
    }

    fn extreme<L: Layout + ?Sized>(
        &self,
        conversation: &mut Conversation,
        layout: &mut L,
        down: bool,
    ) -> Result<(), NavigationError> {
        let viewport = layout.viewport();
        if down {
            layout.scroll_to(viewport.max_scroll());
        } else {
            layout.scroll_to(0.0);
        }
        let record = if down {
            conversation.messages().last()
        } else {
            conversation.messages().first()
        };
        let Some(record) = record else {
            return Ok(());
        };
        let element = if down { record.last_navigable() } else { 0 };
        let mid = record.mid.clone();
        conversation.focus(&mid, element)?;
        Ok(())
    }

    /// Focus the message next to `pos`; stays put at either end.
    fn adjacent_message(
        &self,
        conversation: &mut Conversation,
        pos: usize,
        down: bool,
        enter_at_bottom: bool,
    ) -> Result<(), NavigationError> {
        let target = if down {
            pos.checked_add(1).filter(|&p| p < conversation.len())
        } else {
            pos.checked_sub(1)
        };
        let Some(target) = target else {
            return Ok(());
        };
        let record = &conversation.messages()[target];
        let element = if enter_at_bottom {
            record.last_navigable()
        } else {
            0
        };
        let mid = record.mid.clone();
        conversation.focus(&mid, element)?;
        Ok(())
    }

    /// First keyboard step on an unset cursor: first message going down,
    /// last element of the last message going up.
    fn initialize<L: Layout + ?Sized>(
        &self,
        conversation: &mut Conversation,
        layout: &mut L,
        down: bool,
    ) -> Result<(), NavigationError> {
        let record = if down {
            conversation.messages().first()
        } else {
            conversation.messages().last()
        };
        let Some(record) = record else {
            return Ok(());
        };
        let element = if down { 0 } else { record.last_navigable() };
        let mid = record.mid.clone();
        conversation.focus(&mid, element)?;
        self.scroll_cursor_into_view(conversation, layout, false);
        Ok(())
    }
}

/// Scroll so that `rect` is visible.
///
/// With `force`, align its top with the viewport top. Otherwise scroll the
/// minimum amount, preferring the top edge for rects taller than the view.
pub fn scroll_into_view<L: Layout + ?Sized>(layout: &mut L, rect: Rect, force: bool) {
    let viewport = layout.viewport();
    if !viewport.is_paged() {
        return;
    }
    if force || rect.top < viewport.scroll_top {
        layout.scroll_to(rect.top);
    } else if rect.bottom() > viewport.bottom() {
        layout.scroll_to((rect.bottom() - viewport.height).min(rect.top));
    }
}

// ─── Tests ─────────────────────────────────────────────────────────────────
