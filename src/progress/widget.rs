//! Live progress widget bound to a single transfer
//!
//! A widget is created by [`ProgressView::add_bar`](super::ProgressView::add_bar)
//! and shared between the view (which renders it) and the
//! [`ByteCounter`](super::ByteCounter) feeding it. Increments and the
//! completion check run under the same lock, so a render tick never sees a
//! half-applied update. Only render ticks touch the indicatif bar; an
//! increment just moves the recorded position.

use super::TransferKind;
use crate::config::{NAME_DISPLAY_LIMIT, NAME_KEEP};
use crossbeam::channel::Receiver;
use indicatif::{ProgressBar, ProgressStyle};
use std::borrow::Cow;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Columns taken by everything on a live line except the bar itself
const DECORATION_WIDTH: u16 = 90;

/// Narrowest bar drawn on small terminals
const MIN_BAR_WIDTH: u16 = 10;

/// What a widget currently shows
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderState {
    /// Live progress line
    Live,
    /// Frozen completion text
    Done(String),
}

struct WidgetState {
    position: u64,
    render: RenderState,
}

struct WidgetInner {
    bar: ProgressBar,
    kind: TransferKind,
    name: String,
    total: u64,
    completion: Receiver<String>,
    state: Mutex<WidgetState>,
}

/// Handle to one live progress line
#[derive(Clone)]
pub struct ProgressWidget {
    inner: Arc<WidgetInner>,
}

impl ProgressWidget {
    pub(crate) fn new(
        bar: ProgressBar,
        kind: TransferKind,
        name: &str,
        total: u64,
        completion: Receiver<String>,
        display_width: u16,
    ) -> Self {
        let name = truncate_name(name).into_owned();

        bar.set_style(live_style(display_width));
        bar.set_prefix(kind.verb());
        bar.set_message(name.clone());

        Self {
            inner: Arc::new(WidgetInner {
                bar,
                kind,
                name,
                total,
                completion,
                state: Mutex::new(WidgetState {
                    position: 0,
                    render: RenderState::Live,
                }),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, WidgetState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Advance the widget by `n` bytes. Ignored once the widget is done.
    ///
    /// Never draws; the next render tick shows the new position.
    pub(crate) fn increment(&self, n: u64) {
        if n == 0 {
            return;
        }

        let mut state = self.lock();
        if let RenderState::Done(_) = state.render {
            tracing::trace!(
                name = %self.inner.name,
                bytes = n,
                "increment after completion ignored"
            );
            return;
        }

        state.position = state.position.saturating_add(n);
    }

    /// Run one render tick.
    ///
    /// Polls the completion slot without blocking. A pending text freezes
    /// the widget for good; otherwise the spinner advances. Returns whether
    /// the widget is done.
    pub fn render_tick(&self) -> bool {
        let mut state = self.lock();
        if let RenderState::Done(_) = state.render {
            return true;
        }

        self.inner.bar.set_position(state.position);
        match self.inner.completion.try_recv() {
            Ok(text) => {
                self.inner.bar.set_style(done_style());
                self.inner.bar.finish_with_message(text.clone());
                tracing::debug!(
                    name = %self.inner.name,
                    bytes = state.position,
                    total = self.inner.total,
                    "transfer settled"
                );
                state.render = RenderState::Done(text);
                true
            }
            Err(_) => {
                self.inner.bar.tick();
                false
            }
        }
    }

    /// Leave the line as it is without a completion text
    pub(crate) fn abandon(&self) {
        let state = self.lock();
        if state.render == RenderState::Live {
            self.inner.bar.set_position(state.position);
            self.inner.bar.abandon();
        }
    }

    /// Bytes delivered to this widget so far
    pub fn position(&self) -> u64 {
        self.lock().position
    }

    /// Declared transfer size
    pub fn total(&self) -> u64 {
        self.inner.total
    }

    /// Direction of the transfer
    pub fn kind(&self) -> TransferKind {
        self.inner.kind
    }

    /// Display name, already elided
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Whether the completion text has been picked up
    pub fn is_done(&self) -> bool {
        matches!(self.lock().render, RenderState::Done(_))
    }

    /// Current render state
    pub fn state(&self) -> RenderState {
        self.lock().render.clone()
    }

    /// The frozen completion text, once the widget is done
    pub fn completion_text(&self) -> Option<String> {
        match &self.lock().render {
            RenderState::Done(text) => Some(text.clone()),
            RenderState::Live => None,
        }
    }

    /// Plain-text rendering of the current state
    pub fn render_line(&self) -> String {
        let state = self.lock();
        match &state.render {
            RenderState::Done(text) => text.clone(),
            RenderState::Live => format!(
                "{} '{}' {:>3}% [{} / {}]",
                self.inner.kind.verb(),
                self.inner.name,
                percent(state.position, self.inner.total),
                humansize::format_size(state.position, humansize::BINARY),
                humansize::format_size(self.inner.total, humansize::BINARY),
            ),
        }
    }

    /// Whether both handles point at the same widget
    pub fn same_as(&self, other: &ProgressWidget) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn bar(&self) -> &ProgressBar {
        &self.inner.bar
    }
}

impl fmt::Debug for ProgressWidget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("ProgressWidget")
            .field("kind", &self.inner.kind)
            .field("name", &self.inner.name)
            .field("total", &self.inner.total)
            .field("position", &state.position)
            .field("render", &state.render)
            .finish()
    }
}

/// Elide long names to a fixed head and tail around `...`
pub fn truncate_name(name: &str) -> Cow<'_, str> {
    let count = name.chars().count();
    if count <= NAME_DISPLAY_LIMIT {
        return Cow::Borrowed(name);
    }

    let head: String = name.chars().take(NAME_KEEP).collect();
    let tail: String = name.chars().skip(count - NAME_KEEP).collect();
    Cow::Owned(format!("{}...{}", head, tail))
}

fn percent(position: u64, total: u64) -> u64 {
    if total == 0 {
        return 0;
    }
    (position.min(total) as u128 * 100 / total as u128) as u64
}

fn bar_width(display_width: u16) -> u16 {
    display_width
        .saturating_sub(DECORATION_WIDTH)
        .max(MIN_BAR_WIDTH)
}

fn live_style(display_width: u16) -> ProgressStyle {
    let template = format!(
        "{{spinner:.green}} {{prefix}} '{{msg}}' {{percent:>3}}% ({{bar:{}.cyan/blue}}) [{{bytes}} / {{total_bytes}}]",
        bar_width(display_width)
    );

    ProgressStyle::with_template(&template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>_")
}

fn done_style() -> ProgressStyle {
    ProgressStyle::with_template("{msg}").unwrap_or_else(|_| ProgressStyle::default_bar())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::bounded;

    fn make_widget(total: u64) -> (ProgressWidget, crossbeam::channel::Sender<String>) {
        let (tx, rx) = bounded(1);
        let bar = ProgressBar::hidden();
        let widget = ProgressWidget::new(bar, TransferKind::Upload, "data.bin", total, rx, 130);
        (widget, tx)
    }

    #[test]
    fn test_truncate_name() {
        assert_eq!(truncate_name("short.txt"), "short.txt");

        let exact = "a".repeat(NAME_DISPLAY_LIMIT);
        assert_eq!(truncate_name(&exact), exact.as_str());

        let long = format!("{}{}{}", "h".repeat(20), "middle-part", "t".repeat(20));
        let truncated = truncate_name(&long);
        assert_eq!(truncated, format!("{}...{}", "h".repeat(20), "t".repeat(20)));
    }

    #[test]
    fn test_truncate_name_multibyte() {
        let long = "é".repeat(50);
        let truncated = truncate_name(&long);
        assert_eq!(truncated.chars().count(), NAME_KEEP * 2 + 3);
    }

    #[test]
    fn test_bar_width() {
        assert_eq!(bar_width(130), 40);
        assert_eq!(bar_width(80), MIN_BAR_WIDTH);
    }

    #[test]
    fn test_percent() {
        assert_eq!(percent(0, 0), 0);
        assert_eq!(percent(300, 1000), 30);
        assert_eq!(percent(2000, 1000), 100);
    }

    #[test]
    fn test_live_line() {
        let (widget, _tx) = make_widget(1000);
        widget.increment(300);

        assert_eq!(widget.position(), 300);
        assert_eq!(widget.render_line(), "Uploading 'data.bin'  30% [300 B / 1000 B]");
    }

    #[test]
    fn test_bar_moves_only_on_tick() {
        let (widget, _tx) = make_widget(1000);
        widget.increment(250);
        widget.increment(50);

        assert_eq!(widget.position(), 300);
        assert_eq!(widget.bar().position(), 0);

        assert!(!widget.render_tick());
        assert_eq!(widget.bar().position(), 300);
    }

    #[test]
    fn test_completion_freezes_widget() {
        let (widget, tx) = make_widget(1000);
        widget.increment(400);

        assert!(!widget.render_tick());
        assert_eq!(widget.state(), RenderState::Live);

        tx.send("Upload failed: connection reset".to_string()).unwrap();
        assert!(widget.render_tick());
        assert_eq!(widget.completion_text().as_deref(), Some("Upload failed: connection reset"));

        widget.increment(600);
        assert_eq!(widget.position(), 400);

        tx.send("another text".to_string()).unwrap();
        assert!(widget.render_tick());
        assert_eq!(widget.render_line(), "Upload failed: connection reset");
    }
}
