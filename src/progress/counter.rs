//! Byte-counting stream proxy
//!
//! [`ByteCounter`] sits between a transfer and its stream. Every byte the
//! stream accepts is counted: into an attached [`ProgressWidget`], or into a
//! buffer while no widget exists yet. Attaching flushes the buffer as one
//! increment.
//!
//! Completion is a one-shot text handed over through a single-slot channel.
//! The producer never waits on it: if the slot still holds a text the render
//! loop has not picked up, the old text is dropped and the new one takes its
//! place (last writer wins). A text that arrives after the widget froze is
//! never rendered.

use super::ProgressWidget;
use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Direction of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferKind {
    /// Local data going to the store
    Upload,
    /// Store data coming back
    Download,
}

impl TransferKind {
    /// Present participle used on live lines
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Upload => "Uploading",
            Self::Download => "Downloading",
        }
    }

    /// Past tense used on completion lines
    pub fn past_tense(&self) -> &'static str {
        match self {
            Self::Upload => "Uploaded",
            Self::Download => "Downloaded",
        }
    }
}

impl fmt::Display for TransferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upload => write!(f, "Upload"),
            Self::Download => write!(f, "Download"),
        }
    }
}

/// Where counted bytes go
enum Attachment {
    /// No widget yet; bytes accumulate here
    Unattached { buffered: u64 },
    /// Bytes go straight to the widget
    Attached(ProgressWidget),
}

/// Single-slot completion channel
struct CompletionSlot {
    tx: Sender<String>,
    rx: Receiver<String>,
}

impl CompletionSlot {
    fn new() -> Self {
        let (tx, rx) = bounded(1);
        Self { tx, rx }
    }

    /// Put `text` into the slot, evicting a pending one. Returns whether a
    /// pending text was evicted.
    fn deliver(&self, mut text: String) -> bool {
        let mut evicted = false;
        loop {
            match self.tx.try_send(text) {
                Ok(()) => return evicted,
                Err(TrySendError::Full(pending)) => {
                    evicted |= self.rx.try_recv().is_ok();
                    text = pending;
                }
                // The slot owns a receiver, so this can't happen
                Err(TrySendError::Disconnected(_)) => return evicted,
            }
        }
    }
}

struct CounterShared {
    kind: TransferKind,
    total: u64,
    name: String,
    attachment: Mutex<Attachment>,
    completion: CompletionSlot,
    finalized: AtomicBool,
}

/// Shareable side of a [`ByteCounter`]
///
/// The view attaches widgets through it and the producer may finalize
/// through it after handing the counter itself away.
#[derive(Clone)]
pub struct CounterHandle {
    shared: Arc<CounterShared>,
}

impl CounterHandle {
    fn new(kind: TransferKind, total: u64, name: String) -> Self {
        Self {
            shared: Arc::new(CounterShared {
                kind,
                total,
                name,
                attachment: Mutex::new(Attachment::Unattached { buffered: 0 }),
                completion: CompletionSlot::new(),
                finalized: AtomicBool::new(false),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Attachment> {
        self.shared
            .attachment
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Direction of the transfer
    pub fn kind(&self) -> TransferKind {
        self.shared.kind
    }

    /// Declared transfer size in bytes
    pub fn total(&self) -> u64 {
        self.shared.total
    }

    /// Full display name
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Bytes counted while no widget was attached
    pub fn buffered(&self) -> u64 {
        match &*self.lock() {
            Attachment::Unattached { buffered } => *buffered,
            Attachment::Attached(_) => 0,
        }
    }

    /// The attached widget, if any
    pub fn widget(&self) -> Option<ProgressWidget> {
        match &*self.lock() {
            Attachment::Unattached { .. } => None,
            Attachment::Attached(widget) => Some(widget.clone()),
        }
    }

    /// Whether a widget has been attached
    pub fn is_attached(&self) -> bool {
        matches!(&*self.lock(), Attachment::Attached(_))
    }

    /// Whether [`finalize`](Self::finalize) has been called
    pub fn is_finalized(&self) -> bool {
        self.shared.finalized.load(Ordering::Acquire)
    }

    /// Hand over the completion line for this transfer.
    ///
    /// Never blocks. Calling it more than once is a driver bug: it is logged
    /// and the latest text replaces one the render loop has not yet taken.
    pub fn finalize(&self, text: impl Into<String>) {
        let text = text.into();
        if self.shared.finalized.swap(true, Ordering::AcqRel) {
            tracing::warn!(name = %self.shared.name, "transfer finalized more than once");
        }

        if self.shared.completion.deliver(text) {
            tracing::debug!(name = %self.shared.name, "replaced pending completion text");
        }
    }

    /// Count `n` bytes that went through the stream
    pub(crate) fn record(&self, n: u64) {
        if n == 0 {
            return;
        }

        match &mut *self.lock() {
            Attachment::Unattached { buffered } => *buffered = buffered.saturating_add(n),
            Attachment::Attached(widget) => widget.increment(n),
        }
    }

    /// Attach `widget`, flushing buffered bytes into it.
    ///
    /// The transition happens once; a counter that already has a widget
    /// keeps it, and that widget is returned instead.
    pub(crate) fn attach(&self, widget: ProgressWidget) -> ProgressWidget {
        let mut attachment = self.lock();
        match std::mem::replace(&mut *attachment, Attachment::Attached(widget.clone())) {
            Attachment::Attached(existing) => {
                tracing::warn!(name = %self.shared.name, "counter already has a widget");
                *attachment = Attachment::Attached(existing.clone());
                existing
            }
            Attachment::Unattached { buffered } => {
                widget.increment(buffered);
                tracing::debug!(name = %self.shared.name, flushed = buffered, "widget attached");
                widget
            }
        }
    }

    pub(crate) fn completion_receiver(&self) -> Receiver<String> {
        self.shared.completion.rx.clone()
    }
}

impl fmt::Debug for CounterHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CounterHandle")
            .field("kind", &self.shared.kind)
            .field("name", &self.shared.name)
            .field("total", &self.shared.total)
            .field("attached", &self.is_attached())
            .field("finalized", &self.is_finalized())
            .finish()
    }
}

/// Stream proxy that counts the bytes of one transfer
///
/// Wrap `&mut W` to keep ownership of the stream with the caller.
#[derive(Debug)]
pub struct ByteCounter<W> {
    inner: W,
    handle: CounterHandle,
}

impl<W> ByteCounter<W> {
    /// Wrap `inner` for a transfer of `total` bytes shown as `name`
    pub fn new(kind: TransferKind, total: u64, name: impl Into<String>, inner: W) -> Self {
        Self {
            inner,
            handle: CounterHandle::new(kind, total, name.into()),
        }
    }

    /// Shareable handle for attaching and finalizing
    pub fn handle(&self) -> CounterHandle {
        self.handle.clone()
    }

    /// See [`CounterHandle::finalize`]
    pub fn finalize(&self, text: impl Into<String>) {
        self.handle.finalize(text);
    }

    /// Get a reference to the wrapped stream
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Get a mutable reference to the wrapped stream.
    ///
    /// Bytes moved through it directly are not counted.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Unwrap the stream
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for ByteCounter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.handle.record(n as u64);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<R: Read> Read for ByteCounter<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.handle.record(n as u64);
        Ok(n)
    }
}
