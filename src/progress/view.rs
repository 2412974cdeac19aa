//! Render container for all active transfers
//!
//! The view owns the terminal while it runs. A dedicated thread ticks every
//! registered widget at a fixed cadence, independent of transfer
//! throughput, and is the only consumer of completion texts.

use super::{CounterHandle, ProgressWidget};
use crate::config::ViewConfig;
use crate::error::Result;
use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Messages for the render thread
enum Control {
    /// Exit once every widget is done
    Settle,
    /// Exit now
    Stop,
}

type WidgetList = Arc<Mutex<Vec<ProgressWidget>>>;

fn lock_widgets(widgets: &WidgetList) -> MutexGuard<'_, Vec<ProgressWidget>> {
    widgets.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Tick every widget in registration order. Returns whether all are done.
fn tick_all(widgets: &WidgetList) -> bool {
    // Snapshot so add_bar isn't held up by a tick
    let snapshot: Vec<ProgressWidget> = lock_widgets(widgets).clone();
    let mut all_done = true;
    for widget in &snapshot {
        all_done &= widget.render_tick();
    }
    all_done
}

fn render_loop(widgets: WidgetList, control: Receiver<Control>, interval: Duration) {
    let mut settling = false;

    loop {
        match control.recv_timeout(interval) {
            Ok(Control::Settle) => settling = true,
            Ok(Control::Stop) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }

        let all_done = tick_all(&widgets);
        if settling && all_done {
            break;
        }
    }

    tracing::trace!("render loop exiting");
}

/// Container and render loop for the progress widgets of one invocation
pub struct ProgressView {
    multi: MultiProgress,
    config: ViewConfig,
    widgets: WidgetList,
    control: Sender<Control>,
    render_thread: Option<JoinHandle<()>>,
    started: Instant,
}

impl ProgressView {
    /// Create a view drawing to stderr (or nothing, if `config.hidden`)
    /// and start its render loop
    pub fn new(config: ViewConfig) -> Result<Self> {
        let target = if config.hidden {
            ProgressDrawTarget::hidden()
        } else {
            ProgressDrawTarget::stderr_with_hz(config.refresh_hz())
        };
        Self::with_draw_target(config, target)
    }

    /// Create a view drawing to `target` and start its render loop
    pub fn with_draw_target(config: ViewConfig, target: ProgressDrawTarget) -> Result<Self> {
        let mut view = Self::build(config, target);
        let (control_tx, control_rx) = unbounded();
        let widgets = Arc::clone(&view.widgets);
        let interval = config.refresh_interval;

        let handle = thread::Builder::new()
            .name("progress-render".to_string())
            .spawn(move || render_loop(widgets, control_rx, interval))?;

        view.control = control_tx;
        view.render_thread = Some(handle);
        Ok(view)
    }

    /// A view without a render thread; ticks only happen through [`tick`](Self::tick)
    #[cfg(test)]
    pub(crate) fn manual(config: ViewConfig) -> Self {
        Self::build(config, ProgressDrawTarget::hidden())
    }

    fn build(config: ViewConfig, target: ProgressDrawTarget) -> Self {
        let (control, _) = unbounded();
        Self {
            multi: MultiProgress::with_draw_target(target),
            config,
            widgets: Arc::new(Mutex::new(Vec::new())),
            control,
            render_thread: None,
            started: Instant::now(),
        }
    }

    /// Create a widget for `counter`, register it for rendering and attach
    /// it, flushing whatever the counter buffered so far.
    ///
    /// A counter that already has a widget keeps it; that widget is
    /// returned and nothing new is registered.
    pub fn add_bar(&self, counter: &CounterHandle) -> ProgressWidget {
        if let Some(existing) = counter.widget() {
            return existing;
        }

        let bar = self.multi.add(ProgressBar::new(counter.total()));
        let widget = ProgressWidget::new(
            bar,
            counter.kind(),
            counter.name(),
            counter.total(),
            counter.completion_receiver(),
            self.config.width,
        );

        let attached = counter.attach(widget.clone());
        if attached.same_as(&widget) {
            lock_widgets(&self.widgets).push(widget);
        } else {
            // Lost a race against another add_bar for the same counter
            self.multi.remove(widget.bar());
        }
        attached
    }

    /// Run one render tick on the calling thread. Returns whether every
    /// registered widget is done.
    pub fn tick(&self) -> bool {
        tick_all(&self.widgets)
    }

    /// Snapshot of the registered widgets in render order
    pub fn widgets(&self) -> Vec<ProgressWidget> {
        lock_widgets(&self.widgets).clone()
    }

    /// Wait until every widget has been finalized, then stop rendering.
    ///
    /// Blocks for as long as some transfer has not called finalize.
    pub fn join(mut self) -> ViewSummary {
        self.shutdown(Control::Settle);
        self.summary()
    }

    /// Stop rendering now. Widgets without a completion text are abandoned
    /// as they are.
    pub fn stop(mut self) -> ViewSummary {
        self.shutdown(Control::Stop);
        self.summary()
    }

    fn shutdown(&mut self, control: Control) {
        if let Some(handle) = self.render_thread.take() {
            let _ = self.control.send(control);
            if handle.join().is_err() {
                tracing::warn!("render thread panicked");
            }
        }

        // Pick up texts that arrived after the last tick
        if !self.tick() {
            for widget in lock_widgets(&self.widgets).iter() {
                widget.abandon();
            }
        }
    }

    /// Current totals over all registered widgets
    pub fn summary(&self) -> ViewSummary {
        let widgets = lock_widgets(&self.widgets);
        let finalized = widgets.iter().filter(|w| w.is_done()).count();

        ViewSummary {
            bars: widgets.len(),
            finalized,
            abandoned: widgets.len() - finalized,
            bytes: widgets.iter().map(|w| w.position()).sum(),
            elapsed_ms: self.started.elapsed().as_millis() as u64,
        }
    }
}

impl Drop for ProgressView {
    fn drop(&mut self) {
        if let Some(handle) = self.render_thread.take() {
            let _ = self.control.send(Control::Stop);
            let _ = handle.join();
        }
    }
}

/// Totals of a finished view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewSummary {
    /// Widgets that were registered
    pub bars: usize,
    /// Widgets that reached their completion text
    pub finalized: usize,
    /// Widgets left without one
    pub abandoned: usize,
    /// Bytes delivered to all widgets
    pub bytes: u64,
    /// Time since the view was created
    pub elapsed_ms: u64,
}

impl ViewSummary {
    /// Whether every widget settled
    pub fn is_complete(&self) -> bool {
        self.abandoned == 0
    }

    /// One-line human readable summary
    pub fn summary_line(&self) -> String {
        let mut line = format!(
            "{} of {} transfers completed, {} in {}",
            self.finalized,
            self.bars,
            humansize::format_size(self.bytes, humansize::BINARY),
            humantime::format_duration(Duration::from_millis(self.elapsed_ms)),
        );
        if self.abandoned > 0 {
            line.push_str(&format!(" ({} abandoned)", self.abandoned));
        }
        line
    }
}
