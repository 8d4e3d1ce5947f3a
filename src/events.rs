//! Capture lifecycle events and observers
//!
//! Events are advisory: the stitcher never waits on an observer and a
//! misbehaving observer cannot fail a capture.

use log::{debug, info, warn};
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaptureKind {
    Viewport,
    FullPage,
    Element,
}

impl CaptureKind {
    fn prefix(&self) -> &'static str {
        match self {
            CaptureKind::Viewport => "capture",
            CaptureKind::FullPage => "fullpage-capture",
            CaptureKind::Element => "element-capture",
        }
    }
}

/// Per-tile progress of a full-page capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    /// 1-based index of the tile being captured
    pub current: usize,
    pub total: usize,
    /// `round(100 * current / total)`
    pub percent: u32,
}

impl Progress {
    pub fn new(current: usize, total: usize) -> Self {
        let percent = if total == 0 {
            100
        } else {
            (100.0 * current as f64 / total as f64).round() as u32
        };
        Self { current, total, percent }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum CaptureEvent {
    Started { kind: CaptureKind },
    Progress(Progress),
    Completed { kind: CaptureKind, width: u32, height: u32, tiles: usize },
    Failed { kind: CaptureKind, message: String },
}

impl CaptureEvent {
    /// DOM-style event name, e.g. `fullpage-capture-progress`.
    pub fn name(&self) -> String {
        match self {
            CaptureEvent::Started { kind } => format!("{}-start", kind.prefix()),
            CaptureEvent::Progress(_) => "fullpage-capture-progress".to_string(),
            CaptureEvent::Completed { kind, .. } => format!("{}-success", kind.prefix()),
            CaptureEvent::Failed { kind, .. } => format!("{}-error", kind.prefix()),
        }
    }
}

/// Receives capture lifecycle events.
pub trait CaptureObserver {
    fn on_event(&self, event: &CaptureEvent);
}

/// Adapts a closure into an observer.
pub struct FnObserver<F>(pub F);

impl<F> CaptureObserver for FnObserver<F>
where
    F: Fn(&CaptureEvent),
{
    fn on_event(&self, event: &CaptureEvent) {
        (self.0)(event)
    }
}

/// Forwards events into a channel; a dropped receiver is ignored.
impl CaptureObserver for mpsc::Sender<CaptureEvent> {
    fn on_event(&self, event: &CaptureEvent) {
        let _ = self.send(event.clone());
    }
}

impl CaptureObserver for tokio::sync::mpsc::UnboundedSender<CaptureEvent> {
    fn on_event(&self, event: &CaptureEvent) {
        let _ = self.send(event.clone());
    }
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl CaptureObserver for NoopObserver {
    fn on_event(&self, _event: &CaptureEvent) {}
}

/// Writes events to the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl CaptureObserver for LogObserver {
    fn on_event(&self, event: &CaptureEvent) {
        match event {
            CaptureEvent::Started { kind } => debug!("{:?} capture started", kind),
            CaptureEvent::Progress(p) => debug!("Capture {}/{} ({}%)", p.current, p.total, p.percent),
            CaptureEvent::Completed { kind, width, height, tiles } => {
                info!("{:?} capture finished: {}x{} from {} tile(s)", kind, width, height, tiles)
            }
            CaptureEvent::Failed { kind, message } => warn!("{:?} capture failed: {}", kind, message),
        }
    }
}

/// Observer whose events can be consumed as a finite sequence.
///
/// The sequence ends once the observer (and every clone of it) is dropped,
/// typically together with the stitcher that owns it.
pub fn channel() -> (mpsc::Sender<CaptureEvent>, mpsc::Receiver<CaptureEvent>) {
    mpsc::channel()
}

/// Deliver `event`, swallowing anything the observer does wrong.
pub(crate) fn notify(observer: &dyn CaptureObserver, event: CaptureEvent) {
    let delivered = catch_unwind(AssertUnwindSafe(|| observer.on_event(&event)));
    if delivered.is_err() {
        warn!("Capture observer panicked while handling {}", event.name());
    }
}
