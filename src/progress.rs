//! Progress observers for batch and per-file processing events.
//!
//! Inject an [`Arc<dyn ProgressObserver>`] into
//! [`crate::batch::process_batch`] to receive events as files are processed.
//! All trait methods default to no-ops so implementors only override what
//! they care about.
//!
//! Within one file, the fraction handed to [`ProgressObserver::on_progress`]
//! is clamped to `[0, 1]` and never decreases; [`ProgressReporter`] enforces
//! this before any observer sees the value.
//!
//! # Example
//!
//! ```rust
//! use mineru_pdf2md::ProgressObserver;
//! use std::sync::Mutex;
//!
//! #[derive(Default)]
//! struct LastMessage(Mutex<String>);
//!
//! impl ProgressObserver for LastMessage {
//!     fn on_progress(&self, _fraction: f32, message: &str) {
//!         *self.0.lock().unwrap() = message.to_string();
//!     }
//! }
//! ```

use crate::output::ProcessingResult;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Receives processing events.
///
/// Callbacks run synchronously on the thread doing the work. During basic
/// extraction that is a blocking pool thread, hence `Send + Sync`.
pub trait ProgressObserver: Send + Sync {
    /// Called once per batch before the first file.
    ///
    /// # Arguments
    /// * `total_files`: number of files in the batch
    fn on_batch_start(&self, total_files: usize) {
        let _ = total_files;
    }

    /// Called before a file is processed.
    ///
    /// # Arguments
    /// * `index`: 1-indexed position in the batch
    /// * `total`: number of files in the batch
    /// * `file_name`: original upload name
    fn on_file_start(&self, index: usize, total: usize, file_name: &str) {
        let _ = (index, total, file_name);
    }

    /// Called at each processing milestone of the current file.
    ///
    /// # Arguments
    /// * `fraction`: completion of the current file in `[0, 1]`
    /// * `message`: human-readable status
    fn on_progress(&self, fraction: f32, message: &str) {
        let _ = (fraction, message);
    }

    /// Called after a file finished, successfully or not.
    fn on_file_complete(&self, index: usize, total: usize, result: &ProcessingResult) {
        let _ = (index, total, result);
    }

    /// Called once after every file has been attempted.
    fn on_batch_complete(&self, succeeded: usize, failed: usize) {
        let _ = (succeeded, failed);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgress;

impl ProgressObserver for NoopProgress {}

/// Convenience alias for the shared observer type.
pub type SharedObserver = Arc<dyn ProgressObserver>;

/// One progress event, as delivered by [`ChannelObserver`].
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    BatchStarted { total_files: usize },
    FileStarted { index: usize, total: usize, file_name: String },
    Progress { fraction: f32, message: String },
    FileCompleted { index: usize, total: usize, success: bool },
    BatchCompleted { succeeded: usize, failed: usize },
}

/// Forwards every event into a Tokio channel.
///
/// Useful for async front ends (web sockets, SSE) and for tests that want to
/// assert on the exact event sequence.
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelObserver {
    /// Create the observer together with the receiving end of its channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: ProgressEvent) {
        // A dropped receiver just means nobody is listening any more.
        let _ = self.tx.send(event);
    }
}

impl ProgressObserver for ChannelObserver {
    fn on_batch_start(&self, total_files: usize) {
        self.send(ProgressEvent::BatchStarted { total_files });
    }

    fn on_file_start(&self, index: usize, total: usize, file_name: &str) {
        self.send(ProgressEvent::FileStarted {
            index,
            total,
            file_name: file_name.to_string(),
        });
    }

    fn on_progress(&self, fraction: f32, message: &str) {
        self.send(ProgressEvent::Progress {
            fraction,
            message: message.to_string(),
        });
    }

    fn on_file_complete(&self, index: usize, total: usize, result: &ProcessingResult) {
        self.send(ProgressEvent::FileCompleted {
            index,
            total,
            success: result.success,
        });
    }

    fn on_batch_complete(&self, succeeded: usize, failed: usize) {
        self.send(ProgressEvent::BatchCompleted { succeeded, failed });
    }
}

/// Per-file progress handle passed down the processing branches.
///
/// Clamps every fraction to `[0, 1]` and holds it at the highest value seen
/// so far, so observers never see progress move backwards.
#[derive(Clone)]
pub struct ProgressReporter {
    observer: SharedObserver,
    high_water: Arc<Mutex<f32>>,
}

impl ProgressReporter {
    pub fn new(observer: SharedObserver) -> Self {
        Self {
            observer,
            high_water: Arc::new(Mutex::new(0.0)),
        }
    }

    /// A reporter that discards everything.
    pub fn silent() -> Self {
        Self::new(Arc::new(NoopProgress))
    }

    /// Report a milestone for the current file.
    pub fn report(&self, fraction: f32, message: impl AsRef<str>) {
        let fraction = if fraction.is_nan() {
            0.0
        } else {
            fraction.clamp(0.0, 1.0)
        };
        let effective = {
            let mut hw = self
                .high_water
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if fraction > *hw {
                *hw = fraction;
            }
            *hw
        };
        self.observer.on_progress(effective, message.as_ref());
    }

    /// Force progress to 1.0 with a failure message.
    pub fn fail(&self, message: impl AsRef<str>) {
        self.report(1.0, message);
    }

    /// Highest fraction reported so far.
    pub fn current(&self) -> f32 {
        *self
            .high_water
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
