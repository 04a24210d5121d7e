//! Progress events and cooperative cancellation for one conversion run.
//!
//! A [`RunContext`] is passed explicitly into every orchestration entry point.
//! It holds the progress sink (one subscriber at a time, last registration
//! wins) and a [`CancelFlag`] that adapters poll at chunk and retry
//! boundaries.
//!
//! # Why an explicit context?
//!
//! Two runs in the same process each get their own sink and flag, and tests
//! can build a context without touching any global. Hosts that want a single
//! process-wide context simply keep one in an `Arc`.
//!
//! # Example
//!
//! ```rust
//! use pdf2md_notes::{ProgressEvent, ProgressSink, RunContext};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl ProgressSink for Printer {
//!     fn on_event(&self, event: &ProgressEvent) {
//!         eprintln!("{}", event.message);
//!     }
//! }
//!
//! let ctx = RunContext::new();
//! ctx.set_reporter(Arc::new(Printer));
//! // ... run a conversion ...
//! ctx.clear_reporter();
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::Pdf2MdError;

/// Which kind of progress an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressPhase {
    /// One chunk of a multi-chunk request; `current`/`total` are set.
    Chunk,
    /// A pipeline stage transition.
    Status,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub phase: ProgressPhase,
    pub message: String,
    pub current: Option<usize>,
    pub total: Option<usize>,
}

impl ProgressEvent {
    pub fn status(message: impl Into<String>) -> Self {
        Self {
            phase: ProgressPhase::Status,
            message: message.into(),
            current: None,
            total: None,
        }
    }

    /// `current` is 1-indexed.
    pub fn chunk(current: usize, total: usize, message: impl Into<String>) -> Self {
        Self {
            phase: ProgressPhase::Chunk,
            message: message.into(),
            current: Some(current),
            total: Some(total),
        }
    }
}

/// Receives progress events.
///
/// Implementations must be `Send + Sync`. The default method is a no-op so a
/// sink that only cares about one phase can match on it and ignore the rest.
pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: &ProgressEvent) {
        let _ = event;
    }
}

/// A sink that drops every event.
pub struct NoopProgressSink;

impl ProgressSink for NoopProgressSink {}

/// Shared, clearable cancellation flag.
///
/// Cloning shares the flag. Setting it never interrupts an in-flight HTTP
/// call; the next checkpoint observes it.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-run progress sink and cancellation token.
#[derive(Default)]
pub struct RunContext {
    reporter: Mutex<Option<Arc<dyn ProgressSink>>>,
    cancel: CancelFlag,
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("has_reporter", &self.has_reporter())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context sharing an existing flag, e.g. one wired to Ctrl-C.
    pub fn with_cancel_flag(cancel: CancelFlag) -> Self {
        Self {
            reporter: Mutex::new(None),
            cancel,
        }
    }

    /// Replace the current subscriber.
    pub fn set_reporter(&self, sink: Arc<dyn ProgressSink>) {
        if let Ok(mut slot) = self.reporter.lock() {
            *slot = Some(sink);
        }
    }

    /// Detach the subscriber. Call when the consuming view goes away.
    pub fn clear_reporter(&self) {
        if let Ok(mut slot) = self.reporter.lock() {
            *slot = None;
        }
    }

    pub fn has_reporter(&self) -> bool {
        self.reporter.lock().map(|s| s.is_some()).unwrap_or(false)
    }

    /// Emit an event to the current subscriber, if any.
    pub fn report(&self, event: ProgressEvent) {
        // Clone out of the lock so a sink may re-register without deadlocking.
        let sink = self.reporter.lock().ok().and_then(|s| s.clone());
        if let Some(sink) = sink {
            sink.on_event(&event);
        }
    }

    pub fn status(&self, message: impl Into<String>) {
        self.report(ProgressEvent::status(message));
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn reset_cancel(&self) {
        self.cancel.reset();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Checkpoint: `Err(Cancelled)` with no partial output when the flag is set.
    pub fn check_cancelled(&self) -> Result<(), Pdf2MdError> {
        if self.is_cancelled() {
            Err(Pdf2MdError::Cancelled {
                completed_chunks: 0,
                partial: String::new(),
            })
        } else {
            Ok(())
        }
    }
}
