//! Progress-callback trait for per-stage pipeline events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::DdrConfigBuilder::progress_callback`] to receive events as
//! the pipeline moves through extraction, synthesis and formatting.
//!
//! Callers can forward events to a channel, a terminal spinner or a log
//! without the library knowing how the host application communicates.
//!
//! # Example
//!
//! ```rust
//! use edgequake_ddr::{DdrConfig, PipelineProgressCallback, Stage};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl PipelineProgressCallback for CountingCallback {
//!     fn on_stage_complete(&self, stage: Stage, elapsed_ms: u64) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{stage} done in {elapsed_ms}ms");
//!     }
//! }
//!
//! let config = DdrConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { completed: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::error::Stage;
use std::sync::Arc;

/// Called by the pipeline at stage boundaries.
///
/// All methods have no-op defaults. The two extraction stages run
/// concurrently by default, so their events may interleave and arrive from
/// different tasks; protect shared state accordingly.
pub trait PipelineProgressCallback: Send + Sync {
    /// Called once, before either source document is read.
    fn on_run_start(&self) {}

    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    fn on_stage_complete(&self, stage: Stage, elapsed_ms: u64) {
        let _ = (stage, elapsed_ms);
    }

    /// Called when `stage` fails; the run ends right after.
    fn on_stage_error(&self, stage: Stage, error: &str) {
        let _ = (stage, error);
    }

    /// Called once at the end of the run.
    fn on_run_complete(&self, success: bool) {
        let _ = success;
    }
}

/// A no-op implementation; the default when no callback is configured.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::DdrConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;
