//! Progress-callback trait for per-job pipeline events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as a job moves through its stages and as each page is rendered and
//! uploaded. The CLI drives its progress bar from these; the HTTP server
//! leaves it unset.
//!
//! # Example
//!
//! ```rust
//! use edgequake_doc2img::{PipelineConfig, PipelineProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     uploaded: AtomicUsize,
//! }
//!
//! impl PipelineProgressCallback for CountingCallback {
//!     fn on_page_published(&self, index: usize, total: usize, key: &str) {
//!         self.uploaded.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("page {}/{} → {}", index + 1, total, key);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { uploaded: AtomicUsize::new(0) });
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(counter as Arc<dyn PipelineProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::job::{JobId, JobState};
use std::sync::Arc;

/// Called by the pipeline as it processes a job.
///
/// Implementations must be `Send + Sync`: one pipeline serves concurrent
/// jobs, and all of them share the configured callback. Every method has a
/// no-op default.
pub trait PipelineProgressCallback: Send + Sync {
    /// A job was received and assigned an id.
    fn on_job_start(&self, job_id: JobId, filename: &str) {
        let _ = (job_id, filename);
    }

    /// The job entered a new state (including `Done` and `Failed`).
    fn on_stage(&self, job_id: JobId, state: JobState) {
        let _ = (job_id, state);
    }

    /// A page image was written to the temp store.
    ///
    /// # Arguments
    /// * `index` — 0-based page index
    /// * `total` — total pages in the document
    fn on_page_rendered(&self, index: usize, total: usize) {
        let _ = (index, total);
    }

    /// A page image was uploaded.
    fn on_page_published(&self, index: usize, total: usize, key: &str) {
        let _ = (index, total, key);
    }

    /// The job reached a terminal state.
    ///
    /// # Arguments
    /// * `published` — number of assets in storage for this job (on failure,
    ///   the pages uploaded before the failing one)
    /// * `error`     — `None` on success
    fn on_job_complete(&self, job_id: JobId, published: usize, error: Option<&str>) {
        let _ = (job_id, published, error);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;
