//! Progress-callback trait for per-file batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::BatchConfigBuilder::progress_callback`] to receive events
//! as the pipeline works through each uploaded file. The CLI uses it to drive
//! a terminal progress bar; a server could forward the same events to a
//! websocket or a job table.
//!
//! # Example
//!
//! ```rust
//! use edgequake_docconv::{BatchConfig, BatchProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_file_complete(&self, index: usize, total: usize, output_name: &str) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{}/{} -> {}", index, total, output_name);
//!     }
//! }
//!
//! let config = BatchConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { completed: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the batch pipeline as it processes each file.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Files are processed one at a time within a batch,
/// but several batches may share one callback, so implementations must be
/// `Send + Sync`.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once before the first file is staged.
    ///
    /// # Arguments
    /// * `total_files` — number of files in the batch
    fn on_batch_start(&self, total_files: usize) {
        let _ = total_files;
    }

    /// Called just before a file is staged and routed.
    ///
    /// # Arguments
    /// * `index`    — 1-indexed position in upload order
    /// * `total`    — number of files in the batch
    /// * `filename` — sanitized name of the file
    fn on_file_start(&self, index: usize, total: usize, filename: &str) {
        let _ = (index, total, filename);
    }

    /// Called when a file was converted or copied into the output set.
    ///
    /// # Arguments
    /// * `index`       — 1-indexed position in upload order
    /// * `total`       — number of files in the batch
    /// * `output_name` — file name of the produced output
    fn on_file_complete(&self, index: usize, total: usize, output_name: &str) {
        let _ = (index, total, output_name);
    }

    /// Called when a file failed to convert.
    ///
    /// # Arguments
    /// * `index` — 1-indexed position in upload order
    /// * `total` — number of files in the batch
    /// * `error` — human-readable error description
    fn on_file_error(&self, index: usize, total: usize, error: &str) {
        let _ = (index, total, error);
    }

    /// Called once after the last file was attempted (or the batch aborted).
    ///
    /// # Arguments
    /// * `total_files`   — number of files in the batch
    /// * `success_count` — files that produced an output
    fn on_batch_complete(&self, total_files: usize, success_count: usize) {
        let _ = (total_files, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::BatchConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
