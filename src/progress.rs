//! Progress-callback trait for batch, group and per-file conversion events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as the scheduler works through a batch. The CLI drives its progress
//! bar and its per-group "converted" acknowledgments from these events.
//!
//! # Example
//!
//! ```rust
//! use edgequake_any2pdf::{BatchProgressCallback, ConversionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     converted: AtomicUsize,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_file_complete(&self, index: usize, total: usize, file_name: &str) {
//!         self.converted.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("[{}/{}] {}", index + 1, total, file_name);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { converted: AtomicUsize::new(0) });
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(counter as Arc<dyn BatchProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the batch scheduler as it processes each group and file.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
///
/// # Thread safety
///
/// The files of one group convert concurrently, so `on_file_start`,
/// `on_file_complete` and `on_file_error` may interleave. Group and batch
/// events are never concurrent with each other.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once, after the batch passed its size check.
    fn on_batch_start(&self, total_files: usize, total_groups: usize) {
        let _ = (total_files, total_groups);
    }

    /// Called before the conversions of a group start.
    ///
    /// # Arguments
    /// * `group`: 0-indexed group number
    /// * `files`: names of the files in this group, in submission order
    fn on_group_start(&self, group: usize, files: &[String]) {
        let _ = (group, files);
    }

    /// Called when a file's conversion starts. `index` is its 0-indexed
    /// position in the batch.
    fn on_file_start(&self, index: usize, total: usize, file_name: &str) {
        let _ = (index, total, file_name);
    }

    /// Called when a file converted successfully.
    fn on_file_complete(&self, index: usize, total: usize, file_name: &str) {
        let _ = (index, total, file_name);
    }

    /// Called when a file failed. `error` is already scoped to the file name.
    fn on_file_error(&self, index: usize, total: usize, error: &str) {
        let _ = (index, total, error);
    }

    /// Called once a group's successful documents were handed to delivery.
    ///
    /// This is the per-group success acknowledgment; it is not called for a
    /// group that produced no document.
    fn on_group_delivered(&self, group: usize, delivered: usize) {
        let _ = (group, delivered);
    }

    /// Called once after every file was attempted and delivery went idle.
    fn on_batch_complete(&self, total_files: usize, success_count: usize) {
        let _ = (total_files, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
