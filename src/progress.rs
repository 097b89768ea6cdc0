//! Progress-callback trait for per-file stream events.
//!
//! Inject an [`Arc<dyn StreamProgressCallback>`] via
//! [`crate::config::AnnotationConfigBuilder::progress_callback`] to receive
//! events as a task stream opens files and produces tasks.
//!
//! The streams are pulled lazily, so events fire from inside
//! `Iterator::next` on the consumer's thread.
//!
//! # Example
//!
//! ```rust
//! use pdf_annotate::{AnnotationConfig, StreamProgressCallback};
//! use std::path::Path;
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     files: AtomicUsize,
//! }
//!
//! impl StreamProgressCallback for CountingCallback {
//!     fn on_file_complete(&self, path: &Path, tasks: usize) {
//!         let done = self.files.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("{done}: {} produced {tasks} tasks", path.display());
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { files: AtomicUsize::new(0) });
//!
//! let config = AnnotationConfig::builder()
//!     .progress_callback(counter as Arc<dyn StreamProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::error::TaskError;
use std::path::Path;
use std::sync::Arc;

/// Called by the task streams as they move through their input.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait StreamProgressCallback: Send + Sync {
    /// Called once, before the first file is opened.
    ///
    /// Streams over a JSONL source count records instead of files.
    ///
    /// # Arguments
    /// * `total_files`: number of files the stream will visit
    fn on_stream_start(&self, total_files: usize) {
        let _ = total_files;
    }

    /// Called when a file is about to be opened.
    ///
    /// # Arguments
    /// * `path`: the file
    /// * `index`: 0-based position in the stream's file list
    /// * `total_files`: length of that list
    fn on_file_start(&self, path: &Path, index: usize, total_files: usize) {
        let _ = (path, index, total_files);
    }

    /// Called after the file's document has been closed.
    ///
    /// # Arguments
    /// * `path`: the file
    /// * `tasks`: tasks produced from it (errors excluded)
    fn on_file_complete(&self, path: &Path, tasks: usize) {
        let _ = (path, tasks);
    }

    /// Called for every non-fatal error the stream yields.
    fn on_task_error(&self, error: &TaskError) {
        let _ = error;
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl StreamProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::AnnotationConfig`].
pub type ProgressCallback = Arc<dyn StreamProgressCallback>;
