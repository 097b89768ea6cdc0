//! Error types for the pdf-annotate library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`AnnotateError`] is **fatal**: the recipe cannot start at all (source
//!   directory missing, no matching files, pdfium not available, bad
//!   configuration). Returned as `Err(AnnotateError)` from the recipe
//!   constructors before any task is produced.
//!
//! * [`TaskError`] is **non-fatal**: one file, page, record or region failed
//!   but the rest of the stream is fine. Yielded as an `Err` item inside a
//!   [`crate::stream::TaskStream`] so the consumer can log it and keep
//!   pulling tasks.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pdf-annotate library.
///
/// Per-task failures use [`TaskError`] and travel inside the task stream
/// rather than being propagated here.
#[derive(Debug, Error)]
pub enum AnnotateError {
    // ── Source errors ─────────────────────────────────────────────────────
    /// The source directory does not exist.
    #[error("Folder '{path}' does not exist.")]
    DirectoryNotFound { path: PathBuf },

    /// The source path exists but is a file, not a directory.
    #[error("Can't load from '{path}': not a directory.")]
    NotADirectory { path: PathBuf },

    /// The directory exists but holds no file with a supported extension.
    #[error("Did not find any {extensions} files in folder '{path}'.")]
    NoFilesFound { path: PathBuf, extensions: String },

    /// A JSONL task source does not exist.
    #[error("Task source '{path}' not found.\nPass a .jsonl file produced by an earlier recipe run.")]
    SourceNotFound { path: PathBuf },

    /// A JSONL task source exists but could not be opened.
    #[error("Failed to read task source '{path}': {source}")]
    SourceReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The source or output names an external datastore collection.
    #[error("'{target}' refers to a datastore collection; only local .jsonl files are supported")]
    UnsupportedTarget { target: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Install libpdfium system-wide or set PDFIUM_LIB_PATH=/path/to/libpdfium.\n\
Pre-built libraries: https://github.com/bblanchon/pdfium-binaries/releases\n"
    )]
    PdfiumBindingFailed(String),
}

/// A non-fatal error for a single file, page, record or region.
///
/// Yielded inside the task stream. The stream continues with the next
/// file or record after one of these.
#[derive(Debug, Clone, Error)]
pub enum TaskError {
    /// The document could not be opened or parsed.
    #[error("Failed to load document '{path}': {detail}")]
    DocumentLoad { path: PathBuf, detail: String },

    /// A page index beyond the document's page count was requested.
    #[error("Page {page} of '{path}' is out of range (document has {total} pages)")]
    PageOutOfRange {
        path: PathBuf,
        page: usize,
        total: usize,
    },

    /// The rendering engine failed on a page.
    #[error("Rendering page {page} of '{path}' failed: {detail}")]
    RenderFailed {
        path: PathBuf,
        page: usize,
        detail: String,
    },

    /// A rendered or cropped image could not be encoded.
    #[error("Image encoding failed for page {page} of '{path}': {detail}")]
    EncodeFailed {
        path: PathBuf,
        page: usize,
        detail: String,
    },

    /// A region does not fit inside the rendered page image.
    #[error("Region '{region}' on page {page} of '{path}': {detail}")]
    Coordinate {
        path: PathBuf,
        page: usize,
        region: String,
        detail: String,
    },

    /// A consumed record lacks a field a recipe needs, or the field does not
    /// have the expected shape.
    #[error(
        "Record on line {line} has a missing or invalid `{field}`: {detail}\n\
Was this data annotated with the image.manual recipe?"
    )]
    Schema {
        line: usize,
        field: &'static str,
        detail: String,
    },

    /// A line of a JSONL source is not a valid record.
    #[error("Malformed record on line {line}: {detail}")]
    MalformedRecord { line: usize, detail: String },

    /// The OCR engine failed on a region crop.
    #[error("OCR failed for region '{region}' on page {page} of '{path}': {detail}")]
    OcrFailed {
        path: PathBuf,
        page: usize,
        region: String,
        detail: String,
    },

    /// The layout model could not analyse the document.
    #[error("Layout analysis failed for '{path}': {detail}")]
    LayoutFailed { path: PathBuf, detail: String },

    /// The entity model failed on a task's text.
    #[error("Entity suggestions failed for '{path}': {detail}")]
    EntitiesFailed { path: PathBuf, detail: String },
}
