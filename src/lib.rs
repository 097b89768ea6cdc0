//! # pdf-annotate
//!
//! Annotation task streams for PDFs: page images to draw boxes on, OCR
//! transcripts of those boxes to correct, and layout-aware page text to
//! label spans in.
//!
//! The crate shapes data for human review. Rendering, OCR and layout
//! analysis are external engines behind narrow traits
//! ([`DocumentBackend`], [`OcrEngine`], [`LayoutModel`], [`EntityModel`]).
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF directory
//!  │
//!  ├─ image_manual   render pages at scale 1 → page_image tasks
//!  │                    │  (annotator draws regions)
//!  │                    ▼
//!  ├─ ocr_correct    render at scale s, crop regions × s, OCR, fold dashes
//!  │                    → region_correction tasks
//!  │
//!  ├─ layout_fetch   layout model → pages → spans → tokens → JSONL
//!  └─ spans_manual   same stream (or the fetched JSONL) for span labelling,
//!                    optionally with entity suggestions
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf_annotate::{image_manual, AnnotationConfig, LabelSet, PdfiumBackend};
//! use std::path::Path;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = PdfiumBackend::bind()?;
//!     let config = AnnotationConfig::builder()
//!         .labels("TITLE,TEXT".parse::<LabelSet>()?)
//!         .build()?;
//!     let recipe = image_manual("boxes", Path::new("pdfs/"), &backend, &config)?;
//!     for task in recipe.stream {
//!         match task {
//!             Ok(t) => println!("{}", serde_json::to_string(&t)?),
//!             Err(e) => eprintln!("skipped: {e}"),
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf-annotate` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! ```toml
//! pdf-annotate = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod recipes;
pub mod stream;
pub mod task;
pub mod theme;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{AnnotationConfig, AnnotationConfigBuilder, LabelSet, Scale};
pub use error::{AnnotateError, TaskError};
pub use pipeline::entities::{EntityError, EntityModel, EntityPrediction, PatternEntities};
pub use pipeline::layout::{LayoutModel, LayoutRole, SidecarLayout, TextLayerLayout};
pub use pipeline::ocr::{OcrEngine, OcrError, TesseractCli};
pub use pipeline::render::{DocumentBackend, PageSource, PdfiumBackend};
pub use progress::{NoopProgressCallback, ProgressCallback, StreamProgressCallback};
pub use recipes::{
    image_manual, layout_fetch, ocr_correct, spans_manual, write_jsonl, write_jsonl_file, Recipe,
    WriteSummary,
};
pub use stream::TaskStream;
pub use task::{Answer, Task, TaskMeta, TaskPayload};
