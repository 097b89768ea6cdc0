//! Pipeline stages for turning PDFs into annotation tasks.
//!
//! Each submodule implements exactly one transformation step, so each is
//! testable on its own and the external engines (PDF renderer, OCR, layout
//! and entity models) can be swapped behind their traits.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode                          (page previews)
//!             │
//!             └──▶ region ──▶ ocr ──▶ postprocess       (transcripts)
//!
//! layout ──▶ tokens ──▶ entities                      (span annotation)
//! ```
//!
//! 1. [`input`]: discover documents in a directory; read JSONL task files
//! 2. [`render`]: open documents and rasterise pages at an integer scale
//! 3. [`encode`]: JPEG data URIs for previews, PNG bytes for OCR
//! 4. [`region`]: map page-unit rectangles to pixel crops of a scaled render
//! 5. [`ocr`]: recognise text in a crop
//! 6. [`postprocess`]: clean OCR output and fold hyphenated line breaks
//! 7. [`layout`]: pages of labelled spans from a layout model
//! 8. [`tokens`]: offset-exact token streams with display hints
//! 9. [`entities`]: entity predictions aligned to tokens as span suggestions

pub mod encode;
pub mod entities;
pub mod input;
pub mod layout;
pub mod ocr;
pub mod postprocess;
pub mod region;
pub mod render;
pub mod tokens;
