//! PDF rasterisation: open documents and render pages to `DynamicImage`.
//!
//! The rendering engine sits behind two traits so the streams never touch
//! pdfium directly:
//!
//! * [`DocumentBackend`] opens a file and hands back an owned
//!   [`PageSource`]. Dropping the source closes the document, so a stream
//!   that stops early still releases the native handle.
//! * [`PageSource`] answers page count, page size, renders and the embedded
//!   text layer.
//!
//! ## Pixel sizes
//!
//! A page rendered at scale `s` is exactly
//! `pixel_extent(width, s) × pixel_extent(height, s)` pixels. The region
//! mapper uses the same function for crop boxes, so boxes drawn on a scale-1
//! preview line up with a scale-`s` OCR render.

use crate::config::Scale;
use crate::error::{AnnotateError, TaskError};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Native page size in page units (PDF points).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

impl PageSize {
    /// Pixel dimensions of this page rendered at `scale`.
    pub fn pixels(&self, scale: Scale) -> (u32, u32) {
        (
            pixel_extent(self.width, scale),
            pixel_extent(self.height, scale),
        )
    }
}

/// Convert a page-unit length or coordinate to pixels at `scale`.
///
/// Rounds to the nearest pixel. Shared by rendering and cropping.
pub fn pixel_extent(value: f64, scale: Scale) -> u32 {
    let px = (value * scale.factor()).round();
    if px <= 0.0 {
        0
    } else if px >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        px as u32
    }
}

/// An open document. Dropping it closes the document.
pub trait PageSource {
    /// The file this document was opened from.
    fn path(&self) -> &Path;

    fn page_count(&self) -> usize;

    /// Native size of a 0-based page.
    fn page_size(&self, index: usize) -> Result<PageSize, TaskError>;

    /// Render a 0-based page at `scale`.
    fn render(&self, index: usize, scale: Scale) -> Result<DynamicImage, TaskError>;

    /// Text of the embedded text layer of a 0-based page, in reading order.
    fn page_text(&self, index: usize) -> Result<String, TaskError>;
}

/// Opens documents for rendering.
pub trait DocumentBackend {
    fn open<'a>(&'a self, path: &Path) -> Result<Box<dyn PageSource + 'a>, TaskError>;
}

// ── pdfium ───────────────────────────────────────────────────────────────

/// [`DocumentBackend`] backed by the pdfium library.
pub struct PdfiumBackend {
    pdfium: Pdfium,
}

impl PdfiumBackend {
    /// Bind to pdfium: the library at `PDFIUM_LIB_PATH` when set, otherwise
    /// the system library.
    pub fn bind() -> Result<Self, AnnotateError> {
        let bindings = match std::env::var("PDFIUM_LIB_PATH") {
            Ok(path) if !path.is_empty() => {
                debug!("Binding pdfium from PDFIUM_LIB_PATH={}", path);
                Pdfium::bind_to_library(&path)
            }
            _ => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| AnnotateError::PdfiumBindingFailed(format!("{:?}", e)))?;

        Ok(Self {
            pdfium: Pdfium::new(bindings),
        })
    }

    /// The bound library, for work outside [`DocumentBackend`] such as
    /// writing documents.
    pub fn pdfium(&self) -> &Pdfium {
        &self.pdfium
    }
}

impl DocumentBackend for PdfiumBackend {
    fn open<'a>(&'a self, path: &Path) -> Result<Box<dyn PageSource + 'a>, TaskError> {
        let document =
            self.pdfium
                .load_pdf_from_file(path, None)
                .map_err(|e| TaskError::DocumentLoad {
                    path: path.to_path_buf(),
                    detail: format!("{:?}", e),
                })?;

        info!(
            "PDF loaded: {} ({} pages)",
            path.display(),
            document.pages().len()
        );

        Ok(Box::new(PdfiumSource {
            path: path.to_path_buf(),
            document,
        }))
    }
}

struct PdfiumSource<'a> {
    path: PathBuf,
    document: PdfDocument<'a>,
}

impl<'a> PdfiumSource<'a> {
    fn page(&self, index: usize) -> Result<PdfPage<'a>, TaskError> {
        let total = self.page_count();
        if index >= total {
            return Err(TaskError::PageOutOfRange {
                path: self.path.clone(),
                page: index,
                total,
            });
        }

        self.document
            .pages()
            .get(index as u16)
            .map_err(|e| TaskError::RenderFailed {
                path: self.path.clone(),
                page: index,
                detail: format!("{:?}", e),
            })
    }
}

impl PageSource for PdfiumSource<'_> {
    fn path(&self) -> &Path {
        &self.path
    }

    fn page_count(&self) -> usize {
        self.document.pages().len() as usize
    }

    fn page_size(&self, index: usize) -> Result<PageSize, TaskError> {
        let page = self.page(index)?;
        Ok(PageSize {
            width: f64::from(page.width().value),
            height: f64::from(page.height().value),
        })
    }

    fn render(&self, index: usize, scale: Scale) -> Result<DynamicImage, TaskError> {
        let page = self.page(index)?;
        let size = PageSize {
            width: f64::from(page.width().value),
            height: f64::from(page.height().value),
        };
        let (width, height) = size.pixels(scale);

        let render_config = PdfRenderConfig::new().set_target_size(width as i32, height as i32);

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| TaskError::RenderFailed {
                path: self.path.clone(),
                page: index,
                detail: format!("{:?}", e),
            })?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} at {} → {}x{} px",
            index,
            scale,
            image.width(),
            image.height()
        );

        Ok(image)
    }

    fn page_text(&self, index: usize) -> Result<String, TaskError> {
        let page = self.page(index)?;
        let text = page.text().map_err(|e| TaskError::LayoutFailed {
            path: self.path.clone(),
            detail: format!("page {}: {:?}", index, e),
        })?;
        Ok(text.all())
    }
}
