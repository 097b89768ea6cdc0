//! OCR engine seam: image in, raw text out.
//!
//! The engine is a black box. The only implementation shipped here shells
//! out to the `tesseract` executable; tests substitute their own
//! [`OcrEngine`].

use crate::pipeline::encode::encode_png;
use image::DynamicImage;
use std::io::Write;
use std::process::Command;
use thiserror::Error;
use tracing::debug;

/// Errors raised by an OCR engine.
#[derive(Debug, Clone, Error)]
pub enum OcrError {
    #[error("OCR engine unavailable: {0}")]
    Unavailable(String),

    #[error("OCR processing failed: {0}")]
    Processing(String),
}

/// Recognise the text in an image.
///
/// Output is the engine's raw text, one line per recognised text line.
pub trait OcrEngine {
    fn recognize(&self, image: &DynamicImage) -> Result<String, OcrError>;
}

/// Tesseract via its command-line interface.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    binary: String,
    language: Option<String>,
}

impl Default for TesseractCli {
    fn default() -> Self {
        Self {
            binary: "tesseract".to_string(),
            language: None,
        }
    }
}

impl TesseractCli {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific executable instead of `tesseract` on `PATH`.
    pub fn binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Tesseract language code(s), e.g. `"eng"` or `"deu+eng"`.
    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Check that the executable runs.
    pub fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}

impl OcrEngine for TesseractCli {
    fn recognize(&self, image: &DynamicImage) -> Result<String, OcrError> {
        let png = encode_png(image).map_err(|e| OcrError::Processing(e.to_string()))?;

        let mut input = tempfile::Builder::new()
            .prefix("pdf-annotate-ocr-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| OcrError::Processing(format!("Failed to create temp file: {}", e)))?;
        input
            .write_all(&png)
            .map_err(|e| OcrError::Processing(format!("Failed to write temp file: {}", e)))?;

        let mut cmd = Command::new(&self.binary);
        cmd.arg(input.path()).arg("stdout");
        if let Some(ref lang) = self.language {
            cmd.arg("-l").arg(lang);
        }

        let output = cmd
            .output()
            .map_err(|e| OcrError::Unavailable(format!("Failed to run {}: {}", self.binary, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::Processing(format!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!(
            "OCR {}x{} crop → {} chars",
            image.width(),
            image.height(),
            text.len()
        );
        Ok(text)
    }
}
