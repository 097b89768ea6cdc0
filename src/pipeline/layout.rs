//! Document layout: pages → labelled spans → tokens.
//!
//! The layout model is a black box behind [`LayoutModel`]. Two
//! implementations ship here:
//!
//! * [`SidecarLayout`] reads a pre-computed `<stem>.layout.json` next to the
//!   PDF (or in a separate directory). Any external layout analyser can
//!   produce these.
//! * [`TextLayerLayout`] derives paragraph spans from the PDF's embedded
//!   text layer. It has no bounding boxes and labels everything as text.

use crate::error::TaskError;
use crate::pipeline::render::DocumentBackend;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Role of a layout span, serialised as a snake_case string.
///
/// Unknown labels survive a round trip through [`LayoutRole::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LayoutRole {
    Title,
    SectionHeader,
    PageHeader,
    PageFooter,
    Text,
    ListItem,
    Caption,
    Footnote,
    Table,
    Picture,
    Formula,
    Code,
    Other(String),
}

impl LayoutRole {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Title => "title",
            Self::SectionHeader => "section_header",
            Self::PageHeader => "page_header",
            Self::PageFooter => "page_footer",
            Self::Text => "text",
            Self::ListItem => "list_item",
            Self::Caption => "caption",
            Self::Footnote => "footnote",
            Self::Table => "table",
            Self::Picture => "picture",
            Self::Formula => "formula",
            Self::Code => "code",
            Self::Other(label) => label,
        }
    }
}

impl From<String> for LayoutRole {
    fn from(label: String) -> Self {
        match label.as_str() {
            "title" => Self::Title,
            "section_header" => Self::SectionHeader,
            "page_header" => Self::PageHeader,
            "page_footer" => Self::PageFooter,
            "text" => Self::Text,
            "list_item" => Self::ListItem,
            "caption" => Self::Caption,
            "footnote" => Self::Footnote,
            "table" => Self::Table,
            "picture" => Self::Picture,
            "formula" => Self::Formula,
            "code" => Self::Code,
            _ => Self::Other(label),
        }
    }
}

impl From<LayoutRole> for String {
    fn from(role: LayoutRole) -> Self {
        match role {
            LayoutRole::Other(label) => label,
            known => known.as_str().to_string(),
        }
    }
}

impl FromStr for LayoutRole {
    type Err = std::convert::Infallible;

    /// Case-insensitive; spaces and dashes read as underscores.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalised = s.trim().to_lowercase().replace([' ', '-'], "_");
        Ok(Self::from(normalised))
    }
}

impl fmt::Display for LayoutRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Box in page units, origin top-left, at scale 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// One token as produced by the layout model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutToken {
    pub text: String,
    /// Followed by a single space in the reconstructed text.
    #[serde(default = "default_ws")]
    pub ws: bool,
}

fn default_ws() -> bool {
    true
}

impl LayoutToken {
    pub fn new(text: impl Into<String>, ws: bool) -> Self {
        Self {
            text: text.into(),
            ws,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutSpan {
    pub label: LayoutRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
    pub tokens: Vec<LayoutToken>,
}

impl LayoutSpan {
    /// Span from whitespace-separated words.
    pub fn from_words(label: LayoutRole, text: &str) -> Self {
        Self {
            label,
            bbox: None,
            tokens: text
                .split_whitespace()
                .map(|w| LayoutToken::new(w, true))
                .collect(),
        }
    }

    pub fn with_bbox(mut self, bbox: BoundingBox) -> Self {
        self.bbox = Some(bbox);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.iter().all(|t| t.text.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutPage {
    /// 1-based page number.
    pub page_no: usize,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub spans: Vec<LayoutSpan>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutDocument {
    pub pages: Vec<LayoutPage>,
}

/// Analyse a document into pages of labelled spans.
pub trait LayoutModel {
    fn analyze(&self, path: &Path) -> Result<LayoutDocument, TaskError>;
}

// ── Sidecar JSON ─────────────────────────────────────────────────────────

/// Reads `<stem>.layout.json` produced by an external layout analyser.
#[derive(Debug, Clone, Default)]
pub struct SidecarLayout {
    dir: Option<PathBuf>,
}

impl SidecarLayout {
    /// Look for sidecars next to each PDF.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look for sidecars in `dir` instead.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }

    pub fn sidecar_path(&self, path: &Path) -> PathBuf {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = format!("{stem}.layout.json");
        match &self.dir {
            Some(dir) => dir.join(name),
            None => path.with_file_name(name),
        }
    }
}

impl LayoutModel for SidecarLayout {
    fn analyze(&self, path: &Path) -> Result<LayoutDocument, TaskError> {
        let sidecar = self.sidecar_path(path);
        let raw = std::fs::read_to_string(&sidecar).map_err(|e| TaskError::LayoutFailed {
            path: path.to_path_buf(),
            detail: format!("cannot read {}: {}", sidecar.display(), e),
        })?;
        let doc: LayoutDocument =
            serde_json::from_str(&raw).map_err(|e| TaskError::LayoutFailed {
                path: path.to_path_buf(),
                detail: format!("invalid layout JSON in {}: {}", sidecar.display(), e),
            })?;
        debug!("Layout sidecar {} → {} pages", sidecar.display(), doc.pages.len());
        Ok(doc)
    }
}

// ── Embedded text layer ──────────────────────────────────────────────────

/// Paragraph spans from the PDF text layer. Paragraphs are separated by
/// blank lines; every span is labelled [`LayoutRole::Text`].
pub struct TextLayerLayout<'b> {
    backend: &'b dyn DocumentBackend,
}

impl<'b> TextLayerLayout<'b> {
    pub fn new(backend: &'b dyn DocumentBackend) -> Self {
        Self { backend }
    }
}

impl LayoutModel for TextLayerLayout<'_> {
    fn analyze(&self, path: &Path) -> Result<LayoutDocument, TaskError> {
        let source = self.backend.open(path)?;
        let mut pages = Vec::with_capacity(source.page_count());
        for index in 0..source.page_count() {
            let size = source.page_size(index)?;
            let text = source.page_text(index)?;
            pages.push(LayoutPage {
                page_no: index + 1,
                width: size.width,
                height: size.height,
                spans: paragraphs(&text),
            });
        }
        Ok(LayoutDocument { pages })
    }
}

fn paragraphs(text: &str) -> Vec<LayoutSpan> {
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut spans = Vec::new();
    let mut current = String::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                spans.push(LayoutSpan::from_words(LayoutRole::Text, &current));
                current.clear();
            }
        } else {
            current.push_str(line);
            current.push('\n');
        }
    }
    if !current.is_empty() {
        spans.push(LayoutSpan::from_words(LayoutRole::Text, &current));
    }
    spans.retain(|s| !s.is_empty());
    spans
}
