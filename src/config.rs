//! Configuration types for the annotation recipes.
//!
//! Every recipe option is carried by [`AnnotationConfig`], built via its
//! [`AnnotationConfigBuilder`]. Each recipe reads the subset of fields it
//! needs; the rest keep their defaults.
//!
//! # Example
//! ```rust
//! use pdf_annotate::{AnnotationConfig, LabelSet};
//!
//! let config = AnnotationConfig::builder()
//!     .labels("TITLE,BODY".parse::<LabelSet>().unwrap())
//!     .scale(4)
//!     .fold_dashes(true)
//!     .build()
//!     .unwrap();
//! assert_eq!(config.scale.get(), 4);
//! ```

use crate::error::AnnotateError;
use crate::pipeline::layout::LayoutRole;
use crate::progress::ProgressCallback;
use crate::theme::{DEFAULT_PALETTE, SEPARATOR};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Configuration shared by all recipes.
#[derive(Clone)]
pub struct AnnotationConfig {
    /// Labels offered in the UI (image.manual, spans.manual) or used as a
    /// region filter (ocr.correct).
    pub labels: LabelSet,

    /// Zoom factor for OCR renders. Default: 3.
    ///
    /// Region coordinates are stored at scale 1; the same factor is applied
    /// to both the page render and the crop box.
    pub scale: Scale,

    /// Remove embedded data-URI images before tasks are stored. Default: false.
    pub remove_base64: bool,

    /// Emit one task per page instead of one task per document. Default: false.
    pub split_pages: bool,

    /// Omit the page preview image and its block. Default: false.
    pub hide_preview: bool,

    /// Fold trailing-hyphen line continuations in OCR output. Default: false.
    pub fold_dashes: bool,

    /// Autofocus the transcript input in the correction UI. Default: false.
    pub autofocus: bool,

    /// Focus mode: emit one task per span with one of these roles.
    /// Empty means full-page mode.
    pub focus: Vec<LayoutRole>,

    /// Span roles whose tokens are marked non-interactive.
    pub disable: Vec<LayoutRole>,

    /// Lower-case file extensions (without the dot) picked up from a
    /// source directory. Default: `["pdf"]`.
    pub file_extensions: Vec<String>,

    /// Separator inserted between spans of a page. Default: `"\n\n"`.
    pub separator: String,

    /// Label colors, assigned in label order and cycled.
    pub palette: Vec<String>,

    /// Per-file progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            labels: LabelSet::default(),
            scale: Scale::OCR_DEFAULT,
            remove_base64: false,
            split_pages: false,
            hide_preview: false,
            fold_dashes: false,
            autofocus: false,
            focus: Vec::new(),
            disable: Vec::new(),
            file_extensions: vec!["pdf".to_string()],
            separator: SEPARATOR.to_string(),
            palette: DEFAULT_PALETTE.iter().map(|c| c.to_string()).collect(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for AnnotationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnnotationConfig")
            .field("labels", &self.labels)
            .field("scale", &self.scale)
            .field("remove_base64", &self.remove_base64)
            .field("split_pages", &self.split_pages)
            .field("hide_preview", &self.hide_preview)
            .field("fold_dashes", &self.fold_dashes)
            .field("autofocus", &self.autofocus)
            .field("focus", &self.focus)
            .field("disable", &self.disable)
            .field("file_extensions", &self.file_extensions)
            .field("separator", &self.separator)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn StreamProgressCallback>"),
            )
            .finish()
    }
}

impl AnnotationConfig {
    /// Create a new builder for `AnnotationConfig`.
    pub fn builder() -> AnnotationConfigBuilder {
        AnnotationConfigBuilder {
            config: Self::default(),
            scale: Scale::OCR_DEFAULT.get(),
        }
    }

    /// Colors for the configured labels, keyed by label.
    pub fn label_colors(&self) -> BTreeMap<String, String> {
        self.labels.colors(&self.palette)
    }
}

/// Builder for [`AnnotationConfig`].
#[derive(Debug)]
pub struct AnnotationConfigBuilder {
    config: AnnotationConfig,
    scale: u32,
}

impl AnnotationConfigBuilder {
    pub fn labels(mut self, labels: LabelSet) -> Self {
        self.config.labels = labels;
        self
    }

    pub fn scale(mut self, scale: u32) -> Self {
        self.scale = scale;
        self
    }

    pub fn remove_base64(mut self, v: bool) -> Self {
        self.config.remove_base64 = v;
        self
    }

    pub fn split_pages(mut self, v: bool) -> Self {
        self.config.split_pages = v;
        self
    }

    pub fn hide_preview(mut self, v: bool) -> Self {
        self.config.hide_preview = v;
        self
    }

    pub fn fold_dashes(mut self, v: bool) -> Self {
        self.config.fold_dashes = v;
        self
    }

    pub fn autofocus(mut self, v: bool) -> Self {
        self.config.autofocus = v;
        self
    }

    pub fn focus(mut self, roles: impl IntoIterator<Item = LayoutRole>) -> Self {
        self.config.focus = dedup(roles);
        self
    }

    pub fn disable(mut self, roles: impl IntoIterator<Item = LayoutRole>) -> Self {
        self.config.disable = dedup(roles);
        self
    }

    pub fn file_extensions<S: AsRef<str>>(mut self, exts: impl IntoIterator<Item = S>) -> Self {
        self.config.file_extensions = exts
            .into_iter()
            .map(|e| e.as_ref().trim().trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        self
    }

    pub fn separator(mut self, sep: impl Into<String>) -> Self {
        self.config.separator = sep.into();
        self
    }

    pub fn palette<S: Into<String>>(mut self, colors: impl IntoIterator<Item = S>) -> Self {
        self.config.palette = colors.into_iter().map(Into::into).collect();
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(mut self) -> Result<AnnotationConfig, AnnotateError> {
        self.config.scale = Scale::new(self.scale)?;
        let c = &self.config;
        if c.file_extensions.is_empty() {
            return Err(AnnotateError::InvalidConfig(
                "At least one file extension is required".into(),
            ));
        }
        if c.separator.is_empty() {
            return Err(AnnotateError::InvalidConfig(
                "Span separator must not be empty".into(),
            ));
        }
        if c.palette.is_empty() {
            return Err(AnnotateError::InvalidConfig(
                "Label palette must hold at least one color".into(),
            ));
        }
        Ok(self.config)
    }
}

fn dedup(roles: impl IntoIterator<Item = LayoutRole>) -> Vec<LayoutRole> {
    let mut out: Vec<LayoutRole> = Vec::new();
    for role in roles {
        if !out.contains(&role) {
            out.push(role);
        }
    }
    out
}

// ── Scale ────────────────────────────────────────────────────────────────

/// Integer zoom factor applied on top of a page's native size.
///
/// Region coordinates are stored at scale 1, so the factor used to render a
/// page must be the one used to crop from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Scale(u32);

impl Scale {
    /// Native page size; used for previews.
    pub const ONE: Scale = Scale(1);
    /// Default for OCR renders, where small print needs the extra pixels.
    pub const OCR_DEFAULT: Scale = Scale(3);

    pub fn new(factor: u32) -> Result<Self, AnnotateError> {
        if factor == 0 {
            return Err(AnnotateError::InvalidConfig(
                "Scale must be an integer ≥ 1, got 0".into(),
            ));
        }
        Ok(Self(factor))
    }

    pub fn get(self) -> u32 {
        self.0
    }

    pub fn factor(self) -> f64 {
        f64::from(self.0)
    }
}

impl Default for Scale {
    fn default() -> Self {
        Self::ONE
    }
}

impl TryFrom<u32> for Scale {
    type Error = AnnotateError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x", self.0)
    }
}

// ── Labels ───────────────────────────────────────────────────────────────

/// Ordered, de-duplicated set of annotation labels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelSet(Vec<String>);

impl LabelSet {
    pub fn new<S: Into<String>>(labels: impl IntoIterator<Item = S>) -> Self {
        let mut out: Vec<String> = Vec::new();
        for label in labels {
            let label: String = label.into();
            let label = label.trim();
            if !label.is_empty() && !out.iter().any(|l| l == label) {
                out.push(label.to_string());
            }
        }
        Self(out)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.0.iter().any(|l| l == label)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// First label gets the first palette color; the palette cycles.
    pub fn colors(&self, palette: &[String]) -> BTreeMap<String, String> {
        if palette.is_empty() {
            return BTreeMap::new();
        }
        self.0
            .iter()
            .enumerate()
            .map(|(i, label)| (label.clone(), palette[i % palette.len()].clone()))
            .collect()
    }
}

impl FromStr for LabelSet {
    type Err = Infallible;

    /// Parse a comma-separated label list, e.g. `"foo,bar"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s.split(',')))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_set_parses_trims_and_dedups() {
        let labels: LabelSet = " foo, bar,,foo ,baz".parse().unwrap();
        assert_eq!(labels.as_slice(), &["foo", "bar", "baz"]);
        assert!(labels.contains("bar"));
        assert!(!labels.contains("qux"));
    }

    #[test]
    fn label_colors_follow_palette_order_and_cycle() {
        let labels = LabelSet::new(["a", "b", "c"]);
        let palette = vec!["#111".to_string(), "#222".to_string()];
        let colors = labels.colors(&palette);
        assert_eq!(colors["a"], "#111");
        assert_eq!(colors["b"], "#222");
        assert_eq!(colors["c"], "#111");
    }

    #[test]
    fn more_labels_than_default_palette_still_colored() {
        let labels = LabelSet::new((0..20).map(|i| format!("L{i}")));
        let config = AnnotationConfig::builder().labels(labels).build().unwrap();
        let colors = config.label_colors();
        assert_eq!(colors.len(), 20);
        assert_eq!(colors["L0"], colors["L14"]);
    }

    #[test]
    fn zero_scale_rejected() {
        let err = AnnotationConfig::builder().scale(0).build().unwrap_err();
        assert!(err.to_string().contains("Scale"));
    }

    #[test]
    fn defaults() {
        let config = AnnotationConfig::default();
        assert_eq!(config.scale, Scale::OCR_DEFAULT);
        assert_eq!(config.separator, "\n\n");
        assert_eq!(config.file_extensions, vec!["pdf"]);
        assert!(!config.split_pages);
    }

    #[test]
    fn extensions_are_normalised() {
        let config = AnnotationConfig::builder()
            .file_extensions([".PDF", " Pdf ", ""])
            .build()
            .unwrap();
        assert_eq!(config.file_extensions, vec!["pdf", "pdf"]);
    }

    #[test]
    fn empty_extension_list_rejected() {
        let err = AnnotationConfig::builder()
            .file_extensions(Vec::<String>::new())
            .build()
            .unwrap_err();
        assert!(matches!(err, AnnotateError::InvalidConfig(_)));
    }

    #[test]
    fn focus_roles_deduplicated() {
        let config = AnnotationConfig::builder()
            .focus([LayoutRole::Text, LayoutRole::Text, LayoutRole::Footnote])
            .build()
            .unwrap();
        assert_eq!(config.focus, vec![LayoutRole::Text, LayoutRole::Footnote]);
    }
}
