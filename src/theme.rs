//! UI constants shared by the recipes: label palette, token styles, CSS and
//! the transcript field settings.
//!
//! Kept in one place so the recipes only decide *which* settings apply and
//! never hard-code presentation values.

use crate::pipeline::layout::LayoutRole;

/// Label colors, assigned in label order. Cycles when a recipe has more
/// labels than colors.
pub const DEFAULT_PALETTE: [&str; 14] = [
    "#00ffff", "#ff00ff", "#00ff7f", "#ff6347", "#00bfff", "#ffa500", "#ff69b4", "#7fffd4",
    "#ffd700", "#ffdab9", "#adff2f", "#d2b48c", "#dcdcdc", "#ffff00",
];

/// Separator inserted between the spans of a page.
pub const SEPARATOR: &str = "\n\n";

/// Span roles rendered as headings.
pub const HEADINGS: [LayoutRole; 3] = [
    LayoutRole::SectionHeader,
    LayoutRole::PageHeader,
    LayoutRole::Title,
];

pub const FONT_SIZE_TEXT: u32 = 14;
pub const FONT_SIZE_HEADING: u32 = 18;

/// Stroke width of drawn boxes in the image.manual view.
pub const IMAGE_MANUAL_STROKE_WIDTH: u32 = 2;

/// Color of the focused span's box in the page preview.
pub const FOCUS_HIGHLIGHT_COLOR: &str = "magenta";

// ── Transcript field (ocr.correct) ───────────────────────────────────────

pub const TRANSCRIPT_FIELD_ROWS: u32 = 12;
pub const TRANSCRIPT_FIELD_LABEL: &str = "Transcript";
pub const TRANSCRIPT_FIELD_ID: &str = "transcription";

// ── CSS (spans.manual) ───────────────────────────────────────────────────

const CSS_CLS: &str = ".prodigy-annotator:not(:has(.prodigy-page-content)) .prodigy-container";
const CSS_CLS_PAGES: &str = ".prodigy-annotator:has(.prodigy-page-content) .prodigy-page-content";

/// Base stylesheet: left-aligned token text.
pub const CSS: &str = ".prodigy-content { text-align: left }";

/// Side-by-side layout for the text view and the page preview.
pub fn preview_css() -> String {
    format!(
        "\n{c}, {p} {{ display: grid }}\n\
{c} {{ grid-template-columns: 0 1fr 50% }}\n\
{p} {{ grid-template-columns: 1fr 50%; }}\n\
{c} > div:nth-child(2), {p} > div:nth-child(1) {{ border-right: 1px solid #ddd }}\n\
{c} > div:nth-child(3), {p} > div:nth-child(3) {{ position: relative }}\n\
{c} > div:nth-child(3) > div:first-child, {p} > div:nth-child(2) > div:first-child {{ position: sticky; top: 0 }}\n\
{c} .prodigy-meta {{ grid-column: 1 / span 3 }}\n",
        c = CSS_CLS,
        p = CSS_CLS_PAGES,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_css_targets_both_layouts() {
        let css = preview_css();
        assert!(css.contains(CSS_CLS));
        assert!(css.contains(CSS_CLS_PAGES));
        assert!(css.contains("grid-template-columns: 0 1fr 50%"));
        assert!(!css.contains("{c}"));
    }

    #[test]
    fn palette_colors_are_hex() {
        for color in DEFAULT_PALETTE {
            assert!(color.starts_with('#') && color.len() == 7, "{color}");
        }
    }
}
