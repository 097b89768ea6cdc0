//! Post-processing: deterministic cleanup of OCR output.
//!
//! OCR engines emit one line per text line and mark words broken across
//! lines with a trailing hyphen. Two passes live here:
//!
//! 1. [`clean_ocr_text`]: always applied. Normalises line endings, drops
//!    form feeds and invisible Unicode, trims trailing whitespace.
//! 2. [`fold_ocr_dashes`]: applied on request. Joins lines into running
//!    text and re-attaches hyphenated word halves.
//!
//! Both are pure `&str → String` functions and total over any input.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply the always-on cleanup rules to raw OCR output.
///
/// Rules (applied in order):
/// 1. Normalise line endings (CRLF / CR → LF)
/// 2. Strip form feeds and invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 3. Trim trailing whitespace per line
/// 4. Trim trailing blank lines
pub fn clean_ocr_text(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    s.trim_end().to_string()
}

/// Fold OCR line-continuation hyphens into running text.
///
/// Each line is trimmed. A line without `-` is followed by a single space.
/// A line with `-` is cut at its *last* hyphen, dropping the hyphen and
/// anything after it, so the next line's text continues the word. The
/// pieces are concatenated and the result trimmed.
///
/// ```rust
/// use pdf_annotate::pipeline::postprocess::fold_ocr_dashes;
///
/// assert_eq!(fold_ocr_dashes("an increas-\ningly popular"), "an increasingly popular");
/// assert_eq!(fold_ocr_dashes(""), "");
/// ```
pub fn fold_ocr_dashes(input: &str) -> String {
    let normalised = normalise_line_endings(input);
    let mut folded = String::with_capacity(normalised.len());
    for line in normalised.split('\n') {
        let line = line.trim();
        match line.rfind('-') {
            None => {
                folded.push_str(line);
                folded.push(' ');
            }
            Some(idx) => folded.push_str(&line[..idx]),
        }
    }
    folded.trim().to_string()
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Remove invisible characters ──────────────────────────────────────

static RE_INVISIBLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new("[\u{000C}\u{00AD}\u{200B}\u{200C}\u{200D}\u{2060}\u{FEFF}]")
        .expect("static regex is valid")
});

fn remove_invisible_chars(input: &str) -> String {
    RE_INVISIBLE.replace_all(input, "").into_owned()
}

// ── Rule 3: Trim trailing whitespace ─────────────────────────────────────────

static RE_TRAILING_WS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)[ \t]+$").expect("static regex is valid"));

fn trim_trailing_whitespace(input: &str) -> String {
    RE_TRAILING_WS.replace_all(input, "").into_owned()
}
