//! Entity suggestions: pre-populated spans over layout text.
//!
//! An [`EntityModel`] predicts labelled character ranges in a page's text.
//! [`align_entities`] maps them onto the page's token stream; a prediction
//! that does not start and end on token boundaries cannot be shown by the
//! span view and is dropped.
//!
//! [`PatternEntities`] is the bundled model: exact phrase matches from a
//! JSONL patterns file, one `{"label": …, "pattern": …}` object per line.

use crate::config::LabelSet;
use crate::error::AnnotateError;
use crate::pipeline::input::JsonlSource;
use crate::pipeline::tokens::Token;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// A labelled range of characters. `end` is exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityPrediction {
    pub start: usize,
    pub end: usize,
    pub label: String,
}

#[derive(Debug, Clone, Error)]
pub enum EntityError {
    #[error("entity model unavailable: {0}")]
    Unavailable(String),

    #[error("entity prediction failed: {0}")]
    Processing(String),
}

/// Predict entities in text.
pub trait EntityModel {
    /// Every label the model can predict.
    fn labels(&self) -> Vec<String>;

    /// Predictions over `text`, as character (not byte) offsets.
    fn predict(&self, text: &str) -> Result<Vec<EntityPrediction>, EntityError>;
}

/// A suggested span, as the span annotation view stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestedSpan {
    pub start: usize,
    /// Exclusive.
    pub end: usize,
    pub token_start: usize,
    /// Inclusive.
    pub token_end: usize,
    pub label: String,
}

/// Map `predictions` onto `tokens`, keeping labels in `labels`.
///
/// Predictions are taken in order of start offset, longest first; one that
/// overlaps a span already kept is dropped, as is one whose edges fall
/// inside a token.
pub fn align_entities(
    predictions: &[EntityPrediction],
    tokens: &[Token],
    labels: &LabelSet,
) -> Vec<SuggestedSpan> {
    let mut ordered: Vec<&EntityPrediction> = predictions
        .iter()
        .filter(|p| p.start < p.end && labels.contains(&p.label))
        .collect();
    ordered.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));

    let mut spans: Vec<SuggestedSpan> = Vec::new();
    for prediction in ordered {
        if spans.last().is_some_and(|kept| prediction.start < kept.end) {
            continue;
        }
        let first = tokens.iter().find(|t| t.start == prediction.start);
        let last = tokens.iter().find(|t| t.end == prediction.end);
        match (first, last) {
            (Some(first), Some(last)) if first.id <= last.id => spans.push(SuggestedSpan {
                start: prediction.start,
                end: prediction.end,
                token_start: first.id,
                token_end: last.id,
                label: prediction.label.clone(),
            }),
            _ => debug!(
                "Dropping {} prediction {}..{}: not on token boundaries",
                prediction.label, prediction.start, prediction.end
            ),
        }
    }
    spans
}

// ── Phrase patterns ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct PatternLine {
    label: String,
    pattern: String,
}

struct Pattern {
    label: String,
    regex: Regex,
}

/// Exact, case-sensitive phrase matches. A pattern that starts or ends with
/// a word character only matches at a word boundary there.
pub struct PatternEntities {
    patterns: Vec<Pattern>,
}

impl PatternEntities {
    pub fn new<L, P>(patterns: impl IntoIterator<Item = (L, P)>) -> Result<Self, AnnotateError>
    where
        L: Into<String>,
        P: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|(label, pattern)| {
                let label = label.into();
                let regex = phrase_regex(pattern.as_ref())?;
                Ok(Pattern { label, regex })
            })
            .collect::<Result<Vec<_>, AnnotateError>>()?;
        Ok(Self { patterns })
    }

    /// Load a JSONL patterns file.
    pub fn from_file(path: &Path) -> Result<Self, AnnotateError> {
        let mut lines = Vec::new();
        for record in JsonlSource::open(path)? {
            let record = record.map_err(|e| {
                AnnotateError::InvalidConfig(format!("{}: {}", path.display(), e))
            })?;
            let line: PatternLine = serde_json::from_value(record.value).map_err(|e| {
                AnnotateError::InvalidConfig(format!(
                    "{}: pattern on line {}: {}",
                    path.display(),
                    record.line,
                    e
                ))
            })?;
            lines.push((line.label, line.pattern));
        }
        info!("Loaded {} entity pattern(s) from {}", lines.len(), path.display());
        Self::new(lines)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

fn phrase_regex(pattern: &str) -> Result<Regex, AnnotateError> {
    if pattern.trim().is_empty() {
        return Err(AnnotateError::InvalidConfig(
            "entity patterns must not be empty".into(),
        ));
    }
    let word = |c: Option<char>| c.is_some_and(|c| c.is_alphanumeric() || c == '_');
    let mut source = String::new();
    if word(pattern.chars().next()) {
        source.push_str(r"\b");
    }
    source.push_str(&regex::escape(pattern));
    if word(pattern.chars().last()) {
        source.push_str(r"\b");
    }
    Regex::new(&source)
        .map_err(|e| AnnotateError::InvalidConfig(format!("entity pattern {pattern:?}: {e}")))
}

impl EntityModel for PatternEntities {
    fn labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = self.patterns.iter().map(|p| p.label.clone()).collect();
        labels.sort();
        labels.dedup();
        labels
    }

    fn predict(&self, text: &str) -> Result<Vec<EntityPrediction>, EntityError> {
        let mut found = Vec::new();
        for pattern in &self.patterns {
            for m in pattern.regex.find_iter(text) {
                let start = text[..m.start()].chars().count();
                found.push(EntityPrediction {
                    start,
                    end: start + m.as_str().chars().count(),
                    label: pattern.label.clone(),
                });
            }
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::layout::{LayoutRole, LayoutSpan};
    use crate::pipeline::tokens::{build_page_text, TokenHints};

    fn tokens(text: &str) -> Vec<Token> {
        build_page_text(
            &[LayoutSpan::from_words(LayoutRole::Text, text)],
            &TokenHints::default(),
        )
        .tokens
    }

    fn prediction(start: usize, end: usize, label: &str) -> EntityPrediction {
        EntityPrediction {
            start,
            end,
            label: label.to_string(),
        }
    }

    #[test]
    fn aligned_predictions_get_token_ranges() {
        // "Acme Corp hired Jane Doe." → Acme(0) Corp(1) hired(2) Jane(3) Doe.(4)
        let toks = tokens("Acme Corp hired Jane Doe.");
        let spans = align_entities(
            &[prediction(16, 20, "PERSON"), prediction(0, 9, "ORG")],
            &toks,
            &LabelSet::new(["ORG", "PERSON"]),
        );
        assert_eq!(
            spans,
            vec![
                SuggestedSpan {
                    start: 0,
                    end: 9,
                    token_start: 0,
                    token_end: 1,
                    label: "ORG".into()
                },
                SuggestedSpan {
                    start: 16,
                    end: 20,
                    token_start: 3,
                    token_end: 3,
                    label: "PERSON".into()
                },
            ]
        );
    }

    #[test]
    fn misaligned_overlapping_and_unlisted_predictions_are_dropped() {
        let toks = tokens("Acme Corp hired Jane Doe.");
        let spans = align_entities(
            &[
                prediction(10, 13, "ORG"),
                prediction(0, 4, "ORG"),
                prediction(0, 9, "ORG"),
                prediction(16, 20, "PERSON"),
            ],
            &toks,
            &LabelSet::new(["ORG"]),
        );
        // "hire" ends inside "hired"; "Acme" overlaps "Acme Corp".
        assert_eq!(spans.len(), 1);
        assert_eq!((spans[0].start, spans[0].end), (0, 9));
    }

    #[test]
    fn patterns_match_whole_words_with_char_offsets() {
        let model = PatternEntities::new([("ORG", "Acme"), ("ORG", "C++ Guild"), ("GPE", "Zürich")])
            .unwrap();
        let found = model.predict("Zürich: Acme, Acmeville, C++ Guild").unwrap();
        let mut got: Vec<_> = found.iter().map(|p| (p.start, p.end, p.label.as_str())).collect();
        got.sort();
        assert_eq!(got, [(0, 6, "GPE"), (8, 12, "ORG"), (25, 34, "ORG")]);
        assert_eq!(model.labels(), ["GPE", "ORG"]);
    }

    #[test]
    fn pattern_file_errors_name_the_line() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("patterns.jsonl");
        std::fs::write(
            &path,
            "{\"label\": \"ORG\", \"pattern\": \"Acme\"}\n{\"label\": \"ORG\"}\n",
        )
        .unwrap();
        let err = PatternEntities::from_file(&path).err().unwrap();
        assert!(err.to_string().contains("line 2"), "got: {err}");

        std::fs::write(&path, "{\"label\": \"ORG\", \"pattern\": \"Acme\"}\n").unwrap();
        assert_eq!(PatternEntities::from_file(&path).unwrap().len(), 1);
    }

    #[test]
    fn empty_pattern_is_rejected() {
        assert!(PatternEntities::new([("ORG", "  ")]).is_err());
    }
}
