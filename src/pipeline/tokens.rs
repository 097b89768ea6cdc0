//! Token stream construction: labelled layout spans → one text with
//! offset-exact tokens and display hints.
//!
//! The text is built *from* the tokens (token text, plus one space when
//! `ws`), so `text[start..end]` is always the token's text. Offsets count
//! characters, not bytes.

use crate::pipeline::layout::{LayoutRole, LayoutSpan};
use crate::theme::{FONT_SIZE_HEADING, HEADINGS, SEPARATOR};
use serde::{Deserialize, Serialize};

/// A token as shown in the span annotation UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub id: usize,
    pub ws: bool,
    /// Role of the span this token belongs to; `None` for separators.
    #[serde(default)]
    pub layout: Option<LayoutRole>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub disabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<TokenStyle>,
}

/// Inline style attached to a token.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenStyle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_weight: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

impl TokenStyle {
    pub fn heading() -> Self {
        Self {
            font_weight: Some("bold".to_string()),
            font_size: Some(FONT_SIZE_HEADING),
            display: None,
        }
    }

    pub fn hidden() -> Self {
        Self {
            display: Some("none".to_string()),
            ..Self::default()
        }
    }
}

/// How spans are joined and which roles are non-interactive.
#[derive(Debug, Clone, Copy)]
pub struct TokenHints<'a> {
    pub separator: &'a str,
    pub disable: &'a [LayoutRole],
}

impl Default for TokenHints<'_> {
    fn default() -> Self {
        Self {
            separator: SEPARATOR,
            disable: &[],
        }
    }
}

/// Where a span landed in the page text.
#[derive(Debug, Clone, PartialEq)]
pub struct SpanRange {
    /// Index of the span in the input slice.
    pub index: usize,
    pub label: LayoutRole,
    pub token_start: usize,
    /// Inclusive.
    pub token_end: usize,
    pub start: usize,
    /// Exclusive.
    pub end: usize,
}

/// Text and tokens of a run of spans.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageText {
    pub text: String,
    pub tokens: Vec<Token>,
    /// One entry per non-empty span, in input order.
    pub spans: Vec<SpanRange>,
}

impl PageText {
    /// Text between two character offsets.
    pub fn slice(&self, start: usize, end: usize) -> String {
        char_slice(&self.text, start, end)
    }
}

/// Characters `start..end` of `text`.
pub fn char_slice(text: &str, start: usize, end: usize) -> String {
    text.chars()
        .skip(start)
        .take(end.saturating_sub(start))
        .collect()
}

struct Builder<'h> {
    hints: TokenHints<'h>,
    out: PageText,
    offset: usize,
}

impl Builder<'_> {
    fn push(&mut self, text: &str, ws: bool, layout: Option<LayoutRole>, separator: bool) {
        let start = self.offset;
        let len = text.chars().count();
        let end = start + len;

        self.out.text.push_str(text);
        self.offset = end;
        if ws {
            self.out.text.push(' ');
            self.offset += 1;
        }

        let heading = layout.as_ref().is_some_and(|r| HEADINGS.contains(r));
        let disabled_role = layout.as_ref().is_some_and(|r| self.hints.disable.contains(r));
        let style = if heading {
            Some(TokenStyle::heading())
        } else if separator {
            Some(TokenStyle::hidden())
        } else {
            None
        };

        let id = self.out.tokens.len();
        self.out.tokens.push(Token {
            text: text.to_string(),
            start,
            end,
            id,
            ws,
            layout,
            disabled: separator || disabled_role,
            style,
        });
    }
}

/// Join `spans` into one text, separated by a hidden separator token.
///
/// Empty spans and empty tokens are skipped. The last token of every span
/// has `ws = false` so the separator follows it directly.
pub fn build_page_text(spans: &[LayoutSpan], hints: &TokenHints<'_>) -> PageText {
    let mut b = Builder {
        hints: *hints,
        out: PageText::default(),
        offset: 0,
    };

    for (index, span) in spans.iter().enumerate() {
        let words: Vec<_> = span.tokens.iter().filter(|t| !t.text.is_empty()).collect();
        let Some(last) = words.len().checked_sub(1) else {
            continue;
        };

        if !b.out.spans.is_empty() {
            b.push(hints.separator, false, None, true);
        }

        let token_start = b.out.tokens.len();
        let start = b.offset;
        for (i, token) in words.iter().enumerate() {
            let ws = token.ws && i != last;
            b.push(&token.text, ws, Some(span.label.clone()), false);
        }
        b.out.spans.push(SpanRange {
            index,
            label: span.label.clone(),
            token_start,
            token_end: b.out.tokens.len() - 1,
            start,
            end: b.offset,
        });
    }
    b.out
}

/// Mark every token whose role is in `roles` as disabled.
pub fn disable_roles(tokens: &mut [Token], roles: &[LayoutRole]) {
    if roles.is_empty() {
        return;
    }
    for token in tokens {
        if token.layout.as_ref().is_some_and(|r| roles.contains(r)) {
            token.disabled = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::layout::LayoutToken;

    fn sample() -> Vec<LayoutSpan> {
        vec![
            LayoutSpan::from_words(LayoutRole::Title, "Über Straße"),
            LayoutSpan {
                label: LayoutRole::Text,
                bbox: None,
                tokens: vec![],
            },
            LayoutSpan {
                label: LayoutRole::Text,
                bbox: None,
                tokens: vec![
                    LayoutToken::new("Hello", false),
                    LayoutToken::new(",", true),
                    LayoutToken::new("world", true),
                ],
            },
            LayoutSpan::from_words(LayoutRole::Footnote, "1 See appendix"),
        ]
    }

    #[test]
    fn offsets_index_exactly_into_text() {
        let page = build_page_text(&sample(), &TokenHints::default());
        for token in &page.tokens {
            assert!(token.start <= token.end);
            assert_eq!(page.slice(token.start, token.end), token.text, "{token:?}");
        }
        for pair in page.tokens.windows(2) {
            assert!(pair[0].end <= pair[1].start);
        }
        let last = page.tokens.last().unwrap();
        assert_eq!(last.end, page.text.chars().count());
    }

    #[test]
    fn text_joins_spans_with_separator() {
        let page = build_page_text(&sample(), &TokenHints::default());
        assert_eq!(page.text, "Über Straße\n\nHello, world\n\n1 See appendix");
        assert_eq!(page.spans.len(), 3);
        assert_eq!(page.spans[1].index, 2);
    }

    #[test]
    fn separator_tokens_are_hidden_and_disabled() {
        let page = build_page_text(&sample(), &TokenHints::default());
        let seps: Vec<_> = page.tokens.iter().filter(|t| t.text == SEPARATOR).collect();
        assert_eq!(seps.len(), 2);
        for sep in seps {
            assert!(sep.disabled);
            assert_eq!(sep.layout, None);
            assert_eq!(sep.style, Some(TokenStyle::hidden()));
        }
    }

    #[test]
    fn headings_are_bold() {
        let page = build_page_text(&sample(), &TokenHints::default());
        assert_eq!(page.tokens[0].style, Some(TokenStyle::heading()));
        let body = page.tokens.iter().find(|t| t.text == "Hello").unwrap();
        assert_eq!(body.style, None);
    }

    #[test]
    fn disabled_roles_are_marked() {
        let disable = [LayoutRole::Footnote];
        let hints = TokenHints {
            disable: &disable,
            ..TokenHints::default()
        };
        let page = build_page_text(&sample(), &hints);
        for token in &page.tokens {
            let expect = token.layout.is_none() || token.layout == Some(LayoutRole::Footnote);
            assert_eq!(token.disabled, expect, "{token:?}");
        }
    }

    #[test]
    fn span_ranges_cover_their_tokens() {
        let page = build_page_text(&sample(), &TokenHints::default());
        for range in &page.spans {
            let first = &page.tokens[range.token_start];
            let last = &page.tokens[range.token_end];
            assert_eq!(first.start, range.start);
            assert_eq!(last.end, range.end);
            assert!(!last.ws);
        }
        assert_eq!(page.slice(page.spans[1].start, page.spans[1].end), "Hello, world");
    }

    #[test]
    fn ids_are_sequential() {
        let page = build_page_text(&sample(), &TokenHints::default());
        for (i, token) in page.tokens.iter().enumerate() {
            assert_eq!(token.id, i);
        }
    }

    #[test]
    fn no_spans_no_text() {
        let page = build_page_text(&[], &TokenHints::default());
        assert!(page.text.is_empty());
        assert!(page.tokens.is_empty());
    }

    #[test]
    fn custom_separator() {
        let hints = TokenHints {
            separator: " | ",
            disable: &[],
        };
        let spans = [
            LayoutSpan::from_words(LayoutRole::Text, "a"),
            LayoutSpan::from_words(LayoutRole::Text, "b"),
        ];
        assert_eq!(build_page_text(&spans, &hints).text, "a | b");
    }

    #[test]
    fn token_json_shape() {
        let page = build_page_text(
            &[LayoutSpan::from_words(LayoutRole::SectionHeader, "Intro")],
            &TokenHints::default(),
        );
        let json = serde_json::to_value(&page.tokens[0]).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "text": "Intro", "start": 0, "end": 5, "id": 0, "ws": false,
                "layout": "section_header",
                "style": {"fontWeight": "bold", "fontSize": 18}
            })
        );
    }

    #[test]
    fn disable_roles_after_the_fact() {
        let mut page = build_page_text(&sample(), &TokenHints::default());
        disable_roles(&mut page.tokens, &[LayoutRole::Title]);
        assert!(page.tokens[0].disabled);
        assert!(!page.tokens.iter().find(|t| t.text == "world").unwrap().disabled);
    }
}
