//! Inline formatting spans over plain paragraph text.

use serde::{Deserialize, Serialize};

/// One inline style attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FormattingKind {
    Bold,
    Italic,
    Underline,
    Strikethrough,
    Superscript,
    Subscript,
    /// Hex color without the leading `#`, e.g. `FF0000`.
    FontColor(String),
    /// Point size as written, e.g. `12` or `10.5`.
    FontSize(String),
    FontFamily(String),
    Highlight(String),
    /// Inline math source. Covered characters are emitted verbatim.
    Math,
}

impl FormattingKind {
    /// Whether the kind is a font property rather than an emphasis toggle.
    pub fn is_font_property(&self) -> bool {
        matches!(
            self,
            FormattingKind::FontColor(_)
                | FormattingKind::FontSize(_)
                | FormattingKind::FontFamily(_)
                | FormattingKind::Highlight(_)
        )
    }
}

/// A half-open character range `[start, start + length)` carrying one style.
///
/// Offsets count Unicode scalar values, not bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattingSpan {
    pub start: usize,
    pub length: usize,
    pub kind: FormattingKind,
}

impl FormattingSpan {
    pub fn new(start: usize, length: usize, kind: FormattingKind) -> Self {
        Self {
            start,
            length,
            kind,
        }
    }

    pub fn end(&self) -> usize {
        self.start + self.length
    }
}

/// Text plus the spans that decorate it, built incrementally by parsers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StyledText {
    pub text: String,
    pub spans: Vec<FormattingSpan>,
    chars: usize,
}

impl StyledText {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current length in characters.
    pub fn char_len(&self) -> usize {
        self.chars
    }

    pub fn is_empty(&self) -> bool {
        self.chars == 0
    }

    pub fn push_str(&mut self, text: &str) {
        self.chars += text.chars().count();
        self.text.push_str(text);
    }

    pub fn push(&mut self, ch: char) {
        self.chars += 1;
        self.text.push(ch);
    }

    /// Append `text` and decorate it with every kind in `kinds`.
    pub fn push_styled(&mut self, text: &str, kinds: &[FormattingKind]) {
        let start = self.chars;
        self.push_str(text);
        let length = self.chars - start;
        if length == 0 {
            return;
        }
        for kind in kinds {
            self.spans
                .push(FormattingSpan::new(start, length, kind.clone()));
        }
    }

    /// Record a span from `start` to the current end.
    pub fn close_span(&mut self, start: usize, kind: FormattingKind) {
        if self.chars > start {
            self.spans
                .push(FormattingSpan::new(start, self.chars - start, kind));
        }
    }

    /// Append another styled fragment, shifting its spans.
    pub fn append(&mut self, other: StyledText) {
        let offset = self.chars;
        self.push_str(&other.text);
        self.spans.extend(other.spans.into_iter().map(|mut span| {
            span.start += offset;
            span
        }));
    }

    /// Trim surrounding whitespace, shifting and clamping spans accordingly.
    pub fn trimmed(self) -> StyledText {
        let leading = self.text.chars().take_while(|c| c.is_whitespace()).count();
        let trimmed: String = self.text.trim().to_string();
        let len = trimmed.chars().count();
        let spans = self
            .spans
            .into_iter()
            .filter_map(|span| {
                let start = span.start.saturating_sub(leading);
                let end = span.end().saturating_sub(leading).min(len);
                (end > start).then(|| FormattingSpan::new(start, end - start, span.kind))
            })
            .collect();
        StyledText {
            text: trimmed,
            spans,
            chars: len,
        }
    }

    /// Drop the first `count` characters, shifting spans left.
    pub fn skip_chars(self, count: usize) -> StyledText {
        let text: String = self.text.chars().skip(count).collect();
        let len = text.chars().count();
        let spans = self
            .spans
            .into_iter()
            .filter_map(|span| {
                let start = span.start.saturating_sub(count);
                let end = span.end().saturating_sub(count);
                (end > start).then(|| FormattingSpan::new(start, end - start, span.kind))
            })
            .collect();
        StyledText {
            text,
            spans,
            chars: len,
        }
    }

    /// Finish: merge touching spans of the same kind and drop empty ones.
    pub fn finish(self) -> (String, Vec<FormattingSpan>) {
        let len = self.chars;
        (self.text, normalize_spans(self.spans, len))
    }
}

/// Clamp spans to `text_len`, drop empty ones, and merge spans of the same
/// kind that touch or overlap. Output is sorted by start, then longest first.
pub fn normalize_spans(spans: Vec<FormattingSpan>, text_len: usize) -> Vec<FormattingSpan> {
    let mut spans: Vec<FormattingSpan> = spans
        .into_iter()
        .filter_map(|span| {
            let start = span.start.min(text_len);
            let end = span.end().min(text_len);
            (end > start).then(|| FormattingSpan::new(start, end - start, span.kind))
        })
        .collect();

    spans.sort_by(|a, b| {
        a.start
            .cmp(&b.start)
            .then_with(|| b.length.cmp(&a.length))
    });

    let mut merged: Vec<FormattingSpan> = Vec::with_capacity(spans.len());
    for span in spans {
        // Math spans are atomic: two formulas never fuse into one.
        let target = merged.iter_mut().rev().find(|existing| {
            existing.kind == span.kind
                && existing.kind != FormattingKind::Math
                && existing.end() >= span.start
        });
        match target {
            Some(existing) => {
                let end = existing.end().max(span.end());
                existing.length = end - existing.start;
            }
            None => merged.push(span),
        }
    }

    merged.sort_by(|a, b| {
        a.start
            .cmp(&b.start)
            .then_with(|| b.length.cmp(&a.length))
    });
    merged
}
