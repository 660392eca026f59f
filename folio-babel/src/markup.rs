//! Formatting spans to block markup, and back.
//!
//! Block content in the normalized tree is a LaTeX-flavoured markup string.
//! [`serialize_formatting`] turns a paragraph's plain text plus its
//! (possibly overlapping) [`FormattingSpan`]s into that markup, and
//! [`parse_markup`] recovers text and spans from markup this module produced,
//! which the exporter needs to rebuild native run properties.
//!
//! # The Algorithm
//!
//! Spans are sorted by start ascending, ties by length descending so outer
//! spans open before inner ones. The text is scanned one character at a time:
//!
//! 1. Close every active span that ends at `i`, innermost first. If a span
//!    that must close is buried under an inner span that keeps going, the
//!    inner span is closed too and reopened right after, so the output is
//!    always well nested.
//! 2. Open every span that starts at `i`, in sorted order.
//! 3. Append the escaped character (characters inside a math span are copied
//!    verbatim).
//!
//! At the end of the text every remaining span is closed, outermost last.

use crate::ir::spans::{FormattingKind, FormattingSpan, StyledText};

/// Characters with a special meaning in the markup and their escaped forms.
pub const ESCAPES: &[(char, &str)] = &[
    ('\\', "\\textbackslash{}"),
    ('{', "\\{"),
    ('}', "\\}"),
    ('$', "\\$"),
    ('&', "\\&"),
    ('#', "\\#"),
    ('^', "\\textasciicircum{}"),
    ('_', "\\_"),
    ('~', "\\textasciitilde{}"),
    ('%', "\\%"),
];

/// Knobs for [`serialize_formatting`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkupOptions {
    /// Emit font color, size, family and highlight spans. Emphasis spans
    /// (bold, italic, ...) are always emitted.
    pub styled_runs: bool,
}

impl Default for MarkupOptions {
    fn default() -> Self {
        Self { styled_runs: true }
    }
}

pub fn escape_char(ch: char, out: &mut String) {
    match ESCAPES.iter().find(|(c, _)| *c == ch) {
        Some((_, escaped)) => out.push_str(escaped),
        None => out.push(ch),
    }
}

/// Escape every special character in `text`.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        escape_char(ch, &mut out);
    }
    out
}

/// Opening markup for a span kind. Every kind closes with `}` except math.
pub fn open_markup(kind: &FormattingKind) -> String {
    match kind {
        FormattingKind::Bold => "\\textbf{".to_string(),
        FormattingKind::Italic => "\\textit{".to_string(),
        FormattingKind::Underline => "\\underline{".to_string(),
        FormattingKind::Strikethrough => "\\sout{".to_string(),
        FormattingKind::Superscript => "\\textsuperscript{".to_string(),
        FormattingKind::Subscript => "\\textsubscript{".to_string(),
        FormattingKind::FontColor(hex) => format!(
            "\\textcolor[HTML]{{{}}}{{",
            escape(&hex.trim_start_matches('#').to_uppercase())
        ),
        FormattingKind::FontSize(pt) => format!(
            "{{\\fontsize{{{}}}{{{}}}\\selectfont ",
            escape(pt),
            escape(&baseline_skip(pt))
        ),
        FormattingKind::FontFamily(name) => {
            format!("{{\\fontfamily{{{}}}\\selectfont ", escape(name))
        }
        FormattingKind::Highlight(name) => format!("\\colorbox{{{}}}{{", escape(name)),
        FormattingKind::Math => "$".to_string(),
    }
}

pub fn close_markup(kind: &FormattingKind) -> &'static str {
    match kind {
        FormattingKind::Math => "$",
        _ => "}",
    }
}

/// Baseline skip of 1.2 times the font size, printed without trailing zeros.
fn baseline_skip(pt: &str) -> String {
    match pt.parse::<f64>() {
        Ok(size) => {
            let skip = (size * 12.0).round() / 10.0;
            format!("{skip}")
        }
        Err(_) => pt.to_string(),
    }
}

/// Serialize `text` with its formatting spans into block markup.
///
/// With no spans the result is exactly [`escape`]`(text)`.
pub fn serialize_formatting(
    text: &str,
    spans: &[FormattingSpan],
    options: MarkupOptions,
) -> String {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();

    let mut sorted: Vec<&FormattingSpan> = spans
        .iter()
        .filter(|span| span.length > 0 && span.start < len)
        .filter(|span| options.styled_runs || !span.kind.is_font_property())
        .collect();
    sorted.sort_by(|a, b| {
        a.start
            .cmp(&b.start)
            .then_with(|| b.length.cmp(&a.length))
    });

    let mut out = String::with_capacity(text.len() + sorted.len() * 10);
    // Active spans in the order they were opened; the last one is innermost.
    let mut active: Vec<&FormattingSpan> = Vec::new();
    let mut next = 0;

    for (i, ch) in chars.iter().enumerate() {
        close_ending_at(i, &mut active, &mut out);

        while next < sorted.len() && sorted[next].start == i {
            out.push_str(&open_markup(&sorted[next].kind));
            active.push(sorted[next]);
            next += 1;
        }

        if active.iter().any(|span| span.kind == FormattingKind::Math) {
            out.push(*ch);
        } else {
            escape_char(*ch, &mut out);
        }
    }

    while let Some(span) = active.pop() {
        out.push_str(close_markup(&span.kind));
    }

    out
}

fn close_ending_at<'a>(i: usize, active: &mut Vec<&'a FormattingSpan>, out: &mut String) {
    let Some(lowest) = active.iter().position(|span| span.end() <= i) else {
        return;
    };

    let mut reopen = Vec::new();
    while active.len() > lowest {
        let Some(span) = active.pop() else { break };
        out.push_str(close_markup(&span.kind));
        if span.end() > i {
            reopen.push(span);
        }
    }

    for span in reopen.into_iter().rev() {
        out.push_str(&open_markup(&span.kind));
        active.push(span);
    }
}

/// Recover text and spans from markup produced by [`serialize_formatting`].
///
/// Unknown commands keep the text of their braced arguments. Unbalanced input
/// never fails; dangling groups are closed at the end.
pub fn parse_markup(markup: &str) -> StyledText {
    let chars: Vec<char> = markup.chars().collect();
    let mut out = StyledText::new();
    // (kind, start) for styled groups, None for transparent groups.
    let mut groups: Vec<Option<(FormattingKind, usize)>> = Vec::new();
    let mut math_start: Option<usize> = None;
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];

        if let Some(start) = math_start {
            if ch == '$' {
                out.close_span(start, FormattingKind::Math);
                math_start = None;
            } else {
                out.push(ch);
            }
            i += 1;
            continue;
        }

        match ch {
            '$' => {
                math_start = Some(out.char_len());
                i += 1;
            }
            '{' => {
                if let Some((kind, consumed)) = parse_declaration_group(&chars[i..]) {
                    groups.push(Some((kind, out.char_len())));
                    i += consumed;
                } else {
                    groups.push(None);
                    i += 1;
                }
            }
            '}' => {
                if let Some(Some((kind, start))) = groups.pop() {
                    out.close_span(start, kind);
                }
                i += 1;
            }
            '\\' => {
                let (consumed, action) = parse_command(&chars[i..]);
                match action {
                    CommandAction::Literal(text) => out.push_str(&text),
                    CommandAction::Open(kind) => groups.push(Some((kind, out.char_len()))),
                    CommandAction::Transparent => groups.push(None),
                    CommandAction::Skip => {}
                }
                i += consumed;
            }
            _ => {
                out.push(ch);
                i += 1;
            }
        }
    }

    while let Some(group) = groups.pop() {
        if let Some((kind, start)) = group {
            out.close_span(start, kind);
        }
    }
    if let Some(start) = math_start {
        out.close_span(start, FormattingKind::Math);
    }

    out
}

enum CommandAction {
    Literal(String),
    Open(FormattingKind),
    Transparent,
    Skip,
}

/// Parse `\name` plus any leading arguments at the start of `chars`.
fn parse_command(chars: &[char]) -> (usize, CommandAction) {
    let Some(&second) = chars.get(1) else {
        return (1, CommandAction::Skip);
    };

    if !second.is_ascii_alphabetic() {
        // `\{`, `\$`, `\\` and friends.
        let action = match second {
            '\\' => CommandAction::Literal("\n".to_string()),
            c => CommandAction::Literal(c.to_string()),
        };
        return (2, action);
    }

    let mut end = 1;
    while end < chars.len() && chars[end].is_ascii_alphabetic() {
        end += 1;
    }
    let name: String = chars[1..end].iter().collect();
    let mut consumed = end;

    let literal = match name.as_str() {
        "textbackslash" => Some("\\"),
        "textasciicircum" => Some("^"),
        "textasciitilde" => Some("~"),
        _ => None,
    };
    if let Some(text) = literal {
        if chars.get(consumed) == Some(&'{') && chars.get(consumed + 1) == Some(&'}') {
            consumed += 2;
        }
        return (consumed, CommandAction::Literal(text.to_string()));
    }

    let kind = match name.as_str() {
        "textbf" => Some(FormattingKind::Bold),
        "textit" | "emph" => Some(FormattingKind::Italic),
        "underline" => Some(FormattingKind::Underline),
        "sout" => Some(FormattingKind::Strikethrough),
        "textsuperscript" => Some(FormattingKind::Superscript),
        "textsubscript" => Some(FormattingKind::Subscript),
        "textcolor" => {
            // \textcolor[HTML]{RRGGBB}{
            let mut cursor = consumed;
            if chars.get(cursor) == Some(&'[') {
                cursor = skip_past(chars, cursor, ']');
            }
            let (value, after) = read_braced(chars, cursor);
            consumed = after;
            Some(FormattingKind::FontColor(value))
        }
        "colorbox" => {
            let (value, after) = read_braced(chars, consumed);
            consumed = after;
            Some(FormattingKind::Highlight(value))
        }
        _ => None,
    };

    match kind {
        Some(kind) => {
            if chars.get(consumed) == Some(&'{') {
                consumed += 1;
            }
            (consumed, CommandAction::Open(kind))
        }
        None if chars.get(consumed) == Some(&'{') => (consumed + 1, CommandAction::Transparent),
        None => {
            // Swallow a single separating space after a bare control word.
            if chars.get(consumed) == Some(&' ') {
                consumed += 1;
            }
            (consumed, CommandAction::Skip)
        }
    }
}

/// `{\fontsize{a}{b}\selectfont ` or `{\fontfamily{x}\selectfont `.
fn parse_declaration_group(chars: &[char]) -> Option<(FormattingKind, usize)> {
    let (kind, mut i) = if starts_with(chars, 0, "{\\fontsize") {
        let (size, after) = read_argument(chars, "{\\fontsize".len())?;
        let (_, after) = read_argument(chars, after)?;
        (FormattingKind::FontSize(size), after)
    } else if starts_with(chars, 0, "{\\fontfamily") {
        let (family, after) = read_argument(chars, "{\\fontfamily".len())?;
        (FormattingKind::FontFamily(family), after)
    } else {
        return None;
    };

    let marker = "\\selectfont";
    if !starts_with(chars, i, marker) {
        return None;
    }
    i += marker.len();
    if chars.get(i) == Some(&' ') {
        i += 1;
    }
    Some((kind, i))
}

/// Whether `chars[at..]` begins with the ASCII `prefix`.
fn starts_with(chars: &[char], at: usize, prefix: &str) -> bool {
    prefix
        .chars()
        .enumerate()
        .all(|(k, c)| chars.get(at + k) == Some(&c))
}

fn skip_past(chars: &[char], from: usize, close: char) -> usize {
    let mut i = from;
    while i < chars.len() && chars[i] != close {
        i += 1;
    }
    (i + 1).min(chars.len())
}

fn read_braced(chars: &[char], from: usize) -> (String, usize) {
    read_argument(chars, from).unwrap_or((String::new(), from))
}

/// Unescaped value of the `{…}` argument at `from` and the index after it.
fn read_argument(chars: &[char], from: usize) -> Option<(String, usize)> {
    if chars.get(from) != Some(&'{') {
        return None;
    }
    let mut value = String::new();
    let mut i = from + 1;
    while let Some(&ch) = chars.get(i) {
        match ch {
            '}' => return Some((value, i + 1)),
            '\\' => {
                let (consumed, action) = parse_command(&chars[i..]);
                if let CommandAction::Literal(text) = action {
                    value.push_str(&text);
                }
                i += consumed;
            }
            c => {
                value.push(c);
                i += 1;
            }
        }
    }
    Some((value, i))
}

/// Body of `\begin{env}...\end{env}` when `content` is wrapped in it.
pub fn environment_body<'a>(content: &'a str, env: &str) -> Option<&'a str> {
    let trimmed = content.trim();
    let begin = format!("\\begin{{{env}}}");
    let end = format!("\\end{{{env}}}");
    let inner = trimmed.strip_prefix(&begin)?.strip_suffix(&end)?;
    Some(inner.trim_matches('\n'))
}
