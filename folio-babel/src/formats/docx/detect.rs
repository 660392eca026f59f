//! Paragraph classification: headings, code, and style roles.
//!
//! Everything here is a pure function of [`ParagraphFacts`], which the parser
//! gathers from the resolved style and the runs of one paragraph.

use crate::options::{CodeDetection, HeadingDetection, ParseOptions};
use once_cell::sync::Lazy;
use regex::Regex;

static HEADING_STYLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^heading\s?([1-9])$").expect("valid heading style regex"));
static NUMBERED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+(?:\.\d+)*)\.?\s+[A-Z]").expect("valid numbered regex"));
static ROMAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([IVXLC]+)\.\s").expect("valid roman numeral regex"));
static THEOREM_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z]+)(?:\s+[0-9][0-9.]*[0-9]|\s+[0-9]+)?\s*[.:]\s*")
        .expect("valid theorem prefix regex")
});

/// What the classifiers need to know about one paragraph.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParagraphFacts {
    pub style_id: Option<String>,
    pub style_name: Option<String>,
    pub outline_level: Option<u8>,
    /// Trimmed paragraph text.
    pub text: String,
    /// Every non-blank run is bold.
    pub all_bold: bool,
    /// Largest effective font size over the non-blank runs.
    pub font_pt: Option<f32>,
    pub is_list: bool,
    /// Effective font family of every non-blank run.
    pub run_fonts: Vec<Option<String>>,
    pub shading: Option<String>,
}

impl ParagraphFacts {
    fn style_label(&self) -> &str {
        self.style_name
            .as_deref()
            .or(self.style_id.as_deref())
            .unwrap_or_default()
    }

    fn font_at_least(&self, pt: f32) -> bool {
        self.font_pt.map(|size| size >= pt).unwrap_or(false)
    }
}

/// Heading level of a paragraph, or `None` for body text.
///
/// Rules apply in precedence order and the first match wins: named heading
/// styles, title/section/chapter style names, outline level, then the text
/// and format heuristics.
pub fn detect_heading(facts: &ParagraphFacts, rules: &HeadingDetection) -> Option<u8> {
    styled_heading(facts, rules).or_else(|| {
        rules
            .heuristics
            .then(|| heuristic_heading(facts, rules))
            .flatten()
    })
}

/// The style-driven rules alone: heading styles, title/section/chapter names
/// and outline levels.
pub fn styled_heading(facts: &ParagraphFacts, rules: &HeadingDetection) -> Option<u8> {
    for candidate in [facts.style_id.as_deref(), facts.style_name.as_deref()]
        .into_iter()
        .flatten()
    {
        if let Some(caps) = HEADING_STYLE.captures(candidate.trim()) {
            if let Some(level) = caps[1].parse::<u8>().ok().filter(|l| rules.accepts(*l)) {
                return Some(level);
            }
        }
    }

    let label = facts.style_label().to_lowercase();
    if label.contains("title") && !label.contains("subtitle") && rules.accepts(1) {
        return Some(1);
    }
    if label.contains("section") || label.contains("chapter") {
        let level = label
            .chars()
            .find_map(|c| c.to_digit(10))
            .map(|d| d as u8)
            .unwrap_or(1);
        if rules.accepts(level) {
            return Some(level);
        }
    }

    facts
        .outline_level
        .map(|outline| outline.saturating_add(1))
        .filter(|level| rules.accepts(*level))
}

/// Text and format heuristics. Never fires for list paragraphs or empty text.
pub fn heuristic_heading(facts: &ParagraphFacts, rules: &HeadingDetection) -> Option<u8> {
    let text = facts.text.trim();
    if facts.is_list || text.is_empty() {
        return None;
    }
    let emphasized = |pt: f32| facts.all_bold || facts.font_at_least(pt);

    if let Some(caps) = NUMBERED.captures(text) {
        let prefix = &caps[1];
        let dots = u8::try_from(prefix.matches('.').count()).unwrap_or(u8::MAX);
        let level = dots.saturating_add(1);
        let short = text.chars().count() < rules.numbered_max_chars;
        let dotted = prefix.contains('.');
        if short && level <= rules.max_level && (dotted || emphasized(rules.numbered_min_font_pt)) {
            return Some(level);
        }
    }

    if let Some(caps) = ROMAN.captures(text) {
        if emphasized(rules.numbered_min_font_pt) {
            return Some(if caps[1].len() <= 2 { 1 } else { 2 });
        }
    }

    if text.chars().count() <= rules.uppercase_max_chars
        && text.chars().any(char::is_alphabetic)
        && text == text.to_uppercase()
        && emphasized(rules.uppercase_min_font_pt)
    {
        return Some(1);
    }

    if facts.all_bold {
        if facts.font_at_least(rules.bold_level1_font_pt) {
            return Some(1);
        }
        if facts.font_at_least(rules.bold_level2_font_pt) {
            return Some(2);
        }
    }
    None
}

/// Whether a paragraph is part of a code block.
pub fn is_code(facts: &ParagraphFacts, rules: &CodeDetection) -> bool {
    if rules.is_code_style(facts.style_label()) {
        return true;
    }
    if !facts.run_fonts.is_empty()
        && facts
            .run_fonts
            .iter()
            .all(|font| font.as_deref().map(|f| rules.is_monospace(f)).unwrap_or(false))
    {
        return true;
    }
    facts
        .shading
        .as_deref()
        .map(|fill| rules.is_code_gray(fill))
        .unwrap_or(false)
}

/// Role implied by a paragraph style name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StyleRole {
    Abstract,
    Quote,
    Bibliography,
    Theorem(String),
    Body,
}

pub fn style_role(facts: &ParagraphFacts, options: &ParseOptions) -> StyleRole {
    let label = facts.style_label();
    if label.is_empty() {
        return StyleRole::Body;
    }
    if options.is_abstract(label) {
        return StyleRole::Abstract;
    }
    if options.is_quote(label) {
        return StyleRole::Quote;
    }
    if options.is_bibliography(label) {
        return StyleRole::Bibliography;
    }
    let lower = label.to_lowercase();
    options
        .theorem_kinds
        .iter()
        .find(|kind| lower.contains(&kind.to_lowercase()))
        .map(|kind| StyleRole::Theorem(kind.to_lowercase()))
        .unwrap_or(StyleRole::Body)
}

/// A leading `Theorem 2.` / `Lemma:` label: the kind and the label length in
/// characters.
pub fn theorem_prefix(text: &str, options: &ParseOptions) -> Option<(String, usize)> {
    let caps = THEOREM_PREFIX.captures(text)?;
    let kind = options.theorem_kind(&caps[1])?;
    let whole = caps.get(0)?;
    Some((kind, text[..whole.end()].chars().count()))
}
