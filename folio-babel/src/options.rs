//! Parser options.
//!
//! Every heuristic threshold the parsers use lives here under a name, with the
//! defaults the classifiers were tuned against.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadingDetection {
    pub min_level: u8,
    pub max_level: u8,
    /// Enable the text/format heuristics that run after style-based detection.
    pub heuristics: bool,
    pub numbered_min_font_pt: f32,
    pub uppercase_min_font_pt: f32,
    pub bold_level1_font_pt: f32,
    pub bold_level2_font_pt: f32,
    pub numbered_max_chars: usize,
    pub uppercase_max_chars: usize,
}

impl Default for HeadingDetection {
    fn default() -> Self {
        Self {
            min_level: 1,
            max_level: 9,
            heuristics: true,
            numbered_min_font_pt: 11.0,
            uppercase_min_font_pt: 12.0,
            bold_level1_font_pt: 14.0,
            bold_level2_font_pt: 12.0,
            numbered_max_chars: 100,
            uppercase_max_chars: 50,
        }
    }
}

impl HeadingDetection {
    pub fn accepts(&self, level: u8) -> bool {
        level >= self.min_level && level <= self.max_level
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodeDetection {
    /// Case-insensitive substrings of a paragraph style name.
    pub style_patterns: Vec<String>,
    pub monospace_fonts: Vec<String>,
    /// Maximum pairwise channel difference for a shading fill to count as gray.
    pub gray_tolerance: u8,
    /// Every channel of a code gray must be above this.
    pub gray_lightness_floor: u8,
}

impl Default for CodeDetection {
    fn default() -> Self {
        Self {
            style_patterns: strings(&[
                "code",
                "source",
                "listing",
                "verbatim",
                "preformatted",
                "macro",
            ]),
            monospace_fonts: strings(&[
                "Courier New",
                "Courier",
                "Consolas",
                "Monaco",
                "Menlo",
                "Lucida Console",
                "Source Code Pro",
                "Fira Code",
                "Fira Mono",
                "DejaVu Sans Mono",
                "Liberation Mono",
                "Inconsolata",
                "JetBrains Mono",
            ]),
            gray_tolerance: 20,
            gray_lightness_floor: 180,
        }
    }
}

impl CodeDetection {
    pub fn is_code_style(&self, style: &str) -> bool {
        contains_any(style, &self.style_patterns)
    }

    pub fn is_monospace(&self, family: &str) -> bool {
        self.monospace_fonts
            .iter()
            .any(|font| font.eq_ignore_ascii_case(family.trim()))
    }

    /// Whether a `RRGGBB` shading fill is a light gray.
    pub fn is_code_gray(&self, fill: &str) -> bool {
        let Some((r, g, b)) = parse_hex_rgb(fill) else {
            return false;
        };
        let tolerance = i16::from(self.gray_tolerance);
        let floor = self.gray_lightness_floor;
        (r as i16 - g as i16).abs() < tolerance
            && (g as i16 - b as i16).abs() < tolerance
            && (r as i16 - b as i16).abs() < tolerance
            && r > floor
            && g > floor
            && b > floor
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseOptions {
    pub heading: HeadingDetection,
    pub code: CodeDetection,
    pub abstract_patterns: Vec<String>,
    pub quote_patterns: Vec<String>,
    pub bibliography_patterns: Vec<String>,
    pub theorem_kinds: Vec<String>,
    pub extract_images: bool,
    pub extract_headers_footers: bool,
    pub extract_notes: bool,
    pub extract_comments: bool,
    pub extract_track_changes: bool,
    /// Directory relative image paths are resolved against.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_dir: Option<PathBuf>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            heading: HeadingDetection::default(),
            code: CodeDetection::default(),
            abstract_patterns: strings(&["abstract"]),
            quote_patterns: strings(&["quote"]),
            bibliography_patterns: strings(&["bibliography", "references"]),
            theorem_kinds: strings(&[
                "theorem",
                "lemma",
                "corollary",
                "proposition",
                "definition",
                "proof",
                "remark",
                "example",
            ]),
            extract_images: true,
            extract_headers_footers: true,
            extract_notes: true,
            extract_comments: true,
            extract_track_changes: true,
            resource_dir: None,
        }
    }
}

impl ParseOptions {
    pub fn is_abstract(&self, name: &str) -> bool {
        contains_any(name, &self.abstract_patterns)
    }

    pub fn is_quote(&self, name: &str) -> bool {
        contains_any(name, &self.quote_patterns)
    }

    pub fn is_bibliography(&self, name: &str) -> bool {
        contains_any(name, &self.bibliography_patterns)
    }

    /// The configured theorem kind `word` names, lowercased.
    pub fn theorem_kind(&self, word: &str) -> Option<String> {
        let word = word.to_lowercase();
        self.theorem_kinds
            .iter()
            .find(|kind| kind.eq_ignore_ascii_case(&word))
            .map(|kind| kind.to_lowercase())
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// Case-insensitive substring match against any pattern.
pub fn contains_any(haystack: &str, patterns: &[String]) -> bool {
    let haystack = haystack.to_lowercase();
    patterns
        .iter()
        .any(|p| !p.is_empty() && haystack.contains(&p.to_lowercase()))
}

pub(crate) fn parse_hex_rgb(value: &str) -> Option<(u8, u8, u8)> {
    let hex = value.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some((channel(0)?, channel(2)?, channel(4)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn light_gray_fill_is_code() {
        let code = CodeDetection::default();
        assert!(code.is_code_gray("F2F2F2"));
        assert!(code.is_code_gray("#E0E4E8"));
        assert!(!code.is_code_gray("FFFF00"));
        assert!(!code.is_code_gray("808080"));
        assert!(!code.is_code_gray("auto"));
    }

    #[test]
    fn monospace_match_ignores_case() {
        let code = CodeDetection::default();
        assert!(code.is_monospace("courier new"));
        assert!(!code.is_monospace("Calibri"));
    }

    #[test]
    fn pattern_checks_are_substring_matches() {
        let options = ParseOptions::default();
        assert!(options.is_abstract("Abstract Text"));
        assert!(options.is_quote("Intense Quote"));
        assert!(options.is_bibliography("References"));
        assert_eq!(options.theorem_kind("Lemma"), Some("lemma".to_string()));
        assert_eq!(options.theorem_kind("Claim"), None);
    }

    #[test]
    fn level_bounds() {
        let heading = HeadingDetection {
            max_level: 3,
            ..Default::default()
        };
        assert!(heading.accepts(3));
        assert!(!heading.accepts(4));
        assert!(!heading.accepts(0));
    }
}
