//! Style sheet (`word/styles.xml`) and `basedOn` resolution.

use super::xml::{self, w_attr, w_child, w_val};
use roxmltree::Node;
use std::collections::{HashMap, HashSet};

/// Run properties as written on a run or in a style.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunProps {
    pub bold: Option<bool>,
    pub italic: Option<bool>,
    pub underline: Option<bool>,
    pub strike: Option<bool>,
    /// `superscript` or `subscript`.
    pub vert_align: Option<String>,
    /// Uppercase hex without `#`.
    pub color: Option<String>,
    pub size_pt: Option<f32>,
    pub font_family: Option<String>,
    pub highlight: Option<String>,
}

impl RunProps {
    pub fn from_rpr(rpr: Node) -> Self {
        let strike = match (xml::toggle(rpr, "strike"), xml::toggle(rpr, "dstrike")) {
            (None, None) => None,
            (a, b) => Some(a.unwrap_or(false) || b.unwrap_or(false)),
        };
        Self {
            bold: xml::toggle(rpr, "b"),
            italic: xml::toggle(rpr, "i"),
            underline: w_child(rpr, "u").map(|u| !matches!(w_attr(u, "val"), Some("none"))),
            strike,
            vert_align: w_val(rpr, "vertAlign")
                .filter(|v| matches!(*v, "superscript" | "subscript"))
                .map(str::to_string),
            color: w_val(rpr, "color")
                .filter(|c| !c.eq_ignore_ascii_case("auto"))
                .map(|c| c.to_ascii_uppercase()),
            size_pt: w_val(rpr, "sz").and_then(half_points),
            font_family: w_child(rpr, "rFonts").and_then(font_family),
            highlight: w_val(rpr, "highlight")
                .filter(|h| *h != "none")
                .map(str::to_string),
        }
    }

    /// Fill unset properties from `base`.
    fn inherit(&mut self, base: &RunProps) {
        self.bold = self.bold.or(base.bold);
        self.italic = self.italic.or(base.italic);
        self.underline = self.underline.or(base.underline);
        self.strike = self.strike.or(base.strike);
        if self.vert_align.is_none() {
            self.vert_align.clone_from(&base.vert_align);
        }
        if self.color.is_none() {
            self.color.clone_from(&base.color);
        }
        self.size_pt = self.size_pt.or(base.size_pt);
        if self.font_family.is_none() {
            self.font_family.clone_from(&base.font_family);
        }
        if self.highlight.is_none() {
            self.highlight.clone_from(&base.highlight);
        }
    }
}

/// `w:sz` values are half-points.
pub fn half_points(value: &str) -> Option<f32> {
    value.trim().parse::<f32>().ok().map(|v| v / 2.0)
}

fn font_family(fonts: Node) -> Option<String> {
    ["ascii", "hAnsi", "cs", "eastAsia"]
        .iter()
        .find_map(|attr| w_attr(fonts, attr))
        .map(str::to_string)
}

/// A `w:numPr` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberingRef {
    pub num_id: String,
    pub ilvl: u8,
}

impl NumberingRef {
    pub fn from_num_pr(num_pr: Node) -> Option<Self> {
        let num_id = w_val(num_pr, "numId")?.to_string();
        let ilvl = w_val(num_pr, "ilvl")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        Some(Self { num_id, ilvl })
    }

    /// `numId` 0 explicitly removes numbering.
    pub fn is_active(&self) -> bool {
        self.num_id != "0"
    }
}

#[derive(Debug, Clone, Default)]
struct Style {
    name: Option<String>,
    based_on: Option<String>,
    outline_level: Option<u8>,
    shading: Option<String>,
    numbering: Option<NumberingRef>,
    run: RunProps,
}

/// Effective properties of a paragraph style after walking `basedOn`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedStyle {
    pub id: Option<String>,
    pub name: Option<String>,
    pub outline_level: Option<u8>,
    pub shading: Option<String>,
    pub numbering: Option<NumberingRef>,
    pub run: RunProps,
}

impl ResolvedStyle {
    /// Style name, else id, for pattern matching.
    pub fn label(&self) -> &str {
        self.name
            .as_deref()
            .or(self.id.as_deref())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct StyleSheet {
    styles: HashMap<String, Style>,
    defaults: RunProps,
    default_paragraph: Option<String>,
}

impl StyleSheet {
    pub fn parse(source: &str) -> Result<Self, String> {
        let doc = xml::parse(source).map_err(|e| e.to_string())?;
        let root = doc.root_element();
        let mut sheet = StyleSheet::default();

        if let Some(rpr) = xml::descendant(root, xml::W, "docDefaults")
            .and_then(|d| xml::descendant(d, xml::W, "rPr"))
        {
            sheet.defaults = RunProps::from_rpr(rpr);
        }

        for node in root.children().filter(|n| xml::is_w(*n, "style")) {
            let Some(id) = w_attr(node, "styleId") else {
                continue;
            };
            let ppr = w_child(node, "pPr");
            let style = Style {
                name: w_val(node, "name").map(str::to_string),
                based_on: w_val(node, "basedOn").map(str::to_string),
                outline_level: ppr
                    .and_then(|p| w_val(p, "outlineLvl"))
                    .and_then(|v| v.parse().ok()),
                shading: ppr.and_then(shading_fill),
                numbering: ppr
                    .and_then(|p| w_child(p, "numPr"))
                    .and_then(NumberingRef::from_num_pr),
                run: w_child(node, "rPr").map(RunProps::from_rpr).unwrap_or_default(),
            };
            if w_attr(node, "type") == Some("paragraph")
                && matches!(w_attr(node, "default"), Some("1" | "true"))
            {
                sheet.default_paragraph = Some(id.to_string());
            }
            sheet.styles.insert(id.to_string(), style);
        }
        Ok(sheet)
    }

    pub fn name_of(&self, id: &str) -> Option<&str> {
        self.styles.get(id).and_then(|s| s.name.as_deref())
    }

    /// Resolve a paragraph style through its `basedOn` chain and the
    /// document defaults. Unknown ids fall back to the default style.
    pub fn resolve(&self, style_id: Option<&str>) -> ResolvedStyle {
        let start = style_id
            .filter(|id| self.styles.contains_key(*id))
            .or(self.default_paragraph.as_deref());

        let mut resolved = ResolvedStyle {
            id: style_id.map(str::to_string),
            name: style_id.and_then(|id| self.name_of(id)).map(str::to_string),
            ..Default::default()
        };

        let mut seen = HashSet::new();
        let mut current = start;
        while let Some(id) = current {
            if !seen.insert(id) {
                break;
            }
            let Some(style) = self.styles.get(id) else {
                break;
            };
            resolved.outline_level = resolved.outline_level.or(style.outline_level);
            if resolved.shading.is_none() {
                resolved.shading.clone_from(&style.shading);
            }
            if resolved.numbering.is_none() {
                resolved.numbering.clone_from(&style.numbering);
            }
            resolved.run.inherit(&style.run);
            current = style.based_on.as_deref();
        }
        resolved.run.inherit(&self.defaults);
        resolved
    }
}

/// `w:shd w:fill` of a property node, ignoring `auto`.
pub fn shading_fill(props: Node) -> Option<String> {
    w_child(props, "shd")
        .and_then(|shd| w_attr(shd, "fill"))
        .filter(|fill| !fill.eq_ignore_ascii_case("auto"))
        .map(|fill| fill.to_ascii_uppercase())
}
