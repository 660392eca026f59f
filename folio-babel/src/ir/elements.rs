//! Core data structures for the Intermediate Representation (IR).

use super::spans::FormattingSpan;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A single structural element in source order.
///
/// Every variant carries an `order` stamped by [`super::ElementSink`]; it is
/// strictly increasing in emission order and is the only ordering signal the
/// converter relies on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IntermediateElement {
    Heading(Heading),
    Paragraph(Paragraph),
    Equation(Equation),
    CodeBlock(CodeBlock),
    Table(Table),
    Image(Image),
    ListItem(ListItem),
    Abstract(StyledBlock),
    Blockquote(StyledBlock),
    Theorem(Theorem),
    BibliographyEntry(BibliographyEntry),
    PageBreak(PageBreak),
    Header(HeaderFooter),
    Footer(HeaderFooter),
    Footnote(Note),
    Endnote(Note),
    Comment(Comment),
    TrackChange(TrackChange),
    TableOfContents(TableOfContents),
}

impl IntermediateElement {
    pub fn order(&self) -> usize {
        match self {
            IntermediateElement::Heading(e) => e.order,
            IntermediateElement::Paragraph(e) => e.order,
            IntermediateElement::Equation(e) => e.order,
            IntermediateElement::CodeBlock(e) => e.order,
            IntermediateElement::Table(e) => e.order,
            IntermediateElement::Image(e) => e.order,
            IntermediateElement::ListItem(e) => e.order,
            IntermediateElement::Abstract(e) => e.order,
            IntermediateElement::Blockquote(e) => e.order,
            IntermediateElement::Theorem(e) => e.order,
            IntermediateElement::BibliographyEntry(e) => e.order,
            IntermediateElement::PageBreak(e) => e.order,
            IntermediateElement::Header(e) => e.order,
            IntermediateElement::Footer(e) => e.order,
            IntermediateElement::Footnote(e) => e.order,
            IntermediateElement::Endnote(e) => e.order,
            IntermediateElement::Comment(e) => e.order,
            IntermediateElement::TrackChange(e) => e.order,
            IntermediateElement::TableOfContents(e) => e.order,
        }
    }

    pub(crate) fn set_order(&mut self, order: usize) {
        match self {
            IntermediateElement::Heading(e) => e.order = order,
            IntermediateElement::Paragraph(e) => e.order = order,
            IntermediateElement::Equation(e) => e.order = order,
            IntermediateElement::CodeBlock(e) => e.order = order,
            IntermediateElement::Table(e) => e.order = order,
            IntermediateElement::Image(e) => e.order = order,
            IntermediateElement::ListItem(e) => e.order = order,
            IntermediateElement::Abstract(e) => e.order = order,
            IntermediateElement::Blockquote(e) => e.order = order,
            IntermediateElement::Theorem(e) => e.order = order,
            IntermediateElement::BibliographyEntry(e) => e.order = order,
            IntermediateElement::PageBreak(e) => e.order = order,
            IntermediateElement::Header(e) => e.order = order,
            IntermediateElement::Footer(e) => e.order = order,
            IntermediateElement::Footnote(e) => e.order = order,
            IntermediateElement::Endnote(e) => e.order = order,
            IntermediateElement::Comment(e) => e.order = order,
            IntermediateElement::TrackChange(e) => e.order = order,
            IntermediateElement::TableOfContents(e) => e.order = order,
        }
    }

    /// Stable kind name used in warnings and inspect output.
    pub fn kind_name(&self) -> &'static str {
        match self {
            IntermediateElement::Heading(_) => "heading",
            IntermediateElement::Paragraph(_) => "paragraph",
            IntermediateElement::Equation(_) => "equation",
            IntermediateElement::CodeBlock(_) => "code_block",
            IntermediateElement::Table(_) => "table",
            IntermediateElement::Image(_) => "image",
            IntermediateElement::ListItem(_) => "list_item",
            IntermediateElement::Abstract(_) => "abstract",
            IntermediateElement::Blockquote(_) => "blockquote",
            IntermediateElement::Theorem(_) => "theorem",
            IntermediateElement::BibliographyEntry(_) => "bibliography_entry",
            IntermediateElement::PageBreak(_) => "page_break",
            IntermediateElement::Header(_) => "header",
            IntermediateElement::Footer(_) => "footer",
            IntermediateElement::Footnote(_) => "footnote",
            IntermediateElement::Endnote(_) => "endnote",
            IntermediateElement::Comment(_) => "comment",
            IntermediateElement::TrackChange(_) => "track_change",
            IntermediateElement::TableOfContents(_) => "table_of_contents",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Heading {
    pub order: usize,
    pub level: u8,
    pub text: String,
    #[serde(default)]
    pub formatting: Vec<FormattingSpan>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Paragraph {
    pub order: usize,
    pub text: String,
    #[serde(default)]
    pub formatting: Vec<FormattingSpan>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style_name: Option<String>,
}

/// A display or inline formula.
///
/// `native` keeps the source markup (OMML for word-processing packages) so
/// the converter can fall back when `latex` is missing.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Equation {
    pub order: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latex: Option<String>,
    pub display: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversion_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CodeBlock {
    pub order: usize,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Table {
    pub order: usize,
    pub rows: Vec<TableRow>,
    pub has_header_row: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

impl Table {
    pub fn column_count(&self) -> usize {
        self.rows
            .iter()
            .map(|row| row.cells.iter().map(|c| c.col_span.max(1)).sum::<usize>())
            .max()
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TableRow {
    pub cells: Vec<TableCell>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableCell {
    pub text: String,
    pub col_span: usize,
    /// Cell continues a vertical merge started in the row above.
    #[serde(default)]
    pub merged_continue: bool,
    #[serde(default)]
    pub header: bool,
}

impl TableCell {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            col_span: 1,
            merged_continue: false,
            header: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Image {
    pub order: usize,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width_px: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height_px: Option<u32>,
    #[serde(default)]
    pub alt_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ListItem {
    pub order: usize,
    pub text: String,
    #[serde(default)]
    pub formatting: Vec<FormattingSpan>,
    /// Nesting depth, 0 for top-level items.
    pub level: u8,
    pub ordered: bool,
}

/// Shared payload of abstracts and block quotes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StyledBlock {
    pub order: usize,
    pub text: String,
    #[serde(default)]
    pub formatting: Vec<FormattingSpan>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Theorem {
    pub order: usize,
    /// Environment kind: `theorem`, `lemma`, `proof`, ...
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub text: String,
    #[serde(default)]
    pub formatting: Vec<FormattingSpan>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BibliographyEntry {
    pub order: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PageBreak {
    pub order: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderFooterKind {
    #[default]
    Default,
    First,
    Even,
}

impl HeaderFooterKind {
    pub fn from_ooxml(value: Option<&str>) -> Self {
        match value {
            Some("first") => HeaderFooterKind::First,
            Some("even") => HeaderFooterKind::Even,
            _ => HeaderFooterKind::Default,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HeaderFooterKind::Default => "default",
            HeaderFooterKind::First => "first",
            HeaderFooterKind::Even => "even",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HeaderFooter {
    pub order: usize,
    pub text: String,
    pub kind: HeaderFooterKind,
}

/// Footnote or endnote body.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Note {
    pub order: usize,
    pub id: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Comment {
    pub order: usize,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insertion,
    Deletion,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackChange {
    pub order: usize,
    pub kind: ChangeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TableOfContents {
    pub order: usize,
    pub entries: Vec<TocEntry>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TocEntry {
    pub level: u8,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<String>,
}

/// Category of a non-fatal problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    UnsupportedElement,
    EquationConversionFailed,
    ImageExtractionFailed,
    ImageOptimizationSkipped,
    ContentTruncated,
    HeadingDemoted,
    MissingReference,
    MalformedMarkup,
}

impl WarningKind {
    pub fn as_str(self) -> &'static str {
        match self {
            WarningKind::UnsupportedElement => "unsupported_element",
            WarningKind::EquationConversionFailed => "equation_conversion_failed",
            WarningKind::ImageExtractionFailed => "image_extraction_failed",
            WarningKind::ImageOptimizationSkipped => "image_optimization_skipped",
            WarningKind::ContentTruncated => "content_truncated",
            WarningKind::HeadingDemoted => "heading_demoted",
            WarningKind::MissingReference => "missing_reference",
            WarningKind::MalformedMarkup => "malformed_markup",
        }
    }
}

/// A non-fatal problem. Warnings never imply that a run failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl Warning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            element_index: None,
            details: None,
        }
    }

    pub fn at(mut self, element_index: usize) -> Self {
        self.element_index = Some(element_index);
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Output of a format parser.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IntermediateDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub elements: Vec<IntermediateElement>,
    #[serde(default)]
    pub warnings: Vec<Warning>,
}

impl IntermediateDocument {
    /// Count elements per kind name, sorted by name.
    pub fn kind_histogram(&self) -> BTreeMap<&'static str, usize> {
        let mut histogram = BTreeMap::new();
        for element in &self.elements {
            *histogram.entry(element.kind_name()).or_insert(0) += 1;
        }
        histogram
    }
}

pub(crate) mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_bytes_serialize_as_base64() {
        let element = IntermediateElement::Image(Image {
            order: 3,
            data: vec![0xde, 0xad, 0xbe, 0xef],
            mime_type: "image/png".to_string(),
            width_px: Some(10),
            height_px: None,
            alt_text: String::new(),
            filename: None,
            caption: None,
        });
        let json = serde_json::to_value(&element).unwrap();
        assert_eq!(json["type"], "image");
        assert_eq!(json["data"], "3q2+7w==");
        let back: IntermediateElement = serde_json::from_value(json).unwrap();
        assert_eq!(back, element);
    }

    #[test]
    fn table_column_count_honors_spans() {
        let mut wide = TableCell::new("wide");
        wide.col_span = 3;
        let table = Table {
            order: 0,
            rows: vec![
                TableRow { cells: vec![wide] },
                TableRow {
                    cells: vec![TableCell::new("a"), TableCell::new("b")],
                },
            ],
            has_header_row: false,
            caption: None,
        };
        assert_eq!(table.column_count(), 3);
    }
}
