//! Markdown parsing (Markdown → intermediate elements)
//!
//! Pipeline: Markdown string → Comrak AST → element sink → IntermediateDocument.
//!
//! Comrak already gives us a tree, so this is a single recursive walk. Inline
//! nodes are flattened into a [`StyledText`] while a stack of active styles
//! turns emphasis nesting into formatting spans over the stripped text.

use crate::error::FormatError;
use crate::formats::common::{is_remote, load_image, parse_front_matter};
use crate::ir::{
    BibliographyEntry, CodeBlock, ElementSink, Equation, FormattingKind, Heading, Image,
    IntermediateDocument, IntermediateElement, ListItem, Note, PageBreak, Paragraph,
    StyledBlock, StyledText, Table, TableCell, TableRow, WarningKind,
};
use crate::options::ParseOptions;
use comrak::nodes::{AstNode, ListType, NodeValue};
use comrak::{parse_document, Arena, Options};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

static BIB_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[([^\]\s]+)\]\s*(.*)$").expect("valid regex"));

/// Parse Markdown source into an intermediate document.
pub fn parse_markdown(
    source: &str,
    options: &ParseOptions,
) -> Result<IntermediateDocument, FormatError> {
    let arena = Arena::new();
    let root = parse_document(&arena, source, &comrak_options());

    let mut walker = Walker::new(options);
    walker.collect_footnotes(root);
    for node in root.children() {
        walker.block(node, 0);
    }
    walker.flush_unreferenced_footnotes();

    let Walker {
        sink,
        metadata,
        front_matter_title,
        first_heading,
        ..
    } = walker;
    let (elements, warnings) = sink.into_parts();
    debug!(elements = elements.len(), "parsed markdown");

    Ok(IntermediateDocument {
        source_path: None,
        title: front_matter_title.or(first_heading),
        metadata,
        elements,
        warnings,
    })
}

fn comrak_options() -> Options<'static> {
    let mut options = Options::default();
    options.extension.table = true;
    options.extension.strikethrough = true;
    options.extension.superscript = true;
    options.extension.footnotes = true;
    options.extension.math_dollars = true;
    options.extension.front_matter_delimiter = Some("---".to_string());
    options
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Region {
    Body,
    /// Under an abstract heading: paragraphs become abstract elements.
    Abstract,
    /// Under a bibliography heading: paragraphs and list items become entries.
    Bibliography,
}

struct Walker<'o> {
    options: &'o ParseOptions,
    sink: ElementSink,
    metadata: BTreeMap<String, String>,
    front_matter_title: Option<String>,
    first_heading: Option<String>,
    region: Region,
    /// Footnote definitions by name, in definition order.
    footnotes: Vec<(String, String)>,
    emitted_footnotes: HashSet<String>,
}

/// Inline content gathered from one block.
#[derive(Default)]
struct Inline {
    text: StyledText,
    images: Vec<(String, String, String)>,
    footnote_refs: Vec<String>,
}

impl<'o> Walker<'o> {
    fn new(options: &'o ParseOptions) -> Self {
        Self {
            options,
            sink: ElementSink::new(),
            metadata: BTreeMap::new(),
            front_matter_title: None,
            first_heading: None,
            region: Region::Body,
            footnotes: Vec::new(),
            emitted_footnotes: HashSet::new(),
        }
    }

    fn collect_footnotes<'a>(&mut self, root: &'a AstNode<'a>) {
        for node in root.descendants() {
            if let NodeValue::FootnoteDefinition(def) = &node.data.borrow().value {
                let mut text = String::new();
                for child in node.children() {
                    if !text.is_empty() {
                        text.push(' ');
                    }
                    text.push_str(plain_text(child).trim());
                }
                self.footnotes.push((def.name.clone(), text));
            }
        }
    }

    fn block<'a>(&mut self, node: &'a AstNode<'a>, list_level: u8) {
        let value = node.data.borrow().value.clone();
        match value {
            NodeValue::FrontMatter(raw) => {
                for (key, value) in parse_front_matter(&raw) {
                    if key.eq_ignore_ascii_case("title") && !value.is_empty() {
                        self.front_matter_title = Some(value.clone());
                    }
                    self.metadata.insert(key, value);
                }
            }
            NodeValue::Heading(heading) => self.heading(node, heading.level),
            NodeValue::Paragraph => self.paragraph(node),
            NodeValue::List(list) => {
                let ordered = matches!(list.list_type, ListType::Ordered);
                for item in node.children() {
                    self.list_item(item, list_level, ordered);
                }
            }
            NodeValue::CodeBlock(code) => {
                let info = code.info.split_whitespace().next().unwrap_or("").to_string();
                if matches!(info.as_str(), "math" | "latex") {
                    self.sink.emit(IntermediateElement::Equation(Equation {
                        latex: Some(code.literal.trim_end().to_string()),
                        display: true,
                        ..Default::default()
                    }));
                } else {
                    self.sink.emit(IntermediateElement::CodeBlock(CodeBlock {
                        code: code.literal.trim_end_matches('\n').to_string(),
                        language: (!info.is_empty()).then_some(info),
                        ..Default::default()
                    }));
                }
            }
            NodeValue::BlockQuote => self.block_quote(node, list_level),
            NodeValue::Table(_) => self.table(node),
            NodeValue::HtmlBlock(html) => {
                let literal = html.literal.trim();
                if is_page_break_comment(literal) {
                    self.sink.emit(IntermediateElement::PageBreak(PageBreak::default()));
                } else {
                    debug!("skipping raw HTML block");
                }
            }
            // Only the explicit comment marks a page break.
            NodeValue::ThematicBreak => {}
            // Emitted next to their references instead.
            NodeValue::FootnoteDefinition(_) => {}
            _ => {
                for child in node.children() {
                    self.block(child, list_level);
                }
            }
        }
    }

    fn heading<'a>(&mut self, node: &'a AstNode<'a>, level: u8) {
        let inline = self.inline_children(node);
        let (text, formatting) = inline.text.trimmed().finish();

        if level == 1 && self.first_heading.is_none() && !text.is_empty() {
            self.first_heading = Some(text.clone());
        }

        if self.options.is_abstract(&text) && text.split_whitespace().count() <= 2 {
            self.region = Region::Abstract;
            return;
        }
        self.region = if self.options.is_bibliography(&text) {
            Region::Bibliography
        } else {
            Region::Body
        };

        self.sink.emit(IntermediateElement::Heading(Heading {
            level: level.clamp(1, 9),
            text,
            formatting,
            ..Default::default()
        }));
    }

    fn paragraph<'a>(&mut self, node: &'a AstNode<'a>) {
        if let Some(formulas) = display_math_only(node) {
            for latex in formulas {
                self.sink.emit(IntermediateElement::Equation(Equation {
                    latex: Some(latex),
                    display: true,
                    ..Default::default()
                }));
            }
            return;
        }

        let inline = self.inline_children(node);
        let Inline {
            text,
            images,
            footnote_refs,
        } = inline;
        let (text, formatting) = text.trimmed().finish();

        if !text.is_empty() {
            let element = match self.region {
                Region::Abstract => IntermediateElement::Abstract(StyledBlock {
                    text,
                    formatting,
                    ..Default::default()
                }),
                Region::Bibliography => bibliography_entry(&text),
                Region::Body => IntermediateElement::Paragraph(Paragraph {
                    text,
                    formatting,
                    ..Default::default()
                }),
            };
            self.sink.emit(element);
        }

        for (url, alt, title) in images {
            self.image(&url, alt, title);
        }
        self.emit_footnotes(footnote_refs);
    }

    fn list_item<'a>(&mut self, item: &'a AstNode<'a>, level: u8, ordered: bool) {
        let mut first_paragraph = true;
        for child in item.children() {
            let is_paragraph = matches!(child.data.borrow().value, NodeValue::Paragraph);
            let is_list = matches!(child.data.borrow().value, NodeValue::List(_));

            if is_paragraph && first_paragraph {
                first_paragraph = false;
                let Inline {
                    text,
                    images,
                    footnote_refs,
                } = self.inline_children(child);
                let (text, formatting) = text.trimmed().finish();
                let element = if self.region == Region::Bibliography {
                    bibliography_entry(&text)
                } else {
                    IntermediateElement::ListItem(ListItem {
                        text,
                        formatting,
                        level,
                        ordered,
                        ..Default::default()
                    })
                };
                self.sink.emit(element);
                for (url, alt, title) in images {
                    self.image(&url, alt, title);
                }
                self.emit_footnotes(footnote_refs);
            } else if is_list {
                self.block(child, level.saturating_add(1));
            } else {
                self.block(child, level);
            }
        }
    }

    fn block_quote<'a>(&mut self, node: &'a AstNode<'a>, list_level: u8) {
        let mut quote = StyledText::new();
        let mut refs = Vec::new();
        let mut rest = Vec::new();
        for child in node.children() {
            if matches!(child.data.borrow().value, NodeValue::Paragraph) {
                let inline = self.inline_children(child);
                if !quote.is_empty() {
                    quote.push_str("\n\n");
                }
                quote.append(inline.text.trimmed());
                refs.extend(inline.footnote_refs);
            } else {
                rest.push(child);
            }
        }

        let (text, formatting) = quote.finish();
        if !text.is_empty() {
            self.sink.emit(IntermediateElement::Blockquote(StyledBlock {
                text,
                formatting,
                ..Default::default()
            }));
        }
        self.emit_footnotes(refs);
        for child in rest {
            self.block(child, list_level);
        }
    }

    fn table<'a>(&mut self, node: &'a AstNode<'a>) {
        let mut rows = Vec::new();
        let mut has_header_row = false;
        for (index, row) in node.children().enumerate() {
            let header = matches!(row.data.borrow().value, NodeValue::TableRow(true));
            if index == 0 && header {
                has_header_row = true;
            }
            let cells = row
                .children()
                .map(|cell| {
                    let mut cell_value = TableCell::new(plain_text(cell).trim());
                    cell_value.header = header;
                    cell_value
                })
                .collect();
            rows.push(TableRow { cells });
        }
        self.sink.emit(IntermediateElement::Table(Table {
            rows,
            has_header_row,
            ..Default::default()
        }));
    }

    fn image(&mut self, url: &str, alt: String, title: String) {
        if !self.options.extract_images {
            return;
        }
        if is_remote(url) {
            self.sink.warn(
                WarningKind::ImageExtractionFailed,
                format!("remote image '{url}' was not fetched"),
            );
            return;
        }
        match load_image(url, self.options.resource_dir.as_deref()) {
            Ok(loaded) => {
                self.sink.emit(IntermediateElement::Image(Image {
                    data: loaded.data,
                    mime_type: loaded.mime_type,
                    width_px: loaded.width_px,
                    height_px: loaded.height_px,
                    alt_text: alt,
                    filename: loaded.filename,
                    caption: (!title.is_empty()).then_some(title),
                    ..Default::default()
                }));
            }
            Err(reason) => self.sink.warn(WarningKind::ImageExtractionFailed, reason),
        }
    }

    fn emit_footnotes(&mut self, names: Vec<String>) {
        if !self.options.extract_notes {
            return;
        }
        for name in names {
            if self.emitted_footnotes.contains(&name) {
                continue;
            }
            match self.footnotes.iter().find(|(n, _)| *n == name) {
                Some((_, text)) => {
                    let text = text.clone();
                    self.emitted_footnotes.insert(name.clone());
                    self.sink.emit(IntermediateElement::Footnote(Note {
                        id: name,
                        text,
                        ..Default::default()
                    }));
                }
                None => self.sink.warn(
                    WarningKind::MissingReference,
                    format!("footnote '{name}' has no definition"),
                ),
            }
        }
    }

    fn flush_unreferenced_footnotes(&mut self) {
        let names: Vec<String> = self
            .footnotes
            .iter()
            .map(|(name, _)| name.clone())
            .filter(|name| !self.emitted_footnotes.contains(name))
            .collect();
        self.emit_footnotes(names);
    }

    fn inline_children<'a>(&mut self, node: &'a AstNode<'a>) -> Inline {
        let mut inline = Inline::default();
        let mut styles = Vec::new();
        for child in node.children() {
            collect_inline(child, &mut styles, &mut inline);
        }
        inline
    }
}

fn collect_inline<'a>(node: &'a AstNode<'a>, styles: &mut Vec<FormattingKind>, out: &mut Inline) {
    let value = node.data.borrow().value.clone();
    let styled = |kind: FormattingKind, styles: &mut Vec<FormattingKind>, out: &mut Inline| {
        styles.push(kind);
        for child in node.children() {
            collect_inline(child, styles, out);
        }
        styles.pop();
    };

    match value {
        NodeValue::Text(text) => out.text.push_styled(&text, styles),
        NodeValue::SoftBreak => out.text.push_styled(" ", styles),
        NodeValue::LineBreak => out.text.push_styled("\n", styles),
        NodeValue::Code(code) => {
            let mut kinds = styles.clone();
            kinds.push(FormattingKind::FontFamily("monospace".to_string()));
            out.text.push_styled(&code.literal, &kinds);
        }
        NodeValue::Math(math) => {
            let mut kinds = styles.clone();
            kinds.push(FormattingKind::Math);
            out.text.push_styled(&math.literal, &kinds);
        }
        NodeValue::Strong => styled(FormattingKind::Bold, styles, out),
        NodeValue::Emph => styled(FormattingKind::Italic, styles, out),
        NodeValue::Strikethrough => styled(FormattingKind::Strikethrough, styles, out),
        NodeValue::Superscript => styled(FormattingKind::Superscript, styles, out),
        NodeValue::Image(link) => {
            let alt = plain_text(node);
            out.images.push((link.url.clone(), alt, link.title.clone()));
        }
        NodeValue::FootnoteReference(reference) => {
            out.footnote_refs.push(reference.name.clone());
        }
        NodeValue::HtmlInline(_) => {}
        _ => {
            for child in node.children() {
                collect_inline(child, styles, out);
            }
        }
    }
}

/// Text content of a node with all markup dropped.
fn plain_text<'a>(node: &'a AstNode<'a>) -> String {
    let mut out = String::new();
    for descendant in node.descendants() {
        match &descendant.data.borrow().value {
            NodeValue::Text(text) => out.push_str(text),
            NodeValue::Code(code) => out.push_str(&code.literal),
            NodeValue::Math(math) => out.push_str(&math.literal),
            NodeValue::SoftBreak | NodeValue::LineBreak => out.push(' '),
            _ => {}
        }
    }
    out
}

/// Formulas of a paragraph made only of display math (`$$…$$`).
fn display_math_only<'a>(node: &'a AstNode<'a>) -> Option<Vec<String>> {
    let mut formulas = Vec::new();
    for child in node.children() {
        match &child.data.borrow().value {
            NodeValue::Math(math) if math.display_math => formulas.push(math.literal.trim().to_string()),
            NodeValue::SoftBreak | NodeValue::LineBreak => {}
            NodeValue::Text(text) if text.trim().is_empty() => {}
            _ => return None,
        }
    }
    (!formulas.is_empty()).then_some(formulas)
}

fn is_page_break_comment(html: &str) -> bool {
    html.strip_prefix("<!--")
        .and_then(|rest| rest.strip_suffix("-->"))
        .map(|inner| {
            let inner = inner.trim().to_ascii_lowercase();
            inner == "pagebreak" || inner == "page-break" || inner == "newpage"
        })
        .unwrap_or(false)
}

fn bibliography_entry(text: &str) -> IntermediateElement {
    let (key, text) = match BIB_KEY.captures(text) {
        Some(caps) => (
            caps.get(1).map(|m| m.as_str().to_string()),
            caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default(),
        ),
        None => (None, text.to_string()),
    };
    IntermediateElement::BibliographyEntry(BibliographyEntry {
        key,
        text,
        ..Default::default()
    })
}
