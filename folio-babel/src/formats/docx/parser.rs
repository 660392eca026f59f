//! Word-processing package parsing (`.docx` → intermediate elements)
//!
//! The main document part is walked once in body order. Each paragraph is
//! resolved against the style sheet, its runs are collected into styled text,
//! and it is classified with the rules in [`super::detect`]. Things anchored
//! inside a paragraph (pictures, inline equations, note references, revisions,
//! page breaks) are emitted right after it.

use super::detect::{
    heuristic_heading, is_code, style_role, styled_heading, theorem_prefix, ParagraphFacts,
    StyleRole,
};
use super::notes::{parse_comments, parse_notes, CommentBody};
use super::numbering::Numbering;
use super::package::{
    core_properties, rels_path_for, resolve_target, Package, Relationships, DOCUMENT_PART,
};
use super::styles::{shading_fill, NumberingRef, ResolvedStyle, RunProps, StyleSheet};
use super::xml::{self, w_attr, w_child, w_val, A, M, R, V, W, WP};
use crate::error::FormatError;
use crate::ir::{
    BibliographyEntry, ChangeKind, CodeBlock, Comment, ElementSink, Equation, FormattingKind,
    HeaderFooter, HeaderFooterKind, Heading, Image, IntermediateDocument, IntermediateElement,
    ListItem, Note, PageBreak, Paragraph, StyledBlock, StyledText, Table, TableCell,
    TableOfContents, TableRow, Theorem, TocEntry, TrackChange, WarningKind,
};
use crate::math::MathConverter;
use crate::media::mime_from_extension;
use crate::options::ParseOptions;
use once_cell::sync::Lazy;
use regex::Regex;
use roxmltree::Node;
use std::collections::{HashMap, HashSet};
use tracing::debug;

static TOC_STYLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^toc\s?([1-9])$").expect("valid toc style regex"));
static BIBLIOGRAPHY_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[([^\]]+)\]\s*").expect("valid bibliography key regex"));

const EMU_PER_INCH: u64 = 914_400;

/// Parse a `.docx` package into an intermediate document.
pub fn parse_docx(
    source: &[u8],
    options: &ParseOptions,
    math: &dyn MathConverter,
) -> Result<IntermediateDocument, FormatError> {
    let package = Package::open(source)?;
    let main = package.text(DOCUMENT_PART).ok_or_else(|| {
        FormatError::CorruptPackage(format!("package has no '{DOCUMENT_PART}' part"))
    })?;
    let doc = xml::parse(&main)
        .map_err(|e| FormatError::ParseError(format!("{DOCUMENT_PART}: {e}")))?;
    let body = xml::descendant(doc.root_element(), W, "body")
        .ok_or_else(|| FormatError::ParseError("document has no body".to_string()))?;

    let mut sink = ElementSink::new();
    let rels = load_part(
        &package,
        &mut sink,
        &rels_path_for(DOCUMENT_PART),
        Relationships::parse,
    )
    .unwrap_or_default();
    let part_for = |kind: &str, fallback: &str| {
        rels.of_type(kind)
            .map(|rel| resolve_target(DOCUMENT_PART, &rel.target))
            .unwrap_or_else(|| fallback.to_string())
    };

    let styles = load_part(
        &package,
        &mut sink,
        &part_for("styles", "word/styles.xml"),
        StyleSheet::parse,
    )
    .unwrap_or_default();
    let numbering = load_part(
        &package,
        &mut sink,
        &part_for("numbering", "word/numbering.xml"),
        Numbering::parse,
    )
    .unwrap_or_default();
    let (footnotes, endnotes) = if options.extract_notes {
        (
            load_part(&package, &mut sink, &part_for("footnotes", "word/footnotes.xml"), |s| {
                parse_notes(s, "footnote")
            })
            .unwrap_or_default(),
            load_part(&package, &mut sink, &part_for("endnotes", "word/endnotes.xml"), |s| {
                parse_notes(s, "endnote")
            })
            .unwrap_or_default(),
        )
    } else {
        Default::default()
    };
    let comments = if options.extract_comments {
        load_part(
            &package,
            &mut sink,
            &part_for("comments", "word/comments.xml"),
            parse_comments,
        )
        .unwrap_or_default()
    } else {
        HashMap::new()
    };
    let metadata = load_part(&package, &mut sink, "docProps/core.xml", core_properties)
        .unwrap_or_default();

    let mut parser = DocxParser {
        package: &package,
        source: &main,
        options,
        math,
        sink,
        styles,
        numbering,
        rels: &rels,
        footnotes,
        endnotes,
        comments,
        code: Vec::new(),
        missing_numbering: HashSet::new(),
    };

    let final_section = body.children().filter(|n| xml::is_w(*n, "sectPr")).last();
    if let Some(section) = final_section {
        parser.page_parts(section, "headerReference", IntermediateElement::Header);
    }
    for node in body.children() {
        parser.block(node);
    }
    parser.flush_code();
    if let Some(section) = final_section {
        parser.page_parts(section, "footerReference", IntermediateElement::Footer);
    }

    let (elements, warnings) = parser.sink.into_parts();
    debug!(
        elements = elements.len(),
        warnings = warnings.len(),
        "parsed docx"
    );

    Ok(IntermediateDocument {
        source_path: None,
        title: metadata.get("title").cloned(),
        metadata,
        elements,
        warnings,
    })
}

/// Parse an optional supporting part. Absent parts are `None`; malformed ones
/// are `None` plus a warning.
fn load_part<T>(
    package: &Package,
    sink: &mut ElementSink,
    name: &str,
    parse: impl FnOnce(&str) -> Result<T, String>,
) -> Option<T> {
    let text = package.text(name)?;
    match parse(&text) {
        Ok(value) => Some(value),
        Err(err) => {
            sink.warn(
                WarningKind::MalformedMarkup,
                format!("ignoring malformed part '{name}': {err}"),
            );
            None
        }
    }
}

struct DocxParser<'a> {
    package: &'a Package,
    /// Main document XML; equation fragments are sliced out of it.
    source: &'a str,
    options: &'a ParseOptions,
    math: &'a dyn MathConverter,
    sink: ElementSink,
    styles: StyleSheet,
    numbering: Numbering,
    rels: &'a Relationships,
    footnotes: HashMap<String, String>,
    endnotes: HashMap<String, String>,
    comments: HashMap<String, CommentBody>,
    /// Lines of consecutive code paragraphs not yet emitted.
    code: Vec<String>,
    missing_numbering: HashSet<String>,
}

/// Facts about one non-blank run, after style resolution.
struct RunFacts {
    bold: bool,
    size_pt: Option<f32>,
    font: Option<String>,
}

/// Everything gathered from the content of one paragraph.
#[derive(Default)]
struct Collected<'n, 'i> {
    text: StyledText,
    runs: Vec<RunFacts>,
    page_break: bool,
    pictures: Vec<Node<'n, 'i>>,
    /// Equation nodes and whether they are `m:oMathPara` blocks.
    equations: Vec<(Node<'n, 'i>, bool)>,
    footnotes: Vec<String>,
    endnotes: Vec<String>,
    comments: Vec<String>,
    changes: Vec<TrackChange>,
}

impl<'a> DocxParser<'a> {
    fn emit(&mut self, element: IntermediateElement) -> usize {
        self.flush_code();
        self.sink.emit(element)
    }

    fn flush_code(&mut self) {
        if self.code.is_empty() {
            return;
        }
        let mut lines = std::mem::take(&mut self.code);
        while lines.last().is_some_and(|line| line.is_empty()) {
            lines.pop();
        }
        let code = lines.join("\n");
        self.sink.emit(IntermediateElement::CodeBlock(CodeBlock {
            order: 0,
            code,
            language: None,
        }));
    }

    fn block(&mut self, node: Node) {
        if node.tag_name().namespace() != Some(W) {
            return;
        }
        match node.tag_name().name() {
            "p" => self.paragraph(node),
            "tbl" => self.table(node),
            "sdt" => self.structured(node),
            "customXml" => {
                for child in node.children() {
                    self.block(child);
                }
            }
            "altChunk" => self.sink.warn(
                WarningKind::UnsupportedElement,
                "embedded alternative-format chunk skipped",
            ),
            _ => {}
        }
    }

    fn paragraph(&mut self, p: Node) {
        let ppr = w_child(p, "pPr");
        let mut style = self
            .styles
            .resolve(ppr.and_then(|ppr| w_val(ppr, "pStyle")));
        if let Some(ppr) = ppr {
            if let Some(level) = w_val(ppr, "outlineLvl").and_then(|v| v.parse().ok()) {
                style.outline_level = Some(level);
            }
            if let Some(fill) = shading_fill(ppr) {
                style.shading = Some(fill);
            }
            if let Some(numbering) = w_child(ppr, "numPr").and_then(NumberingRef::from_num_pr) {
                style.numbering = Some(numbering);
            }
            if xml::toggle(ppr, "pageBreakBefore") == Some(true) {
                self.emit(IntermediateElement::PageBreak(PageBreak { order: 0 }));
            }
        }

        let mut collected = Collected::default();
        self.collect(p, &style, &mut collected);

        let text = std::mem::take(&mut collected.text);
        let code_line = text.text.trim_end().to_string();
        let text = text.trimmed();
        let equations_only = text.is_empty();
        if !text.is_empty() {
            self.classify(&style, text, code_line, &collected);
        } else if !self.code.is_empty()
            && collected.pictures.is_empty()
            && collected.equations.is_empty()
            && is_code(&paragraph_facts(&style, String::new(), &collected), &self.options.code)
        {
            self.code.push(String::new());
        }
        self.trailing(collected, equations_only);
    }

    fn classify(
        &mut self,
        style: &ResolvedStyle,
        text: StyledText,
        code_line: String,
        collected: &Collected,
    ) {
        let numbering = style.numbering.as_ref().filter(|n| n.is_active());
        let facts = paragraph_facts(style, text.text.clone(), collected);
        let rules = &self.options.heading;

        if style.label().to_lowercase().contains("caption") && self.attach_caption(&facts.text) {
            return;
        }

        if let Some(level) = styled_heading(&facts, rules) {
            return self.heading(level, text, style);
        }

        if let Some(numbering) = numbering {
            let ordered = self.is_ordered(numbering);
            let (text, formatting) = text.finish();
            self.emit(IntermediateElement::ListItem(ListItem {
                text,
                formatting,
                level: numbering.ilvl,
                ordered,
                ..Default::default()
            }));
            return;
        }

        if is_code(&facts, &self.options.code) {
            // Emitting flushes; buffering must not.
            self.code.push(code_line);
            return;
        }

        match style_role(&facts, self.options) {
            StyleRole::Abstract => {
                let (text, formatting) = text.finish();
                self.emit(IntermediateElement::Abstract(StyledBlock {
                    order: 0,
                    text,
                    formatting,
                }));
                return;
            }
            StyleRole::Quote => {
                let (text, formatting) = text.finish();
                self.emit(IntermediateElement::Blockquote(StyledBlock {
                    order: 0,
                    text,
                    formatting,
                }));
                return;
            }
            StyleRole::Bibliography => {
                let (key, text) = match BIBLIOGRAPHY_KEY.captures(&facts.text) {
                    Some(caps) => (
                        Some(caps[1].trim().to_string()),
                        facts.text[caps[0].len()..].to_string(),
                    ),
                    None => (None, facts.text.clone()),
                };
                self.emit(IntermediateElement::BibliographyEntry(BibliographyEntry {
                    order: 0,
                    key,
                    text,
                }));
                return;
            }
            StyleRole::Theorem(kind) => {
                let (text, formatting) = text.finish();
                self.emit(IntermediateElement::Theorem(Theorem {
                    kind,
                    text,
                    formatting,
                    ..Default::default()
                }));
                return;
            }
            StyleRole::Body => {}
        }

        if rules.heuristics {
            if let Some(level) = heuristic_heading(&facts, rules) {
                return self.heading(level, text, style);
            }
        }

        let leading_bold = collected.runs.first().map(|r| r.bold).unwrap_or(false);
        if leading_bold {
            if let Some((kind, label_len)) = theorem_prefix(&facts.text, self.options) {
                let (text, formatting) = text.skip_chars(label_len).trimmed().finish();
                self.emit(IntermediateElement::Theorem(Theorem {
                    kind,
                    text,
                    formatting,
                    ..Default::default()
                }));
                return;
            }
        }

        let (text, formatting) = text.finish();
        self.emit(IntermediateElement::Paragraph(Paragraph {
            text,
            formatting,
            style_name: style.name.clone(),
            ..Default::default()
        }));
    }

    fn heading(&mut self, level: u8, text: StyledText, style: &ResolvedStyle) {
        let (text, formatting) = text.finish();
        self.emit(IntermediateElement::Heading(Heading {
            level,
            text,
            formatting,
            style_name: style.name.clone(),
            ..Default::default()
        }));
    }

    fn is_ordered(&mut self, numbering: &NumberingRef) -> bool {
        match self.numbering.is_ordered(&numbering.num_id, numbering.ilvl) {
            Some(ordered) => ordered,
            None => {
                if self.missing_numbering.insert(numbering.num_id.clone()) {
                    self.sink.warn(
                        WarningKind::MissingReference,
                        format!(
                            "numbering definition {} level {} not found; treating list as bulleted",
                            numbering.num_id, numbering.ilvl
                        ),
                    );
                }
                false
            }
        }
    }

    /// Give the element just emitted a caption, if it is a figure or table
    /// without one.
    fn attach_caption(&mut self, caption: &str) -> bool {
        if !self.code.is_empty() {
            return false;
        }
        match self.sink.elements_mut().last_mut() {
            Some(IntermediateElement::Image(image)) if image.caption.is_none() => {
                image.caption = Some(caption.to_string());
                true
            }
            Some(IntermediateElement::Table(table)) if table.caption.is_none() => {
                table.caption = Some(caption.to_string());
                true
            }
            _ => false,
        }
    }

    fn collect<'n, 'i>(
        &self,
        node: Node<'n, 'i>,
        style: &ResolvedStyle,
        out: &mut Collected<'n, 'i>,
    ) {
        for child in node.children().filter(Node::is_element) {
            let name = child.tag_name().name();
            match child.tag_name().namespace() {
                Some(ns) if ns == M => match name {
                    "oMathPara" => out.equations.push((child, true)),
                    "oMath" => out.equations.push((child, false)),
                    _ => {}
                },
                Some(ns) if ns == W => match name {
                    "r" => self.run(child, style, out),
                    "hyperlink" | "smartTag" | "fldSimple" | "customXml" | "moveTo" | "bdo"
                    | "dir" => self.collect(child, style, out),
                    "sdt" => {
                        if let Some(content) = w_child(child, "sdtContent") {
                            self.collect(content, style, out);
                        }
                    }
                    "ins" => {
                        out.changes.push(revision(child, ChangeKind::Insertion));
                        self.collect(child, style, out);
                    }
                    "del" => out.changes.push(revision(child, ChangeKind::Deletion)),
                    "commentRangeStart" => {
                        if let Some(id) = w_attr(child, "id") {
                            push_unique(&mut out.comments, id);
                        }
                    }
                    _ => {}
                },
                _ => {}
            }
        }
    }

    fn run<'n, 'i>(&self, run: Node<'n, 'i>, style: &ResolvedStyle, out: &mut Collected<'n, 'i>) {
        let direct = w_child(run, "rPr")
            .map(RunProps::from_rpr)
            .unwrap_or_default();
        let mut text = String::new();
        for child in run.children().filter(|n| n.tag_name().namespace() == Some(W)) {
            match child.tag_name().name() {
                "t" => text.push_str(child.text().unwrap_or_default()),
                "tab" => text.push('\t'),
                "br" if w_attr(child, "type") == Some("page") => out.page_break = true,
                "br" | "cr" => text.push('\n'),
                "noBreakHyphen" => text.push('-'),
                "sym" => text.extend(symbol(child)),
                "drawing" | "pict" | "object" => out.pictures.push(child),
                "footnoteReference" => out.footnotes.extend(w_attr(child, "id").map(String::from)),
                "endnoteReference" => out.endnotes.extend(w_attr(child, "id").map(String::from)),
                "commentReference" => {
                    if let Some(id) = w_attr(child, "id") {
                        push_unique(&mut out.comments, id);
                    }
                }
                _ => {}
            }
        }

        if !text.trim().is_empty() {
            out.runs.push(RunFacts {
                bold: direct.bold.or(style.run.bold).unwrap_or(false),
                size_pt: direct.size_pt.or(style.run.size_pt),
                font: direct
                    .font_family
                    .clone()
                    .or_else(|| style.run.font_family.clone()),
            });
        }
        out.text.push_styled(&text, &span_kinds(&direct, &style.run));
    }

    /// Elements anchored inside a paragraph, in a fixed order after it.
    fn trailing(&mut self, collected: Collected, equations_only: bool) {
        for picture in collected.pictures {
            self.picture(picture);
        }
        for (node, block) in collected.equations {
            self.equation(node, block || equations_only);
        }
        if self.options.extract_notes {
            for id in collected.footnotes {
                match self.footnotes.get(&id).cloned() {
                    Some(text) => {
                        self.emit(IntermediateElement::Footnote(Note { order: 0, id, text }));
                    }
                    None => self.sink.warn(
                        WarningKind::MissingReference,
                        format!("footnote {id} not found"),
                    ),
                }
            }
            for id in collected.endnotes {
                match self.endnotes.get(&id).cloned() {
                    Some(text) => {
                        self.emit(IntermediateElement::Endnote(Note { order: 0, id, text }));
                    }
                    None => self.sink.warn(
                        WarningKind::MissingReference,
                        format!("endnote {id} not found"),
                    ),
                }
            }
        }
        if self.options.extract_comments {
            for id in collected.comments {
                match self.comments.get(&id).cloned() {
                    Some(body) => {
                        self.emit(IntermediateElement::Comment(Comment {
                            order: 0,
                            id,
                            author: body.author,
                            date: body.date,
                            text: body.text,
                        }));
                    }
                    None => self.sink.warn(
                        WarningKind::MissingReference,
                        format!("comment {id} not found"),
                    ),
                }
            }
        }
        if self.options.extract_track_changes {
            for change in collected.changes {
                if !change.text.trim().is_empty() {
                    self.emit(IntermediateElement::TrackChange(change));
                }
            }
        }
        if collected.page_break {
            self.emit(IntermediateElement::PageBreak(PageBreak { order: 0 }));
        }
    }

    fn equation(&mut self, node: Node, display: bool) {
        let source = self.source;
        let native = &source[node.range()];
        let conversion = self.math.convert(native);
        if let Some(error) = &conversion.error {
            debug!(%error, "equation kept without latex");
        }
        self.emit(IntermediateElement::Equation(Equation {
            order: 0,
            native: Some(native.to_string()),
            latex: conversion.latex,
            display,
            conversion_error: conversion.error,
        }));
    }

    fn picture(&mut self, node: Node) {
        if !self.options.extract_images {
            return;
        }
        let reference = xml::descendant(node, A, "blip")
            .and_then(|blip| blip.attribute((R, "embed")))
            .or_else(|| {
                xml::descendant(node, V, "imagedata").and_then(|data| data.attribute((R, "id")))
            });
        let Some(id) = reference else {
            self.sink.warn(
                WarningKind::UnsupportedElement,
                "drawing without an embedded picture skipped",
            );
            return;
        };

        let Some(rel) = self.rels.get(id) else {
            self.sink.warn(
                WarningKind::ImageExtractionFailed,
                format!("image relationship '{id}' not found"),
            );
            return;
        };
        if rel.external {
            self.sink.warn(
                WarningKind::ImageExtractionFailed,
                format!("linked image '{}' is not embedded", rel.target),
            );
            return;
        }
        let part = resolve_target(DOCUMENT_PART, &rel.target);
        let Some(data) = self.package.part(&part) else {
            self.sink.warn(
                WarningKind::ImageExtractionFailed,
                format!("image part '{part}' is missing from the package"),
            );
            return;
        };
        let Some(mime_type) = mime_from_extension(&part) else {
            self.sink.warn(
                WarningKind::ImageExtractionFailed,
                format!("image part '{part}' has an unknown type"),
            );
            return;
        };

        let extent = xml::descendant(node, WP, "extent");
        let pixels = |axis: &str| {
            extent
                .and_then(|e| e.attribute(axis))
                .and_then(|v| v.parse::<u64>().ok())
                .map(emu_to_px)
                .filter(|px| *px > 0)
        };
        let doc_pr = xml::descendant(node, WP, "docPr");
        let alt_text = doc_pr
            .and_then(|d| {
                d.attribute("descr")
                    .filter(|s| !s.trim().is_empty())
                    .or_else(|| d.attribute("title"))
            })
            .unwrap_or_default()
            .trim()
            .to_string();

        self.emit(IntermediateElement::Image(Image {
            order: 0,
            data: data.to_vec(),
            mime_type: mime_type.to_string(),
            width_px: pixels("cx"),
            height_px: pixels("cy"),
            alt_text,
            filename: part.rsplit('/').next().map(str::to_string),
            caption: None,
        }));
    }

    fn table(&mut self, tbl: Node) {
        let rows: Vec<Node> = tbl.children().filter(|n| xml::is_w(*n, "tr")).collect();
        if rows.is_empty() {
            return;
        }
        let repeated_header = w_child(rows[0], "trPr")
            .and_then(|props| xml::toggle(props, "tblHeader"))
            .unwrap_or(false);
        let styled_header = w_child(tbl, "tblPr")
            .and_then(|props| w_child(props, "tblLook"))
            .map(first_row_look)
            .unwrap_or(false);
        let has_header_row = repeated_header || styled_header;

        let rows = rows
            .iter()
            .enumerate()
            .map(|(index, row)| TableRow {
                cells: row
                    .children()
                    .filter(|n| xml::is_w(*n, "tc"))
                    .map(|tc| {
                        let props = w_child(tc, "tcPr");
                        let mut cell = TableCell::new(xml::block_text(tc));
                        cell.col_span = props
                            .and_then(|p| w_val(p, "gridSpan"))
                            .and_then(|v| v.parse().ok())
                            .unwrap_or(1)
                            .max(1);
                        cell.merged_continue = props
                            .and_then(|p| w_child(p, "vMerge"))
                            .map(|merge| w_attr(merge, "val") != Some("restart"))
                            .unwrap_or(false);
                        cell.header = has_header_row && index == 0;
                        cell
                    })
                    .collect(),
            })
            .collect();

        self.emit(IntermediateElement::Table(Table {
            order: 0,
            rows,
            has_header_row,
            caption: None,
        }));
    }

    /// `w:sdt` at block level: a table of contents, or a wrapper whose
    /// content is ordinary body blocks.
    fn structured(&mut self, sdt: Node) {
        let gallery = w_child(sdt, "sdtPr")
            .and_then(|props| xml::descendant(props, W, "docPartGallery"))
            .and_then(|g| w_attr(g, "val"))
            .unwrap_or_default();
        let Some(content) = w_child(sdt, "sdtContent") else {
            return;
        };
        if gallery.contains("Table of Contents") {
            self.table_of_contents(content);
        } else {
            for child in content.children() {
                self.block(child);
            }
        }
    }

    fn table_of_contents(&mut self, content: Node) {
        let entries = content
            .descendants()
            .filter(|n| xml::is_w(*n, "p"))
            .filter_map(|p| {
                let style_id = w_child(p, "pPr").and_then(|ppr| w_val(ppr, "pStyle"))?;
                let level = [Some(style_id), self.styles.name_of(style_id)]
                    .into_iter()
                    .flatten()
                    .find_map(|label| TOC_STYLE.captures(label.trim()))
                    .and_then(|caps| caps[1].parse::<u8>().ok())?;
                let raw = xml::paragraph_text(p);
                let (text, page) = match raw.rsplit_once('\t') {
                    Some((text, page)) => (
                        text.trim().to_string(),
                        Some(page.trim().to_string()).filter(|p| !p.is_empty()),
                    ),
                    None => (raw.trim().to_string(), None),
                };
                (!text.is_empty()).then_some(TocEntry { level, text, page })
            })
            .collect();
        self.emit(IntermediateElement::TableOfContents(TableOfContents {
            order: 0,
            entries,
        }));
    }

    /// Header or footer parts referenced by the final section properties.
    fn page_parts(
        &mut self,
        section: Node,
        reference: &str,
        wrap: fn(HeaderFooter) -> IntermediateElement,
    ) {
        if !self.options.extract_headers_footers {
            return;
        }
        for node in section.children().filter(|n| xml::is_w(*n, reference)) {
            let kind = HeaderFooterKind::from_ooxml(w_attr(node, "type"));
            let Some(id) = node.attribute((R, "id")) else {
                continue;
            };
            let Some(rel) = self.rels.get(id) else {
                self.sink.warn(
                    WarningKind::MissingReference,
                    format!("{reference} '{id}' has no relationship"),
                );
                continue;
            };
            let part = resolve_target(DOCUMENT_PART, &rel.target);
            let Some(source) = self.package.text(&part) else {
                self.sink.warn(
                    WarningKind::MissingReference,
                    format!("part '{part}' is missing from the package"),
                );
                continue;
            };
            let text = match xml::parse(&source) {
                Ok(doc) => xml::block_text(doc.root_element()),
                Err(err) => {
                    self.sink.warn(
                        WarningKind::MalformedMarkup,
                        format!("ignoring malformed part '{part}': {err}"),
                    );
                    continue;
                }
            };
            if !text.is_empty() {
                self.emit(wrap(HeaderFooter {
                    order: 0,
                    text,
                    kind,
                }));
            }
        }
    }
}

/// Spans for the properties set directly on a run. Size and family only
/// count when they differ from the paragraph style.
fn span_kinds(direct: &RunProps, base: &RunProps) -> Vec<FormattingKind> {
    let mut kinds = Vec::new();
    if direct.bold == Some(true) {
        kinds.push(FormattingKind::Bold);
    }
    if direct.italic == Some(true) {
        kinds.push(FormattingKind::Italic);
    }
    if direct.underline == Some(true) {
        kinds.push(FormattingKind::Underline);
    }
    if direct.strike == Some(true) {
        kinds.push(FormattingKind::Strikethrough);
    }
    match direct.vert_align.as_deref() {
        Some("superscript") => kinds.push(FormattingKind::Superscript),
        Some("subscript") => kinds.push(FormattingKind::Subscript),
        _ => {}
    }
    if let Some(color) = &direct.color {
        kinds.push(FormattingKind::FontColor(color.clone()));
    }
    if let Some(size) = direct.size_pt.filter(|size| base.size_pt != Some(*size)) {
        kinds.push(FormattingKind::FontSize(format_points(size)));
    }
    if let Some(family) = direct
        .font_family
        .as_ref()
        .filter(|family| base.font_family.as_ref() != Some(*family))
    {
        kinds.push(FormattingKind::FontFamily(family.clone()));
    }
    if let Some(highlight) = &direct.highlight {
        kinds.push(FormattingKind::Highlight(highlight.clone()));
    }
    kinds
}

fn paragraph_facts(style: &ResolvedStyle, text: String, collected: &Collected) -> ParagraphFacts {
    ParagraphFacts {
        style_id: style.id.clone(),
        style_name: style.name.clone(),
        outline_level: style.outline_level,
        text,
        all_bold: !collected.runs.is_empty() && collected.runs.iter().all(|r| r.bold),
        font_pt: collected
            .runs
            .iter()
            .filter_map(|r| r.size_pt)
            .reduce(f32::max)
            .or(style.run.size_pt),
        is_list: style.numbering.as_ref().is_some_and(|n| n.is_active()),
        run_fonts: collected.runs.iter().map(|r| r.font.clone()).collect(),
        shading: style.shading.clone(),
    }
}

fn format_points(pt: f32) -> String {
    if pt.fract() == 0.0 {
        format!("{}", pt as u32)
    } else {
        format!("{pt}")
    }
}

fn emu_to_px(emu: u64) -> u32 {
    u32::try_from(emu.saturating_mul(96) / EMU_PER_INCH).unwrap_or(u32::MAX)
}

/// `w:sym` character. Symbol-font code points live in the private use area
/// at `F0xx`; the low byte is the glyph.
fn symbol(node: Node) -> Option<char> {
    let code = u32::from_str_radix(w_attr(node, "char")?, 16).ok()?;
    let code = if code >= 0xF000 { code - 0xF000 } else { code };
    char::from_u32(code)
}

/// `tblLook` first-row flag, as an attribute or in the legacy hex mask.
fn first_row_look(look: Node) -> bool {
    match w_attr(look, "firstRow") {
        Some(value) => matches!(value, "1" | "true" | "on"),
        None => w_attr(look, "val")
            .and_then(|v| u32::from_str_radix(v, 16).ok())
            .map(|mask| mask & 0x0020 != 0)
            .unwrap_or(false),
    }
}

fn revision(node: Node, kind: ChangeKind) -> TrackChange {
    let text = node
        .descendants()
        .filter(|n| xml::is_w(*n, "t") || xml::is_w(*n, "delText"))
        .filter_map(|n| n.text())
        .collect();
    TrackChange {
        order: 0,
        kind,
        author: w_attr(node, "author").map(str::to_string),
        date: w_attr(node, "date").map(str::to_string),
        text,
        revision_id: w_attr(node, "id").map(str::to_string),
    }
}

fn push_unique(ids: &mut Vec<String>, id: &str) {
    if !ids.iter().any(|existing| existing == id) {
        ids.push(id.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{document, package, relationships, simple, styles};
    use super::*;
    use crate::ir::FormattingSpan;
    use crate::math::{NullConverter, OmmlConverter};

    fn parse(bytes: &[u8]) -> IntermediateDocument {
        parse_docx(bytes, &ParseOptions::default(), &OmmlConverter).expect("parses")
    }

    fn text_run(text: &str) -> String {
        format!(r#"<w:r><w:t xml:space="preserve">{text}</w:t></w:r>"#)
    }

    fn styled_paragraph(style: &str, text: &str) -> String {
        format!(
            r#"<w:p><w:pPr><w:pStyle w:val="{style}"/></w:pPr>{}</w:p>"#,
            text_run(text)
        )
    }

    #[test]
    fn heading_styles_and_bold_spans() {
        let body = format!(
            "{}<w:p>{}<w:r><w:rPr><w:b/></w:rPr><w:t>bold</w:t></w:r>{}</w:p>",
            styled_paragraph("Heading1", "Title"),
            text_run("Some "),
            text_run(" text."),
        );
        let bytes = package(&[
            ("word/document.xml", document(&body).as_bytes()),
            (
                "word/styles.xml",
                styles(r#"<w:style w:type="paragraph" w:styleId="Heading1"><w:name w:val="heading 1"/><w:basedOn w:val="Normal"/><w:pPr><w:outlineLvl w:val="0"/></w:pPr></w:style>"#)
                    .as_bytes(),
            ),
        ]);
        let doc = parse(&bytes);
        assert_eq!(doc.elements.len(), 2);
        match &doc.elements[0] {
            IntermediateElement::Heading(h) => {
                assert_eq!(h.level, 1);
                assert_eq!(h.text, "Title");
                assert_eq!(h.style_name.as_deref(), Some("heading 1"));
            }
            other => panic!("expected heading, got {other:?}"),
        }
        match &doc.elements[1] {
            IntermediateElement::Paragraph(p) => {
                assert_eq!(p.text, "Some bold text.");
                assert_eq!(p.formatting, vec![FormattingSpan::new(5, 4, FormattingKind::Bold)]);
            }
            other => panic!("expected paragraph, got {other:?}"),
        }
    }

    #[test]
    fn bold_numbered_line_becomes_level_two_heading() {
        let body = r#"<w:p><w:r><w:rPr><w:b/><w:sz w:val="22"/></w:rPr><w:t>2.1 Methods</w:t></w:r></w:p>"#;
        let doc = parse(&simple(body));
        match &doc.elements[0] {
            IntermediateElement::Heading(h) => {
                assert_eq!(h.level, 2);
                assert_eq!(h.text, "2.1 Methods");
            }
            other => panic!("expected heading, got {other:?}"),
        }
    }

    #[test]
    fn monospace_paragraphs_merge_into_one_code_block() {
        let code = |line: &str| {
            format!(
                r#"<w:p><w:r><w:rPr><w:rFonts w:ascii="Consolas"/></w:rPr><w:t xml:space="preserve">{line}</w:t></w:r></w:p>"#
            )
        };
        let body = format!(
            "{}{}{}<w:p>{}</w:p>",
            code("fn main() {"),
            code("    run();"),
            code("}"),
            text_run("After.")
        );
        let doc = parse(&simple(&body));
        assert_eq!(doc.elements.len(), 2);
        match &doc.elements[0] {
            IntermediateElement::CodeBlock(block) => {
                assert_eq!(block.code, "fn main() {\n    run();\n}");
            }
            other => panic!("expected code block, got {other:?}"),
        }
        assert_eq!(doc.elements[1].order(), 1);
    }

    #[test]
    fn blank_code_paragraphs_keep_their_lines() {
        let blank = r#"<w:p><w:pPr><w:pStyle w:val="Code"/></w:pPr></w:p>"#;
        let body = format!(
            "{}{blank}{}{blank}<w:p>{}</w:p>",
            styled_paragraph("Code", "use std::io;"),
            styled_paragraph("Code", "fn main() {}"),
            text_run("After.")
        );
        let doc = parse(&simple(&body));
        assert_eq!(doc.elements.len(), 2);
        match &doc.elements[0] {
            IntermediateElement::CodeBlock(block) => {
                assert_eq!(block.code, "use std::io;\n\nfn main() {}");
            }
            other => panic!("expected code block, got {other:?}"),
        }
    }

    #[test]
    fn blank_paragraph_outside_code_is_ignored() {
        let body = format!(
            "<w:p>{}</w:p>{}",
            text_run("Prose."),
            r#"<w:p><w:pPr><w:pStyle w:val="Code"/></w:pPr></w:p>"#
        );
        let doc = parse(&simple(&body));
        assert_eq!(doc.elements.len(), 1);
    }

    #[test]
    fn huge_extents_saturate() {
        assert_eq!(emu_to_px(914_400), 96);
        assert_eq!(emu_to_px(u64::MAX), u32::MAX);
    }

    #[test]
    fn list_items_use_numbering_definitions() {
        let item = |num: &str, ilvl: &str, text: &str| {
            format!(
                r#"<w:p><w:pPr><w:numPr><w:ilvl w:val="{ilvl}"/><w:numId w:val="{num}"/></w:numPr></w:pPr>{}</w:p>"#,
                text_run(text)
            )
        };
        let body = format!(
            "{}{}{}",
            item("1", "0", "bullet"),
            item("1", "1", "numbered"),
            item("7", "0", "orphan")
        );
        let numbering = format!(
            r#"<w:numbering {}><w:abstractNum w:abstractNumId="0"><w:lvl w:ilvl="0"><w:numFmt w:val="bullet"/></w:lvl><w:lvl w:ilvl="1"><w:numFmt w:val="decimal"/></w:lvl></w:abstractNum><w:num w:numId="1"><w:abstractNumId w:val="0"/></w:num></w:numbering>"#,
            super::super::testing::NAMESPACES
        );
        let bytes = package(&[
            ("word/document.xml", document(&body).as_bytes()),
            ("word/numbering.xml", numbering.as_bytes()),
        ]);
        let doc = parse(&bytes);
        let items: Vec<(u8, bool)> = doc
            .elements
            .iter()
            .filter_map(|e| match e {
                IntermediateElement::ListItem(item) => Some((item.level, item.ordered)),
                _ => None,
            })
            .collect();
        assert_eq!(items, vec![(0, false), (1, true), (0, false)]);
        assert_eq!(doc.warnings.len(), 1);
        assert_eq!(doc.warnings[0].kind, WarningKind::MissingReference);
    }

    #[test]
    fn tables_keep_spans_merges_and_header() {
        let cell = |props: &str, text: &str| {
            format!(r#"<w:tc><w:tcPr>{props}</w:tcPr><w:p>{}</w:p></w:tc>"#, text_run(text))
        };
        let body = format!(
            r#"<w:tbl><w:tr><w:trPr><w:tblHeader/></w:trPr>{}{}</w:tr><w:tr>{}{}{}</w:tr><w:tr>{}{}{}</w:tr></w:tbl>"#,
            cell(r#"<w:gridSpan w:val="2"/>"#, "Wide"),
            cell("", "C"),
            cell(r#"<w:vMerge w:val="restart"/>"#, "a"),
            cell("", "b"),
            cell("", "c"),
            cell("<w:vMerge/>", ""),
            cell("", "e"),
            cell("", "f"),
        );
        let doc = parse(&simple(&body));
        let IntermediateElement::Table(table) = &doc.elements[0] else {
            panic!("expected table");
        };
        assert!(table.has_header_row);
        assert_eq!(table.rows[0].cells[0].col_span, 2);
        assert!(table.rows[0].cells[0].header);
        assert!(!table.rows[1].cells[0].merged_continue);
        assert!(table.rows[2].cells[0].merged_continue);
        assert_eq!(table.column_count(), 3);
    }

    fn drawing(rel: &str) -> String {
        format!(
            r#"<w:p><w:r><w:drawing><wp:inline><wp:extent cx="952500" cy="476250"/><wp:docPr id="1" name="Picture 1" descr="A chart"/><a:graphic><a:graphicData><pic:pic><pic:blipFill><a:blip r:embed="{rel}"/></pic:blipFill></pic:pic></a:graphicData></a:graphic></wp:inline></w:drawing></w:r></w:p>"#
        )
    }

    #[test]
    fn images_resolve_through_relationships() {
        let body = format!("{}{}", drawing("rId5"), styled_paragraph("Caption", "Figure 1: Growth"));
        let rels = relationships(&[("rId5", "image", "media/image1.png")]);
        let bytes = package(&[
            ("word/document.xml", document(&body).as_bytes()),
            ("word/_rels/document.xml.rels", rels.as_bytes()),
            ("word/media/image1.png", b"\x89PNG fake"),
        ]);
        let doc = parse(&bytes);
        assert_eq!(doc.elements.len(), 1);
        let IntermediateElement::Image(image) = &doc.elements[0] else {
            panic!("expected image");
        };
        assert_eq!(image.mime_type, "image/png");
        assert_eq!(image.width_px, Some(100));
        assert_eq!(image.height_px, Some(50));
        assert_eq!(image.alt_text, "A chart");
        assert_eq!(image.filename.as_deref(), Some("image1.png"));
        assert_eq!(image.caption.as_deref(), Some("Figure 1: Growth"));
    }

    #[test]
    fn missing_media_drops_the_image_with_a_warning() {
        let rels = relationships(&[("rId5", "image", "media/gone.png")]);
        let bytes = package(&[
            ("word/document.xml", document(&drawing("rId5")).as_bytes()),
            ("word/_rels/document.xml.rels", rels.as_bytes()),
        ]);
        let doc = parse(&bytes);
        assert!(doc.elements.is_empty());
        assert_eq!(doc.warnings[0].kind, WarningKind::ImageExtractionFailed);
        assert_eq!(doc.warnings[0].element_index, Some(0));
    }

    #[test]
    fn notes_comments_and_revisions_follow_their_paragraph() {
        let body = format!(
            r#"<w:p><w:commentRangeStart w:id="0"/>{}<w:r><w:footnoteReference w:id="1"/></w:r><w:ins w:id="9" w:author="Ed" w:date="2024-01-01T00:00:00Z">{}</w:ins><w:del w:id="10" w:author="Ed"><w:r><w:delText>old</w:delText></w:r></w:del><w:r><w:commentReference w:id="0"/></w:r></w:p><w:p>{}</w:p>"#,
            text_run("Claim"),
            text_run(" added"),
            text_run("Next"),
        );
        let footnotes = format!(
            r#"<w:footnotes {}><w:footnote w:type="separator" w:id="-1"><w:p/></w:footnote><w:footnote w:id="1"><w:p>{}</w:p></w:footnote></w:footnotes>"#,
            super::super::testing::NAMESPACES,
            text_run("Source.")
        );
        let comments = format!(
            r#"<w:comments {}><w:comment w:id="0" w:author="Rev"><w:p>{}</w:p></w:comment></w:comments>"#,
            super::super::testing::NAMESPACES,
            text_run("Cite this")
        );
        let bytes = package(&[
            ("word/document.xml", document(&body).as_bytes()),
            ("word/footnotes.xml", footnotes.as_bytes()),
            ("word/comments.xml", comments.as_bytes()),
        ]);
        let doc = parse(&bytes);
        let kinds: Vec<&str> = doc.elements.iter().map(|e| e.kind_name()).collect();
        assert_eq!(
            kinds,
            vec!["paragraph", "footnote", "comment", "track_change", "track_change", "paragraph"]
        );
        let IntermediateElement::Paragraph(p) = &doc.elements[0] else {
            panic!("expected paragraph");
        };
        assert_eq!(p.text, "Claim added");
        let IntermediateElement::TrackChange(deletion) = &doc.elements[4] else {
            panic!("expected track change");
        };
        assert_eq!(deletion.kind, ChangeKind::Deletion);
        assert_eq!(deletion.text, "old");
        assert_eq!(deletion.revision_id.as_deref(), Some("10"));
    }

    #[test]
    fn headers_come_first_and_footers_last() {
        let body = format!(
            r#"<w:p>{}</w:p><w:sectPr><w:headerReference w:type="default" r:id="rId1"/><w:footerReference w:type="first" r:id="rId2"/></w:sectPr>"#,
            text_run("Body")
        );
        let header = format!(r#"<w:hdr {}><w:p>{}</w:p></w:hdr>"#, super::super::testing::NAMESPACES, text_run("Running head"));
        let footer = format!(r#"<w:ftr {}><w:p>{}</w:p></w:ftr>"#, super::super::testing::NAMESPACES, text_run("Page foot"));
        let rels = relationships(&[("rId1", "header", "header1.xml"), ("rId2", "footer", "footer1.xml")]);
        let bytes = package(&[
            ("word/document.xml", document(&body).as_bytes()),
            ("word/_rels/document.xml.rels", rels.as_bytes()),
            ("word/header1.xml", header.as_bytes()),
            ("word/footer1.xml", footer.as_bytes()),
        ]);
        let doc = parse(&bytes);
        let kinds: Vec<&str> = doc.elements.iter().map(|e| e.kind_name()).collect();
        assert_eq!(kinds, vec!["header", "paragraph", "footer"]);
        let IntermediateElement::Footer(footer) = &doc.elements[2] else {
            panic!("expected footer");
        };
        assert_eq!(footer.kind, HeaderFooterKind::First);
        assert_eq!(footer.text, "Page foot");
    }

    #[test]
    fn table_of_contents_entries_split_page_numbers() {
        let entry = |style: &str, text: &str| {
            format!(r#"<w:p><w:pPr><w:pStyle w:val="{style}"/></w:pPr><w:r><w:t>{text}</w:t></w:r><w:r><w:tab/></w:r><w:r><w:t>3</w:t></w:r></w:p>"#)
        };
        let body = format!(
            r#"<w:sdt><w:sdtPr><w:docPartObj><w:docPartGallery w:val="Table of Contents"/></w:docPartObj></w:sdtPr><w:sdtContent>{}{}{}</w:sdtContent></w:sdt>"#,
            styled_paragraph("TOCHeading", "Contents"),
            entry("TOC1", "Introduction"),
            entry("TOC2", "Scope"),
        );
        let doc = parse(&simple(&body));
        let IntermediateElement::TableOfContents(toc) = &doc.elements[0] else {
            panic!("expected table of contents");
        };
        assert_eq!(toc.entries.len(), 2);
        assert_eq!(toc.entries[1].level, 2);
        assert_eq!(toc.entries[1].text, "Scope");
        assert_eq!(toc.entries[1].page.as_deref(), Some("3"));
    }

    #[test]
    fn equations_keep_native_markup() {
        let body = format!(
            r#"<w:p><m:oMathPara><m:oMath><m:r><m:t>x</m:t></m:r></m:oMath></m:oMathPara></w:p><w:p>{}<m:oMath><m:r><m:t>y</m:t></m:r></m:oMath></w:p>"#,
            text_run("where")
        );
        let doc = parse_docx(&simple(&body), &ParseOptions::default(), &NullConverter).unwrap();
        let kinds: Vec<&str> = doc.elements.iter().map(|e| e.kind_name()).collect();
        assert_eq!(kinds, vec!["equation", "paragraph", "equation"]);
        let IntermediateElement::Equation(display) = &doc.elements[0] else {
            panic!("expected equation");
        };
        assert!(display.display);
        assert!(display.latex.is_none());
        assert!(display.conversion_error.is_some());
        assert!(display.native.as_deref().unwrap().starts_with("<m:oMathPara"));
        let IntermediateElement::Equation(inline) = &doc.elements[2] else {
            panic!("expected equation");
        };
        assert!(!inline.display);

        let converted = parse(&simple(&body));
        let IntermediateElement::Equation(display) = &converted.elements[0] else {
            panic!("expected equation");
        };
        assert_eq!(display.latex.as_deref(), Some("x"));
    }

    #[test]
    fn page_break_follows_the_paragraph() {
        let body = format!(r#"<w:p>{}<w:r><w:br w:type="page"/></w:r></w:p><w:p>{}</w:p>"#, text_run("End"), text_run("Start"));
        let doc = parse(&simple(&body));
        let kinds: Vec<&str> = doc.elements.iter().map(|e| e.kind_name()).collect();
        assert_eq!(kinds, vec!["paragraph", "page_break", "paragraph"]);
    }

    #[test]
    fn leading_bold_label_makes_a_theorem() {
        let body = format!(
            r#"<w:p><w:r><w:rPr><w:b/></w:rPr><w:t xml:space="preserve">Lemma 3. </w:t></w:r>{}</w:p>"#,
            text_run("Every bounded sequence converges.")
        );
        let doc = parse(&simple(&body));
        let IntermediateElement::Theorem(theorem) = &doc.elements[0] else {
            panic!("expected theorem");
        };
        assert_eq!(theorem.kind, "lemma");
        assert_eq!(theorem.text, "Every bounded sequence converges.");
        assert!(theorem.formatting.is_empty());
    }

    #[test]
    fn style_roles_classify_blocks() {
        let body = format!(
            "{}{}{}",
            styled_paragraph("Abstract", "We study folds."),
            styled_paragraph("Quote", "To be."),
            styled_paragraph("Bibliography", "[1] Knuth, The Art."),
        );
        let doc = parse(&simple(&body));
        let kinds: Vec<&str> = doc.elements.iter().map(|e| e.kind_name()).collect();
        assert_eq!(kinds, vec!["abstract", "blockquote", "bibliography_entry"]);
        let IntermediateElement::BibliographyEntry(entry) = &doc.elements[2] else {
            panic!("expected bibliography entry");
        };
        assert_eq!(entry.key.as_deref(), Some("1"));
        assert_eq!(entry.text, "Knuth, The Art.");
    }

    #[test]
    fn core_properties_supply_the_title() {
        let core = r#"<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/"><dc:title>Quarterly</dc:title><dc:creator>Ada</dc:creator></cp:coreProperties>"#;
        let bytes = package(&[
            ("word/document.xml", document("").as_bytes()),
            ("docProps/core.xml", core.as_bytes()),
        ]);
        let doc = parse(&bytes);
        assert_eq!(doc.title.as_deref(), Some("Quarterly"));
        assert_eq!(doc.metadata.get("creator").map(String::as_str), Some("Ada"));
    }

    #[test]
    fn whole_file_failures_are_errors() {
        let options = ParseOptions::default();
        assert!(matches!(
            parse_docx(b"plain text", &options, &OmmlConverter),
            Err(FormatError::CorruptPackage(_))
        ));
        let no_document = package(&[("word/styles.xml", b"<x/>")]);
        assert!(matches!(
            parse_docx(&no_document, &options, &OmmlConverter),
            Err(FormatError::CorruptPackage(_))
        ));
        let broken = package(&[("word/document.xml", b"<w:document><unclosed>")]);
        assert!(matches!(
            parse_docx(&broken, &options, &OmmlConverter),
            Err(FormatError::ParseError(_))
        ));
    }

    #[test]
    fn extraction_toggles_skip_extras() {
        let options = ParseOptions {
            extract_images: false,
            extract_track_changes: false,
            ..Default::default()
        };
        let body = format!(
            r#"{}<w:p><w:ins w:id="1">{}</w:ins></w:p>"#,
            drawing("rId5"),
            text_run("new")
        );
        let doc = parse_docx(&simple(&body), &options, &OmmlConverter).unwrap();
        let kinds: Vec<&str> = doc.elements.iter().map(|e| e.kind_name()).collect();
        assert_eq!(kinds, vec!["paragraph"]);
        assert!(doc.warnings.is_empty());
    }
}
