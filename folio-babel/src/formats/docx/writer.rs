//! Word-processing package export (document tree → `.docx`)
//!
//! Sections become heading paragraphs and every block becomes one or more
//! body elements. Block content is markup, so inline formatting is recovered
//! with [`parse_markup`] and mapped back onto run properties.

use crate::error::FormatError;
use crate::formats::latex::scan::{find_command, group, optional, split_top_level};
use crate::ir::{FormattingKind, StyledText};
use crate::markup::{environment_body, parse_markup};
use crate::media::{extension_for_mime, ImageCodec, RasterCodec};
use crate::tree::{Asset, Block, BlockType, Document, Section};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::{Cursor, Write};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
const R_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const PKG_REL_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const WP_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing";
const A_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const PIC_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/picture";

const EMU_PER_INCH: u64 = 914_400;
const EMU_PER_PX: u64 = EMU_PER_INCH / 96;
const DEFAULT_IMAGE_PX: (u32, u32) = (480, 360);
const MAX_HEADING: usize = 9;
const HEADER_FILL: &str = "D9D9D9";

/// Highlight names a run may carry directly; anything else becomes shading.
const HIGHLIGHTS: &[&str] = &[
    "yellow",
    "green",
    "cyan",
    "magenta",
    "blue",
    "red",
    "darkBlue",
    "darkCyan",
    "darkGreen",
    "darkMagenta",
    "darkRed",
    "darkYellow",
    "darkGray",
    "lightGray",
    "black",
    "white",
];

/// Serialize a document tree as a `.docx` package.
pub fn write_docx(doc: &Document) -> Result<Vec<u8>, FormatError> {
    let mut writer = DocxWriter::new(doc);
    if !doc.title.trim().is_empty() {
        writer.paragraph("Title", "", &plain_runs(&doc.title));
    }
    for section in &doc.sections {
        writer.section(section, 1);
    }
    writer.package(doc)
}

struct PagePart {
    kind: String,
    paragraphs: Vec<String>,
}

#[derive(Default)]
struct DocxWriter {
    body: String,
    /// `(id, type, target)` for `word/_rels/document.xml.rels`.
    relationships: Vec<(String, &'static str, String)>,
    media: Vec<(String, Vec<u8>)>,
    media_by_hash: HashMap<String, String>,
    extensions: BTreeSet<(&'static str, String)>,
    headers: Vec<PagePart>,
    footers: Vec<PagePart>,
    /// Headings for a generated table of contents: `(level, title)`.
    outline: Vec<(usize, String)>,
    next_drawing: usize,
}

impl DocxWriter {
    fn new(doc: &Document) -> Self {
        fn visit(section: &Section, depth: usize, out: &mut Vec<(usize, String)>) {
            if section.level > 0 {
                out.push((depth.min(MAX_HEADING), section.title.clone()));
            }
            for child in &section.children {
                visit(child, depth + 1, out);
            }
        }
        let mut outline = Vec::new();
        for section in &doc.sections {
            visit(section, 1, &mut outline);
        }
        Self {
            relationships: vec![
                ("rId1".to_string(), "styles", "styles.xml".to_string()),
                ("rId2".to_string(), "numbering", "numbering.xml".to_string()),
            ],
            outline,
            ..Default::default()
        }
    }

    fn next_relationship(&mut self, kind: &'static str, target: String) -> String {
        let id = format!("rId{}", self.relationships.len() + 1);
        self.relationships.push((id.clone(), kind, target));
        id
    }

    fn paragraph(&mut self, style: &str, properties: &str, runs: &str) {
        self.body.push_str(&paragraph_xml(style, properties, runs));
    }

    fn section(&mut self, section: &Section, depth: usize) {
        if section.level > 0 {
            let style = format!("Heading{}", depth.min(MAX_HEADING));
            self.paragraph(&style, "", &plain_runs(&section.title));
        }
        for block in &section.blocks {
            self.block(block);
        }
        for child in &section.children {
            self.section(child, depth + 1);
        }
    }

    fn block(&mut self, block: &Block) {
        let content = block.content.as_str();
        match block.block_type {
            BlockType::Paragraph => self.paragraph("Normal", "", &styled_runs(&parse_markup(content))),
            BlockType::Equation => {
                let text = match (block.attribute("fallback"), equation_latex(content)) {
                    (None, Some(latex)) => format!("[{latex}]"),
                    _ => "[Equation]".to_string(),
                };
                let runs = run_xml(&text, "<w:i/>");
                let properties = if block.attribute("display") == Some("false") {
                    ""
                } else {
                    r#"<w:jc w:val="center"/>"#
                };
                self.paragraph("Normal", properties, &runs);
            }
            BlockType::Code => {
                let code = environment_text(content, "lstlisting").unwrap_or(content);
                for line in code.lines() {
                    let runs = run_xml(
                        line,
                        r#"<w:rFonts w:ascii="Courier New" w:hAnsi="Courier New" w:cs="Courier New"/>"#,
                    );
                    self.paragraph("Code", "", &runs);
                }
            }
            BlockType::ListItem => {
                let text = content.strip_prefix("\\item").unwrap_or(content).trim_start();
                let num_id = if block.attribute("ordered") == Some("true") { 2 } else { 1 };
                let level = block
                    .attribute("level")
                    .and_then(|l| l.parse::<u8>().ok())
                    .unwrap_or(0)
                    .min(8);
                let properties = format!(
                    r#"<w:numPr><w:ilvl w:val="{level}"/><w:numId w:val="{num_id}"/></w:numPr>"#
                );
                self.paragraph("ListParagraph", &properties, &styled_runs(&parse_markup(text)));
            }
            BlockType::Table => self.table(content),
            BlockType::Figure => self.figure(block),
            BlockType::Abstract => {
                let text = environment_text(content, "abstract").unwrap_or(content);
                self.paragraph("Abstract", "", &styled_runs(&parse_markup(text)));
            }
            BlockType::Blockquote => {
                let text = environment_text(content, "quote").unwrap_or(content);
                self.paragraph(
                    "Quote",
                    r#"<w:pBdr><w:left w:val="single" w:sz="12" w:space="8" w:color="A6A6A6"/></w:pBdr><w:ind w:left="720"/>"#,
                    &styled_runs(&parse_markup(text)),
                );
            }
            BlockType::Theorem => self.theorem(block),
            BlockType::Bibliography => {
                let (key, text) = bibitem(content);
                let entry = match key {
                    Some(key) => format!("[{key}] {}", parse_markup(text).text),
                    None => parse_markup(text).text,
                };
                self.paragraph("Bibliography", "", &plain_runs(entry.trim()));
            }
            BlockType::PageBreak => self
                .body
                .push_str(r#"<w:p><w:r><w:br w:type="page"/></w:r></w:p>"#),
            BlockType::Header | BlockType::Footer => {
                let kind = block.attribute("kind").unwrap_or("default").to_string();
                let paragraph = paragraph_xml(
                    if block.block_type == BlockType::Header { "Header" } else { "Footer" },
                    "",
                    &styled_runs(&parse_markup(content)),
                );
                let parts = if block.block_type == BlockType::Header {
                    &mut self.headers
                } else {
                    &mut self.footers
                };
                match parts.iter_mut().find(|part| part.kind == kind) {
                    Some(part) => part.paragraphs.push(paragraph),
                    None => parts.push(PagePart {
                        kind,
                        paragraphs: vec![paragraph],
                    }),
                }
            }
            BlockType::Footnote | BlockType::Endnote => {
                let marker = block.attribute("id").unwrap_or("*");
                let mut runs = run_xml(marker, r#"<w:vertAlign w:val="superscript"/>"#);
                runs.push_str(&run_xml(" ", ""));
                runs.push_str(&styled_runs(&parse_markup(content)));
                self.paragraph("FootnoteText", "", &runs);
            }
            BlockType::Comment => {
                let text = parse_markup(content).text;
                let text = match block.attribute("author") {
                    Some(author) => format!("{author}: {text}"),
                    None => text,
                };
                self.paragraph("CommentText", "", &plain_runs(&text));
            }
            BlockType::TrackChange => self.track_change(block),
            BlockType::TableOfContents => self.table_of_contents(),
        }
    }

    fn theorem(&mut self, block: &Block) {
        let kind = block.attribute("kind").unwrap_or("theorem");
        let (title, text) = environment_parts(&block.content, kind)
            .unwrap_or((None, block.content.as_str()));
        let mut label = capitalize(kind);
        if let Some(title) = title {
            label.push_str(&format!(" ({})", parse_markup(title).text));
        }
        label.push_str(". ");
        let mut runs = run_xml(&label, "<w:b/>");
        runs.push_str(&styled_runs(&parse_markup(text)));
        self.paragraph("Normal", "", &runs);
    }

    fn track_change(&mut self, block: &Block) {
        let text = parse_markup(&block.content).text;
        let author = xml_escape(block.attribute("author").unwrap_or("Unknown"));
        let id = block.attribute("revision").unwrap_or("0");
        let date = block
            .attribute("date")
            .map(|d| format!(r#" w:date="{}""#, xml_escape(d)))
            .unwrap_or_default();
        let change = if block.attribute("kind") == Some("deletion") {
            format!(
                r#"<w:del w:id="{id}" w:author="{author}"{date}><w:r><w:delText xml:space="preserve">{}</w:delText></w:r></w:del>"#,
                xml_escape(&text)
            )
        } else {
            format!(
                r#"<w:ins w:id="{id}" w:author="{author}"{date}>{}</w:ins>"#,
                run_xml(&text, "")
            )
        };
        self.paragraph("Normal", "", &change);
    }

    fn table_of_contents(&mut self) {
        let mut content = paragraph_xml("TOCHeading", "", &plain_runs("Contents"));
        content.push_str(concat!(
            r#"<w:p><w:r><w:fldChar w:fldCharType="begin"/></w:r>"#,
            r#"<w:r><w:instrText xml:space="preserve"> TOC \o "1-3" \h \z \u </w:instrText></w:r>"#,
            r#"<w:r><w:fldChar w:fldCharType="separate"/></w:r></w:p>"#,
        ));
        for (level, title) in &self.outline {
            content.push_str(&paragraph_xml(&format!("TOC{level}"), "", &plain_runs(title)));
        }
        content.push_str(r#"<w:p><w:r><w:fldChar w:fldCharType="end"/></w:r></w:p>"#);
        self.body.push_str(&format!(
            r#"<w:sdt><w:sdtPr><w:docPartObj><w:docPartGallery w:val="Table of Contents"/><w:docPartUnique/></w:docPartObj></w:sdtPr><w:sdtContent>{content}</w:sdtContent></w:sdt>"#
        ));
    }

    fn table(&mut self, content: &str) {
        let table = parse_table(content);
        if table.rows.is_empty() {
            debug!("table block without rows skipped");
            return;
        }
        let columns = table
            .rows
            .iter()
            .map(|row| row.iter().map(|cell| cell.span).sum::<usize>())
            .max()
            .unwrap_or(1)
            .max(1);

        let borders: String = ["top", "left", "bottom", "right", "insideH", "insideV"]
            .iter()
            .map(|edge| format!(r#"<w:{edge} w:val="single" w:sz="4" w:space="0" w:color="auto"/>"#))
            .collect();
        let mut out = format!(
            r#"<w:tbl><w:tblPr><w:tblW w:w="0" w:type="auto"/><w:tblBorders>{borders}</w:tblBorders><w:tblLook w:firstRow="{}" w:noHBand="0" w:noVBand="1"/></w:tblPr><w:tblGrid>"#,
            u8::from(table.header)
        );
        for _ in 0..columns {
            out.push_str(r#"<w:gridCol w:w="2000"/>"#);
        }
        out.push_str("</w:tblGrid>");

        for (index, row) in table.rows.iter().enumerate() {
            let header = table.header && index == 0;
            out.push_str("<w:tr>");
            if header {
                out.push_str("<w:trPr><w:tblHeader/></w:trPr>");
            }
            for cell in row {
                let mut props = String::new();
                if cell.span > 1 {
                    props.push_str(&format!(r#"<w:gridSpan w:val="{}"/>"#, cell.span));
                }
                if header {
                    props.push_str(&format!(
                        r#"<w:shd w:val="clear" w:color="auto" w:fill="{HEADER_FILL}"/>"#
                    ));
                }
                let runs = styled_runs(&cell.text);
                out.push_str(&format!(
                    "<w:tc><w:tcPr>{props}</w:tcPr><w:p>{runs}</w:p></w:tc>"
                ));
            }
            out.push_str("</w:tr>");
        }
        out.push_str("</w:tbl>");
        self.body.push_str(&out);

        if let Some(caption) = table.caption {
            self.paragraph("Caption", "", &plain_runs(&caption));
        }
    }

    fn figure(&mut self, block: &Block) {
        let Some(asset) = block.assets.first() else {
            debug!(block = block.id, "figure without an asset skipped");
            return;
        };
        let rel_id = self.media_relationship(asset);
        let (width, height) = match (asset.width, asset.height) {
            (Some(w), Some(h)) => (w, h),
            _ => RasterCodec.probe(&asset.bytes).unwrap_or(DEFAULT_IMAGE_PX),
        };
        let (cx, cy) = figure_extent(&block.content, width, height);
        self.next_drawing += 1;
        let n = self.next_drawing;
        let caption = find_command(&block.content, "caption")
            .and_then(|at| group(&block.content, at + "\\caption".len()))
            .map(|(text, _)| parse_markup(text).text);
        let descr = xml_escape(caption.as_deref().unwrap_or_default());
        let name = xml_escape(&asset.filename);

        let drawing = format!(
            concat!(
                r#"<w:r><w:drawing><wp:inline distT="0" distB="0" distL="0" distR="0">"#,
                r#"<wp:extent cx="{cx}" cy="{cy}"/><wp:docPr id="{n}" name="Picture {n}" descr="{descr}"/>"#,
                r#"<a:graphic xmlns:a="{a}"><a:graphicData uri="http://schemas.openxmlformats.org/drawingml/2006/picture">"#,
                r#"<pic:pic xmlns:pic="{pic}"><pic:nvPicPr><pic:cNvPr id="{n}" name="{name}"/><pic:cNvPicPr/></pic:nvPicPr>"#,
                r#"<pic:blipFill><a:blip r:embed="{rel}"/><a:stretch><a:fillRect/></a:stretch></pic:blipFill>"#,
                r#"<pic:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm><a:prstGeom prst="rect"><a:avLst/></a:prstGeom></pic:spPr>"#,
                r#"</pic:pic></a:graphicData></a:graphic></wp:inline></w:drawing></w:r>"#,
            ),
            cx = cx,
            cy = cy,
            n = n,
            descr = descr,
            name = name,
            a = A_NS,
            pic = PIC_NS,
            rel = rel_id,
        );
        self.paragraph("Normal", r#"<w:jc w:val="center"/>"#, &drawing);
        if let Some(caption) = caption.filter(|c| !c.trim().is_empty()) {
            self.paragraph("Caption", "", &plain_runs(&caption));
        }
    }

    /// Relationship id for an asset's media part; identical bytes share one part.
    fn media_relationship(&mut self, asset: &Asset) -> String {
        if let Some(id) = self.media_by_hash.get(&asset.hash) {
            return id.clone();
        }
        let extension = extension_for_mime(&asset.mime_type);
        let name = format!("image{}.{extension}", self.media.len() + 1);
        self.media.push((format!("word/media/{name}"), asset.bytes.clone()));
        self.extensions.insert((extension, asset.mime_type.clone()));
        let id = self.next_relationship("image", format!("media/{name}"));
        self.media_by_hash.insert(asset.hash.clone(), id.clone());
        id
    }

    fn package(mut self, doc: &Document) -> Result<Vec<u8>, FormatError> {
        let mut parts: Vec<(String, Vec<u8>)> = Vec::new();
        let mut overrides: Vec<(String, &str)> = vec![
            (
                "/word/document.xml".to_string(),
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml",
            ),
            (
                "/word/styles.xml".to_string(),
                "application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml",
            ),
            (
                "/word/numbering.xml".to_string(),
                "application/vnd.openxmlformats-officedocument.wordprocessingml.numbering+xml",
            ),
            (
                "/docProps/core.xml".to_string(),
                "application/vnd.openxmlformats-package.core-properties+xml",
            ),
        ];

        let mut references = String::new();
        let mut title_page = false;
        for (tag, root, parts_of_kind) in [
            ("header", "hdr", std::mem::take(&mut self.headers)),
            ("footer", "ftr", std::mem::take(&mut self.footers)),
        ] {
            for (index, part) in parts_of_kind.into_iter().enumerate() {
                let file = format!("{tag}{}.xml", index + 1);
                let kind: &'static str = match part.kind.as_str() {
                    "first" => "first",
                    "even" => "even",
                    _ => "default",
                };
                title_page |= kind == "first";
                let id = self.next_relationship(if tag == "header" { "header" } else { "footer" }, file.clone());
                references.push_str(&format!(
                    r#"<w:{tag}Reference w:type="{kind}" r:id="{id}"/>"#
                ));
                let xml = format!(
                    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:{root} xmlns:w="{W_NS}" xmlns:r="{R_NS}">{}</w:{root}>"#,
                    part.paragraphs.concat()
                );
                overrides.push((
                    format!("/word/{file}"),
                    if tag == "header" {
                        "application/vnd.openxmlformats-officedocument.wordprocessingml.header+xml"
                    } else {
                        "application/vnd.openxmlformats-officedocument.wordprocessingml.footer+xml"
                    },
                ));
                parts.push((format!("word/{file}"), xml.into_bytes()));
            }
        }

        let section = format!(
            r#"<w:sectPr>{references}<w:pgSz w:w="12240" w:h="15840"/><w:pgMar w:top="1440" w:right="1440" w:bottom="1440" w:left="1440" w:header="720" w:footer="720" w:gutter="0"/>{}</w:sectPr>"#,
            if title_page { "<w:titlePg/>" } else { "" }
        );
        let document = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="{W_NS}" xmlns:r="{R_NS}" xmlns:wp="{WP_NS}" xmlns:a="{A_NS}" xmlns:pic="{PIC_NS}"><w:body>{}{section}</w:body></w:document>"#,
            self.body
        );

        let mut defaults = vec![
            (
                "rels".to_string(),
                "application/vnd.openxmlformats-package.relationships+xml".to_string(),
            ),
            ("xml".to_string(), "application/xml".to_string()),
        ];
        defaults.extend(
            self.extensions
                .iter()
                .map(|(ext, mime)| (ext.to_string(), mime.clone())),
        );

        let mut files: Vec<(String, Vec<u8>)> = vec![
            (
                "[Content_Types].xml".to_string(),
                content_types(&defaults, &overrides).into_bytes(),
            ),
            ("_rels/.rels".to_string(), ROOT_RELS.as_bytes().to_vec()),
            ("docProps/core.xml".to_string(), core_xml(&doc.title).into_bytes()),
            ("word/document.xml".to_string(), document.into_bytes()),
            ("word/styles.xml".to_string(), styles_xml().into_bytes()),
            ("word/numbering.xml".to_string(), numbering_xml().into_bytes()),
            (
                "word/_rels/document.xml.rels".to_string(),
                document_rels(&self.relationships).into_bytes(),
            ),
        ];
        files.extend(parts);
        files.extend(self.media);

        debug!(parts = files.len(), "writing docx package");
        zip_parts(files)
    }
}

fn zip_parts(files: Vec<(String, Vec<u8>)>) -> Result<Vec<u8>, FormatError> {
    let failed = |e: &dyn std::fmt::Display| FormatError::SerializationError(e.to_string());
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, bytes) in files {
        zip.start_file(name, options).map_err(|e| failed(&e))?;
        zip.write_all(&bytes).map_err(|e| failed(&e))?;
    }
    let cursor = zip.finish().map_err(|e| failed(&e))?;
    Ok(cursor.into_inner())
}

fn paragraph_xml(style: &str, properties: &str, runs: &str) -> String {
    format!(r#"<w:p><w:pPr><w:pStyle w:val="{style}"/>{properties}</w:pPr>{runs}</w:p>"#)
}

/// One run; newlines and tabs become breaks and tab stops.
fn run_xml(text: &str, properties: &str) -> String {
    fn flush(out: &mut String, pending: &mut String) {
        if !pending.is_empty() {
            out.push_str(&format!(
                r#"<w:t xml:space="preserve">{}</w:t>"#,
                xml_escape(pending)
            ));
            pending.clear();
        }
    }

    let mut out = String::from("<w:r>");
    if !properties.is_empty() {
        out.push_str(&format!("<w:rPr>{properties}</w:rPr>"));
    }
    let mut pending = String::new();
    for ch in text.chars() {
        match ch {
            '\n' => {
                flush(&mut out, &mut pending);
                out.push_str("<w:br/>");
            }
            '\t' => {
                flush(&mut out, &mut pending);
                out.push_str("<w:tab/>");
            }
            _ => pending.push(ch),
        }
    }
    flush(&mut out, &mut pending);
    out.push_str("</w:r>");
    out
}

fn plain_runs(text: &str) -> String {
    run_xml(text, "")
}

/// Runs for styled text: the text is cut at every span boundary and each
/// piece carries the properties of the spans covering it.
fn styled_runs(text: &StyledText) -> String {
    let chars: Vec<char> = text.text.chars().collect();
    let mut cuts: BTreeSet<usize> = BTreeSet::from([0, chars.len()]);
    for span in &text.spans {
        cuts.insert(span.start.min(chars.len()));
        cuts.insert(span.end().min(chars.len()));
    }
    let cuts: Vec<usize> = cuts.into_iter().collect();

    let mut out = String::new();
    for pair in cuts.windows(2) {
        let (start, end) = (pair[0], pair[1]);
        if start >= end {
            continue;
        }
        let kinds: Vec<&FormattingKind> = text
            .spans
            .iter()
            .filter(|span| span.start <= start && span.end() >= end)
            .map(|span| &span.kind)
            .collect();
        let piece: String = chars[start..end].iter().collect();
        out.push_str(&run_xml(&piece, &run_properties(&kinds)));
    }
    out
}

/// `w:rPr` children for a set of formatting kinds, in schema order.
fn run_properties(kinds: &[&FormattingKind]) -> String {
    let mut fonts = None;
    let mut color = None;
    let mut size = None;
    let mut highlight = None;
    let mut shading = None;
    let (mut bold, mut italic, mut underline, mut strike) = (false, false, false, false);
    let mut vert_align = None;

    for kind in kinds {
        match kind {
            FormattingKind::Bold => bold = true,
            FormattingKind::Italic | FormattingKind::Math => italic = true,
            FormattingKind::Underline => underline = true,
            FormattingKind::Strikethrough => strike = true,
            FormattingKind::Superscript => vert_align = Some("superscript"),
            FormattingKind::Subscript => vert_align = Some("subscript"),
            FormattingKind::FontColor(value) => {
                color = Some(value.trim_start_matches('#').to_ascii_uppercase())
            }
            FormattingKind::FontSize(value) => {
                size = value
                    .trim()
                    .parse::<f32>()
                    .ok()
                    .map(|pt| (pt * 2.0).round() as u32)
            }
            FormattingKind::FontFamily(value) => fonts = Some(xml_escape(value)),
            FormattingKind::Highlight(value) => {
                match HIGHLIGHTS.iter().find(|h| h.eq_ignore_ascii_case(value)) {
                    Some(name) => highlight = Some(*name),
                    None => shading = Some(value.trim_start_matches('#').to_ascii_uppercase()),
                }
            }
        }
    }

    let mut out = String::new();
    if let Some(font) = fonts {
        out.push_str(&format!(
            r#"<w:rFonts w:ascii="{font}" w:hAnsi="{font}" w:cs="{font}"/>"#
        ));
    }
    if bold {
        out.push_str("<w:b/>");
    }
    if italic {
        out.push_str("<w:i/>");
    }
    if strike {
        out.push_str("<w:strike/>");
    }
    if let Some(color) = color {
        out.push_str(&format!(r#"<w:color w:val="{}"/>"#, xml_escape(&color)));
    }
    if let Some(size) = size {
        out.push_str(&format!(r#"<w:sz w:val="{size}"/>"#));
    }
    if let Some(highlight) = highlight {
        out.push_str(&format!(r#"<w:highlight w:val="{highlight}"/>"#));
    }
    if underline {
        out.push_str(r#"<w:u w:val="single"/>"#);
    }
    if let Some(fill) = shading {
        out.push_str(&format!(
            r#"<w:shd w:val="clear" w:color="auto" w:fill="{}"/>"#,
            xml_escape(&fill)
        ));
    }
    if let Some(position) = vert_align {
        out.push_str(&format!(r#"<w:vertAlign w:val="{position}"/>"#));
    }
    out
}

/// EMU extent of a figure. A `width=…in` option on `\includegraphics` sets the
/// display width and the height follows the pixel aspect ratio; without one
/// the pixel size is used at 96 dpi.
fn figure_extent(content: &str, width_px: u32, height_px: u32) -> (u64, u64) {
    let fallback = (
        u64::from(width_px) * EMU_PER_PX,
        u64::from(height_px) * EMU_PER_PX,
    );
    let Some(inches) = display_width_inches(content) else {
        return fallback;
    };
    let cx = (inches * EMU_PER_INCH as f64).round() as u64;
    if cx == 0 || width_px == 0 {
        return fallback;
    }
    let cy = (cx as f64 * f64::from(height_px) / f64::from(width_px)).round() as u64;
    (cx, cy)
}

fn display_width_inches(content: &str) -> Option<f64> {
    let at = find_command(content, "includegraphics")?;
    let (options, _) = optional(content, at + "\\includegraphics".len())?;
    options.split(',').find_map(|option| {
        let (key, value) = option.split_once('=')?;
        if key.trim() != "width" {
            return None;
        }
        let inches: f64 = value.trim().strip_suffix("in")?.trim().parse().ok()?;
        (inches.is_finite() && inches > 0.0).then_some(inches)
    })
}

fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            c if (c as u32) < 0x20 && !matches!(c, '\t' | '\n' | '\r') => {}
            c => out.push(c),
        }
    }
    out
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Body of `\begin{env}[options]…\end{env}`, without the options.
fn environment_text<'c>(content: &'c str, env: &str) -> Option<&'c str> {
    environment_parts(content, env).map(|(_, body)| body)
}

/// Optional argument and body of an environment block.
fn environment_parts<'c>(content: &'c str, env: &str) -> Option<(Option<&'c str>, &'c str)> {
    let body = environment_body(content, env)?;
    Some(match optional(body, 0) {
        Some((options, after)) => (Some(options), body[after..].trim_matches('\n')),
        None => (None, body),
    })
}

fn equation_latex(content: &str) -> Option<String> {
    let content = content.trim();
    if let Some(inner) = content
        .strip_prefix('$')
        .and_then(|rest| rest.strip_suffix('$'))
    {
        return Some(inner.trim().to_string());
    }
    if let Some(body) = environment_body(content, "equation") {
        return Some(body.trim().to_string());
    }
    content
        .starts_with("\\begin{")
        .then(|| content.to_string())
}

/// `\bibitem{key} text` → key and text.
fn bibitem(content: &str) -> (Option<&str>, &str) {
    match content.trim_start().strip_prefix("\\bibitem") {
        Some(rest) => match group(rest, 0) {
            Some((key, after)) => (Some(key.trim()), rest[after..].trim_start()),
            None => (None, rest),
        },
        None => (None, content),
    }
}

struct ParsedCell {
    text: StyledText,
    span: usize,
}

#[derive(Default)]
struct ParsedTable {
    rows: Vec<Vec<ParsedCell>>,
    header: bool,
    caption: Option<String>,
}

/// Rows of a `tabular` block. A double rule under the first row marks it as
/// the header.
fn parse_table(content: &str) -> ParsedTable {
    let mut table = ParsedTable {
        caption: find_command(content, "caption")
            .and_then(|at| group(content, at + "\\caption".len()))
            .map(|(text, _)| parse_markup(text).text),
        ..Default::default()
    };
    let Some(begin) = content.find("\\begin{tabular}") else {
        return table;
    };
    let after_begin = begin + "\\begin{tabular}".len();
    let body_start = group(content, after_begin)
        .map(|(_, end)| end)
        .unwrap_or(after_begin);
    let body_end = content[body_start..]
        .find("\\end{tabular}")
        .map(|end| body_start + end)
        .unwrap_or(content.len());

    for chunk in split_top_level(&content[body_start..body_end], "\\\\") {
        let mut row = chunk.trim_start();
        let mut rules = 0;
        while let Some(rest) = row.strip_prefix("\\hline") {
            rules += 1;
            row = rest.trim_start();
        }
        if rules >= 2 && table.rows.len() == 1 {
            table.header = true;
        }
        let row = row.trim();
        if row.is_empty() {
            continue;
        }
        let cells = split_top_level(row, "&")
            .into_iter()
            .map(|cell| parse_cell(cell.trim()))
            .collect();
        table.rows.push(cells);
    }
    table
}

fn parse_cell(raw: &str) -> ParsedCell {
    if let Some(rest) = raw.strip_prefix("\\multicolumn") {
        let spanned = group(rest, 0).and_then(|(count, after)| {
            let (_, after) = group(rest, after)?;
            let (text, _) = group(rest, after)?;
            Some((count.trim().parse::<usize>().unwrap_or(1), text))
        });
        if let Some((span, text)) = spanned {
            return ParsedCell {
                text: parse_markup(text),
                span: span.max(1),
            };
        }
    }
    ParsedCell {
        text: parse_markup(raw),
        span: 1,
    }
}

const ROOT_RELS: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>"#,
    r#"<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/>"#,
    r#"</Relationships>"#,
);

fn content_types(defaults: &[(String, String)], overrides: &[(String, &str)]) -> String {
    let mut out = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
    );
    for (extension, mime) in defaults {
        out.push_str(&format!(
            r#"<Default Extension="{extension}" ContentType="{mime}"/>"#
        ));
    }
    for (part, mime) in overrides {
        out.push_str(&format!(r#"<Override PartName="{part}" ContentType="{mime}"/>"#));
    }
    out.push_str("</Types>");
    out
}

fn document_rels(relationships: &[(String, &'static str, String)]) -> String {
    let mut out = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="{PKG_REL_NS}">"#
    );
    for (id, kind, target) in relationships {
        out.push_str(&format!(
            r#"<Relationship Id="{id}" Type="{REL_NS}/{kind}" Target="{target}"/>"#
        ));
    }
    out.push_str("</Relationships>");
    out
}

fn core_xml(title: &str) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            r#"<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" "#,
            r#"xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/">"#,
            r#"<dc:title>{}</dc:title></cp:coreProperties>"#,
        ),
        xml_escape(title)
    )
}

fn style_xml(id: &str, name: &str, paragraph: &str, run: &str) -> String {
    let based_on = if id == "Normal" {
        String::new()
    } else {
        r#"<w:basedOn w:val="Normal"/>"#.to_string()
    };
    let default = if id == "Normal" { r#" w:default="1""# } else { "" };
    format!(
        r#"<w:style w:type="paragraph"{default} w:styleId="{id}"><w:name w:val="{name}"/>{based_on}<w:qFormat/><w:pPr>{paragraph}</w:pPr><w:rPr>{run}</w:rPr></w:style>"#
    )
}

fn styles_xml() -> String {
    let mut styles: BTreeMap<usize, String> = BTreeMap::new();
    let mut add = |xml: String| {
        styles.insert(styles.len(), xml);
    };
    add(style_xml("Normal", "Normal", r#"<w:spacing w:after="120"/>"#, ""));
    add(style_xml("Title", "Title", r#"<w:spacing w:after="240"/><w:jc w:val="center"/>"#, r#"<w:b/><w:sz w:val="48"/>"#));
    for level in 1..=MAX_HEADING {
        let size = 36usize.saturating_sub(level * 4).max(22);
        add(style_xml(
            &format!("Heading{level}"),
            &format!("heading {level}"),
            &format!(
                r#"<w:keepNext/><w:spacing w:before="240" w:after="120"/><w:outlineLvl w:val="{}"/>"#,
                level - 1
            ),
            &format!(r#"<w:b/><w:sz w:val="{size}"/>"#),
        ));
    }
    add(style_xml(
        "Code",
        "Code",
        r#"<w:shd w:val="clear" w:color="auto" w:fill="F2F2F2"/><w:spacing w:after="0"/>"#,
        r#"<w:rFonts w:ascii="Courier New" w:hAnsi="Courier New" w:cs="Courier New"/><w:sz w:val="20"/>"#,
    ));
    add(style_xml("ListParagraph", "List Paragraph", r#"<w:ind w:left="720"/>"#, ""));
    add(style_xml("Caption", "caption", "", r#"<w:i/><w:sz w:val="18"/>"#));
    add(style_xml("Quote", "Quote", r#"<w:ind w:left="720"/>"#, "<w:i/>"));
    add(style_xml("Abstract", "Abstract", r#"<w:ind w:left="567" w:right="567"/>"#, r#"<w:sz w:val="20"/>"#));
    add(style_xml("Bibliography", "Bibliography", r#"<w:ind w:left="720" w:hanging="720"/>"#, ""));
    add(style_xml("FootnoteText", "footnote text", "", r#"<w:sz w:val="20"/>"#));
    add(style_xml("CommentText", "annotation text", "", r#"<w:sz w:val="20"/>"#));
    add(style_xml("Header", "header", "", ""));
    add(style_xml("Footer", "footer", "", ""));
    add(style_xml("TOCHeading", "TOC Heading", "", r#"<w:b/><w:sz w:val="28"/>"#));
    for level in 1..=MAX_HEADING {
        add(style_xml(
            &format!("TOC{level}"),
            &format!("toc {level}"),
            &format!(r#"<w:ind w:left="{}"/>"#, (level - 1) * 220),
            "",
        ));
    }

    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:styles xmlns:w="{}">"#,
            r#"<w:docDefaults><w:rPrDefault><w:rPr><w:rFonts w:ascii="Calibri" w:hAnsi="Calibri" w:cs="Calibri"/><w:sz w:val="22"/></w:rPr></w:rPrDefault></w:docDefaults>"#,
            "{}</w:styles>"
        ),
        W_NS,
        styles.into_values().collect::<String>()
    )
}

fn numbering_xml() -> String {
    let levels = |ordered: bool| -> String {
        (0..9)
            .map(|ilvl| {
                let (format, text) = if ordered {
                    ("decimal", format!("%{}.", ilvl + 1))
                } else {
                    ("bullet", "\u{2022}".to_string())
                };
                format!(
                    r#"<w:lvl w:ilvl="{ilvl}"><w:start w:val="1"/><w:numFmt w:val="{format}"/><w:lvlText w:val="{text}"/><w:lvlJc w:val="left"/><w:pPr><w:ind w:left="{}" w:hanging="360"/></w:pPr></w:lvl>"#,
                    720 * (ilvl + 1)
                )
            })
            .collect()
    };
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:numbering xmlns:w="{}">"#,
            r#"<w:abstractNum w:abstractNumId="0">{}</w:abstractNum>"#,
            r#"<w:abstractNum w:abstractNumId="1">{}</w:abstractNum>"#,
            r#"<w:num w:numId="1"><w:abstractNumId w:val="0"/></w:num>"#,
            r#"<w:num w:numId="2"><w:abstractNumId w:val="1"/></w:num>"#,
            "</w:numbering>"
        ),
        W_NS,
        levels(false),
        levels(true)
    )
}
