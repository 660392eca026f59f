//! Shared helpers: running both stages and building `.docx` fixtures.

use folio_babel::convert::{ConversionResult, ConvertHooks, ConvertOptions, Converter};
use folio_babel::format::Format;
use folio_babel::ir::IntermediateDocument;
use folio_babel::options::ParseOptions;
use folio_babel::tree::{Block, Document};
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

pub const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
pub const R_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

pub fn parse(format: &dyn Format, source: &[u8]) -> IntermediateDocument {
    format
        .parse(source, &ParseOptions::default())
        .expect("source parses")
}

pub fn convert(doc: &IntermediateDocument) -> ConversionResult {
    convert_with(doc, ConvertOptions::default())
}

pub fn convert_with(doc: &IntermediateDocument, options: ConvertOptions) -> ConversionResult {
    Converter::new(options)
        .convert(doc, &mut ConvertHooks::none())
        .expect("conversion is not cancelled")
}

/// Section titles depth-first.
pub fn outline(doc: &Document) -> Vec<String> {
    doc.walk_sections()
        .into_iter()
        .map(|s| s.title.clone())
        .collect()
}

pub fn block_contents(doc: &Document) -> Vec<&str> {
    doc.blocks().into_iter().map(|b: &Block| b.content.as_str()).collect()
}

/// Builder for a minimal word-processing package.
#[derive(Default)]
pub struct DocxFixture {
    body: String,
    styles: String,
    numbering: Option<String>,
    media: Vec<(String, Vec<u8>)>,
}

impl DocxFixture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn style(mut self, id: &str, name: &str, ppr: &str, rpr: &str) -> Self {
        self.styles.push_str(&format!(
            r#"<w:style w:type="paragraph" w:styleId="{id}"><w:name w:val="{name}"/><w:basedOn w:val="Normal"/><w:pPr>{ppr}</w:pPr><w:rPr>{rpr}</w:rPr></w:style>"#
        ));
        self
    }

    pub fn numbering(mut self, xml: &str) -> Self {
        self.numbering = Some(xml.to_string());
        self
    }

    pub fn paragraph(mut self, style: Option<&str>, runs: &str) -> Self {
        let ppr = style
            .map(|s| format!(r#"<w:pPr><w:pStyle w:val="{s}"/></w:pPr>"#))
            .unwrap_or_default();
        self.body.push_str(&format!("<w:p>{ppr}{runs}</w:p>"));
        self
    }

    pub fn raw(mut self, xml: &str) -> Self {
        self.body.push_str(xml);
        self
    }

    pub fn media(mut self, name: &str, bytes: Vec<u8>) -> Self {
        self.media.push((name.to_string(), bytes));
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut rels = vec![(
            "rIdStyles".to_string(),
            "styles".to_string(),
            "styles.xml".to_string(),
        )];
        if self.numbering.is_some() {
            rels.push(("rIdNum".into(), "numbering".into(), "numbering.xml".into()));
        }
        for (index, (name, _)) in self.media.iter().enumerate() {
            rels.push((format!("rIdImg{}", index + 1), "image".into(), format!("media/{name}")));
        }
        let rels_xml: String = rels
            .iter()
            .map(|(id, kind, target)| {
                format!(r#"<Relationship Id="{id}" Type="{R_NS}/{kind}" Target="{target}"/>"#)
            })
            .collect();

        let mut parts: Vec<(String, Vec<u8>)> = vec![
            (
                "word/document.xml".into(),
                format!(
                    r#"<?xml version="1.0" encoding="UTF-8"?><w:document xmlns:w="{W_NS}" xmlns:r="{R_NS}" xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing" xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:pic="http://schemas.openxmlformats.org/drawingml/2006/picture" xmlns:m="http://schemas.openxmlformats.org/officeDocument/2006/math"><w:body>{}</w:body></w:document>"#,
                    self.body
                )
                .into_bytes(),
            ),
            (
                "word/styles.xml".into(),
                format!(
                    r#"<w:styles xmlns:w="{W_NS}"><w:docDefaults><w:rPrDefault><w:rPr><w:rFonts w:ascii="Calibri"/><w:sz w:val="22"/></w:rPr></w:rPrDefault></w:docDefaults><w:style w:type="paragraph" w:default="1" w:styleId="Normal"><w:name w:val="Normal"/></w:style>{}</w:styles>"#,
                    self.styles
                )
                .into_bytes(),
            ),
            (
                "word/_rels/document.xml.rels".into(),
                format!(
                    r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{rels_xml}</Relationships>"#
                )
                .into_bytes(),
            ),
        ];
        if let Some(numbering) = self.numbering {
            parts.push((
                "word/numbering.xml".into(),
                format!(r#"<w:numbering xmlns:w="{W_NS}">{numbering}</w:numbering>"#).into_bytes(),
            ));
        }
        for (name, bytes) in self.media {
            parts.push((format!("word/media/{name}"), bytes));
        }
        zip_parts(parts)
    }
}

pub fn zip_parts(parts: Vec<(String, Vec<u8>)>) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, bytes) in parts {
        writer
            .start_file(name, SimpleFileOptions::default())
            .expect("zip entry");
        writer.write_all(&bytes).expect("zip write");
    }
    writer.finish().expect("zip finish").into_inner()
}

pub fn run(text: &str) -> String {
    format!(r#"<w:r><w:t xml:space="preserve">{text}</w:t></w:r>"#)
}

pub fn bold_run(text: &str, half_points: u32) -> String {
    format!(
        r#"<w:r><w:rPr><w:b/><w:sz w:val="{half_points}"/></w:rPr><w:t xml:space="preserve">{text}</w:t></w:r>"#
    )
}
