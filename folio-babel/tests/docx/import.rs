use crate::common::{bold_run, convert, outline, run, DocxFixture};
use folio_babel::format::Format;
use folio_babel::formats::docx::DocxFormat;
use folio_babel::ir::{IntermediateElement, WarningKind};
use folio_babel::options::ParseOptions;
use folio_babel::tree::BlockType;
use folio_babel::FormatError;
use image::{DynamicImage, ImageFormat, RgbImage};
use std::io::Cursor;

fn png(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(RgbImage::new(width, height))
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .expect("png encodes");
    bytes
}

fn drawing(rel: &str, cx: u64, cy: u64) -> String {
    format!(
        r#"<w:r><w:drawing><wp:inline><wp:extent cx="{cx}" cy="{cy}"/><wp:docPr id="1" name="Picture 1" descr="Plot"/><a:graphic><a:graphicData><pic:pic><pic:blipFill><a:blip r:embed="{rel}"/></pic:blipFill></pic:pic></a:graphicData></a:graphic></wp:inline></w:drawing></w:r>"#
    )
}

fn report() -> Vec<u8> {
    DocxFixture::new()
        .style("Heading1", "heading 1", r#"<w:outlineLvl w:val="0"/>"#, "<w:b/>")
        .style("Caption", "caption", "", "<w:i/>")
        .numbering(
            r#"<w:abstractNum w:abstractNumId="0"><w:lvl w:ilvl="0"><w:numFmt w:val="decimal"/></w:lvl></w:abstractNum><w:num w:numId="3"><w:abstractNumId w:val="0"/></w:num>"#,
        )
        .paragraph(Some("Heading1"), &run("Introduction"))
        .paragraph(None, &run("Opening remarks."))
        .paragraph(None, &bold_run("2.1 Methods", 22))
        .raw(&format!(
            r#"<w:p><w:pPr><w:numPr><w:ilvl w:val="0"/><w:numId w:val="3"/></w:numPr></w:pPr>{}</w:p>"#,
            run("first step")
        ))
        .paragraph(None, &drawing("rIdImg1", 1_905_000, 952_500))
        .paragraph(Some("Caption"), &run("Figure 1: Results"))
        .media("plot.png", png(8, 4))
        .build()
}

#[test]
fn bold_numbered_paragraph_opens_a_subsection() {
    let doc = DocxFormat::new()
        .parse(&report(), &ParseOptions::default())
        .unwrap();
    let kinds: Vec<&str> = doc.elements.iter().map(|e| e.kind_name()).collect();
    assert_eq!(
        kinds,
        vec!["heading", "paragraph", "heading", "list_item", "image"]
    );
    assert!(matches!(
        &doc.elements[2],
        IntermediateElement::Heading(h) if h.level == 2 && h.text == "2.1 Methods"
    ));

    let result = convert(&doc);
    assert_eq!(outline(&result.document), vec!["Introduction", "2.1 Methods"]);
    let intro = &result.document.sections[0];
    assert_eq!(intro.children[0].parent_id, Some(intro.id));
}

#[test]
fn images_become_figure_blocks_with_assets() {
    let doc = DocxFormat::new()
        .parse(&report(), &ParseOptions::default())
        .unwrap();
    let result = convert(&doc);
    let methods = &result.document.sections[0].children[0];
    let figure = methods
        .blocks
        .iter()
        .find(|b| b.block_type == BlockType::Figure)
        .expect("figure block");
    assert_eq!(figure.assets.len(), 1);
    let asset = &figure.assets[0];
    assert_eq!(asset.mime_type, "image/png");
    assert_eq!(asset.hash.len(), 64);
    assert!(figure.content.contains("\\includegraphics[width=2.08in]{image-1.png}"));
    assert!(figure.content.contains("\\caption{Figure 1: Results}"));
    assert_eq!(result.statistics.assets, 1);
}

#[test]
fn list_items_keep_numbering() {
    let doc = DocxFormat::new()
        .parse(&report(), &ParseOptions::default())
        .unwrap();
    let result = convert(&doc);
    let item = result
        .document
        .blocks()
        .into_iter()
        .find(|b| b.block_type == BlockType::ListItem)
        .expect("list item");
    assert_eq!(item.content, "\\item first step");
    assert_eq!(item.attribute("ordered"), Some("true"));
    assert_eq!(item.attribute("level"), Some("0"));
}

#[test]
fn broken_image_reference_is_a_warning_not_an_error() {
    let bytes = DocxFixture::new()
        .paragraph(None, &run("before"))
        .paragraph(None, &drawing("rIdMissing", 100, 100))
        .paragraph(None, &run("after"))
        .build();
    let doc = DocxFormat::new()
        .parse(&bytes, &ParseOptions::default())
        .unwrap();
    assert_eq!(doc.elements.len(), 2);
    assert_eq!(doc.warnings.len(), 1);
    assert_eq!(doc.warnings[0].kind, WarningKind::ImageExtractionFailed);

    let result = convert(&doc);
    assert_eq!(result.warnings, doc.warnings);
    assert_eq!(result.document.sections[0].title, "Untitled Section");
}

#[test]
fn not_a_package_is_corrupt() {
    let err = DocxFormat::new()
        .parse(b"plain text, not a zip", &ParseOptions::default())
        .unwrap_err();
    assert!(matches!(err, FormatError::CorruptPackage(_)));
}
