use crate::common::{block_contents, convert, outline, parse};
use folio_babel::formats::markdown::MarkdownFormat;
use folio_babel::ir::{FormattingKind, FormattingSpan, IntermediateElement};
use folio_babel::pipeline::{import_file, ImportOptions};
use folio_babel::tree::BlockType;
use image::{DynamicImage, ImageFormat, RgbImage};
use std::io::Cursor;

#[test]
fn title_and_bold_paragraph() {
    let doc = parse(&MarkdownFormat, b"# Title\n\nSome **bold** text.");
    match doc.elements.as_slice() {
        [IntermediateElement::Heading(h), IntermediateElement::Paragraph(p)] => {
            assert_eq!((h.level, h.text.as_str()), (1, "Title"));
            assert_eq!(p.text, "Some bold text.");
            assert_eq!(p.formatting, vec![FormattingSpan::new(5, 4, FormattingKind::Bold)]);
        }
        other => panic!("unexpected elements {other:?}"),
    }

    let result = convert(&doc);
    let tree = &result.document;
    assert_eq!(tree.title, "Title");
    assert_eq!(tree.sections.len(), 1);
    assert_eq!(tree.sections[0].title, "Title");
    assert_eq!(tree.sections[0].blocks.len(), 1);
    assert_eq!(tree.sections[0].blocks[0].content, "Some \\textbf{bold} text.");
    assert!(result.warnings.is_empty());
}

#[test]
fn header_table_renders_double_rule() {
    let doc = parse(&MarkdownFormat, b"| A | B |\n|---|---|\n| 1 | 2 |\n");
    let tree = convert(&doc).document;
    assert_eq!(
        block_contents(&tree),
        vec!["\\begin{tabular}{|l|l|}\n\\hline\nA & B \\\\\n\\hline\\hline\n1 & 2 \\\\\n\\hline\n\\end{tabular}"]
    );
}

#[test]
fn headings_nest_and_close_sections() {
    let source = "# One\n\n## One.A\n\n### One.A.i\n\n## One.B\n\n# Two\n\ntext\n";
    let tree = convert(&parse(&MarkdownFormat, source.as_bytes())).document;
    assert_eq!(outline(&tree), vec!["One", "One.A", "One.A.i", "One.B", "Two"]);
    assert_eq!(tree.sections.len(), 2);
    assert_eq!(tree.sections[0].children.len(), 2);
    let sort_orders: Vec<usize> = tree.walk_sections().iter().map(|s| s.sort_order).collect();
    let mut sorted = sort_orders.clone();
    sorted.sort_unstable();
    assert_eq!(sort_orders, sorted);
}

#[test]
fn footnotes_and_math_become_blocks() {
    let source = "Energy $E=mc^2$ here.[^n]\n\n$$a+b$$\n\n[^n]: Einstein.\n";
    let tree = convert(&parse(&MarkdownFormat, source.as_bytes())).document;
    let blocks = tree.blocks();
    let kinds: Vec<BlockType> = blocks.iter().map(|b| b.block_type).collect();
    assert_eq!(
        kinds,
        vec![BlockType::Paragraph, BlockType::Footnote, BlockType::Equation]
    );
    assert_eq!(blocks[0].content, "Energy $E=mc^2$ here.");
    assert_eq!(blocks[2].content, "\\begin{equation}\na+b\n\\end{equation}");
}

#[test]
fn relative_images_resolve_against_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut png = Vec::new();
    DynamicImage::ImageRgb8(RgbImage::new(12, 6))
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .unwrap();
    std::fs::create_dir(dir.path().join("img")).unwrap();
    std::fs::write(dir.path().join("img/chart.png"), &png).unwrap();
    let path = dir.path().join("notes.md");
    std::fs::write(&path, "# Notes\n\n![A chart](img/chart.png)\n").unwrap();

    let outcome = import_file(&path, &ImportOptions::default()).unwrap();
    let figure = outcome.result.document.blocks()[0].clone();
    assert_eq!(figure.block_type, BlockType::Figure);
    assert_eq!(figure.assets[0].bytes, png);
    assert_eq!(figure.assets[0].width, Some(12));
    assert_eq!(figure.attribute("source_filename"), Some("chart.png"));
}
