use crate::common::{convert, outline, parse};
use folio_babel::format::Format;
use folio_babel::formats::docx::DocxFormat;
use folio_babel::formats::markdown::MarkdownFormat;
use folio_babel::ir::IntermediateElement;
use folio_babel::tree::BlockType;
use folio_babel::FormatRegistry;

const PAPER: &str = "\
# Findings

Some **bold** and *slanted* text.

## Data

| Year | Count |
|------|-------|
| 2023 | 12    |

- alpha
- beta

```python
print(1)
print(2)
```

> Quoted remark.
";

#[test]
fn markdown_tree_survives_a_docx_round_trip() {
    let first = convert(&parse(&MarkdownFormat, PAPER.as_bytes())).document;
    let bytes = DocxFormat::new().export(&first).unwrap();
    let second = convert(&parse(&DocxFormat::new(), &bytes)).document;

    assert_eq!(second.title, "Findings");
    // The title paragraph opens one more, empty, section ahead of the content.
    let titles = outline(&second);
    assert_eq!(titles[titles.len() - 2..], ["Findings", "Data"]);

    let findings = second.sections.last().unwrap();
    assert_eq!(findings.blocks[0].content, "Some \\textbf{bold} and \\textit{slanted} text.");

    let kinds: Vec<BlockType> = findings.children[0]
        .blocks
        .iter()
        .map(|b| b.block_type)
        .collect();
    assert_eq!(
        kinds,
        vec![
            BlockType::Table,
            BlockType::ListItem,
            BlockType::ListItem,
            BlockType::Code,
            BlockType::Blockquote,
        ]
    );
    let table = &findings.children[0].blocks[0];
    assert!(table.content.contains("Year & Count \\\\\n\\hline\\hline"));
    let code = &findings.children[0].blocks[3];
    assert_eq!(code.content, "\\begin{lstlisting}\nprint(1)\nprint(2)\n\\end{lstlisting}");
}

#[test]
fn exported_package_is_reparsed_element_for_element() {
    let tree = convert(&parse(&MarkdownFormat, PAPER.as_bytes())).document;
    let bytes = FormatRegistry::with_defaults().export(&tree, "docx").unwrap();
    let doc = parse(&DocxFormat::new(), &bytes);
    let headings: Vec<(u8, &str)> = doc
        .elements
        .iter()
        .filter_map(|e| match e {
            IntermediateElement::Heading(h) => Some((h.level, h.text.as_str())),
            _ => None,
        })
        .collect();
    assert_eq!(headings, vec![(1, "Findings"), (1, "Findings"), (2, "Data")]);
    assert_eq!(doc.title.as_deref(), Some("Findings"));
}

#[test]
fn text_formats_cannot_export() {
    let tree = convert(&parse(&MarkdownFormat, PAPER.as_bytes())).document;
    assert!(FormatRegistry::with_defaults().export(&tree, "latex").is_err());
}
