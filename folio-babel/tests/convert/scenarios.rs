use crate::common::{block_contents, convert, outline, parse};
use folio_babel::formats::latex::LatexFormat;
use folio_babel::formats::markdown::MarkdownFormat;
use folio_babel::tree::BlockType;
use insta::assert_snapshot;

const NOTES: &str = "# Intro

Plain *soft* words.

- one
- two

## Deeper

> quoted

# Outro

Done.
";

#[test]
fn same_input_gives_the_same_tree() {
    let doc = parse(&MarkdownFormat, NOTES.as_bytes());
    let first = convert(&doc);
    let second = convert(&doc);
    assert_eq!(first.document, second.document);
    assert_eq!(
        serde_json::to_string(&first.document).unwrap(),
        serde_json::to_string(&second.document).unwrap()
    );
}

#[test]
fn markdown_notes_become_nested_sections() {
    let doc = parse(&MarkdownFormat, NOTES.as_bytes());
    let tree = convert(&doc).document;

    assert_eq!(outline(&tree), vec!["Intro", "Deeper", "Outro"]);
    assert_eq!(tree.sections.len(), 2);
    let deeper = &tree.sections[0].children[0];
    assert_eq!(deeper.parent_id, Some(tree.sections[0].id));
    assert_eq!(deeper.blocks[0].block_type, BlockType::Blockquote);

    assert_snapshot!(block_contents(&tree).join("\n"), @r"
    Plain \textit{soft} words.
    \item one
    \item two
    \begin{quote}
    quoted
    \end{quote}
    Done.
    ");
}

#[test]
fn ids_are_sequential_in_document_order() {
    let doc = parse(&MarkdownFormat, NOTES.as_bytes());
    let tree = convert(&doc).document;

    let section_ids: Vec<u64> = tree.walk_sections().iter().map(|s| s.id).collect();
    assert_eq!(section_ids, vec![1, 2, 3]);
    let block_ids: Vec<u64> = tree.blocks().iter().map(|b| b.id).collect();
    assert_eq!(block_ids, (1..=block_ids.len() as u64).collect::<Vec<_>>());
}

#[test]
fn tree_serializes_to_json() {
    let doc = parse(&MarkdownFormat, b"# Title\n\nSome **bold** text.\n");
    let tree = convert(&doc).document;
    let value = serde_json::to_value(&tree).unwrap();

    let block = &value["sections"][0]["blocks"][0];
    assert_eq!(block["type"], "paragraph");
    assert_eq!(block["content"], "Some \\textbf{bold} text.");
    assert!(value["sections"][0].get("parent_id").is_none());

    let back: folio_babel::tree::Document = serde_json::from_value(value).unwrap();
    assert_eq!(back, tree);
}

#[test]
fn statistics_describe_the_run() {
    let source = r"\section{One}
Text with $x^2$ inline.
\begin{equation}
a+b
\end{equation}
\subsection{Two}
\subsubsection{Three}
More.
";
    let doc = parse(&LatexFormat, source.as_bytes());
    let result = convert(&doc);
    let stats = &result.statistics;

    assert_eq!(stats.elements_total, doc.elements.len());
    assert_eq!(stats.elements_processed, doc.elements.len());
    assert_eq!(stats.sections, 3);
    assert_eq!(stats.equations, 1);
    assert_eq!(stats.equations_failed, 0);
    assert_eq!(stats.max_depth, 3);
    assert!(!stats.truncated);
}
