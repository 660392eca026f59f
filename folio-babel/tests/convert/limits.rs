use crate::common::{convert_with, outline, parse};
use folio_babel::convert::{ConvertHooks, ConvertOptions};
use folio_babel::error::ConvertError;
use folio_babel::formats::markdown::MarkdownFormat;
use folio_babel::ir::WarningKind;
use folio_babel::pipeline::{import_file_with, ImportError, ImportOptions};
use folio_babel::registry::FormatRegistry;
use std::cell::Cell;
use tempfile::TempDir;

fn paragraphs(count: usize) -> String {
    (1..=count)
        .map(|n| format!("Paragraph {n}."))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn truncations(warnings: &[folio_babel::ir::Warning]) -> usize {
    warnings
        .iter()
        .filter(|w| w.kind == WarningKind::ContentTruncated)
        .count()
}

#[test]
fn block_limit_keeps_a_prefix() {
    let doc = parse(&MarkdownFormat, paragraphs(10).as_bytes());
    let result = convert_with(
        &doc,
        ConvertOptions {
            max_blocks: 3,
            ..Default::default()
        },
    );
    let contents: Vec<&str> = result.document.sections[0]
        .blocks
        .iter()
        .map(|b| b.content.as_str())
        .collect();
    assert_eq!(contents, vec!["Paragraph 1.", "Paragraph 2.", "Paragraph 3."]);
    assert_eq!(truncations(&result.warnings), 1);
    assert!(result.statistics.truncated);
    assert_eq!(result.statistics.elements_processed, 3);
}

#[test]
fn section_limit_stops_at_the_next_heading() {
    let source = "# One\n\nA.\n\n# Two\n\nB.\n\n# Three\n\nC.\n";
    let doc = parse(&MarkdownFormat, source.as_bytes());
    let result = convert_with(
        &doc,
        ConvertOptions {
            max_sections: 2,
            ..Default::default()
        },
    );
    assert_eq!(outline(&result.document), vec!["One", "Two"]);
    assert_eq!(result.document.block_count(), 2);
    assert_eq!(truncations(&result.warnings), 1);
}

#[test]
fn content_within_limits_is_not_truncated() {
    let doc = parse(&MarkdownFormat, paragraphs(3).as_bytes());
    let result = convert_with(
        &doc,
        ConvertOptions {
            max_blocks: 3,
            ..Default::default()
        },
    );
    assert_eq!(result.document.block_count(), 3);
    assert_eq!(truncations(&result.warnings), 0);
    assert!(!result.statistics.truncated);
}

#[test]
fn cancelled_import_reports_progress_so_far() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("long.md");
    std::fs::write(&path, paragraphs(5)).unwrap();

    let checks = Cell::new(0);
    let cancel = || {
        checks.set(checks.get() + 1);
        checks.get() > 2
    };
    let mut hooks = ConvertHooks::none().with_cancel(&cancel);
    let err = import_file_with(
        &FormatRegistry::with_defaults(),
        &path,
        &ImportOptions::default(),
        &mut hooks,
    )
    .unwrap_err();

    assert_eq!(
        err,
        ImportError::Convert(ConvertError::Cancelled {
            processed: 2,
            total: 5
        })
    );
}

#[test]
fn progress_reaches_the_total() {
    let doc = parse(&MarkdownFormat, paragraphs(4).as_bytes());
    let mut seen = Vec::new();
    let mut record = |p: &folio_babel::convert::Progress| seen.push(p.processed);
    let mut hooks = ConvertHooks::none().with_progress(&mut record);
    folio_babel::convert::Converter::new(ConvertOptions {
        progress_interval: 2,
        ..Default::default()
    })
    .convert(&doc, &mut hooks)
    .unwrap();
    drop(hooks);
    assert_eq!(seen, vec![2, 4, 4]);
}
