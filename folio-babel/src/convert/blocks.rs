//! Element to block markup.

use super::EquationFallback;
use crate::ir::{
    BibliographyEntry, ChangeKind, CodeBlock, Equation, FormattingSpan, IntermediateElement,
    Table, Theorem,
};
use crate::markup::{escape, serialize_formatting, MarkupOptions};
use crate::tree::BlockType;
use std::collections::BTreeMap;

/// A block before it gets an id and a place in a section.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockDraft {
    pub block_type: BlockType,
    pub content: String,
    pub attributes: BTreeMap<String, String>,
}

impl BlockDraft {
    pub fn new(block_type: BlockType, content: impl Into<String>) -> Self {
        Self {
            block_type,
            content: content.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn attr(mut self, key: &str, value: impl ToString) -> Self {
        self.attributes.insert(key.to_string(), value.to_string());
        self
    }

    fn attr_opt(self, key: &str, value: Option<&String>) -> Self {
        match value {
            Some(value) => self.attr(key, value),
            None => self,
        }
    }
}

/// Markup for every element kind that maps to exactly one block.
///
/// Headings, images and equations need run state (sections, assets,
/// warnings) and are handled by the converter; this returns `None` for them.
pub fn render(element: &IntermediateElement, markup: MarkupOptions) -> Option<BlockDraft> {
    use IntermediateElement as E;

    let draft = match element {
        E::Heading(_) | E::Image(_) | E::Equation(_) => return None,
        E::Paragraph(p) => BlockDraft::new(
            BlockType::Paragraph,
            serialize_formatting(&p.text, &p.formatting, markup),
        )
        .attr_opt("style", p.style_name.as_ref()),
        E::CodeBlock(code) => code_block(code),
        E::Table(table) => BlockDraft::new(BlockType::Table, table_markup(table)),
        E::ListItem(item) => BlockDraft::new(
            BlockType::ListItem,
            format!(
                "\\item {}",
                serialize_formatting(&item.text, &item.formatting, markup)
            ),
        )
        .attr("level", item.level)
        .attr("ordered", item.ordered),
        E::Abstract(block) => BlockDraft::new(
            BlockType::Abstract,
            environment("abstract", None, &block.text, &block.formatting, markup),
        ),
        E::Blockquote(block) => BlockDraft::new(
            BlockType::Blockquote,
            environment("quote", None, &block.text, &block.formatting, markup),
        ),
        E::Theorem(theorem) => theorem_block(theorem, markup),
        E::BibliographyEntry(entry) => bibliography(entry),
        E::PageBreak(_) => BlockDraft::new(BlockType::PageBreak, "\\newpage"),
        E::Header(hf) => {
            BlockDraft::new(BlockType::Header, escape(&hf.text)).attr("kind", hf.kind.as_str())
        }
        E::Footer(hf) => {
            BlockDraft::new(BlockType::Footer, escape(&hf.text)).attr("kind", hf.kind.as_str())
        }
        E::Footnote(note) => {
            BlockDraft::new(BlockType::Footnote, format!("\\footnote{{{}}}", escape(&note.text)))
                .attr("id", &note.id)
        }
        E::Endnote(note) => {
            BlockDraft::new(BlockType::Endnote, format!("\\endnote{{{}}}", escape(&note.text)))
                .attr("id", &note.id)
        }
        E::Comment(comment) => {
            BlockDraft::new(BlockType::Comment, format!("\\todo{{{}}}", escape(&comment.text)))
                .attr("id", &comment.id)
                .attr_opt("author", comment.author.as_ref())
                .attr_opt("date", comment.date.as_ref())
        }
        E::TrackChange(change) => {
            let (command, kind) = match change.kind {
                ChangeKind::Insertion => ("added", "insertion"),
                ChangeKind::Deletion => ("deleted", "deletion"),
            };
            BlockDraft::new(
                BlockType::TrackChange,
                format!("\\{command}{{{}}}", escape(&change.text)),
            )
            .attr("kind", kind)
            .attr_opt("author", change.author.as_ref())
            .attr_opt("date", change.date.as_ref())
            .attr_opt("revision", change.revision_id.as_ref())
        }
        E::TableOfContents(toc) => BlockDraft::new(BlockType::TableOfContents, "\\tableofcontents")
            .attr("entries", toc.entries.len()),
    };
    Some(draft)
}

/// Bold paragraph standing in for a heading deeper than the section limit.
pub fn demoted_heading(
    text: &str,
    spans: &[FormattingSpan],
    level: u8,
    markup: MarkupOptions,
) -> BlockDraft {
    BlockDraft::new(
        BlockType::Paragraph,
        format!("\\textbf{{{}}}", serialize_formatting(text, spans, markup)),
    )
    .attr("demoted_level", level)
}

/// Equation markup, or the configured fallback when no LaTeX is available.
///
/// Returns the draft (none when the fallback is `Skip`) and whether the
/// conversion had failed.
pub fn equation(eq: &Equation, fallback: EquationFallback) -> (Option<BlockDraft>, bool) {
    let latex = eq
        .latex
        .as_deref()
        .map(str::trim)
        .filter(|latex| !latex.is_empty());

    if let Some(latex) = latex {
        let content = if !eq.display {
            format!("${latex}$")
        } else if latex.starts_with("\\begin{") {
            latex.to_string()
        } else {
            format!("\\begin{{equation}}\n{latex}\n\\end{{equation}}")
        };
        let draft = BlockDraft::new(BlockType::Equation, content).attr("display", eq.display);
        return (Some(draft), false);
    }

    let content = match fallback {
        EquationFallback::Skip => return (None, true),
        EquationFallback::Placeholder => "\\textit{[Equation]}".to_string(),
        EquationFallback::NativeComment => match eq.native.as_deref() {
            Some(native) if !native.trim().is_empty() => native
                .lines()
                .map(|line| format!("% {line}"))
                .collect::<Vec<_>>()
                .join("\n"),
            _ => "\\textit{[Equation]}".to_string(),
        },
    };
    let draft = BlockDraft::new(BlockType::Equation, content)
        .attr("display", eq.display)
        .attr("fallback", fallback.as_str());
    (Some(draft), true)
}

fn code_block(code: &CodeBlock) -> BlockDraft {
    let options = match &code.language {
        Some(language) => format!("[language={language}]"),
        None => String::new(),
    };
    let body = code.code.trim_end_matches('\n');
    BlockDraft::new(
        BlockType::Code,
        format!("\\begin{{lstlisting}}{options}\n{body}\n\\end{{lstlisting}}"),
    )
    .attr_opt("language", code.language.as_ref())
}

fn environment(
    name: &str,
    title: Option<&str>,
    text: &str,
    spans: &[FormattingSpan],
    markup: MarkupOptions,
) -> String {
    let title = match title {
        Some(title) => format!("[{}]", escape(title)),
        None => String::new(),
    };
    format!(
        "\\begin{{{name}}}{title}\n{}\n\\end{{{name}}}",
        serialize_formatting(text, spans, markup)
    )
}

fn theorem_block(theorem: &Theorem, markup: MarkupOptions) -> BlockDraft {
    let kind = if theorem.kind.is_empty() {
        "theorem"
    } else {
        theorem.kind.as_str()
    };
    BlockDraft::new(
        BlockType::Theorem,
        environment(
            kind,
            theorem.title.as_deref(),
            &theorem.text,
            &theorem.formatting,
            markup,
        ),
    )
    .attr("kind", kind)
}

fn bibliography(entry: &BibliographyEntry) -> BlockDraft {
    let key = entry
        .key
        .clone()
        .unwrap_or_else(|| format!("ref{}", entry.order + 1));
    BlockDraft::new(
        BlockType::Bibliography,
        format!("\\bibitem{{{key}}} {}", escape(&entry.text)),
    )
    .attr("key", key)
}

/// `tabular` with one bordered `l` column per grid column.
pub fn table_markup(table: &Table) -> String {
    let columns = table.column_count().max(1);
    let spec = format!("|{}", "l|".repeat(columns));

    let mut out = format!("\\begin{{tabular}}{{{spec}}}\n\\hline\n");
    for (index, row) in table.rows.iter().enumerate() {
        let cells: Vec<String> = row
            .cells
            .iter()
            .map(|cell| {
                let text = if cell.merged_continue {
                    String::new()
                } else {
                    escape(cell.text.trim())
                };
                if cell.col_span > 1 {
                    format!("\\multicolumn{{{}}}{{|l|}}{{{text}}}", cell.col_span)
                } else {
                    text
                }
            })
            .collect();
        out.push_str(&cells.join(" & "));
        out.push_str(" \\\\\n");
        if index == 0 && table.has_header_row {
            out.push_str("\\hline\\hline\n");
        } else {
            out.push_str("\\hline\n");
        }
    }
    out.push_str("\\end{tabular}");

    match &table.caption {
        Some(caption) => format!(
            "\\begin{{table}}[h]\n\\centering\n{out}\n\\caption{{{}}}\n\\end{{table}}",
            escape(caption)
        ),
        None => out,
    }
}

/// `figure` environment pointing at an asset file.
pub fn figure(filename: &str, width_px: Option<u32>, caption: Option<&str>) -> String {
    let graphics = match width_px {
        Some(px) if px > 0 => format!(
            "\\includegraphics[width={:.2}in]{{{filename}}}",
            f64::from(px) / 96.0
        ),
        _ => format!("\\includegraphics{{{filename}}}"),
    };
    let mut out = format!("\\begin{{figure}}[h]\n\\centering\n{graphics}\n");
    if let Some(caption) = caption.filter(|c| !c.trim().is_empty()) {
        out.push_str(&format!("\\caption{{{}}}\n", escape(caption)));
    }
    out.push_str("\\end{figure}");
    out
}
