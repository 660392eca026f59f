//! LaTeX parsing (LaTeX source → intermediate elements)
//!
//! A hand-written scanner: the body is walked once, collecting paragraph text
//! until a blank line or a block-level construct (sectioning command,
//! environment, display math) closes it. Environments are located with
//! nesting-aware `\begin`/`\end` matching and dispatched by name.

use super::inline::{parse_inline, plain, Inline};
use super::scan::{
    command_name, environment_end, find_command, group, optional, split_top_level,
    strip_comments,
};
use crate::error::FormatError;
use crate::formats::common::load_image;
use crate::ir::{
    BibliographyEntry, CodeBlock, ElementSink, Equation, FormattingKind, Heading, Image,
    IntermediateDocument, IntermediateElement, ListItem, Note, PageBreak, Paragraph, StyledBlock,
    StyledText, Table, TableCell, TableOfContents, TableRow, Theorem, TocEntry, WarningKind,
};
use crate::options::ParseOptions;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

static BLANK_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n[ \t\r]*\n").expect("valid blank line regex"));
static LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\label\{[^}]*\}").expect("valid label regex"));
static NEWTHEOREM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\\newtheorem\*?\{([^}]+)\}(?:\[[^\]]*\])?\{([^}]+)\}")
        .expect("valid newtheorem regex")
});
static RULE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*\\(?:hline|toprule|midrule|bottomrule|cline\{[^}]*\}|cmidrule(?:\([^)]*\))?\{[^}]*\})")
        .expect("valid rule regex")
});

/// Sectioning commands and their rank; lower ranks are outer levels.
const SECTIONING: &[(&str, u8)] = &[
    ("part", 0),
    ("chapter", 1),
    ("section", 2),
    ("subsection", 3),
    ("subsubsection", 4),
    ("paragraph", 5),
    ("subparagraph", 6),
];

/// Display math environments whose body is the formula itself.
const PLAIN_MATH: &[&str] = &["equation", "displaymath", "math"];

/// Display math environments kept with their `\begin`/`\end` wrapper.
const ALIGNED_MATH: &[&str] = &["align", "gather", "multline", "flalign", "alignat", "eqnarray"];

/// Environments that only group content.
const TRANSPARENT: &[&str] = &[
    "document",
    "center",
    "flushleft",
    "flushright",
    "minipage",
    "multicols",
    "titlepage",
    "small",
    "footnotesize",
    "large",
    "landscape",
    "spacing",
    "singlespace",
    "onehalfspace",
    "doublespace",
];

const TABULAR: &[&str] = &["tabular", "tabularx", "tabulary", "longtable", "tabu"];

/// Block-level commands skipped together with their arguments.
const SKIPPED: &[&str] = &[
    "documentclass",
    "usepackage",
    "RequirePackage",
    "title",
    "author",
    "date",
    "newcommand",
    "renewcommand",
    "providecommand",
    "DeclareMathOperator",
    "newtheorem",
    "theoremstyle",
    "bibliographystyle",
    "bibliography",
    "label",
    "setlength",
    "setcounter",
    "pagestyle",
    "thispagestyle",
    "geometry",
    "hypersetup",
    "graphicspath",
];

/// Parse LaTeX source into an intermediate document.
pub fn parse_latex(
    source: &str,
    options: &ParseOptions,
) -> Result<IntermediateDocument, FormatError> {
    let cleaned = strip_comments(source);
    let metadata = preamble_metadata(&cleaned);

    let body = match cleaned.find("\\begin{document}") {
        Some(start) => {
            let body_start = start + "\\begin{document}".len();
            let body_end = cleaned[body_start..]
                .find("\\end{document}")
                .map(|end| body_start + end)
                .unwrap_or(cleaned.len());
            &cleaned[body_start..body_end]
        }
        None => cleaned.as_str(),
    };

    let mut parser = BlockParser::new(options, top_rank(body), theorem_aliases(&cleaned));
    parser.blocks(body);
    parser.fill_tables_of_contents();

    let (elements, warnings) = parser.sink.into_parts();
    debug!(elements = elements.len(), "parsed latex");

    Ok(IntermediateDocument {
        source_path: None,
        title: metadata.get("title").cloned(),
        metadata,
        elements,
        warnings,
    })
}

fn preamble_metadata(source: &str) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();
    for key in ["title", "author", "date"] {
        let Some(at) = find_command(source, key) else {
            continue;
        };
        let mut pos = at + key.len() + 1;
        if let Some((_, after)) = optional(source, pos) {
            pos = after;
        }
        if let Some((arg, _)) = group(source, pos) {
            let value = plain(arg).replace('\n', " ");
            let value = value.split_whitespace().collect::<Vec<_>>().join(" ");
            if !value.is_empty() {
                metadata.insert(key.to_string(), value);
            }
        }
    }
    metadata
}

/// Highest (numerically lowest) sectioning rank used in `body`.
fn top_rank(body: &str) -> u8 {
    SECTIONING
        .iter()
        .filter(|(name, _)| find_command(body, name).is_some())
        .map(|(_, rank)| *rank)
        .min()
        .unwrap_or(2)
}

/// `\newtheorem{thm}{Theorem}` declarations: environment name → kind.
fn theorem_aliases(source: &str) -> HashMap<String, String> {
    NEWTHEOREM
        .captures_iter(source)
        .filter_map(|caps| {
            let env = caps.get(1)?.as_str().trim().to_string();
            let title = caps.get(2)?.as_str().trim().to_lowercase();
            Some((env, title))
        })
        .collect()
}

struct BlockParser<'o> {
    options: &'o ParseOptions,
    sink: ElementSink,
    top_rank: u8,
    theorem_aliases: HashMap<String, String>,
    unsupported: HashSet<String>,
    toc_orders: Vec<usize>,
    footnote_count: usize,
}

impl<'o> BlockParser<'o> {
    fn new(options: &'o ParseOptions, top_rank: u8, theorem_aliases: HashMap<String, String>) -> Self {
        Self {
            options,
            sink: ElementSink::new(),
            top_rank,
            theorem_aliases,
            unsupported: HashSet::new(),
            toc_orders: Vec::new(),
            footnote_count: 0,
        }
    }

    /// Scan a run of block content.
    fn blocks(&mut self, src: &str) {
        let bytes = src.as_bytes();
        let mut para = String::new();
        let mut pos = 0;

        while pos < bytes.len() {
            let rest = &src[pos..];

            if bytes[pos] == b'\n' {
                let mut after = pos + 1;
                while after < bytes.len() && matches!(bytes[after], b' ' | b'\t' | b'\r') {
                    after += 1;
                }
                if bytes.get(after) == Some(&b'\n') {
                    self.flush(&mut para);
                    pos = after + 1;
                } else {
                    para.push('\n');
                    pos += 1;
                }
                continue;
            }

            if rest.starts_with("$$") {
                self.flush(&mut para);
                pos = match rest[2..].find("$$") {
                    Some(close) => {
                        self.display_math(&rest[2..2 + close], None);
                        pos + 2 + close + 2
                    }
                    None => {
                        self.sink
                            .warn(WarningKind::MalformedMarkup, "unterminated $$ display math");
                        bytes.len()
                    }
                };
                continue;
            }

            if bytes[pos] == b'$' {
                // Copy inline math through so blank-line and command
                // handling never split it.
                let close = rest[1..].find('$').map(|c| c + 2).unwrap_or(1);
                para.push_str(&rest[..close]);
                pos += close;
                continue;
            }

            if bytes[pos] != b'\\' {
                let ch = rest.chars().next().unwrap_or(' ');
                para.push(ch);
                pos += ch.len_utf8();
                continue;
            }

            let (name, end) = command_name(src, pos);
            pos = match name {
                "[" => {
                    self.flush(&mut para);
                    match src[end..].find("\\]") {
                        Some(close) => {
                            self.display_math(&src[end..end + close], None);
                            end + close + 2
                        }
                        None => {
                            self.sink
                                .warn(WarningKind::MalformedMarkup, "unterminated \\[ display math");
                            bytes.len()
                        }
                    }
                }
                "begin" => match group(src, end) {
                    Some((env, body_start)) => {
                        self.flush(&mut para);
                        self.environment(src, env.trim(), body_start)
                    }
                    None => end,
                },
                // Closing tags of environments entered transparently.
                "end" => group(src, end).map(|(_, after)| after).unwrap_or(end),
                "newpage" | "clearpage" | "pagebreak" | "cleardoublepage" => {
                    self.flush(&mut para);
                    self.sink
                        .emit(IntermediateElement::PageBreak(PageBreak::default()));
                    skip_optional(src, end)
                }
                "tableofcontents" => {
                    self.flush(&mut para);
                    let order = self.sink.emit(IntermediateElement::TableOfContents(
                        TableOfContents::default(),
                    ));
                    self.toc_orders.push(order);
                    end
                }
                "par" => {
                    self.flush(&mut para);
                    end
                }
                "includegraphics" => {
                    self.flush(&mut para);
                    let after = skip_optional(src, end);
                    match group(src, after) {
                        Some((path, after)) => {
                            self.image(path.trim(), None);
                            after
                        }
                        None => after,
                    }
                }
                "maketitle" | "noindent" | "centering" | "item" | "appendix" | "frontmatter"
                | "mainmatter" | "backmatter" | "listoffigures" | "listoftables" => end,
                _ if SKIPPED.contains(&name) => skip_arguments(src, end),
                _ => match SECTIONING.iter().find(|(n, _)| *n == name) {
                    Some((_, rank)) => {
                        self.flush(&mut para);
                        self.heading(*rank, src, end)
                    }
                    None => {
                        para.push_str(&src[pos..end]);
                        end
                    }
                },
            };
        }
        self.flush(&mut para);
    }

    /// Emit the buffered paragraph, if any.
    fn flush(&mut self, para: &mut String) {
        if para.trim().is_empty() {
            para.clear();
            return;
        }
        let Inline { text, footnotes } = parse_inline(para);
        para.clear();
        let (text, formatting) = text.finish();
        if !text.is_empty() {
            self.sink.emit(IntermediateElement::Paragraph(Paragraph {
                text,
                formatting,
                ..Default::default()
            }));
        }
        self.footnotes(footnotes);
    }

    fn footnotes(&mut self, footnotes: Vec<String>) {
        if !self.options.extract_notes {
            return;
        }
        for text in footnotes {
            self.footnote_count += 1;
            self.sink.emit(IntermediateElement::Footnote(Note {
                id: self.footnote_count.to_string(),
                text,
                ..Default::default()
            }));
        }
    }

    fn heading(&mut self, rank: u8, src: &str, end: usize) -> usize {
        let mut pos = end;
        if src[pos..].starts_with('*') {
            pos += 1;
        }
        pos = skip_optional(src, pos);
        let Some((title, after)) = group(src, pos) else {
            return pos;
        };
        let level = (rank.saturating_sub(self.top_rank) + 1).clamp(1, 9);
        let Inline { text, footnotes } = parse_inline(title);
        let (text, formatting) = text.finish();
        self.sink.emit(IntermediateElement::Heading(Heading {
            level,
            text,
            formatting,
            ..Default::default()
        }));
        self.footnotes(footnotes);
        after
    }

    fn display_math(&mut self, body: &str, wrapper: Option<&str>) {
        let body = LABEL.replace_all(body, "");
        let body = body.trim();
        if body.is_empty() {
            return;
        }
        let latex = match wrapper {
            Some(env) => format!("\\begin{{{env}}}\n{body}\n\\end{{{env}}}"),
            None => body.to_string(),
        };
        self.sink.emit(IntermediateElement::Equation(Equation {
            latex: Some(latex),
            display: true,
            ..Default::default()
        }));
    }

    /// Dispatch on an environment whose body starts at `body_start`.
    /// Returns the offset after its `\end`.
    fn environment(&mut self, src: &str, env: &str, body_start: usize) -> usize {
        let Some((body_end, after)) = environment_end(src, body_start, env) else {
            self.sink.warn(
                WarningKind::MalformedMarkup,
                format!("environment '{env}' is never closed"),
            );
            return body_start;
        };
        let body = &src[body_start..body_end];
        let base = env.trim_end_matches('*');

        if PLAIN_MATH.contains(&base) {
            self.display_math(body, None);
        } else if ALIGNED_MATH.contains(&base) {
            self.display_math(body, Some(env));
        } else if TABULAR.contains(&base) {
            self.tabular(base, body, None);
        } else if TRANSPARENT.contains(&base) {
            let mut pos = skip_optional(body, 0);
            if matches!(base, "minipage" | "multicols") {
                pos = group(body, pos).map(|(_, after)| after).unwrap_or(pos);
            }
            self.blocks(&body[pos..]);
        } else if let Some(kind) = self.theorem_kind(base) {
            self.theorem(kind, body);
        } else {
            match base {
                "verbatim" | "Verbatim" | "lstlisting" | "minted" => self.code(base, body),
                "table" => self.table_env(body),
                "figure" | "wrapfigure" => self.figure(body),
                "itemize" | "enumerate" | "description" => self.list(base, body, 0),
                "abstract" => self.abstract_env(body),
                "quote" | "quotation" | "verse" => self.quote(body),
                "thebibliography" => self.bibliography(body),
                _ => {
                    if self.unsupported.insert(base.to_string()) {
                        self.sink.warn(
                            WarningKind::UnsupportedElement,
                            format!("unsupported environment '{base}', kept as text"),
                        );
                    }
                    self.blocks(body);
                }
            }
        }
        after
    }

    fn theorem_kind(&self, env: &str) -> Option<String> {
        if let Some(kind) = self.theorem_aliases.get(env) {
            return Some(
                self.options
                    .theorem_kind(kind)
                    .unwrap_or_else(|| kind.clone()),
            );
        }
        self.options.theorem_kind(env)
    }

    fn code(&mut self, env: &str, body: &str) {
        let mut pos = 0;
        let mut language = None;
        if let Some((opts, after)) = optional(body, pos) {
            language = opts.split(',').find_map(|opt| {
                let (key, value) = opt.split_once('=')?;
                (key.trim() == "language")
                    .then(|| value.trim().trim_matches(|c| c == '{' || c == '}').to_string())
            });
            pos = after;
        }
        if env == "minted" {
            if let Some((lang, after)) = group(body, pos) {
                language = Some(lang.trim().to_string());
                pos = after;
            }
        }
        let code = body[pos..]
            .trim_start_matches([' ', '\t'])
            .trim_start_matches('\r')
            .trim_start_matches('\n')
            .trim_end();
        self.sink.emit(IntermediateElement::CodeBlock(CodeBlock {
            code: code.to_string(),
            language: language.filter(|l| !l.is_empty()),
            ..Default::default()
        }));
    }

    fn table_env(&mut self, body: &str) {
        let mut caption = find_command(body, "caption")
            .and_then(|at| group(body, skip_optional(body, at + "\\caption".len())))
            .map(|(text, _)| plain(text));

        let mut found = false;
        let mut cursor = 0;
        while let Some(at) = body[cursor..].find("\\begin{").map(|b| b + cursor) {
            let Some((env, body_start)) = group(body, at + "\\begin".len()) else {
                break;
            };
            let env = env.trim();
            let Some((body_end, after)) = environment_end(body, body_start, env) else {
                break;
            };
            if TABULAR.contains(&env.trim_end_matches('*')) {
                found = true;
                self.tabular(env, &body[body_start..body_end], caption.take());
            }
            cursor = after;
        }
        if !found {
            self.blocks(body);
        }
    }

    fn tabular(&mut self, env: &str, body: &str, caption: Option<String>) {
        let mut pos = skip_optional(body, 0);
        let specs = if matches!(env, "tabularx" | "tabulary" | "tabu") { 2 } else { 1 };
        for _ in 0..specs {
            pos = group(body, pos).map(|(_, after)| after).unwrap_or(pos);
        }
        let body = &body[pos..];

        let raw_rows = split_top_level(body, "\\\\");
        let mut rows = Vec::new();
        let mut has_header_row = false;
        for (index, raw) in raw_rows.iter().enumerate() {
            let (row, _) = strip_rules(raw);
            // Rules at the start of the following segment sit under this row.
            let ruled_below = raw_rows
                .get(index + 1)
                .map(|next| RULE.is_match(next))
                .unwrap_or(false);
            let row = row.trim();
            if row.is_empty() {
                continue;
            }
            let header = rows.is_empty() && ruled_below && raw_rows.len() > 2;
            if header {
                has_header_row = true;
            }
            let cells = split_top_level(row, "&")
                .into_iter()
                .map(|cell| table_cell(cell, header))
                .collect();
            rows.push(TableRow { cells });
        }

        if rows.is_empty() {
            return;
        }
        self.sink.emit(IntermediateElement::Table(Table {
            rows,
            has_header_row,
            caption,
            ..Default::default()
        }));
    }

    fn figure(&mut self, body: &str) {
        let caption = find_command(body, "caption")
            .and_then(|at| group(body, skip_optional(body, at + "\\caption".len())))
            .map(|(text, _)| plain(text))
            .filter(|c| !c.is_empty());

        let mut found = false;
        let mut cursor = 0;
        while let Some(at) = find_command(&body[cursor..], "includegraphics").map(|a| a + cursor) {
            let pos = skip_optional(body, at + "\\includegraphics".len());
            let Some((path, after)) = group(body, pos) else {
                break;
            };
            found = true;
            self.image(path.trim(), caption.clone());
            cursor = after;
        }

        if !found {
            if body.contains("\\begin{tabular") {
                self.table_env(body);
            } else {
                self.blocks(body);
            }
        }
    }

    fn image(&mut self, path: &str, caption: Option<String>) {
        if !self.options.extract_images {
            return;
        }
        match load_image(path, self.options.resource_dir.as_deref()) {
            Ok(loaded) => {
                self.sink.emit(IntermediateElement::Image(Image {
                    data: loaded.data,
                    mime_type: loaded.mime_type,
                    width_px: loaded.width_px,
                    height_px: loaded.height_px,
                    alt_text: caption.clone().unwrap_or_default(),
                    filename: loaded.filename,
                    caption,
                    ..Default::default()
                }));
            }
            Err(reason) => self.sink.warn(WarningKind::ImageExtractionFailed, reason),
        }
    }

    fn list(&mut self, env: &str, body: &str, level: u8) {
        let ordered = env == "enumerate";
        for item in split_at_command(body, "item") {
            let mut pos = 0;
            let mut term = None;
            if let Some((label, after)) = optional(item, 0) {
                term = Some(label);
                pos = after;
            }
            let (text_part, nested) = split_nested_lists(&item[pos..]);

            let Inline { text, footnotes } = parse_inline(&text_part);
            let mut styled = StyledText::new();
            if let Some(term) = term.filter(|_| env == "description") {
                let term = parse_inline(term).text;
                let start = styled.char_len();
                styled.append(term);
                styled.close_span(start, FormattingKind::Bold);
                if !text.is_empty() {
                    styled.push(' ');
                }
            }
            styled.append(text);
            let (text, formatting) = styled.finish();

            if !text.is_empty() {
                self.sink.emit(IntermediateElement::ListItem(ListItem {
                    text,
                    formatting,
                    level,
                    ordered,
                    ..Default::default()
                }));
            }
            self.footnotes(footnotes);
            for (nested_env, nested_body) in nested {
                self.list(nested_env, nested_body, level.saturating_add(1));
            }
        }
    }

    fn abstract_env(&mut self, body: &str) {
        for paragraph in BLANK_LINE.split(body) {
            let Inline { text, footnotes } = parse_inline(paragraph);
            let (text, formatting) = text.finish();
            if !text.is_empty() {
                self.sink.emit(IntermediateElement::Abstract(StyledBlock {
                    text,
                    formatting,
                    ..Default::default()
                }));
            }
            self.footnotes(footnotes);
        }
    }

    fn quote(&mut self, body: &str) {
        let (text, footnotes) = joined_paragraphs(body);
        let (text, formatting) = text.finish();
        if !text.is_empty() {
            self.sink.emit(IntermediateElement::Blockquote(StyledBlock {
                text,
                formatting,
                ..Default::default()
            }));
        }
        self.footnotes(footnotes);
    }

    fn theorem(&mut self, kind: String, body: &str) {
        let mut pos = 0;
        let mut title = None;
        if let Some((raw, after)) = optional(body, 0) {
            title = Some(plain(raw)).filter(|t| !t.is_empty());
            pos = after;
        }
        let (text, footnotes) = joined_paragraphs(&body[pos..]);
        let (text, formatting) = text.finish();
        self.sink.emit(IntermediateElement::Theorem(Theorem {
            kind,
            title,
            text,
            formatting,
            ..Default::default()
        }));
        self.footnotes(footnotes);
    }

    fn bibliography(&mut self, body: &str) {
        let pos = group(body, 0).map(|(_, after)| after).unwrap_or(0);
        for entry in split_at_command(&body[pos..], "bibitem") {
            let pos = skip_optional(entry, 0);
            let (key, rest) = match group(entry, pos) {
                Some((key, after)) => (Some(key.trim().to_string()), &entry[after..]),
                None => (None, &entry[pos..]),
            };
            let text = plain(rest);
            if text.is_empty() && key.is_none() {
                continue;
            }
            self.sink
                .emit(IntermediateElement::BibliographyEntry(BibliographyEntry {
                    key: key.filter(|k| !k.is_empty()),
                    text,
                    ..Default::default()
                }));
        }
    }

    /// Fill every table of contents with the headings of the document.
    fn fill_tables_of_contents(&mut self) {
        if self.toc_orders.is_empty() {
            return;
        }
        let entries: Vec<TocEntry> = self
            .sink
            .elements()
            .iter()
            .filter_map(|element| match element {
                IntermediateElement::Heading(h) => Some(TocEntry {
                    level: h.level,
                    text: h.text.clone(),
                    page: None,
                }),
                _ => None,
            })
            .collect();
        for order in &self.toc_orders {
            if let Some(IntermediateElement::TableOfContents(toc)) =
                self.sink.elements_mut().get_mut(*order)
            {
                toc.entries = entries.clone();
            }
        }
    }
}

fn skip_optional(src: &str, pos: usize) -> usize {
    optional(src, pos).map(|(_, after)| after).unwrap_or(pos)
}

/// Skip a star, optional arguments and mandatory arguments.
fn skip_arguments(src: &str, mut pos: usize) -> usize {
    if src[pos..].starts_with('*') {
        pos += 1;
    }
    loop {
        if let Some((_, after)) = optional(src, pos) {
            pos = after;
        } else if let Some((_, after)) = group(src, pos) {
            pos = after;
        } else if src[pos..].starts_with('\\') && src[..pos].ends_with("newcommand") {
            // `\newcommand\foo{...}`
            let (_, after) = command_name(src, pos);
            pos = after;
        } else {
            return pos;
        }
    }
}

/// Remove leading rule commands; returns the rest and whether any was found.
fn strip_rules(row: &str) -> (&str, bool) {
    let mut rest = row;
    let mut found = false;
    while let Some(m) = RULE.find(rest) {
        rest = &rest[m.end()..];
        found = true;
    }
    (rest, found)
}

fn table_cell(raw: &str, header: bool) -> TableCell {
    let raw = raw.trim();
    let mut col_span = 1;
    let mut content = raw;
    if raw.starts_with("\\multicolumn") {
        let pos = "\\multicolumn".len();
        let spanned = group(raw, pos).and_then(|(n, after)| {
            let (_, after) = group(raw, after)?;
            let (text, _) = group(raw, after)?;
            Some((n.trim().parse::<usize>().unwrap_or(1), text))
        });
        if let Some((n, text)) = spanned {
            col_span = n.max(1);
            content = text;
        }
    }
    let mut cell = TableCell::new(plain(content));
    cell.col_span = col_span;
    cell.header = header;
    cell
}

/// Segments following each top-level `\name`, skipping nested environments.
fn split_at_command<'a>(body: &'a str, name: &str) -> Vec<&'a str> {
    let needle = format!("\\{name}");
    let mut starts = Vec::new();
    let mut pos = 0;
    while pos < body.len() {
        let rest = &body[pos..];
        if rest.starts_with("\\begin{") {
            let nested = group(body, pos + "\\begin".len()).and_then(|(env, body_start)| {
                environment_end(body, body_start, env.trim()).map(|(_, after)| after)
            });
            pos = nested.unwrap_or(pos + 1);
            continue;
        }
        if rest.starts_with(&needle)
            && !rest[needle.len()..]
                .chars()
                .next()
                .map(|c| c.is_ascii_alphabetic())
                .unwrap_or(false)
        {
            starts.push(pos);
            pos += needle.len();
            continue;
        }
        pos += rest.chars().next().map(char::len_utf8).unwrap_or(1);
    }

    let mut segments = Vec::with_capacity(starts.len());
    for (i, start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(body.len());
        segments.push(&body[start + needle.len()..end]);
    }
    segments
}

/// Separate an item's own text from the lists nested in it.
fn split_nested_lists(item: &str) -> (String, Vec<(&'static str, &str)>) {
    let mut text = String::new();
    let mut nested = Vec::new();
    let mut pos = 0;
    while let Some(at) = item[pos..].find("\\begin{").map(|b| b + pos) {
        let Some((env, body_start)) = group(item, at + "\\begin".len()) else {
            break;
        };
        let env_name: &'static str = match env.trim() {
            "itemize" => "itemize",
            "enumerate" => "enumerate",
            "description" => "description",
            _ => {
                text.push_str(&item[pos..body_start]);
                pos = body_start;
                continue;
            }
        };
        let Some((body_end, after)) = environment_end(item, body_start, env_name) else {
            break;
        };
        text.push_str(&item[pos..at]);
        nested.push((env_name, &item[body_start..body_end]));
        pos = after;
    }
    text.push_str(&item[pos..]);
    (text, nested)
}

/// Inline content of every paragraph in `body`, joined with blank lines.
fn joined_paragraphs(body: &str) -> (StyledText, Vec<String>) {
    let mut joined = StyledText::new();
    let mut footnotes = Vec::new();
    for paragraph in BLANK_LINE.split(body) {
        let inline = parse_inline(paragraph);
        if inline.text.is_empty() {
            continue;
        }
        if !joined.is_empty() {
            joined.push_str("\n\n");
        }
        joined.append(inline.text);
        footnotes.extend(inline.footnotes);
    }
    (joined, footnotes)
}
