//! Markdown format implementation
//!
//! Import only. We use the `comrak` crate for Markdown parsing: CommonMark plus
//! the GFM extensions documents in the wild rely on (tables, strikethrough,
//! superscript, footnotes), dollar math and `---` front matter.
//!
//! # Element Mapping Table
//!
//! | Markdown                      | Intermediate element                      |
//! |-------------------------------|-------------------------------------------|
//! | `#`…`######` heading          | Heading (same level)                      |
//! | `## Abstract` + paragraphs    | Abstract (the heading itself is dropped)  |
//! | `# References` + items        | Heading, then BibliographyEntry per item  |
//! | Paragraph                     | Paragraph with formatting spans           |
//! | Paragraph of `$$…$$` only     | Equation (display)                        |
//! | Fenced code                   | CodeBlock; `math`/`latex` info → Equation |
//! | List item                     | ListItem (nested lists: level + 1)        |
//! | Block quote                   | Blockquote                                |
//! | GFM table                     | Table with header row                     |
//! | Image                         | Image (file, `data:` URI; remote → warning) |
//! | Footnote definition           | Footnote, after the referencing block     |
//! | `<!-- pagebreak -->`          | PageBreak                                 |
//! | Front matter                  | Metadata; `title` → document title        |
//!
//! Inline: `**` Bold, `*` Italic, `~~` Strikethrough, `^` Superscript, code
//! spans FontFamily("monospace"), `$…$` Math. Links keep their text.

pub mod parser;

use crate::error::FormatError;
use crate::format::{decode_utf8, Format};
use crate::ir::IntermediateDocument;
use crate::options::ParseOptions;

/// Format implementation for Markdown
pub struct MarkdownFormat;

impl Format for MarkdownFormat {
    fn name(&self) -> &str {
        "markdown"
    }

    fn description(&self) -> &str {
        "CommonMark Markdown with GFM extensions"
    }

    fn file_extensions(&self) -> &[&str] {
        &["md", "markdown"]
    }

    fn supports_parsing(&self) -> bool {
        true
    }

    fn parse(
        &self,
        source: &[u8],
        options: &ParseOptions,
    ) -> Result<IntermediateDocument, FormatError> {
        parser::parse_markdown(decode_utf8(source)?, options)
    }
}
