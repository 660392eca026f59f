//! LaTeX format implementation
//!
//! Import only. There is no mature LaTeX parser crate that keeps the document
//! structure we need, so the source is read with a small hand-written scanner
//! (see [`scan`]) over comment-stripped text.
//!
//! # Element Mapping Table
//!
//! | LaTeX                                        | Intermediate element                  |
//! |----------------------------------------------|---------------------------------------|
//! | `\title`, `\author`, `\date`                 | Metadata (`title` → document title)   |
//! | `\part` … `\subparagraph`                    | Heading (level relative to top rank)  |
//! | Text separated by blank lines                | Paragraph                             |
//! | `equation`, `\[…\]`, `$$…$$`                 | Equation (display)                    |
//! | `align`, `gather`, `multline` (+ starred)    | Equation, wrapper kept                |
//! | `lstlisting`, `verbatim`, `minted`           | CodeBlock                             |
//! | `tabular` (in `table` with `\caption`)       | Table                                 |
//! | `figure` + `\includegraphics`                | Image                                 |
//! | `itemize`, `enumerate`, `description`        | ListItem                              |
//! | `abstract` / `quote`, `quotation`            | Abstract / Blockquote                 |
//! | Theorem-like environments, `\newtheorem`     | Theorem                               |
//! | `thebibliography` + `\bibitem`               | BibliographyEntry                     |
//! | `\newpage`, `\clearpage`, `\pagebreak`       | PageBreak                             |
//! | `\tableofcontents`                           | TableOfContents (from headings)       |
//! | `\footnote{…}`                               | Footnote after the paragraph          |
//!
//! Unknown environments keep their text as paragraphs and record one
//! `UnsupportedElement` warning per environment name.

pub mod inline;
pub mod parser;
pub mod scan;

use crate::error::FormatError;
use crate::format::{decode_utf8, Format};
use crate::ir::IntermediateDocument;
use crate::options::ParseOptions;

/// Format implementation for LaTeX sources
pub struct LatexFormat;

impl Format for LatexFormat {
    fn name(&self) -> &str {
        "latex"
    }

    fn description(&self) -> &str {
        "LaTeX article sources"
    }

    fn file_extensions(&self) -> &[&str] {
        &["tex", "latex", "ltx"]
    }

    fn supports_parsing(&self) -> bool {
        true
    }

    fn parse(
        &self,
        source: &[u8],
        options: &ParseOptions,
    ) -> Result<IntermediateDocument, FormatError> {
        parser::parse_latex(decode_utf8(source)?, options)
    }
}
