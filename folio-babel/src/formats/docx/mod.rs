//! Word-processing package (`.docx`) format implementation
//!
//! Import and export. The package is a zip archive (read and written with the
//! `zip` crate) of XML parts, which are parsed with `roxmltree`. Style and
//! numbering definitions are resolved first so that classification sees the
//! effective properties of every paragraph and run.
//!
//! # Element Mapping Table
//!
//! | WordprocessingML                                 | Intermediate element              |
//! |--------------------------------------------------|-----------------------------------|
//! | Heading/Title styles, outline level              | Heading                           |
//! | Bold, large or numbered short paragraph          | Heading (heuristic, configurable) |
//! | Paragraph with `w:numPr`                         | ListItem (ordered from numbering) |
//! | Consecutive monospace/code-styled paragraphs     | CodeBlock (merged)                |
//! | Abstract / Quote / Bibliography styles           | Abstract / Blockquote / Bibliography |
//! | Theorem-like style or bold `Lemma 2.` label      | Theorem                           |
//! | `w:tbl`                                          | Table                             |
//! | `w:drawing`, `w:pict` (+ Caption paragraph)      | Image                             |
//! | `m:oMathPara` / `m:oMath`                        | Equation (OMML → LaTeX)           |
//! | `w:br w:type="page"`, `pageBreakBefore`          | PageBreak                         |
//! | Header/footer parts of the last section          | Header (first) / Footer (last)    |
//! | Footnote, endnote and comment references         | Footnote / Endnote / Comment      |
//! | `w:ins` / `w:del`                                | TrackChange                       |
//! | Table of Contents content control                | TableOfContents                   |
//!
//! Export writes the reverse mapping with a fixed style sheet and numbering
//! definitions, so a written package parses back into the same element kinds.

pub mod detect;
pub mod notes;
pub mod numbering;
pub mod package;
pub mod parser;
pub mod styles;
#[cfg(test)]
mod testing;
pub mod writer;
pub mod xml;

use crate::error::FormatError;
use crate::format::Format;
use crate::ir::IntermediateDocument;
use crate::math::{MathConverter, OmmlConverter};
use crate::options::ParseOptions;
use crate::tree::Document;
use std::sync::Arc;

/// Format implementation for `.docx` packages
#[derive(Clone)]
pub struct DocxFormat {
    math: Arc<dyn MathConverter>,
}

impl DocxFormat {
    pub fn new() -> Self {
        Self::with_math_converter(Arc::new(OmmlConverter))
    }

    /// Use `math` for equation conversion instead of the built-in OMML converter.
    pub fn with_math_converter(math: Arc<dyn MathConverter>) -> Self {
        Self { math }
    }
}

impl Default for DocxFormat {
    fn default() -> Self {
        Self::new()
    }
}

impl Format for DocxFormat {
    fn name(&self) -> &str {
        "docx"
    }

    fn description(&self) -> &str {
        "Office Open XML word-processing packages"
    }

    fn file_extensions(&self) -> &[&str] {
        &["docx"]
    }

    fn supports_parsing(&self) -> bool {
        true
    }

    fn supports_export(&self) -> bool {
        true
    }

    fn parse(
        &self,
        source: &[u8],
        options: &ParseOptions,
    ) -> Result<IntermediateDocument, FormatError> {
        parser::parse_docx(source, options, self.math.as_ref())
    }

    fn export(&self, doc: &Document) -> Result<Vec<u8>, FormatError> {
        writer::write_docx(doc)
    }
}
