//! Format implementations
//!
//! Each format turns source bytes into an [`crate::ir::IntermediateDocument`];
//! `docx` also exports a normalized [`crate::tree::Document`]. Helpers shared by
//! the parsers live in [`common`].

pub mod common;
pub mod docx;
pub mod latex;
pub mod markdown;

pub use docx::DocxFormat;
pub use latex::LatexFormat;
pub use markdown::MarkdownFormat;
