//! Document import, normalization and export for folio
//!
//!     This crate turns word-processing packages (`.docx`), LaTeX sources and Markdown into one
//!     normalized tree of sections, blocks and assets, and writes that tree back out as `.docx`.
//!
//!     It is a pure library: nothing here prints, reads environment variables or assumes a shell.
//!     The folio CLI and any persistence layer sit on top of it.
//!
//! Architecture
//!
//!     Conversion runs in two stages with a flat representation in between:
//!
//!         source bytes ──parse──▶ IntermediateDocument ──convert──▶ Document (tree)
//!
//!     Stage one is format specific. Each parser walks its source once and emits an ordered
//!     sequence of intermediate elements (./ir) through an ElementSink, which stamps the order.
//!     Parsers recognize structure (headings, lists, tables, equations...) but never nest it.
//!
//!     Stage two (./convert) is format agnostic. It rebuilds the section hierarchy from heading
//!     levels, renders every other element as a block whose content is LaTeX-flavoured markup
//!     (./markup), optimizes images into assets, and enforces the section/block limits.
//!
//!     The file structure :
//!     .
//!     ├── error.rs               # FormatError (whole-file) and ConvertError
//!     ├── format.rs              # Format trait definition
//!     ├── registry.rs            # FormatRegistry for discovery and selection
//!     ├── pipeline.rs            # read → detect → parse → convert
//!     ├── options.rs             # parser thresholds and style patterns
//!     ├── formats
//!     │   ├── docx               # package, styles, numbering, parser, writer
//!     │   ├── latex              # scanner and parser
//!     │   ├── markdown           # comrak based parser
//!     │   └── common             # image loading shared by the text formats
//!     ├── ir                     # intermediate elements, spans, sink
//!     ├── convert                # section builder and block rendering
//!     ├── markup.rs              # span ↔ markup serialization
//!     ├── math                   # OMML → LaTeX
//!     ├── media                  # image codec and optimizer
//!     └── tree.rs                # the normalized tree
//!
//! Errors
//!
//!     Only whole-file problems are errors: a missing file, an unreadable package, text that is
//!     not UTF-8. Everything that goes wrong with one element (an image that cannot be extracted,
//!     an equation that does not convert, an unknown environment) becomes a Warning and the run
//!     carries on. A successful result with warnings is the normal case for real documents.
//!
//! Testing
//!     tests
//!     └── <format>
//!         └── <testname>.rs
//!
//!     Rust does not discover tests in subdirectories by default, so tests/lib.rs includes
//!     them as modules. Package fixtures are built in memory with the zip crate.
//!
pub mod convert;
pub mod error;
pub mod format;
pub mod formats;
pub mod ir;
pub mod markup;
pub mod math;
pub mod media;
pub mod options;
pub mod pipeline;
pub mod registry;
pub mod tree;

pub use convert::{ConversionResult, ConvertHooks, ConvertOptions, Converter};
pub use error::{ConvertError, FormatError};
pub use format::Format;
pub use ir::{IntermediateDocument, IntermediateElement, Warning, WarningKind};
pub use options::ParseOptions;
pub use pipeline::{import_file, ImportError, ImportOptions, ImportOutcome};
pub use registry::FormatRegistry;
pub use tree::Document;
