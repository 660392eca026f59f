//! Intermediate Representation (IR) produced by the format parsers.
//!
//! Every parser flattens its source into an ordered sequence of
//! [`IntermediateElement`]s. The sequence carries no hierarchy: sections are
//! rebuilt later by the converter (see `crate::convert`), which keeps format
//! specific code focused on recognizing structure rather than nesting it.

pub mod elements;
pub mod sink;
pub mod spans;

pub use elements::*;
pub use sink::ElementSink;
pub use spans::{FormattingKind, FormattingSpan, StyledText};
