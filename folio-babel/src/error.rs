//! Error types for format and conversion operations
//!
//! Only whole-file problems surface as errors. Anything that goes wrong with a
//! single element is recorded as an [`crate::ir::Warning`] instead and the run
//! carries on.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during format operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormatError {
    /// Format not found in registry
    #[error("Format '{0}' not found")]
    FormatNotFound(String),
    /// Input file does not exist or cannot be read
    #[error("File not found: '{}'", path.display())]
    FileNotFound { path: PathBuf },
    /// The package container or one of its required parts is unreadable
    #[error("Corrupt package: {0}")]
    CorruptPackage(String),
    /// Error during parsing
    #[error("Parse error: {0}")]
    ParseError(String),
    /// Error during serialization
    #[error("Serialization error: {0}")]
    SerializationError(String),
    /// Format does not support the requested operation
    #[error("Operation not supported: {0}")]
    NotSupported(String),
}

/// Errors raised by the structural converter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConvertError {
    /// The caller's cancellation check returned true between two elements.
    #[error("Conversion cancelled after {processed} of {total} elements")]
    Cancelled { processed: usize, total: usize },
}
