//! Format trait definition
//!
//! Every importable or exportable document format implements [`Format`]. Parsing
//! goes from source bytes to an [`IntermediateDocument`]; exporting goes from a
//! normalized [`Document`] tree to package bytes. A format may support either
//! direction or both.

use crate::error::FormatError;
use crate::ir::IntermediateDocument;
use crate::options::ParseOptions;
use crate::tree::Document;

/// Trait for document formats
///
/// # Examples
///
/// ```ignore
/// struct PlainText;
///
/// impl Format for PlainText {
///     fn name(&self) -> &str {
///         "text"
///     }
///
///     fn supports_parsing(&self) -> bool {
///         true
///     }
///
///     fn parse(
///         &self,
///         source: &[u8],
///         options: &ParseOptions,
///     ) -> Result<IntermediateDocument, FormatError> {
///         let text = decode_utf8(source)?;
///         // emit one paragraph per line ...
///         todo!()
///     }
/// }
/// ```
pub trait Format: Send + Sync {
    /// The name of this format (e.g., "docx", "latex", "markdown")
    fn name(&self) -> &str;

    /// Optional description of this format
    fn description(&self) -> &str {
        ""
    }

    /// File extensions associated with this format, without the leading dot.
    /// Used for automatic format detection from filenames.
    fn file_extensions(&self) -> &[&str] {
        &[]
    }

    /// Whether this format supports parsing (source → intermediate document)
    fn supports_parsing(&self) -> bool {
        false
    }

    /// Whether this format supports export (document tree → bytes)
    fn supports_export(&self) -> bool {
        false
    }

    /// Parse source bytes into an intermediate document
    ///
    /// Default implementation returns NotSupported error.
    fn parse(
        &self,
        _source: &[u8],
        _options: &ParseOptions,
    ) -> Result<IntermediateDocument, FormatError> {
        Err(FormatError::NotSupported(format!(
            "Format '{}' does not support parsing",
            self.name()
        )))
    }

    /// Export a normalized document tree
    ///
    /// Default implementation returns NotSupported error.
    fn export(&self, _doc: &Document) -> Result<Vec<u8>, FormatError> {
        Err(FormatError::NotSupported(format!(
            "Format '{}' does not support export",
            self.name()
        )))
    }
}

/// Source bytes as UTF-8 text, without a leading byte order mark.
pub fn decode_utf8(source: &[u8]) -> Result<&str, FormatError> {
    let text = std::str::from_utf8(source)
        .map_err(|e| FormatError::ParseError(format!("source is not valid UTF-8: {e}")))?;
    Ok(text.strip_prefix('\u{feff}').unwrap_or(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ParseOnly;

    impl Format for ParseOnly {
        fn name(&self) -> &str {
            "parse-only"
        }

        fn supports_parsing(&self) -> bool {
            true
        }

        fn parse(
            &self,
            source: &[u8],
            _options: &ParseOptions,
        ) -> Result<IntermediateDocument, FormatError> {
            let text = decode_utf8(source)?;
            Ok(IntermediateDocument {
                title: Some(text.to_string()),
                ..Default::default()
            })
        }
    }

    #[test]
    fn export_defaults_to_not_supported() {
        let err = ParseOnly.export(&Document::default()).unwrap_err();
        assert!(matches!(err, FormatError::NotSupported(_)));
    }

    #[test]
    fn bom_is_stripped() {
        let doc = ParseOnly
            .parse("\u{feff}hello".as_bytes(), &ParseOptions::default())
            .expect("parses");
        assert_eq!(doc.title.as_deref(), Some("hello"));
    }

    #[test]
    fn invalid_utf8_is_a_parse_error() {
        assert!(matches!(
            decode_utf8(&[0xff, 0xfe, 0x00]),
            Err(FormatError::ParseError(_))
        ));
    }
}
