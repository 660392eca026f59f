//! Format registry for format discovery and selection
//!
//! This module provides a centralized registry for all available formats.
//! Formats can be registered and retrieved by name or by file extension.

use crate::error::FormatError;
use crate::format::Format;
use crate::ir::IntermediateDocument;
use crate::options::ParseOptions;
use crate::tree::Document;
use std::collections::HashMap;
use std::path::Path;

/// Registry of document formats
///
/// # Examples
///
/// ```ignore
/// let registry = FormatRegistry::with_defaults();
/// let format = registry.detect_from_path(Path::new("paper.tex"))?;
/// let doc = format.parse(&bytes, &ParseOptions::default())?;
/// ```
pub struct FormatRegistry {
    formats: HashMap<String, Box<dyn Format>>,
}

impl FormatRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        FormatRegistry {
            formats: HashMap::new(),
        }
    }

    /// Register a format
    ///
    /// If a format with the same name already exists, it will be replaced.
    pub fn register<F: Format + 'static>(&mut self, format: F) {
        self.formats
            .insert(format.name().to_string(), Box::new(format));
    }

    /// Get a format by name
    pub fn get(&self, name: &str) -> Result<&dyn Format, FormatError> {
        self.formats
            .get(name)
            .map(|f| f.as_ref())
            .ok_or_else(|| FormatError::FormatNotFound(name.to_string()))
    }

    /// Check if a format exists
    pub fn has(&self, name: &str) -> bool {
        self.formats.contains_key(name)
    }

    /// List all available format names (sorted)
    pub fn list_formats(&self) -> Vec<String> {
        let mut names: Vec<_> = self.formats.keys().cloned().collect();
        names.sort();
        names
    }

    /// Every registered format, sorted by name.
    pub fn formats(&self) -> Vec<&dyn Format> {
        let mut formats: Vec<&dyn Format> = self.formats.values().map(|f| f.as_ref()).collect();
        formats.sort_by(|a, b| a.name().cmp(b.name()));
        formats
    }

    /// Format whose extension list contains `extension` (case-insensitive,
    /// leading dot optional).
    pub fn by_extension(&self, extension: &str) -> Option<&dyn Format> {
        let extension = extension.trim_start_matches('.').to_ascii_lowercase();
        self.formats
            .values()
            .map(|f| f.as_ref())
            .find(|f| f.file_extensions().contains(&extension.as_str()))
    }

    /// Detect format from a path based on its extension
    ///
    /// Returns the format name if a matching extension is found, or None otherwise.
    pub fn detect_format_from_filename(&self, filename: &str) -> Option<String> {
        let extension = Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())?;
        self.by_extension(extension).map(|f| f.name().to_string())
    }

    /// The format for a file, by extension.
    pub fn detect_from_path(&self, path: &Path) -> Result<&dyn Format, FormatError> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| self.by_extension(ext))
            .ok_or_else(|| FormatError::FormatNotFound(path.display().to_string()))
    }

    /// Parse source bytes using the specified format
    pub fn parse(
        &self,
        source: &[u8],
        format: &str,
        options: &ParseOptions,
    ) -> Result<IntermediateDocument, FormatError> {
        let fmt = self.get(format)?;
        if !fmt.supports_parsing() {
            return Err(FormatError::NotSupported(format!(
                "Format '{format}' does not support parsing"
            )));
        }
        fmt.parse(source, options)
    }

    /// Export a document tree using the specified format
    pub fn export(&self, doc: &Document, format: &str) -> Result<Vec<u8>, FormatError> {
        let fmt = self.get(format)?;
        if !fmt.supports_export() {
            return Err(FormatError::NotSupported(format!(
                "Format '{format}' does not support export"
            )));
        }
        fmt.export(doc)
    }

    /// Create a registry with default formats
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        registry.register(crate::formats::docx::DocxFormat::new());
        registry.register(crate::formats::latex::LatexFormat);
        registry.register(crate::formats::markdown::MarkdownFormat);

        registry
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test format
    struct TestFormat;
    impl Format for TestFormat {
        fn name(&self) -> &str {
            "test"
        }
        fn description(&self) -> &str {
            "Test format"
        }
        fn file_extensions(&self) -> &[&str] {
            &["tst"]
        }
        fn supports_parsing(&self) -> bool {
            true
        }
        fn parse(
            &self,
            _source: &[u8],
            _options: &ParseOptions,
        ) -> Result<IntermediateDocument, FormatError> {
            Ok(IntermediateDocument {
                title: Some("test".to_string()),
                ..Default::default()
            })
        }
    }

    #[test]
    fn test_registry_creation() {
        let registry = FormatRegistry::new();
        assert_eq!(registry.formats.len(), 0);
    }

    #[test]
    fn test_registry_register() {
        let mut registry = FormatRegistry::new();
        registry.register(TestFormat);

        assert!(registry.has("test"));
        assert_eq!(registry.list_formats(), vec!["test"]);
    }

    #[test]
    fn test_registry_get_nonexistent() {
        let registry = FormatRegistry::new();
        match registry.get("nonexistent") {
            Err(FormatError::FormatNotFound(name)) => assert_eq!(name, "nonexistent"),
            _ => panic!("Expected FormatNotFound error"),
        }
    }

    #[test]
    fn test_registry_parse() {
        let mut registry = FormatRegistry::new();
        registry.register(TestFormat);

        let doc = registry
            .parse(b"input", "test", &ParseOptions::default())
            .unwrap();
        assert_eq!(doc.title.as_deref(), Some("test"));
    }

    #[test]
    fn test_registry_export_not_supported() {
        let mut registry = FormatRegistry::new();
        registry.register(TestFormat);

        let result = registry.export(&Document::default(), "test");
        assert!(matches!(result, Err(FormatError::NotSupported(_))));
    }

    #[test]
    fn test_registry_replace_format() {
        let mut registry = FormatRegistry::new();
        registry.register(TestFormat);
        registry.register(TestFormat); // Replace

        assert_eq!(registry.list_formats().len(), 1);
    }

    #[test]
    fn test_registry_with_defaults() {
        let registry = FormatRegistry::default();
        assert_eq!(registry.list_formats(), vec!["docx", "latex", "markdown"]);
        assert!(registry.get("docx").unwrap().supports_export());
        assert!(!registry.get("latex").unwrap().supports_export());
    }

    #[test]
    fn test_detect_format_from_filename() {
        let registry = FormatRegistry::with_defaults();

        assert_eq!(
            registry.detect_format_from_filename("/path/to/report.docx"),
            Some("docx".to_string())
        );
        assert_eq!(
            registry.detect_format_from_filename("paper.tex"),
            Some("latex".to_string())
        );
        assert_eq!(
            registry.detect_format_from_filename("paper.ltx"),
            Some("latex".to_string())
        );
        assert_eq!(
            registry.detect_format_from_filename("README.MD"),
            Some("markdown".to_string())
        );

        assert_eq!(registry.detect_format_from_filename("doc.unknown"), None);
        assert_eq!(registry.detect_format_from_filename("doc"), None);
    }

    #[test]
    fn test_detect_from_path_errors_on_unknown_extension() {
        let registry = FormatRegistry::with_defaults();
        assert!(matches!(
            registry.detect_from_path(Path::new("notes.odt")),
            Err(FormatError::FormatNotFound(_))
        ));
        assert_eq!(
            registry.detect_from_path(Path::new("a.markdown")).unwrap().name(),
            "markdown"
        );
    }
}
