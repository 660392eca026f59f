//! File import: read, detect the format, parse, convert.

use crate::convert::{ConversionResult, ConvertHooks, ConvertOptions, Converter};
use crate::error::{ConvertError, FormatError};
use crate::ir::IntermediateDocument;
use crate::media::{ImageOptimizer, OptimizerOptions};
use crate::options::ParseOptions;
use crate::registry::FormatRegistry;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Everything one import needs besides the path.
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// Format name; detected from the file extension when `None`.
    pub format: Option<String>,
    pub parse: ParseOptions,
    pub convert: ConvertOptions,
    pub optimizer: OptimizerOptions,
}

/// Both stages of one import, so callers can inspect the flat elements too.
#[derive(Debug, Clone)]
pub struct ImportOutcome {
    pub intermediate: IntermediateDocument,
    pub result: ConversionResult,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ImportError {
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Convert(#[from] ConvertError),
}

/// Import `path` with the default formats.
pub fn import_file(path: &Path, options: &ImportOptions) -> Result<ImportOutcome, ImportError> {
    import_file_with(&FormatRegistry::with_defaults(), path, options, &mut ConvertHooks::none())
}

/// Import `path` with a caller-supplied registry and hooks.
pub fn import_file_with(
    registry: &FormatRegistry,
    path: &Path,
    options: &ImportOptions,
    hooks: &mut ConvertHooks<'_>,
) -> Result<ImportOutcome, ImportError> {
    let intermediate = parse_file(registry, path, options)?;
    let converter = Converter::new(options.convert.clone())
        .with_optimizer(ImageOptimizer::new(options.optimizer.clone()));
    let result = converter.convert(&intermediate, hooks)?;
    info!(
        path = %path.display(),
        sections = result.statistics.sections,
        blocks = result.statistics.blocks,
        warnings = result.warnings.len(),
        "imported"
    );
    Ok(ImportOutcome {
        intermediate,
        result,
    })
}

/// Stage one only: read and parse `path`.
pub fn parse_file(
    registry: &FormatRegistry,
    path: &Path,
    options: &ImportOptions,
) -> Result<IntermediateDocument, FormatError> {
    let source = std::fs::read(path).map_err(|err| {
        debug!(path = %path.display(), %err, "cannot read input");
        FormatError::FileNotFound {
            path: path.to_path_buf(),
        }
    })?;

    let format = match options.format.as_deref() {
        Some(name) => registry.get(name)?,
        None => registry.detect_from_path(path)?,
    };
    if !format.supports_parsing() {
        return Err(FormatError::NotSupported(format!(
            "Format '{}' does not support parsing",
            format.name()
        )));
    }

    let mut parse = options.parse.clone();
    if parse.resource_dir.is_none() {
        parse.resource_dir = Some(resource_dir(path));
    }
    debug!(path = %path.display(), format = format.name(), bytes = source.len(), "parsing");

    let mut doc = format.parse(&source, &parse)?;
    doc.source_path = Some(path.to_path_buf());
    Ok(doc)
}

fn resource_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::BlockType;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn missing_file_is_file_not_found() {
        let err = import_file(Path::new("/no/such/file.md"), &ImportOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            ImportError::Format(FormatError::FileNotFound { .. })
        ));
    }

    #[test]
    fn unknown_extension_is_format_not_found() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.odt");
        fs::write(&path, "x").unwrap();
        let err = import_file(&path, &ImportOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            ImportError::Format(FormatError::FormatNotFound(_))
        ));
    }

    #[test]
    fn markdown_file_imports_end_to_end() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("paper.md");
        fs::write(&path, "# Title\n\nSome **bold** text.\n").unwrap();

        let outcome = import_file(&path, &ImportOptions::default()).unwrap();
        assert_eq!(outcome.intermediate.source_path.as_deref(), Some(path.as_path()));
        let doc = &outcome.result.document;
        assert_eq!(doc.sections.len(), 1);
        assert_eq!(doc.sections[0].title, "Title");
        let block = &doc.sections[0].blocks[0];
        assert_eq!(block.block_type, BlockType::Paragraph);
        assert_eq!(block.content, "Some \\textbf{bold} text.");
    }

    #[test]
    fn explicit_format_overrides_the_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("paper.txt");
        fs::write(&path, "\\section{Intro}\nHello.\n").unwrap();

        let options = ImportOptions {
            format: Some("latex".to_string()),
            ..Default::default()
        };
        let outcome = import_file(&path, &options).unwrap();
        assert_eq!(outcome.result.document.sections[0].title, "Intro");
        // The file stem stands in for a missing title.
        assert_eq!(outcome.result.document.title, "paper");
    }

    #[test]
    fn resource_dir_defaults_to_the_parent() {
        assert_eq!(resource_dir(Path::new("docs/a.md")), PathBuf::from("docs"));
        assert_eq!(resource_dir(Path::new("a.md")), PathBuf::from("."));
    }
}
