//! Shared configuration loader for the folio toolchain.
//!
//! `defaults/folio.default.toml` is embedded into every binary so that docs and
//! runtime behavior stay in sync. Applications layer user-specific files on top
//! of those defaults via [`Loader`] before deserializing into [`FolioConfig`],
//! whose groups convert into the option types of `folio-babel`.

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat, ValueKind};
use folio_babel::convert::{ConvertOptions, EquationFallback};
use folio_babel::media::OptimizerOptions;
use folio_babel::options::{CodeDetection, HeadingDetection, ParseOptions};
use folio_babel::pipeline::ImportOptions;
use serde::Deserialize;
use std::path::Path;

const DEFAULT_TOML: &str = include_str!("../defaults/folio.default.toml");

/// File picked up from the working directory when present.
pub const LOCAL_CONFIG_FILE: &str = "folio.toml";

/// Top-level configuration consumed by folio applications.
#[derive(Debug, Clone, Deserialize)]
pub struct FolioConfig {
    pub parse: ParseConfig,
    pub convert: ConvertConfig,
    pub optimizer: OptimizerConfig,
}

impl FolioConfig {
    /// Options for one file import; the format is left to detection.
    pub fn import_options(&self) -> ImportOptions {
        ImportOptions {
            format: None,
            parse: (&self.parse).into(),
            convert: (&self.convert).into(),
            optimizer: (&self.optimizer).into(),
        }
    }
}

/// Parser thresholds and style-name patterns.
#[derive(Debug, Clone, Deserialize)]
pub struct ParseConfig {
    pub heading: HeadingConfig,
    pub code: CodeConfig,
    pub abstract_patterns: Vec<String>,
    pub quote_patterns: Vec<String>,
    pub bibliography_patterns: Vec<String>,
    pub theorem_kinds: Vec<String>,
    pub extract_images: bool,
    pub extract_headers_footers: bool,
    pub extract_notes: bool,
    pub extract_comments: bool,
    pub extract_track_changes: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HeadingConfig {
    pub min_level: u8,
    pub max_level: u8,
    pub heuristics: bool,
    pub numbered_min_font_pt: f32,
    pub uppercase_min_font_pt: f32,
    pub bold_level1_font_pt: f32,
    pub bold_level2_font_pt: f32,
    pub numbered_max_chars: usize,
    pub uppercase_max_chars: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CodeConfig {
    pub style_patterns: Vec<String>,
    pub monospace_fonts: Vec<String>,
    pub gray_tolerance: u8,
    pub gray_lightness_floor: u8,
}

impl From<&HeadingConfig> for HeadingDetection {
    fn from(config: &HeadingConfig) -> Self {
        HeadingDetection {
            min_level: config.min_level,
            max_level: config.max_level,
            heuristics: config.heuristics,
            numbered_min_font_pt: config.numbered_min_font_pt,
            uppercase_min_font_pt: config.uppercase_min_font_pt,
            bold_level1_font_pt: config.bold_level1_font_pt,
            bold_level2_font_pt: config.bold_level2_font_pt,
            numbered_max_chars: config.numbered_max_chars,
            uppercase_max_chars: config.uppercase_max_chars,
        }
    }
}

impl From<&CodeConfig> for CodeDetection {
    fn from(config: &CodeConfig) -> Self {
        CodeDetection {
            style_patterns: config.style_patterns.clone(),
            monospace_fonts: config.monospace_fonts.clone(),
            gray_tolerance: config.gray_tolerance,
            gray_lightness_floor: config.gray_lightness_floor,
        }
    }
}

impl From<&ParseConfig> for ParseOptions {
    fn from(config: &ParseConfig) -> Self {
        ParseOptions {
            heading: (&config.heading).into(),
            code: (&config.code).into(),
            abstract_patterns: config.abstract_patterns.clone(),
            quote_patterns: config.quote_patterns.clone(),
            bibliography_patterns: config.bibliography_patterns.clone(),
            theorem_kinds: config.theorem_kinds.clone(),
            extract_images: config.extract_images,
            extract_headers_footers: config.extract_headers_footers,
            extract_notes: config.extract_notes,
            extract_comments: config.extract_comments,
            extract_track_changes: config.extract_track_changes,
            resource_dir: None,
        }
    }
}

impl From<ParseConfig> for ParseOptions {
    fn from(config: ParseConfig) -> Self {
        (&config).into()
    }
}

/// Tree-building limits and output switches.
#[derive(Debug, Clone, Deserialize)]
pub struct ConvertConfig {
    pub max_sections: usize,
    pub max_blocks: usize,
    pub max_section_depth: u8,
    pub equation_fallback: EquationFallback,
    pub default_section_title: String,
    pub include_headers_footers: bool,
    pub include_comments: bool,
    pub include_track_changes: bool,
    pub styled_runs: bool,
    pub progress_interval: usize,
    pub optimize_images: bool,
}

impl From<&ConvertConfig> for ConvertOptions {
    fn from(config: &ConvertConfig) -> Self {
        ConvertOptions {
            max_sections: config.max_sections,
            max_blocks: config.max_blocks,
            max_section_depth: config.max_section_depth,
            equation_fallback: config.equation_fallback,
            default_section_title: config.default_section_title.clone(),
            include_headers_footers: config.include_headers_footers,
            include_comments: config.include_comments,
            include_track_changes: config.include_track_changes,
            styled_runs: config.styled_runs,
            progress_interval: config.progress_interval,
            optimize_images: config.optimize_images,
        }
    }
}

impl From<ConvertConfig> for ConvertOptions {
    fn from(config: ConvertConfig) -> Self {
        (&config).into()
    }
}

/// Image recompression knobs.
#[derive(Debug, Clone, Deserialize)]
pub struct OptimizerConfig {
    pub enabled: bool,
    pub threshold_bytes: usize,
    pub max_dimension: u32,
    pub jpeg_quality: u8,
    pub photo_color_threshold: usize,
    pub sample_grid: u32,
    pub min_savings_ratio: f64,
}

impl From<&OptimizerConfig> for OptimizerOptions {
    fn from(config: &OptimizerConfig) -> Self {
        OptimizerOptions {
            enabled: config.enabled,
            threshold_bytes: config.threshold_bytes,
            max_dimension: config.max_dimension,
            jpeg_quality: config.jpeg_quality.clamp(1, 100),
            photo_color_threshold: config.photo_color_threshold,
            sample_grid: config.sample_grid,
            min_savings_ratio: config.min_savings_ratio,
        }
    }
}

impl From<OptimizerConfig> for OptimizerOptions {
    fn from(config: OptimizerConfig) -> Self {
        (&config).into()
    }
}

/// Helper for layering user overrides over the built-in defaults.
#[derive(Debug, Clone)]
pub struct Loader {
    builder: ConfigBuilder<DefaultState>,
}

impl Loader {
    /// Start a loader seeded with the embedded defaults.
    pub fn new() -> Self {
        let builder = Config::builder().add_source(File::from_str(DEFAULT_TOML, FileFormat::Toml));
        Self { builder }
    }

    /// Layer a configuration file. Missing files trigger an error.
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        let source = File::from(path.as_ref())
            .format(FileFormat::Toml)
            .required(true);
        self.builder = self.builder.add_source(source);
        self
    }

    /// Layer an optional configuration file (ignored if the file is absent).
    pub fn with_optional_file(mut self, path: impl AsRef<Path>) -> Self {
        let source = File::from(path.as_ref())
            .format(FileFormat::Toml)
            .required(false);
        self.builder = self.builder.add_source(source);
        self
    }

    /// Apply a single key/value override (useful for CLI settings).
    pub fn set_override<I>(mut self, key: &str, value: I) -> Result<Self, ConfigError>
    where
        I: Into<ValueKind>,
    {
        self.builder = self.builder.set_override(key, value)?;
        Ok(self)
    }

    /// Finalize the builder and deserialize the resulting configuration.
    pub fn build(self) -> Result<FolioConfig, ConfigError> {
        self.builder.build()?.try_deserialize()
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience helper for callers that only need the defaults.
pub fn load_defaults() -> Result<FolioConfig, ConfigError> {
    Loader::new().build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn loads_default_config() {
        let config = load_defaults().expect("defaults to deserialize");
        assert_eq!(config.parse.heading.max_level, 9);
        assert_eq!(config.convert.max_blocks, 10000);
        assert_eq!(config.convert.equation_fallback, EquationFallback::Placeholder);
        assert_eq!(config.optimizer.threshold_bytes, 100 * 1024);
    }

    #[test]
    fn embedded_defaults_match_library_defaults() {
        let config = load_defaults().expect("defaults to deserialize");
        let parse: ParseOptions = config.parse.into();
        let convert: ConvertOptions = config.convert.into();
        let optimizer: OptimizerOptions = config.optimizer.into();
        assert_eq!(parse, ParseOptions::default());
        assert_eq!(convert, ConvertOptions::default());
        assert_eq!(optimizer, OptimizerOptions::default());
    }

    #[test]
    fn supports_overrides() {
        let config = Loader::new()
            .set_override("convert.equation_fallback", "skip")
            .expect("override to apply")
            .set_override("optimizer.enabled", false)
            .expect("override to apply")
            .build()
            .expect("config to build");
        assert_eq!(config.convert.equation_fallback, EquationFallback::Skip);
        assert!(!config.optimizer.enabled);
    }

    #[test]
    fn user_file_replaces_only_its_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("folio.toml");
        fs::write(
            &path,
            "[convert]\nmax_blocks = 25\n\n[parse.heading]\nheuristics = false\n",
        )
        .unwrap();

        let config = Loader::new().with_file(&path).build().expect("config to build");
        assert_eq!(config.convert.max_blocks, 25);
        assert_eq!(config.convert.max_sections, 1000);
        assert!(!config.parse.heading.heuristics);
        assert_eq!(config.parse.heading.max_level, 9);
    }

    #[test]
    fn missing_required_file_is_an_error() {
        let result = Loader::new().with_file("/no/such/folio.toml").build();
        assert!(result.is_err());
    }

    #[test]
    fn missing_optional_file_is_ignored() {
        let config = Loader::new()
            .with_optional_file("/no/such/folio.toml")
            .build()
            .expect("config to build");
        assert!(config.parse.extract_images);
    }

    #[test]
    fn import_options_carry_every_group() {
        let config = Loader::new()
            .set_override("optimizer.max_dimension", 800i64)
            .expect("override to apply")
            .build()
            .expect("config to build");
        let options = config.import_options();
        assert_eq!(options.format, None);
        assert_eq!(options.optimizer.max_dimension, 800);
        assert_eq!(options.parse.resource_dir, None);
        assert_eq!(options.convert.default_section_title, "Untitled Section");
    }
}
