//! Stage two: intermediate elements to the normalized section tree.
//!
//! The [`Converter`] walks the flat element sequence once. Headings open
//! sections through a [`sections::SectionBuilder`]; every other element
//! becomes one block (see [`blocks`]) in the current section. Images are
//! optimized and turned into assets on the way.
//!
//! All run state (ids, warnings, statistics, the level stack) is created per
//! call to [`Converter::convert`], so one converter can be shared freely.

pub mod blocks;
pub mod sections;

use crate::error::ConvertError;
use crate::ir::{
    FormattingSpan, Image, IntermediateDocument, IntermediateElement, StyledText, Warning,
    WarningKind,
};
use crate::markup::MarkupOptions;
use crate::media::{extension_for_mime, ImageOptimizer, OptimizerOptions};
use crate::tree::{Asset, Block, BlockType, Document, IdAllocator};
use blocks::BlockDraft;
use sections::{forest_depth, SectionBuilder};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

/// What to emit for an equation that has no LaTeX.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquationFallback {
    /// `\textit{[Equation]}`
    #[default]
    Placeholder,
    /// Drop the equation.
    Skip,
    /// The native markup, every line commented out with `% `.
    NativeComment,
}

impl EquationFallback {
    pub fn as_str(self) -> &'static str {
        match self {
            EquationFallback::Placeholder => "placeholder",
            EquationFallback::Skip => "skip",
            EquationFallback::NativeComment => "native_comment",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertOptions {
    /// Sections opened by headings. The implicit leading section is free.
    pub max_sections: usize,
    pub max_blocks: usize,
    /// Deeper headings become bold paragraphs.
    pub max_section_depth: u8,
    pub equation_fallback: EquationFallback,
    pub default_section_title: String,
    pub include_headers_footers: bool,
    pub include_comments: bool,
    pub include_track_changes: bool,
    /// Serialize font color, size, family and highlight spans.
    pub styled_runs: bool,
    /// Report progress every this many elements.
    pub progress_interval: usize,
    pub optimize_images: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            max_sections: 1000,
            max_blocks: 10000,
            max_section_depth: 6,
            equation_fallback: EquationFallback::Placeholder,
            default_section_title: "Untitled Section".to_string(),
            include_headers_footers: false,
            include_comments: true,
            include_track_changes: true,
            styled_runs: true,
            progress_interval: 50,
            optimize_images: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub processed: usize,
    pub total: usize,
    pub sections: usize,
    pub blocks: usize,
}

/// Caller callbacks for one conversion. Both are optional.
#[derive(Default)]
pub struct ConvertHooks<'a> {
    /// Checked between top-level elements; `true` aborts the run.
    pub cancel: Option<&'a dyn Fn() -> bool>,
    pub progress: Option<&'a mut dyn FnMut(&Progress)>,
}

impl<'a> ConvertHooks<'a> {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_cancel(mut self, cancel: &'a dyn Fn() -> bool) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn with_progress(mut self, progress: &'a mut dyn FnMut(&Progress)) -> Self {
        self.progress = Some(progress);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel.map(|cancel| cancel()).unwrap_or(false)
    }

    fn report(&mut self, progress: Progress) {
        if let Some(callback) = self.progress.as_mut() {
            callback(&progress);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Statistics {
    pub elements_total: usize,
    pub elements_processed: usize,
    pub elements_skipped: usize,
    pub sections: usize,
    pub blocks: usize,
    pub assets: usize,
    pub equations: usize,
    pub equations_failed: usize,
    pub images_optimized: usize,
    pub image_bytes_saved: usize,
    pub max_depth: usize,
    pub truncated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionResult {
    pub document: Document,
    /// Parser warnings followed by converter warnings.
    pub warnings: Vec<Warning>,
    pub statistics: Statistics,
}

#[derive(Debug, Clone)]
pub struct Converter {
    options: ConvertOptions,
    optimizer: Option<ImageOptimizer>,
}

impl Default for Converter {
    fn default() -> Self {
        Self::new(ConvertOptions::default())
    }
}

impl Converter {
    pub fn new(options: ConvertOptions) -> Self {
        let optimizer = options
            .optimize_images
            .then(|| ImageOptimizer::new(OptimizerOptions::default()));
        Self { options, optimizer }
    }

    /// Replace the image optimizer. Ignored when `optimize_images` is off.
    pub fn with_optimizer(mut self, optimizer: ImageOptimizer) -> Self {
        if self.options.optimize_images {
            self.optimizer = Some(optimizer);
        }
        self
    }

    pub fn options(&self) -> &ConvertOptions {
        &self.options
    }

    pub fn convert(
        &self,
        doc: &IntermediateDocument,
        hooks: &mut ConvertHooks<'_>,
    ) -> Result<ConversionResult, ConvertError> {
        let total = doc.elements.len();
        debug!(elements = total, "converting intermediate document");

        let mut run = Run {
            options: &self.options,
            optimizer: self.optimizer.as_ref(),
            markup: MarkupOptions {
                styled_runs: self.options.styled_runs,
            },
            ids: IdAllocator::new(),
            builder: SectionBuilder::new(),
            warnings: Vec::new(),
            stats: Statistics {
                elements_total: total,
                ..Default::default()
            },
            blocks: 0,
            demotion_reported: false,
        };

        let interval = self.options.progress_interval.max(1);
        for (index, element) in doc.elements.iter().enumerate() {
            if hooks.cancelled() {
                info!(processed = index, total, "conversion cancelled");
                return Err(ConvertError::Cancelled {
                    processed: index,
                    total,
                });
            }

            if let Step::Stop = run.element(index, element) {
                break;
            }
            run.stats.elements_processed += 1;

            if run.stats.elements_processed % interval == 0 {
                hooks.report(run.progress(total));
            }
        }

        let Run {
            mut builder,
            mut ids,
            mut warnings,
            mut stats,
            ..
        } = run;

        if builder.is_empty() {
            builder.open_default(ids.next_section(), &self.options.default_section_title);
        }
        let sections = builder.finish();

        let document = Document {
            title: document_title(doc),
            sections,
        };
        stats.sections = document.section_count();
        stats.blocks = document.block_count();
        stats.max_depth = forest_depth(&document.sections);
        hooks.report(Progress {
            processed: stats.elements_processed,
            total,
            sections: stats.sections,
            blocks: stats.blocks,
        });

        info!(
            sections = stats.sections,
            blocks = stats.blocks,
            assets = stats.assets,
            warnings = warnings.len(),
            truncated = stats.truncated,
            "conversion finished"
        );

        let mut all_warnings = doc.warnings.clone();
        all_warnings.append(&mut warnings);
        Ok(ConversionResult {
            document,
            warnings: all_warnings,
            statistics: stats,
        })
    }
}

fn document_title(doc: &IntermediateDocument) -> String {
    if let Some(title) = doc.title.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        return title.to_string();
    }
    doc.source_path
        .as_deref()
        .and_then(|path| path.file_stem())
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Untitled Document".to_string())
}

enum Step {
    Continue,
    Stop,
}

struct Run<'a> {
    options: &'a ConvertOptions,
    optimizer: Option<&'a ImageOptimizer>,
    markup: MarkupOptions,
    ids: IdAllocator,
    builder: SectionBuilder,
    warnings: Vec<Warning>,
    stats: Statistics,
    blocks: usize,
    demotion_reported: bool,
}

impl Run<'_> {
    fn progress(&self, total: usize) -> Progress {
        Progress {
            processed: self.stats.elements_processed,
            total,
            sections: self.builder.heading_sections(),
            blocks: self.blocks,
        }
    }

    fn warn(&mut self, kind: WarningKind, message: String, index: usize) {
        warn!(kind = ?kind, index, "{}", message);
        self.warnings.push(Warning::new(kind, message).at(index));
    }

    fn truncate(&mut self, index: usize, what: &str, limit: usize) -> Step {
        self.stats.truncated = true;
        self.warn(
            WarningKind::ContentTruncated,
            format!("{what} limit of {limit} reached; remaining content dropped"),
            index,
        );
        Step::Stop
    }

    fn skip(&mut self) -> Step {
        self.stats.elements_skipped += 1;
        Step::Continue
    }

    fn element(&mut self, index: usize, element: &IntermediateElement) -> Step {
        use IntermediateElement as E;

        match element {
            E::Heading(heading) => {
                if heading.level > self.options.max_section_depth {
                    if !self.demotion_reported {
                        self.demotion_reported = true;
                        self.warn(
                            WarningKind::HeadingDemoted,
                            format!(
                                "headings deeper than level {} were converted to bold paragraphs",
                                self.options.max_section_depth
                            ),
                            index,
                        );
                    }
                    let draft = blocks::demoted_heading(
                        heading.text.trim(),
                        &trim_spans(&heading.text, &heading.formatting),
                        heading.level,
                        self.markup,
                    );
                    return self.add_block(index, draft, None);
                }

                if self.builder.heading_sections() + 1 > self.options.max_sections {
                    return self.truncate(index, "section", self.options.max_sections);
                }
                let title = heading.text.trim();
                let title = if title.is_empty() {
                    self.options.default_section_title.as_str()
                } else {
                    title
                };
                let id = self.ids.next_section();
                self.builder.open(id, title, heading.level);
                Step::Continue
            }
            E::Equation(eq) => {
                self.stats.equations += 1;
                let (draft, failed) = blocks::equation(eq, self.options.equation_fallback);
                if failed {
                    self.stats.equations_failed += 1;
                    let reason = eq
                        .conversion_error
                        .clone()
                        .unwrap_or_else(|| "no LaTeX available".to_string());
                    self.warn(
                        WarningKind::EquationConversionFailed,
                        format!(
                            "equation could not be converted ({}), using {} fallback",
                            reason,
                            self.options.equation_fallback.as_str()
                        ),
                        index,
                    );
                }
                match draft {
                    Some(draft) => self.add_block(index, draft, None),
                    None => self.skip(),
                }
            }
            E::Image(image) => self.image(index, image),
            E::Header(_) | E::Footer(_) if !self.options.include_headers_footers => self.skip(),
            E::Comment(_) if !self.options.include_comments => self.skip(),
            E::TrackChange(_) if !self.options.include_track_changes => self.skip(),
            other => match blocks::render(other, self.markup) {
                Some(draft) => self.add_block(index, draft, None),
                None => self.skip(),
            },
        }
    }

    fn image(&mut self, index: usize, image: &Image) -> Step {
        if self.blocks + 1 > self.options.max_blocks {
            return self.truncate(index, "block", self.options.max_blocks);
        }

        let (bytes, mime_type, width, height) = match self.optimizer {
            Some(optimizer) => {
                let optimized = optimizer.optimize(&image.data, &image.mime_type);
                if optimized.was_optimized {
                    self.stats.images_optimized += 1;
                    self.stats.image_bytes_saved += optimized.bytes_saved();
                } else if optimized.reason.is_failure() {
                    self.warn(
                        WarningKind::ImageOptimizationSkipped,
                        format!("image kept unoptimized: {}", optimized.reason),
                        index,
                    );
                }
                let width = optimized.width.or(image.width_px);
                let height = optimized.height.or(image.height_px);
                (optimized.bytes, optimized.mime_type, width, height)
            }
            None => (
                image.data.clone(),
                image.mime_type.clone(),
                image.width_px,
                image.height_px,
            ),
        };

        let id = self.ids.next_asset();
        let filename = format!("image-{id}.{}", extension_for_mime(&mime_type));
        let hash = hex::encode(Sha256::digest(&bytes));
        let asset = Asset {
            id,
            filename: filename.clone(),
            mime_type,
            bytes,
            hash,
            width,
            height,
        };

        // Display width follows the source layout, not the resampled pixels.
        let display_width = image.width_px.or(width);
        let alt = image
            .caption
            .as_deref()
            .or(Some(image.alt_text.as_str()).filter(|alt| !alt.is_empty()));
        let mut draft = BlockDraft::new(
            BlockType::Figure,
            blocks::figure(&filename, display_width, image.caption.as_deref()),
        );
        if let Some(alt) = alt {
            draft = draft.attr("alt", alt);
        }
        if let Some(original) = &image.filename {
            draft = draft.attr("source_filename", original);
        }

        self.stats.assets += 1;
        self.add_block(index, draft, Some(asset))
    }

    fn add_block(&mut self, index: usize, draft: BlockDraft, asset: Option<Asset>) -> Step {
        if self.blocks + 1 > self.options.max_blocks {
            return self.truncate(index, "block", self.options.max_blocks);
        }
        if !self.builder.has_current() {
            let id = self.ids.next_section();
            self.builder
                .open_default(id, &self.options.default_section_title);
        }

        let block = Block {
            id: self.ids.next_block(),
            block_type: draft.block_type,
            content: draft.content,
            sort_order: 0,
            assets: asset.into_iter().collect(),
            attributes: draft.attributes,
        };
        self.builder.push_block(block);
        self.blocks += 1;
        Step::Continue
    }
}

/// Spans of `text` re-based onto `text.trim()`.
fn trim_spans(text: &str, spans: &[FormattingSpan]) -> Vec<FormattingSpan> {
    let mut styled = StyledText::new();
    styled.push_str(text);
    styled.spans = spans.to_vec();
    styled.trimmed().spans
}
