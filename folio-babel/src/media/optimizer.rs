//! Recompress and downscale extracted images before they become assets.

use super::codec::{DecodedImage, ImageCodec, RasterCodec, RasterFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerOptions {
    pub enabled: bool,
    /// Inputs smaller than this are returned untouched.
    pub threshold_bytes: usize,
    /// Longest edge after resizing.
    pub max_dimension: u32,
    pub jpeg_quality: u8,
    /// Distinct quantized colors above which a PNG counts as a photo.
    pub photo_color_threshold: usize,
    /// Photo detection samples at most `sample_grid × sample_grid` pixels.
    pub sample_grid: u32,
    /// Minimum fractional size reduction for a re-encode to be kept.
    pub min_savings_ratio: f64,
}

impl Default for OptimizerOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_bytes: 100 * 1024,
            max_dimension: 1920,
            jpeg_quality: 85,
            photo_color_threshold: 500,
            sample_grid: 100,
            min_savings_ratio: 0.05,
        }
    }
}

/// Why the optimizer did (or did not) replace the input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum OptimizeReason {
    Optimized,
    Disabled,
    BelowThreshold,
    UnsupportedFormat,
    DecodeFailed(String),
    EncodeFailed(String),
    InsufficientSavings,
}

impl OptimizeReason {
    /// The input could not be processed at all, as opposed to a policy skip.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            OptimizeReason::DecodeFailed(_) | OptimizeReason::EncodeFailed(_)
        )
    }
}

impl fmt::Display for OptimizeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizeReason::Optimized => write!(f, "optimized"),
            OptimizeReason::Disabled => write!(f, "optimization disabled"),
            OptimizeReason::BelowThreshold => write!(f, "below size threshold"),
            OptimizeReason::UnsupportedFormat => write!(f, "unsupported format"),
            OptimizeReason::DecodeFailed(e) => write!(f, "decode failed: {e}"),
            OptimizeReason::EncodeFailed(e) => write!(f, "encode failed: {e}"),
            OptimizeReason::InsufficientSavings => write!(f, "re-encoding saved too little"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizedImage {
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub was_optimized: bool,
    pub reason: OptimizeReason,
    pub original_size: usize,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl OptimizedImage {
    fn unchanged(bytes: &[u8], mime: &str, reason: OptimizeReason) -> Self {
        Self {
            bytes: bytes.to_vec(),
            mime_type: mime.to_string(),
            was_optimized: false,
            reason,
            original_size: bytes.len(),
            width: None,
            height: None,
        }
    }

    pub fn bytes_saved(&self) -> usize {
        self.original_size.saturating_sub(self.bytes.len())
    }
}

/// Preview of what [`ImageOptimizer::optimize`] would do. Nothing is encoded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationEstimate {
    pub original_size: usize,
    pub eligible: bool,
    pub reason: OptimizeReason,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub target_width: Option<u32>,
    pub target_height: Option<u32>,
    pub would_resize: bool,
    /// Only known for PNG input, which needs its pixels sampled.
    pub is_photo: Option<bool>,
    pub target_mime_type: Option<String>,
}

/// Size reduction for extracted images.
///
/// The codec is injected so tests (and callers with other pixel libraries) can
/// swap it; [`ImageOptimizer::new`] uses [`RasterCodec`].
#[derive(Clone)]
pub struct ImageOptimizer {
    options: OptimizerOptions,
    codec: Arc<dyn ImageCodec>,
}

impl fmt::Debug for ImageOptimizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageOptimizer")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Default for ImageOptimizer {
    fn default() -> Self {
        Self::new(OptimizerOptions::default())
    }
}

impl ImageOptimizer {
    pub fn new(options: OptimizerOptions) -> Self {
        Self::with_codec(options, Arc::new(RasterCodec))
    }

    pub fn with_codec(options: OptimizerOptions, codec: Arc<dyn ImageCodec>) -> Self {
        Self { options, codec }
    }

    pub fn options(&self) -> &OptimizerOptions {
        &self.options
    }

    fn precheck(&self, bytes: &[u8], mime: &str) -> Result<RasterFormat, OptimizeReason> {
        if !self.options.enabled {
            return Err(OptimizeReason::Disabled);
        }
        if bytes.len() < self.options.threshold_bytes {
            return Err(OptimizeReason::BelowThreshold);
        }
        RasterFormat::from_mime(mime).ok_or(OptimizeReason::UnsupportedFormat)
    }

    /// Never fails and never returns more bytes than it was given.
    pub fn optimize(&self, bytes: &[u8], mime: &str) -> OptimizedImage {
        let format = match self.precheck(bytes, mime) {
            Ok(format) => format,
            Err(reason) => return OptimizedImage::unchanged(bytes, mime, reason),
        };

        let decoded = match self.codec.decode(bytes, format) {
            Ok(decoded) => decoded,
            Err(err) => {
                return OptimizedImage::unchanged(
                    bytes,
                    mime,
                    OptimizeReason::DecodeFailed(err.to_string()),
                )
            }
        };

        let (width, height) = target_dimensions(
            decoded.width,
            decoded.height,
            self.options.max_dimension,
        );
        let target_format = match format {
            RasterFormat::Jpeg => RasterFormat::Jpeg,
            RasterFormat::Png if self.is_photo(&decoded) => RasterFormat::Jpeg,
            RasterFormat::Png => RasterFormat::Png,
        };

        let encoded = self
            .codec
            .resize(&decoded, width, height)
            .and_then(|resized| {
                self.codec
                    .encode(&resized, target_format, self.options.jpeg_quality)
            });
        let encoded = match encoded {
            Ok(encoded) => encoded,
            Err(err) => {
                let mut result = OptimizedImage::unchanged(
                    bytes,
                    mime,
                    OptimizeReason::EncodeFailed(err.to_string()),
                );
                result.width = Some(decoded.width);
                result.height = Some(decoded.height);
                return result;
            }
        };

        let limit = bytes.len() as f64 * (1.0 - self.options.min_savings_ratio);
        if encoded.len() as f64 > limit {
            debug!(
                original = bytes.len(),
                encoded = encoded.len(),
                "keeping original image, savings below ratio"
            );
            let mut result =
                OptimizedImage::unchanged(bytes, mime, OptimizeReason::InsufficientSavings);
            result.width = Some(decoded.width);
            result.height = Some(decoded.height);
            return result;
        }

        debug!(
            original = bytes.len(),
            encoded = encoded.len(),
            width,
            height,
            "image optimized"
        );
        OptimizedImage {
            bytes: encoded,
            mime_type: target_format.mime_type().to_string(),
            was_optimized: true,
            reason: OptimizeReason::Optimized,
            original_size: bytes.len(),
            width: Some(width),
            height: Some(height),
        }
    }

    pub fn analyze(&self, bytes: &[u8], mime: &str) -> OptimizationEstimate {
        let mut estimate = OptimizationEstimate {
            original_size: bytes.len(),
            eligible: false,
            reason: OptimizeReason::Optimized,
            width: None,
            height: None,
            target_width: None,
            target_height: None,
            would_resize: false,
            is_photo: None,
            target_mime_type: None,
        };

        let format = match self.precheck(bytes, mime) {
            Ok(format) => format,
            Err(reason) => {
                estimate.reason = reason;
                if let Some((w, h)) = self.codec.probe(bytes) {
                    estimate.width = Some(w);
                    estimate.height = Some(h);
                }
                return estimate;
            }
        };

        let (width, height, is_photo) = match format {
            RasterFormat::Jpeg => match self.codec.probe(bytes) {
                Some((w, h)) => (w, h, None),
                None => {
                    estimate.reason =
                        OptimizeReason::DecodeFailed("unreadable image header".to_string());
                    return estimate;
                }
            },
            RasterFormat::Png => match self.codec.decode(bytes, format) {
                Ok(decoded) => (
                    decoded.width,
                    decoded.height,
                    Some(self.is_photo(&decoded)),
                ),
                Err(err) => {
                    estimate.reason = OptimizeReason::DecodeFailed(err.to_string());
                    return estimate;
                }
            },
        };

        let (target_width, target_height) =
            target_dimensions(width, height, self.options.max_dimension);
        let target = match (format, is_photo) {
            (RasterFormat::Png, Some(false)) => RasterFormat::Png,
            _ => RasterFormat::Jpeg,
        };

        estimate.eligible = true;
        estimate.width = Some(width);
        estimate.height = Some(height);
        estimate.target_width = Some(target_width);
        estimate.target_height = Some(target_height);
        estimate.would_resize = (target_width, target_height) != (width, height);
        estimate.is_photo = is_photo;
        estimate.target_mime_type = Some(target.mime_type().to_string());
        estimate
    }

    /// Sample up to `sample_grid²` pixels and count distinct colors after
    /// quantizing each color channel to 16 levels. Alpha is ignored.
    pub fn is_photo(&self, image: &DecodedImage) -> bool {
        let grid = self.options.sample_grid.max(1);
        let cols = image.width.min(grid);
        let rows = image.height.min(grid);
        if cols == 0 || rows == 0 {
            return false;
        }

        let mut colors: HashSet<u16> = HashSet::new();
        for gy in 0..rows {
            let y = (gy as u64 * image.height as u64 / rows as u64) as u32;
            for gx in 0..cols {
                let x = (gx as u64 * image.width as u64 / cols as u64) as u32;
                let Some([r, g, b, _]) = image.pixel(x, y) else {
                    continue;
                };
                let key = (u16::from(r >> 4) << 8) | (u16::from(g >> 4) << 4) | u16::from(b >> 4);
                colors.insert(key);
                if colors.len() > self.options.photo_color_threshold {
                    return true;
                }
            }
        }
        false
    }
}

/// Scale `(width, height)` so the longest edge is at most `max_dimension`,
/// keeping the aspect ratio.
pub fn target_dimensions(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    let longest = width.max(height);
    if longest <= max_dimension || longest == 0 || max_dimension == 0 {
        return (width, height);
    }
    let scale = max_dimension as f64 / longest as f64;
    let scaled = |v: u32| ((v as f64 * scale).round() as u32).clamp(1, max_dimension);
    (scaled(width), scaled(height))
}
