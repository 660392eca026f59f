//! Helpers shared by the text formats (LaTeX and Markdown).
//!
//! Both formats reference images by path or URI instead of embedding them, so
//! both need to resolve, load and sniff image files the same way.

use crate::media::{mime_from_extension, ImageCodec, RasterCodec};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::path::{Path, PathBuf};

/// Image bytes resolved from a reference in the source text.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedImage {
    pub data: Vec<u8>,
    pub mime_type: String,
    pub width_px: Option<u32>,
    pub height_px: Option<u32>,
    pub filename: Option<String>,
}

/// Extensions tried, in order, when a reference has none (`\includegraphics{plot}`).
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "svg"];

pub fn is_remote(reference: &str) -> bool {
    let lower = reference.trim().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://") || lower.starts_with("//")
}

/// Load an image reference: a `data:` URI or a path relative to `resource_dir`.
///
/// Remote URLs are not fetched.
pub fn load_image(reference: &str, resource_dir: Option<&Path>) -> Result<LoadedImage, String> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Err("empty image reference".to_string());
    }
    if reference.starts_with("data:") {
        return decode_data_uri(reference);
    }
    if is_remote(reference) {
        return Err(format!("remote image '{reference}' was not fetched"));
    }

    let path = resolve_path(reference, resource_dir)
        .ok_or_else(|| format!("image file '{reference}' not found"))?;
    let data = std::fs::read(&path)
        .map_err(|e| format!("cannot read image '{}': {e}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| reference.to_string());
    let mime_type = mime_from_extension(&name)
        .ok_or_else(|| format!("unsupported image type '{name}'"))?
        .to_string();

    Ok(with_dimensions(LoadedImage {
        data,
        mime_type,
        width_px: None,
        height_px: None,
        filename: Some(name),
    }))
}

fn resolve_path(reference: &str, resource_dir: Option<&Path>) -> Option<PathBuf> {
    let base = Path::new(reference);
    let candidate = match resource_dir {
        Some(dir) if base.is_relative() => dir.join(base),
        _ => base.to_path_buf(),
    };
    if candidate.is_file() {
        return Some(candidate);
    }
    if candidate.extension().is_some() {
        return None;
    }
    IMAGE_EXTENSIONS
        .iter()
        .map(|ext| candidate.with_extension(ext))
        .find(|path| path.is_file())
}

fn decode_data_uri(uri: &str) -> Result<LoadedImage, String> {
    let (header, payload) = uri
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(','))
        .ok_or_else(|| "malformed data URI".to_string())?;
    let mut parts = header.split(';');
    let mime_type = parts.next().filter(|m| !m.is_empty()).unwrap_or("image/png");
    if !parts.any(|p| p.eq_ignore_ascii_case("base64")) {
        return Err("data URI is not base64 encoded".to_string());
    }
    let data = STANDARD
        .decode(payload.trim())
        .map_err(|e| format!("invalid base64 in data URI: {e}"))?;
    Ok(with_dimensions(LoadedImage {
        data,
        mime_type: mime_type.to_string(),
        width_px: None,
        height_px: None,
        filename: None,
    }))
}

fn with_dimensions(mut image: LoadedImage) -> LoadedImage {
    if let Some((w, h)) = RasterCodec.probe(&image.data) {
        image.width_px = Some(w);
        image.height_px = Some(h);
    }
    image
}

/// `key: value` lines of a front matter block, quotes stripped.
pub fn parse_front_matter(block: &str) -> Vec<(String, String)> {
    block
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && *line != "---" && !line.starts_with('#'))
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| {
            let value = value.trim().trim_matches('"').trim_matches('\'');
            (key.trim().to_string(), value.to_string())
        })
        .filter(|(key, _)| !key.is_empty())
        .collect()
}
