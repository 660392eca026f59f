//! Image handling: the codec capability and the size optimizer.

pub mod codec;
pub mod optimizer;

pub use codec::{CodecError, DecodedImage, ImageCodec, RasterCodec, RasterFormat};
pub use optimizer::{
    target_dimensions, ImageOptimizer, OptimizationEstimate, OptimizeReason, OptimizedImage,
    OptimizerOptions,
};

/// MIME type for a file name or path, by extension.
pub fn mime_from_extension(name: &str) -> Option<&'static str> {
    let ext = name.rsplit('.').next()?.to_ascii_lowercase();
    Some(match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" | "jpe" => "image/jpeg",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "emf" => "image/x-emf",
        "wmf" => "image/x-wmf",
        _ => return None,
    })
}

/// Preferred file extension for a MIME type.
pub fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/gif" => "gif",
        "image/bmp" => "bmp",
        "image/tiff" => "tiff",
        "image/svg+xml" => "svg",
        "image/webp" => "webp",
        "image/x-emf" => "emf",
        "image/x-wmf" => "wmf",
        _ => "bin",
    }
}
