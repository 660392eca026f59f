use folio_babel::media::codec::{ImageCodec, RasterCodec};
use folio_babel::media::{ImageOptimizer, OptimizeReason, OptimizerOptions};
use folio_babel::pipeline::{import_file, ImportOptions};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, RgbImage};
use tempfile::TempDir;

/// A photo-like JPEG: per-pixel noise does not compress, so the file is large.
fn noisy_jpeg(width: u32, height: u32) -> Vec<u8> {
    let mut state: u32 = 0x2545_f491;
    let mut next = move || {
        state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        (state >> 24) as u8
    };
    let mut pixels = RgbImage::new(width, height);
    for pixel in pixels.pixels_mut() {
        pixel.0 = [next(), next(), next()];
    }
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(pixels)
        .write_with_encoder(JpegEncoder::new_with_quality(&mut bytes, 95))
        .unwrap();
    bytes
}

#[test]
fn large_photo_is_downscaled_and_recompressed() {
    let input = noisy_jpeg(3000, 2000);
    assert!(input.len() > 100 * 1024);

    let out = ImageOptimizer::new(OptimizerOptions::default()).optimize(&input, "image/jpeg");

    assert!(out.was_optimized);
    assert_eq!(out.reason, OptimizeReason::Optimized);
    assert_eq!(out.mime_type, "image/jpeg");
    assert_eq!((out.width, out.height), (Some(1920), Some(1280)));
    assert!(out.bytes.len() as f64 <= input.len() as f64 * 0.95);
    assert_eq!(RasterCodec.probe(&out.bytes), Some((1920, 1280)));
}

#[test]
fn analyze_predicts_the_resize() {
    let input = noisy_jpeg(3000, 2000);
    let estimate = ImageOptimizer::default().analyze(&input, "image/jpeg");

    assert!(estimate.eligible);
    assert_eq!((estimate.width, estimate.height), (Some(3000), Some(2000)));
    assert_eq!(
        (estimate.target_width, estimate.target_height),
        (Some(1920), Some(1280))
    );
    assert!(estimate.would_resize);
    assert_eq!(estimate.target_mime_type.as_deref(), Some("image/jpeg"));
}

#[test]
fn disabled_optimizer_returns_the_input() {
    let input = noisy_jpeg(400, 300);
    let out = ImageOptimizer::new(OptimizerOptions {
        enabled: false,
        ..Default::default()
    })
    .optimize(&input, "image/jpeg");
    assert!(!out.was_optimized);
    assert_eq!(out.reason, OptimizeReason::Disabled);
    assert_eq!(out.bytes, input);
}

#[test]
fn imported_images_are_optimized_into_assets() {
    let dir = TempDir::new().unwrap();
    let input = noisy_jpeg(3000, 2000);
    std::fs::write(dir.path().join("photo.jpg"), &input).unwrap();
    let path = dir.path().join("album.md");
    std::fs::write(&path, "# Album\n\n![Harbour](photo.jpg)\n").unwrap();

    let outcome = import_file(&path, &ImportOptions::default()).unwrap();
    let result = outcome.result;
    let block = &result.document.sections[0].blocks[0];
    let asset = &block.assets[0];

    assert_eq!(asset.mime_type, "image/jpeg");
    assert_eq!((asset.width, asset.height), (Some(1920), Some(1280)));
    assert!(asset.bytes.len() < input.len());
    assert_eq!(asset.filename, "image-1.jpg");
    assert_eq!(result.statistics.images_optimized, 1);
    assert_eq!(
        result.statistics.image_bytes_saved,
        input.len() - asset.bytes.len()
    );
}
