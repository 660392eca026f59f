//! Raster codec capability and the default `image`-crate implementation.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, RgbaImage};
use std::io::Cursor;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("encode failed: {0}")]
    Encode(String),
}

/// Raster formats the optimizer re-encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RasterFormat {
    Png,
    Jpeg,
}

impl RasterFormat {
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime.trim().to_ascii_lowercase().as_str() {
            "image/png" => Some(RasterFormat::Png),
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(RasterFormat::Jpeg),
            _ => None,
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            RasterFormat::Png => "image/png",
            RasterFormat::Jpeg => "image/jpeg",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            RasterFormat::Png => "png",
            RasterFormat::Jpeg => "jpg",
        }
    }
}

/// Decoded pixels, always 8-bit RGBA, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl DecodedImage {
    /// RGBA of the pixel at `(x, y)`, `None` outside the image.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        let px = self.pixels.get(offset..offset + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }
}

/// Decode, resize and encode raster images.
pub trait ImageCodec: Send + Sync {
    /// Dimensions from the header, without decoding pixels.
    fn probe(&self, bytes: &[u8]) -> Option<(u32, u32)>;
    fn decode(&self, bytes: &[u8], format: RasterFormat) -> Result<DecodedImage, CodecError>;
    fn resize(&self, image: &DecodedImage, width: u32, height: u32)
        -> Result<DecodedImage, CodecError>;
    /// `quality` applies to JPEG only.
    fn encode(
        &self,
        image: &DecodedImage,
        format: RasterFormat,
        quality: u8,
    ) -> Result<Vec<u8>, CodecError>;
}

/// [`ImageCodec`] backed by the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct RasterCodec;

impl RasterCodec {
    fn to_rgba(image: &DecodedImage) -> Result<RgbaImage, CodecError> {
        RgbaImage::from_raw(image.width, image.height, image.pixels.clone())
            .ok_or_else(|| CodecError::Encode("pixel buffer does not match dimensions".into()))
    }
}

impl ImageCodec for RasterCodec {
    fn probe(&self, bytes: &[u8]) -> Option<(u32, u32)> {
        image::ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .ok()?
            .into_dimensions()
            .ok()
    }

    fn decode(&self, bytes: &[u8], format: RasterFormat) -> Result<DecodedImage, CodecError> {
        let format = match format {
            RasterFormat::Png => ImageFormat::Png,
            RasterFormat::Jpeg => ImageFormat::Jpeg,
        };
        let decoded = image::load_from_memory_with_format(bytes, format)
            .map_err(|e| CodecError::Decode(e.to_string()))?
            .to_rgba8();
        Ok(DecodedImage {
            width: decoded.width(),
            height: decoded.height(),
            pixels: decoded.into_raw(),
        })
    }

    fn resize(
        &self,
        image: &DecodedImage,
        width: u32,
        height: u32,
    ) -> Result<DecodedImage, CodecError> {
        if image.width == width && image.height == height {
            return Ok(image.clone());
        }
        let source = Self::to_rgba(image)?;
        let resized = image::imageops::resize(&source, width, height, FilterType::Lanczos3);
        Ok(DecodedImage {
            width,
            height,
            pixels: resized.into_raw(),
        })
    }

    fn encode(
        &self,
        image: &DecodedImage,
        format: RasterFormat,
        quality: u8,
    ) -> Result<Vec<u8>, CodecError> {
        let dynamic = DynamicImage::ImageRgba8(Self::to_rgba(image)?);
        let mut buf = Vec::new();
        match format {
            RasterFormat::Jpeg => {
                // JPEG has no alpha channel.
                let rgb = dynamic.to_rgb8();
                JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100))
                    .encode_image(&rgb)
                    .map_err(|e| CodecError::Encode(e.to_string()))?;
            }
            RasterFormat::Png => {
                dynamic
                    .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
                    .map_err(|e| CodecError::Encode(e.to_string()))?;
            }
        }
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker(width: u32, height: u32) -> DecodedImage {
        let mut pixels = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for x in 0..width {
                let v = if (x + y) % 2 == 0 { 255 } else { 0 };
                pixels.extend_from_slice(&[v, v, v, 255]);
            }
        }
        DecodedImage {
            width,
            height,
            pixels,
        }
    }

    #[test]
    fn png_encode_decode_and_probe() {
        let codec = RasterCodec;
        let bytes = codec
            .encode(&checker(8, 4), RasterFormat::Png, 85)
            .expect("encode");
        assert_eq!(codec.probe(&bytes), Some((8, 4)));
        let decoded = codec.decode(&bytes, RasterFormat::Png).expect("decode");
        assert_eq!(decoded.pixel(0, 0), Some([255, 255, 255, 255]));
        assert_eq!(decoded.pixel(1, 0), Some([0, 0, 0, 255]));
    }

    #[test]
    fn resize_changes_dimensions() {
        let resized = RasterCodec.resize(&checker(10, 6), 5, 3).expect("resize");
        assert_eq!((resized.width, resized.height), (5, 3));
        assert_eq!(resized.pixels.len(), 5 * 3 * 4);
    }

    #[test]
    fn garbage_does_not_decode() {
        assert!(RasterCodec.decode(b"not an image", RasterFormat::Jpeg).is_err());
        assert_eq!(RasterCodec.probe(b"not an image"), None);
    }

    #[test]
    fn mime_mapping() {
        assert_eq!(RasterFormat::from_mime("image/JPEG"), Some(RasterFormat::Jpeg));
        assert_eq!(RasterFormat::from_mime("image/gif"), None);
        assert_eq!(RasterFormat::Png.extension(), "png");
    }
}
