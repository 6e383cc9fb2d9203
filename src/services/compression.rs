//! Client-side style image compression: downscale wide images and re-encode
//! them as JPEG before upload.
//!
//! Compression is best-effort. Every failure comes back as a
//! [`CompressError`] and the ingestion pipeline falls back to the original
//! file.

use crate::{models::upload::ImageFile, services::naming};
use bytes::Bytes;
use chrono::Utc;
use image::{
    GenericImageView, ImageError, ImageReader, Limits, codecs::jpeg::JpegEncoder,
    imageops::FilterType,
};
use std::{io::Cursor, time::Duration};
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, info};

pub const DEFAULT_MAX_WIDTH: u32 = 1200;
pub const DEFAULT_QUALITY: f32 = 0.8;
pub const COMPRESS_TIMEOUT: Duration = Duration::from_secs(30);

/// Widest or tallest image the decoder will accept.
pub const MAX_DECODE_DIMENSION: u32 = 12_000;
/// Ceiling on decoder allocations for a single image.
pub const MAX_DECODE_ALLOC: u64 = 256 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum CompressError {
    #[error("runtime does not support image compression")]
    Unsupported,
    #[error("failed to decode image: {0}")]
    Decode(#[source] image::ImageError),
    #[error("failed to encode image: {0}")]
    Encode(#[source] image::ImageError),
    #[error("image compression timeout")]
    Timeout,
    #[error("compression task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// What the caller's runtime can do. Decided by the caller, never sniffed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capabilities {
    /// Decode and re-encode images before upload.
    pub compression: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self { compression: true }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CompressOptions {
    pub max_width: u32,
    /// Lossy quality in `0.0..=1.0`.
    pub quality: f32,
    pub timeout: Duration,
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self {
            max_width: DEFAULT_MAX_WIDTH,
            quality: DEFAULT_QUALITY,
            timeout: COMPRESS_TIMEOUT,
        }
    }
}

impl CompressOptions {
    /// Quality on the JPEG encoder's 1..=100 scale.
    pub fn jpeg_quality(&self) -> u8 {
        let scaled = (self.quality.clamp(0.0, 1.0) * 100.0).round() as u8;
        scaled.max(1)
    }
}

/// Compress `file` into a new JPEG file with a fresh unique name.
///
/// Decoding and encoding run on the blocking pool under `options.timeout`.
/// A blocking task cannot be cancelled: after a timeout it runs to completion
/// in the background and frees its buffers then. The decoder limits
/// ([`MAX_DECODE_DIMENSION`], [`MAX_DECODE_ALLOC`]) bound what it can hold.
pub async fn compress(
    file: &ImageFile,
    options: &CompressOptions,
    capabilities: Capabilities,
) -> Result<ImageFile, CompressError> {
    if !capabilities.compression {
        return Err(CompressError::Unsupported);
    }

    info!(
        "Starting image compression for: {} ({}KB)",
        file.name,
        file.size() / 1024
    );

    let input = file.bytes.clone();
    let max_width = options.max_width;
    let quality = options.jpeg_quality();
    let task = tokio::task::spawn_blocking(move || compress_bytes(&input, max_width, quality));

    let encoded = match timeout(options.timeout, task).await {
        Ok(joined) => joined??,
        Err(_) => return Err(CompressError::Timeout),
    };

    let now = Utc::now();
    let compressed = ImageFile {
        name: naming::compressed_file_name(file, now),
        content_type: "image/jpeg".into(),
        bytes: Bytes::from(encoded),
        last_modified: now,
    };

    if file.size() > 0 {
        let saved = 100 - (compressed.size() * 100 / file.size()).min(100);
        info!(
            "Compression successful: {}KB ({}% reduction)",
            compressed.size() / 1024,
            saved
        );
    }

    Ok(compressed)
}

/// Target size for a `width x height` image capped at `max_width`,
/// preserving aspect ratio. Never upscales.
pub fn scaled_dimensions(width: u32, height: u32, max_width: u32) -> (u32, u32) {
    if width <= max_width || width == 0 {
        return (width, height);
    }
    let scaled_height = (height as f64 * max_width as f64 / width as f64).round();
    (max_width, (scaled_height as u32).max(1))
}

/// Decode, downscale, and JPEG-encode. Synchronous; call from the blocking
/// pool.
pub fn compress_bytes(input: &[u8], max_width: u32, quality: u8) -> Result<Vec<u8>, CompressError> {
    let mut reader = ImageReader::new(Cursor::new(input))
        .with_guessed_format()
        .map_err(|err| CompressError::Decode(ImageError::IoError(err)))?;
    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_DECODE_DIMENSION);
    limits.max_image_height = Some(MAX_DECODE_DIMENSION);
    limits.max_alloc = Some(MAX_DECODE_ALLOC);
    reader.limits(limits);

    let img = reader.decode().map_err(CompressError::Decode)?;
    let (width, height) = img.dimensions();
    debug!("Image loaded successfully: {}x{}", width, height);

    let (target_width, target_height) = scaled_dimensions(width, height, max_width);
    let img = if (target_width, target_height) != (width, height) {
        debug!("Resizing to: {}x{}", target_width, target_height);
        img.resize_exact(target_width, target_height, FilterType::Triangle)
    } else {
        img
    };

    let rgb = img.to_rgb8();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode_image(&rgb)
        .map_err(CompressError::Encode)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        });
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn scaled_dimensions_preserves_aspect_ratio() {
        assert_eq!(scaled_dimensions(2400, 1600, 1200), (1200, 800));
        assert_eq!(scaled_dimensions(3000, 1001, 1200), (1200, 400));
        assert_eq!(scaled_dimensions(5000, 1, 1200), (1200, 1));
    }

    #[test]
    fn scaled_dimensions_never_upscales() {
        assert_eq!(scaled_dimensions(800, 600, 1200), (800, 600));
        assert_eq!(scaled_dimensions(1200, 900, 1200), (1200, 900));
    }

    #[test]
    fn jpeg_quality_maps_unit_interval() {
        let mut options = CompressOptions::default();
        assert_eq!(options.jpeg_quality(), 80);
        options.quality = 0.0;
        assert_eq!(options.jpeg_quality(), 1);
        options.quality = 7.0;
        assert_eq!(options.jpeg_quality(), 100);
    }

    #[test]
    fn wide_image_is_downscaled() {
        let out = compress_bytes(&png(1600, 400), 1200, 80).unwrap();
        let decoded = image::load_from_memory(&out).unwrap();
        assert_eq!(decoded.dimensions(), (1200, 300));
    }

    #[test]
    fn narrow_image_keeps_its_size() {
        let out = compress_bytes(&png(300, 200), 1200, 80).unwrap();
        let decoded = image::load_from_memory(&out).unwrap();
        assert_eq!(decoded.dimensions(), (300, 200));
        assert_eq!(image::guess_format(&out).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn oversized_dimensions_are_refused_by_the_decoder() {
        let err = compress_bytes(&png(MAX_DECODE_DIMENSION + 1, 1), 1200, 80).unwrap_err();
        assert!(matches!(
            err,
            CompressError::Decode(ImageError::Limits(_))
        ));
    }

    #[test]
    fn garbage_fails_to_decode() {
        let err = compress_bytes(b"definitely not an image", 1200, 80).unwrap_err();
        assert!(matches!(err, CompressError::Decode(_)));
    }

    #[tokio::test]
    async fn compress_renames_to_unique_jpeg() {
        let file = ImageFile::new("Red Scarf.png", "image/png", Bytes::from(png(50, 20)));
        let out = compress(&file, &CompressOptions::default(), Capabilities::default())
            .await
            .unwrap();

        assert_eq!(out.content_type, "image/jpeg");
        assert!(out.name.ends_with("_Red_Scarf.jpg"));
        assert_ne!(out.name, file.name);
    }

    #[tokio::test]
    async fn compress_respects_capabilities() {
        let file = ImageFile::new("a.png", "image/png", Bytes::from(png(10, 10)));
        let err = compress(
            &file,
            &CompressOptions::default(),
            Capabilities { compression: false },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CompressError::Unsupported));
    }
}
