//! Output encoders
//!
//! JPEG goes through mozjpeg, WebP through libwebp and AVIF/HEIF through ravif; the
//! remaining containers use the `image` crate's own encoders.

use anyhow::{anyhow, Context, Result};
use image::{DynamicImage, GenericImageView, ImageFormat};
use lumen_core::ImageFormatType;
use std::io::Cursor;

pub const DEFAULT_JPEG_QUALITY: u8 = 80;
pub const DEFAULT_WEBP_QUALITY: u8 = 80;
pub const DEFAULT_HEIF_QUALITY: u8 = 50;

/// Slowest libwebp method (0-6, higher compresses harder).
const MAX_WEBP_METHOD: u8 = 6;

pub struct ImageEncoder;

impl ImageEncoder {
    /// Encode `img` into `format`. `quality` falls back to the per-format default and
    /// `reduction_effort` only affects WebP.
    pub fn encode(
        img: &DynamicImage,
        format: ImageFormatType,
        quality: Option<u8>,
        reduction_effort: Option<u8>,
    ) -> Result<Vec<u8>> {
        let data = match format {
            ImageFormatType::Jpeg => {
                Self::encode_jpeg(img, quality.unwrap_or(DEFAULT_JPEG_QUALITY))?
            }
            ImageFormatType::Png => Self::encode_with_image(img, ImageFormat::Png)?,
            ImageFormatType::Webp => Self::encode_webp(
                img,
                quality.unwrap_or(DEFAULT_WEBP_QUALITY),
                reduction_effort,
            )?,
            ImageFormatType::Tiff => Self::encode_with_image(img, ImageFormat::Tiff)?,
            ImageFormatType::Gif => Self::encode_with_image(img, ImageFormat::Gif)?,
            ImageFormatType::Heif | ImageFormatType::Heic | ImageFormatType::Avif => {
                Self::encode_avif(img, quality.unwrap_or(DEFAULT_HEIF_QUALITY))?
            }
            ImageFormatType::Raw => img.to_rgba8().into_raw(),
        };

        tracing::debug!(
            format = %format,
            quality = ?quality,
            reduction_effort = ?reduction_effort,
            size_bytes = data.len(),
            "Encoded image"
        );

        Ok(data)
    }

    /// Progressive JPEG with optimized Huffman tables
    fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
        let rgb_img = img.to_rgb8();
        let (width, height) = rgb_img.dimensions();

        let mut comp = mozjpeg::Compress::new(mozjpeg::ColorSpace::JCS_RGB);
        comp.set_size(width as usize, height as usize);
        comp.set_quality(quality as f32);
        comp.set_progressive_mode();
        comp.set_optimize_coding(true);

        let mut comp = comp.start_compress(Vec::new())?;
        comp.write_scanlines(&rgb_img)?;
        let jpeg_data = comp.finish()?;

        Ok(jpeg_data)
    }

    fn encode_webp(img: &DynamicImage, quality: u8, reduction_effort: Option<u8>) -> Result<Vec<u8>> {
        let (width, height) = img.dimensions();
        let rgba_img = img.to_rgba8();
        let encoder = webp::Encoder::from_rgba(&rgba_img, width, height);

        let Some(effort) = reduction_effort else {
            return Ok(encoder.encode(quality as f32).to_vec());
        };

        let mut config =
            webp::WebPConfig::new().map_err(|_| anyhow!("Failed to initialise WebP config"))?;
        config.quality = quality as f32;
        config.method = effort.min(MAX_WEBP_METHOD) as i32;

        let webp_data = encoder
            .encode_advanced(&config)
            .map_err(|e| anyhow!("WebP encoding failed: {:?}", e))?;
        Ok(webp_data.to_vec())
    }

    /// AVIF payload, also used for HEIF output
    fn encode_avif(img: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
        let (width, height) = img.dimensions();
        let rgba_img = img.to_rgba8();

        let rgba_data: Vec<rgb::RGBA8> = rgba_img
            .as_raw()
            .chunks_exact(4)
            .map(|chunk| rgb::RGBA8::new(chunk[0], chunk[1], chunk[2], chunk[3]))
            .collect();

        let img_buf = ravif::Img::new(rgba_data.as_slice(), width as usize, height as usize);

        let encoder = ravif::Encoder::new()
            .with_quality(quality as f32)
            .with_speed(6);

        let avif_data = encoder
            .encode_rgba(img_buf)
            .context("AVIF encoding failed")?;

        Ok(avif_data.avif_file)
    }

    fn encode_with_image(img: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        img.write_to(&mut Cursor::new(&mut buffer), format)
            .with_context(|| format!("Failed to encode {:?}", format))?;
        Ok(buffer)
    }
}
