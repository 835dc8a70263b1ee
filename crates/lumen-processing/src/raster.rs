//! Decoded working image
//!
//! `RasterImage` is the state threaded through the edit fold: the pixel buffer plus
//! everything the output stage needs (target format, per-format quality, which
//! metadata blocks survive).

use anyhow::{anyhow, Context, Result};
use image::{DynamicImage, GenericImageView, ImageFormat, ImageReader};
use lumen_core::ImageFormatType;
use std::collections::HashMap;
use std::io::Cursor;

use crate::encode::ImageEncoder;
use crate::metadata::{self, ImageMetadata};
use crate::orientation::ImageOrientation;

#[derive(Debug)]
pub struct RasterImage {
    pub image: DynamicImage,
    /// Container the bytes were decoded from
    pub source_format: ImageFormatType,
    /// Container the output stage encodes to
    pub format: ImageFormatType,
    pub metadata: ImageMetadata,
    quality: HashMap<ImageFormatType, u8>,
    keep_exif: bool,
    keep_icc: bool,
    oriented: bool,
}

impl RasterImage {
    /// Decode an encoded image, sniffing the container from its magic bytes.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let reader = ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .context("Failed to read image")?;

        let source_format = reader
            .format()
            .and_then(format_type)
            .ok_or_else(|| anyhow!("Unsupported input image format"))?;

        let image = reader.decode().context("Failed to decode image")?;

        tracing::debug!(
            format = %source_format,
            width = image.width(),
            height = image.height(),
            "Decoded source image"
        );

        Ok(RasterImage {
            image,
            source_format,
            format: source_format,
            metadata: ImageMetadata::read(data),
            quality: HashMap::new(),
            keep_exif: true,
            keep_icc: true,
            oriented: false,
        })
    }

    pub fn from_image(image: DynamicImage, format: ImageFormatType) -> Self {
        RasterImage {
            image,
            source_format: format,
            format,
            metadata: ImageMetadata {
                orientation: 1,
                ..ImageMetadata::default()
            },
            quality: HashMap::new(),
            keep_exif: true,
            keep_icc: true,
            oriented: false,
        }
    }

    /// Container of an encoded buffer, without decoding it.
    pub fn sniff_format(data: &[u8]) -> Option<ImageFormatType> {
        image::guess_format(data).ok().and_then(format_type)
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn set_quality(&mut self, format: ImageFormatType, quality: u8) {
        self.quality.insert(format, quality.min(100));
    }

    pub fn quality(&self, format: ImageFormatType) -> Option<u8> {
        self.quality.get(&format).copied()
    }

    /// Bake the EXIF orientation into the pixels. Runs at most once per image.
    pub fn auto_orient(&mut self) {
        if self.oriented {
            return;
        }
        let image = std::mem::replace(&mut self.image, DynamicImage::new_rgba8(0, 0));
        self.image = ImageOrientation::auto_orient(image, self.metadata.orientation);
        self.oriented = true;
    }

    /// Drop the EXIF block from the output; the ICC profile is kept unless `icc` is set.
    pub fn strip_metadata(&mut self, icc: bool) {
        self.keep_exif = false;
        if icc {
            self.keep_icc = false;
        }
    }

    pub fn keeps_exif(&self) -> bool {
        self.keep_exif
    }

    pub fn keeps_icc(&self) -> bool {
        self.keep_icc
    }

    /// Bytes in an encoding the detection service accepts: JPEG when the source was
    /// JPEG, PNG otherwise.
    pub fn to_detection_bytes(&self) -> Result<Vec<u8>> {
        let format = if self.source_format.is_detection_compatible() {
            self.source_format
        } else {
            ImageFormatType::Png
        };
        ImageEncoder::encode(&self.image, format, None, None)
    }

    /// Encode to the target format with the stored quality and the surviving metadata.
    pub fn encode(&self, reduction_effort: Option<u8>) -> Result<Vec<u8>> {
        let encoded = ImageEncoder::encode(
            &self.image,
            self.format,
            self.quality(self.format),
            reduction_effort,
        )?;

        metadata::embed(
            encoded,
            self.format,
            self.metadata.exif.as_ref().filter(|_| self.keep_exif),
            self.metadata.icc_profile.as_ref().filter(|_| self.keep_icc),
        )
    }
}

fn format_type(format: ImageFormat) -> Option<ImageFormatType> {
    match format {
        ImageFormat::Jpeg => Some(ImageFormatType::Jpeg),
        ImageFormat::Png => Some(ImageFormatType::Png),
        ImageFormat::WebP => Some(ImageFormatType::Webp),
        ImageFormat::Tiff => Some(ImageFormatType::Tiff),
        ImageFormat::Gif => Some(ImageFormatType::Gif),
        ImageFormat::Avif => Some(ImageFormatType::Avif),
        _ => None,
    }
}
