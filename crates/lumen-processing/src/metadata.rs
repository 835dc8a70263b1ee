//! Embedded image metadata: EXIF block, ICC profile and orientation

use anyhow::{Context, Result};
use img_parts::{Bytes, DynImage, ImageEXIF, ImageICC};
use lumen_core::ImageFormatType;
use std::io::Cursor;

/// Metadata carried from the source image to the encoded output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageMetadata {
    pub exif: Option<Bytes>,
    pub icc_profile: Option<Bytes>,
    /// EXIF orientation (1-8); 1 when absent.
    pub orientation: u32,
}

impl ImageMetadata {
    /// Read metadata from an encoded image. Containers img-parts cannot parse
    /// yield empty metadata.
    pub fn read(data: &[u8]) -> Self {
        let (exif, icc_profile) = match DynImage::from_bytes(Bytes::copy_from_slice(data)) {
            Ok(Some(image)) => (image.exif(), image.icc_profile()),
            _ => (None, None),
        };

        ImageMetadata {
            exif,
            icc_profile,
            orientation: read_exif_orientation(data),
        }
    }
}

/// Read the EXIF orientation tag, returning 1 (normal) when absent or invalid.
pub fn read_exif_orientation(data: &[u8]) -> u32 {
    let mut cursor = Cursor::new(data);
    exif::Reader::new()
        .read_from_container(&mut cursor)
        .ok()
        .and_then(|exif| {
            exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)
                .and_then(|field| field.value.get_uint(0))
        })
        .filter(|orientation| (1..=8).contains(orientation))
        .unwrap_or(1)
}

/// Write EXIF and ICC blocks into an encoded image.
///
/// Only JPEG, PNG and WebP containers carry metadata; other encodings are returned
/// unchanged.
pub fn embed(
    encoded: Vec<u8>,
    format: ImageFormatType,
    exif: Option<&Bytes>,
    icc_profile: Option<&Bytes>,
) -> Result<Vec<u8>> {
    if exif.is_none() && icc_profile.is_none() {
        return Ok(encoded);
    }
    if !matches!(
        format,
        ImageFormatType::Jpeg | ImageFormatType::Png | ImageFormatType::Webp
    ) {
        return Ok(encoded);
    }

    let Some(mut image) =
        DynImage::from_bytes(Bytes::from(encoded.clone())).context("Failed to parse encoded image")?
    else {
        return Ok(encoded);
    };

    image.set_exif(exif.cloned());
    image.set_icc_profile(icc_profile.cloned());
    Ok(image.encoder().bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};

    fn png_bytes() -> Vec<u8> {
        let img = RgbaImage::from_pixel(4, 4, Rgba([255, 0, 0, 255]));
        let mut buffer = Vec::new();
        img.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        buffer
    }

    #[test]
    fn test_plain_png_has_no_metadata() {
        let metadata = ImageMetadata::read(&png_bytes());
        assert_eq!(metadata.exif, None);
        assert_eq!(metadata.icc_profile, None);
        assert_eq!(metadata.orientation, 1);
    }

    #[test]
    fn test_unparseable_data() {
        assert_eq!(ImageMetadata::read(b"not an image"), ImageMetadata {
            orientation: 1,
            ..ImageMetadata::default()
        });
        assert_eq!(read_exif_orientation(b""), 1);
    }

    #[test]
    fn test_embed_icc_roundtrip() {
        let profile = Bytes::from_static(b"fake-icc-profile");
        let encoded = embed(png_bytes(), ImageFormatType::Png, None, Some(&profile)).unwrap();
        let metadata = ImageMetadata::read(&encoded);
        assert_eq!(metadata.icc_profile, Some(profile));

        let decoded = image::load_from_memory(&encoded).unwrap();
        assert_eq!(decoded.width(), 4);
    }

    #[test]
    fn test_embed_skips_formats_without_metadata() {
        let data = b"raw-pixels".to_vec();
        let out = embed(
            data.clone(),
            ImageFormatType::Raw,
            Some(&Bytes::from_static(b"exif")),
            None,
        )
        .unwrap();
        assert_eq!(out, data);
    }
}
