//! Edit applicator
//!
//! Folds an [`EditDocument`] over a decoded image, one edit at a time and in
//! document order, then runs the output stage. Handlers that need the object store
//! or the detection service await them in sequence; any failure aborts the fold.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use lumen_core::{
    ContentModerationOptions, Edit, EditDocument, ImageFormatType, ImageHandlerError,
    OverlayOptions, SmartCropOptions,
};
use lumen_storage::Storage;
use lumen_vision::DetectionService;
use std::sync::Arc;
use std::time::Instant;

use crate::geometry::{crop_rect_from_box, face_bounding_box};
use crate::mask::RoundMask;
use crate::ops::ImageOps;
use crate::orientation::ImageOrientation;
use crate::overlay::Overlay;
use crate::raster::RasterImage;
use crate::resize::ImageResize;

/// Ceiling on the base64 response body (6 MiB)
pub const PAYLOAD_LIMIT: usize = 6 * 1024 * 1024;

/// Blur sigmas accepted by content moderation
const MODERATION_BLUR_RANGE: std::ops::RangeInclusive<f32> = 0.3..=1000.0;

/// Encoded output of [`EditApplicator::process`]
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedImage {
    pub body_base64: String,
    pub format: ImageFormatType,
    pub content_type: &'static str,
}

pub struct EditApplicator {
    storage: Arc<dyn Storage>,
    detection: Arc<dyn DetectionService>,
}

impl EditApplicator {
    pub fn new(storage: Arc<dyn Storage>, detection: Arc<dyn DetectionService>) -> Self {
        EditApplicator { storage, detection }
    }

    /// Apply every edit of `edits` to `image`.
    ///
    /// A `resize` (by default `fit: inside`) is appended when the document has none.
    /// A resize pending behind an `overlayWith` is applied before the overlay is
    /// positioned and is not repeated.
    pub async fn apply(
        &self,
        mut image: RasterImage,
        edits: &EditDocument,
    ) -> Result<RasterImage, ImageHandlerError> {
        let edits = edits.clone().with_default_resize();
        let mut resized = false;

        for edit in &edits {
            tracing::debug!(edit = edit.name(), "Applying edit");

            match edit {
                Edit::Resize(options) => {
                    if !resized {
                        image.image = ImageResize::apply(image.image, options)?;
                        resized = true;
                    }
                }
                Edit::Crop(region) => {
                    let (left, top, width, height) = region
                        .to_pixels(image.width(), image.height())
                        .ok_or(ImageHandlerError::CropAreaOutOfBounds)?;
                    image.image = image.image.crop_imm(left, top, width, height);
                }
                Edit::Rotate(angle) => {
                    image.auto_orient();
                    match angle {
                        Some(degrees) => {
                            image.image = ImageOrientation::rotate(image.image, *degrees);
                            image.strip_metadata(false);
                        }
                        None => image.strip_metadata(true),
                    }
                }
                Edit::Flip => image.image = image.image.flipv(),
                Edit::Flop => image.image = image.image.fliph(),
                Edit::Grayscale => image.image = image.image.grayscale(),
                Edit::Blur(sigma) => image.image = ImageOps::blur(image.image, *sigma),
                Edit::Sharpen(sigma) => image.image = ImageOps::sharpen(image.image, *sigma),
                Edit::Normalize => image.image = ImageOps::normalize(image.image),
                Edit::Tint(color) => image.image = ImageOps::tint(image.image, *color),
                Edit::Flatten { background } => {
                    image.image = ImageOps::flatten(image.image, *background)
                }
                Edit::Convolve(kernel) => {
                    image.image = ImageOps::convolve(image.image, kernel)
                        .map_err(|e| ImageHandlerError::InvalidEdit(format!("convolve: {}", e)))?
                }
                Edit::OverlayWith(options) => {
                    if let Some(resize) = edits.resize() {
                        if !resized {
                            image.image = ImageResize::apply(image.image, resize)?;
                            resized = true;
                        }
                    }
                    image = self.overlay(image, options).await?;
                }
                Edit::SmartCrop(toggle) => {
                    image = self.smart_crop(image, &toggle.resolve()).await?;
                }
                Edit::RoundCrop(toggle) => {
                    image.image = RoundMask::apply(image.image, &toggle.resolve());
                }
                Edit::ContentModeration(toggle) => {
                    image = self.moderate(image, &toggle.resolve()).await?;
                }
                Edit::ToFormat(name) => {
                    image.format = convert_output_format(name)?;
                }
                Edit::FormatOptions { format, quality } => {
                    image.format = *format;
                    if let Some(quality) = quality {
                        image.set_quality(*format, *quality);
                    }
                }
                Edit::PassThrough { name, value } => {
                    if ImageOps::supports(name) {
                        image.image = ImageOps::pass_through(image.image, name, value);
                    } else {
                        tracing::warn!(edit = %name, "Skipping unsupported edit");
                    }
                }
            }
        }

        Ok(image)
    }

    /// Apply `edits` to `original` and encode the result as base64.
    ///
    /// With no edits and no output format the original bytes are returned as-is.
    pub async fn process(
        &self,
        original: &[u8],
        edits: &EditDocument,
        output_format: Option<&str>,
        reduction_effort: Option<u8>,
    ) -> Result<ProcessedImage, ImageHandlerError> {
        let start = Instant::now();

        let (body, format) = if !edits.is_empty() {
            let image = RasterImage::decode(original)?;
            let mut image = self.apply(image, edits).await?;
            let requested = output_format.map(convert_output_format).transpose()?;
            if let Some(format) = requested {
                image.format = format;
            }
            (image.encode(webp_effort(requested, reduction_effort))?, image.format)
        } else if let Some(requested) = output_format {
            let mut image = RasterImage::decode(original)?;
            image.format = convert_output_format(requested)?;
            image.strip_metadata(true);
            (image.encode(None)?, image.format)
        } else {
            let format = RasterImage::sniff_format(original).unwrap_or(ImageFormatType::Raw);
            (original.to_vec(), format)
        };

        let body_base64 = STANDARD.encode(&body);
        ensure_within_payload_limit(&body_base64)?;

        tracing::info!(
            edit_count = edits.len(),
            format = %format,
            size_bytes = body.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Image processed"
        );

        Ok(ProcessedImage {
            body_base64,
            format,
            content_type: format.to_mime_type(),
        })
    }

    async fn overlay(
        &self,
        mut image: RasterImage,
        options: &OverlayOptions,
    ) -> Result<RasterImage, ImageHandlerError> {
        let overlay_data = self.storage.get(&options.bucket, &options.key).await?;
        image.image = Overlay::apply(image.image, &overlay_data, options)?;
        Ok(image)
    }

    async fn smart_crop(
        &self,
        mut image: RasterImage,
        options: &SmartCropOptions,
    ) -> Result<RasterImage, ImageHandlerError> {
        let detection_bytes = image.to_detection_bytes()?;
        let faces = self.detection.detect_faces(&detection_bytes).await?;
        let bounding_box = face_bounding_box(&faces, options.face_index())?;

        let rect = crop_rect_from_box(
            &bounding_box,
            options.padding(),
            image.width(),
            image.height(),
        );
        let (left, top, width, height) = rect
            .to_region(image.width(), image.height())
            .ok_or(ImageHandlerError::SmartCropPaddingOutOfBounds)?;

        tracing::debug!(
            face_count = faces.len(),
            face_index = options.face_index(),
            left,
            top,
            width,
            height,
            "Smart crop area"
        );

        image.image = image.image.crop_imm(left, top, width, height);
        Ok(image)
    }

    async fn moderate(
        &self,
        mut image: RasterImage,
        options: &ContentModerationOptions,
    ) -> Result<RasterImage, ImageHandlerError> {
        let detection_bytes = image.to_detection_bytes()?;
        let labels = self
            .detection
            .detect_moderation_labels(&detection_bytes, options.min_confidence())
            .await?;

        let blur = options.blur();
        if !MODERATION_BLUR_RANGE.contains(&blur) {
            return Ok(image);
        }

        let flagged = match &options.moderation_labels {
            Some(wanted) => labels.iter().any(|label| wanted.contains(&label.name)),
            None => !labels.is_empty(),
        };

        tracing::debug!(
            label_count = labels.len(),
            flagged,
            blur,
            "Content moderation result"
        );

        if flagged {
            image.image = ImageOps::blur(image.image, Some(blur));
        }
        Ok(image)
    }
}

/// Reduction effort only applies when the caller explicitly asked for WebP; a
/// `toFormat` edit selecting WebP does not pick it up.
fn webp_effort(requested: Option<ImageFormatType>, reduction_effort: Option<u8>) -> Option<u8> {
    reduction_effort.filter(|_| requested == Some(ImageFormatType::Webp))
}

/// Map a requested output format onto an encoder target.
pub fn convert_output_format(requested: &str) -> Result<ImageFormatType, ImageHandlerError> {
    ImageFormatType::output_target(requested)
        .ok_or_else(|| ImageHandlerError::UnsupportedOutputFormat(requested.to_string()))
}

/// Reject a base64 body longer than [`PAYLOAD_LIMIT`].
pub fn ensure_within_payload_limit(body_base64: &str) -> Result<(), ImageHandlerError> {
    if body_base64.len() > PAYLOAD_LIMIT {
        return Err(ImageHandlerError::PayloadTooLarge {
            size: body_base64.len(),
            limit: PAYLOAD_LIMIT,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};
    use lumen_core::{CropRegion, ResizeOptions, Toggle};
    use lumen_storage::MockStorage;
    use lumen_vision::{DetectionCall, MockDetection};
    use serde_json::json;

    fn raster(width: u32, height: u32) -> RasterImage {
        RasterImage::from_image(
            DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba([200, 100, 50, 255]))),
            ImageFormatType::Png,
        )
    }

    fn applicator(storage: MockStorage, detection: MockDetection) -> EditApplicator {
        EditApplicator::new(Arc::new(storage), Arc::new(detection))
    }

    #[test]
    fn test_payload_limit_boundary() {
        assert!(ensure_within_payload_limit(&"A".repeat(PAYLOAD_LIMIT)).is_ok());
        assert_eq!(
            ensure_within_payload_limit(&"A".repeat(PAYLOAD_LIMIT + 1)).unwrap_err(),
            ImageHandlerError::PayloadTooLarge {
                size: PAYLOAD_LIMIT + 1,
                limit: PAYLOAD_LIMIT
            }
        );
    }

    #[test]
    fn test_webp_effort_needs_requested_webp() {
        assert_eq!(webp_effort(Some(ImageFormatType::Webp), Some(4)), Some(4));
        assert_eq!(webp_effort(Some(ImageFormatType::Png), Some(4)), None);
        assert_eq!(webp_effort(None, Some(4)), None);
        assert_eq!(webp_effort(Some(ImageFormatType::Webp), None), None);
    }

    #[test]
    fn test_convert_output_format() {
        assert_eq!(convert_output_format("jpg").unwrap(), ImageFormatType::Jpeg);
        assert_eq!(convert_output_format("raw").unwrap(), ImageFormatType::Raw);
        let err = convert_output_format("bmp").unwrap_err();
        assert_eq!(err.to_string(), "Format to bmp not supported");
    }

    #[tokio::test]
    async fn test_crop_out_of_bounds() {
        let applicator = applicator(MockStorage::new(), MockDetection::new());
        let edits = EditDocument::new(vec![Edit::Crop(CropRegion {
            left: 50.0,
            top: 0.0,
            width: 60.0,
            height: 10.0,
        })]);

        let err = applicator.apply(raster(100, 100), &edits).await.unwrap_err();
        assert_eq!(err, ImageHandlerError::CropAreaOutOfBounds);
    }

    #[tokio::test]
    async fn test_smart_crop_uses_face_box() {
        let detection = Arc::new(MockDetection::new().with_face(0.55, 0.33, 0.23, 0.18));
        let applicator = EditApplicator::new(Arc::new(MockStorage::new()), detection.clone());
        let edits = EditDocument::new(vec![Edit::SmartCrop(Toggle::EnabledWithOptions(
            SmartCropOptions {
                face_index: Some(0.0),
                padding: Some(20.0),
            },
        ))]);

        let result = applicator.apply(raster(200, 400), &edits).await.unwrap();
        assert_eq!(result.dimensions(), (86, 112));

        // PNG source is sent as PNG
        match &detection.calls()[0] {
            DetectionCall::Faces { image } => {
                assert_eq!(RasterImage::sniff_format(image), Some(ImageFormatType::Png))
            }
            other => panic!("unexpected call {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_smart_crop_face_index_out_of_range() {
        let applicator = applicator(
            MockStorage::new(),
            MockDetection::new().with_face(0.1, 0.1, 0.2, 0.2),
        );
        let edits = EditDocument::new(vec![Edit::SmartCrop(Toggle::EnabledWithOptions(
            SmartCropOptions {
                face_index: Some(3.0),
                padding: None,
            },
        ))]);

        let err = applicator.apply(raster(100, 100), &edits).await.unwrap_err();
        assert_eq!(
            err,
            ImageHandlerError::SmartCropFaceIndexOutOfRange {
                face_index: 3,
                detected: 1
            }
        );
    }

    #[tokio::test]
    async fn test_smart_crop_negative_padding() {
        let applicator = applicator(
            MockStorage::new(),
            MockDetection::new().with_face(0.5, 0.5, 0.1, 0.1),
        );
        let edits = EditDocument::new(vec![Edit::SmartCrop(Toggle::EnabledWithOptions(
            SmartCropOptions {
                face_index: None,
                padding: Some(-50.0),
            },
        ))]);

        let err = applicator.apply(raster(200, 200), &edits).await.unwrap_err();
        assert_eq!(err, ImageHandlerError::SmartCropPaddingOutOfBounds);
    }

    #[tokio::test]
    async fn test_detection_failure_is_upstream_error() {
        let applicator = applicator(
            MockStorage::new(),
            MockDetection::new().failing(400, "InvalidImageFormatException"),
        );
        let edits = EditDocument::new(vec![Edit::SmartCrop(Toggle::Enabled)]);

        let err = applicator.apply(raster(10, 10), &edits).await.unwrap_err();
        assert!(matches!(
            err,
            ImageHandlerError::Upstream { status: 400, ref code, .. } if code == "InvalidImageFormatException"
        ));
    }

    #[tokio::test]
    async fn test_content_moderation_blurs_matching_label() {
        let mut pixels = RgbaImage::from_pixel(20, 20, Rgba([0, 0, 0, 255]));
        pixels.put_pixel(10, 10, Rgba([255, 255, 255, 255]));
        let image = || RasterImage::from_image(DynamicImage::ImageRgba8(pixels.clone()), ImageFormatType::Png);

        let applicator = applicator(
            MockStorage::new(),
            MockDetection::new().with_label("Smoking", 90.0),
        );

        let wanted = EditDocument::new(vec![Edit::ContentModeration(Toggle::EnabledWithOptions(
            ContentModerationOptions {
                min_confidence: None,
                blur: Some(2.0),
                moderation_labels: Some(vec!["Smoking".to_string()]),
            },
        ))]);
        let blurred = applicator.apply(image(), &wanted).await.unwrap();
        assert!(blurred.image.get_pixel(10, 10)[0] < 255);

        let other = EditDocument::new(vec![Edit::ContentModeration(Toggle::EnabledWithOptions(
            ContentModerationOptions {
                min_confidence: None,
                blur: Some(2.0),
                moderation_labels: Some(vec!["Violence".to_string()]),
            },
        ))]);
        let untouched = applicator.apply(image(), &other).await.unwrap();
        assert_eq!(untouched.image.get_pixel(10, 10), Rgba([255, 255, 255, 255]));
    }

    #[tokio::test]
    async fn test_content_moderation_default_confidence() {
        let detection = Arc::new(MockDetection::new());
        let applicator = EditApplicator::new(Arc::new(MockStorage::new()), detection.clone());
        let edits = EditDocument::new(vec![Edit::ContentModeration(Toggle::Enabled)]);

        applicator.apply(raster(10, 10), &edits).await.unwrap();
        assert!(matches!(
            detection.calls()[0],
            DetectionCall::ModerationLabels { min_confidence, .. } if min_confidence == 75.0
        ));
    }

    fn speck() -> RasterImage {
        let mut pixels = RgbaImage::from_pixel(20, 20, Rgba([0, 0, 0, 255]));
        pixels.put_pixel(10, 10, Rgba([255, 255, 255, 255]));
        RasterImage::from_image(DynamicImage::ImageRgba8(pixels), ImageFormatType::Png)
    }

    fn moderation(blur: Option<f64>) -> EditDocument {
        EditDocument::new(vec![Edit::ContentModeration(Toggle::EnabledWithOptions(
            ContentModerationOptions {
                min_confidence: None,
                blur,
                moderation_labels: None,
            },
        ))])
    }

    #[tokio::test]
    async fn test_content_moderation_any_label_without_list() {
        let flagged = applicator(MockStorage::new(), MockDetection::new().with_label("Gambling", 80.0));
        let blurred = flagged.apply(speck(), &moderation(Some(2.0))).await.unwrap();
        assert!(blurred.image.get_pixel(10, 10)[0] < 255);

        let clean = applicator(MockStorage::new(), MockDetection::new());
        let untouched = clean.apply(speck(), &moderation(Some(2.0))).await.unwrap();
        assert_eq!(untouched.image.get_pixel(10, 10), Rgba([255, 255, 255, 255]));
    }

    #[tokio::test]
    async fn test_content_moderation_blur_out_of_range_is_skipped() {
        let applicator = applicator(MockStorage::new(), MockDetection::new().with_label("Gambling", 80.0));

        for blur in [0.0, 1001.0] {
            let result = applicator.apply(speck(), &moderation(Some(blur))).await.unwrap();
            assert_eq!(result.image.get_pixel(10, 10), Rgba([255, 255, 255, 255]));
        }

        // Values round up, so 0.2 blurs with sigma 1
        let result = applicator.apply(speck(), &moderation(Some(0.2))).await.unwrap();
        assert!(result.image.get_pixel(10, 10)[0] < 255);
    }

    #[tokio::test]
    async fn test_overlay_fetches_from_storage() {
        let storage = MockStorage::new();
        let mut logo = Vec::new();
        RgbaImage::from_pixel(10, 10, Rgba([0, 0, 255, 255]))
            .write_to(&mut std::io::Cursor::new(&mut logo), image::ImageFormat::Png)
            .unwrap();
        storage.set_file("assets", "logo.png", logo);

        let applicator = applicator(storage, MockDetection::new());
        let edits = EditDocument::from_json(&json!({
            "overlayWith": {
                "bucket": "assets",
                "key": "logo.png",
                "options": {"left": "0", "top": "0"}
            },
            "resize": {"width": 50, "height": 50, "fit": "fill"}
        }))
        .unwrap();

        let result = applicator.apply(raster(100, 100), &edits).await.unwrap();
        // Resize applied once, before the overlay
        assert_eq!(result.dimensions(), (50, 50));
        assert_eq!(result.image.get_pixel(5, 5), Rgba([0, 0, 255, 255]));
        assert_eq!(result.image.get_pixel(20, 20)[2], 50);
    }

    #[tokio::test]
    async fn test_overlay_missing_object() {
        let applicator = applicator(MockStorage::new(), MockDetection::new());
        let edits = EditDocument::from_json(&json!({
            "overlayWith": {"bucket": "assets", "key": "missing.png"}
        }))
        .unwrap();

        let err = applicator.apply(raster(10, 10), &edits).await.unwrap_err();
        assert!(matches!(err, ImageHandlerError::Upstream { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_overlay_storage_failure() {
        let storage = MockStorage::new();
        storage.fail_with("connection reset");
        let applicator = applicator(storage, MockDetection::new());
        let edits = EditDocument::from_json(&json!({
            "overlayWith": {"bucket": "assets", "key": "logo.png"}
        }))
        .unwrap();

        let err = applicator.apply(raster(10, 10), &edits).await.unwrap_err();
        assert!(matches!(err, ImageHandlerError::Upstream { status: 500, .. }));
        assert!(err.to_string().contains("connection reset"));
    }

    #[tokio::test]
    async fn test_rotate_strips_metadata() {
        let applicator = applicator(MockStorage::new(), MockDetection::new());

        let rotated = applicator
            .apply(raster(40, 20), &EditDocument::new(vec![Edit::Rotate(Some(90.0))]))
            .await
            .unwrap();
        assert_eq!(rotated.dimensions(), (20, 40));
        assert!(!rotated.keeps_exif());
        assert!(rotated.keeps_icc());

        let stripped = applicator
            .apply(raster(40, 20), &EditDocument::new(vec![Edit::Rotate(None)]))
            .await
            .unwrap();
        assert_eq!(stripped.dimensions(), (40, 20));
        assert!(!stripped.keeps_icc());
    }

    #[tokio::test]
    async fn test_document_order_and_pass_through() {
        let applicator = applicator(MockStorage::new(), MockDetection::new());
        let edits = EditDocument::new(vec![
            Edit::Resize(ResizeOptions {
                width: Some(10),
                ..ResizeOptions::default()
            }),
            Edit::PassThrough {
                name: "modulate".to_string(),
                value: json!({"brightness": 2}),
            },
            Edit::PassThrough {
                name: "negate".to_string(),
                value: json!(true),
            },
            Edit::FormatOptions {
                format: ImageFormatType::Webp,
                quality: Some(60),
            },
        ]);

        let result = applicator.apply(raster(20, 20), &edits).await.unwrap();
        assert_eq!(result.dimensions(), (10, 10));
        let Rgba([r, g, b, _]) = result.image.get_pixel(0, 0);
        assert!(r.abs_diff(55) <= 1 && g.abs_diff(155) <= 1 && b.abs_diff(205) <= 1);
        assert_eq!(result.format, ImageFormatType::Webp);
        assert_eq!(result.quality(ImageFormatType::Webp), Some(60));
    }

    #[tokio::test]
    async fn test_unsupported_to_format() {
        let applicator = applicator(MockStorage::new(), MockDetection::new());
        let edits = EditDocument::new(vec![Edit::ToFormat("bmp".to_string())]);
        let err = applicator.apply(raster(10, 10), &edits).await.unwrap_err();
        assert_eq!(err, ImageHandlerError::UnsupportedOutputFormat("bmp".to_string()));
    }
}
