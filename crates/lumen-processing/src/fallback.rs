//! Fallback image served in place of an error response

use base64::{engine::general_purpose::STANDARD, Engine as _};
use lumen_core::{FallbackImageConfig, ImageHandlerError};
use lumen_storage::Storage;

use crate::raster::RasterImage;

/// One year, shared caches allowed
pub const FALLBACK_CACHE_CONTROL: &str = "max-age=31536000,public";

#[derive(Debug, Clone, PartialEq)]
pub struct FallbackResponse {
    pub body_base64: String,
    pub content_type: &'static str,
    pub cache_control: &'static str,
}

pub struct FallbackImage;

impl FallbackImage {
    /// Fetch the configured fallback image. `None` when the fallback is disabled or
    /// its location is incomplete.
    pub async fn load(
        storage: &dyn Storage,
        config: &FallbackImageConfig,
    ) -> Result<Option<FallbackResponse>, ImageHandlerError> {
        let Some((bucket, key)) = config.location() else {
            return Ok(None);
        };

        let data = storage.get(bucket, key).await?;
        let content_type = RasterImage::sniff_format(&data)
            .map(|format| format.to_mime_type())
            .unwrap_or("application/octet-stream");

        tracing::info!(
            bucket = %bucket,
            key = %key,
            size_bytes = data.len(),
            "Serving fallback image"
        );

        Ok(Some(FallbackResponse {
            body_base64: STANDARD.encode(&data),
            content_type,
            cache_control: FALLBACK_CACHE_CONTROL,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use lumen_storage::MockStorage;

    fn enabled(bucket: &str, key: &str) -> FallbackImageConfig {
        FallbackImageConfig {
            enabled: true,
            bucket: Some(bucket.to_string()),
            key: Some(key.to_string()),
        }
    }

    #[tokio::test]
    async fn test_disabled_fallback() {
        let storage = MockStorage::new();
        let config = FallbackImageConfig {
            enabled: false,
            ..enabled("assets", "fallback.png")
        };
        assert_eq!(FallbackImage::load(&storage, &config).await.unwrap(), None);

        let blank = enabled("assets", "  ");
        assert_eq!(FallbackImage::load(&storage, &blank).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_loads_fallback() {
        let mut png = Vec::new();
        RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 255]))
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();

        let storage = MockStorage::new();
        storage.set_file("assets", "fallback.png", png.clone());

        let response = FallbackImage::load(&storage, &enabled("assets", "fallback.png"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response.content_type, "image/png");
        assert_eq!(response.cache_control, "max-age=31536000,public");
        assert_eq!(STANDARD.decode(response.body_base64).unwrap(), png);
    }

    #[tokio::test]
    async fn test_missing_fallback_object() {
        let storage = MockStorage::new();
        let err = FallbackImage::load(&storage, &enabled("assets", "gone.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, ImageHandlerError::Upstream { status: 404, .. }));
    }
}
