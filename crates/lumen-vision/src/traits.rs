use async_trait::async_trait;
use lumen_core::ImageHandlerError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Normalized (0-1) rectangle relative to the analysed image.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub top: f64,
    pub left: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceDetail {
    pub bounding_box: BoundingBox,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationLabel {
    pub name: String,
    pub confidence: f32,
}

#[derive(Debug, Error)]
pub enum DetectionError {
    /// Error returned by the detection backend, with its status and code.
    #[error("{message}")]
    Service {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type DetectionResult<T> = Result<T, DetectionError>;

impl From<DetectionError> for ImageHandlerError {
    fn from(err: DetectionError) -> Self {
        match err {
            DetectionError::Service {
                status,
                code,
                message,
            } => ImageHandlerError::upstream(status, code, message),
            DetectionError::ConfigError(message) => {
                ImageHandlerError::upstream(500, "DetectionConfiguration", message)
            }
        }
    }
}

/// Face and moderation-label detection over encoded JPEG or PNG bytes.
#[async_trait]
pub trait DetectionService: Send + Sync {
    async fn detect_faces(&self, image: &[u8]) -> DetectionResult<Vec<FaceDetail>>;

    async fn detect_moderation_labels(
        &self,
        image: &[u8],
        min_confidence: f32,
    ) -> DetectionResult<Vec<ModerationLabel>>;
}
