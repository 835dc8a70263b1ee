//! Error types module
//!
//! Every failure raised while translating or applying an edit document is an
//! `ImageHandlerError`. Each variant carries a stable machine-readable code and a
//! human-readable message; mapping to a transport status is left to the caller
//! through the `ErrorMetadata` trait.

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for recoverable issues like out-of-range edits
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata for error responses - defines how an error should be presented
pub trait ErrorMetadata {
    /// HTTP status code to return
    fn http_status_code(&self) -> u16;

    /// Machine-readable error code (e.g., "Crop::AreaOutOfBounds")
    fn error_code(&self) -> &str;

    /// Whether this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Suggested action for the client
    fn suggested_action(&self) -> Option<&'static str>;

    /// Client-facing message (may differ from internal error message)
    fn client_message(&self) -> String;

    /// Whether details should be hidden in production
    fn is_sensitive(&self) -> bool;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

pub const PAYLOAD_TOO_LARGE_CODE: &str = "TooLargeImageException";
pub const SMART_CROP_PADDING_CODE: &str = "SmartCrop::PaddingOutOfBounds";
pub const SMART_CROP_FACE_INDEX_CODE: &str = "SmartCrop::FaceIndexOutOfRange";
pub const CROP_AREA_CODE: &str = "Crop::AreaOutOfBounds";
pub const UNSUPPORTED_FORMAT_CODE: &str = "UnsupportedOutputImageFormatException";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ImageHandlerError {
    #[error("The converted image is too large to return.")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("The padding value you provided exceeds the boundaries of the original image. Please try choosing a smaller value or applying padding via Sharp for greater specificity.")]
    SmartCropPaddingOutOfBounds,

    #[error("You have provided a FaceIndex value that exceeds the length of the zero-based detectedFaces array. Please specify a value that is in-range.")]
    SmartCropFaceIndexOutOfRange { face_index: i64, detected: usize },

    #[error("The cropping area you provided exceeds the boundaries of the original image. Please try choosing a correct cropping value.")]
    CropAreaOutOfBounds,

    #[error("Format to {0} not supported")]
    UnsupportedOutputFormat(String),

    /// Failure surfaced by the object store or the detection service.
    #[error("{message}")]
    Upstream {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    #[error("Invalid edit: {0}")]
    InvalidEdit(String),

    #[error("{code}: {message}")]
    Configuration { code: &'static str, message: String },
}

impl ImageHandlerError {
    pub fn upstream(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        ImageHandlerError::Upstream {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn configuration(code: &'static str, message: impl Into<String>) -> Self {
        ImageHandlerError::Configuration {
            code,
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for ImageHandlerError {
    fn from(err: anyhow::Error) -> Self {
        // Keep typed errors that travelled through an anyhow chain.
        match err.downcast::<ImageHandlerError>() {
            Ok(typed) => typed,
            Err(other) => ImageHandlerError::ImageProcessing(format!("{:#}", other)),
        }
    }
}

impl From<serde_json::Error> for ImageHandlerError {
    fn from(err: serde_json::Error) -> Self {
        ImageHandlerError::InvalidEdit(format!("JSON parsing error: {}", err))
    }
}

impl ErrorMetadata for ImageHandlerError {
    fn http_status_code(&self) -> u16 {
        match self {
            ImageHandlerError::PayloadTooLarge { .. } => 413,
            ImageHandlerError::SmartCropPaddingOutOfBounds
            | ImageHandlerError::SmartCropFaceIndexOutOfRange { .. }
            | ImageHandlerError::CropAreaOutOfBounds
            | ImageHandlerError::ImageProcessing(_)
            | ImageHandlerError::InvalidEdit(_) => 400,
            ImageHandlerError::UnsupportedOutputFormat(_)
            | ImageHandlerError::Configuration { .. } => 500,
            ImageHandlerError::Upstream { status, .. } => *status,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            ImageHandlerError::PayloadTooLarge { .. } => PAYLOAD_TOO_LARGE_CODE,
            ImageHandlerError::SmartCropPaddingOutOfBounds => SMART_CROP_PADDING_CODE,
            ImageHandlerError::SmartCropFaceIndexOutOfRange { .. } => SMART_CROP_FACE_INDEX_CODE,
            ImageHandlerError::CropAreaOutOfBounds => CROP_AREA_CODE,
            ImageHandlerError::UnsupportedOutputFormat(_) => UNSUPPORTED_FORMAT_CODE,
            ImageHandlerError::Upstream { code, .. } => code,
            ImageHandlerError::ImageProcessing(_) => "ImageProcessingError",
            ImageHandlerError::InvalidEdit(_) => "InvalidEdit",
            ImageHandlerError::Configuration { code, .. } => code,
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            ImageHandlerError::Upstream { status, .. } => *status >= 500,
            _ => false,
        }
    }

    fn suggested_action(&self) -> Option<&'static str> {
        match self {
            ImageHandlerError::PayloadTooLarge { .. } => {
                Some("Request a smaller size or a more compact output format")
            }
            ImageHandlerError::SmartCropPaddingOutOfBounds => Some("Use a smaller padding value"),
            ImageHandlerError::SmartCropFaceIndexOutOfRange { .. } => {
                Some("Use a face index lower than the number of detected faces")
            }
            ImageHandlerError::CropAreaOutOfBounds => {
                Some("Keep the cropping area within the image dimensions")
            }
            ImageHandlerError::UnsupportedOutputFormat(_) => {
                Some("Use one of jpg, jpeg, png, webp, tiff, heif or raw")
            }
            ImageHandlerError::Upstream { status, .. } if *status >= 500 => {
                Some("Retry after a short delay")
            }
            ImageHandlerError::Upstream { .. } => Some("Check the bucket and key of the image"),
            ImageHandlerError::ImageProcessing(_) => {
                Some("Check image format and try a different file")
            }
            ImageHandlerError::InvalidEdit(_) => Some("Check the edit parameters and try again"),
            ImageHandlerError::Configuration { .. } => Some("Contact support if this error persists"),
        }
    }

    fn client_message(&self) -> String {
        match self {
            ImageHandlerError::Configuration { .. } => {
                "The image handler is not configured correctly.".to_string()
            }
            other => other.to_string(),
        }
    }

    fn is_sensitive(&self) -> bool {
        matches!(self, ImageHandlerError::Configuration { .. })
    }

    fn log_level(&self) -> LogLevel {
        match self {
            ImageHandlerError::InvalidEdit(_) => LogLevel::Debug,
            ImageHandlerError::Upstream { status, .. } if *status < 500 => LogLevel::Warn,
            ImageHandlerError::Upstream { .. }
            | ImageHandlerError::Configuration { .. }
            | ImageHandlerError::UnsupportedOutputFormat(_) => LogLevel::Error,
            _ => LogLevel::Warn,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_too_large_metadata() {
        let err = ImageHandlerError::PayloadTooLarge {
            size: 7_000_000,
            limit: 6_291_456,
        };
        assert_eq!(err.http_status_code(), 413);
        assert_eq!(err.error_code(), "TooLargeImageException");
        assert_eq!(err.to_string(), "The converted image is too large to return.");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_upstream_preserves_status_and_code() {
        let err = ImageHandlerError::upstream(404, "NoSuchKey", "The specified key does not exist.");
        assert_eq!(err.http_status_code(), 404);
        assert_eq!(err.error_code(), "NoSuchKey");
        assert_eq!(err.to_string(), "The specified key does not exist.");
        assert_eq!(err.log_level(), LogLevel::Warn);

        let err = ImageHandlerError::upstream(500, "InternalServerError", "SimulatedError");
        assert!(err.is_recoverable());
        assert_eq!(err.log_level(), LogLevel::Error);
    }

    #[test]
    fn test_unsupported_format_message() {
        let err = ImageHandlerError::UnsupportedOutputFormat("bmp".to_string());
        assert_eq!(err.http_status_code(), 500);
        assert_eq!(err.error_code(), "UnsupportedOutputImageFormatException");
        assert_eq!(err.to_string(), "Format to bmp not supported");
    }

    #[test]
    fn test_bounds_errors_are_bad_requests() {
        for err in [
            ImageHandlerError::CropAreaOutOfBounds,
            ImageHandlerError::SmartCropPaddingOutOfBounds,
            ImageHandlerError::SmartCropFaceIndexOutOfRange {
                face_index: 3,
                detected: 1,
            },
        ] {
            assert_eq!(err.http_status_code(), 400);
        }
        assert_eq!(
            ImageHandlerError::CropAreaOutOfBounds.error_code(),
            "Crop::AreaOutOfBounds"
        );
    }

    #[test]
    fn test_anyhow_roundtrip_keeps_typed_error() {
        let err: anyhow::Error = ImageHandlerError::CropAreaOutOfBounds.into();
        let back = ImageHandlerError::from(err);
        assert_eq!(back, ImageHandlerError::CropAreaOutOfBounds);

        let err = ImageHandlerError::from(anyhow::anyhow!("decode failed"));
        assert_eq!(err.error_code(), "ImageProcessingError");
    }

    #[test]
    fn test_configuration_message_hidden() {
        let err = ImageHandlerError::configuration(
            "ThumborMapping::ParseCustomPath::RewriteMatchPatternUndefined",
            "REWRITE_MATCH_PATTERN is not set",
        );
        assert!(err.is_sensitive());
        assert_eq!(
            err.client_message(),
            "The image handler is not configured correctly."
        );
    }
}
