//! Lumen Vision Library
//!
//! Face and moderation-label detection behind the `DetectionService` trait, with an
//! AWS Rekognition implementation.

#[cfg(any(test, feature = "test-helpers"))]
pub mod mock;
#[cfg(feature = "rekognition")]
pub mod rekognition;
pub mod traits;

#[cfg(any(test, feature = "test-helpers"))]
pub use mock::{DetectionCall, MockDetection};
#[cfg(feature = "rekognition")]
pub use rekognition::RekognitionDetection;
pub use traits::{
    BoundingBox, DetectionError, DetectionResult, DetectionService, FaceDetail, ModerationLabel,
};
