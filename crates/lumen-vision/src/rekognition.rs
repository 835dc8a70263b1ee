//! AWS Rekognition detection backend

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_rekognition::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_rekognition::primitives::Blob;
use aws_sdk_rekognition::types::Image;
use aws_sdk_rekognition::Client as RekognitionClient;
use std::fmt::{Debug, Formatter, Result as FmtResult};

use crate::traits::{
    BoundingBox, DetectionError, DetectionResult, DetectionService, FaceDetail, ModerationLabel,
};

pub struct RekognitionDetection {
    client: RekognitionClient,
}

impl Debug for RekognitionDetection {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("RekognitionDetection").finish()
    }
}

impl RekognitionDetection {
    /// Create a Rekognition client for the given region
    pub async fn new(region: &str) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()))
            .load()
            .await;
        RekognitionDetection {
            client: RekognitionClient::new(&config),
        }
    }

    fn image(bytes: &[u8]) -> Image {
        Image::builder().bytes(Blob::new(bytes)).build()
    }
}

fn service_error<E, R>(err: SdkError<E, R>) -> DetectionError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: Debug,
{
    let status = match &err {
        SdkError::ServiceError(_) => 400,
        _ => 500,
    };
    let code = err.code().unwrap_or("RekognitionError").to_string();
    let message = err
        .message()
        .map(str::to_string)
        .unwrap_or_else(|| err.to_string());
    DetectionError::Service {
        status,
        code,
        message,
    }
}

#[async_trait]
impl DetectionService for RekognitionDetection {
    async fn detect_faces(&self, image: &[u8]) -> DetectionResult<Vec<FaceDetail>> {
        let start = std::time::Instant::now();
        let response = self
            .client
            .detect_faces()
            .image(Self::image(image))
            .send()
            .await
            .map_err(service_error)?;

        let faces: Vec<FaceDetail> = response
            .face_details()
            .iter()
            .filter_map(|face| face.bounding_box())
            .map(|bbox| FaceDetail {
                bounding_box: BoundingBox {
                    top: bbox.top().unwrap_or(0.0) as f64,
                    left: bbox.left().unwrap_or(0.0) as f64,
                    width: bbox.width().unwrap_or(0.0) as f64,
                    height: bbox.height().unwrap_or(0.0) as f64,
                },
            })
            .collect();

        tracing::info!(
            face_count = faces.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Rekognition face detection completed"
        );
        Ok(faces)
    }

    async fn detect_moderation_labels(
        &self,
        image: &[u8],
        min_confidence: f32,
    ) -> DetectionResult<Vec<ModerationLabel>> {
        let start = std::time::Instant::now();
        let response = self
            .client
            .detect_moderation_labels()
            .image(Self::image(image))
            .min_confidence(min_confidence)
            .send()
            .await
            .map_err(service_error)?;

        let labels: Vec<ModerationLabel> = response
            .moderation_labels()
            .iter()
            .map(|label| ModerationLabel {
                name: label.name().unwrap_or("Unknown").to_string(),
                confidence: label.confidence().unwrap_or(0.0),
            })
            .collect();

        tracing::info!(
            label_count = labels.len(),
            min_confidence,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Rekognition moderation completed"
        );
        Ok(labels)
    }
}
