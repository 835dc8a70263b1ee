//! Scripted detection service for tests

use async_trait::async_trait;
use std::sync::Mutex;

use crate::traits::{
    BoundingBox, DetectionError, DetectionResult, DetectionService, FaceDetail, ModerationLabel,
};

/// A request the mock received, with the bytes it was sent.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectionCall {
    Faces { image: Vec<u8> },
    ModerationLabels { image: Vec<u8>, min_confidence: f32 },
}

#[derive(Default)]
pub struct MockDetection {
    faces: Vec<FaceDetail>,
    labels: Vec<ModerationLabel>,
    failure: Option<(u16, String)>,
    calls: Mutex<Vec<DetectionCall>>,
}

impl MockDetection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_face(mut self, left: f64, top: f64, width: f64, height: f64) -> Self {
        self.faces.push(FaceDetail {
            bounding_box: BoundingBox {
                top,
                left,
                width,
                height,
            },
        });
        self
    }

    pub fn with_label(mut self, name: &str, confidence: f32) -> Self {
        self.labels.push(ModerationLabel {
            name: name.to_string(),
            confidence,
        });
        self
    }

    /// Fail every request with the given status and code
    pub fn failing(mut self, status: u16, code: &str) -> Self {
        self.failure = Some((status, code.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<DetectionCall> {
        self.calls.lock().unwrap().clone()
    }

    fn check_failure(&self) -> DetectionResult<()> {
        match &self.failure {
            Some((status, code)) => Err(DetectionError::Service {
                status: *status,
                code: code.clone(),
                message: "SimulatedError".to_string(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DetectionService for MockDetection {
    async fn detect_faces(&self, image: &[u8]) -> DetectionResult<Vec<FaceDetail>> {
        self.calls.lock().unwrap().push(DetectionCall::Faces {
            image: image.to_vec(),
        });
        self.check_failure()?;
        Ok(self.faces.clone())
    }

    async fn detect_moderation_labels(
        &self,
        image: &[u8],
        min_confidence: f32,
    ) -> DetectionResult<Vec<ModerationLabel>> {
        self.calls.lock().unwrap().push(DetectionCall::ModerationLabels {
            image: image.to_vec(),
            min_confidence,
        });
        self.check_failure()?;
        Ok(self
            .labels
            .iter()
            .filter(|label| label.confidence >= min_confidence)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_filters_labels_by_confidence() {
        let mock = MockDetection::new()
            .with_label("Smoking", 90.0)
            .with_label("Alcohol", 60.0);
        let labels = mock.detect_moderation_labels(b"img", 75.0).await.unwrap();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].name, "Smoking");
        assert_eq!(
            mock.calls(),
            vec![DetectionCall::ModerationLabels {
                image: b"img".to_vec(),
                min_confidence: 75.0
            }]
        );
    }

    #[tokio::test]
    async fn test_mock_failure() {
        let mock = MockDetection::new().failing(500, "InternalServerError");
        let err = mock.detect_faces(b"img").await.unwrap_err();
        assert_eq!(err.to_string(), "SimulatedError");
    }
}
