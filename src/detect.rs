use serde::Serialize;

use crate::{
    bounding_box::BoundingBox,
    decode::DecodedImage,
    engine::{EngineError, InfernumEngine, InfernumModel, RequestMetadata},
};

/// Minimum confidence, exclusive, for a model output to be reported.
pub const THRESHOLD: f32 = 0.08;

/// One object found in an image.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
}

/// Work item handed to the inference engine.
pub struct DetectRequest {
    pub image: DecodedImage,
    pub threshold: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectMetadata {
    pub width: u32,
    pub height: u32,
    pub threshold: f32,
}

impl RequestMetadata for DetectRequest {
    type Metadata = DetectMetadata;

    fn metadata(&self) -> Self::Metadata {
        DetectMetadata {
            width: self.image.width(),
            height: self.image.height(),
            threshold: self.threshold,
        }
    }
}

/// A model the HTTP layer can run detections with.
pub trait DetectionModel:
    InfernumModel<Request = DetectRequest, Response = Vec<Detection>> + Send + 'static
{
}

impl<M> DetectionModel for M where
    M: InfernumModel<Request = DetectRequest, Response = Vec<Detection>> + Send + 'static
{
}

/// Runs `image` through the engine and keeps detections strictly above `threshold`.
///
/// The order of the engine's output is preserved.
pub async fn detect<M: DetectionModel>(
    engine: &InfernumEngine<M>,
    image: DecodedImage,
    threshold: f32,
) -> Result<Vec<Detection>, EngineError> {
    let rep = engine.infer(DetectRequest { image, threshold }).await?;

    let meta = rep.request_metadata;
    log::debug!(
        "Inference #{} on {}x{} image took {:.3}s",
        rep.id,
        meta.width,
        meta.height,
        rep.duration.as_secs_f32()
    );

    let total = rep.response.len();
    let detections: Vec<Detection> = rep
        .response
        .into_iter()
        .filter(|d| d.confidence > threshold)
        .collect();

    if detections.len() < total {
        log::debug!(
            "Dropped {} detections at or below threshold {}",
            total - detections.len(),
            threshold
        );
    }

    Ok(detections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[derive(Debug, thiserror::Error)]
    #[error("engine exploded")]
    struct Exploded;

    struct Canned(Vec<f32>);

    impl InfernumModel for Canned {
        type Request = DetectRequest;
        type Response = Vec<Detection>;
        type Error = Exploded;

        fn run(&mut self, request: DetectRequest) -> Result<Vec<Detection>, Exploded> {
            if self.0.is_empty() {
                return Err(Exploded);
            }
            Ok(self
                .0
                .iter()
                .enumerate()
                .map(|(i, &confidence)| Detection {
                    label: format!("obj{i}"),
                    confidence,
                    bbox: BoundingBox {
                        x: request.image.width() as f32 / 2.0,
                        y: request.image.height() as f32 / 2.0,
                        width: 1.0,
                        height: 1.0,
                    },
                })
                .collect())
        }
    }

    fn image() -> DecodedImage {
        RgbImage::new(4, 4).into()
    }

    #[tokio::test]
    async fn test_detect_filters_at_and_below_threshold() {
        let engine = InfernumEngine::new(Canned(vec![0.5, 0.08, 0.02, 0.081]));
        let detections = detect(&engine, image(), THRESHOLD).await.unwrap();

        let labels: Vec<&str> = detections.iter().map(|d| d.label.as_str()).collect();
        assert_eq!(labels, vec!["obj0", "obj3"]);
        assert!(detections.iter().all(|d| d.confidence > THRESHOLD));
    }

    #[tokio::test]
    async fn test_detect_propagates_model_error() {
        let engine = InfernumEngine::new(Canned(vec![]));
        let err = detect(&engine, image(), THRESHOLD).await.unwrap_err();
        assert_eq!(err.to_string(), "engine exploded");
    }

    #[test]
    fn test_detection_serializes_box_field() {
        let detection = Detection {
            label: "person".to_string(),
            confidence: 0.5,
            bbox: BoundingBox { x: 1.0, y: 2.0, width: 3.0, height: 4.0 },
        };
        let value = serde_json::to_value(&detection).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "label": "person",
                "confidence": 0.5,
                "box": { "x": 1.0, "y": 2.0, "width": 3.0, "height": 4.0 }
            })
        );
    }
}
