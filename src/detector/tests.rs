use super::*;
use crate::error::DetectorError;
use crate::frame::{FrameData, FrameFormat};
use image::RgbImage;
use std::time::SystemTime;

/// Model that returns the same candidates on every call
struct FixedModel {
    output: std::result::Result<Vec<Candidate>, DetectorError>,
}

impl FixedModel {
    fn returning(candidates: Vec<Candidate>) -> Self {
        Self {
            output: Ok(candidates),
        }
    }
}

impl DetectionModel for FixedModel {
    fn name(&self) -> &str {
        "fixed"
    }

    fn infer(&mut self, _image: &RgbImage) -> std::result::Result<Vec<Candidate>, DetectorError> {
        self.output.clone()
    }
}

fn candidate(label: &str, confidence: f32, x: f32, y: f32) -> Candidate {
    Candidate {
        label: label.to_string(),
        confidence,
        bbox: BoundingBox::new(x, y, 40.0, 40.0),
    }
}

fn settings() -> DetectorSettings {
    DetectorSettings {
        confidence_threshold: 0.6,
        iou_threshold: 0.45,
        jpeg_quality: 80,
    }
}

fn adapter_with(model: FixedModel) -> DetectorAdapter {
    DetectorAdapter::new(Box::new(model), settings(), Annotator::new(None, 80))
}

fn test_frame() -> FrameData {
    FrameData::new(1, SystemTime::now(), vec![32u8; 160 * 120 * 3], 160, 120, FrameFormat::Rgb24)
}

#[test]
fn test_no_detections_still_yields_annotated_frame() {
    let mut adapter = adapter_with(FixedModel::returning(Vec::new()));
    let result = adapter.detect(&test_frame()).unwrap();

    assert!(result.detections.is_empty());
    assert_eq!(&result.annotated[..2], &[0xFF, 0xD8]);
}

#[test]
fn test_confidence_threshold_filters_low_scores() {
    let mut adapter = adapter_with(FixedModel::returning(vec![
        candidate("cat", 0.95, 0.0, 0.0),
        candidate("cat", 0.59, 100.0, 60.0),
        candidate("cat", 0.6, 100.0, 0.0),
    ]));
    let result = adapter.detect(&test_frame()).unwrap();

    assert_eq!(result.detections.len(), 2);
    assert!(result.detections.iter().all(|d| d.confidence() >= 0.6));
}

#[test]
fn test_results_are_sorted_and_suppressed() {
    let mut adapter = adapter_with(FixedModel::returning(vec![
        candidate("cat", 0.7, 2.0, 2.0),
        candidate("cat", 0.9, 0.0, 0.0),
        candidate("dog", 0.8, 0.0, 0.0),
    ]));
    let result = adapter.detect(&test_frame()).unwrap();

    let summary: Vec<(&str, f32)> = result
        .detections
        .iter()
        .map(|d| (d.label(), d.confidence()))
        .collect();
    assert_eq!(summary, vec![("cat", 0.9), ("dog", 0.8)]);
    assert_eq!(result.count_matching("cat"), 1);
}

#[test]
fn test_malformed_candidates_are_dropped() {
    let mut adapter = adapter_with(FixedModel::returning(vec![
        candidate("", 0.9, 0.0, 0.0),
        candidate("cat", 1.7, 0.0, 0.0),
        candidate("cat", f32::NAN, 0.0, 0.0),
        Candidate {
            label: "cat".to_string(),
            confidence: 0.9,
            bbox: BoundingBox::new(0.0, 0.0, -5.0, 10.0),
        },
        candidate("cat", 0.8, 60.0, 60.0),
    ]));
    let result = adapter.detect(&test_frame()).unwrap();

    assert_eq!(result.detections.len(), 1);
    assert_eq!(result.detections[0].confidence(), 0.8);
}

#[test]
fn test_model_failure_is_reported() {
    let model = FixedModel {
        output: Err(DetectorError::Inference {
            details: "boom".to_string(),
        }),
    };
    let mut adapter = adapter_with(model);

    let err = adapter.detect(&test_frame()).unwrap_err();
    assert!(matches!(err, DetectorError::Inference { .. }));
}

#[test]
fn test_undecodable_frame_is_a_decode_error() {
    let mut adapter = adapter_with(FixedModel::returning(Vec::new()));
    let frame = FrameData::new(9, SystemTime::now(), vec![1, 2, 3], 16, 16, FrameFormat::Mjpeg);

    let err = adapter.detect(&frame).unwrap_err();
    assert!(matches!(err, DetectorError::Decode { .. }));
}

#[test]
fn test_jpeg_frames_are_accepted() {
    let mut adapter = adapter_with(FixedModel::returning(vec![candidate("cat", 0.9, 4.0, 4.0)]));
    let jpeg = Annotator::new(None, 80)
        .encode(&RgbImage::new(64, 64))
        .unwrap();
    let frame = FrameData::new(2, SystemTime::now(), jpeg, 64, 64, FrameFormat::Mjpeg);

    let result = adapter.detect(&frame).unwrap();
    assert_eq!(result.count_matching("cat"), 1);
}

#[test]
fn test_passthrough_model_detects_nothing() {
    let mut adapter = DetectorAdapter::new(Box::new(PassthroughModel), settings(), Annotator::new(None, 80));
    assert_eq!(adapter.model_name(), "passthrough");
    assert!(adapter.detect(&test_frame()).unwrap().detections.is_empty());
}

#[test]
fn test_build_model_passthrough_from_config() {
    let mut config = crate::config::CattrackConfig::default().detector;
    config.backend = crate::config::DetectorBackendKind::Passthrough;

    let adapter = DetectorAdapter::from_config(&config).unwrap();
    assert_eq!(adapter.model_name(), "passthrough");
    assert_eq!(adapter.settings().confidence_threshold, config.confidence_threshold);
}

#[cfg(not(feature = "onnx"))]
#[test]
fn test_default_build_detects_nothing() {
    let config = crate::config::CattrackConfig::default().detector;
    assert_eq!(config.backend, crate::config::DetectorBackendKind::Passthrough);
    assert_eq!(build_model(&config).unwrap().name(), "passthrough");
}

#[cfg(feature = "onnx")]
#[test]
fn test_default_backend_is_onnx_with_feature() {
    let config = crate::config::CattrackConfig::default().detector;
    assert_eq!(config.backend, crate::config::DetectorBackendKind::Onnx);
}

#[cfg(not(feature = "onnx"))]
#[test]
fn test_onnx_backend_unavailable_without_feature() {
    let mut config = crate::config::CattrackConfig::default().detector;
    config.backend = crate::config::DetectorBackendKind::Onnx;
    assert!(build_model(&config).is_err());
}
