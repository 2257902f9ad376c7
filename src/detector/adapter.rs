use super::annotate::Annotator;
use super::model::{build_model, DetectionModel};
use super::nms::non_max_suppression;
use super::types::{Detection, DetectionResult};
use crate::config::DetectorConfig;
use crate::error::{DetectorError, Result};
use crate::frame::FrameData;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace};

/// Post-processing thresholds applied to raw model output
#[derive(Debug, Clone, Copy)]
pub struct DetectorSettings {
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub jpeg_quality: u8,
}

impl From<&DetectorConfig> for DetectorSettings {
    fn from(config: &DetectorConfig) -> Self {
        Self {
            confidence_threshold: config.confidence_threshold,
            iou_threshold: config.iou_threshold,
            jpeg_quality: config.jpeg_quality,
        }
    }
}

/// Wraps a detection model with validation, thresholding, NMS and annotation.
///
/// Every successful call yields an annotated JPEG, even when nothing was
/// detected, so the live stream always has a frame to show.
pub struct DetectorAdapter {
    model: Box<dyn DetectionModel>,
    settings: DetectorSettings,
    annotator: Annotator,
}

impl DetectorAdapter {
    pub fn new(model: Box<dyn DetectionModel>, settings: DetectorSettings, annotator: Annotator) -> Self {
        Self {
            model,
            settings,
            annotator,
        }
    }

    /// Load the configured model. Errors are fatal at startup.
    pub fn from_config(config: &DetectorConfig) -> Result<Self> {
        let model = build_model(config)?;
        let annotator = Annotator::new(config.font_path.as_deref(), config.jpeg_quality);
        Ok(Self::new(model, DetectorSettings::from(config), annotator))
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    pub fn settings(&self) -> &DetectorSettings {
        &self.settings
    }

    /// Run one detection cycle on a frame
    pub fn detect(&mut self, frame: &FrameData) -> std::result::Result<DetectionResult, DetectorError> {
        let started = Instant::now();
        let image = frame.to_rgb_image()?;
        let candidates = self.model.infer(&image)?;
        let raw_count = candidates.len();

        let mut detections = Vec::with_capacity(raw_count);
        for candidate in candidates {
            match Detection::try_from(candidate) {
                Ok(detection) if detection.confidence() >= self.settings.confidence_threshold => {
                    detections.push(detection)
                }
                Ok(_) => {}
                Err(e) => debug!("Dropping malformed model output: {}", e),
            }
        }

        let detections = non_max_suppression(detections, self.settings.iou_threshold);
        let annotated = self.annotator.render(image, &detections)?;

        trace!(
            "Frame {}: {} raw candidates, {} kept in {:?}",
            frame.id,
            raw_count,
            detections.len(),
            started.elapsed()
        );

        Ok(DetectionResult {
            detections,
            annotated: Arc::new(annotated),
        })
    }
}
