use crate::error::DetectorError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Axis-aligned box in pixel coordinates of the source frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Build from corner coordinates
    pub fn from_corners(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self::new(x1, y1, x2 - x1, y2 - y1)
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// IoU (intersection over union) with another box
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix1 = self.x.max(other.x);
        let iy1 = self.y.max(other.y);
        let ix2 = (self.x + self.width).min(other.x + other.width);
        let iy2 = (self.y + self.height).min(other.y + other.height);
        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        if inter == 0.0 {
            return 0.0;
        }
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }

    fn is_valid(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
            && self.width >= 0.0
            && self.height >= 0.0
    }
}

/// Unvalidated model output
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// A validated detection: non-empty label, confidence in [0, 1] and a
/// finite box with non-negative size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    label: String,
    confidence: f32,
    bbox: BoundingBox,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Result<Self, DetectorError> {
        let label = label.into();
        if label.is_empty() {
            return Err(DetectorError::InvalidDetection {
                details: "empty label".to_string(),
            });
        }
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(DetectorError::InvalidDetection {
                details: format!("confidence {} outside 0..=1 for '{}'", confidence, label),
            });
        }
        if !bbox.is_valid() {
            return Err(DetectorError::InvalidDetection {
                details: format!("malformed box {:?} for '{}'", bbox, label),
            });
        }
        Ok(Self {
            label,
            confidence,
            bbox,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }
}

impl TryFrom<Candidate> for Detection {
    type Error = DetectorError;

    fn try_from(candidate: Candidate) -> Result<Self, Self::Error> {
        Detection::new(candidate.label, candidate.confidence, candidate.bbox)
    }
}

/// Output of one detector run
#[derive(Debug, Clone)]
pub struct DetectionResult {
    /// Sorted by confidence, highest first
    pub detections: Vec<Detection>,
    /// JPEG-encoded frame with boxes drawn
    pub annotated: Arc<Vec<u8>>,
}

impl DetectionResult {
    /// Detections whose label matches `label`
    pub fn matching<'a>(&'a self, label: &'a str) -> impl Iterator<Item = &'a Detection> + 'a {
        self.detections.iter().filter(move |d| d.label() == label)
    }

    pub fn count_matching(&self, label: &str) -> usize {
        self.matching(label).count()
    }
}
