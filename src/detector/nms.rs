use super::types::Detection;
use std::cmp::Ordering;

/// Greedy per-label non-maximum suppression.
///
/// Keeps the highest-confidence box and drops every box of the same label
/// whose IoU with a kept box exceeds `iou_threshold`. The result is sorted by
/// confidence, highest first; ties keep their input order.
pub fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| {
        b.confidence()
            .partial_cmp(&a.confidence())
            .unwrap_or(Ordering::Equal)
    });

    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
    for candidate in detections {
        let suppressed = kept.iter().any(|existing| {
            existing.label() == candidate.label()
                && existing.bbox().iou(candidate.bbox()) > iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::BoundingBox;

    fn det(label: &str, confidence: f32, x: f32) -> Detection {
        Detection::new(label, confidence, BoundingBox::new(x, 0.0, 10.0, 10.0)).unwrap()
    }

    #[test]
    fn test_overlapping_same_label_is_suppressed() {
        let kept = non_max_suppression(
            vec![det("cat", 0.7, 1.0), det("cat", 0.9, 0.0), det("cat", 0.8, 50.0)],
            0.45,
        );
        let confidences: Vec<f32> = kept.iter().map(|d| d.confidence()).collect();
        assert_eq!(confidences, vec![0.9, 0.8]);
    }

    #[test]
    fn test_different_labels_do_not_suppress_each_other() {
        let kept = non_max_suppression(vec![det("cat", 0.9, 0.0), det("dog", 0.8, 0.0)], 0.45);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_threshold_one_keeps_everything() {
        let kept = non_max_suppression(vec![det("cat", 0.9, 0.0), det("cat", 0.8, 0.0)], 1.0);
        assert_eq!(kept.len(), 2);
    }
}
