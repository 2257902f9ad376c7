mod adapter;
mod annotate;
mod model;
mod nms;
#[cfg(feature = "onnx")]
mod onnx;
mod types;
#[cfg(test)]
mod tests;

pub use adapter::{DetectorAdapter, DetectorSettings};
pub use annotate::Annotator;
pub use model::{build_model, DetectionModel, PassthroughModel};
pub use nms::non_max_suppression;
#[cfg(feature = "onnx")]
pub use onnx::{OnnxModel, COCO_LABELS};
pub use types::{BoundingBox, Candidate, Detection, DetectionResult};
