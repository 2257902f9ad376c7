use super::types::Candidate;
use crate::config::{DetectorBackendKind, DetectorConfig};
use crate::error::{DetectorError, Result};
use image::RgbImage;
use tracing::{info, warn};

/// The object-detection capability: given an image, return labelled boxes.
///
/// Implementations run synchronously; callers move them onto a blocking
/// thread. Output is validated by the adapter, so models may return anything.
pub trait DetectionModel: Send {
    fn name(&self) -> &str;

    fn infer(&mut self, image: &RgbImage) -> std::result::Result<Vec<Candidate>, DetectorError>;
}

/// Model that never detects anything; the live stream still runs
#[derive(Debug, Default)]
pub struct PassthroughModel;

impl DetectionModel for PassthroughModel {
    fn name(&self) -> &str {
        "passthrough"
    }

    fn infer(&mut self, _image: &RgbImage) -> std::result::Result<Vec<Candidate>, DetectorError> {
        Ok(Vec::new())
    }
}

/// Resolve the configured detection backend. Failure here is fatal at startup.
pub fn build_model(config: &DetectorConfig) -> Result<Box<dyn DetectionModel>> {
    match config.backend {
        DetectorBackendKind::Passthrough => {
            warn!("Using passthrough detector; no objects will be detected or recorded");
            Ok(Box::new(PassthroughModel))
        }
        #[cfg(feature = "onnx")]
        DetectorBackendKind::Onnx => {
            let model = super::onnx::OnnxModel::load(
                &config.model_path,
                config.input_size,
                config.confidence_threshold,
            )?;
            info!("Loaded ONNX model from {}", config.model_path);
            Ok(Box::new(model))
        }
        #[cfg(not(feature = "onnx"))]
        DetectorBackendKind::Onnx => Err(DetectorError::ModelLoad {
            path: config.model_path.clone(),
            details: "built without the onnx feature".to_string(),
        }
        .into()),
    }
}
