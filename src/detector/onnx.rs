use super::model::DetectionModel;
use super::types::{BoundingBox, Candidate};
use crate::error::DetectorError;
use image::imageops::FilterType;
use image::RgbImage;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;
use tracing::debug;

/// COCO class names in YOLOv5 output order
pub const COCO_LABELS: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch", "potted plant",
    "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote", "keyboard", "cell phone",
    "microwave", "oven", "toaster", "sink", "refrigerator", "book", "clock", "vase", "scissors",
    "teddy bear", "hair drier", "toothbrush",
];

/// Box coordinates plus objectness ahead of the class scores
const ROW_PREFIX: usize = 5;

const OUTPUT_NAME: &str = "output0";

/// YOLOv5 ONNX export run through onnxruntime.
///
/// Expects input `images` as `[1, 3, S, S]` scaled to 0..1 and output
/// `output0` as `[1, N, 85]` rows of `cx, cy, w, h, objectness, classes...`.
pub struct OnnxModel {
    session: Session,
    input_size: u32,
    /// Rows scoring below this never leave the model
    score_floor: f32,
}

impl OnnxModel {
    pub fn load<P: AsRef<Path>>(path: P, input_size: u32, score_floor: f32) -> Result<Self, DetectorError> {
        let path_ref = path.as_ref();
        let model_load = |details: String| DetectorError::ModelLoad {
            path: path_ref.display().to_string(),
            details,
        };

        if !path_ref.exists() {
            return Err(model_load("model file not found".to_string()));
        }

        let session = Session::builder()
            .map_err(|e| model_load(e.to_string()))?
            .commit_from_file(path_ref)
            .map_err(|e| model_load(e.to_string()))?;

        Ok(Self {
            session,
            input_size,
            score_floor,
        })
    }

    fn preprocess(&self, image: &RgbImage) -> Result<ort::value::DynValue, DetectorError> {
        let size = self.input_size;
        let resized = image::imageops::resize(image, size, size, FilterType::Triangle);
        let raw = resized.as_raw();

        let plane = (size * size) as usize;
        let mut tensor_data = vec![0f32; 3 * plane];
        for idx in 0..plane {
            tensor_data[idx] = raw[idx * 3] as f32 / 255.0;
            tensor_data[plane + idx] = raw[idx * 3 + 1] as f32 / 255.0;
            tensor_data[2 * plane + idx] = raw[idx * 3 + 2] as f32 / 255.0;
        }

        let shape = [1usize, 3, size as usize, size as usize];
        Tensor::from_array((shape, tensor_data.into_boxed_slice()))
            .map(|tensor| tensor.into_dyn())
            .map_err(|e| DetectorError::Inference {
                details: format!("failed to build input tensor: {}", e),
            })
    }
}

impl DetectionModel for OnnxModel {
    fn name(&self) -> &str {
        "yolov5-onnx"
    }

    fn infer(&mut self, image: &RgbImage) -> Result<Vec<Candidate>, DetectorError> {
        let input = self.preprocess(image)?;
        let outputs = self
            .session
            .run(ort::inputs!["images" => input])
            .map_err(|e| DetectorError::Inference {
                details: e.to_string(),
            })?;

        let (shape, data) = require_output(outputs.get(OUTPUT_NAME), OUTPUT_NAME)?
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::Inference {
                details: format!("failed to extract output tensor: {}", e),
            })?;

        let row_len = shape.last().copied().unwrap_or_default() as usize;
        if row_len <= ROW_PREFIX || data.len() % row_len != 0 {
            return Err(DetectorError::Inference {
                details: format!("unexpected output shape {:?}", shape),
            });
        }

        let scale_x = image.width() as f32 / self.input_size as f32;
        let scale_y = image.height() as f32 / self.input_size as f32;
        let candidates = decode_rows(data, row_len, scale_x, scale_y, self.score_floor);

        debug!("ONNX model produced {} candidates", candidates.len());
        Ok(candidates)
    }
}

fn require_output<T>(output: Option<T>, name: &str) -> Result<T, DetectorError> {
    output.ok_or_else(|| DetectorError::Inference {
        details: format!("model has no {} output", name),
    })
}

/// Turn flat YOLOv5 rows into candidates in source-frame pixels
fn decode_rows(data: &[f32], row_len: usize, scale_x: f32, scale_y: f32, score_floor: f32) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    for row in data.chunks_exact(row_len) {
        let objectness = row[4];
        if objectness < score_floor {
            continue;
        }

        let (class_idx, class_score) = row[ROW_PREFIX..]
            .iter()
            .enumerate()
            .fold((0usize, f32::MIN), |best, (i, &s)| if s > best.1 { (i, s) } else { best });

        let score = objectness * class_score;
        if score < score_floor {
            continue;
        }

        let label = match COCO_LABELS.get(class_idx) {
            Some(name) => name.to_string(),
            None => format!("class_{}", class_idx),
        };

        let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);
        candidates.push(Candidate {
            label,
            confidence: score,
            bbox: BoundingBox::from_corners(
                ((cx - w / 2.0) * scale_x).max(0.0),
                ((cy - h / 2.0) * scale_y).max(0.0),
                (cx + w / 2.0) * scale_x,
                (cy + h / 2.0) * scale_y,
            ),
        });
    }
    candidates
}
