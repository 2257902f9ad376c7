mod detection_loop;
mod metrics;

pub use detection_loop::{CycleOutcome, DetectionLoop, LoopSettings};
pub use metrics::{LoopState, PipelineMetrics, PipelineMetricsSnapshot};
