pub mod app;
pub mod config;
pub mod detector;
pub mod error;
pub mod event_log;
pub mod frame;
pub mod frame_state;
pub mod pipeline;
pub mod recovery;
pub mod source;
pub mod storage;
pub mod streaming;

pub use app::{CattrackOrchestrator, ComponentState, ShutdownReason, ShutdownTrigger};
pub use config::CattrackConfig;
pub use detector::{Detection, DetectionResult, DetectorAdapter};
pub use error::{CattrackError, Result};
pub use event_log::{DeleteOutcome, DetectionEvent, EventLog, EventLogSnapshot};
pub use frame::{FrameData, FrameFormat};
pub use frame_state::{FrameSnapshot, FrameState};
pub use pipeline::{DetectionLoop, PipelineMetrics};
pub use source::{FrameSource, NextFrame, SourceBuilder};
pub use storage::{DiskSnapshotStore, SnapshotStore};
pub use streaming::{StreamServer, StreamServerBuilder, StreamStats};
