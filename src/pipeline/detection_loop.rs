use super::metrics::{LoopState, PipelineMetrics};
use crate::config::{CattrackConfig, DetectorConfig, PipelineConfig};
use crate::detector::{DetectionResult, DetectorAdapter};
use crate::error::DetectorError;
use crate::event_log::EventLog;
use crate::frame::FrameData;
use crate::frame_state::FrameState;
use crate::recovery::{Backoff, BackoffConfig};
use crate::source::{FrameSource, NextFrame};
use crate::storage::SnapshotStore;
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// What a single detection cycle ended with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Frame published; nothing of the target label in it
    NoTarget { detections: usize },
    /// Frame published and an event recorded
    Recorded { event_id: u64, count: u32 },
    /// Detector failed; the frame was skipped
    DetectionFailed,
    /// Frame published but the snapshot could not be saved; nothing recorded
    PersistenceFailed,
}

#[derive(Debug, Clone)]
pub struct LoopSettings {
    /// Label that qualifies a detection for recording
    pub target_label: String,
    /// Pause bounds while the source has nothing to offer
    pub idle_backoff: BackoffConfig,
}

impl LoopSettings {
    pub fn new(detector: &DetectorConfig, pipeline: &PipelineConfig) -> Self {
        Self {
            target_label: detector.target_label.clone(),
            idle_backoff: BackoffConfig::new(
                Duration::from_millis(pipeline.idle_backoff_min_ms),
                Duration::from_millis(pipeline.idle_backoff_max_ms),
            ),
        }
    }
}

impl From<&CattrackConfig> for LoopSettings {
    fn from(config: &CattrackConfig) -> Self {
        Self::new(&config.detector, &config.pipeline)
    }
}

/// Pulls frames, runs the detector and records qualifying detections.
///
/// The loop owns the source and the detector. It talks to the rest of the
/// system only through [`FrameState`] and [`EventLog`].
pub struct DetectionLoop {
    source: Box<dyn FrameSource>,
    detector: Arc<Mutex<DetectorAdapter>>,
    frames: FrameState,
    events: Arc<EventLog>,
    store: Arc<dyn SnapshotStore>,
    settings: LoopSettings,
    idle: Backoff,
    metrics: Arc<PipelineMetrics>,
}

impl DetectionLoop {
    pub fn new(
        source: Box<dyn FrameSource>,
        detector: DetectorAdapter,
        frames: FrameState,
        events: Arc<EventLog>,
        store: Arc<dyn SnapshotStore>,
        settings: LoopSettings,
    ) -> Self {
        let idle = Backoff::new(settings.idle_backoff.clone());
        Self {
            source,
            detector: Arc::new(Mutex::new(detector)),
            frames,
            events,
            store,
            settings,
            idle,
            metrics: Arc::new(PipelineMetrics::new()),
        }
    }

    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Run until `cancel` fires, then release the frame source
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(
            "Detection loop started (target label '{}')",
            self.settings.target_label
        );

        loop {
            self.metrics.set_state(LoopState::Acquiring);
            let next = tokio::select! {
                _ = cancel.cancelled() => break,
                next = self.source.next_frame() => next,
            };

            match next {
                NextFrame::Frame(frame) => {
                    self.idle.reset();
                    let started = Instant::now();
                    let outcome = self.process_frame(frame).await;
                    self.metrics.record_cycle(started.elapsed());
                    trace!("Cycle finished in {:?}: {:?}", started.elapsed(), outcome);
                }
                NextFrame::NotAvailable => {
                    self.metrics.record_unavailable();
                    self.metrics.set_state(LoopState::Idle);
                    let delay = self.idle.next_delay();
                    trace!("No frame available, idling for {:?}", delay);
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }

            if cancel.is_cancelled() {
                break;
            }
        }

        self.source.close().await;
        self.metrics.set_state(LoopState::Stopped);
        info!(
            "Detection loop stopped after {} frames",
            self.metrics.frames_processed()
        );
    }

    /// Run one detection cycle on `frame`.
    ///
    /// The snapshot is published before anything is recorded. An event is
    /// appended only after its image is on disk, so a reader never sees a
    /// record without a file.
    pub async fn process_frame(&mut self, frame: FrameData) -> CycleOutcome {
        self.metrics.set_state(LoopState::Detecting);
        let frame_id = frame.id;

        let result = match run_detector(Arc::clone(&self.detector), frame.clone()).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Detection failed for frame {}: {}", frame_id, e);
                self.metrics.record_detection_failure();
                return CycleOutcome::DetectionFailed;
            }
        };

        let detections = result.detections.len();
        let count = result.count_matching(&self.settings.target_label);
        let annotated = Arc::clone(&result.annotated);
        self.frames.publish(frame, Arc::clone(&annotated), detections);

        if count == 0 {
            debug!("Frame {}: {} detections, no target", frame_id, detections);
            return CycleOutcome::NoTarget { detections };
        }

        let timestamp = Utc::now();
        let filename = match self.store.persist(&annotated, timestamp).await {
            Ok(filename) => filename,
            Err(e) => {
                error!(
                    "Failed to save snapshot for {} {}(s): {}",
                    count, self.settings.target_label, e
                );
                self.metrics.record_persistence_failure();
                return CycleOutcome::PersistenceFailed;
            }
        };

        let count = u32::try_from(count).unwrap_or(u32::MAX);
        match self.events.append(timestamp, filename.clone(), count).await {
            Ok(event_id) => {
                self.metrics.record_event();
                info!(
                    "Detected {} {}(s); recorded event {} as {}",
                    count, self.settings.target_label, event_id, filename
                );
                CycleOutcome::Recorded { event_id, count }
            }
            Err(e) => {
                error!("Failed to record event for {}: {}", filename, e);
                if let Err(remove_err) = self.store.remove(&filename).await {
                    warn!("Failed to remove orphaned snapshot {}: {}", filename, remove_err);
                }
                self.metrics.record_persistence_failure();
                CycleOutcome::PersistenceFailed
            }
        }
    }
}

/// Inference is CPU bound; keep it off the async workers
async fn run_detector(
    detector: Arc<Mutex<DetectorAdapter>>,
    frame: FrameData,
) -> Result<DetectionResult, DetectorError> {
    tokio::task::spawn_blocking(move || detector.lock().detect(&frame))
        .await
        .unwrap_or_else(|e| {
            Err(DetectorError::Inference {
                details: format!("detector task failed: {}", e),
            })
        })
}
