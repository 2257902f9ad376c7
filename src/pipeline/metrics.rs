use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::Duration;

/// Logical state of the detection loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopState {
    Idle,
    Acquiring,
    Detecting,
    Stopped,
}

impl LoopState {
    fn as_u8(self) -> u8 {
        match self {
            LoopState::Idle => 0,
            LoopState::Acquiring => 1,
            LoopState::Detecting => 2,
            LoopState::Stopped => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => LoopState::Acquiring,
            2 => LoopState::Detecting,
            3 => LoopState::Stopped,
            _ => LoopState::Idle,
        }
    }
}

/// Counters shared between the detection loop and status readers
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    frames_processed: AtomicU64,
    frames_unavailable: AtomicU64,
    detection_failures: AtomicU64,
    persistence_failures: AtomicU64,
    events_recorded: AtomicU64,
    last_cycle_us: AtomicU64,
    state: AtomicU8,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineMetricsSnapshot {
    pub state: LoopState,
    pub frames_processed: u64,
    pub frames_unavailable: u64,
    pub detection_failures: u64,
    pub persistence_failures: u64,
    pub events_recorded: u64,
    pub last_cycle_ms: f64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_state(&self, state: LoopState) {
        self.state.store(state.as_u8(), Ordering::Relaxed);
    }

    pub fn state(&self) -> LoopState {
        LoopState::from_u8(self.state.load(Ordering::Relaxed))
    }

    pub(crate) fn record_cycle(&self, elapsed: Duration) {
        self.frames_processed.fetch_add(1, Ordering::Relaxed);
        self.last_cycle_us
            .store(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_unavailable(&self) {
        self.frames_unavailable.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_detection_failure(&self) {
        self.detection_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_persistence_failure(&self) {
        self.persistence_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_event(&self) {
        self.events_recorded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> PipelineMetricsSnapshot {
        PipelineMetricsSnapshot {
            state: self.state(),
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            frames_unavailable: self.frames_unavailable.load(Ordering::Relaxed),
            detection_failures: self.detection_failures.load(Ordering::Relaxed),
            persistence_failures: self.persistence_failures.load(Ordering::Relaxed),
            events_recorded: self.events_recorded.load(Ordering::Relaxed),
            last_cycle_ms: self.last_cycle_us.load(Ordering::Relaxed) as f64 / 1000.0,
        }
    }
}
