use super::state::ComponentStates;
use super::types::{ShutdownReason, ShutdownTrigger};
use crate::config::CattrackConfig;
use crate::detector::DetectorAdapter;
use crate::error::Result;
use crate::event_log::EventLog;
use crate::frame_state::FrameState;
use crate::pipeline::{DetectionLoop, LoopSettings, PipelineMetrics};
use crate::source::SourceBuilder;
use crate::storage::DiskSnapshotStore;
use crate::streaming::{StreamServer, StreamServerBuilder};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub(super) const DETECTION: &str = "detection";
pub(super) const STREAMING: &str = "streaming";

/// Wires the frame source, detector, event log and HTTP server together
/// and supervises their tasks.
pub struct CattrackOrchestrator {
    pub(super) config: CattrackConfig,
    pub(super) frames: FrameState,
    pub(super) events: Arc<EventLog>,
    pub(super) pipeline_metrics: Arc<PipelineMetrics>,

    // Consumed by start()
    pub(super) detection_loop: Option<DetectionLoop>,
    pub(super) stream_server: Option<StreamServer>,

    // Lifecycle management
    pub(super) tasks: Vec<(&'static str, JoinHandle<()>)>,
    pub(super) local_addr: Option<SocketAddr>,
    pub(super) component_states: Arc<ComponentStates>,
    pub(super) shutdown_trigger: ShutdownTrigger,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    pub(super) cancellation_token: CancellationToken,
}

impl CattrackOrchestrator {
    /// Resolve every collaborator. Any failure here is fatal.
    pub async fn new(config: CattrackConfig) -> Result<Self> {
        let timezone = config.capture.resolved_timezone();
        let cancellation_token = CancellationToken::new();

        let store = Arc::new(DiskSnapshotStore::new(
            &config.capture.path,
            &config.detector.target_label,
        ));
        store.ensure_dir().await?;

        let detector = DetectorAdapter::from_config(&config.detector)?;
        info!("Detector model '{}' ready", detector.model_name());

        let source = SourceBuilder::new().config(config.source.clone()).build()?;

        let frames = FrameState::new();
        let events = Arc::new(EventLog::new(config.capture.max_events, store.clone()));

        let detection_loop = DetectionLoop::new(
            source,
            detector,
            frames.clone(),
            Arc::clone(&events),
            store,
            LoopSettings::from(&config),
        );
        let pipeline_metrics = detection_loop.metrics();

        let stream_server = StreamServerBuilder::new()
            .config(config.stream.clone())
            .frames(frames.clone())
            .events(Arc::clone(&events))
            .captures_dir(&config.capture.path)
            .timezone(timezone)
            .pipeline_metrics(Arc::clone(&pipeline_metrics))
            .cancel_token(cancellation_token.clone())
            .build()?;

        let (shutdown_trigger, shutdown_receiver) = ShutdownTrigger::new();

        Ok(Self {
            config,
            frames,
            events,
            pipeline_metrics,
            detection_loop: Some(detection_loop),
            stream_server: Some(stream_server),
            tasks: Vec::new(),
            local_addr: None,
            component_states: Arc::new(Mutex::new(HashMap::new())),
            shutdown_trigger,
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token,
        })
    }

    pub fn config(&self) -> &CattrackConfig {
        &self.config
    }

    pub fn frames(&self) -> &FrameState {
        &self.frames
    }

    pub fn events(&self) -> Arc<EventLog> {
        Arc::clone(&self.events)
    }

    pub fn pipeline_metrics(&self) -> Arc<PipelineMetrics> {
        Arc::clone(&self.pipeline_metrics)
    }

    /// Address the HTTP server is bound to, once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Handle for requesting shutdown from outside the signal handlers
    pub fn shutdown_trigger(&self) -> ShutdownTrigger {
        self.shutdown_trigger.clone()
    }
}
