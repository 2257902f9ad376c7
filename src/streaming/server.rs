use crate::{
    config::StreamConfig,
    error::{CattrackError, Result, StreamError},
    event_log::EventLog,
    frame_state::FrameState,
    pipeline::PipelineMetrics,
};
use axum::{
    routing::{delete, get, post},
    Router,
};
use chrono_tz::Tz;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;
use tracing::info;

use super::api::{delete_event_handler, delete_snapshot_handler, events_handler, stats_handler};
use super::handlers::{health_handler, page_handler, video_handler};
use super::stats::StreamStats;

/// Pacing and presentation settings for the HTTP surface
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// Minimum spacing between two frames sent to one viewer
    pub frame_interval: Duration,
    /// Resend the last frame when nothing newer arrives within this interval
    pub keepalive: Duration,
    /// Events returned by `/stats`
    pub recent_events: usize,
    /// Zone used to render event timestamps
    pub timezone: Tz,
}

impl StreamSettings {
    pub fn new(config: &StreamConfig, timezone: Tz) -> Self {
        Self {
            frame_interval: Duration::from_micros(1_000_000u64 / config.max_fps.max(1) as u64),
            keepalive: Duration::from_millis(config.keepalive_ms.max(1)),
            recent_events: config.recent_events,
            timezone,
        }
    }
}

/// Shared state for the Axum server
#[derive(Clone)]
pub struct ServerState {
    pub(crate) frames: FrameState,
    pub(crate) events: Arc<EventLog>,
    pub(crate) settings: StreamSettings,
    pub(crate) stats: Arc<StreamStats>,
    pub(crate) pipeline: Option<Arc<PipelineMetrics>>,
    pub(crate) cancel: CancellationToken,
}

/// HTTP server for the live stream, the event API and stored snapshots
pub struct StreamServer {
    pub(crate) config: StreamConfig,
    pub(crate) state: ServerState,
    pub(crate) captures_dir: PathBuf,
}

impl StreamServer {
    pub fn stats(&self) -> Arc<StreamStats> {
        Arc::clone(&self.state.stats)
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(page_handler))
            .route("/video", get(video_handler))
            .route("/stats", get(stats_handler))
            .route("/api/events", get(events_handler))
            .route("/api/events/:id", delete(delete_event_handler))
            .route("/delete_snapshot", post(delete_snapshot_handler))
            .route("/health", get(health_handler))
            .nest_service("/captures", ServeDir::new(&self.captures_dir))
            .with_state(self.state.clone())
    }

    /// Bind the configured address
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = format!("{}:{}", self.config.ip, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| StreamError::BindFailed {
                address: addr.clone(),
                source: e,
            })?;
        info!("HTTP server listening on {}", addr);
        Ok(listener)
    }

    /// Serve on `listener` until the cancellation token fires
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let app = self.router();
        let cancel = self.state.cancel.clone();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await
            .map_err(|e| StreamError::StartupFailed {
                details: format!("Server error: {}", e),
            })?;

        info!("HTTP server stopped");
        Ok(())
    }

    /// Bind and serve until shutdown
    pub async fn start(self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }
}

/// Stream server builder for configuration
pub struct StreamServerBuilder {
    config: Option<StreamConfig>,
    frames: Option<FrameState>,
    events: Option<Arc<EventLog>>,
    captures_dir: Option<PathBuf>,
    timezone: Tz,
    pipeline: Option<Arc<PipelineMetrics>>,
    cancel: Option<CancellationToken>,
}

impl StreamServerBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            frames: None,
            events: None,
            captures_dir: None,
            timezone: chrono_tz::UTC,
            pipeline: None,
            cancel: None,
        }
    }

    pub fn config(mut self, config: StreamConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn frames(mut self, frames: FrameState) -> Self {
        self.frames = Some(frames);
        self
    }

    pub fn events(mut self, events: Arc<EventLog>) -> Self {
        self.events = Some(events);
        self
    }

    /// Directory served under `/captures`
    pub fn captures_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.captures_dir = Some(dir.into());
        self
    }

    pub fn timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    /// Detection loop metrics reported by `/health`
    pub fn pipeline_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.pipeline = Some(metrics);
        self
    }

    pub fn cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn build(self) -> Result<StreamServer> {
        let missing = |what: &str| {
            CattrackError::Stream(StreamError::StartupFailed {
                details: format!("{} is required", what),
            })
        };

        let config = self.config.ok_or_else(|| missing("Stream configuration"))?;
        let frames = self.frames.ok_or_else(|| missing("Frame state"))?;
        let events = self.events.ok_or_else(|| missing("Event log"))?;
        let captures_dir = self.captures_dir.ok_or_else(|| missing("Captures directory"))?;

        let state = ServerState {
            frames,
            events,
            settings: StreamSettings::new(&config, self.timezone),
            stats: Arc::new(StreamStats::new()),
            pipeline: self.pipeline,
            cancel: self.cancel.unwrap_or_default(),
        };

        Ok(StreamServer {
            config,
            state,
            captures_dir,
        })
    }
}

impl Default for StreamServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
