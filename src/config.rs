use chrono_tz::Tz;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CattrackConfig {
    pub source: SourceConfig,
    pub detector: DetectorConfig,
    pub capture: CaptureConfig,
    pub stream: StreamConfig,
    pub pipeline: PipelineConfig,
}

/// Which frame source implementation feeds the detection loop
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceBackendKind {
    /// RTSP camera through GStreamer
    Rtsp,
    /// Generated test pattern
    Synthetic,
}

impl SourceBackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceBackendKind::Rtsp => "rtsp",
            SourceBackendKind::Synthetic => "synthetic",
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DetectorBackendKind {
    /// YOLOv5 ONNX export run through onnxruntime
    Onnx,
    /// Reports nothing; the stream still runs
    Passthrough,
}

impl DetectorBackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectorBackendKind::Onnx => "onnx",
            DetectorBackendKind::Passthrough => "passthrough",
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SourceConfig {
    #[serde(default = "default_source_backend")]
    pub backend: SourceBackendKind,

    /// RTSP connection string
    #[serde(default = "default_source_url")]
    pub url: String,

    /// rtspsrc jitter buffer latency
    #[serde(default = "default_source_latency_ms")]
    pub latency_ms: u32,

    /// Synthetic source resolution (width, height)
    #[serde(default = "default_source_resolution")]
    pub resolution: (u32, u32),

    /// Synthetic source frames per second
    #[serde(default = "default_source_fps")]
    pub fps: u32,

    /// How long a single read waits for a frame
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Consecutive read timeouts after which the connection is considered dropped
    #[serde(default = "default_stall_limit")]
    pub stall_limit: u32,

    #[serde(default = "default_reconnect_initial_ms")]
    pub reconnect_initial_ms: u64,

    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DetectorConfig {
    #[serde(default = "default_detector_backend")]
    pub backend: DetectorBackendKind,

    /// Path to the ONNX model file
    #[serde(default = "default_model_path")]
    pub model_path: String,

    /// Square model input size in pixels
    #[serde(default = "default_input_size")]
    pub input_size: u32,

    /// Minimum score for a detection to be kept (0-1)
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,

    /// IoU above which overlapping boxes of the same class are suppressed (0-1)
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f32,

    /// Label that qualifies a detection for recording
    #[serde(default = "default_target_label")]
    pub target_label: String,

    /// JPEG quality of annotated frames
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// TrueType font for box labels; boxes are drawn without text when unset
    pub font_path: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CaptureConfig {
    /// Directory holding one snapshot per retained event
    #[serde(default = "default_capture_path")]
    pub path: String,

    /// Maximum number of retained events
    #[serde(default = "default_max_events")]
    pub max_events: usize,

    /// IANA timezone used to render event timestamps
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl CaptureConfig {
    /// Resolve the configured timezone, falling back to UTC on parse errors
    pub fn resolved_timezone(&self) -> Tz {
        match self.timezone.parse::<Tz>() {
            Ok(tz) => tz,
            Err(_) => {
                warn!(
                    "Invalid capture timezone '{}', falling back to UTC",
                    self.timezone
                );
                chrono_tz::UTC
            }
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StreamConfig {
    /// IP address to bind to
    #[serde(default = "default_stream_ip")]
    pub ip: String,

    /// Port to listen on
    #[serde(default = "default_stream_port")]
    pub port: u16,

    /// Per-viewer send rate ceiling
    #[serde(default = "default_stream_max_fps")]
    pub max_fps: u32,

    /// Resend the last frame when nothing new arrived within this interval
    #[serde(default = "default_keepalive_ms")]
    pub keepalive_ms: u64,

    /// Number of events returned by the stats endpoint
    #[serde(default = "default_recent_events")]
    pub recent_events: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_idle_backoff_min_ms")]
    pub idle_backoff_min_ms: u64,

    #[serde(default = "default_idle_backoff_max_ms")]
    pub idle_backoff_max_ms: u64,

    /// Upper bound on waiting for tasks during shutdown
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

impl CattrackConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("cattrack.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("source.backend", default_source_backend().as_str())?
            .set_default("source.url", default_source_url())?
            .set_default("source.latency_ms", default_source_latency_ms())?
            .set_default(
                "source.resolution",
                vec![default_source_resolution().0, default_source_resolution().1],
            )?
            .set_default("source.fps", default_source_fps())?
            .set_default("source.read_timeout_ms", default_read_timeout_ms())?
            .set_default("source.stall_limit", default_stall_limit())?
            .set_default("source.reconnect_initial_ms", default_reconnect_initial_ms())?
            .set_default("source.reconnect_max_ms", default_reconnect_max_ms())?
            .set_default("detector.backend", default_detector_backend().as_str())?
            .set_default("detector.model_path", default_model_path())?
            .set_default("detector.input_size", default_input_size())?
            .set_default(
                "detector.confidence_threshold",
                default_confidence_threshold() as f64,
            )?
            .set_default("detector.iou_threshold", default_iou_threshold() as f64)?
            .set_default("detector.target_label", default_target_label())?
            .set_default("detector.jpeg_quality", default_jpeg_quality() as i64)?
            .set_default("capture.path", default_capture_path())?
            .set_default("capture.max_events", default_max_events() as i64)?
            .set_default("capture.timezone", default_timezone())?
            .set_default("stream.ip", default_stream_ip())?
            .set_default("stream.port", default_stream_port())?
            .set_default("stream.max_fps", default_stream_max_fps())?
            .set_default("stream.keepalive_ms", default_keepalive_ms())?
            .set_default("stream.recent_events", default_recent_events() as i64)?
            .set_default("pipeline.idle_backoff_min_ms", default_idle_backoff_min_ms())?
            .set_default("pipeline.idle_backoff_max_ms", default_idle_backoff_max_ms())?
            .set_default("pipeline.shutdown_timeout_ms", default_shutdown_timeout_ms())?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Environment overrides, e.g. CATTRACK_STREAM__PORT=8080
            .add_source(
                Environment::with_prefix("CATTRACK")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: CattrackConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source.backend == SourceBackendKind::Rtsp && self.source.url.trim().is_empty() {
            return Err(ConfigError::Message(
                "Source url must be set for the rtsp backend".to_string(),
            ));
        }

        if self.source.resolution.0 == 0 || self.source.resolution.1 == 0 {
            return Err(ConfigError::Message(
                "Source resolution must be greater than 0".to_string(),
            ));
        }

        if self.source.fps == 0 {
            return Err(ConfigError::Message(
                "Source fps must be greater than 0".to_string(),
            ));
        }

        if self.source.reconnect_initial_ms == 0 {
            return Err(ConfigError::Message(
                "Source reconnect_initial_ms must be greater than 0".to_string(),
            ));
        }

        if self.source.reconnect_initial_ms > self.source.reconnect_max_ms {
            return Err(ConfigError::Message(
                "Source reconnect_initial_ms must not exceed reconnect_max_ms".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.detector.confidence_threshold) {
            return Err(ConfigError::Message(
                "Detector confidence_threshold must be within 0..=1".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.detector.iou_threshold) {
            return Err(ConfigError::Message(
                "Detector iou_threshold must be within 0..=1".to_string(),
            ));
        }

        if self.detector.input_size == 0 {
            return Err(ConfigError::Message(
                "Detector input_size must be greater than 0".to_string(),
            ));
        }

        if self.detector.target_label.trim().is_empty() {
            return Err(ConfigError::Message(
                "Detector target_label must not be empty".to_string(),
            ));
        }

        if self.detector.jpeg_quality == 0 || self.detector.jpeg_quality > 100 {
            return Err(ConfigError::Message(
                "Detector jpeg_quality must be within 1..=100".to_string(),
            ));
        }

        if self.capture.max_events == 0 {
            return Err(ConfigError::Message(
                "Capture max_events must be greater than 0".to_string(),
            ));
        }

        if self.stream.max_fps == 0 {
            return Err(ConfigError::Message(
                "Stream max_fps must be greater than 0".to_string(),
            ));
        }

        if self.pipeline.idle_backoff_min_ms == 0 {
            return Err(ConfigError::Message(
                "Pipeline idle_backoff_min_ms must be greater than 0".to_string(),
            ));
        }

        if self.pipeline.idle_backoff_min_ms > self.pipeline.idle_backoff_max_ms {
            return Err(ConfigError::Message(
                "Pipeline idle_backoff_min_ms must not exceed idle_backoff_max_ms".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for CattrackConfig {
    fn default() -> Self {
        Self {
            source: SourceConfig {
                backend: default_source_backend(),
                url: default_source_url(),
                latency_ms: default_source_latency_ms(),
                resolution: default_source_resolution(),
                fps: default_source_fps(),
                read_timeout_ms: default_read_timeout_ms(),
                stall_limit: default_stall_limit(),
                reconnect_initial_ms: default_reconnect_initial_ms(),
                reconnect_max_ms: default_reconnect_max_ms(),
            },
            detector: DetectorConfig {
                backend: default_detector_backend(),
                model_path: default_model_path(),
                input_size: default_input_size(),
                confidence_threshold: default_confidence_threshold(),
                iou_threshold: default_iou_threshold(),
                target_label: default_target_label(),
                jpeg_quality: default_jpeg_quality(),
                font_path: None,
            },
            capture: CaptureConfig {
                path: default_capture_path(),
                max_events: default_max_events(),
                timezone: default_timezone(),
            },
            stream: StreamConfig {
                ip: default_stream_ip(),
                port: default_stream_port(),
                max_fps: default_stream_max_fps(),
                keepalive_ms: default_keepalive_ms(),
                recent_events: default_recent_events(),
            },
            pipeline: PipelineConfig {
                idle_backoff_min_ms: default_idle_backoff_min_ms(),
                idle_backoff_max_ms: default_idle_backoff_max_ms(),
                shutdown_timeout_ms: default_shutdown_timeout_ms(),
            },
        }
    }
}

// Default value functions
#[cfg(feature = "camera")]
fn default_source_backend() -> SourceBackendKind {
    SourceBackendKind::Rtsp
}
#[cfg(not(feature = "camera"))]
fn default_source_backend() -> SourceBackendKind {
    SourceBackendKind::Synthetic
}
fn default_source_url() -> String {
    "rtsp://127.0.0.1:8554/live".to_string()
}
fn default_source_latency_ms() -> u32 {
    200
}
fn default_source_resolution() -> (u32, u32) {
    (640, 480)
}
fn default_source_fps() -> u32 {
    10
}
fn default_read_timeout_ms() -> u64 {
    2000
}
fn default_stall_limit() -> u32 {
    3
}
fn default_reconnect_initial_ms() -> u64 {
    500
}
fn default_reconnect_max_ms() -> u64 {
    30_000
}

#[cfg(feature = "onnx")]
fn default_detector_backend() -> DetectorBackendKind {
    DetectorBackendKind::Onnx
}
#[cfg(not(feature = "onnx"))]
fn default_detector_backend() -> DetectorBackendKind {
    DetectorBackendKind::Passthrough
}
fn default_model_path() -> String {
    "yolov5s.onnx".to_string()
}
fn default_input_size() -> u32 {
    640
}
fn default_confidence_threshold() -> f32 {
    0.6
}
fn default_iou_threshold() -> f32 {
    0.45
}
fn default_target_label() -> String {
    "cat".to_string()
}
fn default_jpeg_quality() -> u8 {
    85
}

fn default_capture_path() -> String {
    "./captures".to_string()
}
fn default_max_events() -> usize {
    1000
}
fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_stream_ip() -> String {
    "0.0.0.0".to_string()
}
fn default_stream_port() -> u16 {
    5001
}
fn default_stream_max_fps() -> u32 {
    15
}
fn default_keepalive_ms() -> u64 {
    1000
}
fn default_recent_events() -> usize {
    50
}

fn default_idle_backoff_min_ms() -> u64 {
    50
}
fn default_idle_backoff_max_ms() -> u64 {
    2000
}
fn default_shutdown_timeout_ms() -> u64 {
    5000
}
