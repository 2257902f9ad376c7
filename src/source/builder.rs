use super::interface::FrameSource;
use super::reconnect::{ReconnectPolicy, ReconnectingSource};
use super::synthetic::SyntheticBackend;
use crate::config::{SourceBackendKind, SourceConfig};
use crate::error::{CattrackError, Result};
use tracing::info;

/// Builder for the configured frame source
pub struct SourceBuilder {
    config: Option<SourceConfig>,
}

impl SourceBuilder {
    pub fn new() -> Self {
        Self { config: None }
    }

    pub fn config(mut self, config: SourceConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn build(self) -> Result<Box<dyn FrameSource>> {
        let config = self
            .config
            .ok_or_else(|| CattrackError::system("Source configuration must be specified"))?;
        let policy = ReconnectPolicy::from(&config);

        match config.backend {
            SourceBackendKind::Synthetic => {
                info!(
                    "Using synthetic source {}x{} @ {}fps",
                    config.resolution.0, config.resolution.1, config.fps
                );
                let backend = SyntheticBackend::new(config.resolution, config.fps);
                Ok(Box::new(ReconnectingSource::new(backend, policy)))
            }
            #[cfg(all(feature = "camera", target_os = "linux"))]
            SourceBackendKind::Rtsp => {
                info!("Using RTSP source {}", config.url);
                let backend = super::rtsp::RtspBackend::new(config.url.clone(), config.latency_ms);
                Ok(Box::new(ReconnectingSource::new(backend, policy)))
            }
            #[cfg(not(all(feature = "camera", target_os = "linux")))]
            SourceBackendKind::Rtsp => Err(crate::error::SourceError::Unavailable {
                details: "built without RTSP camera support".to_string(),
            }
            .into()),
        }
    }
}

impl Default for SourceBuilder {
    fn default() -> Self {
        Self::new()
    }
}
