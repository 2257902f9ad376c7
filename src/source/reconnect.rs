use super::interface::{FrameSource, NextFrame, SourceBackend};
use crate::config::SourceConfig;
use crate::error::SourceError;
use crate::recovery::{Backoff, BackoffConfig};
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

/// Read and reconnect limits for a [`ReconnectingSource`]
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub read_timeout: Duration,
    /// Consecutive read timeouts that count as a dropped connection
    pub stall_limit: u32,
    pub backoff: BackoffConfig,
}

impl From<&SourceConfig> for ReconnectPolicy {
    fn from(config: &SourceConfig) -> Self {
        Self {
            read_timeout: Duration::from_millis(config.read_timeout_ms.max(1)),
            stall_limit: config.stall_limit.max(1),
            backoff: BackoffConfig::new(
                Duration::from_millis(config.reconnect_initial_ms),
                Duration::from_millis(config.reconnect_max_ms),
            ),
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(2),
            stall_limit: 3,
            backoff: BackoffConfig::default(),
        }
    }
}

/// Frame source that connects lazily and reconnects with capped exponential
/// backoff.
///
/// While a reconnect is pending `next_frame` returns `NotAvailable`
/// immediately; the caller decides how long to idle.
pub struct ReconnectingSource<B: SourceBackend> {
    backend: B,
    policy: ReconnectPolicy,
    backoff: Backoff,
    connected: bool,
    closed: bool,
    retry_at: Option<Instant>,
    consecutive_timeouts: u32,
    connections: u64,
}

impl<B: SourceBackend> ReconnectingSource<B> {
    pub fn new(backend: B, policy: ReconnectPolicy) -> Self {
        let backoff = Backoff::new(policy.backoff.clone());
        Self {
            backend,
            policy,
            backoff,
            connected: false,
            closed: false,
            retry_at: None,
            consecutive_timeouts: 0,
            connections: 0,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Successful connections so far, including the first
    pub fn connections(&self) -> u64 {
        self.connections
    }

    /// Consecutive failed connection attempts since the last success
    pub fn failed_attempts(&self) -> u32 {
        self.backoff.attempts()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    async fn try_connect(&mut self) -> bool {
        if let Some(retry_at) = self.retry_at {
            if Instant::now() < retry_at {
                return false;
            }
        }

        match self.backend.connect().await {
            Ok(()) => {
                if self.backoff.attempts() > 0 || self.connections > 0 {
                    info!(
                        "Reconnected to {} after {} failed attempts",
                        self.backend.describe(),
                        self.backoff.attempts()
                    );
                } else {
                    info!("Connected to {}", self.backend.describe());
                }
                self.connected = true;
                self.connections += 1;
                self.retry_at = None;
                self.consecutive_timeouts = 0;
                self.backoff.reset();
                true
            }
            Err(e) => {
                let delay = self.backoff.next_delay();
                if self.backoff.attempts() == 1 {
                    warn!("Source unavailable: {}; retrying in {:?}", e, delay);
                } else {
                    debug!(
                        "Reconnect attempt {} failed: {}; retrying in {:?}",
                        self.backoff.attempts(),
                        e,
                        delay
                    );
                }
                self.retry_at = Some(Instant::now() + delay);
                false
            }
        }
    }

    async fn drop_connection(&mut self, reason: SourceError) {
        warn!("Lost connection to {}: {}", self.backend.describe(), reason);
        self.backend.disconnect().await;
        self.connected = false;
        self.consecutive_timeouts = 0;
        let delay = self.backoff.next_delay();
        self.retry_at = Some(Instant::now() + delay);
    }
}

#[async_trait]
impl<B: SourceBackend> FrameSource for ReconnectingSource<B> {
    async fn next_frame(&mut self) -> NextFrame {
        if self.closed {
            return NextFrame::NotAvailable;
        }

        if !self.connected && !self.try_connect().await {
            return NextFrame::NotAvailable;
        }

        match self.backend.read_frame(self.policy.read_timeout).await {
            Ok(Some(frame)) => {
                self.consecutive_timeouts = 0;
                trace!("Source produced frame {}", frame.id);
                NextFrame::Frame(frame)
            }
            Ok(None) => {
                self.consecutive_timeouts += 1;
                debug!(
                    "No frame within {:?} ({}/{})",
                    self.policy.read_timeout, self.consecutive_timeouts, self.policy.stall_limit
                );
                if self.consecutive_timeouts >= self.policy.stall_limit {
                    let timeout = self.policy.read_timeout * self.consecutive_timeouts;
                    self.drop_connection(SourceError::Timeout { timeout }).await;
                }
                NextFrame::NotAvailable
            }
            Err(e) => {
                self.drop_connection(e).await;
                NextFrame::NotAvailable
            }
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if self.connected {
            self.backend.disconnect().await;
            self.connected = false;
            info!("Disconnected from {}", self.backend.describe());
        }
    }
}
