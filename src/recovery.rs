use std::time::Duration;
use tracing::trace;

/// Lower bound on every backoff delay
pub const MIN_BACKOFF_DELAY: Duration = Duration::from_millis(1);

/// Backoff strategy configuration
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay after the first failure
    pub base_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Whether to use exponential backoff
    pub exponential_backoff: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            exponential_backoff: true,
        }
    }
}

impl BackoffConfig {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        let base_delay = base_delay.max(MIN_BACKOFF_DELAY);
        Self {
            base_delay,
            max_delay: max_delay.max(base_delay),
            exponential_backoff: true,
        }
    }
}

/// Capped exponential backoff. Each failure doubles the delay up to the
/// configured maximum; a success resets it.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    attempts: u32,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            attempts: 0,
        }
    }

    /// Record a failure and return how long to wait before the next attempt
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.calculate_delay(self.attempts);
        self.attempts = self.attempts.saturating_add(1);
        trace!("Backoff attempt {} -> {:?}", self.attempts, delay);
        delay
    }

    /// Reset after a successful attempt
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Number of consecutive failures recorded since the last reset
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    fn calculate_delay(&self, retry_count: u32) -> Duration {
        let base_delay = self.config.base_delay.max(MIN_BACKOFF_DELAY);
        if !self.config.exponential_backoff {
            return base_delay;
        }

        let factor = 2u64.checked_pow(retry_count).unwrap_or(u64::MAX);
        let delay_ms = (base_delay.as_millis() as u64).saturating_mul(factor);
        let delay = Duration::from_millis(delay_ms);

        delay.min(self.config.max_delay.max(base_delay))
    }
}
