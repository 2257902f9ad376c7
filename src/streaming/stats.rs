use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Stream server statistics, updated lock-free by every viewer task
#[derive(Debug, Default)]
pub struct StreamStats {
    active_viewers: AtomicU64,
    total_viewers: AtomicU64,
    frames_streamed: AtomicU64,
    bytes_streamed: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StreamStatsSnapshot {
    pub active_viewers: u64,
    pub total_viewers: u64,
    pub frames_streamed: u64,
    pub bytes_streamed: u64,
}

impl StreamStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_viewers(&self) -> u64 {
        self.active_viewers.load(Ordering::Relaxed)
    }

    pub(crate) fn record_frame(&self, bytes: usize) {
        self.frames_streamed.fetch_add(1, Ordering::Relaxed);
        self.bytes_streamed.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StreamStatsSnapshot {
        StreamStatsSnapshot {
            active_viewers: self.active_viewers.load(Ordering::Relaxed),
            total_viewers: self.total_viewers.load(Ordering::Relaxed),
            frames_streamed: self.frames_streamed.load(Ordering::Relaxed),
            bytes_streamed: self.bytes_streamed.load(Ordering::Relaxed),
        }
    }
}

/// Counts a viewer for as long as its stream is alive.
///
/// The server drops the response body when the client goes away, which drops
/// the guard and ends only that viewer.
pub(crate) struct ViewerGuard {
    stats: Arc<StreamStats>,
    viewer: u64,
    connected_at: Instant,
    pub(crate) frames_sent: u64,
}

impl ViewerGuard {
    pub(crate) fn new(stats: Arc<StreamStats>) -> Self {
        let viewer = stats.total_viewers.fetch_add(1, Ordering::Relaxed) + 1;
        let active = stats.active_viewers.fetch_add(1, Ordering::Relaxed) + 1;
        info!("Stream viewer {} connected ({} active)", viewer, active);
        Self {
            stats,
            viewer,
            connected_at: Instant::now(),
            frames_sent: 0,
        }
    }
}

impl Drop for ViewerGuard {
    fn drop(&mut self) {
        let active = self
            .stats
            .active_viewers
            .fetch_sub(1, Ordering::Relaxed)
            .saturating_sub(1);
        info!(
            "Stream viewer {} disconnected after {:.1}s, {} frames ({} active)",
            self.viewer,
            self.connected_at.elapsed().as_secs_f64(),
            self.frames_sent,
            active
        );
    }
}
