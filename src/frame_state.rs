use crate::frame::FrameData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::watch;
use tracing::trace;

/// One detection cycle's output: the raw frame and its annotated rendering.
///
/// Snapshots are immutable once published; the writer replaces the whole
/// snapshot each cycle, so a reader holding an `Arc<FrameSnapshot>` can never
/// see a raw frame from one cycle next to an annotation from another.
#[derive(Debug)]
pub struct FrameSnapshot {
    /// Publish sequence number, starting at 1
    pub version: u64,
    /// Frame as delivered by the source
    pub raw: FrameData,
    /// JPEG-encoded annotated frame
    pub annotated: Arc<Vec<u8>>,
    /// Number of detections drawn on the annotated frame
    pub detections: usize,
    pub published_at: SystemTime,
}

/// Statistics for frame publication
#[derive(Debug, Default)]
pub struct FrameStateStats {
    pub frames_published: AtomicU64,
    pub frames_read: AtomicU64,
}

/// Snapshot of frame state statistics
#[derive(Debug, Clone)]
pub struct FrameStateStatsSnapshot {
    pub frames_published: u64,
    pub frames_read: u64,
    pub current_version: u64,
    pub readers: usize,
}

/// Latest raw/annotated frame pair, single writer and many readers.
///
/// Publishing never waits on readers; it swaps the current snapshot and wakes
/// anyone watching for a newer version.
#[derive(Clone)]
pub struct FrameState {
    sender: Arc<watch::Sender<Option<Arc<FrameSnapshot>>>>,
    version: Arc<AtomicU64>,
    stats: Arc<FrameStateStats>,
}

impl FrameState {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            sender: Arc::new(sender),
            version: Arc::new(AtomicU64::new(0)),
            stats: Arc::new(FrameStateStats::default()),
        }
    }

    /// Publish a new raw/annotated pair and return its version
    pub fn publish(&self, raw: FrameData, annotated: Arc<Vec<u8>>, detections: usize) -> u64 {
        let version = self.version.fetch_add(1, Ordering::AcqRel) + 1;
        let snapshot = Arc::new(FrameSnapshot {
            version,
            raw,
            annotated,
            detections,
            published_at: SystemTime::now(),
        });

        trace!(
            "Publishing frame {} as version {} ({} detections)",
            snapshot.raw.id,
            version,
            detections
        );

        self.sender.send_replace(Some(snapshot));
        self.stats.frames_published.fetch_add(1, Ordering::Relaxed);
        version
    }

    /// Current snapshot, or `None` before the first publish
    pub fn read(&self) -> Option<Arc<FrameSnapshot>> {
        let snapshot = self.sender.borrow().clone();
        if snapshot.is_some() {
            self.stats.frames_read.fetch_add(1, Ordering::Relaxed);
        }
        snapshot
    }

    /// Version of the current snapshot (0 before the first publish)
    pub fn version(&self) -> u64 {
        self.sender
            .borrow()
            .as_ref()
            .map(|snapshot| snapshot.version)
            .unwrap_or(0)
    }

    /// Create a watcher for long-lived readers such as stream viewers
    pub fn watcher(&self) -> FrameWatcher {
        FrameWatcher {
            receiver: self.sender.subscribe(),
            stats: Arc::clone(&self.stats),
        }
    }

    pub fn stats(&self) -> FrameStateStatsSnapshot {
        FrameStateStatsSnapshot {
            frames_published: self.stats.frames_published.load(Ordering::Relaxed),
            frames_read: self.stats.frames_read.load(Ordering::Relaxed),
            current_version: self.version(),
            readers: self.sender.receiver_count(),
        }
    }
}

impl Default for FrameState {
    fn default() -> Self {
        Self::new()
    }
}

/// A reader's handle on the frame state
pub struct FrameWatcher {
    receiver: watch::Receiver<Option<Arc<FrameSnapshot>>>,
    stats: Arc<FrameStateStats>,
}

impl FrameWatcher {
    /// Current snapshot without waiting
    pub fn latest(&mut self) -> Option<Arc<FrameSnapshot>> {
        let snapshot = self.receiver.borrow_and_update().clone();
        if snapshot.is_some() {
            self.stats.frames_read.fetch_add(1, Ordering::Relaxed);
        }
        snapshot
    }

    /// Wait until a snapshot newer than `last_version` exists.
    ///
    /// Returns `None` once the frame state has been dropped.
    pub async fn wait_newer(&mut self, last_version: u64) -> Option<Arc<FrameSnapshot>> {
        let result = self
            .receiver
            .wait_for(|current| {
                current
                    .as_ref()
                    .map(|snapshot| snapshot.version > last_version)
                    .unwrap_or(false)
            })
            .await;

        match result {
            Ok(guard) => {
                let snapshot = guard.clone();
                self.stats.frames_read.fetch_add(1, Ordering::Relaxed);
                snapshot
            }
            Err(_) => None,
        }
    }
}
