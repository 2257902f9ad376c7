use crate::error::{Result, StorageError};
use crate::storage::{RemoveOutcome, SnapshotStore};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A recorded detection: one persisted snapshot plus how many target objects it shows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionEvent {
    /// Assigned in creation order, never reused
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    /// Snapshot filename inside the captures directory
    pub filename: String,
    /// Number of qualifying detections in the frame (at least 1)
    pub count: u32,
}

/// Result of a delete request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted(DetectionEvent),
    NotFound,
}

/// Consistent view of the log taken under a single read guard
#[derive(Debug, Clone)]
pub struct EventLogSnapshot {
    pub lifetime_count: u64,
    /// Most recent first
    pub events: Vec<DetectionEvent>,
}

#[derive(Debug, Default)]
struct LogState {
    /// Oldest first
    entries: VecDeque<DetectionEvent>,
    next_id: u64,
    lifetime_count: u64,
}

/// Bounded, in-memory history of detection events.
///
/// All mutations (append, delete, eviction) take the write lock; readers clone
/// out under the read lock, so a listing never shows a half-applied change.
/// Snapshot files are removed only after the record is gone and the lock has
/// been released: log consistency wins over disk consistency.
pub struct EventLog {
    state: RwLock<LogState>,
    capacity: usize,
    store: Arc<dyn SnapshotStore>,
}

impl EventLog {
    /// Create an empty log retaining at most `capacity` events
    pub fn new(capacity: usize, store: Arc<dyn SnapshotStore>) -> Self {
        debug!("Created event log with capacity {}", capacity);
        Self {
            state: RwLock::new(LogState::default()),
            capacity: capacity.max(1),
            store,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Record an event whose snapshot has already been persisted.
    ///
    /// Adds `count` to the lifetime total and evicts the oldest entry (and its
    /// file) when the log is full. Returns the assigned id.
    pub async fn append(&self, timestamp: DateTime<Utc>, filename: String, count: u32) -> Result<u64> {
        if count == 0 {
            return Err(StorageError::EmptyEvent.into());
        }

        let (id, evicted) = {
            let mut state = self.state.write();
            let id = state.next_id;
            state.next_id += 1;
            state.lifetime_count += u64::from(count);
            state.entries.push_back(DetectionEvent {
                id,
                timestamp,
                filename,
                count,
            });

            let evicted = if state.entries.len() > self.capacity {
                state.entries.pop_front()
            } else {
                None
            };
            (id, evicted)
        };

        debug!("Appended event {} ({} detections)", id, count);

        if let Some(old) = evicted {
            info!("Evicting event {} ({}) to stay within {} events", old.id, old.filename, self.capacity);
            self.remove_file(&old).await;
        }

        Ok(id)
    }

    /// Events most recent first, optionally limited
    pub fn list(&self, limit: Option<usize>) -> Vec<DetectionEvent> {
        let state = self.state.read();
        Self::collect_recent(&state, limit)
    }

    /// Lifetime total and recent events, read together
    pub fn snapshot(&self, limit: Option<usize>) -> EventLogSnapshot {
        let state = self.state.read();
        EventLogSnapshot {
            lifetime_count: state.lifetime_count,
            events: Self::collect_recent(&state, limit),
        }
    }

    pub fn latest(&self) -> Option<DetectionEvent> {
        self.state.read().entries.back().cloned()
    }

    pub fn get(&self, id: u64) -> Option<DetectionEvent> {
        let state = self.state.read();
        Self::position_of(&state, id).map(|index| state.entries[index].clone())
    }

    /// Number of retained events
    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }

    /// Lifetime number of qualifying detections, including evicted and deleted events
    pub fn count(&self) -> u64 {
        self.state.read().lifetime_count
    }

    /// Remove an event and its snapshot file
    pub async fn delete(&self, id: u64) -> DeleteOutcome {
        let removed = {
            let mut state = self.state.write();
            Self::position_of(&state, id).and_then(|index| state.entries.remove(index))
        };
        self.finish_delete(removed).await
    }

    /// Remove the event that owns `filename`, if any
    pub async fn delete_by_filename(&self, filename: &str) -> DeleteOutcome {
        let removed = {
            let mut state = self.state.write();
            state
                .entries
                .iter()
                .position(|event| event.filename == filename)
                .and_then(|index| state.entries.remove(index))
        };
        self.finish_delete(removed).await
    }

    async fn finish_delete(&self, removed: Option<DetectionEvent>) -> DeleteOutcome {
        match removed {
            Some(event) => {
                info!("Deleted event {} ({})", event.id, event.filename);
                self.remove_file(&event).await;
                DeleteOutcome::Deleted(event)
            }
            None => DeleteOutcome::NotFound,
        }
    }

    async fn remove_file(&self, event: &DetectionEvent) {
        match self.store.remove(&event.filename).await {
            Ok(RemoveOutcome::Removed) => {}
            Ok(RemoveOutcome::Missing) => {
                warn!(
                    "Snapshot {} for event {} was already missing",
                    event.filename, event.id
                );
            }
            Err(e) => {
                warn!(
                    "Failed to remove snapshot {} for event {}: {}",
                    event.filename, event.id, e
                );
            }
        }
    }

    // Ids increase with insertion order and removal keeps order, so the
    // entries stay sorted by id.
    fn position_of(state: &LogState, id: u64) -> Option<usize> {
        state.entries.binary_search_by_key(&id, |event| event.id).ok()
    }

    fn collect_recent(state: &LogState, limit: Option<usize>) -> Vec<DetectionEvent> {
        let take = limit.unwrap_or(state.entries.len());
        state.entries.iter().rev().take(take).cloned().collect()
    }
}
