use crate::error::{Result, StorageError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Highest numeric suffix tried before giving up on a filename
const MAX_NAME_SUFFIX: u32 = 999;

/// Result of removing a snapshot file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    /// The file was already gone
    Missing,
}

/// Durable storage for annotated snapshot images, one file per event.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Write `jpeg` under a new, unique filename derived from `timestamp`.
    /// Existing files are never overwritten.
    async fn persist(&self, jpeg: &[u8], timestamp: DateTime<Utc>) -> Result<String>;

    /// Remove a previously persisted snapshot
    async fn remove(&self, filename: &str) -> Result<RemoveOutcome>;

    /// Filesystem location of a snapshot
    fn path_of(&self, filename: &str) -> PathBuf;
}

/// Snapshot store backed by a captures directory.
///
/// Files are named `{prefix}_{YYYYmmdd_HHMMSS_ffffff}.jpg` in UTC, so names
/// sort by creation time even across DST changes. A name that is already taken gets a `_001`, `_002`, ... suffix,
/// which keeps names unique and still sorted by creation time.
pub struct DiskSnapshotStore {
    root: PathBuf,
    prefix: String,
}

impl DiskSnapshotStore {
    pub fn new<P: Into<PathBuf>>(root: P, prefix: &str) -> Self {
        let prefix: String = prefix
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        Self {
            root: root.into(),
            prefix,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the captures directory if it doesn't exist
    pub async fn ensure_dir(&self) -> Result<()> {
        if fs::metadata(&self.root).await.is_err() {
            fs::create_dir_all(&self.root)
                .await
                .map_err(|e| StorageError::DirectoryCreation {
                    path: self.root.display().to_string(),
                    source: e,
                })?;
            info!("Created capture directory: {}", self.root.display());
        }
        Ok(())
    }

    fn base_name(&self, timestamp: DateTime<Utc>) -> String {
        format!("{}_{}", self.prefix, timestamp.format("%Y%m%d_%H%M%S_%6f"))
    }

    fn candidate_name(base: &str, attempt: u32) -> String {
        if attempt == 0 {
            format!("{}.jpg", base)
        } else {
            format!("{}_{:03}.jpg", base, attempt)
        }
    }
}

/// Reject anything that is not a bare file name inside the captures directory
pub fn validate_filename(filename: &str) -> std::result::Result<(), StorageError> {
    let invalid = filename.is_empty()
        || filename.contains('/')
        || filename.contains('\\')
        || filename.contains("..")
        || filename.starts_with('.');
    if invalid {
        return Err(StorageError::InvalidFilename {
            filename: filename.to_string(),
        });
    }
    Ok(())
}

#[async_trait]
impl SnapshotStore for DiskSnapshotStore {
    async fn persist(&self, jpeg: &[u8], timestamp: DateTime<Utc>) -> Result<String> {
        let base = self.base_name(timestamp);

        for attempt in 0..=MAX_NAME_SUFFIX {
            let filename = Self::candidate_name(&base, attempt);
            let path = self.root.join(&filename);

            let mut file = match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    debug!("Snapshot name {} taken, trying next suffix", filename);
                    continue;
                }
                Err(e) => {
                    return Err(StorageError::Write {
                        path: path.display().to_string(),
                        source: e,
                    }
                    .into())
                }
            };

            let written = match file.write_all(jpeg).await {
                Ok(()) => file.sync_data().await,
                Err(e) => Err(e),
            };

            if let Err(e) = written {
                // Leave no partial file behind
                drop(file);
                if let Err(cleanup) = fs::remove_file(&path).await {
                    warn!(
                        "Failed to remove partial snapshot {}: {}",
                        path.display(),
                        cleanup
                    );
                }
                return Err(StorageError::Write {
                    path: path.display().to_string(),
                    source: e,
                }
                .into());
            }

            debug!("Saved snapshot {} ({} bytes)", path.display(), jpeg.len());
            return Ok(filename);
        }

        Err(StorageError::NameExhausted { base }.into())
    }

    async fn remove(&self, filename: &str) -> Result<RemoveOutcome> {
        validate_filename(filename)?;
        let path = self.root.join(filename);

        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Deleted snapshot {}", path.display());
                Ok(RemoveOutcome::Removed)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(RemoveOutcome::Missing),
            Err(e) => Err(StorageError::Remove {
                path: path.display().to_string(),
                source: e,
            }
            .into()),
        }
    }

    fn path_of(&self, filename: &str) -> PathBuf {
        self.root.join(filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> DiskSnapshotStore {
        DiskSnapshotStore::new(dir.path(), "cat")
    }

    fn at(micros: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
            + chrono::Duration::microseconds(micros as i64)
    }

    #[tokio::test]
    async fn test_persist_names_by_timestamp() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let name = store.persist(b"jpeg", at(42)).await.unwrap();
        assert_eq!(name, "cat_20240309_140507_000042.jpg");
        assert_eq!(std::fs::read(store.path_of(&name)).unwrap(), b"jpeg");
    }

    #[tokio::test]
    async fn test_collisions_never_overwrite() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let first = store.persist(b"one", at(1)).await.unwrap();
        let second = store.persist(b"two", at(1)).await.unwrap();
        let third = store.persist(b"three", at(1)).await.unwrap();

        assert_eq!(first, "cat_20240309_140507_000001.jpg");
        assert_eq!(second, "cat_20240309_140507_000001_001.jpg");
        assert_eq!(third, "cat_20240309_140507_000001_002.jpg");
        assert_eq!(std::fs::read(store.path_of(&first)).unwrap(), b"one");

        let mut names = vec![third.clone(), first.clone(), second.clone()];
        names.sort();
        assert_eq!(names, vec![first, second, third]);
    }

    #[tokio::test]
    async fn test_names_sort_across_dst_fall_back() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        // Europe/Berlin falls back from 03:00 CEST to 02:00 CET at 01:00 UTC
        let before = Utc.with_ymd_and_hms(2024, 10, 27, 0, 59, 59).unwrap();
        let after = Utc.with_ymd_and_hms(2024, 10, 27, 1, 0, 1).unwrap();

        let earlier = store.persist(b"a", before).await.unwrap();
        let later = store.persist(b"b", after).await.unwrap();

        assert_eq!(earlier, "cat_20241027_005959_000000.jpg");
        assert_eq!(later, "cat_20241027_010001_000000.jpg");
        assert!(earlier < later);
    }

    #[tokio::test]
    async fn test_remove_reports_missing() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let name = store.persist(b"x", at(5)).await.unwrap();
        assert_eq!(store.remove(&name).await.unwrap(), RemoveOutcome::Removed);
        assert_eq!(store.remove(&name).await.unwrap(), RemoveOutcome::Missing);
    }

    #[tokio::test]
    async fn test_remove_rejects_traversal() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        assert!(store.remove("../etc/passwd").await.is_err());
        assert!(store.remove("a/b.jpg").await.is_err());
        assert!(store.remove("").await.is_err());
    }

    #[tokio::test]
    async fn test_persist_into_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let store = DiskSnapshotStore::new(dir.path().join("absent"), "cat");
        assert!(store.persist(b"x", at(0)).await.is_err());
    }

    #[tokio::test]
    async fn test_ensure_dir_creates_nested_path() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("a").join("b");
        let store = DiskSnapshotStore::new(&root, "cat");

        store.ensure_dir().await.unwrap();
        assert!(root.is_dir());
        store.ensure_dir().await.unwrap();
    }

    #[test]
    fn test_prefix_is_sanitized() {
        let store = DiskSnapshotStore::new("/tmp", "teddy bear/../x");
        assert_eq!(store.prefix, "teddy_bear____x");
    }
}
