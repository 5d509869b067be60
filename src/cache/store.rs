// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 devloop contributors

//! Persisted cache store
//!
//! All entries live in a single JSON file that is read once at startup and
//! rewritten after a build round. Writes go to a temporary file in the same
//! directory which is then renamed over the old file, so the file on disk
//! is always one complete snapshot.
//!
//! The store assumes a single writing process. Two `devloop` processes
//! sharing a cache file do not coordinate: the last flush wins.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use super::{CacheEntry, CacheStats};
use crate::errors::DevloopError;

/// Current cache file schema version
const CACHE_FILE_VERSION: u32 = 1;

/// On-disk layout. Entries are kept as raw values so one malformed entry
/// does not invalidate the rest.
#[derive(Debug, Serialize, Deserialize)]
struct CacheFile<E> {
    #[serde(default)]
    version: u32,
    #[serde(default)]
    artifacts: BTreeMap<String, E>,
}

/// In-memory view of the cache file
pub struct CacheStore {
    /// Backing file, `None` for a store that never touches disk
    path: Option<PathBuf>,
    entries: RwLock<HashMap<String, CacheEntry>>,
    dirty: AtomicBool,
    flush_lock: Mutex<()>,
}

impl CacheStore {
    /// Load the store from `path`.
    ///
    /// A missing, unreadable or malformed file yields an empty store; the
    /// problem is logged and never returned to the caller.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) => parse_entries(&path, &bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No cache file at {}, starting cold", path.display());
                HashMap::new()
            }
            Err(e) => {
                warn!("Could not read cache file {}: {}; starting cold", path.display(), e);
                HashMap::new()
            }
        };

        debug!("Loaded {} cache entries from {}", entries.len(), path.display());

        Self {
            path: Some(path),
            entries: RwLock::new(entries),
            dirty: AtomicBool::new(false),
            flush_lock: Mutex::new(()),
        }
    }

    /// A store that is never read from or written to disk
    pub fn disabled() -> Self {
        Self {
            path: None,
            entries: RwLock::new(HashMap::new()),
            dirty: AtomicBool::new(false),
            flush_lock: Mutex::new(()),
        }
    }

    /// Backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Look up the entry for an artifact
    pub async fn lookup(&self, artifact: &str) -> Option<CacheEntry> {
        self.entries.read().await.get(artifact).cloned()
    }

    /// Stage a new entry for an artifact
    pub async fn put(&self, artifact: &str, entry: CacheEntry) {
        let mut entries = self.entries.write().await;
        entries.insert(artifact.to_string(), entry);
        self.dirty.store(true, Ordering::SeqCst);
    }

    /// Stage removal of an artifact's entry
    pub async fn invalidate(&self, artifact: &str) -> bool {
        let mut entries = self.entries.write().await;
        let removed = entries.remove(artifact).is_some();
        if removed {
            self.dirty.store(true, Ordering::SeqCst);
        }
        removed
    }

    /// Stage removal of every entry
    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        if !entries.is_empty() {
            entries.clear();
            self.dirty.store(true, Ordering::SeqCst);
        }
    }

    /// Snapshot of all entries, sorted by artifact name
    pub async fn entries(&self) -> Vec<(String, CacheEntry)> {
        let entries = self.entries.read().await;
        let mut list: Vec<_> = entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        list.sort_by(|a, b| a.0.cmp(&b.0));
        list
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Whether there are staged changes not yet flushed
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Persist staged changes.
    ///
    /// Returns `Ok(false)` when there was nothing to write. On error the
    /// previous file is left untouched and the changes stay staged.
    pub async fn flush(&self) -> Result<bool, DevloopError> {
        let _guard = self.flush_lock.lock().await;

        let Some(ref path) = self.path else {
            self.dirty.store(false, Ordering::SeqCst);
            return Ok(false);
        };

        if !self.dirty.swap(false, Ordering::SeqCst) {
            return Ok(false);
        }

        let snapshot = CacheFile {
            version: CACHE_FILE_VERSION,
            artifacts: self
                .entries
                .read()
                .await
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect::<BTreeMap<_, _>>(),
        };

        let result = match serde_json::to_vec_pretty(&snapshot) {
            Ok(bytes) => {
                let path = path.clone();
                tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
                    .await
                    .map_err(|e| DevloopError::CacheError {
                        message: format!("Cache writer task failed: {}", e),
                    })
                    .and_then(|r| r)
            }
            Err(e) => Err(DevloopError::CacheError {
                message: format!("Failed to serialize cache: {}", e),
            }),
        };

        match result {
            Ok(()) => {
                debug!(
                    "Wrote {} cache entries to {}",
                    snapshot.artifacts.len(),
                    path.display()
                );
                Ok(true)
            }
            Err(e) => {
                self.dirty.store(true, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    /// Statistics for display
    pub async fn stats(&self) -> CacheStats {
        let entries = self.entries.read().await;

        let size_bytes = self
            .path
            .as_ref()
            .and_then(|p| std::fs::metadata(p).ok())
            .map(|m| m.len())
            .unwrap_or(0);

        CacheStats {
            entries: entries.len(),
            size_bytes,
            oldest_entry: entries.values().map(|e| e.built_at).min(),
            newest_entry: entries.values().map(|e| e.built_at).max(),
        }
    }
}

fn parse_entries(path: &Path, bytes: &[u8]) -> HashMap<String, CacheEntry> {
    let file: CacheFile<serde_json::Value> = match serde_json::from_slice(bytes) {
        Ok(file) => file,
        Err(e) => {
            warn!("Cache file {} is corrupt ({}); starting cold", path.display(), e);
            return HashMap::new();
        }
    };

    if file.version > CACHE_FILE_VERSION {
        debug!(
            "Cache file {} has newer version {}; reading known fields only",
            path.display(),
            file.version
        );
    }

    file.artifacts
        .into_iter()
        .filter_map(|(name, value)| match serde_json::from_value::<CacheEntry>(value) {
            Ok(entry) => Some((name, entry)),
            Err(e) => {
                warn!("Dropping malformed cache entry for '{}': {}", name, e);
                None
            }
        })
        .collect()
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), DevloopError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let cache_error = |what: &str, e: &dyn std::fmt::Display| DevloopError::CacheError {
        message: format!("Failed to {} {}: {}", what, path.display(), e),
    };

    std::fs::create_dir_all(dir).map_err(|e| cache_error("create directory for", &e))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| cache_error("create temporary file for", &e))?;
    tmp.write_all(bytes)
        .map_err(|e| cache_error("write", &e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| cache_error("sync", &e))?;
    tmp.persist(path)
        .map_err(|e| cache_error("replace", &e.error))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Digest;
    use tempfile::TempDir;

    fn entry(digest: &str, image: &str) -> CacheEntry {
        CacheEntry::new(Digest::from_hex(digest), image, None)
    }

    #[tokio::test]
    async fn test_missing_file_is_cold() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::load(dir.path().join("nope.json")).await;
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_cold() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "{ this is not json").unwrap();

        let store = CacheStore::load(&path).await;
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_unreadable_path_is_cold() {
        let dir = TempDir::new().unwrap();
        // A directory where the file should be
        let store = CacheStore::load(dir.path()).await;
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_put_flush_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("cache.json");

        let store = CacheStore::load(&path).await;
        store.put("web", entry("d1", "web:d1")).await;
        store
            .put(
                "api",
                CacheEntry::new(Digest::from_hex("d2"), "api:d2", Some("sha256:feed".into()))
                    .with_image_id(Some("sha256:0a1b".into())),
            )
            .await;
        assert!(store.is_dirty());
        assert!(store.flush().await.unwrap());
        assert!(!store.is_dirty());

        // Nothing staged
        assert!(!store.flush().await.unwrap());

        let reloaded = CacheStore::load(&path).await;
        assert_eq!(reloaded.len().await, 2);
        assert_eq!(reloaded.lookup("web").await.unwrap().image, "web:d1");
        assert_eq!(
            reloaded.lookup("api").await.unwrap().remote_digest.as_deref(),
            Some("sha256:feed")
        );
        assert_eq!(
            reloaded.lookup("api").await.unwrap().image_id.as_deref(),
            Some("sha256:0a1b")
        );
        assert_eq!(reloaded.lookup("web").await.unwrap().image_id, None);
    }

    #[tokio::test]
    async fn test_unknown_fields_and_bad_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(
            &path,
            r#"{
  "version": 7,
  "written_by": "devloop 9.0",
  "artifacts": {
    "web": {"digest": "d1", "image": "web:d1", "platforms": ["linux/amd64"]},
    "api": {"image": 42}
  }
}"#,
        )
        .unwrap();

        let store = CacheStore::load(&path).await;
        assert_eq!(store.len().await, 1);
        assert!(store.lookup("web").await.is_some());
        assert!(store.lookup("api").await.is_none());
    }

    #[tokio::test]
    async fn test_invalidate() {
        let store = CacheStore::disabled();
        store.put("web", entry("d1", "web:d1")).await;

        assert!(store.invalidate("web").await);
        assert!(!store.invalidate("web").await);
        assert!(store.lookup("web").await.is_none());
    }

    #[tokio::test]
    async fn test_disabled_store_never_writes() {
        let store = CacheStore::disabled();
        store.put("web", entry("d1", "web:d1")).await;

        assert!(!store.flush().await.unwrap());
        assert!(store.path().is_none());
    }

    #[tokio::test]
    async fn test_interrupted_write_keeps_previous_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");

        let store = CacheStore::load(&path).await;
        store.put("web", entry("d1", "web:d1")).await;
        store.flush().await.unwrap();

        // A crash mid-write leaves only a stray temporary file behind.
        std::fs::write(dir.path().join(".tmpXYZ123"), r#"{"version":1,"artif"#).unwrap();

        let reloaded = CacheStore::load(&path).await;
        assert_eq!(reloaded.lookup("web").await.unwrap().image, "web:d1");
    }

    #[tokio::test]
    async fn test_failed_flush_keeps_changes_staged() {
        let dir = TempDir::new().unwrap();
        // The cache path is an existing non-empty directory, so the rename fails.
        let path = dir.path().join("cache.json");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep"), "x").unwrap();

        let store = CacheStore::load(&path).await;
        store.put("web", entry("d1", "web:d1")).await;

        assert!(store.flush().await.is_err());
        assert!(store.is_dirty());
        assert!(path.join("keep").exists());
    }

    #[tokio::test]
    async fn test_stats() {
        let store = CacheStore::disabled();
        store.put("web", entry("d1", "web:d1")).await;
        store.put("api", entry("d2", "api:d2")).await;

        let stats = store.stats().await;
        assert_eq!(stats.entries, 2);
        assert!(stats.oldest_entry <= stats.newest_entry);
    }
}
