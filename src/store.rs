//! Key-value storage behind the result cache and conversation contexts.
//!
//! Values are opaque strings with an optional time-to-live. Stores make no
//! ordering or transactional promises; callers layer their own consistency
//! checks on top.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Result, TokenwrightError};

/// Minimal key-value contract.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value. Returns
    /// whether the value was written.
    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<bool>;

    /// Remove `key`. Returns whether a live entry existed.
    fn delete(&self, key: &str) -> Result<bool>;
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct MemoryEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Process-local store. Expired entries are dropped lazily on access.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, MemoryEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .values()
            .filter(|e| !e.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<bool> {
        let entry = MemoryEntry {
            value: value.to_string(),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.entries.lock().insert(key.to_string(), entry);
        Ok(true)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let now = Instant::now();
        Ok(self
            .entries
            .lock()
            .remove(key)
            .is_some_and(|e| !e.is_expired(now)))
    }
}

// ---------------------------------------------------------------------------
// File-backed store
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    key: String,
    value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
}

impl Envelope {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Utc::now())
    }
}

/// One JSON file per key in a directory.
///
/// File names are the SHA-256 of the key, so arbitrary keys are safe on any
/// filesystem. Writes go through a temporary file and a rename.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| {
            TokenwrightError::io(format!("failed to create store directory {}", dir.display()), e)
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.dir.join(format!("{digest:x}.json"))
    }

    fn read_envelope(&self, path: &Path) -> Result<Option<Envelope>> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(TokenwrightError::io(
                    format!("failed to read {}", path.display()),
                    e,
                ))
            }
        };
        match serde_json::from_str(&raw) {
            Ok(envelope) => Ok(Some(envelope)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "discarding corrupt store entry");
                remove_if_present(path)?;
                Ok(None)
            }
        }
    }

    /// Delete every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> Result<usize> {
        let entries = fs::read_dir(&self.dir).map_err(|e| {
            TokenwrightError::io(format!("failed to list {}", self.dir.display()), e)
        })?;
        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(envelope) = self.read_envelope(&path)? {
                if envelope.is_expired() && remove_if_present(&path)? {
                    removed += 1;
                }
            }
        }
        debug!(dir = %self.dir.display(), removed, "purged expired entries");
        Ok(removed)
    }
}

impl KvStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        let Some(envelope) = self.read_envelope(&path)? else {
            return Ok(None);
        };
        if envelope.is_expired() {
            debug!(key, "store entry expired");
            remove_if_present(&path)?;
            return Ok(None);
        }
        if envelope.key != key {
            warn!(key, stored = %envelope.key, "store key collision; ignoring entry");
            return Ok(None);
        }
        Ok(Some(envelope.value))
    }

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<bool> {
        let expires_at = match ttl {
            Some(ttl) => Some(
                Utc::now()
                    + chrono::Duration::from_std(ttl).map_err(|e| {
                        TokenwrightError::validation("ttl", format!("out of range: {e}"))
                    })?,
            ),
            None => None,
        };
        let envelope = Envelope {
            key: key.to_string(),
            value: value.to_string(),
            expires_at,
        };
        let json = serde_json::to_string(&envelope)
            .map_err(|e| TokenwrightError::serialization("store envelope", e))?;

        let path = self.path_for(key);
        // One temp file per write, even for the same key in one process.
        let tmp = path.with_extension(format!(
            "tmp-{}-{}",
            std::process::id(),
            Uuid::new_v4()
        ));
        let write = |p: &Path| -> io::Result<()> {
            let mut file = fs::File::create(p)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()
        };
        write(&tmp)
            .and_then(|()| fs::rename(&tmp, &path))
            .map_err(|e| TokenwrightError::io(format!("failed to write {}", path.display()), e))?;
        Ok(true)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key);
        let live = self
            .read_envelope(&path)?
            .is_some_and(|e| !e.is_expired() && e.key == key);
        let removed = remove_if_present(&path)?;
        Ok(live && removed)
    }
}

fn remove_if_present(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(TokenwrightError::io(
            format!("failed to remove {}", path.display()),
            e,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn exercise(store: &dyn KvStore) {
        assert_eq!(store.get("missing").unwrap(), None);
        assert!(store.set("a", "one", None).unwrap());
        assert_eq!(store.get("a").unwrap().as_deref(), Some("one"));
        assert!(store.set("a", "two", None).unwrap());
        assert_eq!(store.get("a").unwrap().as_deref(), Some("two"));
        assert!(store.delete("a").unwrap());
        assert!(!store.delete("a").unwrap());
        assert_eq!(store.get("a").unwrap(), None);
    }

    #[test]
    fn memory_store_basics() {
        exercise(&MemoryStore::new());
    }

    #[test]
    fn file_store_basics() {
        let tmp = TempDir::new().unwrap();
        exercise(&FileStore::open(tmp.path().join("kv")).unwrap());
    }

    #[test]
    fn memory_entries_expire() {
        let store = MemoryStore::new();
        store.set("k", "v", Some(Duration::ZERO)).unwrap();
        store.set("live", "v", Some(Duration::from_secs(60))).unwrap();
        assert_eq!(store.get("k").unwrap(), None);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn file_entries_expire_and_are_removed() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::open(tmp.path()).unwrap();
        store.set("k", "v", Some(Duration::ZERO)).unwrap();
        let path = store.path_for("k");
        assert!(path.exists());
        assert_eq!(store.get("k").unwrap(), None);
        assert!(!path.exists());
        assert!(!store.delete("k").unwrap());
    }

    #[test]
    fn file_store_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        FileStore::open(tmp.path())
            .unwrap()
            .set("context:s:c", "{\"x\":1}", Some(Duration::from_secs(60)))
            .unwrap();
        let reopened = FileStore::open(tmp.path()).unwrap();
        assert_eq!(
            reopened.get("context:s:c").unwrap().as_deref(),
            Some("{\"x\":1}")
        );
    }

    #[test]
    fn corrupt_entries_are_discarded() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::open(tmp.path()).unwrap();
        fs::write(store.path_for("bad"), "not json").unwrap();
        assert_eq!(store.get("bad").unwrap(), None);
        assert!(!store.path_for("bad").exists());
    }

    #[test]
    fn concurrent_writes_to_one_key_all_land() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::open(tmp.path()).unwrap();
        let values: Vec<String> = (0..8).map(|i| format!("value-{i}")).collect();

        std::thread::scope(|scope| {
            for value in &values {
                let store = &store;
                scope.spawn(move || {
                    for _ in 0..10 {
                        assert!(store.set("shared", value, None).unwrap());
                    }
                });
            }
        });

        let last = store.get("shared").unwrap().unwrap();
        assert!(values.contains(&last));
        let leftovers: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| path.extension().and_then(|e| e.to_str()) != Some("json"))
            .collect();
        assert!(leftovers.is_empty(), "temp files left behind: {leftovers:?}");
    }

    #[test]
    fn purge_removes_only_expired() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::open(tmp.path()).unwrap();
        store.set("old", "v", Some(Duration::ZERO)).unwrap();
        store.set("new", "v", Some(Duration::from_secs(600))).unwrap();
        store.set("forever", "v", None).unwrap();
        assert_eq!(store.purge_expired().unwrap(), 1);
        assert!(store.get("new").unwrap().is_some());
        assert!(store.get("forever").unwrap().is_some());
    }
}
