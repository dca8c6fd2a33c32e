//! Identity-scoped persistence for timer records.
//!
//! The [`KeyValueStore`] is a dumb string surface; [`RecordStore`] layers the
//! record encoding on top and turns unreadable data into a fresh record.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::error::StoreError;
use crate::types::{CycleState, PersistedTimerRecord, TimerIdentity};

// ============================================================================
// KeyValueStore
// ============================================================================

/// Minimal string key/value storage.
pub trait KeyValueStore: Send + Sync + fmt::Debug {
    /// Reads a value, `None` if absent.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Writes a value, replacing any previous one.
    fn put(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Deletes a value. Deleting an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// In-memory store. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries().get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries().remove(key);
        Ok(())
    }
}

/// Store keeping one JSON file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Opens (and creates if needed) the store directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Returns the store directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", encode_key(key)))
    }
}

/// Maps a key to a file name; anything outside `[A-Za-z0-9._-]` is hex-escaped.
fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'.' | b'_' | b'-' => out.push(byte as char),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(value.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ============================================================================
// RecordStore
// ============================================================================

/// Result of loading a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOutcome<T> {
    /// The loaded value, or the default if none was usable
    pub value: T,
    /// Whether a stored value existed
    pub existed: bool,
    /// Whether a stored value was discarded as unreadable
    pub corrupt: bool,
}

/// Typed persistence for timer records and cycle state.
#[derive(Debug, Clone)]
pub struct RecordStore {
    inner: Arc<dyn KeyValueStore>,
}

impl RecordStore {
    /// Wraps a key/value store.
    pub fn new(inner: Arc<dyn KeyValueStore>) -> Self {
        Self { inner }
    }

    /// Convenience constructor over a fresh in-memory store.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Loads the record for `identity`.
    ///
    /// Unparseable data, or a record whose anchor disagrees with its phase,
    /// yields the default IDLE/0 record with `corrupt` set.
    pub fn load(&self, identity: &TimerIdentity) -> LoadOutcome<PersistedTimerRecord> {
        let mut outcome: LoadOutcome<PersistedTimerRecord> =
            self.load_json(&identity.record_key());
        if !outcome.value.is_consistent() {
            tracing::warn!(
                identity = %identity,
                phase = %outcome.value.phase,
                "タイマーレコードの整合性が取れていないため破棄します"
            );
            outcome.value = PersistedTimerRecord::default();
            outcome.corrupt = true;
        }
        outcome
    }

    /// Stamps and writes the record for `identity`.
    pub fn save(
        &self,
        identity: &TimerIdentity,
        record: &mut PersistedTimerRecord,
        written_at: u64,
        writer: &str,
    ) -> Result<(), StoreError> {
        record.written_at = written_at;
        record.writer = Some(writer.to_string());
        self.save_json(&identity.record_key(), record)
    }

    /// Deletes the record for `identity`.
    pub fn clear(&self, identity: &TimerIdentity) -> Result<(), StoreError> {
        self.inner.remove(&identity.record_key())
    }

    /// Loads the interval cycle state for `identity`.
    pub fn load_cycle(&self, identity: &TimerIdentity) -> LoadOutcome<CycleState> {
        self.load_json(&identity.cycle_key())
    }

    /// Writes the interval cycle state for `identity`.
    pub fn save_cycle(&self, identity: &TimerIdentity, state: &CycleState) -> Result<(), StoreError> {
        self.save_json(&identity.cycle_key(), state)
    }

    fn load_json<T: DeserializeOwned + Default>(&self, key: &str) -> LoadOutcome<T> {
        let raw = match self.inner.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                return LoadOutcome {
                    value: T::default(),
                    existed: false,
                    corrupt: false,
                }
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "保存データを読み込めませんでした");
                return LoadOutcome {
                    value: T::default(),
                    existed: false,
                    corrupt: true,
                };
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => LoadOutcome {
                value,
                existed: true,
                corrupt: false,
            },
            Err(e) => {
                tracing::warn!(key, error = %e, "保存データが壊れているため初期状態から開始します");
                LoadOutcome {
                    value: T::default(),
                    existed: true,
                    corrupt: true,
                }
            }
        }
    }

    fn save_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let json = serde_json::to_string(value)?;
        self.inner.put(key, &json)
    }
}

// ============================================================================
// Tests
// ============================================================================
