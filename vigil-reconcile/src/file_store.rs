//! File-backed heartbeat and cache.
//!
//! Layout under `<home>/.vigil/`:
//!
//! ```text
//! heartbeat.json            {"timestamp": ...}
//! cache/<collection>.json   {"synced_at": ..., "members": {id: {"value", "observed_at"}}}
//! ```
//!
//! Every write goes to a `.tmp` sibling first and is renamed into place.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{io_err, json_err, ReconcileError};
use crate::store::{CacheSink, CachedMember, CollectionId, HeartbeatStore, MemberId, Upsert};

/// `~/.vigil/heartbeat.json`
pub fn heartbeat_path_at(home: &Path) -> PathBuf {
    vigil_core::config::vigil_root(home).join("heartbeat.json")
}

/// `~/.vigil/cache/`
pub fn cache_dir_at(home: &Path) -> PathBuf {
    vigil_core::config::vigil_root(home).join("cache")
}

/// `~/.vigil/cache/<collection>.json`
pub fn cache_path_at(home: &Path, collection: &CollectionId) -> Result<PathBuf, ReconcileError> {
    Ok(cache_dir_at(home).join(file_name(collection)?))
}

fn file_name(collection: &CollectionId) -> Result<String, ReconcileError> {
    let id = collection.0.as_str();
    let valid = !id.is_empty()
        && !id.starts_with('.')
        && !id.contains(|c: char| c == '/' || c == '\\' || c == '\0');
    if !valid {
        return Err(ReconcileError::InvalidCollection(collection.clone()));
    }
    Ok(format!("{id}.json"))
}

fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), ReconcileError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    }
    let json = serde_json::to_string_pretty(value).map_err(|e| json_err(path, e))?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).map_err(|e| io_err(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| io_err(path, e))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// 1. Heartbeat
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct HeartbeatDoc {
    timestamp: DateTime<Utc>,
}

/// Handle on `heartbeat.json`. Holds no open file, so clones can be handed to
/// the refresh service while the store stays with the boot sequence.
#[derive(Debug, Clone)]
pub struct HeartbeatFile {
    path: PathBuf,
}

impl HeartbeatFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn open_at(home: &Path) -> Self {
        Self::new(heartbeat_path_at(home))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `at` through a shared reference.
    pub fn write(&self, at: DateTime<Utc>) -> Result<(), ReconcileError> {
        write_atomic(&self.path, &HeartbeatDoc { timestamp: at })?;
        tracing::trace!(path = %self.path.display(), at = %at, "heartbeat written");
        Ok(())
    }
}

impl HeartbeatStore for HeartbeatFile {
    fn last_heartbeat(&self) -> Result<Option<DateTime<Utc>>, ReconcileError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_err(&self.path, e)),
        };
        let doc: HeartbeatDoc =
            serde_json::from_str(&contents).map_err(|e| json_err(&self.path, e))?;
        Ok(Some(doc.timestamp))
    }

    fn set_heartbeat(&mut self, at: DateTime<Utc>) -> Result<(), ReconcileError> {
        self.write(at)
    }
}

// ---------------------------------------------------------------------------
// 2. Cache
// ---------------------------------------------------------------------------

/// On-disk payload of one cached collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheFile {
    pub synced_at: DateTime<Utc>,
    pub members: BTreeMap<MemberId, CachedMember>,
}

impl CacheFile {
    fn empty(now: DateTime<Utc>) -> Self {
        Self {
            synced_at: now,
            members: BTreeMap::new(),
        }
    }
}

/// Cache directory. Collections are read on first touch, mutated in memory,
/// and written back by [`CacheSink::flush`].
#[derive(Debug)]
pub struct CacheDir {
    dir: PathBuf,
    loaded: BTreeMap<CollectionId, CacheFile>,
    dirty: BTreeSet<CollectionId>,
}

impl CacheDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            loaded: BTreeMap::new(),
            dirty: BTreeSet::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_of(&self, collection: &CollectionId) -> Result<PathBuf, ReconcileError> {
        Ok(self.dir.join(file_name(collection)?))
    }

    /// Read a collection straight from disk, ignoring unflushed changes.
    ///
    /// Returns `Ok(None)` when the collection was never cached.
    pub fn read(&self, collection: &CollectionId) -> Result<Option<CacheFile>, ReconcileError> {
        let path = self.path_of(collection)?;
        let contents = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_err(&path, e)),
        };
        let file = serde_json::from_str(&contents).map_err(|e| json_err(&path, e))?;
        Ok(Some(file))
    }

    fn loaded_mut(
        &mut self,
        collection: &CollectionId,
        now: DateTime<Utc>,
    ) -> Result<&mut CacheFile, ReconcileError> {
        if !self.loaded.contains_key(collection) {
            let file = self.read(collection)?.unwrap_or_else(|| CacheFile::empty(now));
            self.loaded.insert(collection.clone(), file);
        }
        self.loaded
            .get_mut(collection)
            .ok_or_else(|| ReconcileError::InvalidCollection(collection.clone()))
    }

    /// Collections with changes not yet written.
    pub fn pending(&self) -> usize {
        self.dirty.len()
    }
}

impl CacheSink for CacheDir {
    fn upsert(
        &mut self,
        collection: &CollectionId,
        member: &MemberId,
        value: &str,
        observed_at: DateTime<Utc>,
    ) -> Result<Upsert, ReconcileError> {
        let file = self.loaded_mut(collection, observed_at)?;
        let previous = file.members.get(member).map(|m| m.value.clone());
        if previous.as_deref() == Some(value) {
            return Ok(Upsert {
                previous,
                changed: false,
            });
        }
        file.members.insert(
            member.clone(),
            CachedMember {
                value: value.to_string(),
                observed_at,
            },
        );
        file.synced_at = observed_at;
        self.dirty.insert(collection.clone());
        Ok(Upsert {
            previous,
            changed: true,
        })
    }

    fn flush(&mut self) -> Result<(), ReconcileError> {
        let mut first_err = None;
        for collection in std::mem::take(&mut self.dirty) {
            let Some(file) = self.loaded.get(&collection) else {
                continue;
            };
            let written = self
                .path_of(&collection)
                .and_then(|path| write_atomic(&path, file));
            if let Err(e) = written {
                tracing::warn!(collection = %collection, error = %e, "cache write failed");
                self.dirty.insert(collection);
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// 3. Store
// ---------------------------------------------------------------------------

/// Heartbeat and cache rooted at one home directory.
///
/// The two halves are public fields so a reconciliation pass can borrow them
/// mutably at the same time.
#[derive(Debug)]
pub struct FileStore {
    pub heartbeat: HeartbeatFile,
    pub cache: CacheDir,
}

impl FileStore {
    /// Open the store under `<home>/.vigil/`, creating the directories.
    pub fn open_at(home: &Path) -> Result<Self, ReconcileError> {
        let cache_dir = cache_dir_at(home);
        std::fs::create_dir_all(&cache_dir).map_err(|e| io_err(&cache_dir, e))?;
        tracing::debug!(root = %vigil_core::config::vigil_root(home).display(), "store opened");
        Ok(Self {
            heartbeat: HeartbeatFile::open_at(home),
            cache: CacheDir::new(cache_dir),
        })
    }

    /// Flush pending cache writes and release the store.
    pub fn close(mut self) -> Result<(), ReconcileError> {
        self.cache.flush()?;
        tracing::debug!("store closed");
        Ok(())
    }
}
