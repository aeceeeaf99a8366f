//! Persistent preview cache keyed by absolute path.
//!
//! [`PreviewStore`] is the storage contract; [`JsonPreviewStore`] keeps the
//! records in memory and writes them through to a JSON document after every
//! mutation, and [`MemoryPreviewStore`] is the same map without a file.
//!
//! A record only counts as a hit while its recorded modification time is
//! equal to the file's current one. Anything else is [`CacheLookup::Stale`]
//! and gets overwritten by the next generation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Version written to the JSON document. Documents with another version are
/// discarded on load.
const FORMAT_VERSION: u32 = 1;

/// Bytes accounted per record for its timestamp by [`PreviewStore::size_bytes`].
const TIMESTAMP_WIDTH: u64 = 8;

/// One cached preview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewRecord {
    /// File modification time when the preview was generated.
    pub modified_at: SystemTime,
    /// Base64 thumbnail payload.
    pub preview: String,
}

/// Outcome of [`PreviewStore::lookup`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    /// No record exists for the path.
    Miss,
    /// A record exists but the file changed since it was generated.
    Stale,
    /// A record exists and matches the file's modification time.
    Fresh(String),
}

impl CacheLookup {
    pub fn found(&self) -> bool {
        !matches!(self, Self::Miss)
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, Self::Fresh(_))
    }

    /// Returns the preview of a fresh record.
    pub fn into_fresh(self) -> Option<String> {
        match self {
            Self::Fresh(preview) => Some(preview),
            _ => None,
        }
    }
}

/// Storage contract for cached previews.
///
/// Every operation is keyed by absolute path and is safe to call from
/// several threads at once. Failures surface as
/// [`CoreError::StorageUnavailable`]; callers decide whether that means
/// "treat as a miss" or "log and move on".
pub trait PreviewStore: Send + Sync {
    /// Looks up `path` and compares its record against `current_modified`.
    fn lookup(&self, path: &Path, current_modified: SystemTime) -> CoreResult<CacheLookup>;

    /// Inserts or replaces the record for `path`.
    fn put(&self, path: &Path, modified_at: SystemTime, preview: &str) -> CoreResult<()>;

    /// Relabels the record at `old` as `new`, replacing any record at `new`.
    /// No-op when `old` has no record.
    fn move_key(&self, old: &Path, new: &Path) -> CoreResult<()>;

    /// Relabels every record at or below the folder `old` to sit below `new`.
    fn move_subtree(&self, old: &Path, new: &Path) -> CoreResult<()>;

    /// Removes the record for exactly `path`. No-op when absent.
    fn delete(&self, path: &Path) -> CoreResult<()>;

    /// Removes the records of `folder` and of every path nested in it.
    ///
    /// Nesting is component-wise: deleting `/x` keeps `/xx`.
    fn delete_subtree(&self, folder: &Path) -> CoreResult<()>;

    /// Returns a snapshot of the records at or below `folder`.
    fn records_under(&self, folder: &Path) -> CoreResult<Vec<(PathBuf, PreviewRecord)>>;

    /// Approximate footprint of all records: key, timestamp and payload.
    fn size_bytes(&self) -> CoreResult<u64>;

    /// Removes every record.
    fn clear(&self) -> CoreResult<()>;
}

/// Prior values of the keys a mutation touched, in the order it touched
/// them. Empty when nothing changed.
type Undo = Vec<(PathBuf, Option<PreviewRecord>)>;

/// Path-keyed record map shared by both store implementations.
///
/// Keys are the paths themselves, so two names that only differ in bytes
/// that are not valid UTF-8 stay distinct. Mutating methods return an
/// [`Undo`] so the JSON store can skip rewriting its file for no-ops and
/// revert exactly the entries a failed write touched.
#[derive(Debug, Default)]
struct RecordMap {
    records: BTreeMap<PathBuf, PreviewRecord>,
}

impl RecordMap {
    fn lookup(&self, path: &Path, current_modified: SystemTime) -> CacheLookup {
        match self.records.get(path) {
            None => CacheLookup::Miss,
            Some(record) if record.modified_at == current_modified => {
                CacheLookup::Fresh(record.preview.clone())
            }
            Some(_) => CacheLookup::Stale,
        }
    }

    fn put(&mut self, path: &Path, modified_at: SystemTime, preview: &str) -> Undo {
        let record = PreviewRecord {
            modified_at,
            preview: preview.to_string(),
        };
        if self.records.get(path) == Some(&record) {
            return Undo::new();
        }
        let prior = self.records.insert(path.to_path_buf(), record);
        vec![(path.to_path_buf(), prior)]
    }

    fn move_key(&mut self, old: &Path, new: &Path) -> Undo {
        if old == new {
            return Undo::new();
        }
        match self.records.remove(old) {
            Some(record) => {
                let replaced = self.records.insert(new.to_path_buf(), record.clone());
                vec![
                    (old.to_path_buf(), Some(record)),
                    (new.to_path_buf(), replaced),
                ]
            }
            None => Undo::new(),
        }
    }

    fn move_subtree(&mut self, old: &Path, new: &Path) -> Undo {
        if old == new {
            return Undo::new();
        }
        let moved: Vec<PathBuf> = self
            .records
            .keys()
            .filter(|key| key.starts_with(old))
            .cloned()
            .collect();

        let mut undo = Undo::new();
        for key in moved {
            let Some(record) = self.records.remove(&key) else {
                continue;
            };
            let relative = key.strip_prefix(old).unwrap_or(Path::new(""));
            let target = if relative.as_os_str().is_empty() {
                new.to_path_buf()
            } else {
                new.join(relative)
            };
            let replaced = self.records.insert(target.clone(), record.clone());
            undo.push((key, Some(record)));
            undo.push((target, replaced));
        }
        undo
    }

    fn delete(&mut self, path: &Path) -> Undo {
        match self.records.remove(path) {
            Some(record) => vec![(path.to_path_buf(), Some(record))],
            None => Undo::new(),
        }
    }

    fn delete_subtree(&mut self, folder: &Path) -> Undo {
        let doomed: Vec<PathBuf> = self
            .records
            .keys()
            .filter(|key| key.starts_with(folder))
            .cloned()
            .collect();
        doomed
            .into_iter()
            .filter_map(|key| {
                let record = self.records.remove(&key)?;
                Some((key, Some(record)))
            })
            .collect()
    }

    fn records_under(&self, folder: &Path) -> Vec<(PathBuf, PreviewRecord)> {
        self.records
            .iter()
            .filter(|(key, _)| key.starts_with(folder))
            .map(|(key, record)| (key.clone(), record.clone()))
            .collect()
    }

    fn size_bytes(&self) -> u64 {
        self.records
            .iter()
            .map(|(key, record)| {
                key.as_os_str().len() as u64 + TIMESTAMP_WIDTH + record.preview.len() as u64
            })
            .sum()
    }

    fn clear(&mut self) -> Undo {
        std::mem::take(&mut self.records)
            .into_iter()
            .map(|(key, record)| (key, Some(record)))
            .collect()
    }

    /// Puts back the prior values recorded in `undo`.
    fn revert(&mut self, undo: Undo) {
        for (key, prior) in undo.into_iter().rev() {
            match prior {
                Some(record) => {
                    self.records.insert(key, record);
                }
                None => {
                    self.records.remove(&key);
                }
            }
        }
    }
}

fn poisoned() -> CoreError {
    CoreError::StorageUnavailable("preview cache lock poisoned".to_string())
}

/// In-memory preview store. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryPreviewStore {
    records: RwLock<RecordMap>,
}

impl MemoryPreviewStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached records.
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> CoreResult<RwLockReadGuard<'_, RecordMap>> {
        self.records.read().map_err(|_| poisoned())
    }

    fn write(&self) -> CoreResult<RwLockWriteGuard<'_, RecordMap>> {
        self.records.write().map_err(|_| poisoned())
    }
}

impl PreviewStore for MemoryPreviewStore {
    fn lookup(&self, path: &Path, current_modified: SystemTime) -> CoreResult<CacheLookup> {
        Ok(self.read()?.lookup(path, current_modified))
    }

    fn put(&self, path: &Path, modified_at: SystemTime, preview: &str) -> CoreResult<()> {
        self.write()?.put(path, modified_at, preview);
        Ok(())
    }

    fn move_key(&self, old: &Path, new: &Path) -> CoreResult<()> {
        self.write()?.move_key(old, new);
        Ok(())
    }

    fn move_subtree(&self, old: &Path, new: &Path) -> CoreResult<()> {
        self.write()?.move_subtree(old, new);
        Ok(())
    }

    fn delete(&self, path: &Path) -> CoreResult<()> {
        self.write()?.delete(path);
        Ok(())
    }

    fn delete_subtree(&self, folder: &Path) -> CoreResult<()> {
        self.write()?.delete_subtree(folder);
        Ok(())
    }

    fn records_under(&self, folder: &Path) -> CoreResult<Vec<(PathBuf, PreviewRecord)>> {
        Ok(self.read()?.records_under(folder))
    }

    fn size_bytes(&self) -> CoreResult<u64> {
        Ok(self.read()?.size_bytes())
    }

    fn clear(&self) -> CoreResult<()> {
        self.write()?.clear();
        Ok(())
    }
}

/// On-disk layout of the JSON document, as read back.
#[derive(Debug, Deserialize)]
struct CacheDocument {
    version: u32,
    #[serde(default)]
    records: BTreeMap<PathBuf, PreviewRecord>,
}

/// On-disk layout of the JSON document, as written.
#[derive(Serialize)]
struct CacheDocumentRef<'a> {
    version: u32,
    records: BTreeMap<&'a str, &'a PreviewRecord>,
}

/// Preview store persisted as a JSON document.
///
/// Records live in memory behind a lock. Each mutation is applied in
/// memory, then the document is rewritten by writing a sibling temp file
/// and renaming it over the target. Mutations are serialized by a separate
/// persist lock, so lookups keep going while the file is written. If the
/// write fails, the entries the mutation touched are reverted.
///
/// Paths that are not valid UTF-8 are cached for the life of the process
/// but left out of the document.
#[derive(Debug)]
pub struct JsonPreviewStore {
    path: PathBuf,
    records: RwLock<RecordMap>,
    persist_lock: Mutex<()>,
}

impl JsonPreviewStore {
    /// Opens the store at `path`. A missing file yields an empty store.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StorageUnavailable`] if the file exists but
    /// cannot be read or is not a valid cache document.
    pub fn open(path: &Path) -> CoreResult<Self> {
        let records = match std::fs::read(path) {
            Ok(bytes) => {
                let document: CacheDocument = serde_json::from_slice(&bytes).map_err(|e| {
                    CoreError::StorageUnavailable(format!("{}: {e}", path.display()))
                })?;
                if document.version == FORMAT_VERSION {
                    document.records
                } else {
                    tracing::info!(
                        found = document.version,
                        expected = FORMAT_VERSION,
                        "discarding preview cache with unknown version"
                    );
                    BTreeMap::new()
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(CoreError::StorageUnavailable(format!(
                    "{}: {e}",
                    path.display()
                )))
            }
        };

        tracing::debug!(path = %path.display(), records = records.len(), "preview cache opened");
        Ok(Self {
            path: path.to_path_buf(),
            records: RwLock::new(RecordMap { records }),
            persist_lock: Mutex::new(()),
        })
    }

    /// Returns the location of the JSON document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of cached records.
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> CoreResult<RwLockReadGuard<'_, RecordMap>> {
        self.records.read().map_err(|_| poisoned())
    }

    fn write(&self) -> CoreResult<RwLockWriteGuard<'_, RecordMap>> {
        self.records.write().map_err(|_| poisoned())
    }

    /// Applies `change` and persists the result, reverting it on failure.
    fn mutate(&self, change: impl FnOnce(&mut RecordMap) -> Undo) -> CoreResult<()> {
        let _persisting = self.persist_lock.lock().map_err(|_| poisoned())?;

        let undo = change(&mut *self.write()?);
        if undo.is_empty() {
            return Ok(());
        }

        let persisted = self.encode().and_then(|json| self.write_document(&json));
        if let Err(e) = persisted {
            self.write()?.revert(undo);
            return Err(e);
        }
        Ok(())
    }

    fn unavailable(&self, e: &dyn std::fmt::Display) -> CoreError {
        CoreError::StorageUnavailable(format!("{}: {e}", self.path.display()))
    }

    fn encode(&self) -> CoreResult<Vec<u8>> {
        let map = self.read()?;
        let mut records = BTreeMap::new();
        for (key, record) in &map.records {
            match key.to_str() {
                Some(key) => {
                    records.insert(key, record);
                }
                None => {
                    tracing::debug!(path = %key.display(), "not persisting non-UTF-8 preview key");
                }
            }
        }
        let document = CacheDocumentRef {
            version: FORMAT_VERSION,
            records,
        };
        serde_json::to_vec(&document).map_err(|e| self.unavailable(&e))
    }

    fn write_document(&self, json: &[u8]) -> CoreResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.unavailable(&e))?;
        }

        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);
        std::fs::write(&tmp_path, json).map_err(|e| self.unavailable(&e))?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| self.unavailable(&e))?;
        Ok(())
    }
}

impl PreviewStore for JsonPreviewStore {
    fn lookup(&self, path: &Path, current_modified: SystemTime) -> CoreResult<CacheLookup> {
        Ok(self.read()?.lookup(path, current_modified))
    }

    fn put(&self, path: &Path, modified_at: SystemTime, preview: &str) -> CoreResult<()> {
        self.mutate(|map| map.put(path, modified_at, preview))
    }

    fn move_key(&self, old: &Path, new: &Path) -> CoreResult<()> {
        self.mutate(|map| map.move_key(old, new))
    }

    fn move_subtree(&self, old: &Path, new: &Path) -> CoreResult<()> {
        self.mutate(|map| map.move_subtree(old, new))
    }

    fn delete(&self, path: &Path) -> CoreResult<()> {
        self.mutate(|map| map.delete(path))
    }

    fn delete_subtree(&self, folder: &Path) -> CoreResult<()> {
        self.mutate(|map| map.delete_subtree(folder))
    }

    fn records_under(&self, folder: &Path) -> CoreResult<Vec<(PathBuf, PreviewRecord)>> {
        Ok(self.read()?.records_under(folder))
    }

    fn size_bytes(&self) -> CoreResult<u64> {
        Ok(self.read()?.size_bytes())
    }

    fn clear(&self) -> CoreResult<()> {
        self.mutate(RecordMap::clear)
    }
}
