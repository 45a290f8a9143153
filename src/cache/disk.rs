//! Persistent cache tier: one JSON file per key.
//!
//! Writes go to a uniquely named tmp file which is then renamed over the
//! target, so a crash mid-write never leaves a truncated entry behind.
//! Unreadable or unparsable files surface as [`OntomapError::Cache`]; the
//! manager logs those and treats them as misses.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use serde::Deserialize;

use super::CacheKey;
use super::manager::CacheEntry;
use crate::{OntomapError, Result};

const ENTRY_EXTENSION: &str = "json";

pub(crate) struct DiskStore {
    dir: PathBuf,
    tmp_seq: AtomicU64,
}

impl DiskStore {
    /// Open (creating if needed) a cache directory.
    pub(crate) fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|e| {
            OntomapError::Cache(format!("failed to create cache dir {}: {e}", dir.display()))
        })?;
        Ok(Self {
            dir: dir.to_path_buf(),
            tmp_seq: AtomicU64::new(0),
        })
    }

    pub(crate) fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{key}.{ENTRY_EXTENSION}"))
    }

    /// Read an entry. `Ok(None)` when absent.
    pub(crate) fn load(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let path = self.path_for(key);
        let content = match fs::read(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(OntomapError::Cache(format!(
                    "failed to read {}: {e}",
                    path.display()
                )));
            }
        };
        serde_json::from_slice(&content)
            .map(Some)
            .map_err(|e| OntomapError::Cache(format!("corrupt entry {}: {e}", path.display())))
    }

    /// Write an entry atomically.
    pub(crate) fn save(&self, entry: &CacheEntry) -> Result<()> {
        let path = self.path_for(&entry.key);
        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        let tmp_path = self
            .dir
            .join(format!("{}.{}.{seq}.tmp", entry.key, std::process::id()));

        let json = serde_json::to_vec(entry)
            .map_err(|e| OntomapError::Cache(format!("failed to serialize entry: {e}")))?;
        fs::write(&tmp_path, &json).map_err(|e| {
            OntomapError::Cache(format!("failed to write {}: {e}", tmp_path.display()))
        })?;
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            OntomapError::Cache(format!(
                "failed to rename {} → {}: {e}",
                tmp_path.display(),
                path.display()
            ))
        })
    }

    /// Remove an entry. Returns whether a file was deleted.
    pub(crate) fn remove(&self, key: &CacheKey) -> Result<bool> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(OntomapError::Cache(format!(
                "failed to remove {}: {e}",
                path.display()
            ))),
        }
    }

    /// Number of entry files currently on disk.
    pub(crate) fn len(&self) -> Result<usize> {
        Ok(self.entry_files()?.len())
    }

    /// Remove every entry file. Returns how many were deleted.
    pub(crate) fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        for (path, _) in self.entry_files()? {
            fs::remove_file(&path).map_err(|e| {
                OntomapError::Cache(format!("failed to remove {}: {e}", path.display()))
            })?;
            removed += 1;
        }
        Ok(removed)
    }

    /// Delete oldest entries until the directory holds at most `max_bytes`.
    ///
    /// Age is the entry's own `stored_at`, read back from each file only
    /// once the bound is exceeded. Unreadable files go first. Returns how
    /// many were evicted.
    pub(crate) fn evict_to(&self, max_bytes: u64) -> Result<usize> {
        let files = self.entry_files()?;
        let mut total: u64 = files.iter().map(|(_, size)| size).sum();
        if total <= max_bytes {
            return Ok(0);
        }

        let mut aged: Vec<(Option<SystemTime>, PathBuf, u64)> = files
            .into_iter()
            .map(|(path, size)| (stored_at(&path), path, size))
            .collect();
        aged.sort();

        let mut evicted = 0;
        for (_, path, size) in aged {
            if total <= max_bytes {
                break;
            }
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(OntomapError::Cache(format!(
                        "failed to evict {}: {e}",
                        path.display()
                    )));
                }
            }
            total = total.saturating_sub(size);
            evicted += 1;
        }
        Ok(evicted)
    }

    /// Entry files with their size.
    fn entry_files(&self) -> Result<Vec<(PathBuf, u64)>> {
        let read_dir = fs::read_dir(&self.dir).map_err(|e| {
            OntomapError::Cache(format!("failed to list {}: {e}", self.dir.display()))
        })?;

        let mut files = Vec::new();
        for dir_entry in read_dir.flatten() {
            let path = dir_entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            // Raced with a concurrent delete; skip.
            let Ok(meta) = dir_entry.metadata() else {
                continue;
            };
            files.push((path, meta.len()));
        }
        Ok(files)
    }
}

#[derive(Deserialize)]
struct StoredAt {
    stored_at: SystemTime,
}

/// `stored_at` of an entry file; `None` when it cannot be read or parsed.
fn stored_at(path: &Path) -> Option<SystemTime> {
    let content = fs::read(path).ok()?;
    serde_json::from_slice::<StoredAt>(&content)
        .ok()
        .map(|s| s.stored_at)
}
