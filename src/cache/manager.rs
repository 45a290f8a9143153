//! Two-tier (memory + optional disk) cache for service search results.
//!
//! # Lookup path
//!
//! `get` checks the memory tier first, then the disk tier when persistence
//! is enabled. A disk hit is promoted into memory. Expired entries are
//! purged lazily, at the moment a read finds them.
//!
//! # Eviction
//!
//! Both tiers are bounded by `max_size_bytes` (serialized payload size).
//! When a write pushes a tier over the bound, entries are removed oldest
//! `stored_at` first until the tier fits again.
//!
//! # Failure policy
//!
//! Disk problems (unwritable directory, corrupt file) never propagate. They
//! are logged, counted in [`CacheStats::errors`], and the read degrades to a
//! miss. A cache that cannot create its directory falls back to memory only.
//!
//! # Blocking
//!
//! The API is synchronous and the disk tier uses plain `std::fs`, even when
//! called from an async search. Entries are single small JSON files, so a
//! read or write costs about as much as the `Mutex` around the memory tier.
//! Eviction is the exception: it lists the directory and reads each entry's
//! `stored_at`, and only runs once a write pushes the tier over its bound.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::CacheKey;
use super::disk::DiskStore;
use crate::telemetry;
use crate::types::ConceptResult;

/// Configuration for the result cache.
///
/// ```rust
/// # use ontomap::cache::CacheConfig;
/// # use std::time::Duration;
/// let config = CacheConfig::new()
///     .ttl(Duration::from_secs(3600))
///     .max_size_bytes(10 * 1024 * 1024);
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// How long an entry stays valid. Zero means entries never expire.
    /// Default: 24 hours.
    pub ttl: Duration,
    /// Size bound per tier in bytes. Zero means unbounded. Default: 100 MB.
    pub max_size_bytes: u64,
    /// Directory for the disk tier; `None` keeps the cache in memory only.
    pub persist_dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(86_400),
            max_size_bytes: 100 * 1024 * 1024,
            persist_dir: None,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn max_size_bytes(mut self, bytes: u64) -> Self {
        self.max_size_bytes = bytes;
        self
    }

    /// Enable the disk tier under `dir`.
    pub fn persist_to(mut self, dir: impl Into<PathBuf>) -> Self {
        self.persist_dir = Some(dir.into());
        self
    }
}

/// A stored search result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub service: String,
    pub payload: Vec<ConceptResult>,
    pub stored_at: SystemTime,
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn is_expired(&self, now: SystemTime) -> bool {
        if self.ttl.is_zero() {
            return false;
        }
        // A clock that moved backwards leaves the entry valid.
        now.duration_since(self.stored_at)
            .map(|age| age > self.ttl)
            .unwrap_or(false)
    }
}

/// Counters reported by [`CacheManager::stats`].
///
/// Request counters (`hits`, `misses`, `sets`, `deletes`, `errors`,
/// `evictions`) live in the `CacheManager` instance and start at zero in
/// every process. `disk_entries` reflects the directory as it is now.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    pub errors: u64,
    pub evictions: u64,
    /// Entries currently held in memory.
    pub entries: usize,
    pub memory_bytes: u64,
    /// Entry files in the disk tier (0 when not persistent).
    pub disk_entries: usize,
    /// `hits / (hits + misses)`, or 0.0 before any lookup.
    pub hit_rate: f64,
    pub persistent: bool,
    pub ttl_secs: u64,
}

#[derive(Default)]
struct MemoryTier {
    entries: HashMap<CacheKey, Slot>,
    /// (stored_at, insertion sequence) → key; iteration order is eviction order.
    by_age: BTreeMap<(SystemTime, u64), CacheKey>,
    total_bytes: u64,
    next_seq: u64,
}

struct Slot {
    entry: CacheEntry,
    size: u64,
    seq: u64,
}

impl MemoryTier {
    fn insert(&mut self, entry: CacheEntry, size: u64) {
        self.remove(&entry.key);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.by_age.insert((entry.stored_at, seq), entry.key.clone());
        self.total_bytes += size;
        self.entries
            .insert(entry.key.clone(), Slot { entry, size, seq });
    }

    fn remove(&mut self, key: &CacheKey) -> bool {
        match self.entries.remove(key) {
            Some(slot) => {
                self.by_age.remove(&(slot.entry.stored_at, slot.seq));
                self.total_bytes = self.total_bytes.saturating_sub(slot.size);
                true
            }
            None => false,
        }
    }

    /// Pop oldest entries until `total_bytes <= max_bytes`.
    fn evict_to(&mut self, max_bytes: u64) -> usize {
        let mut evicted = 0;
        while self.total_bytes > max_bytes {
            let Some((_, key)) = self.by_age.pop_first() else {
                break;
            };
            if let Some(slot) = self.entries.remove(&key) {
                self.total_bytes = self.total_bytes.saturating_sub(slot.size);
                evicted += 1;
            }
        }
        evicted
    }
}

/// Thread-safe result cache shared by all service clients.
///
/// Keys are derived with [`CacheKey`], so callers pass the raw query,
/// ontology filter, and service name.
pub struct CacheManager {
    config: CacheConfig,
    memory: Mutex<MemoryTier>,
    disk: Option<DiskStore>,
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    errors: AtomicU64,
    evictions: AtomicU64,
}

impl CacheManager {
    /// Create a cache. If the disk directory cannot be created the cache
    /// runs memory-only and logs a warning.
    pub fn new(config: CacheConfig) -> Self {
        let disk = config
            .persist_dir
            .as_deref()
            .and_then(|dir| match DiskStore::open(dir) {
                Ok(store) => Some(store),
                Err(e) => {
                    warn!(error = %e, "persistent cache disabled");
                    None
                }
            });
        Self {
            config,
            memory: Mutex::new(MemoryTier::default()),
            disk,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sets: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Whether the disk tier is active.
    pub fn is_persistent(&self) -> bool {
        self.disk.is_some()
    }

    /// Look up a cached payload. Returns `None` on miss or expiry.
    pub fn get<S: AsRef<str>>(
        &self,
        query: &str,
        ontologies: &[S],
        service: &str,
    ) -> Option<Vec<ConceptResult>> {
        let key = CacheKey::new(query, ontologies, service);
        let now = SystemTime::now();

        let cached = {
            let mut memory = self.lock_memory();
            let lookup = memory
                .entries
                .get(&key)
                .map(|slot| (!slot.entry.is_expired(now)).then(|| slot.entry.payload.clone()));
            match lookup {
                Some(Some(payload)) => Some(payload),
                Some(None) => {
                    memory.remove(&key);
                    debug!(service, key = %key, "purged expired memory entry");
                    None
                }
                None => None,
            }
        };
        if let Some(payload) = cached {
            self.record_hit(service);
            return Some(payload);
        }

        if let Some(disk) = &self.disk {
            match disk.load(&key) {
                Ok(Some(entry)) if !entry.is_expired(now) => {
                    let payload = entry.payload.clone();
                    let size = payload_size(&payload);
                    let mut memory = self.lock_memory();
                    memory.insert(entry, size);
                    let evicted = self.bound_memory(&mut memory);
                    drop(memory);
                    self.record_evictions(evicted);
                    self.record_hit(service);
                    return Some(payload);
                }
                Ok(Some(_)) => {
                    debug!(service, key = %key, "purged expired disk entry");
                    if let Err(e) = disk.remove(&key) {
                        self.record_error(&e);
                    }
                }
                Ok(None) => {}
                Err(e) => self.record_error(&e),
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "service" => service.to_owned())
            .increment(1);
        None
    }

    /// Store a successful payload under (query, ontologies, service).
    pub fn set<S: AsRef<str>>(
        &self,
        query: &str,
        ontologies: &[S],
        service: &str,
        payload: Vec<ConceptResult>,
    ) {
        let entry = CacheEntry {
            key: CacheKey::new(query, ontologies, service),
            service: service.to_string(),
            payload,
            stored_at: SystemTime::now(),
            ttl: self.config.ttl,
        };
        self.store(entry);
    }

    fn store(&self, entry: CacheEntry) {
        let size = payload_size(&entry.payload);
        let service = entry.service.clone();

        if let Some(disk) = &self.disk {
            if let Err(e) = disk.save(&entry) {
                self.record_error(&e);
            } else if self.config.max_size_bytes > 0 {
                match disk.evict_to(self.config.max_size_bytes) {
                    Ok(n) => self.record_evictions(n),
                    Err(e) => self.record_error(&e),
                }
            }
        }

        let mut memory = self.lock_memory();
        memory.insert(entry, size);
        let evicted = self.bound_memory(&mut memory);
        drop(memory);
        self.record_evictions(evicted);
        self.sets.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(telemetry::CACHE_SETS_TOTAL, "service" => service).increment(1);
    }

    /// Remove one entry from both tiers. Returns whether anything was removed.
    pub fn delete<S: AsRef<str>>(&self, query: &str, ontologies: &[S], service: &str) -> bool {
        let key = CacheKey::new(query, ontologies, service);
        let mut deleted = self.lock_memory().remove(&key);
        if let Some(disk) = &self.disk {
            match disk.remove(&key) {
                Ok(removed) => deleted |= removed,
                Err(e) => self.record_error(&e),
            }
        }
        if deleted {
            self.deletes.fetch_add(1, Ordering::Relaxed);
        }
        deleted
    }

    /// Remove everything. Returns the number of entries removed across tiers.
    pub fn clear(&self) -> usize {
        let mut count = {
            let mut memory = self.lock_memory();
            let n = memory.entries.len();
            *memory = MemoryTier::default();
            n
        };
        if let Some(disk) = &self.disk {
            match disk.clear() {
                Ok(n) => count += n,
                Err(e) => self.record_error(&e),
            }
        }
        debug!(removed = count, "cache cleared");
        count
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let (entries, memory_bytes) = {
            let memory = self.lock_memory();
            (memory.entries.len(), memory.total_bytes)
        };
        let disk_entries = match &self.disk {
            Some(disk) => disk.len().unwrap_or_else(|e| {
                self.record_error(&e);
                0
            }),
            None => 0,
        };
        CacheStats {
            hits,
            misses,
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries,
            memory_bytes,
            disk_entries,
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
            persistent: self.disk.is_some(),
            ttl_secs: self.config.ttl.as_secs(),
        }
    }

    /// Directory of the disk tier, if active.
    pub fn persist_dir(&self) -> Option<&std::path::Path> {
        self.disk.as_ref().map(DiskStore::dir)
    }

    fn lock_memory(&self) -> std::sync::MutexGuard<'_, MemoryTier> {
        // A panic while holding the lock cannot leave the tier half-updated
        // in a way that breaks later reads, so keep serving.
        self.memory.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn bound_memory(&self, memory: &mut MemoryTier) -> usize {
        if self.config.max_size_bytes == 0 {
            return 0;
        }
        memory.evict_to(self.config.max_size_bytes)
    }

    fn record_hit(&self, service: &str) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(telemetry::CACHE_HITS_TOTAL, "service" => service.to_owned())
            .increment(1);
    }

    fn record_evictions(&self, n: usize) {
        if n > 0 {
            self.evictions.fetch_add(n as u64, Ordering::Relaxed);
            metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL).increment(n as u64);
            debug!(evicted = n, "cache size bound enforced");
        }
    }

    fn record_error(&self, error: &crate::OntomapError) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        warn!(error = %error, "cache error, treating as miss");
    }
}

/// Size charged against the bound for a payload.
fn payload_size(payload: &[ConceptResult]) -> u64 {
    serde_json::to_vec(payload)
        .map(|v| v.len() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, stored_at: SystemTime) -> CacheEntry {
        CacheEntry {
            key: CacheKey::new(key, &[] as &[&str], "ols"),
            service: "ols".into(),
            payload: vec![],
            stored_at,
            ttl: Duration::from_secs(10),
        }
    }

    #[test]
    fn zero_ttl_never_expires() {
        let mut e = entry("a", SystemTime::UNIX_EPOCH);
        e.ttl = Duration::ZERO;
        assert!(!e.is_expired(SystemTime::now()));
    }

    #[test]
    fn entry_expires_after_ttl() {
        let stored = SystemTime::now() - Duration::from_secs(11);
        assert!(entry("a", stored).is_expired(SystemTime::now()));
        assert!(!entry("a", SystemTime::now()).is_expired(SystemTime::now()));
    }

    #[test]
    fn memory_tier_evicts_oldest_first() {
        let base = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let mut tier = MemoryTier::default();
        // Inserted out of age order on purpose.
        tier.insert(entry("b", base + Duration::from_secs(2)), 10);
        tier.insert(entry("a", base + Duration::from_secs(1)), 10);
        tier.insert(entry("c", base + Duration::from_secs(3)), 10);

        assert_eq!(tier.evict_to(15), 2);
        assert_eq!(tier.total_bytes, 10);
        let remaining: Vec<_> = tier.entries.keys().cloned().collect();
        assert_eq!(remaining, vec![CacheKey::new("c", &[] as &[&str], "ols")]);
    }

    #[test]
    fn memory_tier_replace_adjusts_size() {
        let mut tier = MemoryTier::default();
        tier.insert(entry("a", SystemTime::now()), 10);
        tier.insert(entry("a", SystemTime::now()), 4);
        assert_eq!(tier.entries.len(), 1);
        assert_eq!(tier.by_age.len(), 1);
        assert_eq!(tier.total_bytes, 4);
    }
}
