//! Dependency-tracked cache of generation records.
//!
//! An entry is evicted when a watched file changes, when it expires, when the host trims
//! the cache, or when it is removed explicitly. Every eviction reports a `RemovalReason`
//! to the entry's callback; `WatchOutcome` turns that reason into the action the owner takes.

use crate::model::{CompositeKey, GenerationRecord};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, info, trace};

/// Why an entry left the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemovalReason {
    /// A watched file's content or timestamp changed.
    DependencyChanged,
    /// Trimmed to free resources.
    Underused,
    /// Expiration window elapsed.
    Expired,
    /// Removed explicitly by its owner.
    Removed,
}

/// What the owner of an evicted entry does next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
    /// Outputs are stale: regenerate and register again.
    Rebuild,
    /// Outputs are still valid: register the same record again without any file I/O.
    Rearm,
    /// Stop watching.
    Stop,
}

impl From<RemovalReason> for WatchOutcome {
    fn from(r: RemovalReason) -> Self {
        match r {
            RemovalReason::DependencyChanged => WatchOutcome::Rebuild,
            RemovalReason::Underused | RemovalReason::Expired => WatchOutcome::Rearm,
            RemovalReason::Removed => WatchOutcome::Stop,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiration {
    Never,
    /// Expires this long after the last `get` (or insert).
    Sliding(Duration),
    /// Expires this long after insert.
    Absolute(Duration),
}

/// Eviction order under `trim`: lower priorities go first; `NotRemovable` is never trimmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Low,
    Normal,
    High,
    NotRemovable,
}

pub type RemovalCallback =
    Arc<dyn Fn(&CompositeKey, Arc<GenerationRecord>, RemovalReason) + Send + Sync>;

pub struct CacheEntry {
    pub key: CompositeKey,
    pub record: Arc<GenerationRecord>,
    pub dependencies: Vec<PathBuf>,
    pub expiration: Expiration,
    pub priority: Priority,
    pub on_removed: RemovalCallback,
}

/// Cache service that keeps one record per key and reports evictions to the entry's callback.
///
/// Inserting for a key that is already present replaces the entry without firing the
/// old entry's callback. Callbacks may run on any thread and may call back into the cache.
pub trait DependencyCache: Send + Sync {
    fn insert(&self, entry: CacheEntry);
    /// Removes the entry and reports `RemovalReason::Removed`. Returns `None` if absent.
    fn remove(&self, key: &CompositeKey) -> Option<Arc<GenerationRecord>>;
    fn get(&self, key: &CompositeKey) -> Option<Arc<GenerationRecord>>;
}

/// Last observed state of one watched path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeMarker {
    Missing,
    Present {
        modified: Option<SystemTime>,
        len: u64,
    },
}

impl ChangeMarker {
    pub fn observe(path: &Path) -> Self {
        match fs::metadata(path) {
            Ok(m) => ChangeMarker::Present {
                modified: m.modified().ok(),
                len: m.len(),
            },
            Err(_) => ChangeMarker::Missing,
        }
    }
}

/// Watches a fixed dependency set of one key by comparing change markers.
pub struct DependencyWatcher {
    key: CompositeKey,
    dependencies: Vec<PathBuf>,
    markers: Vec<ChangeMarker>,
    callback: RemovalCallback,
}

impl DependencyWatcher {
    /// Snapshots the current markers of every dependency.
    pub fn new(key: CompositeKey, dependencies: Vec<PathBuf>, callback: RemovalCallback) -> Self {
        let markers = dependencies.iter().map(|p| ChangeMarker::observe(p)).collect();
        Self {
            key,
            dependencies,
            markers,
            callback,
        }
    }

    pub fn key(&self) -> &CompositeKey {
        &self.key
    }

    pub fn dependencies(&self) -> &[PathBuf] {
        &self.dependencies
    }

    /// Dependencies whose marker differs from the snapshot.
    pub fn changed_paths(&self) -> Vec<&Path> {
        self.dependencies
            .iter()
            .zip(&self.markers)
            .filter(|(p, m)| ChangeMarker::observe(p) != **m)
            .map(|(p, _)| p.as_path())
            .collect()
    }

    pub fn has_changed(&self) -> bool {
        self.dependencies
            .iter()
            .zip(&self.markers)
            .any(|(p, m)| ChangeMarker::observe(p) != *m)
    }

    pub fn notify(&self, record: Arc<GenerationRecord>, reason: RemovalReason) {
        (self.callback)(&self.key, record, reason);
    }
}

struct Slot {
    watcher: DependencyWatcher,
    record: Arc<GenerationRecord>,
    expiration: Expiration,
    priority: Priority,
    inserted: Instant,
    last_access: Instant,
}

impl Slot {
    fn is_expired(&self, now: Instant) -> bool {
        match self.expiration {
            Expiration::Never => false,
            Expiration::Sliding(d) => now.duration_since(self.last_access) >= d,
            Expiration::Absolute(d) => now.duration_since(self.inserted) >= d,
        }
    }
}

/// In-process `DependencyCache` that detects changes by polling file metadata.
///
/// Call `poll` periodically, or let `spawn_poller` do it on a background thread.
#[derive(Default)]
pub struct FileWatchCache {
    slots: Mutex<HashMap<CompositeKey, Slot>>,
}

impl FileWatchCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CompositeKey, Slot>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn contains(&self, key: &CompositeKey) -> bool {
        self.lock().contains_key(key)
    }

    /// Evicts changed and expired entries, then reports them. Returns the number evicted.
    pub fn poll(&self) -> usize {
        let now = Instant::now();
        let evicted: Vec<(Slot, RemovalReason)> = {
            let mut slots = self.lock();
            let mut due: Vec<(CompositeKey, RemovalReason)> = Vec::new();
            for (key, slot) in slots.iter() {
                let changed = slot.watcher.changed_paths();
                if !changed.is_empty() {
                    debug!(%key, ?changed, "dependency changed");
                    due.push((key.clone(), RemovalReason::DependencyChanged));
                } else if slot.is_expired(now) {
                    due.push((key.clone(), RemovalReason::Expired));
                }
            }
            due.into_iter()
                .filter_map(|(k, r)| slots.remove(&k).map(|s| (s, r)))
                .collect()
        };
        let n = evicted.len();
        for (slot, reason) in evicted {
            slot.watcher.notify(slot.record, reason);
        }
        if n > 0 {
            trace!(evicted = n, "poll finished");
        }
        n
    }

    /// Evicts up to `count` removable entries as `Underused`, lowest priority and least
    /// recently used first. An entry whose dependencies changed since the last `poll` is
    /// reported as `DependencyChanged` instead, so the change is not lost. Returns the number
    /// evicted.
    pub fn trim(&self, count: usize) -> usize {
        let evicted: Vec<(Slot, RemovalReason)> = {
            let mut slots = self.lock();
            let mut candidates: Vec<(Priority, Instant, CompositeKey)> = slots
                .iter()
                .filter(|(_, s)| s.priority != Priority::NotRemovable)
                .map(|(k, s)| (s.priority, s.last_access, k.clone()))
                .collect();
            candidates.sort();
            candidates
                .into_iter()
                .take(count)
                .filter_map(|(_, _, k)| slots.remove(&k))
                .map(|slot| {
                    let reason = if slot.watcher.has_changed() {
                        RemovalReason::DependencyChanged
                    } else {
                        RemovalReason::Underused
                    };
                    (slot, reason)
                })
                .collect()
        };
        let n = evicted.len();
        for (slot, reason) in evicted {
            slot.watcher.notify(slot.record, reason);
        }
        n
    }

    /// Runs `poll` every `interval` on a named background thread until the handle is stopped.
    pub fn spawn_poller(self: &Arc<Self>, interval: Duration) -> std::io::Result<PollerHandle> {
        let (tx, rx) = mpsc::channel::<()>();
        let cache = Arc::clone(self);
        let thread = thread::Builder::new()
            .name("spritegen-watch".into())
            .spawn(move || {
                loop {
                    match rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            cache.poll();
                        }
                        _ => break,
                    }
                }
                debug!("watch poller exited");
            })?;
        info!(interval_ms = interval.as_millis() as u64, "watch poller started");
        Ok(PollerHandle {
            stop: Some(tx),
            thread: Some(thread),
        })
    }
}

impl DependencyCache for FileWatchCache {
    fn insert(&self, entry: CacheEntry) {
        let now = Instant::now();
        let watcher =
            DependencyWatcher::new(entry.key.clone(), entry.dependencies, entry.on_removed);
        let slot = Slot {
            watcher,
            record: entry.record,
            expiration: entry.expiration,
            priority: entry.priority,
            inserted: now,
            last_access: now,
        };
        if self.lock().insert(entry.key.clone(), slot).is_some() {
            trace!(key = %entry.key, "replaced cache entry");
        }
    }

    fn remove(&self, key: &CompositeKey) -> Option<Arc<GenerationRecord>> {
        let slot = self.lock().remove(key)?;
        let record = Arc::clone(&slot.record);
        slot.watcher.notify(slot.record, RemovalReason::Removed);
        Some(record)
    }

    fn get(&self, key: &CompositeKey) -> Option<Arc<GenerationRecord>> {
        let mut slots = self.lock();
        let slot = slots.get_mut(key)?;
        slot.last_access = Instant::now();
        Some(Arc::clone(&slot.record))
    }
}

/// Owns the poller thread; stopping or dropping it ends polling.
pub struct PollerHandle {
    stop: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl PollerHandle {
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(tx) = self.stop.take() {
            let _ = tx.send(());
        }
        if let Some(t) = self.thread.take() {
            // Joining from the poller itself (a callback stopping the service) would deadlock.
            if t.thread().id() != thread::current().id() {
                let _ = t.join();
            }
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
