use crate::error::Result;
use crate::intake::rescan;
use crate::io::{FileReader, FileWriter};
use crate::model::{CompositeKey, GenerationRecord, SheetStats};
use crate::pipeline::build_from_descriptors;
use crate::watch::{
    CacheEntry, DependencyCache, Expiration, Priority, RemovalReason, WatchOutcome,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::{debug, error, info, instrument, warn};

/// Settings applied to every generation and cache registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneratorOptions {
    pub border_width: u32,
    pub expiration: Expiration,
    pub priority: Priority,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            border_width: 0,
            expiration: Expiration::Never,
            priority: Priority::Normal,
        }
    }
}

/// Result of one completed generation.
#[derive(Debug, Clone)]
pub struct GenerationOutput {
    pub key: CompositeKey,
    /// Fingerprint of the composite bytes, as embedded in the stylesheet URLs.
    pub fingerprint: String,
    pub stats: SheetStats,
}

/// Builds sprites and keeps them current.
///
/// Per key it is either unregistered or monitoring. `generate` moves a key to monitoring;
/// evictions rebuild (dependency changed) or re-register (underused / expired) it;
/// `remove` moves it back to unregistered. Work for one key is serialized.
pub struct SpriteGenerator {
    cache: Arc<dyn DependencyCache>,
    reader: Arc<dyn FileReader>,
    writer: Arc<dyn FileWriter>,
    options: GeneratorOptions,
    monitored: Mutex<HashSet<CompositeKey>>,
    key_locks: Mutex<HashMap<CompositeKey, Arc<Mutex<()>>>>,
    this: Weak<SpriteGenerator>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl SpriteGenerator {
    pub fn new(
        cache: Arc<dyn DependencyCache>,
        reader: Arc<dyn FileReader>,
        writer: Arc<dyn FileWriter>,
        options: GeneratorOptions,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            cache,
            reader,
            writer,
            options,
            monitored: Mutex::new(HashSet::new()),
            key_locks: Mutex::new(HashMap::new()),
            this: this.clone(),
        })
    }

    pub fn options(&self) -> GeneratorOptions {
        self.options
    }

    fn key_lock(&self, key: &CompositeKey) -> Arc<Mutex<()>> {
        Arc::clone(lock(&self.key_locks).entry(key.clone()).or_default())
    }

    pub fn is_monitoring(&self, key: &CompositeKey) -> bool {
        lock(&self.monitored).contains(key)
    }

    /// Record currently registered for `key`, if any.
    pub fn current(&self, key: &CompositeKey) -> Option<Arc<GenerationRecord>> {
        self.cache.get(key)
    }

    #[instrument(skip_all, fields(key = %record.key()))]
    /// Builds the sprite, writes image then stylesheet, and starts monitoring its dependencies.
    pub fn generate(&self, record: Arc<GenerationRecord>) -> Result<GenerationOutput> {
        let key = record.key();
        let key_lock = self.key_lock(&key);
        let _guard = lock(&*key_lock);
        lock(&self.monitored).insert(key.clone());
        let res = self.generate_locked(record);
        if res.is_err() {
            lock(&self.monitored).remove(&key);
        }
        res
    }

    /// Builds and writes the outputs without registering anything.
    pub fn render(&self, record: &GenerationRecord) -> Result<GenerationOutput> {
        let sheet =
            build_from_descriptors(&record.images, &*self.reader, self.options.border_width)?;
        let fingerprint = self.writer.write(&sheet.png, &record.image_path)?;
        let css = sheet.stylesheet(&record.url, &fingerprint);
        self.writer.write(css.as_bytes(), &record.css_path)?;
        let stats = sheet.stats();
        info!(
            image = %record.image_path.display(),
            css = %record.css_path.display(),
            %fingerprint,
            "{}",
            stats.summary()
        );
        Ok(GenerationOutput {
            key: record.key(),
            fingerprint,
            stats,
        })
    }

    fn generate_locked(&self, record: Arc<GenerationRecord>) -> Result<GenerationOutput> {
        let out = self.render(&record)?;
        self.register(record);
        Ok(out)
    }

    /// Inserts the record with its dependency set and eviction handler.
    pub fn register(&self, record: Arc<GenerationRecord>) {
        let this = self.this.clone();
        let entry = CacheEntry {
            key: record.key(),
            dependencies: record.dependencies(),
            record,
            expiration: self.options.expiration,
            priority: self.options.priority,
            on_removed: Arc::new(move |key, record, reason| {
                if let Some(generator) = this.upgrade() {
                    generator.on_removed(key, record, reason);
                }
            }),
        };
        self.cache.insert(entry);
    }

    /// Stops monitoring `key`. Returns false if it was not monitored.
    pub fn remove(&self, key: &CompositeKey) -> bool {
        let key_lock = self.key_lock(key);
        let _guard = lock(&*key_lock);
        let was_monitored = lock(&self.monitored).remove(key);
        self.cache.remove(key);
        if was_monitored {
            debug!(%key, "monitoring stopped");
        }
        was_monitored
    }

    /// Eviction handler bound to every registered entry.
    pub fn on_removed(
        &self,
        key: &CompositeKey,
        record: Arc<GenerationRecord>,
        reason: RemovalReason,
    ) {
        let outcome = WatchOutcome::from(reason);
        debug!(%key, ?reason, ?outcome, "cache entry evicted");
        if outcome == WatchOutcome::Stop {
            return;
        }

        let key_lock = self.key_lock(key);
        let _guard = lock(&*key_lock);
        if !self.is_monitoring(key) {
            debug!(%key, "eviction after removal ignored");
            return;
        }
        match outcome {
            WatchOutcome::Rebuild => {
                let next = match rescan(&record) {
                    Ok(Some(updated)) => Arc::new(updated),
                    Ok(None) => Arc::clone(&record),
                    Err(e) => {
                        error!(%key, error = %e, "directory rescan failed");
                        self.register(record);
                        return;
                    }
                };
                if let Err(e) = self.generate_locked(Arc::clone(&next)) {
                    // Keep watching so the next change retries the build.
                    error!(%key, error = %e, "sprite rebuild failed");
                    self.register(next);
                }
            }
            WatchOutcome::Rearm => self.register(record),
            WatchOutcome::Stop => {}
        }
    }
}

impl Drop for SpriteGenerator {
    fn drop(&mut self) {
        let keys: Vec<CompositeKey> = lock(&self.monitored).drain().collect();
        if !keys.is_empty() {
            warn!(count = keys.len(), "generator dropped while monitoring");
        }
        for k in keys {
            self.cache.remove(&k);
        }
    }
}
