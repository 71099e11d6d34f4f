use crate::config::{GroupConfig, SpriteConfig};
use crate::error::Result;
use crate::generator::{GenerationOutput, GeneratorOptions, SpriteGenerator};
use crate::intake::{group_descriptors, resolve_rules};
use crate::io::{PathResolver, RetryingFileStore, RootedPathResolver};
use crate::model::{CompositeKey, GenerationRecord};
use crate::watch::{Expiration, FileWatchCache, PollerHandle, Priority};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Resolves a configured group into the record a generator works on.
pub fn group_record(group: &GroupConfig, resolver: &dyn PathResolver) -> Result<GenerationRecord> {
    let (images, watch_dirs) = group_descriptors(group, resolver)?;
    let explicit = group
        .images
        .iter()
        .map(|e| e.name.as_str())
        .collect::<HashSet<_>>()
        .len();
    Ok(GenerationRecord::new(
        images,
        resolver.resolve(&group.image),
        resolver.resolve(&group.css),
        group.serving_url(),
    )
    .with_watch_paths(watch_dirs)
    .with_directories(resolve_rules(&group.directories, resolver), explicit))
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Owns every configured sprite group for the life of the host process.
///
/// The host calls `start` once at startup and `stop` from its shutdown hook. `stop` runs its
/// teardown exactly once no matter how many callers race on it; dropping the service stops it too.
pub struct SpriteService {
    config: SpriteConfig,
    resolver: Arc<dyn PathResolver>,
    generator: Arc<SpriteGenerator>,
    watch: Option<Arc<FileWatchCache>>,
    poller: Mutex<Option<PollerHandle>>,
    keys: Mutex<Vec<CompositeKey>>,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl SpriteService {
    /// Service over a caller-supplied generator. No poller is started; the generator's
    /// cache is responsible for reporting evictions.
    pub fn new(
        config: SpriteConfig,
        resolver: Arc<dyn PathResolver>,
        generator: Arc<SpriteGenerator>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            resolver,
            generator,
            watch: None,
            poller: Mutex::new(None),
            keys: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        })
    }

    /// Service backed by a polling `FileWatchCache` and retrying file I/O below `config.root`.
    pub fn with_file_watch(config: SpriteConfig) -> Result<Self> {
        let cache = Arc::new(FileWatchCache::new());
        let store = Arc::new(RetryingFileStore::new(config.retry.into()));
        let options = GeneratorOptions {
            border_width: config.border_width,
            expiration: config
                .expiration()
                .map(Expiration::Sliding)
                .unwrap_or(Expiration::Never),
            priority: Priority::Normal,
        };
        let generator = SpriteGenerator::new(cache.clone(), store.clone(), store, options);
        let resolver = Arc::new(RootedPathResolver::new(config.root.clone()));
        let mut service = Self::new(config, resolver, generator)?;
        service.watch = Some(cache);
        Ok(service)
    }

    pub fn config(&self) -> &SpriteConfig {
        &self.config
    }

    pub fn generator(&self) -> &Arc<SpriteGenerator> {
        &self.generator
    }

    /// The polling cache, when built with `with_file_watch`.
    pub fn watch_cache(&self) -> Option<&Arc<FileWatchCache>> {
        self.watch.as_ref()
    }

    /// Keys of every group that has been started or rendered.
    pub fn keys(&self) -> Vec<CompositeKey> {
        lock(&self.keys).clone()
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::Acquire) && !self.stopped.load(Ordering::Acquire)
    }

    /// Generates every group and starts monitoring them.
    ///
    /// All groups are attempted; the first failure is returned after the rest have run.
    pub fn start(&self) -> Result<Vec<GenerationOutput>> {
        if self.stopped.load(Ordering::Acquire) {
            warn!("start called on a stopped sprite service");
            return Ok(Vec::new());
        }
        if self.started.swap(true, Ordering::AcqRel) {
            debug!("sprite service already started");
            return Ok(Vec::new());
        }
        info!(groups = self.config.groups.len(), "starting sprite service");
        let res = self.run_groups(|record| self.generator.generate(record));
        if let Some(cache) = &self.watch {
            let handle = cache.spawn_poller(self.config.effective_poll_interval())?;
            *lock(&self.poller) = Some(handle);
        }
        res
    }

    /// Builds and writes every group once, without monitoring.
    pub fn render_all(&self) -> Result<Vec<GenerationOutput>> {
        self.run_groups(|record| self.generator.render(&record))
    }

    fn run_groups<F>(&self, f: F) -> Result<Vec<GenerationOutput>>
    where
        F: Fn(Arc<GenerationRecord>) -> Result<GenerationOutput> + Sync,
    {
        let run = |group: &GroupConfig| -> Result<GenerationOutput> {
            let record = Arc::new(group_record(group, &*self.resolver)?);
            {
                let mut keys = lock(&self.keys);
                let key = record.key();
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
            f(record).inspect_err(|e| {
                error!(group = %group.name, error = %e, "sprite generation failed");
            })
        };

        #[cfg(feature = "parallel")]
        let results: Vec<Result<GenerationOutput>> = if self.config.parallel {
            self.config.groups.par_iter().map(run).collect()
        } else {
            self.config.groups.iter().map(run).collect()
        };
        #[cfg(not(feature = "parallel"))]
        let results: Vec<Result<GenerationOutput>> =
            self.config.groups.iter().map(run).collect();

        let mut outputs = Vec::with_capacity(results.len());
        let mut first_err = None;
        for r in results {
            match r {
                Ok(o) => outputs.push(o),
                Err(e) => {
                    first_err.get_or_insert(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(outputs),
        }
    }

    /// Stops monitoring every group and the poller. Returns true for the one call that
    /// performed the teardown.
    pub fn stop(&self) -> bool {
        if self
            .stopped
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("duplicate stop ignored");
            return false;
        }
        let keys = std::mem::take(&mut *lock(&self.keys));
        for key in &keys {
            self.generator.remove(key);
        }
        if let Some(handle) = lock(&self.poller).take() {
            handle.stop();
        }
        info!(groups = keys.len(), "sprite service stopped");
        true
    }
}

impl Drop for SpriteService {
    fn drop(&mut self) {
        self.stop();
    }
}
