#![allow(dead_code)]

use image::{Rgba, RgbaImage};
use spritegen_core::io::{FileReader, FileWriter, RetryingFileStore};
use spritegen_core::model::{CompositeKey, GenerationRecord, SpriteElement};
use spritegen_core::watch::{CacheEntry, DependencyCache, RemovalCallback, RemovalReason};
use spritegen_core::Result;
use std::fs::File;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

pub fn element(name: &str, w: u32, h: u32, border: u32) -> SpriteElement {
    SpriteElement::new(name, RgbaImage::new(w, h), border)
}

pub fn write_png(path: &Path, w: u32, h: u32, color: [u8; 4]) {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).unwrap();
    }
    RgbaImage::from_pixel(w, h, Rgba(color)).save(path).unwrap();
}

/// Pushes the file's mtime forward so a metadata poll always sees a change.
pub fn bump_mtime(path: &Path) {
    let f = File::options().write(true).open(path).unwrap();
    f.set_modified(SystemTime::now() + Duration::from_secs(30)).unwrap();
}

/// Real file I/O that counts writes.
#[derive(Default)]
pub struct CountingStore {
    inner: RetryingFileStore,
    pub writes: AtomicUsize,
}

impl CountingStore {
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl FileReader for CountingStore {
    fn open(&self, path: &Path) -> Result<Vec<u8>> {
        self.inner.open(path)
    }
}

impl FileWriter for CountingStore {
    fn write(&self, bytes: &[u8], path: &Path) -> Result<String> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.write(bytes, path)
    }
}

/// Cache double that keeps every insert and never evicts on its own.
#[derive(Default)]
pub struct RecordingCache {
    pub inserts: Mutex<Vec<CacheEntry>>,
    pub removes: AtomicUsize,
}

impl RecordingCache {
    pub fn insert_count(&self) -> usize {
        self.inserts.lock().unwrap().len()
    }

    pub fn remove_count(&self) -> usize {
        self.removes.load(Ordering::SeqCst)
    }

    pub fn last_record(&self) -> Arc<GenerationRecord> {
        Arc::clone(&self.inserts.lock().unwrap().last().unwrap().record)
    }

    /// Fires the latest entry's callback as the cache subsystem would on eviction.
    pub fn evict_last(&self, reason: RemovalReason) {
        let (key, record, cb): (CompositeKey, Arc<GenerationRecord>, RemovalCallback) = {
            let v = self.inserts.lock().unwrap();
            let e = v.last().unwrap();
            (e.key.clone(), Arc::clone(&e.record), Arc::clone(&e.on_removed))
        };
        cb(&key, record, reason);
    }
}

impl DependencyCache for RecordingCache {
    fn insert(&self, entry: CacheEntry) {
        self.inserts.lock().unwrap().push(entry);
    }

    fn remove(&self, _key: &CompositeKey) -> Option<Arc<GenerationRecord>> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        None
    }

    fn get(&self, key: &CompositeKey) -> Option<Arc<GenerationRecord>> {
        self.inserts
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|e| &e.key == key)
            .map(|e| Arc::clone(&e.record))
    }
}
