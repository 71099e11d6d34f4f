//! File-system collaborators of the generation pipeline.
//!
//! - `PathResolver` turns virtual paths (`~/img/a.png`) into filesystem paths
//! - `FileReader` / `FileWriter` hide the bounded-retry policy for locked files
//! - `fingerprint` is the content hash appended to served URLs

use crate::error::{Result, SpriteError};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

pub trait PathResolver: Send + Sync {
    fn resolve(&self, virtual_path: &str) -> PathBuf;
}

pub trait FileReader: Send + Sync {
    fn open(&self, path: &Path) -> Result<Vec<u8>>;
}

/// Durable write that reports the content fingerprint of what was written.
pub trait FileWriter: Send + Sync {
    fn write(&self, bytes: &[u8], path: &Path) -> Result<String>;
}

/// Maps `~/x` and `/x` below a root directory. Host-absolute paths that already
/// live under the root pass through unchanged.
#[derive(Debug, Clone)]
pub struct RootedPathResolver {
    root: PathBuf,
}

impl RootedPathResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl PathResolver for RootedPathResolver {
    fn resolve(&self, virtual_path: &str) -> PathBuf {
        let p = Path::new(virtual_path);
        if p.is_absolute() && p.starts_with(&self.root) {
            return p.to_path_buf();
        }
        let rel = virtual_path
            .strip_prefix('~')
            .unwrap_or(virtual_path)
            .trim_start_matches(['/', '\\']);
        self.root.join(rel)
    }
}

/// Fixed attempt budget with a constant delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay: Duration::from_millis(50),
        }
    }
}

impl From<crate::config::RetryConfig> for RetryPolicy {
    fn from(c: crate::config::RetryConfig) -> Self {
        Self {
            attempts: c.attempts.max(1),
            delay: Duration::from_millis(c.delay_ms),
        }
    }
}

impl RetryPolicy {
    /// Runs `op` until it succeeds, fails with a non-transient error, or the budget is spent.
    /// Returns the attempt count alongside the final error.
    pub fn run<T>(
        &self,
        path: &Path,
        mut op: impl FnMut() -> io::Result<T>,
    ) -> std::result::Result<T, (u32, io::Error)> {
        let attempts = self.attempts.max(1);
        let mut tried = 0;
        loop {
            tried += 1;
            match op() {
                Ok(v) => return Ok(v),
                Err(e) if is_transient(&e) && tried < attempts => {
                    debug!(?path, attempt = tried, error = %e, "transient file error, retrying");
                    thread::sleep(self.delay);
                }
                Err(e) => return Err((tried, e)),
            }
        }
    }
}

/// Errors a concurrent reader/writer of the same file can cause.
pub fn is_transient(e: &io::Error) -> bool {
    if matches!(
        e.kind(),
        ErrorKind::WouldBlock
            | ErrorKind::Interrupted
            | ErrorKind::TimedOut
            | ErrorKind::ResourceBusy
    ) {
        return true;
    }
    // ERROR_SHARING_VIOLATION / ERROR_LOCK_VIOLATION
    cfg!(windows) && matches!(e.raw_os_error(), Some(32) | Some(33))
}

/// Hex SHA-256 of `bytes`.
pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Reads and writes whole files under a `RetryPolicy`.
#[derive(Debug, Clone, Default)]
pub struct RetryingFileStore {
    policy: RetryPolicy,
}

impl RetryingFileStore {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }
}

impl FileReader for RetryingFileStore {
    fn open(&self, path: &Path) -> Result<Vec<u8>> {
        self.policy
            .run(path, || fs::read(path))
            .map_err(|(attempts, source)| SpriteError::Read {
                path: path.to_path_buf(),
                attempts,
                source,
            })
    }
}

impl FileWriter for RetryingFileStore {
    fn write(&self, bytes: &[u8], path: &Path) -> Result<String> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        self.policy
            .run(path, || fs::write(path, bytes))
            .map_err(|(attempts, source)| {
                warn!(?path, attempts, error = %source, "write failed");
                SpriteError::Write {
                    path: path.to_path_buf(),
                    attempts,
                    source,
                }
            })?;
        Ok(fingerprint(bytes))
    }
}
