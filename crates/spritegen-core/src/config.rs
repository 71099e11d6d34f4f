use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// Sprite generation configuration.
/// Key notes:
///   - paths inside groups are virtual (`~/img/a.png` or `/img/a.png`) and resolved against `root`
///   - `poll_interval_ms` drives the file-watch poller; directory rules may lower it
///   - `expiration_secs` is a sliding window after which an entry is re-armed (never rebuilt)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpriteConfig {
    /// Filesystem directory that virtual paths resolve against.
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// Pixels reserved around every image inside the sprite.
    #[serde(default)]
    pub border_width: u32,
    /// How often watched files are checked for changes (milliseconds).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Sliding expiration of cache entries (seconds). None disables expiration.
    #[serde(default = "default_expiration_secs")]
    pub expiration_secs: Option<u64>,
    /// Generate groups in parallel at startup when feature "parallel" is on.
    #[serde(default)]
    pub parallel: bool,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub groups: Vec<GroupConfig>,
}

/// Bounded retry budget for file reads and writes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryConfig {
    pub attempts: u32,
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay_ms: 50,
        }
    }
}

/// One sprite: its outputs and the images it is built from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupConfig {
    pub name: String,
    /// Virtual path of the composite PNG.
    pub image: String,
    /// Virtual path of the stylesheet.
    pub css: String,
    /// Serving URL of the composite; derived from `image` when absent.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub images: Vec<ImageEntry>,
    #[serde(default)]
    pub directories: Vec<DirectoryRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageEntry {
    pub name: String,
    pub path: String,
}

/// Includes every image below a directory, named after its file stem.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DirectoryRule {
    pub path: String,
    /// Glob patterns; when non-empty only matching files are used.
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default = "default_recursive")]
    pub recursive: bool,
    /// Requested poll interval for this directory (milliseconds).
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,
}

impl DirectoryRule {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            include: Vec::new(),
            exclude: Vec::new(),
            recursive: default_recursive(),
            poll_interval_ms: None,
        }
    }
}

impl GroupConfig {
    pub fn new(name: impl Into<String>, image: impl Into<String>, css: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            css: css.into(),
            url: None,
            images: Vec::new(),
            directories: Vec::new(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_image(mut self, name: impl Into<String>, path: impl Into<String>) -> Self {
        self.images.push(ImageEntry {
            name: name.into(),
            path: path.into(),
        });
        self
    }

    pub fn with_directory(mut self, rule: DirectoryRule) -> Self {
        self.directories.push(rule);
        self
    }

    /// Serving URL: explicit `url`, else the image's virtual path without its leading `~`.
    pub fn serving_url(&self) -> String {
        match &self.url {
            Some(u) => u.clone(),
            None => {
                let p = self.image.replace('\\', "/");
                let p = p.strip_prefix('~').unwrap_or(&p);
                if p.starts_with('/') {
                    p.to_string()
                } else {
                    format!("/{}", p)
                }
            }
        }
    }
}

impl Default for SpriteConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            border_width: 0,
            poll_interval_ms: default_poll_interval_ms(),
            expiration_secs: default_expiration_secs(),
            parallel: false,
            retry: RetryConfig::default(),
            groups: Vec::new(),
        }
    }
}

impl SpriteConfig {
    /// Validates the configuration parameters.
    ///
    /// Returns an error if:
    /// - a group has no name, no outputs, or neither images nor directories
    /// - two groups share a name or an output path
    /// - the poll interval or retry budget is zero
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::SpriteError;

        if self.poll_interval_ms == 0 {
            return Err(SpriteError::InvalidConfig(
                "poll_interval_ms must be greater than zero".into(),
            ));
        }
        if self.retry.attempts == 0 {
            return Err(SpriteError::InvalidConfig(
                "retry.attempts must be at least 1".into(),
            ));
        }

        let mut names = HashSet::new();
        let mut outputs = HashSet::new();
        for g in &self.groups {
            if g.name.trim().is_empty() {
                return Err(SpriteError::InvalidConfig("group without a name".into()));
            }
            if !names.insert(g.name.as_str()) {
                return Err(SpriteError::InvalidConfig(format!(
                    "duplicate group name '{}'",
                    g.name
                )));
            }
            if g.image.trim().is_empty() || g.css.trim().is_empty() {
                return Err(SpriteError::InvalidConfig(format!(
                    "group '{}' needs both an image and a css output path",
                    g.name
                )));
            }
            for out in [&g.image, &g.css] {
                if !outputs.insert(out.as_str()) {
                    return Err(SpriteError::InvalidConfig(format!(
                        "output path '{}' is used by more than one group",
                        out
                    )));
                }
            }
            if g.images.is_empty() && g.directories.is_empty() {
                return Err(SpriteError::InvalidConfig(format!(
                    "group '{}' has no images and no directories",
                    g.name
                )));
            }
            if let Some(e) = g.images.iter().find(|e| e.name.trim().is_empty()) {
                return Err(SpriteError::InvalidConfig(format!(
                    "group '{}' has an image without a name (path '{}')",
                    g.name, e.path
                )));
            }
        }
        Ok(())
    }

    /// Poll interval for the watcher: the configured interval, lowered by any directory rule.
    pub fn effective_poll_interval(&self) -> Duration {
        let ms = self
            .groups
            .iter()
            .flat_map(|g| g.directories.iter())
            .filter_map(|d| d.poll_interval_ms)
            .filter(|ms| *ms > 0)
            .fold(self.poll_interval_ms, u64::min);
        Duration::from_millis(ms)
    }

    pub fn expiration(&self) -> Option<Duration> {
        self.expiration_secs.map(Duration::from_secs)
    }
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}
fn default_poll_interval_ms() -> u64 {
    1000
}
fn default_expiration_secs() -> Option<u64> {
    Some(20 * 60)
}
fn default_recursive() -> bool {
    true
}

/// Builder for `SpriteConfig` for ergonomic construction.
#[derive(Debug, Default, Clone)]
pub struct SpriteConfigBuilder {
    cfg: SpriteConfig,
}

impl SpriteConfigBuilder {
    pub fn new() -> Self {
        Self {
            cfg: SpriteConfig::default(),
        }
    }
    pub fn root(mut self, v: impl Into<PathBuf>) -> Self {
        self.cfg.root = v.into();
        self
    }
    pub fn border_width(mut self, v: u32) -> Self {
        self.cfg.border_width = v;
        self
    }
    pub fn poll_interval_ms(mut self, v: u64) -> Self {
        self.cfg.poll_interval_ms = v;
        self
    }
    pub fn expiration_secs(mut self, v: Option<u64>) -> Self {
        self.cfg.expiration_secs = v;
        self
    }
    pub fn parallel(mut self, v: bool) -> Self {
        self.cfg.parallel = v;
        self
    }
    pub fn retry(mut self, attempts: u32, delay_ms: u64) -> Self {
        self.cfg.retry = RetryConfig { attempts, delay_ms };
        self
    }
    pub fn group(mut self, g: GroupConfig) -> Self {
        self.cfg.groups.push(g);
        self
    }
    pub fn build(self) -> SpriteConfig {
        self.cfg
    }
}

impl SpriteConfig {
    /// Create a fluent builder for `SpriteConfig`.
    pub fn builder() -> SpriteConfigBuilder {
        SpriteConfigBuilder::new()
    }
}
