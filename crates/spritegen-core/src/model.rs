use crate::config::DirectoryRule;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Axis-aligned rectangle (pixels). `x,y` is top-left; `w,h` are sizes.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }
    /// Exclusive right edge (`x + w`).
    pub fn right(&self) -> u32 {
        self.x + self.w
    }
    /// Exclusive bottom edge (`y + h`).
    pub fn bottom(&self) -> u32 {
        self.y + self.h
    }
    /// True if the two rectangles share at least one pixel.
    pub fn intersects(&self, other: &Rect) -> bool {
        !(self.x >= other.right()
            || other.x >= self.right()
            || self.y >= other.bottom()
            || other.y >= self.bottom())
    }
}

/// A logical image name and where its source lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageDescriptor {
    pub name: String,
    pub path: PathBuf,
}

impl ImageDescriptor {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

/// One decoded image taking part in a single generation run.
///
/// `rect` is the reserved slot: the intrinsic size plus `border_width` on every side.
/// Intake leaves it at the origin; layout assigns `x`/`y`.
#[derive(Debug, Clone)]
pub struct SpriteElement {
    pub name: String,
    pub image: RgbaImage,
    pub rect: Rect,
    pub border_width: u32,
}

impl SpriteElement {
    pub fn new(name: impl Into<String>, image: RgbaImage, border_width: u32) -> Self {
        let (w, h) = image.dimensions();
        Self {
            name: name.into(),
            rect: Rect::new(
                0,
                0,
                w.saturating_add(border_width.saturating_mul(2)),
                h.saturating_add(border_width.saturating_mul(2)),
            ),
            image,
            border_width,
        }
    }

    /// Intrinsic (unbordered) width of the decoded image.
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Intrinsic (unbordered) height of the decoded image.
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Top-left pixel where the image content starts.
    pub fn content_origin(&self) -> (u32, u32) {
        (
            self.rect.x + self.border_width,
            self.rect.y + self.border_width,
        )
    }
}

/// Full input/output closure of one sprite generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRecord {
    pub images: Vec<ImageDescriptor>,
    pub image_path: PathBuf,
    pub css_path: PathBuf,
    pub url: String,
    /// Extra paths whose change should trigger a rebuild (directory-rule roots).
    pub watch_paths: Vec<PathBuf>,
    /// Directory rules with filesystem paths; re-expanded before every rebuild.
    pub directories: Vec<DirectoryRule>,
    /// Leading entries of `images` that were listed explicitly.
    pub explicit_images: usize,
}

impl GenerationRecord {
    pub fn new(
        images: Vec<ImageDescriptor>,
        image_path: impl Into<PathBuf>,
        css_path: impl Into<PathBuf>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            explicit_images: images.len(),
            images,
            image_path: image_path.into(),
            css_path: css_path.into(),
            url: url.into(),
            watch_paths: Vec::new(),
            directories: Vec::new(),
        }
    }

    pub fn with_watch_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.watch_paths = paths;
        self
    }

    /// Marks the record as expanded from `rules`; everything after the first
    /// `explicit_images` entries came from them.
    pub fn with_directories(mut self, rules: Vec<DirectoryRule>, explicit_images: usize) -> Self {
        self.directories = rules;
        self.explicit_images = explicit_images.min(self.images.len());
        self
    }

    pub fn key(&self) -> CompositeKey {
        CompositeKey::new(&self.image_path, &self.url, &self.css_path)
    }

    /// Every file whose change invalidates this record: sources, both outputs, extra watch paths.
    pub fn dependencies(&self) -> Vec<PathBuf> {
        let mut deps: Vec<PathBuf> = self.images.iter().map(|d| d.path.clone()).collect();
        deps.push(self.image_path.clone());
        deps.push(self.css_path.clone());
        deps.extend(self.watch_paths.iter().cloned());
        deps
    }
}

/// Cache key of one sprite group, derived from its outputs and serving URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompositeKey(String);

impl CompositeKey {
    pub fn new(image_path: &Path, url: &str, css_path: &Path) -> Self {
        Self(format!(
            "{}|{}|{}",
            image_path.display(),
            url,
            css_path.display()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Statistics about layout efficiency of one sprite sheet.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SheetStats {
    pub num_elements: usize,
    pub width: u32,
    pub height: u32,
    /// Canvas area (width * height).
    pub canvas_area: u64,
    /// Sum of reserved slot areas.
    pub used_area: u64,
    /// used_area / canvas_area (0.0 to 1.0). Higher is better.
    pub occupancy: f64,
}

impl SheetStats {
    pub fn compute(elements: &[SpriteElement], width: u32, height: u32) -> Self {
        let canvas_area = (width as u64) * (height as u64);
        let used_area: u64 = elements
            .iter()
            .map(|e| (e.rect.w as u64) * (e.rect.h as u64))
            .sum();
        let occupancy = if canvas_area > 0 {
            used_area as f64 / canvas_area as f64
        } else {
            0.0
        };
        Self {
            num_elements: elements.len(),
            width,
            height,
            canvas_area,
            used_area,
            occupancy,
        }
    }

    /// Returns a human-readable summary of the statistics.
    pub fn summary(&self) -> String {
        format!(
            "Elements: {}, Canvas: {}x{}, Occupancy: {:.2}%, Wasted: {} px²",
            self.num_elements,
            self.width,
            self.height,
            self.occupancy * 100.0,
            self.wasted_area(),
        )
    }

    /// Returns wasted space in pixels.
    pub fn wasted_area(&self) -> u64 {
        self.canvas_area.saturating_sub(self.used_area)
    }
}
