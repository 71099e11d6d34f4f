use crate::config::{DirectoryRule, GroupConfig};
use crate::error::{Result, SpriteError};
use crate::io::{FileReader, PathResolver};
use crate::model::{GenerationRecord, ImageDescriptor, SpriteElement};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Reads and decodes every descriptor, in order. Any unreadable or undecodable
/// image aborts the whole run.
pub fn load_elements(
    descriptors: &[ImageDescriptor],
    reader: &dyn FileReader,
    border_width: u32,
) -> Result<Vec<SpriteElement>> {
    let mut list = Vec::with_capacity(descriptors.len());
    for d in descriptors {
        let bytes = reader.open(&d.path)?;
        list.push(decode_element(&d.name, &bytes, border_width)?);
    }
    Ok(list)
}

pub fn decode_element(name: &str, bytes: &[u8], border_width: u32) -> Result<SpriteElement> {
    let img = image::load_from_memory(bytes).map_err(|source| SpriteError::Decode {
        name: name.to_string(),
        source,
    })?;
    Ok(SpriteElement::new(name, img.to_rgba8(), border_width))
}

/// Descriptors of a group plus the directories that must be watched for additions/removals.
///
/// Explicit images come first; directory images follow in path order. On a name clash the
/// first descriptor wins. The group's own outputs are never picked up as sources.
pub fn group_descriptors(
    group: &GroupConfig,
    resolver: &dyn PathResolver,
) -> Result<(Vec<ImageDescriptor>, Vec<PathBuf>)> {
    let explicit: Vec<ImageDescriptor> = group
        .images
        .iter()
        .map(|e| ImageDescriptor::new(&e.name, resolver.resolve(&e.path)))
        .collect();
    let rules = resolve_rules(&group.directories, resolver);
    let outputs = [resolver.resolve(&group.image), resolver.resolve(&group.css)];
    merge_sources(&group.name, explicit, &rules, &outputs)
}

/// Directory rules with their paths resolved to filesystem paths.
pub fn resolve_rules(rules: &[DirectoryRule], resolver: &dyn PathResolver) -> Vec<DirectoryRule> {
    rules
        .iter()
        .map(|r| DirectoryRule {
            path: resolver.resolve(&r.path).to_string_lossy().into_owned(),
            ..r.clone()
        })
        .collect()
}

/// Re-expands the record's directory rules. Returns `None` when the image list is unchanged.
pub fn rescan(record: &GenerationRecord) -> Result<Option<GenerationRecord>> {
    if record.directories.is_empty() {
        return Ok(None);
    }
    let explicit: Vec<ImageDescriptor> = record
        .images
        .iter()
        .take(record.explicit_images)
        .cloned()
        .collect();
    let key = record.key();
    let outputs = [record.image_path.clone(), record.css_path.clone()];
    let (images, watch_dirs) =
        merge_sources(key.as_str(), explicit, &record.directories, &outputs)?;
    if images == record.images && watch_dirs == record.watch_paths {
        return Ok(None);
    }
    debug!(
        %key,
        before = record.images.len(),
        after = images.len(),
        "directory contents changed"
    );
    let mut next = record.clone();
    next.images = images;
    next.watch_paths = watch_dirs;
    Ok(Some(next))
}

fn merge_sources(
    group: &str,
    explicit: Vec<ImageDescriptor>,
    rules: &[DirectoryRule],
    outputs: &[PathBuf],
) -> Result<(Vec<ImageDescriptor>, Vec<PathBuf>)> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut descriptors = Vec::new();
    let mut watch_dirs = Vec::new();

    for d in explicit {
        if seen.insert(d.name.clone()) {
            descriptors.push(d);
        } else {
            warn!(group, name = %d.name, "duplicate image name ignored");
        }
    }
    for rule in rules {
        let (found, dirs) = expand_directory(rule, &IdentityResolver)?;
        debug!(group, dir = %rule.path, count = found.len(), "expanded directory rule");
        for d in found {
            if outputs.contains(&d.path) {
                debug!(group, path = %d.path.display(), "skipping the group's own output");
                continue;
            }
            if seen.insert(d.name.clone()) {
                descriptors.push(d);
            } else {
                warn!(group, name = %d.name, "duplicate image name ignored");
            }
        }
        watch_dirs.extend(dirs);
    }
    Ok((descriptors, watch_dirs))
}

struct IdentityResolver;

impl PathResolver for IdentityResolver {
    fn resolve(&self, path: &str) -> PathBuf {
        PathBuf::from(path)
    }
}

/// Image files below `rule.path` filtered by include/exclude globs, plus every directory visited.
pub fn expand_directory(
    rule: &DirectoryRule,
    resolver: &dyn PathResolver,
) -> Result<(Vec<ImageDescriptor>, Vec<PathBuf>)> {
    let root = resolver.resolve(&rule.path);
    let include = build_globset(&rule.include)?;
    let exclude = build_globset(&rule.exclude)?;
    let max_depth = if rule.recursive { usize::MAX } else { 1 };

    let mut files = Vec::new();
    let mut dirs = Vec::new();
    for entry in WalkDir::new(&root).max_depth(max_depth).sort_by_file_name() {
        let entry = entry?;
        let p = entry.path();
        if entry.file_type().is_dir() {
            if entry.depth() < max_depth {
                dirs.push(p.to_path_buf());
            }
            continue;
        }
        let rel = p.strip_prefix(&root).unwrap_or(p);
        if is_image(p) && !should_skip(rel, include.as_ref(), exclude.as_ref()) {
            let name = p
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            files.push(ImageDescriptor::new(name, p));
        }
    }
    Ok((files, dirs))
}

fn build_globset(patterns: &[String]) -> Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut b = GlobSetBuilder::new();
    for pat in patterns {
        b.add(Glob::new(pat)?);
    }
    Ok(Some(b.build()?))
}

fn should_skip(p: &Path, include: Option<&GlobSet>, exclude: Option<&GlobSet>) -> bool {
    let s = p.to_string_lossy().replace('\\', "/");
    if let Some(ex) = exclude {
        if ex.is_match(&s) {
            return true;
        }
    }
    if let Some(inc) = include {
        if !inc.is_match(&s) {
            return true;
        }
    }
    false
}

fn is_image(p: &Path) -> bool {
    matches!(
        p.extension()
            .and_then(|e| e.to_str())
            .map(|s| s.to_ascii_lowercase()),
        Some(ext) if matches!(ext.as_str(), "png" | "jpg" | "jpeg" | "gif" | "bmp")
    )
}
