mod common;

use common::{CountingStore, RecordingCache, bump_mtime, write_png};
use spritegen_core::io::RootedPathResolver;
use spritegen_core::prelude::*;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

fn seed(root: &Path) {
    write_png(&root.join("img/icons/home.png"), 16, 16, [255, 0, 0, 255]);
    write_png(&root.join("img/icons/search.png"), 24, 12, [0, 255, 0, 255]);
    write_png(&root.join("img/flags/de.png"), 20, 14, [0, 0, 0, 255]);
    write_png(&root.join("img/flags/fr.png"), 20, 14, [0, 0, 255, 255]);
    fs::write(root.join("img/flags/README.txt"), "not an image").unwrap();
}

fn config(root: &Path) -> SpriteConfig {
    SpriteConfig::builder()
        .root(root)
        .border_width(1)
        .poll_interval_ms(20)
        .group(
            GroupConfig::new("icons", "~/out/icons.png", "~/out/icons.css")
                .with_image("home", "~/img/icons/home.png")
                .with_image("search", "/img/icons/search.png"),
        )
        .group(
            GroupConfig::new("flags", "~/out/flags.png", "~/out/flags.css")
                .with_url("/static/flags.png")
                .with_directory(DirectoryRule::new("~/img/flags")),
        )
        .build()
}

fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    false
}

#[test]
fn start_generates_every_group() {
    let dir = tempfile::tempdir().unwrap();
    seed(dir.path());
    let service = SpriteService::with_file_watch(config(dir.path())).unwrap();
    let outputs = service.start().unwrap();
    assert_eq!(outputs.len(), 2);
    assert!(service.is_running());

    let icons = fs::read_to_string(dir.path().join("out/icons.css")).unwrap();
    assert!(icons.contains(".home {") && icons.contains(".search {"));
    assert!(icons.contains("url('/out/icons.png?"));
    let flags = fs::read_to_string(dir.path().join("out/flags.css")).unwrap();
    assert!(flags.contains(".de {") && flags.contains(".fr {"));
    assert!(!flags.contains("README"));
    assert!(flags.contains("url('/static/flags.png?"));

    let cache = service.watch_cache().unwrap();
    assert_eq!(cache.len(), 2);
    assert!(service.start().unwrap().is_empty(), "second start is a no-op");

    assert!(service.stop());
    assert!(cache.is_empty());
    assert!(!service.is_running());
}

#[test]
fn poller_rebuilds_on_source_change() {
    let dir = tempfile::tempdir().unwrap();
    seed(dir.path());
    let service = SpriteService::with_file_watch(config(dir.path())).unwrap();
    service.start().unwrap();
    let css_path = dir.path().join("out/icons.css");
    let before = fs::read_to_string(&css_path).unwrap();

    let home = dir.path().join("img/icons/home.png");
    write_png(&home, 16, 16, [10, 20, 30, 255]);
    bump_mtime(&home);
    assert!(
        wait_until(|| fs::read_to_string(&css_path).map(|c| c != before).unwrap_or(false)),
        "stylesheet was not regenerated"
    );
    service.stop();
}

#[test]
fn new_file_in_watched_directory_is_picked_up() {
    let dir = tempfile::tempdir().unwrap();
    seed(dir.path());
    let service = SpriteService::with_file_watch(config(dir.path())).unwrap();
    service.start().unwrap();
    let css_path = dir.path().join("out/flags.css");

    // Let the directory timestamp tick past the one recorded at registration.
    thread::sleep(Duration::from_millis(30));
    let staged = dir.path().join("it.png");
    write_png(&staged, 20, 14, [0, 128, 0, 255]);
    fs::rename(&staged, dir.path().join("img/flags/it.png")).unwrap();
    assert!(
        wait_until(|| fs::read_to_string(&css_path)
            .map(|c| c.contains(".it {"))
            .unwrap_or(false)),
        "new image was not added to the sprite"
    );
    service.stop();
}

#[test]
fn render_all_does_not_monitor() {
    let dir = tempfile::tempdir().unwrap();
    seed(dir.path());
    let service = SpriteService::with_file_watch(config(dir.path())).unwrap();
    let outputs = service.render_all().unwrap();
    assert_eq!(outputs.len(), 2);
    assert!(service.watch_cache().unwrap().is_empty());
    assert!(dir.path().join("out/flags.png").exists());
}

#[test]
fn failing_group_does_not_block_others() {
    let dir = tempfile::tempdir().unwrap();
    seed(dir.path());
    let cfg = SpriteConfig::builder()
        .root(dir.path())
        .group(
            GroupConfig::new("broken", "~/out/broken.png", "~/out/broken.css")
                .with_image("missing", "~/img/nope.png"),
        )
        .group(
            GroupConfig::new("icons", "~/out/icons.png", "~/out/icons.css")
                .with_image("home", "~/img/icons/home.png"),
        )
        .build();
    let service = SpriteService::with_file_watch(cfg).unwrap();
    assert!(service.start().is_err());
    assert!(dir.path().join("out/icons.css").exists());
    assert_eq!(service.watch_cache().unwrap().len(), 1);
}

#[test]
fn concurrent_stop_tears_down_once() {
    let dir = tempfile::tempdir().unwrap();
    seed(dir.path());
    let cfg = config(dir.path());
    let cache = Arc::new(RecordingCache::default());
    let store = Arc::new(CountingStore::default());
    let generator =
        SpriteGenerator::new(cache.clone(), store.clone(), store, GeneratorOptions::default());
    let resolver = Arc::new(RootedPathResolver::new(dir.path()));
    let service = Arc::new(SpriteService::new(cfg, resolver, generator).unwrap());
    service.start().unwrap();
    assert_eq!(cache.insert_count(), 2);

    let barrier = Arc::new(Barrier::new(8));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let s = Arc::clone(&service);
            let b = Arc::clone(&barrier);
            thread::spawn(move || {
                b.wait();
                s.stop()
            })
        })
        .collect();
    let wins = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|stopped| *stopped)
        .count();
    assert_eq!(wins, 1);
    assert_eq!(cache.remove_count(), 2);
    assert!(!service.stop());
    assert_eq!(cache.remove_count(), 2);
}

#[test]
fn invalid_config_is_rejected() {
    let cfg = SpriteConfig::builder()
        .group(GroupConfig::new("empty", "~/a.png", "~/a.css"))
        .build();
    assert!(SpriteService::with_file_watch(cfg).is_err());
}
