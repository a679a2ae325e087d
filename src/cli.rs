//! CLI subcommand implementations.

use std::path::Path;

use crate::clean_path;
use crate::db::Db;
use crate::scanner;

pub fn add(db: &Db, path: &Path, recursive: bool) {
    let abs = match path.canonicalize() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("vb add: {}: {}", path.display(), e);
            return;
        }
    };
    let abs_str = clean_path(&abs.to_string_lossy());
    db.search_path_add(&abs_str, recursive);
    println!("Scanning {}...", abs_str);
    let count = scanner::discover(db, &abs, recursive);
    println!("Added {} ({} videos)", abs_str, count);
}

pub fn remove(db: &Db, path: &Path) {
    let abs = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let abs_str = clean_path(&abs.to_string_lossy());
    db.search_path_remove(&abs_str);
    println!("Removed {}", abs_str);
}

pub fn paths(db: &Db) {
    let paths = db.search_paths();
    if paths.is_empty() {
        println!("No search paths. Use `vb add PATH` first.");
        return;
    }
    for sp in &paths {
        println!(
            "  {}{}",
            sp.path,
            if sp.recursive { " [recursive]" } else { "" }
        );
    }
}

pub fn scan(db: &Db) {
    if db.search_paths().is_empty() {
        println!("No search paths. Use `vb add PATH` first.");
        return;
    }
    let (updated, pruned) = scanner::rescan(db);
    println!("Done. {} new/changed, {} pruned.", updated, pruned);
}

pub fn status(db: &Db) {
    let stats = db.stats();
    println!("vb status");
    println!("=========");
    println!("videos:  {}", stats.total_videos);
    println!(
        "thumbs:  {}/{} ({} failed)",
        stats.thumbs_ready, stats.total_videos, stats.thumbs_failed
    );
    println!("paths:   {}", stats.total_paths);
    for sp in &db.search_paths() {
        println!(
            "  {}{}",
            sp.path,
            if sp.recursive { " [recursive]" } else { "" }
        );
    }
}

/// Run the thumbnail engine headless until the queue drains.
pub fn thumbs(db: &Db) {
    use std::sync::atomic::Ordering;

    let mut engine = crate::thumbs::ThumbEngine::start(db.clone());
    if !engine.enabled() {
        return;
    }

    println!("Generating thumbnails...");
    loop {
        std::thread::sleep(std::time::Duration::from_secs(2));
        let done = engine.stats.done.load(Ordering::Relaxed);
        let failed = engine.stats.failed.load(Ordering::Relaxed);
        let active = engine.stats.active.load(Ordering::Relaxed);

        if active == 0 && db.next_missing_thumb().is_none() {
            engine.stop();
            println!("Done. {} ok, {} failed.", done, failed);
            return;
        }

        eprint!("\r  {} ok, {} failed, {} active...", done, failed, active);
    }
}
