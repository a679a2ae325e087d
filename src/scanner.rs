//! Directory scanner: discover videos and their companion scripts across
//! the configured search paths, sync the library DB, and publish the
//! listing to the browser's shared item list from a detached thread.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::UNIX_EPOCH;

use walkdir::WalkDir;

use crate::clean_path;
use crate::db::{Db, VideoEntry};

/// Companion script extension. Pairing is `<stem>.funscript` next to the video.
pub const SCRIPT_EXT: &str = "funscript";

/// Browsable extensions and whether a thumbnail gets generated for them.
const BROWSER_EXTENSIONS: &[(&str, bool)] = &[
    ("mp4", true),
    ("m4v", true),
    ("mkv", true),
    ("webm", true),
    ("mov", true),
    ("avi", true),
    ("wmv", true),
    ("flv", false),
    ("3gp", false),
];

/// Thumbnail flag for a browsable extension, None if not browsable.
pub fn browser_ext(path: &Path) -> Option<bool> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    BROWSER_EXTENSIONS
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, thumb)| *thumb)
}

/// Path of the companion script for a video.
pub fn companion_script(video: &Path) -> PathBuf {
    video.with_extension(SCRIPT_EXT)
}

/// All browsable extensions, for dialog filters.
pub fn video_extensions() -> Vec<String> {
    BROWSER_EXTENSIONS.iter().map(|(e, _)| e.to_string()).collect()
}

fn mtime_secs(meta: &std::fs::Metadata) -> Option<i64> {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
}

/// Walk one search path and sync its videos into the DB.
/// Returns the number of new or changed entries.
pub fn discover(db: &Db, root: &Path, recursive: bool) -> usize {
    let mut count = 0usize;

    let mut walk = WalkDir::new(root).follow_links(true).min_depth(1);
    if !recursive {
        walk = walk.max_depth(1);
    }

    for entry in walk.into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let gen_thumb = match browser_ext(path) {
            Some(flag) => flag,
            None => continue,
        };

        let abs = match path.canonicalize() {
            Ok(p) => p,
            Err(_) => continue,
        };

        let has_script = companion_script(&abs).exists();

        let dir = clean_path(&abs.parent().unwrap_or(Path::new("")).to_string_lossy());
        let filename = abs
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();

        let fmeta = entry.metadata().ok();
        let size = fmeta.as_ref().map(|m| m.len() as i64);
        let modified_at = fmeta.as_ref().and_then(mtime_secs);

        let path_str = clean_path(&abs.to_string_lossy());

        if let Some((id, db_size, db_mtime, db_script)) = db.video_lookup(&path_str) {
            if db_size != size || db_mtime != modified_at {
                db.video_update_meta(id, size, modified_at);
                count += 1;
            }
            if db_script != has_script {
                db.video_set_script(id, has_script);
                count += 1;
            }
            continue;
        }

        if db
            .video_insert(
                &path_str,
                &dir,
                &filename,
                size,
                modified_at,
                has_script,
                gen_thumb,
            )
            .is_some()
        {
            count += 1;
        }
    }

    count
}

/// Drop DB rows whose video no longer exists on disk.
fn prune(db: &Db) -> usize {
    let mut pruned = 0usize;
    for (id, path) in db.video_paths() {
        if !Path::new(&path).exists() {
            db.video_remove(id);
            eprintln!("scan: pruned {}", path);
            pruned += 1;
        }
    }
    pruned
}

/// Full rescan of every configured search path, then prune.
/// Returns (added_or_updated, pruned).
pub fn rescan(db: &Db) -> (usize, usize) {
    let mut updated = 0usize;
    for sp in db.search_paths() {
        updated += discover(db, Path::new(&sp.path), sp.recursive);
        eprintln!(
            "scan: done {}{}",
            sp.path,
            if sp.recursive { " (recursive)" } else { "" }
        );
    }
    let pruned = prune(db);
    if updated > 0 || pruned > 0 {
        eprintln!("scan: {} new/changed, {} pruned", updated, pruned);
    }
    (updated, pruned)
}

/// Kick off a library rescan on a detached thread.
///
/// The shared item list is cleared up front and repopulated (sorted newest
/// first) when the walk finishes; `scanning` guards against re-entry and
/// tells the UI to show its scan indicator.
pub fn start_scan(db: Db, items: Arc<Mutex<Vec<VideoEntry>>>, scanning: Arc<AtomicBool>) {
    if scanning.swap(true, Ordering::AcqRel) {
        return;
    }

    std::thread::Builder::new()
        .name("library-scan".into())
        .spawn(move || {
            items.lock().unwrap().clear();
            rescan(&db);
            let fresh = db.videos_newest_first();
            *items.lock().unwrap() = fresh;
            scanning.store(false, Ordering::Release);
        })
        .expect("failed to spawn library-scan thread");
}
