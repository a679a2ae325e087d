//! Filesystem watcher: live rescan trigger for the configured search paths.
//!
//! A background thread watches every search path with `notify` and signals
//! the main loop whenever a video or companion script is created, modified
//! or removed. The main loop debounces the signal and starts a rescan; the
//! watcher itself never touches the library DB — the scanner owns that.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::db::SearchPath;
use crate::scanner;

/// Signal to the main loop: something under this directory changed.
#[derive(Debug)]
pub struct LibraryChanged(pub String);

/// Commands sent from the main thread to the watcher thread.
pub enum WatchCmd {
    /// Start watching a search path.
    Watch(SearchPath),
    /// Stop watching a search path.
    Unwatch(String),
}

/// Handle to the running watcher. Drop to stop.
pub struct FsWatcher {
    quit: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
    cmd_tx: mpsc::Sender<WatchCmd>,
}

impl FsWatcher {
    /// Start watching `paths`. Returns the handle and the signal receiver.
    pub fn start(paths: Vec<SearchPath>) -> (Self, mpsc::Receiver<LibraryChanged>) {
        let (tx, rx) = mpsc::channel();
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let quit = Arc::new(AtomicBool::new(false));
        let quit2 = quit.clone();

        let thread = std::thread::Builder::new()
            .name("fs-watcher".into())
            .spawn(move || {
                run_watcher(paths, tx, quit2, cmd_rx);
            })
            .expect("failed to spawn fs-watcher thread");

        (
            FsWatcher {
                quit,
                thread: Some(thread),
                cmd_tx,
            },
            rx,
        )
    }

    /// Watch a search path added at runtime.
    pub fn watch(&self, sp: SearchPath) {
        self.cmd_tx.send(WatchCmd::Watch(sp)).ok();
    }

    /// Stop watching a removed search path.
    pub fn unwatch(&self, path: &str) {
        self.cmd_tx.send(WatchCmd::Unwatch(path.to_string())).ok();
    }

    pub fn stop(&mut self) {
        self.quit.store(true, Ordering::Release);
        if let Some(t) = self.thread.take() {
            t.join().ok();
        }
    }
}

impl Drop for FsWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Pairing depends on both halves: react to videos *and* scripts.
fn is_relevant(path: &Path) -> bool {
    if scanner::browser_ext(path).is_some() {
        return true;
    }
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(scanner::SCRIPT_EXT))
        .unwrap_or(false)
}

fn mode_of(recursive: bool) -> RecursiveMode {
    if recursive {
        RecursiveMode::Recursive
    } else {
        RecursiveMode::NonRecursive
    }
}

fn run_watcher(
    paths: Vec<SearchPath>,
    tx: mpsc::Sender<LibraryChanged>,
    quit: Arc<AtomicBool>,
    cmd_rx: mpsc::Receiver<WatchCmd>,
) {
    let (ntx, nrx) = mpsc::channel();

    let mut watcher: RecommendedWatcher = match notify::recommended_watcher(move |res| {
        if let Ok(event) = res {
            ntx.send(event).ok();
        }
    }) {
        Ok(w) => w,
        Err(e) => {
            eprintln!("watcher: failed to create: {}", e);
            return;
        }
    };

    // Nested search paths collapse into their recursive ancestors
    let effective = dedup_nested(&paths);
    for sp in &effective {
        match watcher.watch(Path::new(&sp.path), mode_of(sp.recursive)) {
            Ok(()) => eprintln!("watcher: watching {} (recursive={})", sp.path, sp.recursive),
            Err(e) => eprintln!("watcher: failed to watch {}: {}", sp.path, e),
        }
    }
    if effective.len() < paths.len() {
        eprintln!(
            "watcher: deduped {} → {} watches (nested paths skipped)",
            paths.len(),
            effective.len()
        );
    }

    while !quit.load(Ordering::Relaxed) {
        while let Ok(cmd) = cmd_rx.try_recv() {
            match cmd {
                WatchCmd::Watch(sp) => {
                    match watcher.watch(Path::new(&sp.path), mode_of(sp.recursive)) {
                        Ok(()) => eprintln!("watcher: +watch {}", sp.path),
                        Err(e) => eprintln!("watcher: failed to watch {}: {}", sp.path, e),
                    }
                }
                WatchCmd::Unwatch(path) => match watcher.unwatch(Path::new(&path)) {
                    Ok(()) => eprintln!("watcher: -watch {}", path),
                    Err(e) => eprintln!("watcher: failed to unwatch {}: {}", path, e),
                },
            }
        }

        match nrx.recv_timeout(Duration::from_millis(200)) {
            Ok(event) => handle_event(&tx, event),
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    eprintln!("watcher: stopped");
}

fn handle_event(tx: &mpsc::Sender<LibraryChanged>, event: notify::Event) {
    if !matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) {
        return;
    }

    for path in &event.paths {
        // Directories themselves are noise; pairing lives in files.
        // Removed paths no longer exist, so judge by extension alone.
        if path.is_dir() || !is_relevant(path) {
            continue;
        }

        let dir = path
            .parent()
            .unwrap_or(Path::new(""))
            .to_string_lossy()
            .to_string();
        tx.send(LibraryChanged(dir)).ok();
        // One signal per event is plenty — the rescan covers everything
        break;
    }
}

/// Deduplicate nested search paths: a recursive ancestor subsumes its
/// children. Non-recursive paths never cover anything below themselves.
fn dedup_nested(paths: &[SearchPath]) -> Vec<SearchPath> {
    let recursive: Vec<&str> = paths
        .iter()
        .filter(|sp| sp.recursive)
        .map(|sp| sp.path.as_str())
        .collect();

    paths
        .iter()
        .filter(|sp| {
            !recursive.iter().any(|ancestor| {
                *ancestor != sp.path && sp.path.starts_with(&format!("{}/", ancestor))
            })
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    // ── is_relevant ─────────────────────────────────────────────────────

    #[test]
    fn relevant_videos() {
        assert!(is_relevant(Path::new("/m/clip.mp4")));
        assert!(is_relevant(Path::new("/m/clip.MKV")));
    }

    #[test]
    fn relevant_scripts() {
        assert!(is_relevant(Path::new("/m/clip.funscript")));
        assert!(is_relevant(Path::new("/m/clip.FUNSCRIPT")));
    }

    #[test]
    fn irrelevant_files() {
        assert!(!is_relevant(Path::new("/m/notes.txt")));
        assert!(!is_relevant(Path::new("/m/.gitignore")));
        assert!(!is_relevant(Path::new("/m/noext")));
    }

    // ── dedup_nested ────────────────────────────────────────────────────

    fn sp(path: &str, recursive: bool) -> SearchPath {
        SearchPath {
            path: path.to_string(),
            recursive,
        }
    }

    #[test]
    fn dedup_no_overlap() {
        let paths = vec![sp("/a", true), sp("/b", true)];
        assert_eq!(dedup_nested(&paths).len(), 2);
    }

    #[test]
    fn dedup_child_of_recursive_removed() {
        let paths = vec![sp("/media", true), sp("/media/new", false)];
        let result = dedup_nested(&paths);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].path, "/media");
    }

    #[test]
    fn dedup_nonrecursive_parent_keeps_child() {
        let paths = vec![sp("/media", false), sp("/media/new", true)];
        assert_eq!(dedup_nested(&paths).len(), 2);
    }

    #[test]
    fn dedup_no_false_prefix_match() {
        // /media should NOT subsume /media2
        let paths = vec![sp("/media", true), sp("/media2", true)];
        assert_eq!(dedup_nested(&paths).len(), 2);
    }

    #[test]
    fn dedup_deeply_nested() {
        let paths = vec![
            sp("/a", true),
            sp("/a/b", true),
            sp("/a/b/c", false),
            sp("/x", false),
        ];
        let result = dedup_nested(&paths);
        assert_eq!(result.len(), 2);
        let kept: Vec<&str> = result.iter().map(|p| p.path.as_str()).collect();
        assert!(kept.contains(&"/a"));
        assert!(kept.contains(&"/x"));
    }

    #[test]
    fn dedup_empty() {
        assert!(dedup_nested(&[]).is_empty());
    }

    // ── live watching ───────────────────────────────────────────────────

    fn wait_for_signal(rx: &mpsc::Receiver<LibraryChanged>, secs: u64) -> Option<LibraryChanged> {
        let deadline = Instant::now() + Duration::from_secs(secs);
        while Instant::now() < deadline {
            if let Ok(sig) = rx.recv_timeout(Duration::from_millis(100)) {
                return Some(sig);
            }
        }
        None
    }

    #[test]
    fn signals_on_new_video() {
        let dir = tempfile::tempdir().unwrap();
        let dir_str = dir.path().to_string_lossy().to_string();

        let (watcher, rx) = FsWatcher::start(vec![sp(&dir_str, false)]);
        std::thread::sleep(Duration::from_millis(300));

        std::fs::write(dir.path().join("new.mp4"), b"vid").unwrap();

        assert!(
            wait_for_signal(&rx, 2).is_some(),
            "video creation should signal"
        );
        drop(watcher);
    }

    #[test]
    fn signals_on_new_script() {
        let dir = tempfile::tempdir().unwrap();
        let dir_str = dir.path().to_string_lossy().to_string();

        let (watcher, rx) = FsWatcher::start(Vec::new());
        watcher.watch(sp(&dir_str, false));
        std::thread::sleep(Duration::from_millis(300));

        std::fs::write(dir.path().join("late.funscript"), b"{}").unwrap();

        assert!(
            wait_for_signal(&rx, 2).is_some(),
            "script creation changes pairing and should signal"
        );
        drop(watcher);
    }

    #[test]
    fn ignores_unrelated_files() {
        let dir = tempfile::tempdir().unwrap();
        let dir_str = dir.path().to_string_lossy().to_string();

        let (watcher, rx) = FsWatcher::start(vec![sp(&dir_str, false)]);
        std::thread::sleep(Duration::from_millis(300));

        std::fs::write(dir.path().join("readme.txt"), b"hello").unwrap();
        std::thread::sleep(Duration::from_millis(500));

        assert!(rx.try_recv().is_err(), "non-media files should not signal");
        drop(watcher);
    }

    #[test]
    fn unwatch_stops_signals() {
        let dir = tempfile::tempdir().unwrap();
        let dir_str = dir.path().to_string_lossy().to_string();

        let (watcher, rx) = FsWatcher::start(vec![sp(&dir_str, false)]);
        std::thread::sleep(Duration::from_millis(300));

        watcher.unwatch(&dir_str);
        std::thread::sleep(Duration::from_millis(300));

        std::fs::write(dir.path().join("after.mp4"), b"vid").unwrap();
        std::thread::sleep(Duration::from_millis(500));

        assert!(rx.try_recv().is_err(), "no signals after unwatch");
        drop(watcher);
    }

    #[test]
    fn stop_and_drop_are_clean() {
        let (mut watcher, _rx) = FsWatcher::start(Vec::new());
        watcher.stop();

        let (watcher2, _rx2) = FsWatcher::start(Vec::new());
        drop(watcher2);
    }

    #[test]
    fn commands_to_missing_dirs_do_not_panic() {
        let (watcher, _rx) = FsWatcher::start(Vec::new());
        watcher.watch(sp("/nonexistent/path/4afc1", true));
        watcher.unwatch("/nonexistent/path/4afc1");
        drop(watcher);
    }
}
