//! Background thumbnail engine.
//!
//! Workers pull videos without thumbnails from the DB, fingerprint the
//! file, and extract a keyframe via system ffmpeg into a 256px WebP stored
//! in the library DB. Thumbs are keyed by fingerprint so renamed files keep
//! theirs. Failures are recorded per video and not retried.

use std::process::Command;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
#[cfg(unix)]
use wait_timeout::ChildExt;

use crate::db::Db;

/// Upper bound on concurrent extraction workers.
const MAX_THUMB_WORKERS: usize = 4;

const THUMB_MAX_SIZE: u32 = 256;

/// Max seconds to wait for ffprobe/ffmpeg before killing.
const FF_TIMEOUT: Duration = Duration::from_secs(30);

/// Files above this get a head+tail fingerprint instead of a full hash.
const FAST_HASH_THRESHOLD: u64 = 2 * 1024 * 1024;
const FINGERPRINT_CHUNK: usize = 64 * 1024;

// ── Stats (shared with UI via Arc) ──────────────────────────────────────

pub struct ThumbStats {
    pub done: AtomicU64,
    pub failed: AtomicU64,
    pub active: AtomicU32,
}

impl ThumbStats {
    fn new() -> Self {
        Self {
            done: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            active: AtomicU32::new(0),
        }
    }
}

// ── Engine ──────────────────────────────────────────────────────────────

pub struct ThumbEngine {
    pub stats: Arc<ThumbStats>,
    quit: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl ThumbEngine {
    pub fn start(db: Db) -> Self {
        let stats = Arc::new(ThumbStats::new());
        let quit = Arc::new(AtomicBool::new(false));
        let mut handles = Vec::new();

        if !which("ffmpeg") {
            eprintln!("thumbs: ffmpeg not on PATH, thumbnail generation disabled");
            return ThumbEngine {
                stats,
                quit,
                handles,
            };
        }

        let ncpus = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        let num_workers = (ncpus / 2).clamp(1, MAX_THUMB_WORKERS);

        for worker_id in 0..num_workers {
            let db = db.clone();
            let stats = stats.clone();
            let quit = quit.clone();
            let h = thread::Builder::new()
                .name(format!("thumb-worker-{}", worker_id))
                .spawn(move || worker_loop(db, stats, quit))
                .expect("spawn thumb worker");
            handles.push(h);
        }

        eprintln!("thumbs: {} workers", num_workers);

        ThumbEngine {
            stats,
            quit,
            handles,
        }
    }

    /// False when ffmpeg was missing and no workers were spawned.
    pub fn enabled(&self) -> bool {
        !self.handles.is_empty()
    }

    pub fn stop(&mut self) {
        self.quit.store(true, Ordering::Release);
        for h in self.handles.drain(..) {
            h.join().ok();
        }
    }
}

impl Drop for ThumbEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

// ── Worker loop ─────────────────────────────────────────────────────────

/// Sleep in short steps so quit is noticed promptly.
fn sleep_checked(quit: &AtomicBool, total: Duration) {
    let step = Duration::from_millis(100);
    let mut left = total;
    while !quit.load(Ordering::Relaxed) && left > Duration::ZERO {
        let d = step.min(left);
        thread::sleep(d);
        left -= d;
    }
}

fn worker_loop(db: Db, stats: Arc<ThumbStats>, quit: Arc<AtomicBool>) {
    while !quit.load(Ordering::Relaxed) {
        let work = db.next_missing_thumb();

        if let Some((video_id, path)) = work {
            stats.active.fetch_add(1, Ordering::Relaxed);
            let t0 = Instant::now();

            let result = process_video(&db, video_id, &path);

            let elapsed = t0.elapsed();
            stats.active.fetch_sub(1, Ordering::Relaxed);

            match result {
                Ok(()) => {
                    stats.done.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    eprintln!("thumbs: {} failed: {:#}", path, e);
                    db.record_thumb_fail(video_id, &format!("{:#}", e));
                    stats.failed.fetch_add(1, Ordering::Relaxed);
                }
            }

            // Throttle: sleep proportional to job duration (~60% duty cycle)
            sleep_checked(&quit, (elapsed / 2).min(Duration::from_secs(5)));
        } else {
            sleep_checked(&quit, Duration::from_secs(5));
        }
    }
}

/// Fingerprint the file, reuse an existing thumb under that fingerprint,
/// otherwise extract a frame and store it.
fn process_video(db: &Db, video_id: i64, path: &str) -> Result<()> {
    let fp = fingerprint(path)?;
    db.video_set_fingerprint(video_id, &fp);

    if db.thumb_exists(&fp) {
        return Ok(());
    }

    let webp = extract_frame(path)?;
    db.thumb_save(&fp, &webp);
    Ok(())
}

// ── Fingerprint ─────────────────────────────────────────────────────────

/// Content fingerprint: full SHA-512 for small files; head + tail + size
/// (prefixed `fp:`) above the threshold so large videos hash instantly.
pub fn fingerprint(path: &str) -> Result<String> {
    use sha2::{Digest, Sha512};
    use std::io::{Read, Seek, SeekFrom};

    let mut file = std::fs::File::open(path).with_context(|| format!("open {}", path))?;
    let file_size = file.metadata().context("stat")?.len();

    let hash = if file_size > FAST_HASH_THRESHOLD {
        let mut hasher = Sha512::new();
        let mut head = vec![0u8; FINGERPRINT_CHUNK.min(file_size as usize)];
        file.read_exact(&mut head).context("read head")?;
        hasher.update(&head);

        if file_size > FINGERPRINT_CHUNK as u64 * 2 {
            file.seek(SeekFrom::End(-(FINGERPRINT_CHUNK as i64)))
                .context("seek tail")?;
            let mut tail = vec![0u8; FINGERPRINT_CHUNK];
            file.read_exact(&mut tail).context("read tail")?;
            hasher.update(&tail);
        }
        hasher.update(file_size.to_le_bytes());
        format!("fp:{:x}", hasher.finalize())
    } else {
        let mut hasher = Sha512::new();
        let mut buf = [0u8; 65536];
        loop {
            let n = file.read(&mut buf).context("read")?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        format!("{:x}", hasher.finalize())
    };

    Ok(hash)
}

// ── ffmpeg ──────────────────────────────────────────────────────────────

fn which(name: &str) -> bool {
    let finder = if cfg!(windows) { "where" } else { "which" };
    Command::new(finder)
        .arg(name)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Run a command with a timeout. Kills the process if it exceeds the limit.
fn run_with_timeout(
    mut child: std::process::Child,
    timeout: Duration,
) -> Result<std::process::Output> {
    use std::io::Read;

    #[cfg(not(unix))]
    let wait_result: std::io::Result<Option<std::process::ExitStatus>> = child.wait().map(Some);
    #[cfg(unix)]
    let wait_result = child.wait_timeout(timeout);

    match wait_result {
        Ok(Some(status)) => {
            let mut stdout = Vec::new();
            let mut stderr = Vec::new();
            if let Some(mut out) = child.stdout.take() {
                out.read_to_end(&mut stdout).ok();
            }
            if let Some(mut err) = child.stderr.take() {
                err.read_to_end(&mut stderr).ok();
            }
            Ok(std::process::Output {
                status,
                stdout,
                stderr,
            })
        }
        Ok(None) => {
            child.kill().ok();
            child.wait().ok();
            bail!("timed out after {}s", timeout.as_secs());
        }
        Err(e) => bail!("wait failed: {}", e),
    }
}

/// Extract a single keyframe at ~30% of the duration (avoids intros and
/// black frames), scaled to 256px, WebP on stdout. No full decode.
fn extract_frame(path: &str) -> Result<Vec<u8>> {
    // Duration via ffprobe; fall back to a minute if probing fails
    let probe_child = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=duration",
            "-of",
            "csv=p=0",
            path,
        ])
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()
        .context("ffprobe failed to start")?;

    let probe = run_with_timeout(probe_child, FF_TIMEOUT)?;
    let duration: f64 = String::from_utf8_lossy(&probe.stdout)
        .trim()
        .parse()
        .unwrap_or(60.0);

    let seek_to = (duration * 0.3).max(1.0);

    let ff_child = Command::new("ffmpeg")
        .args([
            "-ss",
            &format!("{:.1}", seek_to),
            "-skip_frame",
            "nokey",
            "-i",
            path,
            "-vframes",
            "1",
            "-vf",
            &format!("scale={}:-2", THUMB_MAX_SIZE),
            "-c:v",
            "libwebp",
            "-quality",
            "50",
            "-f",
            "webp",
            "-y",
            "pipe:1",
        ])
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()
        .context("ffmpeg failed to start")?;

    let output = run_with_timeout(ff_child, FF_TIMEOUT)?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "ffmpeg error: {}",
            stderr.lines().last().unwrap_or("unknown")
        );
    }

    if output.stdout.is_empty() {
        bail!("ffmpeg produced empty output");
    }

    Ok(output.stdout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_small_file_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.mp4");
        std::fs::write(&path, b"same content").unwrap();
        let p = path.to_string_lossy();

        let fp1 = fingerprint(&p).unwrap();
        let fp2 = fingerprint(&p).unwrap();
        assert_eq!(fp1, fp2);
        assert!(!fp1.starts_with("fp:"), "small files get a full hash");
    }

    #[test]
    fn fingerprint_changes_with_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.mp4");
        let p = path.to_string_lossy().to_string();

        std::fs::write(&path, b"first").unwrap();
        let fp1 = fingerprint(&p).unwrap();
        std::fs::write(&path, b"second").unwrap();
        let fp2 = fingerprint(&p).unwrap();
        assert_ne!(fp1, fp2);
    }

    #[test]
    fn fingerprint_large_file_uses_fast_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.mp4");
        std::fs::write(&path, vec![0xabu8; 3 * 1024 * 1024]).unwrap();

        let fp = fingerprint(&path.to_string_lossy()).unwrap();
        assert!(fp.starts_with("fp:"));
    }

    #[test]
    fn fingerprint_large_file_sees_tail_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.mp4");
        let mut data = vec![0u8; 3 * 1024 * 1024];
        std::fs::write(&path, &data).unwrap();
        let fp1 = fingerprint(&path.to_string_lossy()).unwrap();

        let last = data.len() - 1;
        data[last] = 1;
        std::fs::write(&path, &data).unwrap();
        let fp2 = fingerprint(&path.to_string_lossy()).unwrap();
        assert_ne!(fp1, fp2);
    }

    #[test]
    fn fingerprint_missing_file_errors() {
        assert!(fingerprint("/nonexistent/nope.mp4").is_err());
    }

    #[test]
    fn which_rejects_nonsense() {
        assert!(!which("definitely-not-a-real-binary-4afc1"));
    }

    #[test]
    fn process_video_reuses_existing_thumb() {
        let db = Db::open_memory();
        db.ensure_schema();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.mp4");
        std::fs::write(&path, b"content").unwrap();
        let p = path.to_string_lossy().to_string();
        let id = db
            .video_insert(&p, "/m", "a.mp4", Some(7), Some(1), true, true)
            .unwrap();

        // Pretend a previous run generated the thumb for identical content
        let fp = fingerprint(&p).unwrap();
        db.thumb_save(&fp, b"cached webp");

        // No ffmpeg involved: the fingerprint matches so the blob is reused
        process_video(&db, id, &p).unwrap();
        assert_eq!(db.videos_newest_first()[0].fingerprint, Some(fp.clone()));
        assert_eq!(db.thumb_get(&fp).unwrap(), b"cached webp");
    }

    #[test]
    fn engine_start_stop_is_clean() {
        let db = Db::open_memory();
        db.ensure_schema();
        let mut engine = ThumbEngine::start(db);
        std::thread::sleep(Duration::from_millis(50));
        engine.stop(); // must not hang on idle workers
        assert_eq!(engine.stats.active.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn sleep_checked_aborts_on_quit() {
        let quit = AtomicBool::new(true);
        let t0 = Instant::now();
        sleep_checked(&quit, Duration::from_secs(10));
        assert!(t0.elapsed() < Duration::from_secs(1));
    }
}
