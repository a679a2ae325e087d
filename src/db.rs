//! Library database: discovered videos, search paths, thumbnails, history
//! and view preferences. One SQLite file, shared by CLI and GUI.

use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub struct Db(Arc<Mutex<Connection>>);

/// One discovered video with a companion script.
#[derive(Clone, Debug)]
pub struct VideoEntry {
    pub id: i64,
    pub path: String,
    pub dir: String,
    pub filename: String,
    pub size: Option<i64>,
    /// Epoch seconds. Listings sort by this, newest first.
    pub modified_at: Option<i64>,
    pub has_script: bool,
    pub gen_thumb: bool,
    pub fingerprint: Option<String>,
}

/// A configured scan location.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchPath {
    pub path: String,
    pub recursive: bool,
}

/// Aggregate counts for the status bar and `vb status`.
pub struct LibraryStats {
    pub total_videos: i64,
    pub total_paths: i64,
    pub thumbs_ready: i64,
    pub thumbs_failed: i64,
}

/// Where vb.db and friends live.
pub fn data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "vb")
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

fn default_db_path() -> PathBuf {
    let dir = data_dir();
    std::fs::create_dir_all(&dir).ok();
    dir.join("vb.db")
}

fn row_to_video(row: &rusqlite::Row) -> rusqlite::Result<VideoEntry> {
    Ok(VideoEntry {
        id: row.get(0)?,
        path: row.get(1)?,
        dir: row.get(2)?,
        filename: row.get(3)?,
        size: row.get(4)?,
        modified_at: row.get(5)?,
        has_script: row.get::<_, i64>(6)? != 0,
        gen_thumb: row.get::<_, i64>(7)? != 0,
        fingerprint: row.get(8)?,
    })
}

const VIDEO_COLS: &str = "id, path, dir, filename, size, modified_at, has_script, gen_thumb, fingerprint";

impl Db {
    pub fn open_default() -> Self {
        let path = default_db_path();
        eprintln!("db: {}", path.display());
        let conn = Connection::open(&path).expect("failed to open vb.db");
        conn.execute_batch("PRAGMA journal_mode = WAL;").ok();
        conn.execute_batch("PRAGMA foreign_keys = ON;").ok();
        Db(Arc::new(Mutex::new(conn)))
    }

    pub fn open_memory() -> Self {
        let conn = Connection::open_in_memory().expect("failed to open in-memory db");
        Db(Arc::new(Mutex::new(conn)))
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.0.lock().unwrap()
    }

    pub fn ensure_schema(&self) {
        self.conn()
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS videos (
                    id            INTEGER PRIMARY KEY,
                    path          TEXT NOT NULL UNIQUE,
                    dir           TEXT NOT NULL,
                    filename      TEXT NOT NULL,
                    size          INTEGER,
                    modified_at   INTEGER,
                    has_script    INTEGER NOT NULL DEFAULT 1,
                    gen_thumb     INTEGER NOT NULL DEFAULT 1,
                    fingerprint   TEXT,
                    created_at    TEXT DEFAULT (datetime('now'))
                );
                CREATE TABLE IF NOT EXISTS search_paths (
                    id            INTEGER PRIMARY KEY,
                    path          TEXT NOT NULL UNIQUE,
                    recursive     INTEGER NOT NULL DEFAULT 0,
                    created_at    TEXT DEFAULT (datetime('now'))
                );
                CREATE TABLE IF NOT EXISTS thumbs (
                    fingerprint   TEXT PRIMARY KEY,
                    webp          BLOB NOT NULL,
                    created_at    TEXT DEFAULT (datetime('now'))
                );
                CREATE TABLE IF NOT EXISTS thumb_fails (
                    video_id      INTEGER PRIMARY KEY,
                    error         TEXT,
                    created_at    TEXT DEFAULT (datetime('now'))
                );
                CREATE TABLE IF NOT EXISTS history (
                    id            INTEGER PRIMARY KEY,
                    video_id      INTEGER REFERENCES videos(id),
                    action        TEXT NOT NULL,
                    created_at    TEXT DEFAULT (datetime('now'))
                );
                CREATE TABLE IF NOT EXISTS prefs (
                    key           TEXT PRIMARY KEY,
                    value         TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_videos_dir ON videos(dir);
                CREATE INDEX IF NOT EXISTS idx_videos_mtime ON videos(modified_at);",
            )
            .expect("schema creation failed");
    }

    // ── Search paths ────────────────────────────────────────────────────

    pub fn search_path_add(&self, path: &str, recursive: bool) {
        self.conn()
            .execute(
                "INSERT INTO search_paths (path, recursive) VALUES (?1, ?2)
                 ON CONFLICT(path) DO UPDATE SET recursive = ?2",
                rusqlite::params![path, recursive as i64],
            )
            .ok();
    }

    pub fn search_path_remove(&self, path: &str) {
        self.conn()
            .execute("DELETE FROM search_paths WHERE path = ?1", [path])
            .ok();
    }

    pub fn search_path_set_recursive(&self, path: &str, recursive: bool) {
        self.conn()
            .execute(
                "UPDATE search_paths SET recursive = ?1 WHERE path = ?2",
                rusqlite::params![recursive as i64, path],
            )
            .ok();
    }

    pub fn search_paths(&self) -> Vec<SearchPath> {
        let db = self.conn();
        let mut stmt = db
            .prepare("SELECT path, recursive FROM search_paths ORDER BY path")
            .unwrap();
        stmt.query_map([], |r| {
            Ok(SearchPath {
                path: r.get(0)?,
                recursive: r.get::<_, i64>(1)? != 0,
            })
        })
        .unwrap()
        .filter_map(|r| r.ok())
        .collect()
    }

    // ── Videos ──────────────────────────────────────────────────────────

    /// Returns (id, size, modified_at, has_script) if the path is already known.
    pub fn video_lookup(&self, path: &str) -> Option<(i64, Option<i64>, Option<i64>, bool)> {
        self.conn()
            .query_row(
                "SELECT id, size, modified_at, has_script FROM videos WHERE path = ?1",
                [path],
                |r| {
                    Ok((
                        r.get(0)?,
                        r.get(1)?,
                        r.get(2)?,
                        r.get::<_, i64>(3)? != 0,
                    ))
                },
            )
            .ok()
    }

    pub fn video_insert(
        &self,
        path: &str,
        dir: &str,
        filename: &str,
        size: Option<i64>,
        modified_at: Option<i64>,
        has_script: bool,
        gen_thumb: bool,
    ) -> Option<i64> {
        let db = self.conn();
        db.execute(
            "INSERT OR IGNORE INTO videos (path, dir, filename, size, modified_at, has_script, gen_thumb)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                path,
                dir,
                filename,
                size,
                modified_at,
                has_script as i64,
                gen_thumb as i64
            ],
        )
        .ok()?;
        Some(db.last_insert_rowid())
    }

    /// Pairing can change without the file itself changing.
    pub fn video_set_script(&self, id: i64, has_script: bool) {
        self.conn()
            .execute(
                "UPDATE videos SET has_script = ?1 WHERE id = ?2",
                rusqlite::params![has_script as i64, id],
            )
            .ok();
    }

    /// A changed file gets its fingerprint cleared so the thumb is redone.
    pub fn video_update_meta(&self, id: i64, size: Option<i64>, modified_at: Option<i64>) {
        let db = self.conn();
        db.execute(
            "UPDATE videos SET size = ?1, modified_at = ?2, fingerprint = NULL WHERE id = ?3",
            rusqlite::params![size, modified_at, id],
        )
        .ok();
        db.execute("DELETE FROM thumb_fails WHERE video_id = ?1", [id])
            .ok();
    }

    pub fn video_remove(&self, id: i64) {
        let db = self.conn();
        db.execute("DELETE FROM videos WHERE id = ?1", [id]).ok();
        db.execute("DELETE FROM thumb_fails WHERE video_id = ?1", [id])
            .ok();
    }

    pub fn videos_newest_first(&self) -> Vec<VideoEntry> {
        let db = self.conn();
        let mut stmt = db
            .prepare(&format!(
                "SELECT {} FROM videos ORDER BY modified_at DESC, path",
                VIDEO_COLS
            ))
            .unwrap();
        stmt.query_map([], row_to_video)
            .unwrap()
            .filter_map(|r| r.ok())
            .collect()
    }

    /// All (id, path) pairs, for the prune pass after a rescan.
    pub fn video_paths(&self) -> Vec<(i64, String)> {
        let db = self.conn();
        let mut stmt = db.prepare("SELECT id, path FROM videos").unwrap();
        stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?)))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect()
    }

    pub fn video_set_fingerprint(&self, id: i64, fingerprint: &str) {
        self.conn()
            .execute(
                "UPDATE videos SET fingerprint = ?1 WHERE id = ?2",
                rusqlite::params![fingerprint, id],
            )
            .ok();
    }

    pub fn record_pick(&self, video_id: i64) {
        self.conn()
            .execute(
                "INSERT INTO history (video_id, action) VALUES (?1, 'pick')",
                [video_id],
            )
            .ok();
    }

    // ── Thumbnails ──────────────────────────────────────────────────────

    /// Next video that wants a thumbnail and doesn't have one yet.
    /// Random order keeps concurrent workers off the same row.
    pub fn next_missing_thumb(&self) -> Option<(i64, String)> {
        self.conn()
            .query_row(
                "SELECT v.id, v.path FROM videos v
                 WHERE v.gen_thumb = 1
                 AND v.id NOT IN (SELECT video_id FROM thumb_fails)
                 AND (v.fingerprint IS NULL
                      OR v.fingerprint NOT IN (SELECT fingerprint FROM thumbs))
                 ORDER BY RANDOM() LIMIT 1",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .ok()
    }

    pub fn thumb_save(&self, fingerprint: &str, webp: &[u8]) {
        self.conn()
            .execute(
                "INSERT OR REPLACE INTO thumbs (fingerprint, webp) VALUES (?1, ?2)",
                rusqlite::params![fingerprint, webp],
            )
            .ok();
    }

    pub fn thumb_get(&self, fingerprint: &str) -> Option<Vec<u8>> {
        self.conn()
            .query_row(
                "SELECT webp FROM thumbs WHERE fingerprint = ?1",
                [fingerprint],
                |r| r.get(0),
            )
            .ok()
    }

    pub fn thumb_exists(&self, fingerprint: &str) -> bool {
        self.conn()
            .query_row(
                "SELECT 1 FROM thumbs WHERE fingerprint = ?1",
                [fingerprint],
                |r| r.get::<_, i64>(0),
            )
            .is_ok()
    }

    pub fn record_thumb_fail(&self, video_id: i64, error: &str) {
        self.conn()
            .execute(
                "INSERT OR REPLACE INTO thumb_fails (video_id, error) VALUES (?1, ?2)",
                rusqlite::params![video_id, error],
            )
            .ok();
    }

    // ── Prefs ───────────────────────────────────────────────────────────

    pub fn pref_set(&self, key: &str, value: &serde_json::Value) {
        let json = value.to_string();
        self.conn()
            .execute(
                "INSERT OR REPLACE INTO prefs (key, value) VALUES (?1, ?2)",
                rusqlite::params![key, json],
            )
            .ok();
    }

    pub fn pref_get(&self, key: &str) -> Option<serde_json::Value> {
        let raw: String = self
            .conn()
            .query_row("SELECT value FROM prefs WHERE key = ?1", [key], |r| {
                r.get(0)
            })
            .ok()?;
        serde_json::from_str(&raw).ok()
    }

    // ── Stats ───────────────────────────────────────────────────────────

    pub fn stats(&self) -> LibraryStats {
        let db = self.conn();
        let count = |sql: &str| db.query_row(sql, [], |r| r.get(0)).unwrap_or(0);
        LibraryStats {
            total_videos: count("SELECT COUNT(*) FROM videos"),
            total_paths: count("SELECT COUNT(*) FROM search_paths"),
            thumbs_ready: count(
                "SELECT COUNT(*) FROM videos v
                 JOIN thumbs t ON v.fingerprint = t.fingerprint",
            ),
            thumbs_failed: count("SELECT COUNT(*) FROM thumb_fails"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Db {
        let db = Db::open_memory();
        db.ensure_schema();
        db
    }

    #[test]
    fn schema_is_idempotent() {
        let db = db();
        db.ensure_schema();
        db.ensure_schema();
    }

    #[test]
    fn search_path_roundtrip() {
        let db = db();
        db.search_path_add("/media/a", false);
        db.search_path_add("/media/b", true);
        let paths = db.search_paths();
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[0].path, "/media/a");
        assert!(!paths[0].recursive);
        assert!(paths[1].recursive);

        db.search_path_remove("/media/a");
        assert_eq!(db.search_paths().len(), 1);
    }

    #[test]
    fn search_path_add_updates_recursive() {
        let db = db();
        db.search_path_add("/media", false);
        db.search_path_add("/media", true);
        let paths = db.search_paths();
        assert_eq!(paths.len(), 1);
        assert!(paths[0].recursive);
    }

    #[test]
    fn video_insert_and_lookup() {
        let db = db();
        let id = db
            .video_insert("/m/a.mp4", "/m", "a.mp4", Some(10), Some(100), true, true)
            .unwrap();
        let (found, size, mtime, _) = db.video_lookup("/m/a.mp4").unwrap();
        assert_eq!(found, id);
        assert_eq!(size, Some(10));
        assert_eq!(mtime, Some(100));
        assert!(db.video_lookup("/m/missing.mp4").is_none());
    }

    #[test]
    fn video_update_clears_fingerprint_and_fail() {
        let db = db();
        let id = db
            .video_insert("/m/a.mp4", "/m", "a.mp4", Some(10), Some(100), true, true)
            .unwrap();
        db.video_set_fingerprint(id, "fp:abc");
        db.record_thumb_fail(id, "boom");

        db.video_update_meta(id, Some(20), Some(200));

        let videos = db.videos_newest_first();
        assert_eq!(videos[0].fingerprint, None);
        assert_eq!(videos[0].size, Some(20));
        assert_eq!(db.stats().thumbs_failed, 0);
    }

    #[test]
    fn newest_first_ordering() {
        let db = db();
        db.video_insert("/m/old.mp4", "/m", "old.mp4", None, Some(100), true, true);
        db.video_insert("/m/new.mp4", "/m", "new.mp4", None, Some(300), true, true);
        db.video_insert("/m/mid.mp4", "/m", "mid.mp4", None, Some(200), true, true);
        let names: Vec<String> = db
            .videos_newest_first()
            .into_iter()
            .map(|v| v.filename)
            .collect();
        assert_eq!(names, vec!["new.mp4", "mid.mp4", "old.mp4"]);
    }

    #[test]
    fn thumb_save_and_get() {
        let db = db();
        db.thumb_save("fp:1", b"webpdata");
        assert!(db.thumb_exists("fp:1"));
        assert_eq!(db.thumb_get("fp:1").unwrap(), b"webpdata");
        assert!(!db.thumb_exists("fp:2"));
        assert!(db.thumb_get("fp:2").is_none());
    }

    #[test]
    fn next_missing_thumb_skips_done_and_failed() {
        let db = db();
        let a = db
            .video_insert("/m/a.mp4", "/m", "a.mp4", None, Some(1), true, true)
            .unwrap();
        let b = db
            .video_insert("/m/b.mp4", "/m", "b.mp4", None, Some(2), true, true)
            .unwrap();
        let c = db
            .video_insert("/m/c.mp4", "/m", "c.mp4", None, Some(3), true, true)
            .unwrap();

        // a: thumb done
        db.video_set_fingerprint(a, "fp:a");
        db.thumb_save("fp:a", b"x");
        // b: permanently failed
        db.record_thumb_fail(b, "broken");

        let (id, path) = db.next_missing_thumb().unwrap();
        assert_eq!(id, c);
        assert_eq!(path, "/m/c.mp4");

        // c done too → nothing left
        db.video_set_fingerprint(c, "fp:c");
        db.thumb_save("fp:c", b"y");
        assert!(db.next_missing_thumb().is_none());
    }

    #[test]
    fn next_missing_thumb_respects_gen_thumb_flag() {
        let db = db();
        db.video_insert("/m/no.3gp", "/m", "no.3gp", None, Some(1), true, false);
        assert!(db.next_missing_thumb().is_none());
    }

    #[test]
    fn prefs_roundtrip() {
        let db = db();
        assert!(db.pref_get("items_per_row").is_none());
        db.pref_set("items_per_row", &serde_json::json!(7));
        assert_eq!(db.pref_get("items_per_row"), Some(serde_json::json!(7)));
        db.pref_set("items_per_row", &serde_json::json!(3));
        assert_eq!(db.pref_get("items_per_row"), Some(serde_json::json!(3)));
    }

    #[test]
    fn stats_counts() {
        let db = db();
        db.search_path_add("/m", true);
        let a = db
            .video_insert("/m/a.mp4", "/m", "a.mp4", None, Some(1), true, true)
            .unwrap();
        db.video_insert("/m/b.mp4", "/m", "b.mp4", None, Some(2), true, true);
        db.video_set_fingerprint(a, "fp:a");
        db.thumb_save("fp:a", b"x");

        let stats = db.stats();
        assert_eq!(stats.total_videos, 2);
        assert_eq!(stats.total_paths, 1);
        assert_eq!(stats.thumbs_ready, 1);
        assert_eq!(stats.thumbs_failed, 0);
    }

    #[test]
    fn video_remove_cleans_fail_row() {
        let db = db();
        let id = db
            .video_insert("/m/a.mp4", "/m", "a.mp4", None, Some(1), true, true)
            .unwrap();
        db.record_thumb_fail(id, "x");
        db.video_remove(id);
        assert_eq!(db.stats().total_videos, 0);
        assert_eq!(db.stats().thumbs_failed, 0);
    }

    #[test]
    fn record_pick_is_logged() {
        let db = db();
        let id = db
            .video_insert("/m/a.mp4", "/m", "a.mp4", None, Some(1), true, true)
            .unwrap();
        db.record_pick(id);
        db.record_pick(id);
        let n: i64 = db
            .conn()
            .query_row(
                "SELECT COUNT(*) FROM history WHERE action = 'pick'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(n, 2);
    }
}
