//! The video browser panel: a filterable grid of thumbnail buttons over the
//! library, plus the settings popup for managing search paths.
//!
//! Picking a scripted video emits `BrowserEvent::Picked` on the hand-off
//! channel; the main loop decides what to do with it. The item list is
//! shared with the scan thread behind a mutex.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};

use imgui::{Condition, StyleColor, WindowFlags};

use crate::clean_path;
use crate::db::{Db, SearchPath, VideoEntry};
use crate::dialog::{self, DialogResult};
use crate::scanner;
use crate::statusbar;
use crate::texture::{Preloader, TextureCache};

/// Grid rows are clamped to this many items.
const MAX_ITEMS_PER_ROW: i32 = 25;

/// Hand-off events for the host application.
#[derive(Debug)]
pub enum BrowserEvent {
    /// A scripted video was clicked — here is its path.
    Picked(String),
    /// A search path was added (watcher should pick it up).
    SearchPathAdded(SearchPath),
    /// A search path was removed or its recursive flag changed.
    SearchPathRemoved(String),
}

pub struct Browser {
    /// Shared with the scan thread; the UI only reads under the lock.
    pub items: Arc<Mutex<Vec<VideoEntry>>>,
    pub scanning: Arc<AtomicBool>,
    /// Set to trigger a rescan from the main loop.
    pub cache_needs_update: bool,
    /// Shown after filtering, for the status bar.
    pub shown_count: usize,

    filter: String,
    items_per_row: i32,
    show_thumbnails: bool,
    show_settings: bool,

    events: mpsc::Sender<BrowserEvent>,
    pending_folder: Option<mpsc::Receiver<DialogResult>>,
    pending_locate: Option<mpsc::Receiver<DialogResult>>,
    pending_export: Option<mpsc::Receiver<DialogResult>>,
}

impl Browser {
    /// Load cached videos and view prefs; a rescan is only forced when the
    /// library is empty.
    pub fn new(db: &Db, events: mpsc::Sender<BrowserEvent>) -> Self {
        let cached = db.videos_newest_first();
        let cache_needs_update = cached.is_empty();

        let items_per_row = db
            .pref_get("items_per_row")
            .and_then(|v| v.as_i64())
            .map(|n| clamp_per_row(n as i32))
            .unwrap_or(6);
        let show_thumbnails = db
            .pref_get("show_thumbnails")
            .and_then(|v| v.as_bool())
            .unwrap_or(true);

        Browser {
            items: Arc::new(Mutex::new(cached)),
            scanning: Arc::new(AtomicBool::new(false)),
            cache_needs_update,
            shown_count: 0,
            filter: String::new(),
            items_per_row,
            show_thumbnails,
            show_settings: false,
            events,
            pending_folder: None,
            pending_locate: None,
            pending_export: None,
        }
    }

    /// Draw the panel. Thumbnail decodes are requested lazily for visible
    /// items; finished decodes get uploaded here (main thread owns GL).
    pub fn draw(
        &mut self,
        ui: &imgui::Ui,
        db: &Db,
        tex_cache: &mut TextureCache,
        preloader: &Preloader,
    ) {
        self.poll_dialogs(db);

        let window = ui
            .window("Library")
            .size([900.0, 580.0], Condition::FirstUseEver)
            .position([16.0, 16.0], Condition::FirstUseEver)
            .menu_bar(true)
            .begin();
        let _wt = match window {
            Some(t) => t,
            None => return,
        };

        self.draw_menu_bar(ui, db);

        if ui.button("Refresh") {
            self.cache_needs_update = true;
        }
        ui.same_line();
        ui.text("Library");
        ui.separator();

        ui.set_next_item_width(-1.0);
        ui.input_text("##filter", &mut self.filter)
            .hint("Filter")
            .build();

        let style = ui.clone_style();
        let avail = ui.content_region_avail();
        let [item_w, item_h] = grid_item_size(
            avail[0],
            style.scrollbar_size,
            style.item_inner_spacing[0],
            style.item_spacing[0],
            self.items_per_row,
        );

        let per_row = self.items_per_row.max(1) as usize;
        let show_thumbs = self.show_thumbnails;
        let filter = self.filter.clone();
        let scanning = self.scanning.load(Ordering::Acquire);
        let items = self.items.clone();

        let mut picked: Vec<VideoEntry> = Vec::new();
        let mut shown = 0usize;

        ui.child_window("items").border(true).build(|| {
            let items = items.lock().unwrap();

            if items.is_empty() {
                let msg = if scanning {
                    "Scanning…"
                } else {
                    "Library is empty — add a search path in Settings."
                };
                ui.text_disabled(msg);
                return;
            }

            for item in items.iter() {
                if !matches_filter(&item.filename, &filter) {
                    continue;
                }

                let clicked =
                    draw_item(ui, db, tex_cache, preloader, item, [item_w, item_h], show_thumbs);
                if clicked {
                    picked.push(item.clone());
                }

                statusbar::tooltip(ui, &item_tooltip(item));

                shown += 1;
                if shown % per_row != 0 {
                    ui.same_line();
                }
            }
        });

        self.shown_count = shown;

        for entry in picked {
            pick(&self.events, &entry);
        }

        drop(_wt);
        self.draw_settings(ui, db);
    }

    fn draw_menu_bar(&mut self, ui: &imgui::Ui, db: &Db) {
        let _bar = match ui.begin_menu_bar() {
            Some(t) => t,
            None => return,
        };

        if let Some(_menu) = ui.begin_menu("View") {
            if ui
                .menu_item_config("Show thumbnails")
                .build_with_ref(&mut self.show_thumbnails)
            {
                db.pref_set("show_thumbnails", &serde_json::json!(self.show_thumbnails));
            }
            ui.set_next_item_width(ui.current_font_size() * 5.0);
            if ui.input_int("Items per row", &mut self.items_per_row).build() {
                self.items_per_row = clamp_per_row(self.items_per_row);
                db.pref_set("items_per_row", &serde_json::json!(self.items_per_row));
            }
        }

        if let Some(_menu) = ui.begin_menu("Library") {
            if ui.menu_item("Locate video…") && self.pending_locate.is_none() {
                let filters = vec![("Videos".to_string(), scanner::video_extensions())];
                self.pending_locate = Some(dialog::open_file("Locate video", "", filters, false));
            }
            if ui.menu_item("Export listing…") && self.pending_export.is_none() {
                self.pending_export = Some(dialog::save_file(
                    "Export library listing",
                    "vb-library.json",
                    vec![("JSON".to_string(), vec!["json".to_string()])],
                ));
            }
        }

        if ui.menu_item("Settings") {
            self.show_settings = true;
        }
    }

    fn draw_settings(&mut self, ui: &imgui::Ui, db: &Db) {
        if !self.show_settings {
            return;
        }

        let mut open = true;
        if let Some(_token) = ui
            .window("Browser settings")
            .opened(&mut open)
            .flags(WindowFlags::ALWAYS_AUTO_RESIZE)
            .begin()
        {
            let paths = db.search_paths();
            let mut removed: Option<String> = None;

            for (i, sp) in paths.iter().enumerate() {
                let _id = ui.push_id_usize(i);

                ui.text(&sp.path);
                statusbar::tooltip(ui, &sp.path);

                ui.same_line();
                let mut recursive = sp.recursive;
                if ui.checkbox("Recursive", &mut recursive) {
                    db.search_path_set_recursive(&sp.path, recursive);
                    self.cache_needs_update = true;
                    // Mode changed: drop the old watch, register the new one
                    self.events
                        .send(BrowserEvent::SearchPathRemoved(sp.path.clone()))
                        .ok();
                    self.events
                        .send(BrowserEvent::SearchPathAdded(SearchPath {
                            path: sp.path.clone(),
                            recursive,
                        }))
                        .ok();
                }

                ui.same_line();
                if ui.button("Remove") {
                    removed = Some(sp.path.clone());
                }
            }

            if paths.is_empty() {
                ui.text_disabled("No search paths yet.");
            }

            if let Some(path) = removed {
                db.search_path_remove(&path);
                self.cache_needs_update = true;
                self.events.send(BrowserEvent::SearchPathRemoved(path)).ok();
            }

            ui.separator();
            if ui.button_with_size("Choose path", [-1.0, 0.0]) && self.pending_folder.is_none() {
                self.pending_folder = Some(dialog::pick_folder("Choose search path", ""));
            }
            if ui.button_with_size("Open data folder", [-1.0, 0.0]) {
                crate::sys::open_url(&crate::db::data_dir().to_string_lossy());
            }
        }
        if !open {
            self.show_settings = false;
        }
    }

    /// Poll the off-thread dialogs started from the UI.
    fn poll_dialogs(&mut self, db: &Db) {
        if let Some(rx) = &self.pending_folder {
            if let Ok(result) = rx.try_recv() {
                self.pending_folder = None;
                if let Some(path) = result.files.first() {
                    self.add_search_path(db, path, false);
                }
            }
        }

        if let Some(rx) = &self.pending_locate {
            if let Ok(result) = rx.try_recv() {
                self.pending_locate = None;
                if let Some(file) = result.files.first() {
                    if let Some(parent) = file.parent() {
                        self.add_search_path(db, parent, false);
                    }
                }
            }
        }

        if let Some(rx) = &self.pending_export {
            if let Ok(result) = rx.try_recv() {
                self.pending_export = None;
                if let Some(target) = result.files.first() {
                    export_listing(db, target);
                }
            }
        }
    }

    fn add_search_path(&mut self, db: &Db, path: &Path, recursive: bool) {
        let p = clean_path(&path.to_string_lossy());
        db.search_path_add(&p, recursive);
        self.cache_needs_update = true;
        self.events
            .send(BrowserEvent::SearchPathAdded(SearchPath {
                path: p,
                recursive,
            }))
            .ok();
        eprintln!("browser: +search path {}", path.display());
    }
}

/// One grid cell: thumbnail image-button when the texture is resident,
/// filename button otherwise. Returns true on click.
#[allow(clippy::too_many_arguments)]
fn draw_item(
    ui: &imgui::Ui,
    db: &Db,
    tex_cache: &mut TextureCache,
    preloader: &Preloader,
    item: &VideoEntry,
    size: [f32; 2],
    show_thumbs: bool,
) -> bool {
    let _c1 = ui.push_style_color(StyleColor::Button, ui.style_color(StyleColor::PlotLines));
    let _c2 = ui.push_style_color(
        StyleColor::ButtonHovered,
        ui.style_color(StyleColor::PlotLinesHovered),
    );

    // Unscripted videos are listed but rendered dimmer and never pick
    let tint = if item.has_script {
        [1.0, 1.0, 1.0, 1.0]
    } else {
        [0.6, 0.6, 0.6, 1.0]
    };

    let key = item.fingerprint.as_deref();
    let tex = if show_thumbs {
        key.and_then(|k| tex_cache.get(k))
    } else {
        None
    };

    let clicked = if let Some(info) = tex {
        // Thumbnail drawn via the draw list over an invisible button, so
        // clicking and hovering behave like any other widget
        let p_min = ui.cursor_screen_pos();
        let p_max = [p_min[0] + size[0], p_min[1] + size[1]];
        let clicked = ui.invisible_button(format!("##thumb{}", item.id), size);

        let [img_min, img_max] = letterbox(p_min, size, info.width, info.height);
        let draw_list = ui.get_window_draw_list();
        draw_list
            .add_image(imgui::TextureId::new(info.gl_id as usize), img_min, img_max)
            .col(tint)
            .build();
        if ui.is_item_hovered() {
            draw_list
                .add_rect(p_min, p_max, ui.style_color(StyleColor::PlotLinesHovered))
                .build();
        }
        clicked
    } else {
        let _c3 = (!item.has_script).then(|| ui.push_style_color(StyleColor::Text, tint));
        ui.button_with_size(format!("{}##{}", item.filename, item.id), size)
    };

    // Request the thumbnail lazily, only while the cell is on screen
    if show_thumbs && item.gen_thumb && ui.is_item_visible() {
        if let Some(key) = key {
            if !tex_cache.has(key) {
                if let Some(img) = preloader.try_take(key) {
                    tex_cache.upload(key, img);
                } else if !preloader.is_pending(key) {
                    if let Some(blob) = db.thumb_get(key) {
                        preloader.schedule_blob(key.to_string(), blob);
                    }
                }
            }
        }
    }

    clicked
}

/// Fit a `tex_w`×`tex_h` image inside the cell at `p_min`, centered.
fn letterbox(p_min: [f32; 2], cell: [f32; 2], tex_w: u32, tex_h: u32) -> [[f32; 2]; 2] {
    let (tw, th) = (tex_w.max(1) as f32, tex_h.max(1) as f32);
    let scale = (cell[0] / tw).min(cell[1] / th);
    let (dw, dh) = (tw * scale, th * scale);
    let min = [
        p_min[0] + (cell[0] - dw) * 0.5,
        p_min[1] + (cell[1] - dh) * 0.5,
    ];
    [min, [min[0] + dw, min[1] + dh]]
}

/// The click hand-off: only scripted videos are picked.
fn pick(events: &mpsc::Sender<BrowserEvent>, entry: &VideoEntry) -> bool {
    if !entry.has_script {
        return false;
    }
    events.send(BrowserEvent::Picked(entry.path.clone())).is_ok()
}

fn item_tooltip(item: &VideoEntry) -> String {
    let mut tip = format!("{}\n{}", item.filename, item.dir);
    if let Some(size) = item.size {
        tip.push_str(&format!("\n{}", statusbar::fmt_size(size)));
    }
    if let Some(mtime) = item.modified_at {
        tip.push_str(&format!("\n{}", statusbar::fmt_date(mtime)));
    }
    if !item.has_script {
        tip.push_str("\nno companion script");
    }
    tip
}

/// Write the library listing as JSON, for the export dialog.
fn export_listing(db: &Db, target: &Path) {
    let videos = db.videos_newest_first();
    let rows: Vec<serde_json::Value> = videos
        .iter()
        .map(|v| {
            serde_json::json!({
                "path": v.path,
                "filename": v.filename,
                "size": v.size,
                "modified_at": v.modified_at,
                "has_script": v.has_script,
            })
        })
        .collect();

    let json = match serde_json::to_string_pretty(&rows) {
        Ok(j) => j,
        Err(e) => {
            eprintln!("browser: export serialize failed: {}", e);
            return;
        }
    };
    match std::fs::write(target, json) {
        Ok(()) => eprintln!("browser: exported {} entries to {}", rows.len(), target.display()),
        Err(e) => eprintln!("browser: export {} failed: {}", target.display(), e),
    }
}

// ── Pure layout / filter helpers ────────────────────────────────────────

/// Case-insensitive substring match; an empty filter shows everything.
fn matches_filter(name: &str, filter: &str) -> bool {
    filter.is_empty() || name.to_lowercase().contains(&filter.to_lowercase())
}

fn clamp_per_row(n: i32) -> i32 {
    n.clamp(1, MAX_ITEMS_PER_ROW)
}

/// Cell size for the grid: width splits the content region evenly, height
/// keeps a 16:9 aspect. Never collapses below 2px.
fn grid_item_size(
    avail_w: f32,
    scrollbar_w: f32,
    inner_spacing: f32,
    spacing: f32,
    per_row: i32,
) -> [f32; 2] {
    let n = per_row.max(1) as f32;
    let w = ((avail_w - scrollbar_w - 3.0 * inner_spacing - n * spacing) / n).max(2.0);
    [w, w * 9.0 / 16.0]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, has_script: bool) -> VideoEntry {
        VideoEntry {
            id: 1,
            path: path.to_string(),
            dir: "/m".to_string(),
            filename: path.rsplit('/').next().unwrap_or(path).to_string(),
            size: Some(1024),
            modified_at: Some(1704067200),
            has_script,
            gen_thumb: true,
            fingerprint: None,
        }
    }

    // ── matches_filter ──────────────────────────────────────────────────

    #[test]
    fn filter_empty_matches_all() {
        assert!(matches_filter("clip.mp4", ""));
        assert!(matches_filter("", ""));
    }

    #[test]
    fn filter_case_insensitive() {
        assert!(matches_filter("Holiday_Clip.MP4", "holiday"));
        assert!(matches_filter("holiday_clip.mp4", "HOLIDAY"));
        assert!(matches_filter("café_trip.mp4", "CAFÉ"));
    }

    #[test]
    fn filter_rejects_non_matches() {
        assert!(!matches_filter("clip.mp4", "vacation"));
        assert!(!matches_filter("", "x"));
    }

    // ── clamp_per_row ───────────────────────────────────────────────────

    #[test]
    fn per_row_clamps_both_ends() {
        assert_eq!(clamp_per_row(0), 1);
        assert_eq!(clamp_per_row(-3), 1);
        assert_eq!(clamp_per_row(6), 6);
        assert_eq!(clamp_per_row(26), 25);
        assert_eq!(clamp_per_row(1000), 25);
    }

    // ── grid_item_size ──────────────────────────────────────────────────

    #[test]
    fn grid_size_aspect_ratio() {
        let [w, h] = grid_item_size(1000.0, 14.0, 4.0, 8.0, 4);
        assert!((h - w * 9.0 / 16.0).abs() < 0.001);
    }

    #[test]
    fn grid_size_shrinks_with_more_columns() {
        let [w4, _] = grid_item_size(1000.0, 14.0, 4.0, 8.0, 4);
        let [w8, _] = grid_item_size(1000.0, 14.0, 4.0, 8.0, 8);
        assert!(w8 < w4);
    }

    #[test]
    fn grid_size_never_collapses() {
        let [w, h] = grid_item_size(10.0, 14.0, 4.0, 8.0, 25);
        assert_eq!(w, 2.0);
        assert!(h > 0.0);
    }

    #[test]
    fn grid_size_tolerates_zero_per_row() {
        let [w, _] = grid_item_size(1000.0, 14.0, 4.0, 8.0, 0);
        assert!(w > 0.0);
    }

    // ── letterbox ───────────────────────────────────────────────────────

    #[test]
    fn letterbox_wide_image_pads_vertically() {
        // 32:9 image in a 16:9 cell → full width, half height, centered
        let [min, max] = letterbox([0.0, 0.0], [320.0, 180.0], 640, 180);
        assert_eq!(min[0], 0.0);
        assert_eq!(max[0], 320.0);
        assert!((min[1] - 45.0).abs() < 0.001);
        assert!((max[1] - 135.0).abs() < 0.001);
    }

    #[test]
    fn letterbox_tall_image_pads_horizontally() {
        let [min, max] = letterbox([10.0, 10.0], [160.0, 160.0], 100, 200);
        assert!((max[1] - min[1] - 160.0).abs() < 0.001, "full height");
        assert!((max[0] - min[0] - 80.0).abs() < 0.001, "half width");
        assert!(min[0] > 10.0, "centered");
    }

    #[test]
    fn letterbox_zero_dims_do_not_divide_by_zero() {
        let [min, max] = letterbox([0.0, 0.0], [100.0, 100.0], 0, 0);
        assert!(min[0].is_finite() && max[1].is_finite());
    }

    // ── pick ────────────────────────────────────────────────────────────

    #[test]
    fn pick_sends_scripted_paths() {
        let (tx, rx) = mpsc::channel();
        assert!(pick(&tx, &entry("/m/clip.mp4", true)));
        match rx.try_recv().unwrap() {
            BrowserEvent::Picked(path) => assert_eq!(path, "/m/clip.mp4"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn pick_ignores_unscripted() {
        let (tx, rx) = mpsc::channel();
        assert!(!pick(&tx, &entry("/m/bare.mp4", false)));
        assert!(rx.try_recv().is_err());
    }

    // ── tooltip ─────────────────────────────────────────────────────────

    #[test]
    fn tooltip_mentions_missing_script() {
        let tip = item_tooltip(&entry("/m/bare.mp4", false));
        assert!(tip.contains("bare.mp4"));
        assert!(tip.contains("no companion script"));

        let tip = item_tooltip(&entry("/m/ok.mp4", true));
        assert!(!tip.contains("no companion script"));
    }

    // ── construction / prefs ────────────────────────────────────────────

    #[test]
    fn new_forces_scan_only_when_empty() {
        let db = Db::open_memory();
        db.ensure_schema();
        let (tx, _rx) = mpsc::channel();
        let b = Browser::new(&db, tx);
        assert!(b.cache_needs_update, "empty library wants a scan");

        db.video_insert("/m/a.mp4", "/m", "a.mp4", None, Some(1), true, true);
        let (tx2, _rx2) = mpsc::channel();
        let b2 = Browser::new(&db, tx2);
        assert!(!b2.cache_needs_update);
        assert_eq!(b2.items.lock().unwrap().len(), 1);
    }

    #[test]
    fn new_loads_and_clamps_prefs() {
        let db = Db::open_memory();
        db.ensure_schema();
        db.pref_set("items_per_row", &serde_json::json!(99));
        db.pref_set("show_thumbnails", &serde_json::json!(false));

        let (tx, _rx) = mpsc::channel();
        let b = Browser::new(&db, tx);
        assert_eq!(b.items_per_row, 25);
        assert!(!b.show_thumbnails);
    }

    // ── export ──────────────────────────────────────────────────────────

    #[test]
    fn export_listing_writes_json() {
        let db = Db::open_memory();
        db.ensure_schema();
        db.video_insert("/m/a.mp4", "/m", "a.mp4", Some(10), Some(2), true, true);
        db.video_insert("/m/b.mp4", "/m", "b.mp4", Some(20), Some(1), false, true);

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.json");
        export_listing(&db, &target);

        let raw = std::fs::read_to_string(&target).unwrap();
        let rows: Vec<serde_json::Value> = serde_json::from_str(&raw).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["filename"], "a.mp4");
        assert_eq!(rows[1]["has_script"], false);
    }
}
