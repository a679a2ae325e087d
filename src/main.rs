#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]
// vb: video browser — thumbnail grid over script-paired media libraries.
// Scanning: walkdir over configured search paths → SQLite cache
// Thumbnails: ffmpeg keyframe extraction → WebP blobs → GL textures
// Usage: vb [add|remove|paths|scan|status|thumbs], no subcommand for the GUI

const VERSION: &str = env!("CARGO_PKG_VERSION");
const GIT_HASH: &str = env!("GIT_HASH");

mod browser;
mod cli;
mod db;
mod dialog;
mod scanner;
mod statusbar;
mod sys;
mod texture;
mod thumbs;
mod watcher;

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};

use sdl2::event::Event;
use sdl2::keyboard::Keycode;
use sdl2::video::GLProfile;

use browser::{Browser, BrowserEvent};
use db::{Db, SearchPath};
use texture::{Preloader, TextureCache};

/// Strip Windows extended-length path prefix (`\\?\`) if present.
/// Windows `canonicalize` returns `\\?\C:\...` paths; we strip the prefix
/// so paths display cleanly and match across the codebase.
pub(crate) fn clean_path(p: &str) -> String {
    p.strip_prefix(r"\\?\").unwrap_or(p).to_string()
}

/// A path dropped onto the window becomes a search path: directories are
/// added as-is (non-recursive), videos add their parent directory.
/// Returns the added path so the caller can watch it.
fn handle_drop(db: &Db, dropped: &Path) -> Option<SearchPath> {
    let path = match dropped.canonicalize() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("drop: cannot resolve {}: {}", dropped.display(), e);
            return None;
        }
    };

    let dir = if path.is_dir() {
        path
    } else if path.is_file() && scanner::browser_ext(&path).is_some() {
        path.parent()?.to_path_buf()
    } else {
        eprintln!("drop: not a video or directory: {}", path.display());
        return None;
    };

    let dir_str = clean_path(&dir.to_string_lossy());
    db.search_path_add(&dir_str, false);
    eprintln!("drop: +search path {}", dir_str);
    Some(SearchPath {
        path: dir_str,
        recursive: false,
    })
}

#[derive(Parser, Debug)]
#[command(name = "vb", about = "Video browser — script-paired media library")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Add a search path (scans it immediately)
    Add {
        path: PathBuf,
        /// Also scan subdirectories
        #[arg(long)]
        recursive: bool,
    },
    /// Remove a search path
    Remove { path: PathBuf },
    /// List search paths
    Paths,
    /// Re-scan all search paths
    Scan,
    /// Show library statistics
    Status,
    /// Generate missing thumbnails until done
    Thumbs,
}

fn main() {
    let args = Cli::parse();

    // ── Database ────────────────────────────────────────────────────────
    let vb_db = Db::open_default();
    vb_db.ensure_schema();

    // ── CLI subcommands (non-GUI, exit after) ───────────────────────────
    if let Some(cmd) = args.command {
        match cmd {
            Commands::Add { path, recursive } => cli::add(&vb_db, &path, recursive),
            Commands::Remove { path } => cli::remove(&vb_db, &path),
            Commands::Paths => cli::paths(&vb_db),
            Commands::Scan => cli::scan(&vb_db),
            Commands::Status => cli::status(&vb_db),
            Commands::Thumbs => cli::thumbs(&vb_db),
        }
        return;
    }

    // ── GUI mode ────────────────────────────────────────────────────────
    eprintln!("vb {} ({})", VERSION, GIT_HASH);
    {
        let stats = vb_db.stats();
        eprintln!(
            "vb.db: {} videos, {} search paths",
            stats.total_videos, stats.total_paths
        );
    }

    // ── Background thumbnail engine ─────────────────────────────────────
    let mut thumb_engine = thumbs::ThumbEngine::start(vb_db.clone());

    // ── Filesystem watcher over the search paths ────────────────────────
    let (mut fs_watcher, fs_rx) = watcher::FsWatcher::start(vb_db.search_paths());

    // ── Browser panel + hand-off channel ────────────────────────────────
    let (browser_tx, browser_rx) = mpsc::channel();
    let mut browser = Browser::new(&vb_db, browser_tx);

    // ── SDL2 + OpenGL ───────────────────────────────────────────────────
    let sdl = sdl2::init().expect("SDL2 init failed");
    let video = sdl.video().expect("SDL2 video init failed");

    let gl_attr = video.gl_attr();
    gl_attr.set_context_profile(GLProfile::Core);
    gl_attr.set_context_version(3, 3);

    let window = video
        .window("vb", 1280, 720)
        .opengl()
        .resizable()
        .position_centered()
        .build()
        .expect("Failed to create window");

    let _gl_ctx = window.gl_create_context().expect("GL context failed");
    window
        .gl_make_current(&_gl_ctx)
        .expect("GL make_current failed");
    video.gl_set_swap_interval(1).ok();

    gl::load_with(|name| video.gl_get_proc_address(name) as *const _);

    // ── Dear ImGui ──────────────────────────────────────────────────────
    let mut imgui_ctx = imgui::Context::create();
    imgui_ctx.set_ini_filename(None);
    statusbar::add_font(&mut imgui_ctx);
    statusbar::apply_theme(&mut imgui_ctx);

    let mut imgui_platform = imgui_sdl2_support::SdlPlatform::new(&mut imgui_ctx);
    let gl_glow =
        unsafe { glow::Context::from_loader_function(|s| video.gl_get_proc_address(s) as _) };
    let mut imgui_renderer = imgui_glow_renderer::AutoRenderer::new(gl_glow, &mut imgui_ctx)
        .expect("Failed to create imgui glow renderer");

    // ── Texture cache + preloader ───────────────────────────────────────
    let mut tex_cache = TextureCache::new(256);
    let preloader = Preloader::new();

    // ── State ───────────────────────────────────────────────────────────
    let mut last_pick: Option<String> = None;
    // Watcher signals arrive in bursts; rescan once things settle
    const RESCAN_DEBOUNCE: Duration = Duration::from_millis(500);
    let mut rescan_after: Option<Instant> = None;
    // Library counts for the status bar, refreshed on a coarse interval
    let mut cached_stats = vb_db.stats();
    let mut stats_stamp = Instant::now();

    // ── Main loop ───────────────────────────────────────────────────────
    let mut event_pump = sdl.event_pump().expect("Failed to create event pump");
    let mut running = true;

    while running {
        // ── Drain watcher signals (debounced into one rescan) ───────────
        while let Ok(watcher::LibraryChanged(dir)) = fs_rx.try_recv() {
            eprintln!("watch: change in {}", dir);
            rescan_after = Some(Instant::now() + RESCAN_DEBOUNCE);
        }
        if let Some(at) = rescan_after {
            if Instant::now() >= at {
                rescan_after = None;
                browser.cache_needs_update = true;
            }
        }

        // ── Drain hand-off events ───────────────────────────────────────
        while let Ok(ev) = browser_rx.try_recv() {
            match ev {
                BrowserEvent::Picked(path) => {
                    if let Some((id, ..)) = vb_db.video_lookup(&path) {
                        vb_db.record_pick(id);
                    }
                    // The hand-off seam: the host reads picks from stdout
                    println!("{}", path);
                    last_pick = Some(path);
                }
                BrowserEvent::SearchPathAdded(sp) => fs_watcher.watch(sp),
                BrowserEvent::SearchPathRemoved(path) => fs_watcher.unwatch(&path),
            }
        }

        // ── Start a rescan when the cache is dirty ──────────────────────
        if browser.cache_needs_update {
            browser.cache_needs_update = false;
            scanner::start_scan(
                vb_db.clone(),
                browser.items.clone(),
                browser.scanning.clone(),
            );
        }

        // ── SDL events ──────────────────────────────────────────────────
        for event in event_pump.poll_iter() {
            imgui_platform.handle_event(&mut imgui_ctx, &event);

            match event {
                Event::Quit { .. } => running = false,

                Event::KeyDown {
                    keycode: Some(key), ..
                } if !imgui_ctx.io().want_capture_keyboard => match key {
                    Keycode::Q | Keycode::Escape => running = false,
                    Keycode::R => browser.cache_needs_update = true,
                    Keycode::O => {
                        if let Some(ref path) = last_pick {
                            sys::open_file_explorer(path);
                        }
                    }
                    _ => {}
                },

                Event::DropFile { filename, .. } => {
                    if let Some(sp) = handle_drop(&vb_db, Path::new(&filename)) {
                        fs_watcher.watch(sp);
                        browser.cache_needs_update = true;
                    }
                }

                _ => {}
            }
        }

        // ── Render ──────────────────────────────────────────────────────
        let (w, h) = window.drawable_size();
        unsafe {
            gl::BindFramebuffer(gl::FRAMEBUFFER, 0);
            gl::Viewport(0, 0, w as i32, h as i32);
            gl::ClearColor(0.05, 0.05, 0.05, 1.0);
            gl::Clear(gl::COLOR_BUFFER_BIT);
        }

        imgui_platform.prepare_frame(&mut imgui_ctx, &window, &event_pump);
        let ui = imgui_ctx.new_frame();

        browser.draw(ui, &vb_db, &mut tex_cache, &preloader);

        if stats_stamp.elapsed() > Duration::from_millis(500) {
            cached_stats = vb_db.stats();
            stats_stamp = Instant::now();
        }
        let total = browser.items.lock().unwrap().len();
        let info = statusbar::StatusInfo {
            picked: last_pick.as_deref(),
            shown: browser.shown_count,
            total,
            search_paths: cached_stats.total_paths as usize,
            thumbs_done: cached_stats.thumbs_ready as u64,
            thumbs_failed: cached_stats.thumbs_failed as u64,
            scanning: browser.scanning.load(Ordering::Acquire),
        };
        statusbar::draw_status_bar(ui, &info, w as f32, h as f32);

        let draw_data = imgui_ctx.render();
        imgui_renderer.render(draw_data).ok();

        window.gl_swap_window();
        std::thread::sleep(Duration::from_millis(2));
    }

    // ── Shutdown ────────────────────────────────────────────────────────
    thumb_engine.stop();
    fs_watcher.stop();
}
