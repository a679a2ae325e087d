//! Thin OS helpers: hand a URL or path to the system handler, reveal a
//! file in the platform file manager. Failures are logged and swallowed —
//! nothing here is worth interrupting the UI for.

use std::path::Path;
use std::process::Command;

/// Open a URL (or any path) with the system default handler.
pub fn open_url(url: &str) {
    if let Err(e) = open::that(url) {
        eprintln!("sys: open {} failed: {}", url, e);
    }
}

/// Arguments for revealing a path in the platform file manager.
/// Returns (program, args); None means "fall back to opening the parent".
fn reveal_command(path: &str) -> Option<(&'static str, Vec<String>)> {
    if cfg!(target_os = "windows") {
        // explorer selects the file when passed /select,<path>
        Some(("explorer", vec![format!("/select,{}", path)]))
    } else if cfg!(target_os = "macos") {
        Some(("open", vec!["-R".into(), path.into()]))
    } else {
        None
    }
}

/// Reveal a file in the OS file explorer (select it where supported,
/// otherwise open its containing directory).
pub fn open_file_explorer(path: &str) {
    if let Some((program, args)) = reveal_command(path) {
        if let Err(e) = Command::new(program).args(&args).spawn() {
            eprintln!("sys: {} failed: {}", program, e);
        }
        return;
    }

    // Linux and friends: xdg-open the parent directory
    let parent = Path::new(path)
        .parent()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string());
    if let Err(e) = open::that(&parent) {
        eprintln!("sys: open {} failed: {}", parent, e);
    }
}
