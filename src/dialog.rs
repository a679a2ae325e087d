//! Native file dialogs, run off the UI thread.
//!
//! Each request spawns a detached thread that blocks on the OS dialog and
//! delivers the outcome over a channel; the main loop polls the receiver
//! once per frame. Cancelling the dialog yields an empty result.

use std::path::{Path, PathBuf};
use std::sync::mpsc;

/// Outcome of a dialog. Empty `files` means the user cancelled.
#[derive(Debug, Default)]
pub struct DialogResult {
    pub files: Vec<PathBuf>,
}

/// Display name + extensions (no dots), as rfd wants them.
pub type DialogFilter = (String, Vec<String>);

/// Start directory for open/folder dialogs: must exist, otherwise the OS
/// default is used.
fn start_dir_of(path: &str) -> Option<PathBuf> {
    if path.is_empty() {
        return None;
    }
    let p = Path::new(path);
    if p.is_dir() {
        Some(p.to_path_buf())
    } else {
        None
    }
}

/// Split a suggested save path into (existing directory, file name).
/// A dangling directory degrades to the OS default rather than erroring.
fn split_save_path(path: &str) -> (Option<PathBuf>, Option<String>) {
    if path.is_empty() {
        return (None, None);
    }
    let p = Path::new(path);
    if p.is_dir() {
        return (Some(p.to_path_buf()), None);
    }
    let name = p
        .file_name()
        .map(|n| n.to_string_lossy().to_string());
    let dir = p
        .parent()
        .filter(|parent| parent.is_dir())
        .map(|parent| parent.to_path_buf());
    (dir, name)
}

fn spawn_dialog<F>(name: &str, run: F) -> mpsc::Receiver<DialogResult>
where
    F: FnOnce() -> Vec<PathBuf> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    std::thread::Builder::new()
        .name(name.into())
        .spawn(move || {
            tx.send(DialogResult { files: run() }).ok();
        })
        .expect("failed to spawn dialog thread");
    rx
}

/// Blocking open-file dialog on a background thread.
pub fn open_file(
    title: &str,
    start_dir: &str,
    filters: Vec<DialogFilter>,
    multiple: bool,
) -> mpsc::Receiver<DialogResult> {
    let title = title.to_string();
    let dir = start_dir_of(start_dir);
    spawn_dialog("open-file-dialog", move || {
        let mut dlg = rfd::FileDialog::new().set_title(title.as_str());
        if let Some(d) = dir {
            dlg = dlg.set_directory(d);
        }
        for (name, exts) in &filters {
            dlg = dlg.add_filter(name.as_str(), exts);
        }
        if multiple {
            dlg.pick_files().unwrap_or_default()
        } else {
            dlg.pick_file().into_iter().collect()
        }
    })
}

/// Blocking save-file dialog on a background thread.
pub fn save_file(
    title: &str,
    start_path: &str,
    filters: Vec<DialogFilter>,
) -> mpsc::Receiver<DialogResult> {
    let title = title.to_string();
    let (dir, file_name) = split_save_path(start_path);
    spawn_dialog("save-file-dialog", move || {
        let mut dlg = rfd::FileDialog::new().set_title(title.as_str());
        if let Some(d) = dir {
            dlg = dlg.set_directory(d);
        }
        if let Some(n) = file_name {
            dlg = dlg.set_file_name(n);
        }
        for (name, exts) in &filters {
            dlg = dlg.add_filter(name.as_str(), exts);
        }
        dlg.save_file().into_iter().collect()
    })
}

/// Blocking folder picker on a background thread.
pub fn pick_folder(title: &str, start_dir: &str) -> mpsc::Receiver<DialogResult> {
    let title = title.to_string();
    let dir = start_dir_of(start_dir);
    spawn_dialog("pick-folder-dialog", move || {
        let mut dlg = rfd::FileDialog::new().set_title(title.as_str());
        if let Some(d) = dir {
            dlg = dlg.set_directory(d);
        }
        dlg.pick_folder().into_iter().collect()
    })
}
