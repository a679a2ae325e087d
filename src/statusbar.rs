//! Status bar and imgui theme helpers for the browser window.

use imgui::{Condition, FontConfig, FontSource, WindowFlags};

/// Load the default font a bit larger, tuned for filename-heavy UI.
pub fn add_font(imgui: &mut imgui::Context) {
    imgui.fonts().add_font(&[FontSource::DefaultFontData {
        config: Some(FontConfig {
            size_pixels: 15.0,
            oversample_h: 2,
            oversample_v: 1,
            pixel_snap_h: true,
            ..Default::default()
        }),
    }]);
}

/// Dark, slightly translucent theme for the browser panel.
pub fn apply_theme(imgui: &mut imgui::Context) {
    let style = imgui.style_mut();
    style.window_rounding = 0.0;
    style.window_border_size = 0.0;
    style.window_padding = [8.0, 4.0];
    style.frame_padding = [4.0, 2.0];
    style.item_spacing = [8.0, 4.0];

    style.colors[imgui::sys::ImGuiCol_WindowBg as usize] = [0.06, 0.06, 0.06, 0.94];
    style.colors[imgui::sys::ImGuiCol_Text as usize] = [0.9, 0.9, 0.9, 1.0];
}

/// Hover tooltip for the last drawn item.
pub fn tooltip(ui: &imgui::Ui, text: &str) {
    if ui.is_item_hovered() {
        ui.tooltip_text(text);
    }
}

const STATUS_FLAGS: WindowFlags = WindowFlags::NO_TITLE_BAR
    .union(WindowFlags::NO_RESIZE)
    .union(WindowFlags::NO_MOVE)
    .union(WindowFlags::NO_SCROLLBAR)
    .union(WindowFlags::NO_SCROLL_WITH_MOUSE)
    .union(WindowFlags::NO_COLLAPSE)
    .union(WindowFlags::NO_SAVED_SETTINGS)
    .union(WindowFlags::NO_FOCUS_ON_APPEARING)
    .union(WindowFlags::NO_NAV)
    .union(WindowFlags::NO_BRING_TO_FRONT_ON_FOCUS);

const DIM: [f32; 4] = [0.50, 0.50, 0.50, 1.0];
const BRIGHT: [f32; 4] = [0.92, 0.92, 0.92, 1.0];
const ACCENT: [f32; 4] = [1.0, 0.78, 0.30, 1.0];

/// Status bar info passed from the main loop.
pub struct StatusInfo<'a> {
    /// Last picked path, if any.
    pub picked: Option<&'a str>,
    /// Items shown after filtering / total in the library.
    pub shown: usize,
    pub total: usize,
    pub search_paths: usize,
    pub thumbs_done: u64,
    pub thumbs_failed: u64,
    pub scanning: bool,
}

/// Truncate a string with middle ellipsis to fit within `max_w` pixels.
fn middle_ellipsis(ui: &imgui::Ui, s: &str, max_w: f32) -> String {
    let full_w = ui.calc_text_size(s)[0];
    if full_w <= max_w || s.len() < 8 {
        return s.to_string();
    }
    let ellipsis = "…";
    let ell_w = ui.calc_text_size(ellipsis)[0];
    let budget = max_w - ell_w;
    if budget <= 0.0 {
        return ellipsis.to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    let half = budget / 2.0;
    let mut left_end = 0;
    let mut right_start = chars.len();
    for i in 1..chars.len() {
        let sub: String = chars[..i].iter().collect();
        if ui.calc_text_size(&sub)[0] > half {
            break;
        }
        left_end = i;
    }
    for i in (0..chars.len()).rev() {
        let sub: String = chars[i..].iter().collect();
        if ui.calc_text_size(&sub)[0] > half {
            break;
        }
        right_start = i;
    }
    if left_end == 0 && right_start == chars.len() {
        return ellipsis.to_string();
    }
    let left: String = chars[..left_end].iter().collect();
    let right: String = chars[right_start..].iter().collect();
    format!("{}{}{}", left, ellipsis, right)
}

/// Bottom status bar.
/// Layout: [left: last pick] [right: shown/total · paths · thumbs · scan]
pub fn draw_status_bar(ui: &imgui::Ui, info: &StatusInfo, display_w: f32, display_h: f32) {
    let bar_height = 24.0;
    let pad = 8.0;

    if let Some(_win) = ui
        .window("##statusbar")
        .position([0.0, display_h - bar_height], Condition::Always)
        .size([display_w, bar_height], Condition::Always)
        .bg_alpha(0.85)
        .flags(STATUS_FLAGS)
        .begin()
    {
        let y = ui.cursor_pos()[1];

        let mut right_text = format!(
            "{}/{} videos · {} paths · thumbs {}",
            info.shown, info.total, info.search_paths, info.thumbs_done
        );
        if info.thumbs_failed > 0 {
            right_text.push_str(&format!(" ({} failed)", info.thumbs_failed));
        }
        if info.scanning {
            right_text.push_str("  scanning…");
        }
        let right_w = ui.calc_text_size(&right_text)[0];
        let right_x = display_w - pad - right_w;

        let left_budget = (right_x - pad * 2.0).max(0.0);
        ui.set_cursor_pos([pad, y]);
        match info.picked {
            Some(path) => {
                let shown = middle_ellipsis(ui, path, left_budget);
                ui.text_colored(BRIGHT, &shown);
            }
            None => ui.text_colored(DIM, "no pick yet"),
        }

        ui.same_line();
        ui.set_cursor_pos([right_x, y]);
        let color = if info.scanning { ACCENT } else { DIM };
        ui.text_colored(color, &right_text);
    }
}

// ── Pure formatting helpers ─────────────────────────────────────────────

/// Human-readable byte size.
pub fn fmt_size(bytes: i64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;
    let b = bytes as f64;
    if b >= GB {
        format!("{:.1} GB", b / GB)
    } else if b >= MB {
        format!("{:.1} MB", b / MB)
    } else if b >= KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{} B", bytes)
    }
}

/// `YYYY-MM-DD HH:MM` from epoch seconds (UTC).
pub fn fmt_date(epoch_secs: i64) -> String {
    if epoch_secs < 0 {
        return "?".into();
    }
    let s = epoch_secs as u64;
    let days = s / 86400;
    let time = s % 86400;
    let h = time / 3600;
    let m = (time % 3600) / 60;

    let mut y = 1970i64;
    let mut remaining = days as i64;
    loop {
        let days_in_year = if is_leap(y) { 366 } else { 365 };
        if remaining < days_in_year {
            break;
        }
        remaining -= days_in_year;
        y += 1;
    }
    let months = [
        31,
        if is_leap(y) { 29 } else { 28 },
        31,
        30,
        31,
        30,
        31,
        31,
        30,
        31,
        30,
        31,
    ];
    let mut mo = 1;
    for &ml in &months {
        if remaining < ml {
            break;
        }
        remaining -= ml;
        mo += 1;
    }
    let d = remaining + 1;
    format!("{:04}-{:02}-{:02} {:02}:{:02}", y, mo, d, h, m)
}

fn is_leap(y: i64) -> bool {
    (y % 4 == 0 && y % 100 != 0) || y % 400 == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── fmt_size ────────────────────────────────────────────────────────

    #[test]
    fn size_bytes() {
        assert_eq!(fmt_size(0), "0 B");
        assert_eq!(fmt_size(512), "512 B");
    }

    #[test]
    fn size_scales() {
        assert_eq!(fmt_size(1536), "1.5 KB");
        assert_eq!(fmt_size(2 * 1024 * 1024), "2.0 MB");
        assert_eq!(fmt_size(3 * 1024 * 1024 * 1024), "3.0 GB");
    }

    // ── fmt_date ────────────────────────────────────────────────────────

    #[test]
    fn date_epoch_zero() {
        assert_eq!(fmt_date(0), "1970-01-01 00:00");
    }

    #[test]
    fn date_known_values() {
        // 2024-01-01 00:00:00 UTC = 1704067200
        assert_eq!(fmt_date(1704067200), "2024-01-01 00:00");
        // 2000-01-01 00:00:00 UTC = 946684800
        assert_eq!(fmt_date(946684800), "2000-01-01 00:00");
    }

    #[test]
    fn date_with_time() {
        // 1970-01-01 12:30:45 = 45045
        assert_eq!(fmt_date(45045), "1970-01-01 12:30");
    }

    #[test]
    fn date_leap_day() {
        // 2024-02-29 00:00:00 UTC = 1709164800
        assert_eq!(fmt_date(1709164800), "2024-02-29 00:00");
    }

    #[test]
    fn date_negative_is_unknown() {
        assert_eq!(fmt_date(-1), "?");
    }

    // ── is_leap ─────────────────────────────────────────────────────────

    #[test]
    fn leap_years() {
        assert!(is_leap(2000));
        assert!(is_leap(2024));
        assert!(!is_leap(1900));
        assert!(!is_leap(2023));
    }
}
