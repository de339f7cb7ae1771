//! Conversion between engine file URIs and editor paths.
use std::sync::OnceLock;

use percent_encoding::percent_decode_str;
use regex::Regex;

fn drive_regex() -> &'static Regex {
    static DRIVE: OnceLock<Regex> = OnceLock::new();
    DRIVE.get_or_init(|| Regex::new(r"(?i)^[a-z0-9]:").expect("drive letter regex is valid"))
}

/// Turn an engine path or `file://` URI into an editor path.
///
/// `file:///D:/x%20y.php` becomes `D:/x y.php`, `file:///var/a.php`
/// becomes `/var/a.php`. A leading drive letter is uppercased.
pub fn to_editor_path(path: &str) -> String {
    let mut path = percent_decode_str(path).decode_utf8_lossy().into_owned();

    if path.contains("://") {
        path = path.replacen("file:///", "/", 1);
        if path.starts_with('/') && path.find(':').is_some_and(|i| i > 0) {
            path.remove(0);
        }
    }

    let drive = drive_regex()
        .find(&path)
        .map(|m| (m.range(), m.as_str().to_uppercase()));
    if let Some((range, upper)) = drive {
        path.replace_range(range, &upper);
    }
    path
}

/// Turn an editor path into the `file://` URI the engine expects.
pub fn to_engine_path(path: &str) -> String {
    let path = to_editor_path(path);
    if drive_regex().is_match(&path) {
        format!("file:///{path}")
    } else {
        format!("file://{path}")
    }
}

/// Whether two paths name the same file once normalized.
pub fn paths_equal(a: &str, b: &str) -> bool {
    to_editor_path(a) == to_editor_path(b)
}

/// Shorten `text` to at most `max_len` chars, eliding the middle with `...`.
pub fn shorten(text: &str, max_len: usize) -> String {
    let len = text.chars().count();
    if len <= max_len || max_len <= 3 {
        return text.to_string();
    }
    let shown = max_len - 3;
    let front = shown.div_ceil(2);
    let back = shown / 2;
    let head: String = text.chars().take(front).collect();
    let tail: String = text.chars().skip(len - back).collect();
    format!("{head}...{tail}")
}
