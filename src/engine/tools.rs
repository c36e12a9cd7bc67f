//! Path and naming utilities: canonical paths, relative paths, sink file names.

use std::path::{Path, PathBuf};

use crate::error::InvalidPath;

const EXTENDED_PREFIX: &str = r"\\?\";
const EXTENDED_UNC: &str = r"\\?\UNC\";
const SHARE_PREFIX: &str = r"\\";

/// Characters replaced with `_` when a partition name becomes part of a file name.
const ILLEGAL_FILENAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Windows device names that cannot be used as file names.
const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Normalize a raw path into its canonical absolute form.
///
/// - `\\?\UNC\server\share\..` and `\\server\share\..` become `\\?\UNC\server\share\..`
///   (a bare share root keeps one trailing separator).
/// - `\\?\X:\..` is kept in extended form.
/// - Anything else is a local path, made absolute against the current directory with
///   `.`/`..` resolved lexically (`\\?\`-prefixed on Windows, plain on Unix).
///
/// Repeated separators collapse and trailing separators are stripped. Segments that are
/// empty or end in a space or a period are rejected. No filesystem access.
pub fn canonicalize(raw: &str) -> Result<String, InvalidPath> {
    if raw.is_empty() {
        return Err(InvalidPath::new(raw, "empty path"));
    }
    if let Some(rest) = raw.strip_prefix(EXTENDED_UNC) {
        return share_form(raw, rest);
    }
    if let Some(rest) = raw.strip_prefix(EXTENDED_PREFIX) {
        let segments = literal_segments(rest);
        check_segments(raw, &segments)?;
        return Ok(format!("{EXTENDED_PREFIX}{}", segments.join("\\")));
    }
    if let Some(rest) = raw.strip_prefix(SHARE_PREFIX) {
        return share_form(raw, rest);
    }
    local_form(raw)
}

/// Collapse repeated backslashes, drop trailing ones, split into segments.
/// A leading backslash leaves an empty first segment (rejected by the caller).
fn literal_segments(rest: &str) -> Vec<&str> {
    let trimmed = rest.trim_end_matches('\\');
    let mut segments = Vec::new();
    for (i, seg) in trimmed.split('\\').enumerate() {
        if seg.is_empty() && i > 0 {
            continue;
        }
        segments.push(seg);
    }
    segments
}

fn check_segment(raw: &str, segment: &str) -> Result<(), InvalidPath> {
    if segment.is_empty() {
        return Err(InvalidPath::new(raw, "empty path segment"));
    }
    if segment.ends_with(' ') {
        return Err(InvalidPath::new(raw, "path segment ends with a space"));
    }
    if segment.ends_with('.') {
        return Err(InvalidPath::new(raw, "path segment ends with a period"));
    }
    Ok(())
}

fn check_segments(raw: &str, segments: &[&str]) -> Result<(), InvalidPath> {
    segments.iter().try_for_each(|s| check_segment(raw, s))
}

fn share_form(raw: &str, rest: &str) -> Result<String, InvalidPath> {
    let segments = literal_segments(rest);
    if segments.len() < 2 {
        return Err(InvalidPath::new(raw, "network share needs server and share"));
    }
    check_segments(raw, &segments)?;
    let joined = segments.join("\\");
    if segments.len() == 2 {
        Ok(format!("{EXTENDED_UNC}{joined}\\"))
    } else {
        Ok(format!("{EXTENDED_UNC}{joined}"))
    }
}

/// Lexically resolve `.`, `..` and empty segments of an absolute body.
fn resolve_segments<'a>(raw: &str, body: &'a str, sep: char) -> Result<Vec<&'a str>, InvalidPath> {
    let mut out: Vec<&str> = Vec::new();
    for seg in body.split(sep) {
        match seg {
            "" | "." => continue,
            ".." => {
                out.pop();
            }
            s => {
                check_segment(raw, s)?;
                out.push(s);
            }
        }
    }
    Ok(out)
}

fn absolute_string(raw: &str) -> Result<String, InvalidPath> {
    std::path::absolute(raw)
        .map_err(|_| InvalidPath::new(raw, "cannot resolve against the current directory"))?
        .into_os_string()
        .into_string()
        .map_err(|_| InvalidPath::new(raw, "path is not valid UTF-8"))
}

#[cfg(windows)]
fn local_form(raw: &str) -> Result<String, InvalidPath> {
    let slashed = raw.replace('/', "\\");
    // GetFullPathNameW silently trims trailing spaces and dots, so check the input first.
    resolve_segments(raw, slashed.trim_start_matches('\\'), '\\')?;
    let abs = absolute_string(&slashed)?;
    if let Some(rest) = abs.strip_prefix(SHARE_PREFIX) {
        return share_form(raw, rest);
    }
    let split = abs.find('\\').unwrap_or(abs.len());
    let (drive, body) = abs.split_at(split);
    let segments = resolve_segments(raw, body, '\\')?;
    if segments.is_empty() {
        return Ok(format!("{EXTENDED_PREFIX}{drive}\\"));
    }
    Ok(format!("{EXTENDED_PREFIX}{drive}\\{}", segments.join("\\")))
}

#[cfg(not(windows))]
fn local_form(raw: &str) -> Result<String, InvalidPath> {
    let abs = absolute_string(raw)?;
    let segments = resolve_segments(raw, &abs, '/')?;
    Ok(format!("/{}", segments.join("/")))
}

fn is_separator(c: char) -> bool {
    c == '/' || c == '\\'
}

/// Path of `path` relative to `root`, both canonical. Falls back to `path` itself when
/// `root` is not a prefix on a segment boundary.
pub fn relative_to_root(path: &str, root: &str) -> String {
    if let Some(rest) = path.strip_prefix(root)
        && (rest.is_empty() || rest.starts_with(is_separator) || root.ends_with(is_separator))
    {
        return rest.trim_start_matches(is_separator).to_string();
    }
    path.to_string()
}

/// Split a file name into (stem, lowercase extension without dot).
pub fn split_file_name(name: &str) -> (String, String) {
    let p = Path::new(name);
    let stem = p
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string());
    let ext = p
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    (stem, ext)
}

/// Bytes to (kilobytes, megabytes).
pub fn size_kb_mb(size: u64) -> (f64, f64) {
    let size = size as f64;
    (size / 1024.0, size / (1024.0 * 1024.0))
}

/// Make a partition name safe as part of a file name.
pub fn sanitize_for_filename(name: &str) -> String {
    let mut s: String = name
        .trim()
        .chars()
        .map(|c| {
            if c == ' ' || ILLEGAL_FILENAME_CHARS.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect();
    let base = Path::new(&s)
        .file_stem()
        .map(|b| b.to_string_lossy().to_uppercase())
        .unwrap_or_default();
    if RESERVED_NAMES.contains(&base.as_str()) {
        s.push_str("_dir");
    }
    s
}

/// Sink for one partition: `<dir of base>/<stem of base>_<partition>.csv`.
pub fn partition_sink_path(base_out: &Path, partition: &str) -> PathBuf {
    let dir = base_out
        .parent()
        .filter(|d| !d.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let stem = base_out
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| String::from("catalog"));
    dir.join(format!("{stem}_{}.csv", sanitize_for_filename(partition)))
}

/// Split a comma-separated list, trimming and dropping empty items.
pub fn parse_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

/// Extensions as compared against [`split_file_name`]: lowercase, no leading dot.
pub fn normalize_extensions(exts: &[String]) -> Vec<String> {
    exts.iter()
        .map(|e| e.trim().trim_start_matches('.').to_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}
