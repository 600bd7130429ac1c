use anyhow::Context;
use std::collections::HashSet;
use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// Used when a name has nothing usable left after sanitizing
pub const FALLBACK_DIR_NAME: &str = "downloads";

const ILLEGAL_CHARS: [char; 10] = ['\\', '/', ':', '*', '?', '"', '<', '>', '|', '\0'];

/// Make `name` safe to use as a directory or file name.
///
/// Every run of illegal characters becomes a single `_`, surrounding whitespace
/// is trimmed, and input with no usable characters maps to [`FALLBACK_DIR_NAME`].
pub fn sanitize_dir_name(name: &str) -> String {
    let usable = name
        .chars()
        .any(|c| !ILLEGAL_CHARS.contains(&c) && !c.is_whitespace());
    if !usable {
        return FALLBACK_DIR_NAME.to_string();
    }

    let mut out = String::with_capacity(name.len());
    let mut in_run = false;
    for c in name.chars() {
        if ILLEGAL_CHARS.contains(&c) {
            if !in_run {
                out.push('_');
            }
            in_run = true;
        } else {
            out.push(c);
            in_run = false;
        }
    }
    out.trim().to_string()
}

/// `"{stem} ({n}){suffix}"` next to `path`
fn disambiguated(path: &Path, n: u32) -> PathBuf {
    let mut name = OsString::new();
    if let Some(stem) = path.file_stem() {
        name.push(stem);
    }
    name.push(format!(" ({})", n));
    if let Some(ext) = path.extension() {
        name.push(".");
        name.push(ext);
    }
    path.with_file_name(name)
}

// dangling symlinks count as taken too
fn is_taken(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Return `path` if nothing is there, otherwise the first free
/// `"{stem} (n){suffix}"` with n counting up from 1.
///
/// This is a plain check: another writer can take the name before the caller
/// uses it. Use [`claim_unique_path`] when moving files into place.
pub fn unique_path(path: &Path) -> PathBuf {
    unique_path_excluding(path, &HashSet::new())
}

/// [`unique_path`] that also treats every path in `reserved` as taken.
pub fn unique_path_excluding(path: &Path, reserved: &HashSet<PathBuf>) -> PathBuf {
    let taken = |p: &Path| is_taken(p) || reserved.contains(p);
    if !taken(path) {
        return path.to_path_buf();
    }
    let mut counter = 1;
    loop {
        let candidate = disambiguated(path, counter);
        if !taken(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}

/// Same naming as [`unique_path`], but the chosen name is reserved by creating
/// an empty file there with exclusive-create semantics.
pub fn claim_unique_path(path: &Path) -> io::Result<PathBuf> {
    let mut counter = 0;
    loop {
        let candidate = if counter == 0 {
            path.to_path_buf()
        } else {
            disambiguated(path, counter)
        };
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
        {
            Ok(_) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => counter += 1,
            Err(e) => return Err(e),
        }
    }
}

/// Move `source` to `target`, or to a disambiguated sibling of it if `target`
/// is taken. Never overwrites an existing file. Returns the final path.
pub fn move_without_overwrite(source: &Path, target: &Path) -> io::Result<PathBuf> {
    let claimed = claim_unique_path(target)?;
    if let Err(e) = fs::rename(source, &claimed) {
        let _ = fs::remove_file(&claimed);
        return Err(e);
    }
    Ok(claimed)
}

/// Parse a batch list: one query per line, blank lines and `#` comments dropped.
pub fn parse_queries(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Read and parse a UTF-8 batch list file.
pub fn read_queries(path: &Path) -> anyhow::Result<Vec<String>> {
    if !path.is_file() {
        anyhow::bail!("Batch list does not exist or is not a file: {}", path.display());
    }
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read batch list {}", path.display()))?;
    Ok(parse_queries(&text))
}

/// Output folder for a batch list: `root` (or the list's own folder) joined with
/// the sanitized file stem.
pub fn batch_output_dir(source: &Path, root: Option<&Path>) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let root = root
        .map(Path::to_path_buf)
        .or_else(|| source.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    root.join(sanitize_dir_name(&stem))
}
