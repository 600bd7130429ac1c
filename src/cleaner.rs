use regex::Regex;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::file_utils;

/// Trailing ` [videoId]` token left in yt-dlp's default file names
static ID_BRACKET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\[[A-Za-z0-9_-]+\]\s*$").expect("valid regex"));

#[derive(Debug, Clone, PartialEq)]
pub enum CleanEvent {
    Renamed { from: String, to: String },
    Failed { file: String, error: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanReport {
    pub renamed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Stem with the trailing bracketed id removed, or `None` if there is nothing
/// to strip or nothing would be left.
pub fn cleaned_stem(stem: &str) -> Option<String> {
    let cleaned = ID_BRACKET_RE.replace(stem, "");
    let cleaned = cleaned.trim_end();
    if cleaned.is_empty() || cleaned == stem {
        None
    } else {
        Some(cleaned.to_string())
    }
}

fn audio_files(dir: &Path, extension: &str) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case(extension))
            .unwrap_or(false);
        if matches && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Strip trailing `[id]` tokens from every `*.<extension>` file directly inside
/// `dir`. A file that cannot be renamed is reported and the scan goes on.
///
/// With `dry_run` nothing is touched; events and counts describe what a real
/// run would do.
pub fn clean_filenames<F>(
    dir: &Path,
    extension: &str,
    dry_run: bool,
    mut on_event: F,
) -> anyhow::Result<CleanReport>
where
    F: FnMut(&CleanEvent),
{
    if !dir.is_dir() {
        anyhow::bail!("Invalid directory: {}", dir.display());
    }

    let extension = extension.trim_start_matches('.');
    let mut report = CleanReport::default();
    let mut planned = HashSet::new();

    // listing is taken up front so renamed files are not visited twice
    for file in audio_files(dir, extension)? {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = match file.file_stem().and_then(|s| s.to_str()) {
            Some(stem) => stem,
            None => {
                report.skipped += 1;
                continue;
            }
        };
        let new_stem = match cleaned_stem(stem) {
            Some(new_stem) => new_stem,
            None => {
                report.skipped += 1;
                continue;
            }
        };

        let mut target_name = new_stem;
        if let Some(ext) = file.extension() {
            target_name.push('.');
            target_name.push_str(&ext.to_string_lossy());
        }

        let target = dir.join(target_name);
        let result = if dry_run {
            let target = file_utils::unique_path_excluding(&target, &planned);
            planned.insert(target.clone());
            Ok(target)
        } else {
            file_utils::move_without_overwrite(&file, &target)
        };

        match result {
            Ok(target) => {
                report.renamed += 1;
                on_event(&CleanEvent::Renamed {
                    from: name,
                    to: target
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                });
            }
            Err(e) => {
                report.failed += 1;
                on_event(&CleanEvent::Failed {
                    file: name,
                    error: e.to_string(),
                });
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str, content: &[u8]) {
        fs::write(dir.join(name), content).unwrap();
    }

    fn names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_cleaned_stem() {
        assert_eq!(cleaned_stem("Song Title [dQw4w9WgXcQ]").as_deref(), Some("Song Title"));
        assert_eq!(cleaned_stem("Song — Artist [a_b-c]  ").as_deref(), Some("Song — Artist"));
        assert_eq!(cleaned_stem("Tight[abc]").as_deref(), Some("Tight"));
        assert_eq!(cleaned_stem("Plain"), None);
        assert_eq!(cleaned_stem("[onlyid]"), None);
        assert_eq!(cleaned_stem("Live [at the BBC]"), None);
        assert_eq!(cleaned_stem("[id] in front"), None);
    }

    #[test]
    fn test_strips_bracket_suffix() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "Song Title [dQw4w9WgXcQ].mp3", b"song");
        touch(dir.path(), "Plain.mp3", b"plain");

        let mut events = Vec::new();
        let report = clean_filenames(dir.path(), "mp3", false, |e| events.push(e.clone())).unwrap();

        assert_eq!(report, CleanReport { renamed: 1, skipped: 1, failed: 0 });
        assert_eq!(names(dir.path()), vec!["Plain.mp3", "Song Title.mp3"]);
        assert_eq!(fs::read(dir.path().join("Song Title.mp3")).unwrap(), b"song");
        assert_eq!(
            events,
            vec![CleanEvent::Renamed {
                from: "Song Title [dQw4w9WgXcQ].mp3".to_string(),
                to: "Song Title.mp3".to_string(),
            }]
        );
    }

    #[test]
    fn test_never_overwrites() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "A.mp3", b"original");
        touch(dir.path(), "A [id].mp3", b"duplicate");

        let report = clean_filenames(dir.path(), "mp3", false, |_| {}).unwrap();

        assert_eq!(report.renamed, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(names(dir.path()), vec!["A (1).mp3", "A.mp3"]);
        assert_eq!(fs::read(dir.path().join("A.mp3")).unwrap(), b"original");
        assert_eq!(fs::read(dir.path().join("A (1).mp3")).unwrap(), b"duplicate");
    }

    #[test]
    fn test_only_matching_extension_and_not_recursive() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "Cover [x1].jpg", b"");
        touch(dir.path(), "Loud [x2].MP3", b"");
        fs::create_dir(dir.path().join("Nested [x3].mp3")).unwrap();
        touch(&dir.path().join("Nested [x3].mp3"), "Inner [x4].mp3", b"");

        let report = clean_filenames(dir.path(), ".mp3", false, |_| {}).unwrap();

        assert_eq!(report, CleanReport { renamed: 1, skipped: 0, failed: 0 });
        assert_eq!(
            names(dir.path()),
            vec!["Cover [x1].jpg", "Loud.MP3", "Nested [x3].mp3"]
        );
        assert_eq!(
            names(&dir.path().join("Nested [x3].mp3")),
            vec!["Inner [x4].mp3"]
        );
    }

    #[test]
    fn test_repeated_runs_are_stable() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "Song [abc].mp3", b"");
        clean_filenames(dir.path(), "mp3", false, |_| {}).unwrap();
        let second = clean_filenames(dir.path(), "mp3", false, |_| {}).unwrap();
        assert_eq!(second, CleanReport { renamed: 0, skipped: 1, failed: 0 });
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "A.mp3", b"");
        touch(dir.path(), "A [x1].mp3", b"");
        touch(dir.path(), "A [x2].mp3", b"");

        let mut events = Vec::new();
        let report = clean_filenames(dir.path(), "mp3", true, |e| events.push(e.clone())).unwrap();

        assert_eq!(report, CleanReport { renamed: 2, skipped: 1, failed: 0 });
        assert_eq!(names(dir.path()), vec!["A [x1].mp3", "A [x2].mp3", "A.mp3"]);
        assert_eq!(
            events,
            vec![
                CleanEvent::Renamed {
                    from: "A [x1].mp3".to_string(),
                    to: "A (1).mp3".to_string(),
                },
                CleanEvent::Renamed {
                    from: "A [x2].mp3".to_string(),
                    to: "A (2).mp3".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_invalid_directory() {
        let dir = TempDir::new().unwrap();
        assert!(clean_filenames(&dir.path().join("missing"), "mp3", false, |_| {}).is_err());
        touch(dir.path(), "file.mp3", b"");
        assert!(clean_filenames(&dir.path().join("file.mp3"), "mp3", false, |_| {}).is_err());
    }
}
