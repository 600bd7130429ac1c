use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::cli::DownloadOptions;
use crate::file_utils;

/// A track that made it to disk
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTrack {
    pub title: String,
    pub path: PathBuf,
}

/// Turns a free-text query into one encoded audio file inside `out_dir`.
///
/// `Ok(None)` means the search found nothing. Errors are per query; callers
/// count them as failures and move on.
pub trait TrackResolver {
    fn resolve(&self, query: &str, out_dir: &Path) -> anyhow::Result<Option<ResolvedTrack>>;
}

/// Searches YouTube through `yt-dlp` and extracts audio with its ffmpeg post-processor.
pub struct YtDlpResolver {
    options: DownloadOptions,
}

impl YtDlpResolver {
    pub fn new(options: DownloadOptions) -> Self {
        Self { options }
    }

    /// Fail early if the configured program is not on PATH.
    pub fn check_available(&self) -> anyhow::Result<()> {
        which::which(&self.options.program)
            .map(|_| ())
            .with_context(|| format!("{} not found. Is it installed?", self.options.program))
    }

    fn build_args(&self, query: &str, output_template: &str) -> Vec<String> {
        vec![
            format!("ytsearch1:{}", query),
            "-x".to_string(), // extract audio
            "--audio-format".to_string(),
            self.options.codec.clone(),
            "--audio-quality".to_string(),
            self.options.quality.clone(),
            "--format".to_string(),
            "bestaudio/best".to_string(),
            "--no-playlist".to_string(),
            "--retries".to_string(),
            self.options.retries.to_string(),
            "--fragment-retries".to_string(),
            self.options.fragment_retries.to_string(),
            "--no-check-certificates".to_string(),
            "--continue".to_string(),
            "-o".to_string(),
            output_template.to_string(),
            "--print".to_string(),
            "after_move:title".to_string(),
        ]
    }

    /// The file yt-dlp left in `staging` once post-processing finished.
    ///
    /// With a known codec only its container extension counts. With `best`
    /// the source extension is kept, so any finished file does.
    fn find_output(&self, staging: &Path) -> anyhow::Result<Option<PathBuf>> {
        let expected = audio_extension(&self.options.codec);
        let mut found = Vec::new();
        for entry in fs::read_dir(staging)? {
            let path = entry?.path();
            let ext = match path.extension().and_then(|ext| ext.to_str()) {
                Some(ext) => ext,
                None => continue,
            };
            let matches = match expected {
                Some(expected) => ext.eq_ignore_ascii_case(expected),
                None => !PARTIAL_EXTENSIONS.iter().any(|p| ext.eq_ignore_ascii_case(p)),
            };
            if matches && path.is_file() {
                found.push(path);
            }
        }
        found.sort();
        Ok(found.into_iter().next())
    }
}

/// Audio codecs yt-dlp's `--audio-format` accepts
pub const AUDIO_CODECS: [&str; 9] = [
    "best", "aac", "alac", "flac", "m4a", "mp3", "opus", "vorbis", "wav",
];

// leftovers of an unfinished download
const PARTIAL_EXTENSIONS: [&str; 4] = ["part", "ytdl", "temp", "tmp"];

/// Extension of the file yt-dlp writes for `codec`, `None` for `best`.
pub fn audio_extension(codec: &str) -> Option<&str> {
    match codec {
        "best" => None,
        "aac" | "alac" | "m4a" => Some("m4a"),
        "vorbis" => Some("ogg"),
        other => Some(other),
    }
}

impl TrackResolver for YtDlpResolver {
    fn resolve(&self, query: &str, out_dir: &Path) -> anyhow::Result<Option<ResolvedTrack>> {
        fs::create_dir_all(out_dir)
            .with_context(|| format!("Failed to create {}", out_dir.display()))?;

        // Download next to the finished files, then move into place under a
        // collision-free name. Dropping the TempDir removes any leftovers.
        let staging = tempfile::Builder::new()
            .prefix(".trackgrab-")
            .tempdir_in(out_dir)
            .context("Failed to create staging directory")?;

        let output_template = staging
            .path()
            .join("%(title)s.%(ext)s")
            .to_string_lossy()
            .to_string();

        let output = Command::new(&self.options.program)
            .args(self.build_args(query, &output_template))
            .output()
            .with_context(|| format!("failed to spawn {}", self.options.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr
                .lines()
                .rev()
                .find(|line| !line.trim().is_empty())
                .unwrap_or("no error output")
                .trim()
                .to_string();
            anyhow::bail!("{} exited with {}: {}", self.options.program, output.status, reason);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let title = match stdout.lines().map(str::trim).find(|line| !line.is_empty()) {
            Some(title) => title.to_string(),
            None => return Ok(None),
        };

        let produced = self.find_output(staging.path())?.with_context(|| {
            format!(
                "{} reported '{}' but produced no {} audio file",
                self.options.program, title, self.options.codec
            )
        })?;
        let file_name = produced
            .file_name()
            .context("downloaded file has no name")?
            .to_owned();

        let path = file_utils::move_without_overwrite(&produced, &out_dir.join(file_name))
            .with_context(|| format!("Failed to move download into {}", out_dir.display()))?;

        Ok(Some(ResolvedTrack { title, path }))
    }
}
