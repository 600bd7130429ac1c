mod sources {
    pub mod spotify;
}
mod batch;
mod cleaner;
mod cli;
mod downloader;
mod error_log;
mod file_utils;
mod logger;

use crate::{
    batch::{BatchEvent, BatchReport},
    cleaner::CleanEvent,
    cli::{Cli, Commands, DownloadOptions, HeadlessConfig},
    downloader::{TrackResolver, YtDlpResolver},
    error_log::{FailureEntry, FailureLog},
    logger::Logger,
    sources::spotify,
};
use clap::Parser;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const SINGLE_DIR_NAME: &str = "downloads_single";

#[tokio::main]
async fn main() {
    // Spotify credentials may live in a .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let logger = Logger::new(HeadlessConfig::from_cli(&cli));

    if let Err(e) = run(cli, &logger).await {
        logger.error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli, logger: &Logger) -> anyhow::Result<()> {
    let failure_log = FailureLog::new(data_dir(cli.data_dir.as_deref()).join("errors"));

    match cli.command {
        Commands::Single {
            title,
            root,
            download,
        } => {
            let title = title.join(" ").trim().to_string();
            if title.is_empty() {
                anyhow::bail!("Empty title, nothing to download");
            }
            let root = match root {
                Some(root) => root,
                None => std::env::current_dir()?,
            };
            let out_dir = root.join(SINGLE_DIR_NAME);
            logger.info(&format!("Saving to: {}", out_dir.display()));

            let report =
                download_queries(vec![title], out_dir, DownloadOptions::from(&download), logger)
                    .await?;
            record_failures(&failure_log, &report, logger);
        }

        Commands::Batch {
            file,
            root,
            no_log,
            download,
        } => {
            let queries = file_utils::read_queries(&file)?;
            let out_dir = file_utils::batch_output_dir(&file, root.as_deref());
            if queries.is_empty() {
                logger.warn(&format!("{} contains no titles", file.display()));
                logger.batch_complete(0, 0, &out_dir);
                return Ok(());
            }

            logger.info(&format!("Using directory: {}", out_dir.display()));

            let report =
                download_queries(queries, out_dir, DownloadOptions::from(&download), logger)
                    .await?;
            logger.debug(&format!("Processed {} titles", report.total()));
            if !no_log {
                record_failures(&failure_log, &report, logger);
            }
            logger.batch_complete(report.succeeded, report.failed, &report.output_dir);
        }

        Commands::Clean {
            dir,
            extension,
            dry_run,
        } => {
            let dir = dir.canonicalize().unwrap_or(dir);
            logger.info(&format!("Directory: {}", dir.display()));
            if dry_run {
                logger.info("Dry run, nothing will be renamed");
            }

            let report = cleaner::clean_filenames(&dir, &extension, dry_run, |event| match event {
                CleanEvent::Renamed { from, to } => logger.file_renamed(from, to),
                CleanEvent::Failed { file, error } => logger.file_rename_failed(file, error),
            })?;
            logger.clean_complete(report.renamed, report.skipped, report.failed);
        }

        Commands::Export {
            playlist,
            output,
            user_auth,
        } => {
            let playlist_id = spotify::extract_playlist_id(&playlist)?;
            logger.debug(&format!("Playlist id: {}", playlist_id));

            let client = spotify::SpotifyClient::connect(user_auth).await?;
            let summary = spotify::export_playlist(&client, &playlist_id, &output).await?;
            logger.export_complete(summary.written, summary.skipped, &output);
        }

        Commands::Retry { download } => {
            retry_failures(&failure_log, DownloadOptions::from(&download), logger).await?;
        }

        Commands::Errors { clear } => {
            if clear {
                failure_log.clear_all()?;
                logger.success("Failure log cleared");
                return Ok(());
            }
            let entries = failure_log.all();
            if entries.is_empty() {
                logger.info("No failed downloads recorded");
            }
            for (date, entry) in entries {
                println!(
                    "{}  {}  (retries: {})\n    dir:   {}\n    error: {}",
                    date,
                    entry.query,
                    entry.retry_count,
                    entry.output_dir.display(),
                    entry.error
                );
            }
        }
    }

    Ok(())
}

fn data_dir(overridden: Option<&Path>) -> PathBuf {
    if let Some(dir) = overridden {
        return dir.to_path_buf();
    }
    dirs::data_local_dir()
        .map(|dir| dir.join("trackgrab"))
        .unwrap_or_else(|| PathBuf::from("data"))
}

fn log_batch_event(logger: &Logger, event: &BatchEvent) {
    match event {
        BatchEvent::Started { index, total, query } => logger.item_start(*index, *total, query),
        BatchEvent::Resolved {
            query, title, path, ..
        } => logger.item_ok(query, title, path),
        BatchEvent::Failed { query, error, .. } => logger.item_fail(query, error),
    }
}

/// Run a batch through yt-dlp on the blocking pool.
async fn download_queries(
    queries: Vec<String>,
    out_dir: PathBuf,
    options: DownloadOptions,
    logger: &Logger,
) -> anyhow::Result<BatchReport> {
    let resolver = YtDlpResolver::new(options);
    resolver.check_available()?;

    let logger = logger.clone();
    tokio::task::spawn_blocking(move || {
        batch::run_batch(&queries, &out_dir, &resolver, |event| {
            log_batch_event(&logger, event)
        })
    })
    .await?
}

fn record_failures(failure_log: &FailureLog, report: &BatchReport, logger: &Logger) {
    for failure in &report.failures {
        let entry = FailureEntry::new(
            failure.query.clone(),
            report.output_dir.clone(),
            failure.reason.clone(),
        );
        if let Err(e) = failure_log.add(entry) {
            logger.warn(&format!("Could not record failure for '{}': {}", failure.query, e));
        }
    }
}

async fn retry_failures(
    failure_log: &FailureLog,
    options: DownloadOptions,
    logger: &Logger,
) -> anyhow::Result<()> {
    let entries = failure_log.all();
    if entries.is_empty() {
        logger.info("No failed downloads to retry");
        return Ok(());
    }

    let resolver = YtDlpResolver::new(options);
    resolver.check_available()?;

    let failure_log = failure_log.clone();
    let worker_logger = logger.clone();
    let (succeeded, failed) = tokio::task::spawn_blocking(move || {
        retry_entries(&failure_log, entries, &resolver, &worker_logger)
    })
    .await?;

    logger.success(&format!("Retry finished: {} succeeded, {} failed", succeeded, failed));
    Ok(())
}

/// Re-run logged failures grouped by output directory. Entries that now
/// download are dropped from the log, the rest get their retry count bumped.
/// A directory that cannot be used fails its own group only.
fn retry_entries<R: TrackResolver + ?Sized>(
    failure_log: &FailureLog,
    entries: Vec<(String, FailureEntry)>,
    resolver: &R,
    logger: &Logger,
) -> (usize, usize) {
    let mut by_dir: BTreeMap<PathBuf, Vec<(String, FailureEntry)>> = BTreeMap::new();
    for (date, entry) in entries {
        by_dir
            .entry(entry.output_dir.clone())
            .or_default()
            .push((date, entry));
    }

    let (mut succeeded, mut failed) = (0, 0);
    for (out_dir, group) in by_dir {
        logger.info(&format!("Retrying {} in {}", group.len(), out_dir.display()));
        let queries: Vec<String> = group.iter().map(|(_, e)| e.query.clone()).collect();

        let result = batch::run_batch(&queries, &out_dir, resolver, |event| {
            log_batch_event(logger, event)
        });

        // 1-based batch index -> failure reason
        let reasons: BTreeMap<usize, String> = match result {
            Ok(report) => {
                succeeded += report.succeeded;
                failed += report.failed;
                report
                    .failures
                    .into_iter()
                    .map(|f| (f.index, f.reason))
                    .collect()
            }
            Err(e) => {
                let reason = format!("{:#}", e);
                logger.warn(&format!("Skipping {}: {}", out_dir.display(), reason));
                failed += group.len();
                (1..=group.len()).map(|i| (i, reason.clone())).collect()
            }
        };

        for (i, (date, entry)) in group.iter().enumerate() {
            let outcome = match reasons.get(&(i + 1)) {
                Some(reason) => failure_log.increment_retry(date, &entry.id, reason),
                None => failure_log.remove(date, &entry.id).map(|_| ()),
            };
            if let Err(e) = outcome {
                logger.warn(&format!("Could not update failure log for '{}': {}", entry.query, e));
            }
        }
    }

    (succeeded, failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::OutputFormat;
    use crate::downloader::stub::ResolverStub;
    use std::fs;
    use tempfile::TempDir;

    fn quiet_logger() -> Logger {
        Logger::new(HeadlessConfig {
            enabled: true,
            quiet: true,
            verbose: false,
            output_format: OutputFormat::Text,
        })
    }

    fn log_failure(log: &FailureLog, query: &str, out_dir: &Path) {
        log.add(FailureEntry::new(
            query.to_string(),
            out_dir.to_path_buf(),
            "no match found".to_string(),
        ))
        .unwrap();
    }

    fn find<'a>(entries: &'a [(String, FailureEntry)], query: &str) -> Option<&'a FailureEntry> {
        entries.iter().map(|(_, e)| e).find(|e| e.query == query)
    }

    #[test]
    fn test_retry_removes_fixed_and_bumps_failing() {
        let data = TempDir::new().unwrap();
        let music = TempDir::new().unwrap();
        let log = FailureLog::new(data.path());
        let list = music.path().join("list");
        log_failure(&log, "Fixed", &list);
        log_failure(&log, "Still Broken", &list);
        log_failure(&log, "Gone", &music.path().join("other"));

        let mut resolver = ResolverStub::default();
        resolver.erroring.insert("Still Broken".to_string());
        resolver.missing.insert("Gone".to_string());

        let totals = retry_entries(&log, log.all(), &resolver, &quiet_logger());
        assert_eq!(totals, (1, 2));
        assert!(list.join("Fixed.mp3").exists());

        let left = log.all();
        assert_eq!(left.len(), 2);
        assert!(find(&left, "Fixed").is_none());

        let broken = find(&left, "Still Broken").unwrap();
        assert_eq!(broken.retry_count, 1);
        assert!(broken.error.contains("network unreachable"));

        let gone = find(&left, "Gone").unwrap();
        assert_eq!(gone.retry_count, 1);
        assert_eq!(gone.error, "no match found");
    }

    #[test]
    fn test_retry_continues_past_unusable_directory() {
        let data = TempDir::new().unwrap();
        let music = TempDir::new().unwrap();
        let log = FailureLog::new(data.path());

        // a plain file sits where the directory should be; sorts first
        let blocked = music.path().join("a-blocked");
        fs::write(&blocked, b"").unwrap();
        log_failure(&log, "Stuck", &blocked);
        log_failure(&log, "Fixed", &music.path().join("b-list"));

        let resolver = ResolverStub::default();
        let totals = retry_entries(&log, log.all(), &resolver, &quiet_logger());
        assert_eq!(totals, (1, 1));
        assert!(music.path().join("b-list").join("Fixed.mp3").exists());

        let left = log.all();
        assert_eq!(left.len(), 1);
        let stuck = find(&left, "Stuck").unwrap();
        assert_eq!(stuck.retry_count, 1);
        assert!(stuck.error.contains("Failed to create output directory"));
    }
}
