use anyhow::Context;
use std::any::Any;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use crate::downloader::TrackResolver;

#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    Started {
        index: usize,
        total: usize,
        query: String,
    },
    Resolved {
        index: usize,
        query: String,
        title: String,
        path: PathBuf,
    },
    Failed {
        index: usize,
        query: String,
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FailedQuery {
    /// 1-based position in the batch
    pub index: usize,
    pub query: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub succeeded: usize,
    pub failed: usize,
    /// Absolute path of the output directory
    pub output_dir: PathBuf,
    pub failures: Vec<FailedQuery>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("resolver panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("resolver panicked: {}", s)
    } else {
        "resolver panicked".to_string()
    }
}

/// Resolve every query, in order, into `out_dir`.
///
/// The only error is failing to create `out_dir`, which happens before any
/// query is touched. Per-query problems (no match, resolver error, resolver
/// panic) are counted in the report and the batch carries on.
pub fn run_batch<R, F>(
    queries: &[String],
    out_dir: &Path,
    resolver: &R,
    mut on_event: F,
) -> anyhow::Result<BatchReport>
where
    R: TrackResolver + ?Sized,
    F: FnMut(&BatchEvent),
{
    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create output directory {}", out_dir.display()))?;
    let output_dir = out_dir
        .canonicalize()
        .with_context(|| format!("Failed to resolve {}", out_dir.display()))?;

    let total = queries.len();
    let mut report = BatchReport {
        succeeded: 0,
        failed: 0,
        output_dir,
        failures: Vec::new(),
    };

    for (i, query) in queries.iter().enumerate() {
        let index = i + 1;
        on_event(&BatchEvent::Started {
            index,
            total,
            query: query.clone(),
        });

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| resolver.resolve(query, out_dir)))
            .unwrap_or_else(|payload| Err(anyhow::anyhow!(panic_message(payload))));

        match outcome {
            Ok(Some(track)) => {
                report.succeeded += 1;
                on_event(&BatchEvent::Resolved {
                    index,
                    query: query.clone(),
                    title: track.title,
                    path: track.path,
                });
            }
            Ok(None) => {
                let reason = "no match found".to_string();
                record_failure(&mut report, &mut on_event, index, query, reason);
            }
            Err(e) => {
                let reason = format!("{:#}", e);
                record_failure(&mut report, &mut on_event, index, query, reason);
            }
        }
    }

    Ok(report)
}

fn record_failure<F: FnMut(&BatchEvent)>(
    report: &mut BatchReport,
    on_event: &mut F,
    index: usize,
    query: &str,
    reason: String,
) {
    report.failed += 1;
    on_event(&BatchEvent::Failed {
        index,
        query: query.to_string(),
        error: reason.clone(),
    });
    report.failures.push(FailedQuery {
        index,
        query: query.to_string(),
        reason,
    });
}
