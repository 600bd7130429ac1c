use anyhow::Context;
use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const LOG_FILE: &str = "download.json";

/// A query that could not be downloaded
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FailureEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub query: String,
    pub output_dir: PathBuf,
    pub error: String,
    pub retry_count: u32,
}

impl FailureEntry {
    pub fn new(query: String, output_dir: PathBuf, error: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            query,
            output_dir,
            error,
            retry_count: 0,
        }
    }
}

/// Failed queries, one JSON file per day: `<base>/<YYYY-MM-DD>/download.json`
#[derive(Clone)]
pub struct FailureLog {
    base_path: PathBuf,
}

impl FailureLog {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Get today's date as a string (YYYY-MM-DD)
    fn today_str() -> String {
        Local::now().format("%Y-%m-%d").to_string()
    }

    fn log_path(&self, date: &str) -> PathBuf {
        self.base_path.join(date).join(LOG_FILE)
    }

    pub fn add(&self, entry: FailureEntry) -> anyhow::Result<()> {
        let path = self.log_path(&Self::today_str());
        let mut entries = Self::load(&path)?;
        entries.push(entry);
        Self::save(&path, &entries)
    }

    /// Remove an entry by date and id. Returns true if it was there.
    pub fn remove(&self, date: &str, id: &str) -> anyhow::Result<bool> {
        let path = self.log_path(date);
        let mut entries = Self::load(&path)?;
        let original_len = entries.len();
        entries.retain(|e| e.id != id);

        if entries.len() == original_len {
            return Ok(false);
        }
        if entries.is_empty() {
            fs::remove_file(&path)?;
            self.cleanup_empty_date_dir(date);
        } else {
            Self::save(&path, &entries)?;
        }
        Ok(true)
    }

    pub fn increment_retry(&self, date: &str, id: &str, error: &str) -> anyhow::Result<()> {
        let path = self.log_path(date);
        let mut entries = Self::load(&path)?;
        if let Some(entry) = entries.iter_mut().find(|e| e.id == id) {
            entry.retry_count += 1;
            entry.timestamp = Utc::now();
            entry.error = error.to_string();
            Self::save(&path, &entries)?;
        }
        Ok(())
    }

    /// Every entry with its date, newest first
    pub fn all(&self) -> Vec<(String, FailureEntry)> {
        let mut all = Vec::new();
        for date in self.list_dates() {
            // listing skips a day it cannot parse; writes refuse to touch it
            for entry in Self::load(&self.log_path(&date)).unwrap_or_default() {
                all.push((date.clone(), entry));
            }
        }
        all.sort_by(|a, b| b.1.timestamp.cmp(&a.1.timestamp));
        all
    }

    /// List all dates that have logs (sorted newest first)
    pub fn list_dates(&self) -> Vec<String> {
        let mut dates = Vec::new();

        if let Ok(entries) = fs::read_dir(&self.base_path) {
            for entry in entries.flatten() {
                if entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false) {
                    if let Some(name) = entry.file_name().to_str() {
                        if NaiveDate::parse_from_str(name, "%Y-%m-%d").is_ok() {
                            dates.push(name.to_string());
                        }
                    }
                }
            }
        }

        dates.sort_by(|a, b| b.cmp(a));
        dates
    }

    pub fn clear_all(&self) -> anyhow::Result<()> {
        for date in self.list_dates() {
            fs::remove_dir_all(self.base_path.join(date))?;
        }
        Ok(())
    }

    fn cleanup_empty_date_dir(&self, date: &str) {
        let date_dir = self.base_path.join(date);
        if let Ok(mut entries) = fs::read_dir(&date_dir) {
            if entries.next().is_none() {
                let _ = fs::remove_dir(&date_dir);
            }
        }
    }

    /// A missing file is an empty log
    fn load(path: &Path) -> anyhow::Result<Vec<FailureEntry>> {
        let data = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()))
            }
        };
        serde_json::from_str(&data)
            .with_context(|| format!("Corrupt failure log {}", path.display()))
    }

    fn save(path: &Path, entries: &[FailureEntry]) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(entries)?)?;
        Ok(())
    }
}
