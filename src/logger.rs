use crate::cli::{HeadlessConfig, OutputFormat};
use serde::Serialize;
use std::path::Path;

#[derive(Clone)]
pub struct Logger {
    config: HeadlessConfig,
}

#[derive(Serialize)]
struct JsonEvent {
    #[serde(rename = "type")]
    event_type: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
}

impl Logger {
    pub fn new(config: HeadlessConfig) -> Self {
        Self { config }
    }

    pub fn info(&self, message: &str) {
        if self.config.quiet {
            return;
        }
        self.output("info", message, None);
    }

    pub fn success(&self, message: &str) {
        if self.config.quiet {
            return;
        }
        self.output("success", message, None);
    }

    pub fn warn(&self, message: &str) {
        self.output("warn", message, None);
    }

    pub fn error(&self, message: &str) {
        self.output("error", message, None);
    }

    pub fn debug(&self, message: &str) {
        if !self.config.verbose {
            return;
        }
        self.output("debug", message, None);
    }

    pub fn item_start(&self, index: usize, total: usize, query: &str) {
        if self.config.quiet {
            return;
        }
        let data = serde_json::json!({
            "index": index,
            "total": total,
            "query": query
        });
        self.output("item_start", &format!("[{}/{}] {}", index, total, query), Some(data));
    }

    pub fn item_ok(&self, query: &str, title: &str, path: &Path) {
        if self.config.quiet {
            return;
        }
        let data = serde_json::json!({
            "query": query,
            "title": title,
            "path": path.display().to_string()
        });
        self.output("item_ok", &format!("Downloaded: {}", title), Some(data));
    }

    /// Failures are printed even in quiet mode.
    pub fn item_fail(&self, query: &str, error: &str) {
        let data = serde_json::json!({
            "query": query,
            "error": error
        });
        self.output("item_fail", &format!("Failed: {} ({})", query, error), Some(data));
    }

    pub fn batch_complete(&self, succeeded: usize, failed: usize, output_dir: &Path) {
        let data = serde_json::json!({
            "succeeded": succeeded,
            "failed": failed,
            "output_dir": output_dir.display().to_string()
        });
        let message = format!(
            "\n===== Summary =====\n  Succeeded: {}\n  Failed:    {}\n  Directory: {}",
            succeeded,
            failed,
            output_dir.display()
        );
        self.output("batch_complete", &message, Some(data));
    }

    pub fn file_renamed(&self, from: &str, to: &str) {
        if self.config.quiet {
            return;
        }
        let data = serde_json::json!({ "from": from, "to": to });
        self.output("file_renamed", &format!("{}  ->  {}", from, to), Some(data));
    }

    pub fn file_rename_failed(&self, name: &str, error: &str) {
        let data = serde_json::json!({ "file": name, "error": error });
        self.output(
            "file_rename_failed",
            &format!("Could not rename {}: {}", name, error),
            Some(data),
        );
    }

    pub fn clean_complete(&self, renamed: usize, skipped: usize, failed: usize) {
        let data = serde_json::json!({
            "renamed": renamed,
            "skipped": skipped,
            "failed": failed
        });
        self.output(
            "clean_complete",
            &format!(
                "\nSummary: renamed {}, unchanged {}, failed {}",
                renamed, skipped, failed
            ),
            Some(data),
        );
    }

    pub fn export_complete(&self, written: usize, skipped: usize, output: &Path) {
        let data = serde_json::json!({
            "written": written,
            "skipped": skipped,
            "output": output.display().to_string()
        });
        let mut message = format!("Saved {} tracks to '{}'.", written, output.display());
        if skipped > 0 {
            message.push_str(&format!("\nSkipped (non-track/invalid): {}", skipped));
        }
        self.output("export_complete", &message, Some(data));
    }

    fn output(&self, event_type: &str, message: &str, data: Option<serde_json::Value>) {
        match self.config.output_format {
            OutputFormat::Json => {
                let event = JsonEvent {
                    event_type: event_type.to_string(),
                    message: message.trim_start().to_string(),
                    data,
                };
                if let Ok(json) = serde_json::to_string(&event) {
                    println!("{}", json);
                }
            }
            OutputFormat::Text => {
                let prefix = match event_type {
                    "error" => "[ERROR]",
                    "warn" => "[WARN]",
                    "debug" => "[DEBUG]",
                    "item_start" => "[...]",
                    "item_fail" | "file_rename_failed" => "[FAIL]",
                    "success" | "item_ok" | "file_renamed" | "batch_complete"
                    | "clean_complete" | "export_complete" => "[OK]",
                    _ => "[INFO]",
                };
                let line = if self.config.enabled {
                    // keep blank separator lines ahead of the prefix
                    let body = message.trim_start_matches('\n');
                    let lead = &message[..message.len() - body.len()];
                    format!("{}{} {}", lead, prefix, body)
                } else {
                    message.to_string()
                };
                if matches!(event_type, "error" | "warn" | "item_fail" | "file_rename_failed") {
                    eprintln!("{}", line);
                } else {
                    println!("{}", line);
                }
            }
        }
    }
}
