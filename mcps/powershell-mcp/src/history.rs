//! Command history - JSON-lines audit log of tool invocations
//!
//! One file per day (`commands-YYYY-MM-DD.jsonl`). Appends go through a
//! single writer lock so concurrent invocations never interleave lines.
//! Failures are logged and swallowed; they never affect a tool result.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::types::InvocationKind;

/// One line of the command history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: String,
    pub command: String,
    pub command_type: InvocationKind,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct CommandHistory {
    dir: PathBuf,
    writer: Arc<Mutex<()>>,
}

impl CommandHistory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            writer: Arc::new(Mutex::new(())),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// History file for a given day
    pub fn file_for(&self, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("commands-{}.jsonl", date.format("%Y-%m-%d")))
    }

    /// Append an entry; errors are logged, never returned
    pub async fn record(&self, command: &str, kind: InvocationKind, metadata: Map<String, Value>) {
        let now = Local::now();
        let entry = HistoryEntry {
            timestamp: now.to_rfc3339(),
            command: command.to_string(),
            command_type: kind,
            metadata,
        };

        match self.append(&entry, now.date_naive()).await {
            Ok(()) => tracing::debug!(command_type = ?kind, "Command recorded in history"),
            Err(e) => tracing::warn!(
                error = %e,
                dir = %self.dir.display(),
                "Failed to log command"
            ),
        }
    }

    async fn append(&self, entry: &HistoryEntry, date: NaiveDate) -> std::io::Result<()> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let _guard = self.writer.lock().await;

        fs::create_dir_all(&self.dir).await?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.file_for(date))
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }
}
