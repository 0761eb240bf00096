//! JSON-lines file sink
//!
//! One entry per line, appended in log order. The same format is read back
//! by [`read_entries`] for offline reports.

use async_trait::async_trait;
use nestguard_core::{GuardError, GuardResult, SafetyAuditEntry};
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::AuditSink;

/// Appends audit entries to a JSON-lines file
pub struct FileSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileSink {
    /// Open (or create) the file for appending
    pub async fn new(path: impl Into<PathBuf>) -> GuardResult<Self> {
        let path = path.into();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    GuardError::audit(format!(
                        "Failed to create directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| {
                GuardError::audit(format!("Failed to open audit file {}: {}", path.display(), e))
            })?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AuditSink for FileSink {
    async fn persist(&self, entry: &SafetyAuditEntry) -> GuardResult<()> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes()).await.map_err(|e| {
            GuardError::audit(format!(
                "Failed to write audit file {}: {}",
                self.path.display(),
                e
            ))
        })?;
        Ok(())
    }

    async fn flush(&self) -> GuardResult<()> {
        let mut file = self.file.lock().await;
        file.flush().await?;
        file.sync_data().await?;
        Ok(())
    }
}

/// Read every entry from a JSON-lines audit file
///
/// Blank lines are skipped; a malformed line is an error naming its line number.
pub async fn read_entries(path: impl AsRef<Path>) -> GuardResult<Vec<SafetyAuditEntry>> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        GuardError::audit(format!("Failed to read audit file {}: {}", path.display(), e))
    })?;

    let mut entries = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let entry: SafetyAuditEntry = serde_json::from_str(line).map_err(|e| {
            GuardError::serialization(format!(
                "{}:{}: invalid audit entry: {}",
                path.display(),
                idx + 1,
                e
            ))
        })?;
        entries.push(entry);
    }
    Ok(entries)
}
