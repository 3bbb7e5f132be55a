//! Append-only notification history.
//!
//! Every dispatched notification is recorded as `{timestamp, subject, content}`
//! in a JSON array. The whole file is rewritten on each append; entries are
//! never removed or compacted.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::types::PendingNotification;

/// Errors that can occur while reading or writing the history log.
#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("history I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("history JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One recorded notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub subject: String,
    pub content: String,
}

/// File-backed notification history.
#[derive(Debug)]
pub struct NotificationHistory {
    path: PathBuf,
    entries: Vec<HistoryEntry>,
}

impl NotificationHistory {
    /// Opens the history at `path`.
    ///
    /// A missing file starts an empty history. A malformed file is moved
    /// aside to `*.json.corrupt` and a new history is started.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match Self::read_entries(&path) {
            Ok(entries) => entries,
            Err(e) => {
                let backup = path.with_extension("json.corrupt");
                warn!(
                    path = %path.display(),
                    backup = %backup.display(),
                    error = %e,
                    "Could not read notification history, starting a new one"
                );
                if let Err(e) = std::fs::rename(&path, &backup) {
                    warn!(error = %e, "Failed to move unreadable history aside");
                }
                Vec::new()
            }
        };
        Self { path, entries }
    }

    fn read_entries(path: &Path) -> Result<Vec<HistoryEntry>, HistoryError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Records a notification and rewrites the file.
    ///
    /// The entry is kept in memory even if the write fails.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError`] if the file cannot be written.
    pub async fn append(&mut self, notification: &PendingNotification) -> Result<(), HistoryError> {
        self.entries.push(HistoryEntry {
            timestamp: Utc::now(),
            subject: notification.subject.clone(),
            content: notification.body.clone(),
        });

        let contents = serde_json::to_string_pretty(&self.entries)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, contents).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;

        debug!(entries = self.entries.len(), "Notification history saved");
        Ok(())
    }

    /// All recorded entries, oldest first.
    #[must_use]
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn notification(subject: &str) -> PendingNotification {
        PendingNotification {
            subject: subject.to_string(),
            body: format!("body of {subject}"),
        }
    }

    #[tokio::test]
    async fn test_append_persists_in_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notifications.json");

        let mut history = NotificationHistory::open(&path);
        assert!(history.is_empty());

        history.append(&notification("first")).await.unwrap();
        history.append(&notification("second")).await.unwrap();

        let reopened = NotificationHistory::open(&path);
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.entries()[0].subject, "first");
        assert_eq!(reopened.entries()[1].subject, "second");
        assert_eq!(reopened.entries()[1].content, "body of second");
    }

    #[tokio::test]
    async fn test_append_extends_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notifications.json");

        NotificationHistory::open(&path)
            .append(&notification("old"))
            .await
            .unwrap();

        let mut history = NotificationHistory::open(&path);
        history.append(&notification("new")).await.unwrap();

        let subjects: Vec<_> = NotificationHistory::open(&path)
            .entries()
            .iter()
            .map(|e| e.subject.clone())
            .collect();
        assert_eq!(subjects, vec!["old", "new"]);
    }

    #[test]
    fn test_malformed_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notifications.json");
        std::fs::write(&path, "not json").unwrap();

        let history = NotificationHistory::open(&path);
        assert!(history.is_empty());
        assert!(path.with_extension("json.corrupt").exists());
    }

    #[test]
    fn test_entry_uses_content_field() {
        let entry = HistoryEntry {
            timestamp: Utc::now(),
            subject: "s".to_string(),
            content: "c".to_string(),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["content"], "c");
        assert!(json.get("timestamp").is_some());
    }
}
