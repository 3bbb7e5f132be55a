//! Durable record of what the watcher last saw.
//!
//! The [`StateStore`] owns the persisted state image: per-account repository
//! snapshots, per-account inaccessible repository sets, and last-check
//! timestamps. Access is transactional: callers read a copy with
//! [`StateStore::snapshot`] and write back with [`StateStore::commit`], which
//! merges and persists under one lock so concurrent account checks never
//! interleave partial writes.
//!
//! # File format
//!
//! ```json
//! {
//!   "known_repos": { "alice": { "widget": { "created_at": "...", ... } } },
//!   "last_check": { "alice": "2024-05-01T00:00:00Z" },
//!   "inaccessible_repos": { "alice": ["empty-repo"] },
//!   "saved_at": "2024-05-01T00:00:00Z"
//! }
//! ```
//!
//! Saves rewrite the whole file through a temporary sibling and a rename.

use std::collections::{BTreeMap, BTreeSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::types::AccountState;

/// Errors that can occur while loading or saving the state image.
#[derive(Error, Debug)]
pub enum StateError {
    /// Reading or writing the state file failed.
    #[error("state file I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The state file is not a valid state image.
    #[error("state file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The in-memory image could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Serialized union of all per-account state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateImage {
    #[serde(default)]
    pub known_repos: BTreeMap<String, AccountState>,

    #[serde(default)]
    pub last_check: BTreeMap<String, DateTime<Utc>>,

    #[serde(default)]
    pub inaccessible_repos: BTreeMap<String, BTreeSet<String>>,

    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
}

/// Result of one account check, applied atomically by [`StateStore::commit`].
#[derive(Debug, Clone)]
pub struct AccountUpdate {
    /// Replacement snapshot map for the account.
    pub repositories: AccountState,

    /// Repositories whose commit listing was refused during this check.
    pub newly_inaccessible: BTreeSet<String>,

    /// When the check completed.
    pub checked_at: DateTime<Utc>,
}

/// Lock-guarded, file-backed state image.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    image: Mutex<StateImage>,
}

impl StateStore {
    /// Loads the state image from `path`; a missing file yields an empty store.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Io`] if the file exists but cannot be read and
    /// [`StateError::Corrupt`] if it does not parse.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, StateError> {
        let path = path.into();

        let image = match std::fs::read_to_string(&path) {
            Ok(contents) => {
                let image: StateImage =
                    serde_json::from_str(&contents).map_err(|source| StateError::Corrupt {
                        path: path.clone(),
                        source,
                    })?;
                info!(
                    path = %path.display(),
                    accounts = image.known_repos.len(),
                    "Loaded state"
                );
                image
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %path.display(), "No state file, starting fresh");
                StateImage::default()
            }
            Err(source) => return Err(StateError::Io { path, source }),
        };

        Ok(Self {
            path,
            image: Mutex::new(image),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy of the account's snapshot map, or `None` if never observed.
    pub async fn snapshot(&self, account: &str) -> Option<AccountState> {
        self.image.lock().await.known_repos.get(account).cloned()
    }

    /// Copy of the account's inaccessible repository set.
    pub async fn inaccessible(&self, account: &str) -> BTreeSet<String> {
        self.image
            .lock()
            .await
            .inaccessible_repos
            .get(account)
            .cloned()
            .unwrap_or_default()
    }

    /// When the account last completed a check.
    pub async fn last_check(&self, account: &str) -> Option<DateTime<Utc>> {
        self.image.lock().await.last_check.get(account).copied()
    }

    /// Copy of the whole image.
    pub async fn image(&self) -> StateImage {
        self.image.lock().await.clone()
    }

    /// Replaces the account's snapshot map and persists the full image.
    ///
    /// Entries already present keep their `created_at` and never see their
    /// `last_commit_at` move backwards. Inaccessible sets only grow.
    ///
    /// The in-memory image is updated even when persisting fails.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] if the image cannot be written.
    pub async fn commit(&self, account: &str, update: AccountUpdate) -> Result<(), StateError> {
        let mut image = self.image.lock().await;

        let previous = image.known_repos.remove(account).unwrap_or_default();
        let mut merged = AccountState::new();
        for (name, incoming) in update.repositories {
            let snapshot = match previous.get(&name) {
                Some(existing) => {
                    let mut existing = existing.clone();
                    existing.merge_newer(incoming);
                    existing
                }
                None => incoming,
            };
            merged.insert(name, snapshot);
        }
        image.known_repos.insert(account.to_string(), merged);

        if !update.newly_inaccessible.is_empty() {
            image
                .inaccessible_repos
                .entry(account.to_string())
                .or_default()
                .extend(update.newly_inaccessible);
        }

        image.last_check.insert(account.to_string(), update.checked_at);
        image.saved_at = Some(Utc::now());

        write_atomically(&self.path, &image).await?;
        debug!(account = %account, path = %self.path.display(), "State saved");
        Ok(())
    }
}

async fn write_atomically(path: &Path, image: &StateImage) -> Result<(), StateError> {
    let contents = serde_json::to_string_pretty(image)?;
    let io_err = |source| StateError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
    }

    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, contents).await.map_err(io_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(io_err)?;
    Ok(())
}
