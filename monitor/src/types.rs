//! Core data types for repository watching.
//!
//! This module defines the records exchanged between the gateway, the change
//! detector, the state store and the dispatch queue. Remote payloads use the
//! platform's snake_case field names; persisted records serialize the same way.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A repository as listed by the remote platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryDescriptor {
    /// Repository name, unique per account.
    pub name: String,

    /// When the repository was created.
    pub created_at: DateTime<Utc>,

    /// Last time any repository metadata changed.
    pub updated_at: Option<DateTime<Utc>>,

    /// Free-form description, if set.
    pub description: Option<String>,

    /// Browser URL of the repository.
    pub html_url: String,

    /// Topic tags.
    #[serde(default)]
    pub topics: Vec<String>,

    /// Primary language detected by the platform.
    pub language: Option<String>,

    /// Star count.
    #[serde(default, rename = "stargazers_count")]
    pub stars: u64,
}

/// A single commit, flattened from the platform's nested commit payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitDescriptor {
    /// Commit hash.
    pub sha: String,

    /// Full commit message.
    pub message: String,

    /// Author display name.
    pub author_name: String,

    /// Author timestamp, used as the change signal.
    pub author_date: DateTime<Utc>,

    /// Browser URL of the commit.
    pub html_url: String,
}

/// Core API quota as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub remaining: u32,
    pub limit: u32,
    pub reset_at: DateTime<Utc>,
}

/// Last-known state of one repository.
///
/// `created_at` never changes once recorded and `last_commit_at` never moves
/// backwards; see [`RepositorySnapshot::advance_last_commit`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositorySnapshot {
    pub created_at: DateTime<Utc>,

    /// Author date of the newest observed commit.
    #[serde(default)]
    pub last_commit_at: Option<DateTime<Utc>>,

    pub html_url: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub topics: Vec<String>,

    #[serde(default)]
    pub language: Option<String>,

    #[serde(default)]
    pub stars: u64,

    /// False once commit listing has been refused for this repository.
    #[serde(default = "default_true")]
    pub has_accessible_commits: bool,
}

fn default_true() -> bool {
    true
}

impl RepositorySnapshot {
    /// Builds an unseeded snapshot (no commit observed yet) from a listing entry.
    #[must_use]
    pub fn from_descriptor(repo: &RepositoryDescriptor) -> Self {
        Self {
            created_at: repo.created_at,
            last_commit_at: None,
            html_url: repo.html_url.clone(),
            description: repo.description.clone(),
            topics: repo.topics.clone(),
            language: repo.language.clone(),
            stars: repo.stars,
            has_accessible_commits: true,
        }
    }

    /// Copies the mutable descriptive metadata from a fresh listing entry.
    ///
    /// `created_at` and `last_commit_at` are left untouched.
    pub fn refresh_metadata(&mut self, repo: &RepositoryDescriptor) {
        self.html_url = repo.html_url.clone();
        self.description = repo.description.clone();
        self.topics = repo.topics.clone();
        self.language = repo.language.clone();
        self.stars = repo.stars;
    }

    /// Moves `last_commit_at` forward to `at`.
    ///
    /// Returns `true` only when the stored value was absent or strictly older.
    /// An equal or older `at` leaves the snapshot unchanged.
    pub fn advance_last_commit(&mut self, at: DateTime<Utc>) -> bool {
        match self.last_commit_at {
            Some(current) if current >= at => false,
            _ => {
                self.last_commit_at = Some(at);
                true
            }
        }
    }

    /// Folds a newer snapshot of the same repository into this one.
    ///
    /// Metadata and accessibility come from `newer`; `created_at` is kept and
    /// `last_commit_at` becomes the later of the two values.
    pub fn merge_newer(&mut self, newer: RepositorySnapshot) {
        let created_at = self.created_at;
        let previous_commit = self.last_commit_at;
        *self = newer;
        self.created_at = created_at;
        if let Some(previous) = previous_commit {
            self.last_commit_at = Some(match self.last_commit_at {
                Some(candidate) => candidate.max(previous),
                None => previous,
            });
        }
    }
}

/// Per-account mapping of repository name to its snapshot.
pub type AccountState = BTreeMap<String, RepositorySnapshot>;

/// A change detected for one account during a check pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// One or more repositories appeared since the last pass.
    NewRepositories {
        account: String,
        repositories: Vec<RepositoryDescriptor>,
    },

    /// A known repository received commits newer than its snapshot.
    RepositoryUpdated {
        account: String,
        repository: String,
        html_url: String,
        commit: CommitDescriptor,
    },
}

impl Change {
    /// The account this change belongs to.
    #[must_use]
    pub fn account(&self) -> &str {
        match self {
            Self::NewRepositories { account, .. } | Self::RepositoryUpdated { account, .. } => {
                account
            }
        }
    }
}

/// A formatted notification ready for history and delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingNotification {
    pub subject: String,
    pub body: String,
}
