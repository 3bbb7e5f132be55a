//! Per-account change detection.
//!
//! [`ChangeDetector::check_account`] compares the stored snapshot of one
//! account with a fresh listing and returns the detected [`Change`]s:
//!
//! 1. List the account's repositories. Any failure aborts the account's cycle
//!    without touching state.
//! 2. An account with no stored state is seeded: one single-commit fetch per
//!    repository records `last_commit_at`, and no change is reported.
//! 3. Otherwise unknown names become one combined `NewRepositories` change
//!    (their commits are first checked on the following cycle), and each known
//!    accessible repository is checked for commits newer than its snapshot.
//! 4. The account's snapshot map is replaced and the state image persisted.
//!
//! A `403`/`404`/`409` on a commit listing marks the repository inaccessible,
//! after which it is never fetched again. A rate-limit signal stops commit
//! fetches for the rest of the cycle; other failures leave the repository
//! unchanged for the next cycle.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::gateway::{FetchOutcome, RepoGateway};
use crate::state::{AccountUpdate, StateStore};
use crate::types::{AccountState, Change, RepositoryDescriptor, RepositorySnapshot};

/// Commits requested per repository on a regular check.
pub const COMMIT_PAGE_LIMIT: u32 = 5;

/// Remaining quota below which a warning is logged before checking.
pub const RATE_LIMIT_WARN_THRESHOLD: u32 = 10;

/// Reasons an account's cycle is abandoned without state changes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckError {
    /// The repository listing could not be fetched.
    #[error("repository listing for {account} unavailable ({outcome})")]
    ListingUnavailable { account: String, outcome: String },

    /// The listing came back empty for an account with known repositories.
    #[error("repository listing for {account} was empty, treating as unknown")]
    EmptyListing { account: String },

    /// Seeding hit the rate limit and will be retried next cycle.
    #[error("rate limited while seeding {account}")]
    SeedRateLimited { account: String },
}

/// Detects repository and commit changes for tracked accounts.
pub struct ChangeDetector {
    gateway: Arc<dyn RepoGateway>,
    store: Arc<StateStore>,
}

impl ChangeDetector {
    #[must_use]
    pub fn new(gateway: Arc<dyn RepoGateway>, store: Arc<StateStore>) -> Self {
        Self { gateway, store }
    }

    /// Runs one detection cycle for `account`.
    ///
    /// A state persistence failure is logged and does not suppress the
    /// returned changes; the in-memory state already reflects them.
    ///
    /// # Errors
    ///
    /// Returns [`CheckError`] when the cycle is abandoned. State is untouched
    /// in that case.
    pub async fn check_account(&self, account: &str) -> Result<Vec<Change>, CheckError> {
        self.warn_if_quota_low(account).await;

        let listing = match self.gateway.list_repositories(account).await {
            FetchOutcome::Ok(listing) => listing,
            other => {
                return Err(CheckError::ListingUnavailable {
                    account: account.to_string(),
                    outcome: other.label().to_string(),
                })
            }
        };

        let inaccessible = self.store.inaccessible(account).await;

        let Some(previous) = self.store.snapshot(account).await else {
            self.seed(account, &listing, &inaccessible).await?;
            return Ok(Vec::new());
        };

        if listing.is_empty() && !previous.is_empty() {
            return Err(CheckError::EmptyListing {
                account: account.to_string(),
            });
        }

        let mut next = AccountState::new();
        let mut new_repositories = Vec::new();
        let mut updates = Vec::new();
        let mut newly_inaccessible = BTreeSet::new();
        let mut rate_limited = false;

        for repo in &listing {
            let Some(known) = previous.get(&repo.name) else {
                new_repositories.push(repo.clone());
                next.insert(repo.name.clone(), RepositorySnapshot::from_descriptor(repo));
                continue;
            };

            let mut snapshot = known.clone();
            snapshot.refresh_metadata(repo);

            if inaccessible.contains(&repo.name) {
                snapshot.has_accessible_commits = false;
            } else if !rate_limited {
                let outcome = self
                    .gateway
                    .list_commits(
                        account,
                        &repo.name,
                        known.last_commit_at,
                        Some(COMMIT_PAGE_LIMIT),
                    )
                    .await;

                match outcome {
                    FetchOutcome::Ok(commits) => {
                        snapshot.has_accessible_commits = true;
                        if let Some(newest) = commits.into_iter().max_by_key(|c| c.author_date) {
                            if snapshot.advance_last_commit(newest.author_date) {
                                info!(
                                    account = %account,
                                    repo = %repo.name,
                                    commit = %newest.sha,
                                    "Repository has new commits"
                                );
                                updates.push(Change::RepositoryUpdated {
                                    account: account.to_string(),
                                    repository: repo.name.clone(),
                                    html_url: repo.html_url.clone(),
                                    commit: newest,
                                });
                            }
                        }
                    }
                    denied if denied.is_access_denied() => {
                        info!(
                            account = %account,
                            repo = %repo.name,
                            outcome = denied.label(),
                            "Commits inaccessible, disabling checks for repository"
                        );
                        snapshot.has_accessible_commits = false;
                        newly_inaccessible.insert(repo.name.clone());
                    }
                    FetchOutcome::RateLimited => {
                        warn!(
                            account = %account,
                            repo = %repo.name,
                            "Rate limited, deferring remaining commit checks to next cycle"
                        );
                        rate_limited = true;
                    }
                    other => {
                        warn!(
                            account = %account,
                            repo = %repo.name,
                            outcome = other.label(),
                            "Commit check failed, will retry next cycle"
                        );
                    }
                }
            }

            next.insert(repo.name.clone(), snapshot);
        }

        let mut changes = Vec::with_capacity(updates.len() + 1);
        if !new_repositories.is_empty() {
            info!(
                account = %account,
                count = new_repositories.len(),
                "New repositories detected"
            );
            changes.push(Change::NewRepositories {
                account: account.to_string(),
                repositories: new_repositories,
            });
        }
        changes.extend(updates);

        if changes.is_empty() {
            debug!(account = %account, "No changes");
        }

        self.persist(account, next, newly_inaccessible).await;
        Ok(changes)
    }

    /// Records the initial snapshot for a never-observed account.
    async fn seed(
        &self,
        account: &str,
        listing: &[RepositoryDescriptor],
        inaccessible: &BTreeSet<String>,
    ) -> Result<(), CheckError> {
        info!(
            account = %account,
            repositories = listing.len(),
            "First observation, seeding state"
        );

        let mut seeded = AccountState::new();
        let mut newly_inaccessible = BTreeSet::new();

        for repo in listing {
            let mut snapshot = RepositorySnapshot::from_descriptor(repo);

            if inaccessible.contains(&repo.name) {
                snapshot.has_accessible_commits = false;
            } else {
                match self
                    .gateway
                    .list_commits(account, &repo.name, None, Some(1))
                    .await
                {
                    FetchOutcome::Ok(commits) => {
                        if let Some(newest) = commits.iter().map(|c| c.author_date).max() {
                            snapshot.advance_last_commit(newest);
                        }
                    }
                    denied if denied.is_access_denied() => {
                        debug!(
                            account = %account,
                            repo = %repo.name,
                            outcome = denied.label(),
                            "Commits inaccessible while seeding"
                        );
                        snapshot.has_accessible_commits = false;
                        newly_inaccessible.insert(repo.name.clone());
                    }
                    FetchOutcome::RateLimited => {
                        return Err(CheckError::SeedRateLimited {
                            account: account.to_string(),
                        });
                    }
                    other => {
                        warn!(
                            account = %account,
                            repo = %repo.name,
                            outcome = other.label(),
                            "Could not seed latest commit"
                        );
                    }
                }
            }

            seeded.insert(repo.name.clone(), snapshot);
        }

        self.persist(account, seeded, newly_inaccessible).await;
        Ok(())
    }

    async fn persist(
        &self,
        account: &str,
        repositories: AccountState,
        newly_inaccessible: BTreeSet<String>,
    ) {
        let update = AccountUpdate {
            repositories,
            newly_inaccessible,
            checked_at: Utc::now(),
        };
        if let Err(e) = self.store.commit(account, update).await {
            error!(
                account = %account,
                error = %e,
                "Failed to persist state, continuing with in-memory state"
            );
        }
    }

    async fn warn_if_quota_low(&self, account: &str) {
        match self.gateway.rate_limit_status().await {
            FetchOutcome::Ok(status) if status.remaining < RATE_LIMIT_WARN_THRESHOLD => {
                warn!(
                    account = %account,
                    remaining = status.remaining,
                    limit = status.limit,
                    reset_at = %status.reset_at,
                    "API quota nearly exhausted"
                );
            }
            FetchOutcome::Ok(status) => {
                debug!(remaining = status.remaining, limit = status.limit, "API quota");
            }
            other => {
                debug!(outcome = other.label(), "Could not read API quota");
            }
        }
    }
}
