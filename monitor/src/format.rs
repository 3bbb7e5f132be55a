//! Human-readable rendering of detected changes.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::types::{Change, CommitDescriptor, PendingNotification, RepositoryDescriptor};

/// Renders a change into a subject/body pair.
#[must_use]
pub fn format_change(change: &Change) -> PendingNotification {
    match change {
        Change::NewRepositories {
            account,
            repositories,
        } => format_new_repositories(account, repositories),
        Change::RepositoryUpdated {
            account,
            repository,
            html_url,
            commit,
        } => format_repository_updated(account, repository, html_url, commit),
    }
}

fn format_new_repositories(
    account: &str,
    repositories: &[RepositoryDescriptor],
) -> PendingNotification {
    let noun = if repositories.len() == 1 {
        "repository"
    } else {
        "repositories"
    };
    let subject = format!("{account} created {} new {noun}", repositories.len());

    let mut body = format!("{account} created new {noun}:\n\n");
    for repo in repositories {
        body.push_str(&format!("Name: {}\n", repo.name));
        body.push_str(&format!("Created: {}\n", timestamp(repo.created_at)));
        body.push_str(&format!(
            "Language: {}\n",
            repo.language.as_deref().unwrap_or("unknown")
        ));
        body.push_str(&format!(
            "Description: {}\n",
            repo.description
                .as_deref()
                .filter(|d| !d.trim().is_empty())
                .unwrap_or("none")
        ));
        if !repo.topics.is_empty() {
            body.push_str(&format!("Topics: {}\n", repo.topics.join(", ")));
        }
        body.push_str(&format!("Stars: {}\n", repo.stars));
        body.push_str(&format!("URL: {}\n\n", repo.html_url));
    }

    PendingNotification { subject, body }
}

fn format_repository_updated(
    account: &str,
    repository: &str,
    html_url: &str,
    commit: &CommitDescriptor,
) -> PendingNotification {
    let subject = format!("Repository updated - {account}/{repository}");
    let body = format!(
        "{account}/{repository} has new commits.\n\n\
         Latest commit:\n\
         Author: {}\n\
         Date: {}\n\
         Message: {}\n\
         Commit: {}\n\n\
         Repository: {html_url}\n",
        commit.author_name,
        timestamp(commit.author_date),
        commit.message.trim_end(),
        commit.html_url,
    );

    PendingNotification { subject, body }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}
