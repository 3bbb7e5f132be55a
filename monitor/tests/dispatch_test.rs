//! Integration tests for the notification dispatch queue.
//!
//! These tests verify FIFO delivery, that a failed delivery does not block
//! later items, and that every dispatched item lands in the history.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use repowatch_monitor::dispatch::{spawn_dispatcher, DispatchError};
use repowatch_monitor::history::NotificationHistory;
use repowatch_monitor::mailer::{DeliveryError, Mailer};
use repowatch_monitor::types::{Change, CommitDescriptor};
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

// =============================================================================
// Test Helpers
// =============================================================================

/// Records subjects in send order and fails the sends listed in `fail_on`.
#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<String>>,
    fail_on: Vec<usize>,
}

impl RecordingMailer {
    fn failing_on(fail_on: Vec<usize>) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_on,
        }
    }

    fn subjects(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, subject: &str, _body: &str) -> Result<(), DeliveryError> {
        let mut sent = self.sent.lock().unwrap();
        let index = sent.len();
        sent.push(subject.to_string());
        if self.fail_on.contains(&index) {
            // Any lettre error will do; an unparsable address is the easiest to build.
            let err = "not an address".parse::<lettre::Address>().unwrap_err();
            return Err(DeliveryError::InvalidAddress(err));
        }
        Ok(())
    }
}

fn update(account: &str, repo: &str, sha: &str) -> Change {
    Change::RepositoryUpdated {
        account: account.to_string(),
        repository: repo.to_string(),
        html_url: format!("https://github.com/{account}/{repo}"),
        commit: CommitDescriptor {
            sha: sha.to_string(),
            message: format!("change {sha}"),
            author_name: "dev".to_string(),
            author_date: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            html_url: format!("https://github.com/{account}/{repo}/commit/{sha}"),
        },
    }
}

// =============================================================================
// Ordering and Failure Tests
// =============================================================================

#[tokio::test]
async fn test_notifications_are_delivered_in_enqueue_order() {
    let dir = TempDir::new().unwrap();
    let history = NotificationHistory::open(dir.path().join("notifications.json"));
    let mailer = Arc::new(RecordingMailer::default());

    let (queue, handle) = spawn_dispatcher(mailer.clone(), history, 8);
    for repo in ["one", "two", "three"] {
        assert_ok!(queue.enqueue(update("alice", repo, repo)).await);
    }
    drop(queue);

    let stats = handle.await.unwrap();
    assert_eq!(stats.delivered, 3);
    assert_eq!(
        mailer.subjects(),
        vec![
            "Repository updated - alice/one",
            "Repository updated - alice/two",
            "Repository updated - alice/three",
        ]
    );
}

#[tokio::test]
async fn test_failed_delivery_does_not_block_later_items() {
    let dir = TempDir::new().unwrap();
    let history_path = dir.path().join("notifications.json");
    let history = NotificationHistory::open(&history_path);
    let mailer = Arc::new(RecordingMailer::failing_on(vec![0]));

    let (queue, handle) = spawn_dispatcher(mailer.clone(), history, 8);
    queue.enqueue(update("alice", "broken", "x")).await.unwrap();
    queue.enqueue(update("alice", "fine", "y")).await.unwrap();
    drop(queue);

    let stats = handle.await.unwrap();
    assert_eq!(stats.delivered, 1);
    assert_eq!(stats.failed, 1);

    // The failed item is not retried.
    assert_eq!(mailer.subjects().len(), 2);

    // History records every dispatched item, delivered or not.
    let recorded = NotificationHistory::open(&history_path);
    let subjects: Vec<_> = recorded.entries().iter().map(|e| e.subject.as_str()).collect();
    assert_eq!(
        subjects,
        vec!["Repository updated - alice/broken", "Repository updated - alice/fine"]
    );
}

#[tokio::test]
async fn test_producers_share_one_queue() {
    let dir = TempDir::new().unwrap();
    let history = NotificationHistory::open(dir.path().join("notifications.json"));
    let mailer = Arc::new(RecordingMailer::default());

    let (queue, handle) = spawn_dispatcher(mailer.clone(), history, 2);

    let mut producers = Vec::new();
    for account in ["alice", "bob", "carol"] {
        let queue = queue.clone();
        producers.push(tokio::spawn(async move {
            for n in 0..4 {
                queue
                    .enqueue(update(account, &format!("r{n}"), "sha"))
                    .await
                    .unwrap();
            }
        }));
    }
    for producer in producers {
        producer.await.unwrap();
    }
    drop(queue);

    let stats = handle.await.unwrap();
    assert_eq!(stats.delivered, 12);

    // Per-producer order is preserved.
    for account in ["alice", "bob", "carol"] {
        let own: Vec<_> = mailer
            .subjects()
            .into_iter()
            .filter(|s| s.contains(&format!("{account}/")))
            .collect();
        let expected: Vec<_> = (0..4)
            .map(|n| format!("Repository updated - {account}/r{n}"))
            .collect();
        assert_eq!(own, expected);
    }
}

#[tokio::test]
async fn test_enqueue_after_dispatcher_stops_is_rejected() {
    let dir = TempDir::new().unwrap();
    let history = NotificationHistory::open(dir.path().join("notifications.json"));
    let mailer = Arc::new(RecordingMailer::default());

    let (queue, handle) = spawn_dispatcher(mailer, history, 1);
    handle.abort();
    let _ = handle.await;

    let result = queue.enqueue(update("alice", "late", "z")).await;
    assert_err!(&result);
    assert_eq!(result, Err(DispatchError::Closed));
}
