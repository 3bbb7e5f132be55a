//! Notification dispatch queue.
//!
//! Detection tasks enqueue [`Change`]s through cloned [`NotificationQueue`]
//! handles; a single [`Dispatcher`] task drains them strictly in enqueue
//! order. For each item the dispatcher:
//!
//! 1. Formats it into a subject/body pair
//! 2. Appends it to the notification history
//! 3. Hands it to the [`Mailer`], one delivery at a time
//!
//! A failed delivery is logged and dropped; the dispatcher moves on to the
//! next item. The dispatcher exits once every queue handle has been dropped
//! and the channel is drained.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use repowatch_monitor::dispatch::spawn_dispatcher;
//! use repowatch_monitor::history::NotificationHistory;
//! # use repowatch_monitor::mailer::Mailer;
//!
//! # async fn run(mailer: Arc<dyn Mailer>) {
//! let history = NotificationHistory::open("/tmp/notifications.json");
//! let (queue, handle) = spawn_dispatcher(mailer, history, 1000);
//!
//! // ... enqueue from any number of tasks ...
//! drop(queue);
//! let stats = handle.await.unwrap();
//! println!("delivered {}", stats.delivered);
//! # }
//! ```

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::format::format_change;
use crate::history::NotificationHistory;
use crate::mailer::Mailer;
use crate::types::Change;

/// Errors returned to producers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The dispatcher has stopped and no longer accepts notifications.
    #[error("notification queue closed")]
    Closed,
}

/// Producer handle for the dispatch queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct NotificationQueue {
    tx: mpsc::Sender<Change>,
}

impl NotificationQueue {
    /// Enqueues a change, waiting for capacity if the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Closed`] if the dispatcher has stopped.
    pub async fn enqueue(&self, change: Change) -> Result<(), DispatchError> {
        self.tx.send(change).await.map_err(|_| DispatchError::Closed)
    }
}

/// Counters reported when the dispatcher stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub delivered: usize,
    pub failed: usize,
}

/// Single consumer of the dispatch queue.
pub struct Dispatcher {
    rx: mpsc::Receiver<Change>,
    mailer: Arc<dyn Mailer>,
    history: NotificationHistory,
    stats: DispatchStats,
}

impl Dispatcher {
    /// Creates a dispatcher and its producer handle.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(
        mailer: Arc<dyn Mailer>,
        history: NotificationHistory,
        capacity: usize,
    ) -> (NotificationQueue, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        let dispatcher = Self {
            rx,
            mailer,
            history,
            stats: DispatchStats::default(),
        };
        (NotificationQueue { tx }, dispatcher)
    }

    /// Drains the queue until every producer handle is dropped.
    pub async fn run(mut self) -> DispatchStats {
        debug!("Dispatcher started");

        while let Some(change) = self.rx.recv().await {
            self.dispatch(change).await;
        }

        info!(
            delivered = self.stats.delivered,
            failed = self.stats.failed,
            "Dispatcher stopped"
        );
        self.stats
    }

    async fn dispatch(&mut self, change: Change) {
        let notification = format_change(&change);

        if let Err(e) = self.history.append(&notification).await {
            error!(
                account = %change.account(),
                subject = %notification.subject,
                error = %e,
                "Failed to record notification history"
            );
        }

        match self
            .mailer
            .send(&notification.subject, &notification.body)
            .await
        {
            Ok(()) => {
                self.stats.delivered += 1;
                info!(
                    account = %change.account(),
                    subject = %notification.subject,
                    "Notification delivered"
                );
            }
            Err(e) => {
                self.stats.failed += 1;
                error!(
                    account = %change.account(),
                    subject = %notification.subject,
                    error = %e,
                    "Notification delivery failed, dropping"
                );
            }
        }
    }
}

/// Spawns a [`Dispatcher`] on the current runtime.
///
/// # Panics
///
/// Panics if `capacity` is zero.
#[must_use]
pub fn spawn_dispatcher(
    mailer: Arc<dyn Mailer>,
    history: NotificationHistory,
    capacity: usize,
) -> (NotificationQueue, JoinHandle<DispatchStats>) {
    let (queue, dispatcher) = Dispatcher::new(mailer, history, capacity);
    (queue, tokio::spawn(dispatcher.run()))
}
