//! Periodic check scheduling.
//!
//! The [`Scheduler`] wakes every [`POLL_TICK`] and decides, via [`Schedule`],
//! whether a check pass or a status line is due. The first pass runs
//! immediately. A pass spawns one detection task per account and waits for
//! all of them before the next interval starts counting.
//!
//! An error escaping a tick is logged and followed by [`ERROR_BACKOFF`]; the
//! last-check time is not advanced, so the failed pass is retried as soon as
//! the backoff ends.
//!
//! Shutdown is only observed between ticks, never in the middle of a pass.

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{sleep, Instant};
use tracing::{error, info, warn};

use crate::detector::ChangeDetector;
use crate::dispatch::NotificationQueue;

/// Interval between liveness status lines.
pub const STATUS_INTERVAL: Duration = Duration::from_secs(900);

/// Granularity of the scheduler loop.
pub const POLL_TICK: Duration = Duration::from_secs(10);

/// Pause after an error escapes a tick.
pub const ERROR_BACKOFF: Duration = Duration::from_secs(60);

/// Errors that abort a tick.
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// A detection task panicked or was cancelled.
    #[error("detection task failed: {0}")]
    TaskFailed(String),
}

/// Scheduler lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Starting,
    Running,
    Backoff,
}

/// Pure timing decisions for the scheduler loop.
#[derive(Debug, Clone)]
pub struct Schedule {
    check_interval: Duration,
    status_interval: Duration,
    last_check: Option<Instant>,
    last_status: Instant,
}

impl Schedule {
    #[must_use]
    pub fn new(check_interval: Duration, status_interval: Duration, now: Instant) -> Self {
        Self {
            check_interval,
            status_interval,
            last_check: None,
            last_status: now,
        }
    }

    /// True before the first pass and once a full interval has elapsed.
    #[must_use]
    pub fn check_due(&self, now: Instant) -> bool {
        match self.last_check {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.check_interval,
        }
    }

    #[must_use]
    pub fn status_due(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_status) >= self.status_interval
    }

    /// Time left until the next pass; zero when one is due.
    #[must_use]
    pub fn time_until_next_check(&self, now: Instant) -> Duration {
        match self.last_check {
            None => Duration::ZERO,
            Some(last) => (last + self.check_interval).saturating_duration_since(now),
        }
    }

    pub fn mark_checked(&mut self, at: Instant) {
        self.last_check = Some(at);
    }

    pub fn mark_status(&mut self, at: Instant) {
        self.last_status = at;
    }
}

/// Outcome of one pass across all accounts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Accounts whose cycle completed.
    pub checked: Vec<String>,

    /// Accounts whose cycle was abandoned.
    pub skipped: Vec<String>,

    /// Changes handed to the dispatch queue.
    pub enqueued: usize,
}

/// Drives periodic check passes.
pub struct Scheduler {
    accounts: Vec<String>,
    detector: Arc<ChangeDetector>,
    queue: NotificationQueue,
    schedule: Schedule,
    state: SchedulerState,
}

impl Scheduler {
    #[must_use]
    pub fn new(
        accounts: Vec<String>,
        detector: Arc<ChangeDetector>,
        queue: NotificationQueue,
        check_interval: Duration,
    ) -> Self {
        Self {
            accounts,
            detector,
            queue,
            schedule: Schedule::new(check_interval, STATUS_INTERVAL, Instant::now()),
            state: SchedulerState::Starting,
        }
    }

    #[must_use]
    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Runs passes until `shutdown` turns true or its sender is dropped.
    ///
    /// Only the idle and backoff sleeps are interrupted. A pass that has
    /// started always finishes and enqueues its changes first, since the
    /// detector has already persisted them by then. Dropping `self` on return
    /// closes this scheduler's queue handle.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(accounts = %self.accounts.join(", "), "Scheduler starting");

        loop {
            let pause = self.step().await;
            tokio::select! {
                _ = shutdown.wait_for(|stop| *stop) => break,
                () = sleep(pause) => {}
            }
        }

        info!("Scheduler stopped");
    }

    /// Runs one tick and returns how long to wait before the next.
    pub async fn step(&mut self) -> Duration {
        match self.tick().await {
            Ok(()) => {
                self.state = SchedulerState::Running;
                POLL_TICK
            }
            Err(e) => {
                error!(
                    error = %e,
                    backoff_secs = ERROR_BACKOFF.as_secs(),
                    "Scheduler tick failed, backing off"
                );
                self.state = SchedulerState::Backoff;
                ERROR_BACKOFF
            }
        }
    }

    /// Emits a status line and runs a pass when either is due.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError`] if a detection task failed; the pass is then
    /// not recorded as completed.
    pub async fn tick(&mut self) -> Result<(), SchedulerError> {
        let now = Instant::now();

        if self.schedule.status_due(now) {
            self.log_status(now);
            self.schedule.mark_status(now);
        }

        if self.schedule.check_due(now) {
            self.run_pass().await?;
            self.schedule.mark_checked(Instant::now());
        }

        Ok(())
    }

    fn log_status(&self, now: Instant) {
        let remaining = self.schedule.time_until_next_check(now);
        info!(
            now = %Local::now().format("%Y-%m-%d %H:%M:%S"),
            accounts = %self.accounts.join(", "),
            next_check_in_mins = remaining.as_secs() / 60,
            "Watcher running"
        );
    }

    /// Checks every account concurrently and waits for all of them.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::TaskFailed`] if any detection task panicked.
    /// The other accounts' tasks still run to completion.
    pub async fn run_pass(&self) -> Result<PassSummary, SchedulerError> {
        info!(accounts = self.accounts.len(), "Starting check pass");

        let mut tasks = JoinSet::new();
        for account in &self.accounts {
            let account = account.clone();
            let detector = Arc::clone(&self.detector);
            let queue = self.queue.clone();

            tasks.spawn(async move {
                let result = detector.check_account(&account).await;
                let mut enqueued = 0;
                let completed = match result {
                    Ok(changes) => {
                        for change in changes {
                            match queue.enqueue(change).await {
                                Ok(()) => enqueued += 1,
                                Err(e) => {
                                    error!(account = %account, error = %e, "Failed to enqueue notification");
                                }
                            }
                        }
                        true
                    }
                    Err(e) => {
                        warn!(account = %account, error = %e, "Skipping account this pass");
                        false
                    }
                };
                (account, completed, enqueued)
            });
        }

        let mut summary = PassSummary::default();
        let mut failure = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((account, true, enqueued)) => {
                    summary.enqueued += enqueued;
                    summary.checked.push(account);
                }
                Ok((account, false, _)) => summary.skipped.push(account),
                Err(e) => {
                    error!(error = %e, "Detection task failed");
                    failure.get_or_insert(SchedulerError::TaskFailed(e.to_string()));
                }
            }
        }

        if let Some(failure) = failure {
            return Err(failure);
        }

        info!(
            checked = summary.checked.len(),
            skipped = summary.skipped.len(),
            notifications = summary.enqueued,
            "Check pass complete"
        );
        Ok(summary)
    }
}
