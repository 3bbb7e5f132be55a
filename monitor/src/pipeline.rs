//! Assembly of the detection and delivery halves.
//!
//! A [`Pipeline`] owns a [`Scheduler`] and the task running its
//! [`Dispatcher`](crate::dispatch::Dispatcher). Both `run` and `check-once`
//! go through it, so the queue is always drained before the process exits.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::Config;
use crate::detector::ChangeDetector;
use crate::dispatch::{spawn_dispatcher, DispatchStats};
use crate::error::Result;
use crate::gateway::{GithubGateway, RepoGateway};
use crate::history::NotificationHistory;
use crate::mailer::{Mailer, SmtpMailer};
use crate::scheduler::{PassSummary, Scheduler};
use crate::state::StateStore;

/// Scheduler plus its running dispatcher.
pub struct Pipeline {
    scheduler: Scheduler,
    dispatcher: JoinHandle<DispatchStats>,
}

impl Pipeline {
    /// Loads state and history from the configured directory and starts the
    /// dispatcher on the current runtime.
    ///
    /// # Errors
    ///
    /// Fails if email is not configured, the state file cannot be read, or
    /// the API client or mailer cannot be built.
    pub fn from_config(config: &Config) -> Result<Self> {
        let email = config.email_settings()?;
        let store = StateStore::load(config.state_path())?;
        let history = NotificationHistory::open(config.history_path());
        let gateway = GithubGateway::new(config.api_url.clone(), config.token.as_deref())?;
        let mailer = SmtpMailer::new(email)?;

        Ok(Self::new(
            config.accounts.clone(),
            config.check_interval,
            config.queue_size,
            Arc::new(gateway),
            Arc::new(store),
            Arc::new(mailer),
            history,
        ))
    }

    /// Wires already-built components together.
    ///
    /// # Panics
    ///
    /// Panics if `queue_size` is zero or when called outside a tokio runtime.
    #[must_use]
    pub fn new(
        accounts: Vec<String>,
        check_interval: Duration,
        queue_size: usize,
        gateway: Arc<dyn RepoGateway>,
        store: Arc<StateStore>,
        mailer: Arc<dyn Mailer>,
        history: NotificationHistory,
    ) -> Self {
        let (queue, dispatcher) = spawn_dispatcher(mailer, history, queue_size);
        let detector = ChangeDetector::new(gateway, store);
        let scheduler = Scheduler::new(accounts, Arc::new(detector), queue, check_interval);

        Self {
            scheduler,
            dispatcher,
        }
    }

    /// Runs the scheduler until `shutdown` fires, then waits for every queued
    /// notification to be handled.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Join`](crate::error::MonitorError::Join) if
    /// the dispatcher task panicked.
    pub async fn run_until(self, shutdown: watch::Receiver<bool>) -> Result<DispatchStats> {
        let Self {
            scheduler,
            dispatcher,
        } = self;

        scheduler.run(shutdown).await;

        info!("Draining notification queue");
        let stats = dispatcher.await?;
        info!(
            delivered = stats.delivered,
            failed = stats.failed,
            "Notification queue drained"
        );
        Ok(stats)
    }

    /// Runs a single pass and drains its notifications.
    ///
    /// The queue is drained even when the pass fails, so changes from the
    /// accounts that did complete still go out.
    ///
    /// # Errors
    ///
    /// Returns the pass failure, or a join error if the dispatcher panicked.
    pub async fn run_once(self) -> Result<(PassSummary, DispatchStats)> {
        let Self {
            scheduler,
            dispatcher,
        } = self;

        let pass = scheduler.run_pass().await;
        drop(scheduler);

        let stats = dispatcher.await?;
        Ok((pass?, stats))
    }
}
