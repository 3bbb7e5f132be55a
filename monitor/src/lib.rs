//! RepoWatch Monitor - repository activity watcher.
//!
//! This crate polls a set of GitHub accounts on a fixed interval, detects
//! newly created repositories and new commits, and delivers an email for
//! each change.
//!
//! # Overview
//!
//! A check pass runs one detection task per account. Each task compares the
//! account's persisted snapshot with a fresh listing and hands detected
//! changes to a FIFO queue, which a single dispatcher drains into the
//! notification history and the mail transport. The first time an account is
//! seen its state is only recorded; nothing is reported.
//!
//! # Modules
//!
//! - [`types`]: Repository, commit and change types
//! - [`gateway`]: HTTP access to the repository-hosting API
//! - [`state`]: Persisted per-account snapshots
//! - [`detector`]: Per-account change detection
//! - [`format`]: Notification subject and body rendering
//! - [`history`]: Append-only record of sent notifications
//! - [`mailer`]: SMTP delivery
//! - [`dispatch`]: FIFO notification queue and its consumer
//! - [`scheduler`]: Periodic check passes
//! - [`pipeline`]: Scheduler and dispatcher wired together
//! - [`config`]: Configuration from environment variables
//! - [`error`]: Error types for monitor operations

pub mod config;
pub mod detector;
pub mod dispatch;
pub mod error;
pub mod format;
pub mod gateway;
pub mod history;
pub mod mailer;
pub mod pipeline;
pub mod scheduler;
pub mod state;
pub mod types;

pub use config::{Config, EmailConfig};
pub use detector::{ChangeDetector, CheckError};
pub use dispatch::{spawn_dispatcher, DispatchStats, Dispatcher, NotificationQueue};
pub use error::{MonitorError, Result};
pub use format::format_change;
pub use gateway::{FetchOutcome, GithubGateway, RepoGateway, RetryPolicy};
pub use history::NotificationHistory;
pub use mailer::{DeliveryError, Mailer, SmtpMailer};
pub use pipeline::Pipeline;
pub use scheduler::{PassSummary, Scheduler, SchedulerState};
pub use state::StateStore;
pub use types::{Change, CommitDescriptor, PendingNotification, RepositoryDescriptor};
