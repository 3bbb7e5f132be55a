//! Error types for the RepoWatch Monitor.
//!
//! Each component owns a focused error enum; [`MonitorError`] gathers the ones
//! that can stop a [`Pipeline`](crate::pipeline::Pipeline).

use thiserror::Error;

use crate::config::ConfigError;
use crate::gateway::GatewayError;
use crate::mailer::DeliveryError;
use crate::scheduler::SchedulerError;
use crate::state::StateError;

/// Errors that can occur during monitor operations.
#[derive(Error, Debug)]
pub enum MonitorError {
    /// Configuration-related error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The API client could not be built.
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// The state image could not be loaded.
    #[error("state error: {0}")]
    State(#[from] StateError),

    /// The mailer could not be configured.
    #[error("delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// The dispatcher task panicked.
    #[error("dispatcher task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// A specialized `Result` type for monitor operations.
pub type Result<T> = std::result::Result<T, MonitorError>;
