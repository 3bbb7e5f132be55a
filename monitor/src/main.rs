//! RepoWatch Monitor - repository activity watcher.
//!
//! This binary polls GitHub accounts and emails a notification whenever a
//! watched account creates a repository or pushes new commits.
//!
//! # Commands
//!
//! - `repowatch run`: Start the watcher daemon
//! - `repowatch check-once`: Run a single check pass and exit
//! - `repowatch check-token`: Verify API credentials and quota
//! - `repowatch test-email`: Send a test message with the configured SMTP settings
//!
//! # Environment Variables
//!
//! See the [`config`] module for available configuration options.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use repowatch_monitor::config::Config;
use repowatch_monitor::gateway::{FetchOutcome, GithubGateway, RepoGateway};
use repowatch_monitor::mailer::{Mailer, SmtpMailer};
use repowatch_monitor::pipeline::Pipeline;

/// RepoWatch Monitor - repository activity watcher.
///
/// Polls GitHub accounts for new repositories and new commits and sends an
/// email notification for each change.
#[derive(Parser, Debug)]
#[command(name = "repowatch")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
ENVIRONMENT VARIABLES:
    REPOWATCH_ACCOUNTS             Comma-separated accounts (required for 'run', 'check-once')
    REPOWATCH_CHECK_INTERVAL_SECS  Seconds between passes (default: 1800)
    REPOWATCH_GITHUB_TOKEN         API token (optional)
    REPOWATCH_API_URL              API base URL (default: https://api.github.com)
    REPOWATCH_STATE_DIR            State directory (default: ~/.repowatch)
    REPOWATCH_QUEUE_SIZE           Notification queue capacity (default: 1000)
    REPOWATCH_SMTP_SERVER          SMTP host
    REPOWATCH_SMTP_PORT            SMTP port (default: 465)
    REPOWATCH_SMTP_SENDER          Sender address and SMTP login
    REPOWATCH_SMTP_PASSWORD        SMTP password
    REPOWATCH_SMTP_RECEIVER        Recipient address

EXAMPLES:
    # Verify the token before starting
    export REPOWATCH_GITHUB_TOKEN=ghp_...
    repowatch check-token --account octocat

    # Start the watcher
    export REPOWATCH_ACCOUNTS=octocat,rust-lang
    repowatch run
")]
struct Cli {
    /// Emit logs as JSON lines instead of human-readable text.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Start the watcher daemon.
    ///
    /// Runs a check pass immediately and then every check interval until
    /// interrupted. Requires REPOWATCH_ACCOUNTS and the SMTP settings.
    Run,

    /// Run a single check pass, deliver its notifications and exit.
    CheckOnce,

    /// Verify API credentials and print the remaining quota.
    CheckToken {
        /// Also verify that this account's repositories can be listed.
        #[arg(short, long)]
        account: Option<String>,
    },

    /// Send a test email using the configured SMTP settings.
    TestEmail,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.log_json);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    match cli.command {
        Command::Run => runtime.block_on(run_monitor()),
        Command::CheckOnce => runtime.block_on(run_check_once()),
        Command::CheckToken { account } => runtime.block_on(run_check_token(account)),
        Command::TestEmail => runtime.block_on(run_test_email()),
    }
}

/// Runs the watcher daemon.
///
/// The first signal lets the current pass finish and drains the queue. A
/// second signal exits without waiting for the queue.
async fn run_monitor() -> Result<()> {
    info!("Starting RepoWatch Monitor");

    let config = Config::from_env().context("Failed to load configuration")?;
    log_config(&config);

    let pipeline = Pipeline::from_config(&config).context("Failed to start monitor")?;
    let (stop_tx, stop_rx) = watch::channel(false);

    info!("Monitor running. Press Ctrl+C to stop.");

    let running = pipeline.run_until(stop_rx);
    tokio::pin!(running);

    let result = tokio::select! {
        result = &mut running => result,
        () = wait_for_shutdown() => {
            info!("Shutdown signal received, finishing current pass");
            stop_tx.send_replace(true);
            tokio::select! {
                result = &mut running => result,
                () = wait_for_shutdown() => {
                    warn!("Second shutdown signal, exiting without draining the notification queue");
                    return Ok(());
                }
            }
        }
    };

    result.context("Monitor failed")?;
    info!("Monitor stopped");
    Ok(())
}

/// Runs one check pass and waits for its notifications to be delivered.
async fn run_check_once() -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    log_config(&config);

    let pipeline = Pipeline::from_config(&config).context("Failed to start monitor")?;
    let (summary, stats) = pipeline.run_once().await.context("Check pass failed")?;

    println!(
        "Checked {} account(s), skipped {}, {} notification(s): {} delivered, {} failed",
        summary.checked.len(),
        summary.skipped.len(),
        summary.enqueued,
        stats.delivered,
        stats.failed
    );
    for account in &summary.skipped {
        println!("  skipped: {account}");
    }

    Ok(())
}

/// Verifies API credentials and prints quota information.
async fn run_check_token(account: Option<String>) -> Result<()> {
    let token = std::env::var("REPOWATCH_GITHUB_TOKEN")
        .ok()
        .filter(|t| !t.trim().is_empty());
    let api_url = std::env::var("REPOWATCH_API_URL")
        .unwrap_or_else(|_| "https://api.github.com".to_string());

    let gateway = GithubGateway::new(api_url, token.as_deref().map(str::trim))
        .context("Failed to build API client")?;
    println!("API: {}", gateway.base_url());

    if token.is_some() {
        match gateway.validate_credentials().await {
            FetchOutcome::Ok(login) => println!("Token authenticated as: {login}"),
            other => bail!("Token authentication failed ({})", other.label()),
        }
    } else {
        println!("No REPOWATCH_GITHUB_TOKEN set, using unauthenticated access");
    }

    match gateway.rate_limit_status().await {
        FetchOutcome::Ok(status) => {
            println!("Remaining requests: {}/{}", status.remaining, status.limit);
            println!(
                "Quota resets at: {}",
                status
                    .reset_at
                    .with_timezone(&chrono::Local)
                    .format("%Y-%m-%d %H:%M:%S")
            );
        }
        other => println!("Could not read rate limit ({})", other.label()),
    }

    if let Some(account) = account {
        match gateway.list_repositories(&account).await {
            FetchOutcome::Ok(repos) => {
                println!("Repositories visible for {account}: {}", repos.len());
                if let Some(first) = repos.first() {
                    match gateway.list_commits(&account, &first.name, None, Some(1)).await {
                        FetchOutcome::Ok(_) => println!("Commit history of {} is readable", first.name),
                        other => println!(
                            "Commit history of {} is not readable ({})",
                            first.name,
                            other.label()
                        ),
                    }
                }
            }
            other => bail!("Cannot list repositories for {account} ({})", other.label()),
        }
    }

    Ok(())
}

/// Sends a test message describing the SMTP settings in use.
async fn run_test_email() -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    let email = config
        .email_settings()
        .context("Email delivery is not configured")?;
    let mailer = SmtpMailer::new(email).context("Failed to configure SMTP mailer")?;

    let body = format!(
        "This is a RepoWatch test message.\n\
         If you received it, email delivery is configured correctly.\n\n\
         SMTP server: {}\n\
         SMTP port: {}\n\
         Implicit TLS: {}\n\
         Sender: {}\n\
         Receiver: {}\n",
        email.smtp_server,
        email.smtp_port,
        email.uses_implicit_tls(),
        email.sender,
        email.receiver
    );

    mailer
        .send("RepoWatch - email test", &body)
        .await
        .context("Failed to send test email")?;

    println!("Test email sent to {}", email.receiver);
    Ok(())
}

fn log_config(config: &Config) {
    info!(
        accounts = %config.accounts.join(", "),
        check_interval_secs = config.check_interval.as_secs(),
        api_url = %config.api_url,
        authenticated = config.token.is_some(),
        state_dir = %config.state_dir.display(),
        "Configuration loaded"
    );
}

/// Initializes the tracing subscriber for logging.
///
/// `RUST_LOG` overrides the default `info` level.
fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
