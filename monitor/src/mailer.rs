//! Email delivery for notifications.
//!
//! [`Mailer`] is the delivery seam used by the dispatcher; [`SmtpMailer`]
//! sends plain-text UTF-8 messages over SMTP, using implicit TLS or STARTTLS
//! as selected by [`EmailConfig::uses_implicit_tls`].

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::EmailConfig;

/// Errors that can occur while building or sending a message.
#[derive(Error, Debug)]
pub enum DeliveryError {
    /// Sender or receiver is not a valid mailbox.
    #[error("invalid address: {0}")]
    InvalidAddress(#[from] lettre::address::AddressError),

    /// The message could not be assembled.
    #[error("message build error: {0}")]
    Message(#[from] lettre::error::Error),

    /// The SMTP exchange failed (connection, TLS, authentication or rejection).
    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// Delivers one notification.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Sends `body` with `subject` to the configured recipient.
    async fn send(&self, subject: &str, body: &str) -> Result<(), DeliveryError>;
}

/// SMTP mailer backed by a pooled async transport.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl SmtpMailer {
    /// Builds a mailer from SMTP settings.
    ///
    /// The sender address doubles as the SMTP login. No connection is opened
    /// until the first message is sent.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError`] if an address does not parse or the relay
    /// host is not usable for TLS.
    pub fn new(config: &EmailConfig) -> Result<Self, DeliveryError> {
        let from: Mailbox = config.sender.parse()?;
        let to: Mailbox = config.receiver.parse()?;
        let credentials = Credentials::new(config.sender.clone(), config.password.clone());

        let builder = if config.uses_implicit_tls() {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_server)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_server)?
        };
        let transport = builder
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        info!(
            server = %config.smtp_server,
            port = config.smtp_port,
            implicit_tls = config.uses_implicit_tls(),
            "SMTP mailer configured"
        );

        Ok(Self { transport, from, to })
    }

    /// Assembles the plain-text message without sending it.
    fn build_message(&self, subject: &str, body: &str) -> Result<Message, DeliveryError> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())?;
        Ok(message)
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, subject: &str, body: &str) -> Result<(), DeliveryError> {
        let message = self.build_message(subject, body)?;
        let response = self.transport.send(message).await?;
        debug!(code = %response.code(), "SMTP accepted message");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email_config(port: u16) -> EmailConfig {
        EmailConfig {
            smtp_server: "smtp.example.com".to_string(),
            smtp_port: port,
            sender: "watch@example.com".to_string(),
            password: "secret".to_string(),
            receiver: "Me <me@example.com>".to_string(),
        }
    }

    #[tokio::test]
    async fn test_new_accepts_valid_addresses() {
        assert!(SmtpMailer::new(&email_config(465)).is_ok());
        assert!(SmtpMailer::new(&email_config(587)).is_ok());
    }

    #[tokio::test]
    async fn test_new_rejects_invalid_sender() {
        let mut config = email_config(465);
        config.sender = "not an address".to_string();

        let result = SmtpMailer::new(&config);
        assert!(matches!(result, Err(DeliveryError::InvalidAddress(_))));
    }

    #[tokio::test]
    async fn test_build_message_is_plain_text() {
        let mailer = SmtpMailer::new(&email_config(465)).unwrap();
        let message = mailer
            .build_message("alice created 1 new repository", "Name: widget\n")
            .unwrap();

        let formatted = String::from_utf8(message.formatted()).unwrap();
        assert!(formatted.contains("Subject: alice created 1 new repository"));
        assert!(formatted.contains("text/plain"));
        assert!(formatted.contains("<me@example.com>"));
    }
}
