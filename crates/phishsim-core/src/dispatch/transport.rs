//! Mail transport - Sends rendered campaign emails over SMTP

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use phishsim_common::config::{SmtpConfig, SmtpSecurity};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Invalid {field} address: {reason}")]
    InvalidAddress { field: &'static str, reason: String },

    #[error("Failed to build email: {0}")]
    Build(String),

    #[error("Failed to create SMTP transport: {0}")]
    Setup(String),

    #[error("SMTP send failed: {0}")]
    Send(String),
}

/// One outgoing campaign email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

/// Outbound mail collaborator
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Send one email. An error leaves the recipient eligible for a later dispatch.
    async fn send(&self, email: &OutgoingEmail) -> Result<(), TransportError>;
}

/// SMTP transport backed by lettre
pub struct SmtpTransport {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpTransport {
    /// Build the SMTP client from configuration
    pub fn new(config: &SmtpConfig) -> Result<Self, TransportError> {
        let mut builder = match config.tls {
            SmtpSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| TransportError::Setup(e.to_string()))?,
            SmtpSecurity::Starttls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                    .map_err(|e| TransportError::Setup(e.to_string()))?
            }
            SmtpSecurity::None => {
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
            }
        }
        .port(config.port);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        let mailer = builder
            .timeout(Some(Duration::from_secs(config.timeout_secs)))
            .build();

        Ok(Self { mailer })
    }

    fn build_message(email: &OutgoingEmail) -> Result<Message, TransportError> {
        let from: Mailbox = email.from.parse().map_err(|e: lettre::address::AddressError| {
            TransportError::InvalidAddress {
                field: "from",
                reason: e.to_string(),
            }
        })?;
        let to: Mailbox = email.to.parse().map_err(|e: lettre::address::AddressError| {
            TransportError::InvalidAddress {
                field: "to",
                reason: e.to_string(),
            }
        })?;

        let msg_id = format!("<{}.{}@phishsim>", Uuid::new_v4(), chrono::Utc::now().timestamp());

        Message::builder()
            .from(from)
            .to(to)
            .subject(email.subject.as_str())
            .message_id(Some(msg_id))
            .header(ContentType::TEXT_HTML)
            .body(email.html_body.clone())
            .map_err(|e| TransportError::Build(e.to_string()))
    }
}

#[async_trait]
impl MailTransport for SmtpTransport {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), TransportError> {
        let message = Self::build_message(email)?;

        let response = self
            .mailer
            .send(message)
            .await
            .map_err(|e| TransportError::Send(e.to_string()))?;

        debug!(code = %response.code(), "SMTP server accepted message");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email(from: &str, to: &str) -> OutgoingEmail {
        OutgoingEmail {
            from: from.to_string(),
            to: to.to_string(),
            subject: "Payroll update".to_string(),
            html_body: "<p>Hello</p>".to_string(),
        }
    }

    #[test]
    fn test_build_message() {
        let message =
            SmtpTransport::build_message(&email("HR <hr@example.com>", "alice@example.com"))
                .unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();

        assert!(raw.contains("Subject: Payroll update"));
        assert!(raw.contains("Content-Type: text/html"));
        assert!(raw.contains("@phishsim>"));
    }

    #[test]
    fn test_build_message_rejects_bad_address() {
        let err = SmtpTransport::build_message(&email("hr@example.com", "not an address"))
            .unwrap_err();
        assert!(matches!(err, TransportError::InvalidAddress { field: "to", .. }));
    }

    #[test]
    fn test_new_plaintext() {
        let config = SmtpConfig {
            tls: SmtpSecurity::None,
            port: 2525,
            ..Default::default()
        };
        assert!(SmtpTransport::new(&config).is_ok());
    }
}
