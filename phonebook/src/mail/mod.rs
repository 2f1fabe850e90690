//! Transactional email dispatch.
//!
//! [`EmailSender`] is the seam the auth manager talks to. [`SmtpEmailSender`]
//! delivers over SMTP with STARTTLS via `lettre`. [`LogEmailSender`] only
//! logs the message and its link, for servers running without SMTP.
//! [`RecordingEmailSender`] keeps messages in memory for tests.

pub mod templates;

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use thiserror::Error;
use tokio::sync::Mutex;

pub use templates::{EmailTemplate, EmbeddedTemplates, TemplateRenderer};

/// Mail errors
#[derive(Debug, Error)]
pub enum MailError {
    #[error("Invalid address {0}")]
    InvalidAddress(String),

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("SMTP transport error: {0}")]
    Transport(String),

    #[error("Template error: {0}")]
    Template(String),
}

/// An outgoing HTML email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Sends transactional email.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, message: EmailMessage) -> Result<(), MailError>;
}

/// SMTP relay settings
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

/// SMTP sender backed by a pooled async transport
pub struct SmtpEmailSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpEmailSender {
    pub fn new(config: &SmtpConfig) -> Result<Self, MailError> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| MailError::Transport(e.to_string()))?
            .port(config.port)
            .credentials(Credentials::new(
                config.user.clone(),
                config.password.clone(),
            ))
            .build();

        Ok(Self { transport })
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, MailError> {
    address
        .parse()
        .map_err(|_| MailError::InvalidAddress(address.to_string()))
}

#[async_trait]
impl EmailSender for SmtpEmailSender {
    async fn send(&self, message: EmailMessage) -> Result<(), MailError> {
        let email = Message::builder()
            .from(parse_mailbox(&message.from)?)
            .to(parse_mailbox(&message.to)?)
            .subject(message.subject)
            .header(ContentType::TEXT_HTML)
            .body(message.html)
            .map_err(|e| MailError::Build(e.to_string()))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        Ok(())
    }
}

/// Sender for deployments without SMTP: logs each message and keeps nothing.
#[derive(Debug, Default)]
pub struct LogEmailSender;

impl LogEmailSender {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, message: EmailMessage) -> Result<(), MailError> {
        match first_link(&message.html) {
            Some(link) => log::info!(
                "Email to {} ({}) not sent, SMTP disabled. Link: {}",
                message.to,
                message.subject,
                link
            ),
            None => log::info!(
                "Email to {} ({}) not sent, SMTP disabled",
                message.to,
                message.subject
            ),
        }
        log::debug!("Email body: {}", message.html);
        Ok(())
    }
}

/// First `href` in a rendered body, with `&amp;` unescaped.
fn first_link(html: &str) -> Option<String> {
    let start = html.find("href=\"")? + "href=\"".len();
    let end = html[start..].find('"')?;
    Some(html[start..start + end].replace("&amp;", "&"))
}

/// In-memory sender that records every message it accepts.
///
/// Can be switched into a failing mode to exercise dispatch errors.
#[derive(Default)]
pub struct RecordingEmailSender {
    sent: Mutex<Vec<EmailMessage>>,
    failing: Mutex<bool>,
}

impl RecordingEmailSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent sends fail (or succeed again).
    pub async fn set_failing(&self, failing: bool) {
        *self.failing.lock().await = failing;
    }

    pub async fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().await.clone()
    }

    pub async fn last(&self) -> Option<EmailMessage> {
        self.sent.lock().await.last().cloned()
    }
}

#[async_trait]
impl EmailSender for RecordingEmailSender {
    async fn send(&self, message: EmailMessage) -> Result<(), MailError> {
        if *self.failing.lock().await {
            return Err(MailError::Transport("recording sender set to fail".to_string()));
        }
        log::info!("Recorded email to {} ({})", message.to, message.subject);
        self.sent.lock().await.push(message);
        Ok(())
    }
}
