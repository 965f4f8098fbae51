//! Outbound mail for contact form submissions.

use crate::config::MailConfig;
use crate::web::forms::ContactForm;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use thiserror::Error;

pub const CONTACT_SUBJECT: &str = "Blog Contact Form Submission";

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Mail relay is not configured: {0}")]
    NotConfigured(&'static str),

    #[error("Invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("Cannot build message: {0}")]
    Build(#[from] lettre::error::Error),

    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// A contact submission addressed to the site owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl ContactMessage {
    pub fn from_form(form: &ContactForm, recipient: &str) -> Self {
        Self {
            from: form.email.trim().to_string(),
            to: recipient.to_string(),
            subject: CONTACT_SUBJECT.to_string(),
            body: format!(
                "{} says: \n{}\n\nPhone: {}",
                form.name.trim(),
                form.message,
                form.phone.trim()
            ),
        }
    }
}

/// Delivers contact messages. Implementations block; callers run them on
/// the blocking pool.
pub trait MailRelay: Send + Sync {
    fn send(&self, message: &ContactMessage) -> Result<(), MailError>;
}

/// STARTTLS submission relay that logs in as the sender's own account with
/// the configured app password.
pub struct SmtpRelay {
    host: String,
    port: u16,
    app_password: String,
}

impl SmtpRelay {
    pub fn from_config(config: &MailConfig) -> Self {
        Self {
            host: config.smtp_host.clone(),
            port: config.smtp_port,
            app_password: config.app_password.clone(),
        }
    }

    fn build_message(message: &ContactMessage) -> Result<Message, MailError> {
        let from: Mailbox = message.from.parse()?;
        let to: Mailbox = message.to.parse()?;
        Ok(Message::builder()
            .from(from)
            .to(to)
            .subject(message.subject.as_str())
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())?)
    }
}

impl MailRelay for SmtpRelay {
    fn send(&self, message: &ContactMessage) -> Result<(), MailError> {
        if message.to.is_empty() {
            return Err(MailError::NotConfigured("no recipient address"));
        }
        if self.app_password.is_empty() {
            return Err(MailError::NotConfigured("no app password"));
        }

        let email = Self::build_message(message)?;
        let credentials = Credentials::new(message.from.clone(), self.app_password.clone());

        // Unpooled: the connection is opened for this send and closed when
        // `transport` goes out of scope, whether or not the send succeeded.
        let transport = SmtpTransport::starttls_relay(&self.host)?
            .port(self.port)
            .credentials(credentials)
            .build();
        let response = transport.send(&email)?;

        log::debug!("SMTP relay accepted message: {:?}", response.code());
        Ok(())
    }
}
