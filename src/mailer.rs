use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use thiserror::Error;

use crate::config::AppConfig;
use crate::mail_auth::MailAuth;

#[derive(Error, Debug, PartialEq)]
pub enum MailError {
    #[error("No recipients configured")]
    NoRecipients,

    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build email: {0}")]
    Build(String),

    #[error("SMTP error: {0}")]
    Smtp(String),

    #[error("{0}")]
    Credentials(String),
}

/// Outgoing email channel.
pub trait Mailer: Send + Sync {
    fn send_html(&self, recipients: &[String], subject: &str, html: &str) -> Result<(), MailError>;
}

pub struct SmtpMailer {
    smtp_server: String,
    smtp_port: u16,
    username: String,
    password: String,
    from_email: String,
}

impl SmtpMailer {
    pub fn from_config(config: &AppConfig) -> Result<Self, MailError> {
        let password = MailAuth::resolve_password(&config.username, &config.password)
            .map_err(|e| MailError::Credentials(e.to_string()))?;

        Ok(SmtpMailer {
            smtp_server: config.smtp_server.clone(),
            smtp_port: config.smtp_port,
            username: config.username.clone(),
            password,
            from_email: config.from_email.clone(),
        })
    }

    fn transport(&self) -> Result<SmtpTransport, MailError> {
        let creds = Credentials::new(self.username.clone(), self.password.clone());
        // 465 speaks TLS from the start, everything else upgrades with STARTTLS
        let relay = if self.smtp_port == 465 {
            SmtpTransport::relay(&self.smtp_server)
        } else {
            SmtpTransport::starttls_relay(&self.smtp_server)
        };
        let builder = relay.map_err(|e| MailError::Smtp(e.to_string()))?;

        Ok(builder.port(self.smtp_port).credentials(creds).build())
    }
}

pub fn build_message(
    from: &str,
    recipients: &[String],
    subject: &str,
    html: &str,
) -> Result<Message, MailError> {
    if recipients.is_empty() {
        return Err(MailError::NoRecipients);
    }

    let parse = |address: &str| {
        address
            .parse::<Mailbox>()
            .map_err(|e| MailError::InvalidAddress {
                address: address.to_string(),
                reason: e.to_string(),
            })
    };

    let mut builder = Message::builder().from(parse(from)?).subject(subject);
    for recipient in recipients {
        builder = builder.to(parse(recipient.as_str())?);
    }

    builder
        .header(ContentType::TEXT_HTML)
        .body(html.to_string())
        .map_err(|e| MailError::Build(e.to_string()))
}

impl Mailer for SmtpMailer {
    fn send_html(&self, recipients: &[String], subject: &str, html: &str) -> Result<(), MailError> {
        let email = build_message(&self.from_email, recipients, subject, html)?;

        self.transport()?
            .send(&email)
            .map_err(|e| MailError::Smtp(e.to_string()))?;

        tracing::info!(recipients = recipients.len(), subject, "email sent");
        Ok(())
    }
}
