use lettre::message::header::{ContentType, Header, HeaderName, HeaderValue};
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::{Address, Message, SmtpTransport, Transport};
use std::time::Instant;
use thiserror::Error;
use tracing::debug;

use crate::config::MailConfig;
use crate::recipient::{is_valid_email, Recipient};
use crate::template::{EmailTemplate, TemplateValues};

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid recipient email: {0}")]
    InvalidRecipient(String),

    #[error("invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("failed to build message: {0}")]
    Build(#[from] lettre::error::Error),

    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// Delivers one composed message to one recipient.
pub trait Mailer: Sync {
    fn send(&self, recipient: &Recipient) -> Result<(), MailError>;
}

impl<F> Mailer for F
where
    F: Fn(&Recipient) -> Result<(), MailError> + Sync,
{
    fn send(&self, recipient: &Recipient) -> Result<(), MailError> {
        self(recipient)
    }
}

/// `Importance: high`, which most clients render as an urgent flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Importance;

impl Header for Importance {
    fn name() -> HeaderName {
        HeaderName::new_from_ascii_str("Importance")
    }

    fn parse(s: &str) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        if s.trim().eq_ignore_ascii_case("high") {
            Ok(Importance)
        } else {
            Err(format!("unsupported importance '{}'", s).into())
        }
    }

    fn display(&self) -> HeaderValue {
        HeaderValue::new(Self::name(), "high".to_string())
    }
}

/// `X-Priority: 1`, the flag Outlook and Thunderbird act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct XPriority;

impl Header for XPriority {
    fn name() -> HeaderName {
        HeaderName::new_from_ascii_str("X-Priority")
    }

    fn parse(s: &str) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        match s.split_whitespace().next() {
            Some("1") => Ok(XPriority),
            _ => Err(format!("unsupported priority '{}'", s).into()),
        }
    }

    fn display(&self) -> HeaderValue {
        HeaderValue::new(Self::name(), "1".to_string())
    }
}

pub struct SmtpMailer {
    transport: SmtpTransport,
    config: MailConfig,
    template: EmailTemplate,
    password: String,
}

impl SmtpMailer {
    /// Builds a pooled STARTTLS transport authenticated with PLAIN.
    pub fn new(
        config: MailConfig,
        template: EmailTemplate,
        password: impl Into<String>,
    ) -> Result<Self, MailError> {
        let transport = SmtpTransport::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .timeout(Some(config.timeout))
            .credentials(Credentials::new(
                config.smtp_user.clone(),
                config.smtp_pass.clone(),
            ))
            .authentication(vec![Mechanism::Plain])
            .build();

        Ok(Self {
            transport,
            config,
            template,
            password: password.into(),
        })
    }

    pub fn compose(&self, recipient: &Recipient) -> Result<Message, MailError> {
        compose_message(&self.config, &self.template, &self.password, recipient)
    }
}

impl Mailer for SmtpMailer {
    fn send(&self, recipient: &Recipient) -> Result<(), MailError> {
        let start_time = Instant::now();
        let message = self.compose(recipient)?;
        self.transport.send(&message)?;
        debug!(
            action = "sent",
            component = "smtp",
            recipient = %recipient.email,
            duration_ms = start_time.elapsed().as_millis(),
            "Relay accepted message"
        );
        Ok(())
    }
}

pub fn compose_message(
    config: &MailConfig,
    template: &EmailTemplate,
    password: &str,
    recipient: &Recipient,
) -> Result<Message, MailError> {
    if !is_valid_email(&recipient.email) {
        return Err(MailError::InvalidRecipient(recipient.email.clone()));
    }

    let body = template.render(&TemplateValues {
        name: &recipient.name,
        username: &recipient.email,
        password,
        sender_name: &config.sender.name,
        sender_email: &config.sender.email,
    });

    let mut builder = Message::builder()
        .from(mailbox(&config.sender.name, &config.sender.email)?)
        .to(mailbox(&recipient.name, &recipient.email)?)
        .subject(template.subject())
        .header(ContentType::TEXT_HTML)
        .header(Importance)
        .header(XPriority);

    if let Some(cc) = &config.cc {
        builder = builder.cc(mailbox(&cc.name, &cc.email)?);
    }

    Ok(builder.body(body)?)
}

fn mailbox(name: &str, email: &str) -> Result<Mailbox, MailError> {
    let address: Address = email.parse()?;
    let name = (!name.is_empty()).then(|| name.to_string());
    Ok(Mailbox::new(name, address))
}
