use clap::ValueEnum;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

// Bodies are embedded at compile time
const CREDENTIALS_HTML: &str = include_str!("../templates/credentials.html");
const REMINDER_HTML: &str = include_str!("../templates/reminder.html");

pub const DEFAULT_TEMPLATE_FILE: &str = "email_template.html";

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("failed to read template {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{0} already exists. Remove it first if you want to reinitialize.")]
    AlreadyExists(String),

    #[error("failed to write template: {0}")]
    Write(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TemplateKind {
    /// Account credentials notice
    Credentials,
    /// Punctuality reminder
    Reminder,
}

impl TemplateKind {
    pub fn subject(self) -> &'static str {
        match self {
            TemplateKind::Credentials => {
                "OfficeTimer Credentials for the Internship in Knowles Training Institute"
            }
            TemplateKind::Reminder => "Important Reminder for Late Interns",
        }
    }

    pub fn default_body(self) -> &'static str {
        match self {
            TemplateKind::Credentials => CREDENTIALS_HTML,
            TemplateKind::Reminder => REMINDER_HTML,
        }
    }
}

/// Values substituted into a template for one recipient.
#[derive(Debug, Clone, Copy)]
pub struct TemplateValues<'a> {
    pub name: &'a str,
    pub username: &'a str,
    pub password: &'a str,
    pub sender_name: &'a str,
    pub sender_email: &'a str,
}

#[derive(Debug, Clone)]
pub struct EmailTemplate {
    subject: String,
    body: String,
}

impl EmailTemplate {
    pub fn new(kind: TemplateKind) -> Self {
        Self {
            subject: kind.subject().to_string(),
            body: kind.default_body().to_string(),
        }
    }

    /// Uses the subject of `kind` with a body read from `path`.
    pub fn from_file(kind: TemplateKind, path: &Path) -> Result<Self, TemplateError> {
        let body = fs::read_to_string(path).map_err(|source| TemplateError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        info!(action = "loaded", component = "template_file", file_path = ?path, "Loaded custom template");
        Ok(Self {
            subject: kind.subject().to_string(),
            body,
        })
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Fills the `{{placeholder}}` slots. Unknown placeholders are left as-is.
    pub fn render(&self, values: &TemplateValues<'_>) -> String {
        [
            ("{{name}}", values.name),
            ("{{username}}", values.username),
            ("{{password}}", values.password),
            ("{{sender_name}}", values.sender_name),
            ("{{sender_email}}", values.sender_email),
        ]
        .into_iter()
        .fold(self.body.clone(), |body, (slot, value)| {
            body.replace(slot, &escape_html(value))
        })
    }
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

pub fn init_default_template(kind: TemplateKind, path: &Path) -> Result<(), TemplateError> {
    if path.exists() {
        return Err(TemplateError::AlreadyExists(path.display().to_string()));
    }

    fs::write(path, kind.default_body())?;
    println!("Created {} with the default {:?} template", path.display(), kind);

    Ok(())
}
