pub mod args;
pub mod batch;
pub mod config;
pub mod dispatch;
pub mod mailer;
pub mod recipient;
pub mod report;
pub mod source;
pub mod template;
pub mod utils;
pub mod validate;

pub use args::Args;
pub use batch::{run_batch, send_batch};
pub use config::MailConfig;
pub use dispatch::{Dispatcher, SendOutcome, DEFAULT_MAX_WORKERS};
pub use mailer::{MailError, Mailer, SmtpMailer};
pub use recipient::Recipient;
pub use report::{aggregate, BatchReport};
pub use source::{FileSource, RawRow, RecordSource};
pub use template::{init_default_template, EmailTemplate, TemplateKind};
pub use validate::{validate, ParseResult, RowIssue};
