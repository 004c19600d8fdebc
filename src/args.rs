use clap::Parser;
use std::path::PathBuf;

use crate::template::TemplateKind;

#[derive(Parser, Debug)]
#[command(
    name = "batchmail",
    about = "Validate a recipient list and send personalized notices to every valid address",
    version,
    long_about = None
)]
pub struct Args {
    /// Recipient file (.csv, .xlsx, .xlsm, .xls or .ods); prompted for when omitted
    #[arg(conflicts_with = "email")]
    pub file: Option<PathBuf>,

    /// Which notice to send
    #[arg(short, long, value_enum, default_value = "credentials")]
    pub template: TemplateKind,

    /// HTML file to use as the message body instead of the built-in one
    #[arg(long)]
    pub template_file: Option<PathBuf>,

    /// Initial password placed in credentials notices
    #[arg(long, default_value = "welcome1#")]
    pub password: String,

    /// Send to a single recipient with this name
    #[arg(long, requires = "email")]
    pub name: Option<String>,

    /// Send to a single recipient with this address
    #[arg(long)]
    pub email: Option<String>,

    /// Treat the first row of the file as a header
    #[arg(long)]
    pub header: bool,

    /// Maximum number of concurrent sends (default: 32)
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Validate and show the recipient table without sending anything
    #[arg(long)]
    pub dry_run: bool,

    /// Proceed past invalid or duplicate rows without asking
    #[arg(short, long)]
    pub yes: bool,

    /// Print the final report as JSON
    #[arg(long)]
    pub json: bool,

    /// Mask email addresses in console output
    #[arg(long)]
    pub redact: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Write the selected built-in template to email_template.html
    #[arg(long)]
    pub init: bool,
}
