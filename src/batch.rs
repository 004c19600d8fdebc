use anyhow::{Context, Result};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{info, warn};

use crate::config::MailConfig;
use crate::dispatch::{DispatchError, Dispatcher, SendOutcome};
use crate::mailer::{Mailer, SmtpMailer};
use crate::recipient::normalize_field;
use crate::report::{aggregate, BatchReport};
use crate::source::{FileSource, RawRow, RecordSource};
use crate::template::EmailTemplate;
use crate::utils::{clean_path, format_number, redact_email};
use crate::validate::{validate, ParseResult};
use crate::Args;

/// Dispatches the valid subset of `parse` and summarizes the outcomes.
///
/// Nothing is sent when the parse produced no recipients.
pub fn send_batch<M, P>(
    parse: &ParseResult,
    dispatcher: &Dispatcher,
    mailer: &M,
    on_complete: P,
) -> Result<BatchReport, DispatchError>
where
    M: Mailer + ?Sized,
    P: Fn(&SendOutcome) + Sync,
{
    if parse.recipients.is_empty() {
        info!(action = "skip", component = "batch", "No valid recipients, nothing to send");
        return Ok(aggregate(parse, Vec::new()));
    }

    let outcomes = dispatcher.dispatch(&parse.recipients, mailer, on_complete)?;
    Ok(aggregate(parse, outcomes))
}

pub fn run_batch(args: &Args) -> Result<BatchReport> {
    let total_start_time = Instant::now();
    info!(action = "start", component = "batch", "Starting email batch");

    // Configuration problems must stop the run before anyone is contacted
    let mailer = if args.dry_run {
        None
    } else {
        let config = MailConfig::from_env().context("Failed to load mail configuration")?;
        let template = match &args.template_file {
            Some(path) => EmailTemplate::from_file(args.template, path)?,
            None => EmailTemplate::new(args.template),
        };
        Some(SmtpMailer::new(config, template, args.password.as_str())?)
    };

    let rows = load_rows(args)?;
    let parse = validate(rows);

    if !args.json {
        print_validation_table(&parse, args.redact);
    }

    if parse.is_empty() {
        warn!(action = "complete", component = "batch", "Recipient file has no rows");
        return Ok(aggregate(&parse, Vec::new()));
    }

    let Some(mailer) = mailer else {
        info!(action = "skip", component = "batch", "Dry run, no emails sent");
        return Ok(aggregate(&parse, Vec::new()));
    };

    if parse.has_issues()
        && !parse.recipients.is_empty()
        && !args.yes
        && !confirm_continue(&parse, &mut io::stdin().lock())?
    {
        eprintln!("Batch cancelled, nothing was sent.");
        return Ok(aggregate(&parse, Vec::new()));
    }

    let total = parse.recipients.len();
    let completed = AtomicUsize::new(0);
    let quiet = args.json;
    let redact = args.redact;

    let dispatcher = Dispatcher::new(args.workers);
    let report = send_batch(&parse, &dispatcher, &mailer, |outcome| {
        let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
        if !quiet {
            print_progress(outcome, done, total, redact);
        }
    })?;

    info!(
        action = "complete",
        component = "batch",
        sent = report.sent_count,
        failed = report.failed_count,
        duration_ms = total_start_time.elapsed().as_millis(),
        "Batch completed"
    );

    Ok(report)
}

fn load_rows(args: &Args) -> Result<Vec<RawRow>> {
    if let Some(email) = &args.email {
        let name = args.name.clone().unwrap_or_default();
        return Ok(vec![vec![name, email.clone()]]);
    }

    let path = match &args.file {
        Some(path) => path.clone(),
        None => prompt_path(&mut io::stdin().lock())?,
    };

    FileSource::new()
        .with_header(args.header)
        .read_all(&path)
        .with_context(|| format!("Failed to read recipient data from {:?}", path))
}

// Prompts go to stderr; stdout carries only the report.
fn prompt_path(input: &mut impl BufRead) -> Result<PathBuf> {
    eprint!("Filepath: ");
    io::stderr().flush()?;

    let mut line = String::new();
    input
        .read_line(&mut line)
        .context("Failed to read file path")?;
    Ok(PathBuf::from(clean_path(&line)))
}

/// Asks whether to send to the valid subset. End of input counts as "no".
fn confirm_continue(parse: &ParseResult, input: &mut impl BufRead) -> Result<bool> {
    let issues = parse.validation_log.len();
    eprintln!(
        "\nThere {} {} bad email{} in the file. {} valid recipient{} will be sent to.",
        if issues == 1 { "is" } else { "are" },
        issues,
        if issues == 1 { "" } else { "s" },
        parse.recipients.len(),
        if parse.recipients.len() == 1 { "" } else { "s" },
    );
    eprint!("Press Enter to continue or type 'n' to cancel: ");
    io::stderr().flush()?;

    let mut line = String::new();
    let read = input
        .read_line(&mut line)
        .context("Failed to read confirmation")?;
    if read == 0 {
        warn!(action = "confirm", component = "batch", "No confirmation on input, pass --yes to send unattended");
        return Ok(false);
    }
    Ok(!matches!(clean_path(&line).to_lowercase().as_str(), "n" | "no"))
}

fn display_email(email: &str, redact: bool) -> String {
    if redact {
        redact_email(email)
    } else {
        email.to_string()
    }
}

pub fn print_validation_table(parse: &ParseResult, redact: bool) {
    println!("\n{:>5}  {:<25}  {:<35}  Valid", "Row", "Name", "Email");
    println!("{}", "-".repeat(80));

    for (index, fields) in parse.raw_rows.iter().enumerate() {
        let row = index + 1;
        let name = fields.first().map(|f| normalize_field(f)).unwrap_or_default();
        let email = fields.get(1).map(|f| normalize_field(f)).unwrap_or_default();
        let status = match parse.reason(row) {
            Some(reason) if redact && !email.is_empty() => {
                format!("✖ {}", reason.replace(&email, &redact_email(&email)))
            }
            Some(reason) => format!("✖ {}", reason),
            None => "✔".to_string(),
        };
        println!(
            "{:>5}  {:<25}  {:<35}  {}",
            row,
            name,
            display_email(&email, redact),
            status
        );
    }

    if parse.has_issues() {
        println!(
            "\n{} invalid, {} duplicate, {} valid",
            format_number(parse.invalid_count),
            format_number(parse.duplicate_count),
            format_number(parse.recipients.len())
        );
    } else if !parse.raw_rows.is_empty() {
        println!("\n✔ All emails are valid!");
    }
}

fn print_progress(outcome: &SendOutcome, done: usize, total: usize, redact: bool) {
    let email = display_email(&outcome.recipient.email, redact);
    match &outcome.error {
        None => println!("[{}/{}] ✔ Sent: {}", done, total, email),
        Some(error) => println!("[{}/{}] ✖ Failed: {} ({})", done, total, email, error),
    }
}

pub fn print_batch_report(report: &BatchReport, redact: bool) {
    println!("\n{}", "_".repeat(75));
    println!(
        "\nSENT: {}     FAILED: {}     INVALID: {}     DUPLICATE: {}",
        format_number(report.sent_count),
        format_number(report.failed_count),
        format_number(report.invalid_count),
        format_number(report.duplicate_count)
    );

    if report.failed_count > 0 {
        println!("\nFailed recipients:");
        for outcome in report.failures() {
            println!(
                "- {} <{}>: {}",
                outcome.recipient.name,
                display_email(&outcome.recipient.email, redact),
                outcome.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
    println!("{}", "_".repeat(75));
}
