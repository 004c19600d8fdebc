use anyhow::Result;
use batchmail::batch::print_batch_report;
use batchmail::template::DEFAULT_TEMPLATE_FILE;
use batchmail::utils::{setup_logging, validate_args};
use batchmail::{init_default_template, run_batch, Args};
use clap::Parser;
use std::path::Path;
use tracing::error;

fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(args.verbose);

    validate_args(&args)?;

    if args.init {
        return init_default_template(args.template, Path::new(DEFAULT_TEMPLATE_FILE))
            .map_err(Into::into);
    }

    match run_batch(&args) {
        Ok(report) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_batch_report(&report, args.redact);
            }
            if report.failed_count > 0 {
                std::process::exit(2);
            }
            Ok(())
        }
        Err(e) => {
            let message = format!("{:#}", e);
            error!(action = "abort", component = "batch", error = %message, "Batch aborted");
            eprintln!("Error: {}", message);
            std::process::exit(1);
        }
    }
}
