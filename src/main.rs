//! Transferbar CLI - concurrent transfers with live progress
//!
//! Uploads files into a store directory or downloads them back, one
//! progress line per file.

use clap::Parser;
use serde::Serialize;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use transferbar::config::{CliArgs, Commands, TransferArgs, TransferOptions, ViewConfig};
use transferbar::error::{IoResultExt, Result, TransferError};
use transferbar::fs::{expand_inputs, sort_inputs, InputFile};
use transferbar::progress::{ProgressView, ViewSummary};
use transferbar::transfer::{run_transfers, TransferJob, TransferOutcome};
use tracing_subscriber::EnvFilter;

fn main() {
    // Parse CLI arguments
    let args = CliArgs::parse();

    init_logging(&args);

    match run(&args) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn init_logging(args: &CliArgs) {
    let default_level = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if args.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Returns whether every transfer succeeded
fn run(args: &CliArgs) -> Result<bool> {
    let (jobs, transfer) = match &args.command {
        Commands::Upload { paths, to, transfer } => (plan_upload(paths, to, transfer)?, transfer),
        Commands::Download {
            names,
            from,
            output,
            transfer,
        } => (plan_download(names, from, output, transfer)?, transfer),
    };
    let options = TransferOptions::from_cli(transfer, args.quiet);

    tracing::info!(count = jobs.len(), "starting transfers");

    let view = ProgressView::new(ViewConfig {
        hidden: args.quiet || args.json,
        ..Default::default()
    })?;
    let results = run_transfers(&jobs, &view, &options)?;
    let summary = view.join();

    report(args, &jobs, &results, &summary)?;

    Ok(results.iter().all(|r| r.is_ok()))
}

fn plan_upload(
    paths: &[PathBuf],
    store: &Path,
    transfer: &TransferArgs,
) -> Result<Vec<TransferJob>> {
    let mut inputs = expand_inputs(paths)?;
    if inputs.is_empty() {
        return Err(TransferError::NoInputs);
    }
    sort_inputs(&mut inputs, transfer.order, transfer.reverse);

    std::fs::create_dir_all(store).with_path(store)?;

    Ok(inputs.iter().map(|input| TransferJob::upload(input, store)).collect())
}

fn plan_download(
    names: &[String],
    store: &Path,
    output: &str,
    transfer: &TransferArgs,
) -> Result<Vec<TransferJob>> {
    let output_is_dir =
        output.ends_with('/') || output.ends_with(MAIN_SEPARATOR) || Path::new(output).is_dir();
    if names.len() > 1 && !output_is_dir {
        return Err(TransferError::config(format!(
            "'{}' is not a directory; several files can't be written to one path",
            output
        )));
    }

    let mut inputs = Vec::with_capacity(names.len());
    for name in names {
        let path = store.join(name);
        if !path.is_file() {
            return Err(TransferError::NotFound(path));
        }
        // Keep the store name, sub-directories included
        let mut input = InputFile::from_path(&path)?;
        input.name = name.clone();
        inputs.push(input);
    }
    sort_inputs(&mut inputs, transfer.order, transfer.reverse);

    Ok(inputs.iter().map(|input| TransferJob::download(input, output)).collect())
}

#[derive(Serialize)]
struct Report<'a> {
    summary: &'a ViewSummary,
    transfers: Vec<&'a TransferOutcome>,
    failures: Vec<Failure<'a>>,
}

#[derive(Serialize)]
struct Failure<'a> {
    name: &'a str,
    error: String,
}

fn report(
    args: &CliArgs,
    jobs: &[TransferJob],
    results: &[Result<TransferOutcome>],
    summary: &ViewSummary,
) -> Result<()> {
    let failures: Vec<Failure<'_>> = jobs
        .iter()
        .zip(results)
        .filter_map(|(job, result)| {
            result.as_ref().err().map(|e| Failure {
                name: &job.name,
                error: e.to_string(),
            })
        })
        .collect();

    if args.json {
        let report = Report {
            summary,
            transfers: results.iter().filter_map(|r| r.as_ref().ok()).collect(),
            failures,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for failure in &failures {
        eprintln!("Error: {}", failure.error);
    }

    if !args.quiet {
        println!("{}", summary.summary_line());
    }

    Ok(())
}
