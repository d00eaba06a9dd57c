// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scriptorium: batch conversion of scanned TIFF folders.
//
// Entry point. Parses arguments, resolves the run configuration, initialises
// logging, and runs the batch pipeline with a progress bar and an interrupt
// handler.

mod progress;

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use scriptorium_batch::{CancelFlag, Pipeline, RunReport};
use scriptorium_core::RunConfig;
use scriptorium_core::config::FormatSettings;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use progress::CliProgress;

/// Conventional exit status after SIGINT.
const EXIT_INTERRUPTED: u8 = 130;

const AFTER_HELP: &str = r#"LAYOUT:
  input:   <input>/<folder>/TIFF/*.tif
  output:  <output>/<folder>/<FORMAT>/<stem>.<ext>
           <output>/<folder>/<FORMAT>/<FORMAT>.xml          aggregate METS record
           <output>/<folder>/PDF/<folder>_consolidated.pdf  or <folder>_01.pdf, ...
           <output>/logs/<run-id>.log, <run-id>.json

EXAMPLES:
  # Every configured format
  scriptorium -i /scans -o /derived

  # Only the low-resolution JPEGs and the PDFs, eight workers
  scriptorium -i /scans -o /derived --formats jpglow,pdf --workers 8

  # Show what a config file resolves to
  scriptorium --config run.json --info

EXIT STATUS:
  0    at least one folder converted (or already up to date)
  1    configuration error, or no folder succeeded
  130  interrupted; in-flight tasks finished and a partial report was written
"#;

/// Convert folders of scanned TIFFs into resized JPEGs, searchable PDFs and
/// METS preservation records.
#[derive(Parser, Debug)]
#[command(
    name = "scriptorium",
    version,
    about = "Batch-convert scanned TIFF folders into JPEG, searchable PDF and METS",
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Root directory searched for eligible folders.
    #[arg(
        short,
        long,
        env = "SCRIPTORIUM_INPUT",
        required_unless_present_any = ["list_formats", "info"]
    )]
    input: Option<PathBuf>,

    /// Root directory for converted output and run logs.
    #[arg(
        short,
        long,
        env = "SCRIPTORIUM_OUTPUT",
        required_unless_present_any = ["list_formats", "info"]
    )]
    output: Option<PathBuf>,

    /// Comma-separated subset of formats to produce (e.g. jpglow,pdf).
    #[arg(long, value_delimiter = ',')]
    formats: Vec<String>,

    /// JSON configuration file, merged onto the built-in defaults.
    #[arg(short, long, env = "SCRIPTORIUM_CONFIG")]
    config: Option<PathBuf>,

    /// Maximum number of concurrent conversion tasks.
    #[arg(short, long, env = "SCRIPTORIUM_WORKERS")]
    workers: Option<usize>,

    /// Regenerate artifacts that already exist.
    #[arg(long)]
    overwrite: bool,

    /// Directory holding the OCR detection and recognition models.
    #[arg(long, env = "SCRIPTORIUM_OCR_MODELS")]
    ocr_models: Option<PathBuf>,

    /// List the configured formats and exit.
    #[arg(long)]
    list_formats: bool,

    /// Print the resolved configuration as JSON and exit.
    #[arg(long)]
    info: bool,

    /// Disable the progress bar.
    #[arg(long)]
    no_progress: bool,

    /// Enable DEBUG-level logs.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Keep INFO library logs out of the way of the progress bar.
    let show_progress = !cli.no_progress && !cli.list_formats && !cli.info;
    let filter = if cli.verbose {
        "debug"
    } else if show_progress {
        "warn"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match run(cli, show_progress).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, show_progress: bool) -> Result<ExitCode> {
    let config = resolve_config(&cli)?;

    if cli.list_formats {
        print_formats(&config);
        return Ok(ExitCode::SUCCESS);
    }
    if cli.info {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(ExitCode::SUCCESS);
    }

    let (Some(input), Some(output)) = (cli.input, cli.output) else {
        bail!("--input and --output are required");
    };

    let pipeline = Pipeline::new(config).context("failed to prepare converters")?;

    let cancel = CancelFlag::new();
    let flag = cancel.clone();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            match interrupt(&flag) {
                Interrupt::Drain => warn!("Interrupt received, finishing in-flight tasks"),
                Interrupt::Abort => {
                    warn!("Second interrupt received, aborting");
                    std::process::exit(i32::from(EXIT_INTERRUPTED));
                }
            }
        }
    });

    let progress = Arc::new(CliProgress::new(show_progress));
    let result = pipeline
        .run(&input, &output, progress.clone(), cancel.clone())
        .await;
    progress.finish();
    let report = result.context("batch run failed")?;

    print_summary(&report);
    Ok(exit_code(&report))
}

/// Config file (or defaults) with command-line overrides applied, validated.
fn resolve_config(cli: &Cli) -> Result<RunConfig> {
    let mut config = match &cli.config {
        Some(path) => RunConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => RunConfig::default(),
    };

    if !cli.formats.is_empty() {
        config.restrict_formats(&cli.formats)?;
    }
    if let Some(workers) = cli.workers {
        config.processing.max_workers = workers;
    }
    if cli.overwrite {
        config.processing.overwrite_existing = true;
    }
    if let Some(dir) = &cli.ocr_models {
        for format in config.formats.values_mut() {
            if let FormatSettings::Searchable(settings) = &mut format.settings {
                settings.model_dir = Some(dir.clone());
            }
        }
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn print_formats(config: &RunConfig) {
    for (id, format) in &config.formats {
        let kind = format!("{:?}", format.kind()).to_lowercase();
        let state = if format.enabled { "enabled" } else { "disabled" };
        println!("{:<10} {:<11} {state}", id.as_str(), kind);
    }
}

fn print_summary(report: &RunReport) {
    let totals = &report.totals;
    info!(run_id = %report.run_id, "Run complete");
    eprintln!(
        "{} folder(s) succeeded, {} failed; {} task(s): {} ok, {} failed, {} skipped, {} cancelled",
        report.folders_succeeded(),
        report.folders_failed(),
        totals.processed,
        totals.succeeded,
        totals.failed,
        totals.skipped,
        totals.cancelled,
    );
    for folder in &report.folders {
        for failure in &folder.failures {
            eprintln!(
                "  {} {} {}: {}",
                folder.folder, failure.format, failure.file, failure.cause
            );
        }
        if let Some(err) = &folder.error {
            eprintln!("  {}: {err}", folder.folder);
        }
    }
    if report.cancelled {
        eprintln!("Interrupted: report is partial.");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    /// Stop submitting work and let in-flight tasks finish.
    Drain,
    /// Already draining. Exit without waiting.
    Abort,
}

fn interrupt(flag: &CancelFlag) -> Interrupt {
    if flag.is_cancelled() {
        Interrupt::Abort
    } else {
        flag.cancel();
        Interrupt::Drain
    }
}

fn exit_code(report: &RunReport) -> ExitCode {
    if report.cancelled {
        ExitCode::from(EXIT_INTERRUPTED)
    } else if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scriptorium_core::FormatId;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("scriptorium").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn input_and_output_required_for_a_run() {
        assert!(Cli::try_parse_from(["scriptorium", "-i", "/in"]).is_err());
        assert!(Cli::try_parse_from(["scriptorium", "--list-formats"]).is_ok());
    }

    #[test]
    fn overrides_apply_to_defaults() {
        let cli = parse(&[
            "-i", "/in", "-o", "/out", "--formats", "jpglow,PDF", "--workers", "2", "--overwrite",
            "--ocr-models", "/models",
        ]);
        let config = resolve_config(&cli).unwrap();

        let enabled: Vec<FormatId> = config.enabled_formats().into_iter().map(|(id, _)| id).collect();
        assert_eq!(enabled, vec![FormatId::new("JPGLOW"), FormatId::new("PDF")]);
        assert_eq!(config.processing.max_workers, 2);
        assert!(config.processing.overwrite_existing);
        match &config.format(&FormatId::new("PDF")).unwrap().settings {
            FormatSettings::Searchable(s) => {
                assert_eq!(s.model_dir.as_deref(), Some(std::path::Path::new("/models")))
            }
            other => panic!("unexpected settings {other:?}"),
        }
    }

    #[test]
    fn zero_workers_is_rejected() {
        let cli = parse(&["-i", "/in", "-o", "/out", "--workers", "0"]);
        assert!(resolve_config(&cli).is_err());
    }

    #[test]
    fn config_file_is_merged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        std::fs::write(&path, r#"{ "processing": { "max_workers": 7 } }"#).unwrap();

        let cli = parse(&["--info", "--config", path.to_str().unwrap()]);
        let config = resolve_config(&cli).unwrap();
        assert_eq!(config.processing.max_workers, 7);
        assert_eq!(config.formats.len(), 4);
    }

    #[test]
    fn exit_codes() {
        let mut report = RunReport::new("run_test");
        assert_eq!(exit_code(&report), ExitCode::FAILURE);
        report.cancelled = true;
        assert_eq!(exit_code(&report), ExitCode::from(EXIT_INTERRUPTED));
    }

    #[test]
    fn second_interrupt_aborts() {
        let flag = CancelFlag::new();
        assert_eq!(interrupt(&flag), Interrupt::Drain);
        assert!(flag.is_cancelled());
        assert_eq!(interrupt(&flag), Interrupt::Abort);
        assert_eq!(EXIT_INTERRUPTED, 130);
    }
}
