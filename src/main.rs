//! cad-to-pvs: single-shot CAD to PVS translation
//!
//! Usage: `cad-to-pvs <input-file> <output-file>`. The outcome of the job is
//! written to the output file; the process exits 0 whenever it got that far.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt};

use pvs_translator::{ConversionProcessor, Settings, StatusFile};

/// Command line.
#[derive(Debug, Parser)]
#[command(name = "cad-to-pvs", version, about = "Convert a CAD document to PVS")]
struct Cli {
    /// Control file describing the job.
    input_file: PathBuf,
    /// Status file receiving `0 <result>` or `1 <message>`.
    output_file: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let status = StatusFile::new(&cli.output_file);

    let settings = match load_configuration() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to load configuration: {:#}", e);
            return report_failure(&status, &format!("{:#}", e)).await;
        }
    };

    init_logging(&settings);

    if let Err(e) = run(settings, &cli, &status).await {
        tracing::error!("Translation error: {:#}", e);
        return report_failure(&status, &format!("{:#}", e)).await;
    }

    ExitCode::SUCCESS
}

/// Load configuration from file and environment
fn load_configuration() -> anyhow::Result<Settings> {
    let config_path = Settings::default_config_file();
    Settings::load(config_path.as_deref()).context("Config load error")
}

/// Initialize tracing/logging
fn init_logging(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.effective_log_level()));

    match settings.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_writer(std::io::stderr)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

/// Run one job
async fn run(settings: Settings, cli: &Cli, status: &StatusFile) -> anyhow::Result<()> {
    tracing::info!(
        input = %cli.input_file.display(),
        output = %cli.output_file.display(),
        "Starting cad-to-pvs v{}",
        env!("CARGO_PKG_VERSION")
    );

    let processor = ConversionProcessor::new(settings);
    let outcome = processor.execute_job(&cli.input_file, status).await?;

    tracing::info!(success = outcome.is_success(), "Translation complete");
    Ok(())
}

/// Write `1 <message>` to the status file; exit non-zero only if even that fails.
async fn report_failure(status: &StatusFile, message: &str) -> ExitCode {
    match status.write_failure(message).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "Failed to write status file {}: {}",
                status.path().display(),
                e
            );
            ExitCode::FAILURE
        }
    }
}
