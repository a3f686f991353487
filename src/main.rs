use fpbridge::bridge::protocol::{EXIT_NO_RESULT, EXIT_RESULT};
use fpbridge::bridge::{Bridge, BridgeCommand, BridgeResult};
use fpbridge::common::{Config, DataPaths, FingerprintError};
use fpbridge::core::Progress;

use anyhow::Context;
use clap::Parser;
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;

/// Runs one command against the fingerprint reader. Progress goes to
/// stderr; exactly one JSON result line goes to stdout.
#[derive(Parser)]
#[command(name = "fpbridge-helper")]
#[command(about = "Fingerprint reader helper for the fpbridge service")]
struct Cli {
    /// Enable development mode (local config and template directory)
    #[arg(long, global = true)]
    dev: bool,

    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: BridgeCommand,
}

fn main() {
    std::process::exit(run());
}

fn run() -> i32 {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("{}", e.render());
            let message = e
                .to_string()
                .lines()
                .next()
                .unwrap_or("No command specified")
                .trim_start_matches("error: ")
                .to_string();
            return emit(&BridgeResult::failure("UNKNOWN_COMMAND", message), EXIT_NO_RESULT);
        }
    };

    let paths = DataPaths::new(cli.dev);
    let config = match paths.load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            setup_logging(cli.dev, tracing::Level::INFO);
            tracing::error!("{}", e);
            return emit(&BridgeResult::from_error(&e), EXIT_NO_RESULT);
        }
    };
    setup_logging(cli.dev, config.log_level());

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| execute(&cli.command, &paths, config)));
    match outcome {
        Ok(Ok(result)) => emit(&result, EXIT_RESULT),
        Ok(Err(e)) => {
            tracing::error!("{:#}", e);
            let code = e
                .downcast_ref::<FingerprintError>()
                .map(FingerprintError::code)
                .unwrap_or("INTERNAL_ERROR");
            emit(&BridgeResult::failure(code, format!("{:#}", e)), EXIT_NO_RESULT)
        }
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            emit(
                &BridgeResult::failure("INTERNAL_ERROR", format!("Fatal error: {}", reason)),
                EXIT_NO_RESULT,
            )
        }
    }
}

fn execute(command: &BridgeCommand, paths: &DataPaths, config: Config) -> anyhow::Result<BridgeResult> {
    let templates_dir = paths
        .ensure_templates_dir(&config)
        .context("Failed to prepare template directory")?;
    let bridge = Bridge::with_hardware(config, templates_dir)
        .context("Failed to open template store")?;

    Ok(bridge.execute(command, &print_progress))
}

fn print_progress(progress: &Progress) {
    eprintln!("{}", progress);
}

/// Writes the single result line. The reader guard has already been
/// dropped by the time this runs.
fn emit(result: &BridgeResult, code: i32) -> i32 {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let _ = writeln!(out, "{}", result.to_line());
    let _ = out.flush();
    code
}

fn setup_logging(dev_mode: bool, level: tracing::Level) {
    if dev_mode {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_max_level(tracing::Level::DEBUG)
            .with_file(true)
            .with_line_number(true)
            .with_thread_ids(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_max_level(level)
            .init();
    }
}
