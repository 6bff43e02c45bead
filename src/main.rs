//! fatbin CLI entry point.

use clap::{Parser, Subcommand};
use fatbin::RunConfig;
use fatbin_pack::PackError;
use tracing_subscriber::EnvFilter;

mod cli;

/// fatbin - package a directory into a single self-extracting executable
#[derive(Parser, Debug)]
#[command(name = "fatbin")]
#[command(about = "Package a directory into a single self-extracting executable")]
#[command(
    long_about = "fatbin packs a directory tree into one archive and runs it again.\n\n\
By default the archive is appended to a copy of fatbin itself, producing a \
binary that extracts into a temporary directory and runs the packaged \
program when started.\n\n\
Quick start:\n  \
fatbin build dist --exe app -o app.run\n  \
./app.run --some-flag\n\n\
Bare archives:\n  \
fatbin build dist --exe app --plain -o app.fbin\n  \
fatbin run app.fbin -- --some-flag"
)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Package a directory into an archive or self-extracting binary
    Build(cli::build::BuildCmd),

    /// Extract and run an archive
    Run(cli::run::RunCmd),
}

fn main() {
    // Initialize logging based on RUST_LOG or default to warn
    init_logging();

    // A binary produced by `fatbin build` forwards everything to its payload.
    detect_packed_binary();

    let cli = Cli::parse();
    tracing::debug!(version = fatbin::VERSION, "starting fatbin");

    let result = match cli.command {
        Commands::Build(cmd) => cmd.run().map(|()| 0),
        Commands::Run(cmd) => cmd.run(),
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Switch to self-extraction mode when this executable carries an archive.
fn detect_packed_binary() {
    let exe = match std::env::current_exe() {
        Ok(exe) => exe,
        Err(e) => {
            tracing::debug!(error = %e, "cannot resolve current executable");
            return;
        }
    };

    let config = RunConfig::new(&exe)
        .with_args(std::env::args_os().skip(1))
        .with_temp_base(RunConfig::temp_base_from_env());

    match fatbin_pack::locate(&exe, config.temp_dir()) {
        Ok(archive_copy) => cli::run::run_as_packed_binary(archive_copy, config),
        Err(PackError::NoEmbeddedArchive(_)) => {}
        Err(e) => tracing::debug!(error = %e, "embedded archive detection failed"),
    }
}

/// Initialize the tracing subscriber.
///
/// Logs go to stderr so the packaged program's stdout stays untouched.
fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fatbin=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
