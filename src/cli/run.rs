//! `run` subcommand and the self-extraction entry point.
//!
//! This module provides two entry points:
//!
//! 1. **`RunCmd`**: the explicit `fatbin run` subcommand
//! 2. **`run_as_packed_binary()`**: self-extraction mode, called from
//!    `main()` before clap parses the normal CLI
//!
//! Both paths converge on the same extract, launch and cleanup sequence.

use crate::cli::flush_output;
use clap::Args;
use fatbin::config::TMPDIR_ENV;
use fatbin::RunConfig;
use fatbin_pack::ArchiveManifest;
use std::ffi::OsString;
use std::path::PathBuf;
use tempfile::NamedTempFile;

/// Run an archive or self-extracting binary.
///
/// Extracts the archive into a fresh temporary directory, runs its entry
/// point there with the given arguments and removes the directory again.
/// The exit code of the entry point becomes the exit code of fatbin.
///
/// Examples:
///   fatbin run app.fbin
///   fatbin run app.fbin -- --port 8080
///   fatbin run app.run --info
#[derive(Args, Debug)]
pub struct RunCmd {
    /// Archive or self-extracting binary
    #[arg(value_name = "ARCHIVE")]
    pub archive: PathBuf,

    /// Show manifest info and exit
    #[arg(long)]
    pub info: bool,

    /// Base directory for temporary extraction roots
    #[arg(long, env = TMPDIR_ENV, value_name = "DIR")]
    pub temp_dir: Option<PathBuf>,

    /// Arguments passed to the entry point
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "ARGS")]
    pub args: Vec<OsString>,
}

impl RunCmd {
    /// Execute the run command, returning the exit code to use.
    pub fn run(self) -> fatbin::Result<i32> {
        let config = RunConfig::new(&self.archive)
            .with_args(self.args)
            .with_temp_base(self.temp_dir);

        if self.info {
            let manifest = fatbin::inspect(&config)?;
            print_manifest_info(&manifest);
            return Ok(0);
        }

        flush_output();
        fatbin::run(&config)
    }
}

/// Entry point when the running executable carries an embedded archive.
///
/// Every command line argument is forwarded to the packaged program.
/// Never returns; calls `std::process::exit()`.
pub fn run_as_packed_binary(archive_copy: NamedTempFile, config: RunConfig) -> ! {
    match fatbin::run_located(archive_copy, &config) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            tracing::error!(error = %e, "packed binary failed");
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn print_manifest_info(manifest: &ArchiveManifest) {
    println!("Version:     {}", manifest.version);
    println!("Entry point: {}", manifest.entry_point);
    println!("Files:       {}", manifest.tree.file_count());
    println!("Directories: {}", manifest.tree.directory_count());
    let size: u64 = manifest.tree.walk_files().iter().map(|f| f.size).sum();
    println!("Size:        {}", crate::cli::format_size(size));
}
