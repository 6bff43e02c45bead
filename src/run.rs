//! Run an archive: extract, launch, clean up.

use crate::config::RunConfig;
use crate::error::Result;
use crate::launcher::exit_code;
use crate::session::{ArchiveInput, RunSession};
use fatbin_pack::{read_manifest, ArchiveManifest};
use std::io::BufReader;
use tempfile::NamedTempFile;

/// Run `config.archive` and return the entry point's exit code.
pub fn run(config: &RunConfig) -> Result<i32> {
    let session = RunSession::open(config)?;
    launch_and_close(session, config)
}

/// Run an archive already located inside a self-extracting binary.
pub fn run_located(archive_copy: NamedTempFile, config: &RunConfig) -> Result<i32> {
    let session = RunSession::from_located(archive_copy, config)?;
    launch_and_close(session, config)
}

fn launch_and_close(session: RunSession, config: &RunConfig) -> Result<i32> {
    // The session is dropped on the error path, which cleans up as well.
    let status = session.launch(&config.args)?;
    session.close();
    Ok(exit_code(status))
}

/// Read only the manifest of `config.archive`.
pub fn inspect(config: &RunConfig) -> Result<ArchiveManifest> {
    let manifest = match ArchiveInput::open(config)? {
        ArchiveInput::Plain(file) => read_manifest(BufReader::new(file))?,
        ArchiveInput::Embedded(copy) => read_manifest(BufReader::new(copy))?,
    };
    Ok(manifest)
}
