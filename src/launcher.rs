//! Launch the entry point of an extracted archive.

use crate::error::{Error, Result};
use fatbin_pack::ArchiveManifest;
use std::ffi::OsString;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};

/// Mode given to the entry point before it is started.
const ENTRY_POINT_MODE: u32 = 0o755;

/// Make the entry point executable, run it inside `root` and wait for it.
///
/// Standard streams are inherited. The child's exit status is returned
/// as-is; only failing to start or wait on it is an error.
pub fn launch(root: &Path, manifest: &ArchiveManifest, args: &[OsString]) -> Result<ExitStatus> {
    let program = root.join(&manifest.entry_point);
    set_executable(&program)?;

    tracing::info!(
        program = %program.display(),
        args = args.len(),
        "launching entry point"
    );

    let status = Command::new(&program)
        .args(args)
        .current_dir(root)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .map_err(|e| Error::child_process(program.display().to_string(), e.to_string()))?;

    tracing::debug!(%status, "entry point exited");
    Ok(status)
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(ENTRY_POINT_MODE))
        .map_err(|e| Error::permission_failure(path, e))
}

#[cfg(not(unix))]
fn set_executable(path: &Path) -> Result<()> {
    let _ = ENTRY_POINT_MODE;
    std::fs::metadata(path)
        .map(|_| ())
        .map_err(|e| Error::permission_failure(path, e))
}

/// Process exit code mirroring a child's exit status.
///
/// A child killed by a signal maps to `128 + signal`, like a shell does.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    1
}
