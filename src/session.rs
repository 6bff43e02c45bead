//! Temporary resources of one run invocation.
//!
//! A [`RunSession`] owns the extraction root and, in self-extraction mode,
//! the temporary copy of the located archive. Both are removed by
//! [`RunSession::close`], or by `Drop` when an error unwinds the run early.

use crate::config::RunConfig;
use crate::error::Result;
use crate::launcher;
use fatbin_pack::{ArchiveManifest, Extractor, PackError};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use tempfile::{NamedTempFile, TempDir};

/// Prefix of temporary extraction roots.
pub const ROOT_PREFIX: &str = "fatbin";

/// Archive stream of a run input.
pub(crate) enum ArchiveInput {
    /// The input is a bare archive.
    Plain(File),
    /// Copy of the archive embedded in a self-extracting binary.
    Embedded(NamedTempFile),
}

impl ArchiveInput {
    /// Open `config.archive`, locating the embedded archive when the input
    /// does not start like a bare one.
    pub(crate) fn open(config: &RunConfig) -> Result<Self> {
        let archive = config.archive();
        if !fatbin_pack::is_plain_archive(archive)? {
            match fatbin_pack::locate(archive, config.temp_dir()) {
                Ok(copy) => {
                    tracing::debug!(archive = %archive.display(), "found embedded archive");
                    return Ok(ArchiveInput::Embedded(copy));
                }
                Err(PackError::NoEmbeddedArchive(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }

        tracing::debug!(archive = %archive.display(), "reading plain archive");
        let file = File::open(archive).map_err(|e| PackError::FileReadFailure {
            path: archive.to_path_buf(),
            source: e,
        })?;
        Ok(ArchiveInput::Plain(file))
    }
}

/// An extracted archive ready to launch.
pub struct RunSession {
    root: Option<TempDir>,
    archive_copy: Option<NamedTempFile>,
    manifest: ArchiveManifest,
}

impl RunSession {
    /// Extract `config.archive` into a fresh temporary root.
    ///
    /// The input may be a plain archive or a self-extracting binary.
    pub fn open(config: &RunConfig) -> Result<Self> {
        match ArchiveInput::open(config)? {
            ArchiveInput::Plain(file) => Self::extract_from(file, None, &config.temp_dir()),
            ArchiveInput::Embedded(copy) => Self::from_located(copy, config),
        }
    }

    /// Extract an archive copy produced by [`fatbin_pack::locate`].
    ///
    /// The copy is owned by the session from here on.
    pub fn from_located(archive_copy: NamedTempFile, config: &RunConfig) -> Result<Self> {
        let file = archive_copy.reopen()?;
        Self::extract_from(file, Some(archive_copy), &config.temp_dir())
    }

    fn extract_from(
        archive: File,
        archive_copy: Option<NamedTempFile>,
        temp_dir: &Path,
    ) -> Result<Self> {
        let root = tempfile::Builder::new()
            .prefix(ROOT_PREFIX)
            .tempdir_in(temp_dir)?;

        // Owns both resources before the first fallible decode step.
        let mut session = Self {
            root: Some(root),
            archive_copy,
            manifest: ArchiveManifest::new(String::new(), Default::default()),
        };
        session.manifest = Extractor::new(session.root())?.extract(BufReader::new(archive))?;
        Ok(session)
    }

    /// Extraction root.
    pub fn root(&self) -> &Path {
        match &self.root {
            Some(root) => root.path(),
            None => Path::new(""),
        }
    }

    /// Manifest of the extracted archive.
    pub fn manifest(&self) -> &ArchiveManifest {
        &self.manifest
    }

    /// Launch the entry point with `args`.
    pub fn launch(&self, args: &[std::ffi::OsString]) -> Result<ExitStatus> {
        launcher::launch(self.root(), &self.manifest, args)
    }

    /// Remove all temporary resources, reporting failures without failing.
    ///
    /// Returns the paths that could not be removed.
    pub fn close(mut self) -> Vec<PathBuf> {
        self.release()
    }

    fn release(&mut self) -> Vec<PathBuf> {
        let mut leftovers = Vec::new();

        if let Some(copy) = self.archive_copy.take() {
            let path = copy.path().to_path_buf();
            if let Err(e) = copy.close() {
                report_cleanup_failure("temporary archive", &path, &e);
                leftovers.push(path);
            }
        }

        if let Some(root) = self.root.take() {
            let path = root.path().to_path_buf();
            if let Err(e) = root.close() {
                report_cleanup_failure("temporary directory", &path, &e);
                leftovers.push(path);
            }
        }

        leftovers
    }
}

impl Drop for RunSession {
    fn drop(&mut self) {
        self.release();
    }
}

fn report_cleanup_failure(what: &str, path: &Path, error: &std::io::Error) {
    tracing::warn!(error = %error, path = %path.display(), "failed to remove {}", what);
    eprintln!("can't remove the {} {}: {}", what, path.display(), error);
}

#[cfg(test)]
mod tests {
    use super::*;
    use fatbin_pack::{Compression, Directory, Packer};
    use std::fs;

    fn build(source: &Path, output: &Path, host: Option<&Path>) {
        let tree = Directory::scan(source).unwrap();
        let mut packer = Packer::new(tree, "app")
            .unwrap()
            .with_source_root(source)
            .with_compression(Compression::Zstd(1));
        if let Some(host) = host {
            packer = packer.with_host(host);
        }
        packer.pack(output).unwrap();
    }

    fn source_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("app"), b"#!/bin/sh\nexit 0\n").unwrap();
        fs::create_dir(dir.path().join("share")).unwrap();
        fs::write(dir.path().join("share/data.txt"), b"hello").unwrap();
        dir
    }

    fn entries(dir: &Path) -> usize {
        fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn test_open_plain_archive() {
        let source = source_dir();
        let work = tempfile::tempdir().unwrap();
        let archive = work.path().join("archive.fbin");
        build(source.path(), &archive, None);

        let temp_base = tempfile::tempdir().unwrap();
        let config = RunConfig::new(&archive).with_temp_base(Some(temp_base.path().into()));
        let session = RunSession::open(&config).unwrap();

        assert_eq!(session.manifest().entry_point, "app");
        assert!(session.root().starts_with(temp_base.path()));
        let name = session.root().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with(ROOT_PREFIX));
        assert_eq!(
            fs::read(session.root().join("share/data.txt")).unwrap(),
            b"hello"
        );

        assert!(session.close().is_empty());
        assert_eq!(entries(temp_base.path()), 0);
    }

    #[test]
    fn test_open_self_extracting_binary() {
        let source = source_dir();
        let work = tempfile::tempdir().unwrap();
        let host = work.path().join("host");
        fs::write(&host, b"\x7fELF pretend host\n").unwrap();
        let binary = work.path().join("app.run");
        build(source.path(), &binary, Some(&host));

        let temp_base = tempfile::tempdir().unwrap();
        let config = RunConfig::new(&binary).with_temp_base(Some(temp_base.path().into()));
        let session = RunSession::open(&config).unwrap();

        // Extraction root plus archive copy.
        assert_eq!(entries(temp_base.path()), 2);
        assert_eq!(fs::read(session.root().join("app")).unwrap(), b"#!/bin/sh\nexit 0\n");

        drop(session);
        assert_eq!(entries(temp_base.path()), 0);
    }

    #[test]
    fn test_open_uncompressed_archive_containing_sentinel_line() {
        let source = source_dir();
        fs::write(source.path().join("notes.txt"), b"see below\n<fatbin>\nend\n").unwrap();
        let work = tempfile::tempdir().unwrap();
        let archive = work.path().join("archive.fbin");
        let tree = Directory::scan(source.path()).unwrap();
        Packer::new(tree, "app")
            .unwrap()
            .with_source_root(source.path())
            .with_compression(Compression::None)
            .pack(&archive)
            .unwrap();

        let temp_base = tempfile::tempdir().unwrap();
        let config = RunConfig::new(&archive).with_temp_base(Some(temp_base.path().into()));
        let session = RunSession::open(&config).unwrap();

        // No archive copy next to the extraction root.
        assert_eq!(entries(temp_base.path()), 1);
        assert_eq!(session.manifest().entry_point, "app");
        assert_eq!(
            fs::read(session.root().join("notes.txt")).unwrap(),
            b"see below\n<fatbin>\nend\n"
        );
        assert_eq!(crate::inspect(&config).unwrap().tree.file_count(), 3);

        drop(session);
        assert_eq!(entries(temp_base.path()), 0);
    }

    #[test]
    fn test_failed_extraction_releases_everything() {
        let work = tempfile::tempdir().unwrap();
        let archive = work.path().join("broken.fbin");
        fs::write(&archive, b"<fatbin-header>\n{\"version\":").unwrap();

        let temp_base = tempfile::tempdir().unwrap();
        let config = RunConfig::new(&archive).with_temp_base(Some(temp_base.path().into()));
        assert!(RunSession::open(&config).is_err());
        assert_eq!(entries(temp_base.path()), 0);
    }

    #[test]
    fn test_missing_archive() {
        let work = tempfile::tempdir().unwrap();
        let config = RunConfig::new(work.path().join("nope"));
        let result = RunSession::open(&config);
        assert!(matches!(
            result,
            Err(crate::Error::Pack(PackError::FileReadFailure { .. }))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_launch_from_session() {
        let source = source_dir();
        fs::write(
            source.path().join("app"),
            b"#!/bin/sh\ntest \"$(cat share/data.txt)\" = hello || exit 3\nexit \"$1\"\n",
        )
        .unwrap();
        let work = tempfile::tempdir().unwrap();
        let archive = work.path().join("archive.fbin");
        build(source.path(), &archive, None);

        let session = RunSession::open(&RunConfig::new(&archive)).unwrap();
        let status = session.launch(&[std::ffi::OsString::from("5")]).unwrap();
        assert_eq!(launcher::exit_code(status), 5);
        let root = session.root().to_path_buf();
        session.close();
        assert!(!root.exists());
    }
}
