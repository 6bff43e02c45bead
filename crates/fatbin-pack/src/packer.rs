//! Archive builder for assembling archives and self-extracting binaries.
//!
//! This module handles encoding a scanned tree into an archive stream,
//! optional zstd compression, and splicing the result after a copy of a
//! host executable.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::codec::Encoder;
use crate::format::{sentinel, ArchiveManifest, Compression};
use crate::tree::{Directory, FileEntry};
use crate::{PackError, Result};

/// Archive builder.
pub struct Packer {
    manifest: ArchiveManifest,
    source_root: PathBuf,
    compression: Compression,
    host: Option<PathBuf>,
}

impl Packer {
    /// Create a packer for `tree`, launching `entry_point` after extraction.
    ///
    /// The entry point must be a file of the root directory.
    pub fn new(tree: Directory, entry_point: impl Into<String>) -> Result<Self> {
        let entry_point = entry_point.into();
        if !tree.files.contains_key(&entry_point) {
            return Err(PackError::MissingEntryPoint(entry_point));
        }

        Ok(Self {
            manifest: ArchiveManifest::new(entry_point, tree),
            source_root: PathBuf::from("."),
            compression: Compression::default(),
            host: None,
        })
    }

    /// Set the directory the tree was scanned from.
    pub fn with_source_root(mut self, root: impl AsRef<Path>) -> Self {
        self.source_root = root.as_ref().to_path_buf();
        self
    }

    /// Set the compression of the archive stream.
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Prepend a copy of `host` to the output, producing a self-extracting binary.
    pub fn with_host(mut self, host: impl AsRef<Path>) -> Self {
        self.host = Some(host.as_ref().to_path_buf());
        self
    }

    /// Get the manifest that will be written.
    pub fn manifest(&self) -> &ArchiveManifest {
        &self.manifest
    }

    /// Encode the archive (compressed if configured) into `writer`.
    pub fn write_archive<W: Write>(&self, writer: W) -> Result<ArchiveStats> {
        let mut counter = ChecksumWriter::new(writer);

        match self.compression {
            Compression::None => self.encode(&mut counter)?,
            Compression::Zstd(level) => {
                let mut encoder = zstd::stream::write::Encoder::new(&mut counter, level)?;
                self.encode(&mut encoder)?;
                encoder.finish()?;
            }
        }
        counter.flush()?;

        Ok(ArchiveStats {
            size: counter.written,
            checksum: counter.hasher.finalize(),
        })
    }

    fn encode<W: Write>(&self, writer: W) -> Result<()> {
        let mut encoder = Encoder::new(writer);
        encoder.write_header(&self.manifest)?;

        for entry in self.manifest.tree.walk_files() {
            let path = self.source_root.join(&entry.name);
            let read_failure = |e: io::Error| PackError::FileReadFailure {
                path: path.clone(),
                source: e,
            };

            let file = File::open(&path).map_err(read_failure)?;
            let size = file.metadata().map_err(read_failure)?.len();
            let header = FileEntry {
                size,
                ..entry.clone()
            };

            encoder
                .write_file(&header, BufReader::new(file))
                .map_err(|e| match e {
                    PackError::FileReadFailure { source, .. } => read_failure(source),
                    other => other,
                })?;
            tracing::debug!(entry = %entry.name, size, "packed file");
        }

        encoder.finish()?;
        Ok(())
    }

    /// Write the output file.
    ///
    /// With a host the output is `host bytes + "\n" + sentinel line +
    /// archive`, made executable; without one it is the bare archive. The
    /// output is staged in a temporary file next to `output` and only moved
    /// into place once complete.
    pub fn pack(&self, output: impl AsRef<Path>) -> Result<PackedInfo> {
        let output = output.as_ref();
        let parent = match output.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut staged = tempfile::Builder::new()
            .prefix(".fatbin-")
            .tempfile_in(parent)?;

        // 1. Copy host executable (no modifications)
        let mut host_size = 0;
        let mut separator_size = 0;
        if let Some(host) = &self.host {
            let mut host_file = File::open(host).map_err(|e| PackError::FileReadFailure {
                path: host.clone(),
                source: e,
            })?;
            host_size = io::copy(&mut host_file, staged.as_file_mut())?;

            // 2. Separator on its own line
            let mut separator = b"\n".to_vec();
            separator.extend_from_slice(&sentinel());
            staged.write_all(&separator)?;
            separator_size = separator.len() as u64;
        }

        // 3. Archive
        let stats = self.write_archive(BufWriter::new(staged.as_file_mut()))?;
        staged.as_file().sync_all()?;

        #[cfg(unix)]
        if self.host.is_some() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(staged.path(), fs::Permissions::from_mode(0o755))?;
        }

        staged.persist(output).map_err(|e| PackError::Io(e.error))?;

        let info = PackedInfo {
            host_size,
            archive_size: stats.size,
            total_size: host_size + separator_size + stats.size,
            checksum: stats.checksum,
            files: self.manifest.tree.file_count(),
        };
        tracing::info!(
            output = %output.display(),
            files = info.files,
            total_size = info.total_size,
            compression = %self.compression,
            "archive written"
        );
        Ok(info)
    }
}

/// Size and checksum of an encoded archive stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveStats {
    /// Bytes written (after compression).
    pub size: u64,
    /// CRC32 of the bytes written.
    pub checksum: u32,
}

/// Information about a packed output file.
#[derive(Debug, Clone)]
pub struct PackedInfo {
    /// Size of the host executable copy (0 for a bare archive).
    pub host_size: u64,
    /// Size of the archive stream.
    pub archive_size: u64,
    /// Total output size.
    pub total_size: u64,
    /// CRC32 of the archive stream.
    pub checksum: u32,
    /// Number of files packed.
    pub files: usize,
}

/// Writer that counts and checksums everything passing through.
struct ChecksumWriter<W> {
    inner: W,
    hasher: crc32fast::Hasher,
    written: u64,
}

impl<W: Write> ChecksumWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: crc32fast::Hasher::new(),
            written: 0,
        }
    }
}

impl<W: Write> Write for ChecksumWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{extract, read_manifest};
    use crate::format::{is_zstd, Token};
    use crate::locate::locate_payload;

    fn source_tree() -> tempfile::TempDir {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("app"), b"#!/bin/sh\nexit 0\n").unwrap();
        fs::write(temp_dir.path().join("data.txt"), b"hello").unwrap();
        fs::create_dir(temp_dir.path().join("conf")).unwrap();
        fs::write(temp_dir.path().join("conf/app.toml"), b"x = 1\n").unwrap();
        temp_dir
    }

    fn packer(source: &Path) -> Packer {
        Packer::new(Directory::scan(source).unwrap(), "app")
            .unwrap()
            .with_source_root(source)
    }

    #[test]
    fn test_missing_entry_point() {
        let source = source_tree();
        let tree = Directory::scan(source.path()).unwrap();

        let result = Packer::new(tree.clone(), "nope");
        assert!(matches!(result, Err(PackError::MissingEntryPoint(name)) if name == "nope"));

        // Files below the root do not qualify.
        let result = Packer::new(tree, "conf/app.toml");
        assert!(matches!(result, Err(PackError::MissingEntryPoint(_))));
    }

    #[test]
    fn test_missing_source_file() {
        let source = source_tree();
        let packer = packer(source.path()).with_compression(Compression::None);
        fs::remove_file(source.path().join("data.txt")).unwrap();

        let err = packer.write_archive(io::sink()).unwrap_err();
        match err {
            PackError::FileReadFailure { path, .. } => {
                assert_eq!(path, source.path().join("data.txt"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_write_archive_stats() {
        let source = source_tree();
        for compression in [Compression::None, Compression::Zstd(5)] {
            let mut bytes = Vec::new();
            let stats = packer(source.path())
                .with_compression(compression)
                .write_archive(&mut bytes)
                .unwrap();

            assert_eq!(stats.size, bytes.len() as u64);
            assert_eq!(stats.checksum, crc32fast::hash(&bytes));
            assert_eq!(is_zstd(&bytes), compression != Compression::None);
        }
    }

    #[test]
    fn test_manifest_sizes_refreshed_in_file_headers() {
        let source = source_tree();
        let packer = packer(source.path()).with_compression(Compression::None);
        // Content changes between scan and pack.
        fs::write(source.path().join("data.txt"), b"hello, longer now").unwrap();

        let mut bytes = Vec::new();
        packer.write_archive(&mut bytes).unwrap();

        let dest = tempfile::tempdir().unwrap();
        extract(&bytes[..], dest.path()).unwrap();
        assert_eq!(
            fs::read(dest.path().join("data.txt")).unwrap(),
            b"hello, longer now"
        );
    }

    #[test]
    fn test_pack_plain_archive() {
        let source = source_tree();
        let out_dir = tempfile::tempdir().unwrap();
        let output = out_dir.path().join("archive.fbin");

        let info = packer(source.path())
            .with_compression(Compression::None)
            .pack(&output)
            .unwrap();

        let bytes = fs::read(&output).unwrap();
        assert!(bytes.starts_with(Token::HeaderStart.as_bytes()));
        assert_eq!(info.host_size, 0);
        assert_eq!(info.total_size, bytes.len() as u64);
        assert_eq!(info.files, 3);

        let manifest = read_manifest(&bytes[..]).unwrap();
        assert_eq!(manifest.entry_point, "app");
    }

    #[test]
    fn test_pack_self_extracting_layout() {
        let source = source_tree();
        let out_dir = tempfile::tempdir().unwrap();
        let host = out_dir.path().join("host");
        let host_bytes = b"\x7fELF host bytes\n<fatbin-data>\nmore host".to_vec();
        fs::write(&host, &host_bytes).unwrap();
        let output = out_dir.path().join("app.run");

        let info = packer(source.path()).with_host(&host).pack(&output).unwrap();

        let bytes = fs::read(&output).unwrap();
        assert!(bytes.starts_with(&host_bytes));
        let rest = &bytes[host_bytes.len()..];
        assert!(rest.starts_with(b"\n<fatbin>\n"));
        assert_eq!(info.host_size, host_bytes.len() as u64);
        assert_eq!(info.total_size, bytes.len() as u64);

        let mut payload = Vec::new();
        locate_payload(&bytes[..], &mut payload).unwrap().unwrap();
        assert_eq!(payload.len() as u64, info.archive_size);
        assert_eq!(crc32fast::hash(&payload), info.checksum);

        let dest = tempfile::tempdir().unwrap();
        let manifest = extract(&payload[..], dest.path()).unwrap();
        assert_eq!(manifest.entry_point, "app");
        assert_eq!(fs::read(dest.path().join("conf/app.toml")).unwrap(), b"x = 1\n");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&output).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }

    #[test]
    fn test_failed_pack_leaves_no_output() {
        let source = source_tree();
        let out_dir = tempfile::tempdir().unwrap();
        let output = out_dir.path().join("archive.fbin");

        let packer = packer(source.path());
        fs::remove_file(source.path().join("conf/app.toml")).unwrap();

        assert!(packer.pack(&output).is_err());
        assert!(!output.exists());
        assert_eq!(fs::read_dir(out_dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_missing_host() {
        let source = source_tree();
        let out_dir = tempfile::tempdir().unwrap();

        let result = packer(source.path())
            .with_host(out_dir.path().join("no-such-host"))
            .pack(out_dir.path().join("out"));
        assert!(matches!(result, Err(PackError::FileReadFailure { .. })));
    }
}
