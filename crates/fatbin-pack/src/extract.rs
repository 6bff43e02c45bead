//! Archive extraction to disk.
//!
//! Decoding and writing are interleaved: the manifest is decoded first, the
//! directory skeleton is created, then every file payload is streamed from
//! the archive straight into its destination file.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Component, Path, PathBuf};

use crate::codec::Decoder;
use crate::format::{is_zstd, ArchiveManifest};
use crate::tree::Directory;
use crate::{PackError, Result};

/// Archive stream, transparently decompressed when it starts with a zstd frame.
pub enum ArchiveReader<R: BufRead> {
    /// Uncompressed archive.
    Plain(R),
    /// zstd-compressed archive.
    Zstd(BufReader<zstd::stream::read::Decoder<'static, R>>),
}

impl<R: BufRead> ArchiveReader<R> {
    /// Peek at the stream and pick the matching reader.
    pub fn open(mut reader: R) -> Result<Self> {
        let compressed = is_zstd(reader.fill_buf()?);
        if compressed {
            let decoder = zstd::stream::read::Decoder::with_buffer(reader)?;
            tracing::debug!("archive is zstd-compressed");
            Ok(ArchiveReader::Zstd(BufReader::new(decoder)))
        } else {
            Ok(ArchiveReader::Plain(reader))
        }
    }
}

impl<R: BufRead> Read for ArchiveReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            ArchiveReader::Plain(r) => r.read(buf),
            ArchiveReader::Zstd(r) => r.read(buf),
        }
    }
}

impl<R: BufRead> BufRead for ArchiveReader<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        match self {
            ArchiveReader::Plain(r) => r.fill_buf(),
            ArchiveReader::Zstd(r) => r.fill_buf(),
        }
    }

    fn consume(&mut self, amt: usize) {
        match self {
            ArchiveReader::Plain(r) => r.consume(amt),
            ArchiveReader::Zstd(r) => r.consume(amt),
        }
    }
}

/// Extracts archives into a destination root.
#[derive(Debug, Clone)]
pub struct Extractor {
    root: PathBuf,
}

impl Extractor {
    /// Create an extractor for `root`.
    ///
    /// Fails with [`PackError::UnsafeDestination`] when `root` is empty or
    /// resolves to the filesystem root.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        if root.as_os_str().is_empty() {
            return Err(PackError::UnsafeDestination(root.to_path_buf()));
        }

        let resolved = resolve_destination(root)?;
        if resolved.parent().is_none() {
            return Err(PackError::UnsafeDestination(root.to_path_buf()));
        }

        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Destination root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Extract an archive stream (plain or compressed).
    ///
    /// On failure the partially extracted files are left in place.
    pub fn extract<R: Read>(&self, reader: R) -> Result<ArchiveManifest> {
        let reader = ArchiveReader::open(BufReader::new(reader))?;
        let mut decoder = Decoder::new(reader);

        let manifest = decoder.read_manifest()?;

        fs::create_dir_all(&self.root).map_err(|e| PackError::FileWriteFailure {
            path: self.root.clone(),
            source: e,
        })?;
        self.create_directories(&manifest.tree)?;

        let mut count = 0usize;
        while let Some(entry) = decoder.next_entry()? {
            let relative = safe_relative_path(&entry.name)
                .ok_or_else(|| PackError::UnsafeEntryPath(entry.name.clone()))?;
            let path = self.root.join(relative);

            let mut file = File::create(&path).map_err(|e| PackError::FileWriteFailure {
                path: path.clone(),
                source: e,
            })?;
            decoder.copy_payload(&mut file).map_err(|e| match e {
                PackError::FileWriteFailure { source, .. } => PackError::FileWriteFailure {
                    path: path.clone(),
                    source,
                },
                other => other,
            })?;
            drop(file);

            if entry.is_executable() {
                set_executable(&path)?;
            }

            tracing::debug!(entry = %entry.name, size = entry.size, "extracted file");
            count += 1;
        }

        tracing::info!(
            root = %self.root.display(),
            files = count,
            entry_point = %manifest.entry_point,
            "archive extracted"
        );
        Ok(manifest)
    }

    /// Extract the archive stored in the file at `archive`.
    pub fn extract_file(&self, archive: impl AsRef<Path>) -> Result<ArchiveManifest> {
        let file = File::open(archive.as_ref())?;
        self.extract(file)
    }

    fn create_directories(&self, dir: &Directory) -> Result<()> {
        for sub in dir.directories.values() {
            let relative = safe_relative_path(&sub.name)
                .ok_or_else(|| PackError::UnsafeEntryPath(sub.name.clone()))?;
            let path = self.root.join(relative);
            fs::create_dir_all(&path).map_err(|e| PackError::FileWriteFailure {
                path: path.clone(),
                source: e,
            })?;
            self.create_directories(sub)?;
        }
        Ok(())
    }
}

/// Extract an archive stream into `destination`.
pub fn extract<R: Read>(reader: R, destination: impl AsRef<Path>) -> Result<ArchiveManifest> {
    Extractor::new(destination)?.extract(reader)
}

/// Decode only the manifest block of an archive stream.
pub fn read_manifest<R: Read>(reader: R) -> Result<ArchiveManifest> {
    let reader = ArchiveReader::open(BufReader::new(reader))?;
    Decoder::new(reader).read_manifest()
}

/// Resolve `path` to where it points once its missing directories exist.
///
/// Existing prefixes are canonicalized; `..` after a missing directory
/// removes that directory.
fn resolve_destination(path: &Path) -> io::Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut resolved = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            other => {
                resolved.push(other);
                if resolved.exists() {
                    resolved = resolved.canonicalize()?;
                }
            }
        }
    }
    Ok(resolved)
}

/// Convert an archive name into a relative path that stays below the root.
fn safe_relative_path(name: &str) -> Option<PathBuf> {
    let path = Path::new(name);
    let mut relative = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => relative.push(part),
            _ => return None,
        }
    }
    if relative.as_os_str().is_empty() {
        return None;
    }
    Some(relative)
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).map_err(|e| {
        PackError::FileWriteFailure {
            path: path.to_path_buf(),
            source: e,
        }
    })
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<()> {
    Ok(())
}
