//! Locate the archive embedded in a self-extracting binary.
//!
//! The archive starts right after the first line that is exactly the
//! sentinel line. Lines are scanned in bounded pieces so binaries with very
//! long newline-free runs do not grow any buffer.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use crate::format::{is_archive_start, sentinel, ARCHIVE_PREFIX_LEN};
use crate::{PackError, Result};

/// Copy everything after the first sentinel line of `reader` into `out`.
///
/// Returns the number of payload bytes copied, or `None` when no sentinel
/// line exists.
pub fn locate_payload<R: BufRead, W: Write>(mut reader: R, out: &mut W) -> Result<Option<u64>> {
    let sentinel = sentinel();
    let mut piece = Vec::with_capacity(sentinel.len());

    loop {
        piece.clear();
        (&mut reader)
            .take(sentinel.len() as u64)
            .read_until(b'\n', &mut piece)?;

        if piece.is_empty() {
            return Ok(None);
        }
        if piece == sentinel {
            break;
        }
        if piece.last() != Some(&b'\n') {
            skip_line(&mut reader)?;
        }
    }

    let copied = io::copy(&mut reader, out)?;
    out.flush()?;
    Ok(Some(copied))
}

/// Consume input up to and including the next newline.
fn skip_line<R: BufRead>(reader: &mut R) -> io::Result<()> {
    loop {
        let (found, used) = {
            let buf = reader.fill_buf()?;
            if buf.is_empty() {
                return Ok(());
            }
            match buf.iter().position(|b| *b == b'\n') {
                Some(i) => (true, i + 1),
                None => (false, buf.len()),
            }
        };
        reader.consume(used);
        if found {
            return Ok(());
        }
    }
}

/// Whether the file at `path` starts like a bare archive.
///
/// Bare archives are decoded directly; only other inputs are searched for
/// a sentinel line, which payload bytes may contain as well.
pub fn is_plain_archive(path: impl AsRef<Path>) -> Result<bool> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| PackError::FileReadFailure {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut prefix = Vec::with_capacity(ARCHIVE_PREFIX_LEN);
    file.take(ARCHIVE_PREFIX_LEN as u64)
        .read_to_end(&mut prefix)
        .map_err(|e| PackError::FileReadFailure {
            path: path.to_path_buf(),
            source: e,
        })?;
    Ok(is_archive_start(&prefix))
}

/// Extract the archive embedded in `host` into a temporary file under `temp_dir`.
///
/// The returned file is rewound and removed when dropped.
pub fn locate(host: impl AsRef<Path>, temp_dir: impl AsRef<Path>) -> Result<NamedTempFile> {
    let host = host.as_ref();
    let input = File::open(host).map_err(|e| PackError::FileReadFailure {
        path: host.to_path_buf(),
        source: e,
    })?;

    let mut archive = tempfile::Builder::new()
        .prefix("fatarch")
        .tempfile_in(temp_dir)?;

    let copied = {
        let mut writer = BufWriter::new(archive.as_file_mut());
        locate_payload(BufReader::new(input), &mut writer)?
    };
    let Some(size) = copied else {
        return Err(PackError::NoEmbeddedArchive(host.to_path_buf()));
    };

    archive.as_file_mut().seek(SeekFrom::Start(0))?;
    tracing::debug!(host = %host.display(), size, "located embedded archive");
    Ok(archive)
}
