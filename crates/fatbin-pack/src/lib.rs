//! Archive container format and self-extraction support for fatbin.
//!
//! This crate packages a directory tree into a single archive stream and
//! unpacks it again. The archive can be appended to a copy of a host
//! executable, producing a self-extracting binary.
//!
//! # Archive Format (Version 2)
//!
//! Every structural token occupies its own line. Documents are compact JSON
//! (always a single line); file payloads are length-prefixed through the
//! `size` field of the per-file header, so payload bytes never need to be
//! scanned for delimiters.
//!
//! ```text
//! <fatbin-header>
//! {"version":"2","executable":"app","dir":{...}}
//! </fatbin-header>
//! <fatbin-data>
//! <fatbin-file>               ┐
//! <fatbin-file-header>        │
//! {"name":"app","perm":"755","size":1234}
//! </fatbin-file-header>       │ repeated for
//! <fatbin-file-data>          │ every file
//! <size bytes of payload>\n   │
//! </fatbin-file-data>         │
//! </fatbin-file>              ┘
//! </fatbin-data>
//! ```
//!
//! The whole stream may be wrapped in a zstd frame.
//!
//! # Self-Extracting Layout
//!
//! ```text
//! +---------------------------+
//! | Host executable           |
//! +---------------------------+
//! | "\n" + sentinel line      |
//! +---------------------------+
//! | Archive (optionally zstd) |
//! +---------------------------+
//! ```

#![deny(missing_docs)]

pub mod codec;
pub mod extract;
pub mod format;
pub mod locate;
pub mod packer;
pub mod tree;

pub use codec::{Decoder, Encoder, ParserState};
pub use extract::{extract, read_manifest, Extractor};
pub use format::{ArchiveManifest, Compression, FORMAT_VERSION};
pub use locate::{is_plain_archive, locate, locate_payload};
pub use packer::{ArchiveStats, PackedInfo, Packer};
pub use tree::{Directory, FileEntry};

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during pack, extract and locate operations.
#[derive(Debug, Error)]
pub enum PackError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The entry point is not a file of the root directory.
    #[error("entry point not found in root directory: {0}")]
    MissingEntryPoint(String),

    /// A source file could not be read while building.
    #[error("file read failed: {}: {source}", path.display())]
    FileReadFailure {
        /// Path of the source file.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// An extracted file could not be written.
    #[error("file write failed: {}: {source}", path.display())]
    FileWriteFailure {
        /// Destination path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The extraction destination is empty or the filesystem root.
    #[error("unsafe extraction destination: {0:?}")]
    UnsafeDestination(PathBuf),

    /// An archive entry would be written outside the destination root.
    #[error("unsafe entry path: {0}")]
    UnsafeEntryPath(String),

    /// A structural token was expected but a different line was read.
    #[error("unexpected token: expected {expected:?}, found {found:?}")]
    ParseTokenMismatch {
        /// Token the grammar required.
        expected: String,
        /// Line actually read (truncated).
        found: String,
    },

    /// The stream ended before the data end token.
    #[error("truncated archive: expected {expected:?}, found end of stream")]
    TruncatedArchive {
        /// Token or payload the grammar required.
        expected: String,
    },

    /// The manifest or a file header document could not be decoded.
    #[error("malformed header document: {0}")]
    MalformedHeaderDocument(String),

    /// Unsupported format version.
    #[error("unsupported version: {0}")]
    UnsupportedVersion(String),

    /// No sentinel line was found in the host executable.
    #[error("no embedded archive found in {}", .0.display())]
    NoEmbeddedArchive(PathBuf),

    /// The decoder was driven out of grammar order.
    #[error("invalid decoder state: {0}")]
    InvalidState(&'static str),

    /// The path given for scanning is not a directory.
    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),
}

/// Result type for pack operations.
pub type Result<T> = std::result::Result<T, PackError>;
