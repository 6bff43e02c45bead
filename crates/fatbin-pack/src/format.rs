//! Format definitions for fatbin archives.
//!
//! This module defines the structural tokens, the manifest header block and
//! the compression modes of an archive stream.

use serde::{Deserialize, Serialize};

use crate::tree::Directory;
use crate::{PackError, Result};

/// Current format version.
/// Version 1: payloads delimited by end tokens only
/// Version 2: payloads length-prefixed through the file header `size`
pub const FORMAT_VERSION: &str = "2";

/// Largest manifest or file header document accepted by the decoder.
pub const MAX_DOCUMENT_SIZE: usize = 16 * 1024 * 1024;

/// Frame magic of a zstd stream.
pub const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// Default zstd level for compressed archives.
pub const DEFAULT_ZSTD_LEVEL: i32 = 3;

/// Structural tokens of the archive grammar.
///
/// Each token is written as its own line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    /// Start of the manifest block.
    HeaderStart,
    /// End of the manifest block.
    HeaderEnd,
    /// Start of the file section.
    DataStart,
    /// End of the file section and of the archive.
    DataEnd,
    /// Start of a file block.
    FileStart,
    /// End of a file block.
    FileEnd,
    /// Start of a file header document.
    FileHeaderStart,
    /// End of a file header document.
    FileHeaderEnd,
    /// Start of a file payload.
    FileDataStart,
    /// End of a file payload.
    FileDataEnd,
}

impl Token {
    /// The token line, including its trailing newline.
    pub const fn as_bytes(self) -> &'static [u8] {
        match self {
            Token::HeaderStart => b"<fatbin-header>\n",
            Token::HeaderEnd => b"</fatbin-header>\n",
            Token::DataStart => b"<fatbin-data>\n",
            Token::DataEnd => b"</fatbin-data>\n",
            Token::FileStart => b"<fatbin-file>\n",
            Token::FileEnd => b"</fatbin-file>\n",
            Token::FileHeaderStart => b"<fatbin-file-header>\n",
            Token::FileHeaderEnd => b"</fatbin-file-header>\n",
            Token::FileDataStart => b"<fatbin-file-data>\n",
            Token::FileDataEnd => b"</fatbin-file-data>\n",
        }
    }

    /// Whether `line` is exactly this token.
    pub fn matches(self, line: &[u8]) -> bool {
        line == self.as_bytes()
    }

    /// All tokens, in grammar order.
    pub const ALL: [Token; 10] = [
        Token::HeaderStart,
        Token::HeaderEnd,
        Token::DataStart,
        Token::FileStart,
        Token::FileHeaderStart,
        Token::FileHeaderEnd,
        Token::FileDataStart,
        Token::FileDataEnd,
        Token::FileEnd,
        Token::DataEnd,
    ];
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bytes = self.as_bytes();
        f.write_str(&String::from_utf8_lossy(&bytes[..bytes.len() - 1]))
    }
}

/// Line written after every payload to keep the end token line-aligned.
pub const PAYLOAD_TERMINATOR: &[u8] = b"\n";

/// The sentinel line separating a host executable from its archive.
///
/// Assembled at runtime so the line never appears verbatim inside the
/// executable that embeds this crate.
pub fn sentinel() -> Vec<u8> {
    let mut line = Vec::with_capacity(9);
    line.push(b'<');
    line.extend_from_slice(std::hint::black_box("fatbin").as_bytes());
    line.push(b'>');
    line.push(b'\n');
    line
}

/// Header block of an archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveManifest {
    /// Format version.
    pub version: String,

    /// Name of the root file launched after extraction.
    #[serde(rename = "executable")]
    pub entry_point: String,

    /// Full directory tree.
    #[serde(rename = "dir")]
    pub tree: Directory,
}

impl ArchiveManifest {
    /// Create a manifest at the current format version.
    pub fn new(entry_point: impl Into<String>, tree: Directory) -> Self {
        Self {
            version: FORMAT_VERSION.to_string(),
            entry_point: entry_point.into(),
            tree,
        }
    }

    /// Serialize to a compact single-line document.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize and validate a manifest document.
    pub fn from_json(data: &[u8]) -> Result<Self> {
        let manifest: Self = serde_json::from_slice(data)
            .map_err(|e| PackError::MalformedHeaderDocument(format!("manifest: {}", e)))?;

        if manifest.version != FORMAT_VERSION {
            return Err(PackError::UnsupportedVersion(manifest.version));
        }

        if !manifest.tree.files.contains_key(&manifest.entry_point) {
            return Err(PackError::MissingEntryPoint(manifest.entry_point));
        }

        Ok(manifest)
    }
}

/// Compression applied to the archive stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Plain archive.
    None,
    /// zstd frame at the given level.
    Zstd(i32),
}

impl Default for Compression {
    fn default() -> Self {
        Compression::Zstd(DEFAULT_ZSTD_LEVEL)
    }
}

impl std::fmt::Display for Compression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Compression::None => write!(f, "none"),
            Compression::Zstd(level) => write!(f, "zstd:{}", level),
        }
    }
}

impl std::str::FromStr for Compression {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.to_lowercase();
        match s.split_once(':') {
            None if s == "none" => Ok(Compression::None),
            None if s == "zstd" => Ok(Compression::Zstd(DEFAULT_ZSTD_LEVEL)),
            Some(("zstd", level)) => level
                .parse::<i32>()
                .ok()
                .filter(|l| zstd_level_range().contains(l))
                .map(Compression::Zstd)
                .ok_or_else(|| format!("invalid zstd level: {}", level)),
            _ => Err(format!("invalid compression: {}", s)),
        }
    }
}

/// Levels accepted for zstd compression.
pub fn zstd_level_range() -> std::ops::RangeInclusive<i32> {
    1..=22
}

/// Whether a stream beginning with `prefix` is zstd-compressed.
pub fn is_zstd(prefix: &[u8]) -> bool {
    prefix.starts_with(&ZSTD_MAGIC)
}

/// Whether a stream beginning with `prefix` is a bare archive, plain or compressed.
pub fn is_archive_start(prefix: &[u8]) -> bool {
    prefix.starts_with(Token::HeaderStart.as_bytes()) || is_zstd(prefix)
}

/// Bytes needed to tell a bare archive from anything else.
pub const ARCHIVE_PREFIX_LEN: usize = Token::HeaderStart.as_bytes().len();
