//! Archive codec: the encoder and the streaming decoder.
//!
//! Both halves work over the same line-oriented grammar (see the crate
//! documentation). The decoder is an explicit state machine that reads the
//! stream exactly once, in grammar order, and never resynchronizes: the
//! first unexpected line aborts the whole decode.

use std::io::{self, BufRead, Read, Write};
use std::path::PathBuf;

use crate::format::{ArchiveManifest, Token, MAX_DOCUMENT_SIZE, PAYLOAD_TERMINATOR};
use crate::tree::FileEntry;
use crate::{PackError, Result};

/// Buffer size for payload copies.
const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Longest line read while a structural token is expected.
const TOKEN_LINE_LIMIT: u64 = 256;

/// How much of an offending line is quoted in a mismatch error.
const MISMATCH_QUOTE_LIMIT: usize = 32;

/// Writes an archive stream.
pub struct Encoder<W: Write> {
    writer: W,
}

impl<W: Write> Encoder<W> {
    /// Create an encoder over `writer`.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write the manifest block and open the data section.
    pub fn write_header(&mut self, manifest: &ArchiveManifest) -> Result<()> {
        let document = manifest.to_json()?;

        self.write_token(Token::HeaderStart)?;
        self.writer.write_all(&document)?;
        self.writer.write_all(b"\n")?;
        self.write_token(Token::HeaderEnd)?;
        self.write_token(Token::DataStart)?;
        Ok(())
    }

    /// Write one file block with exactly `entry.size` bytes read from `payload`.
    ///
    /// A payload that ends early fails with [`PackError::FileReadFailure`]
    /// labelled with the entry name.
    pub fn write_file<R: Read>(&mut self, entry: &FileEntry, mut payload: R) -> Result<()> {
        let document = serde_json::to_vec(entry)?;

        self.write_token(Token::FileStart)?;
        self.write_token(Token::FileHeaderStart)?;
        self.writer.write_all(&document)?;
        self.writer.write_all(b"\n")?;
        self.write_token(Token::FileHeaderEnd)?;
        self.write_token(Token::FileDataStart)?;

        let mut buf = vec![0u8; COPY_BUFFER_SIZE];
        let mut remaining = entry.size;
        while remaining > 0 {
            let to_read = remaining.min(buf.len() as u64) as usize;
            let n = match payload.read(&mut buf[..to_read]) {
                Ok(0) => {
                    return Err(PackError::FileReadFailure {
                        path: PathBuf::from(&entry.name),
                        source: io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            format!("file shrank while packing ({} bytes missing)", remaining),
                        ),
                    })
                }
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(PackError::FileReadFailure {
                        path: PathBuf::from(&entry.name),
                        source: e,
                    })
                }
            };
            self.writer.write_all(&buf[..n])?;
            remaining -= n as u64;
        }

        self.writer.write_all(PAYLOAD_TERMINATOR)?;
        self.write_token(Token::FileDataEnd)?;
        self.write_token(Token::FileEnd)?;
        Ok(())
    }

    /// Close the data section and return the writer.
    pub fn finish(mut self) -> Result<W> {
        self.write_token(Token::DataEnd)?;
        self.writer.flush()?;
        Ok(self.writer)
    }

    fn write_token(&mut self, token: Token) -> Result<()> {
        self.writer.write_all(token.as_bytes())?;
        Ok(())
    }
}

/// Decoder state: which part of the grammar is expected next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParserState {
    /// Expecting the header start token.
    AwaitHeaderStart,
    /// Accumulating the manifest document until the header end token.
    AwaitHeaderEnd {
        /// Document bytes read so far.
        document: Vec<u8>,
    },
    /// Expecting the data start token.
    AwaitDataStart,
    /// Expecting either a file start token or the data end token.
    AwaitFileOrDataEnd,
    /// Expecting the file header start token.
    AwaitFileHeaderStart,
    /// Accumulating a file header document until the file header end token.
    AwaitFileHeaderEnd {
        /// Document bytes read so far.
        document: Vec<u8>,
    },
    /// Expecting the file data start token.
    AwaitFileDataStart {
        /// Decoded header of the current file.
        entry: FileEntry,
    },
    /// Positioned at the payload of the current file.
    AwaitFileDataEnd {
        /// Decoded header of the current file.
        entry: FileEntry,
    },
    /// Expecting the file end token.
    AwaitFileEnd,
    /// The data end token was read.
    Done,
    /// A previous transition failed; the decoder cannot continue.
    Failed,
}

/// Result of a single state transition.
enum Transition {
    Continue,
    Manifest(ArchiveManifest),
    Entry(FileEntry),
    End,
}

/// Streaming archive decoder.
///
/// ```no_run
/// # fn main() -> fatbin_pack::Result<()> {
/// use std::io::BufReader;
/// use fatbin_pack::Decoder;
///
/// let file = std::fs::File::open("archive.fbin")?;
/// let mut decoder = Decoder::new(BufReader::new(file));
/// let manifest = decoder.read_manifest()?;
/// while let Some(entry) = decoder.next_entry()? {
///     let mut out = Vec::new();
///     decoder.copy_payload(&mut out)?;
///     println!("{} ({} bytes)", entry.name, out.len());
/// }
/// # Ok(())
/// # }
/// ```
pub struct Decoder<R: BufRead> {
    reader: R,
    state: ParserState,
    line: Vec<u8>,
}

impl<R: BufRead> Decoder<R> {
    /// Create a decoder positioned at the start of an archive.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            state: ParserState::AwaitHeaderStart,
            line: Vec::new(),
        }
    }

    /// Current parser state.
    pub fn state(&self) -> &ParserState {
        &self.state
    }

    /// Decode the manifest block and consume the data start token.
    pub fn read_manifest(&mut self) -> Result<ArchiveManifest> {
        if self.state != ParserState::AwaitHeaderStart {
            return Err(usage_error("manifest was already read"));
        }

        let manifest = loop {
            if let Transition::Manifest(manifest) = self.advance()? {
                break manifest;
            }
        };

        // AwaitDataStart -> AwaitFileOrDataEnd
        self.advance()?;
        Ok(manifest)
    }

    /// Decode the next file header, positioning the decoder at its payload.
    ///
    /// Returns `None` once the data end token is read. A payload left
    /// unread by the caller is skipped.
    pub fn next_entry(&mut self) -> Result<Option<FileEntry>> {
        loop {
            match self.advance()? {
                Transition::Entry(entry) => return Ok(Some(entry)),
                Transition::End => return Ok(None),
                Transition::Manifest(_) | Transition::Continue => {}
            }
        }
    }

    /// Copy the current payload into `out` and consume the closing tokens.
    ///
    /// Failures writing to `out` are reported as
    /// [`PackError::FileWriteFailure`] labelled with the entry name.
    pub fn copy_payload<W: Write>(&mut self, out: &mut W) -> Result<u64> {
        let entry = match std::mem::replace(&mut self.state, ParserState::Failed) {
            ParserState::AwaitFileDataEnd { entry } => entry,
            other => {
                self.state = other;
                return Err(usage_error("no payload is pending"));
            }
        };

        self.read_payload(&entry, out)?;
        self.state = ParserState::AwaitFileEnd;
        Ok(entry.size)
    }

    fn advance(&mut self) -> Result<Transition> {
        // A failing transition leaves the decoder in `Failed`.
        let state = std::mem::replace(&mut self.state, ParserState::Failed);

        let (next, transition) = match state {
            ParserState::AwaitHeaderStart => {
                self.expect(Token::HeaderStart)?;
                (
                    ParserState::AwaitHeaderEnd {
                        document: Vec::new(),
                    },
                    Transition::Continue,
                )
            }
            ParserState::AwaitHeaderEnd { mut document } => {
                if self.accumulate(&mut document, Token::HeaderEnd)? {
                    let manifest = ArchiveManifest::from_json(&document)?;
                    tracing::debug!(
                        version = %manifest.version,
                        entry_point = %manifest.entry_point,
                        files = manifest.tree.file_count(),
                        "decoded manifest"
                    );
                    (ParserState::AwaitDataStart, Transition::Manifest(manifest))
                } else {
                    (ParserState::AwaitHeaderEnd { document }, Transition::Continue)
                }
            }
            ParserState::AwaitDataStart => {
                self.expect(Token::DataStart)?;
                (ParserState::AwaitFileOrDataEnd, Transition::Continue)
            }
            ParserState::AwaitFileOrDataEnd => {
                let expected = format!("{} or {}", Token::FileStart, Token::DataEnd);
                self.read_line(TOKEN_LINE_LIMIT, &expected)?;
                if Token::FileStart.matches(&self.line) {
                    (ParserState::AwaitFileHeaderStart, Transition::Continue)
                } else if Token::DataEnd.matches(&self.line) {
                    (ParserState::Done, Transition::End)
                } else {
                    return Err(mismatch(expected, &self.line));
                }
            }
            ParserState::AwaitFileHeaderStart => {
                self.expect(Token::FileHeaderStart)?;
                (
                    ParserState::AwaitFileHeaderEnd {
                        document: Vec::new(),
                    },
                    Transition::Continue,
                )
            }
            ParserState::AwaitFileHeaderEnd { mut document } => {
                if self.accumulate(&mut document, Token::FileHeaderEnd)? {
                    let entry: FileEntry = serde_json::from_slice(&document).map_err(|e| {
                        PackError::MalformedHeaderDocument(format!("file header: {}", e))
                    })?;
                    (ParserState::AwaitFileDataStart { entry }, Transition::Continue)
                } else {
                    (
                        ParserState::AwaitFileHeaderEnd { document },
                        Transition::Continue,
                    )
                }
            }
            ParserState::AwaitFileDataStart { entry } => {
                self.expect(Token::FileDataStart)?;
                (
                    ParserState::AwaitFileDataEnd {
                        entry: entry.clone(),
                    },
                    Transition::Entry(entry),
                )
            }
            ParserState::AwaitFileDataEnd { entry } => {
                tracing::debug!(entry = %entry.name, "skipping payload");
                self.read_payload(&entry, &mut io::sink())?;
                (ParserState::AwaitFileEnd, Transition::Continue)
            }
            ParserState::AwaitFileEnd => {
                self.expect(Token::FileEnd)?;
                (ParserState::AwaitFileOrDataEnd, Transition::Continue)
            }
            ParserState::Done => (ParserState::Done, Transition::End),
            ParserState::Failed => {
                return Err(usage_error("decoder is in a failed state"));
            }
        };

        self.state = next;
        Ok(transition)
    }

    /// Read exactly `entry.size` payload bytes, the terminator line and the
    /// file data end token.
    fn read_payload<W: Write>(&mut self, entry: &FileEntry, out: &mut W) -> Result<()> {
        let mut buf = vec![0u8; COPY_BUFFER_SIZE];
        let mut remaining = entry.size;
        while remaining > 0 {
            let to_read = remaining.min(buf.len() as u64) as usize;
            let n = match self.reader.read(&mut buf[..to_read]) {
                Ok(0) => {
                    return Err(PackError::TruncatedArchive {
                        expected: format!("{} more payload bytes of {}", remaining, entry.name),
                    })
                }
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            out.write_all(&buf[..n])
                .map_err(|e| PackError::FileWriteFailure {
                    path: PathBuf::from(&entry.name),
                    source: e,
                })?;
            remaining -= n as u64;
        }
        out.flush().map_err(|e| PackError::FileWriteFailure {
            path: PathBuf::from(&entry.name),
            source: e,
        })?;

        self.read_line(TOKEN_LINE_LIMIT, "payload terminator")?;
        if self.line != PAYLOAD_TERMINATOR {
            return Err(mismatch("payload terminator".to_string(), &self.line));
        }
        self.expect(Token::FileDataEnd)
    }

    /// Read one line into `document`; returns true when the line is `end`.
    fn accumulate(&mut self, document: &mut Vec<u8>, end: Token) -> Result<bool> {
        let room = (MAX_DOCUMENT_SIZE - document.len()) as u64 + 1;
        self.read_line(room.max(TOKEN_LINE_LIMIT), &end.to_string())?;

        if end.matches(&self.line) {
            // The encoder terminates each document with a newline.
            if document.last() == Some(&b'\n') {
                document.pop();
            }
            return Ok(true);
        }

        if document.len() + self.line.len() > MAX_DOCUMENT_SIZE {
            return Err(PackError::MalformedHeaderDocument(format!(
                "document exceeds {} bytes",
                MAX_DOCUMENT_SIZE
            )));
        }
        document.extend_from_slice(&self.line);
        Ok(false)
    }

    fn expect(&mut self, token: Token) -> Result<()> {
        let expected = token.to_string();
        self.read_line(TOKEN_LINE_LIMIT, &expected)?;
        if !token.matches(&self.line) {
            return Err(mismatch(expected, &self.line));
        }
        Ok(())
    }

    /// Read up to `limit` bytes of the next line into `self.line`.
    ///
    /// An empty read or a final line without newline means the stream was
    /// cut short.
    fn read_line(&mut self, limit: u64, expected: &str) -> Result<()> {
        self.line.clear();
        let n = (&mut self.reader)
            .take(limit)
            .read_until(b'\n', &mut self.line)?;

        if n == 0 || (self.line.last() != Some(&b'\n') && (n as u64) < limit) {
            return Err(PackError::TruncatedArchive {
                expected: expected.to_string(),
            });
        }
        Ok(())
    }
}

fn mismatch(expected: String, line: &[u8]) -> PackError {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    let quoted = &line[..line.len().min(MISMATCH_QUOTE_LIMIT)];
    let mut found = String::from_utf8_lossy(quoted).into_owned();
    if line.len() > MISMATCH_QUOTE_LIMIT {
        found.push_str("...");
    }
    PackError::ParseTokenMismatch { expected, found }
}

fn usage_error(reason: &'static str) -> PackError {
    PackError::InvalidState(reason)
}
