//! Wire codec: line framing, dot-stuffing, GZIP multi-line framing
//!
//! Commands arrive CRLF-terminated; the reader accumulates bytes and emits
//! one logical line per CRLF, retaining anything after it as the next
//! command's prefix. Article payloads (after `340`) accumulate until the
//! `\r\n.\r\n` terminator, which may straddle read boundaries.
//!
//! Multi-line responses are dot-stuffed and end with `.\r\n`. When the
//! session negotiated `XFEATURE COMPRESS GZIP TERMINATOR`, the payload from
//! the line after the status line up to and including the terminator is
//! emitted as a single GZIP stream whose decompressed bytes equal the plain
//! protocol.

use std::io::{self, Write};

use flate2::Compression;
use flate2::write::GzEncoder;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::constants::buffer::READ_CHUNK;
use crate::constants::protocol::MULTILINE_TERMINATOR;

/// Result of reading one command line
#[derive(Debug, PartialEq, Eq)]
pub enum CommandRead {
    Line(String),
    /// Line exceeded the command length cap; the excess was discarded
    TooLong,
    /// Peer closed the connection
    Closed,
}

/// Result of reading an article payload
#[derive(Debug, PartialEq, Eq)]
pub enum ArticleRead {
    /// Raw payload up to (not including) the terminator, still dot-stuffed
    Payload(Vec<u8>),
    /// Article exceeded the size cap; input was drained to the terminator
    TooLarge,
    Closed,
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Byte accumulator shared by the command and article sinks
///
/// Bytes past a CRLF stay in the buffer and become the prefix of the next
/// read, so pipelined commands are not lost.
#[derive(Debug, Default)]
pub struct WireReader {
    buf: Vec<u8>,
}

impl WireReader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn fill<S: AsyncRead + Unpin>(&mut self, stream: &mut S) -> io::Result<usize> {
        let mut chunk = [0u8; READ_CHUNK];
        let n = stream.read(&mut chunk).await?;
        self.buf.extend_from_slice(&chunk[..n]);
        Ok(n)
    }

    /// Read the next CRLF-terminated command line
    pub async fn read_line<S: AsyncRead + Unpin>(
        &mut self,
        stream: &mut S,
        max_line: usize,
    ) -> io::Result<CommandRead> {
        loop {
            if let Some(pos) = find_crlf(&self.buf) {
                let rest = self.buf.split_off(pos + 2);
                let mut line = std::mem::replace(&mut self.buf, rest);
                line.truncate(pos);
                if line.len() > max_line {
                    return Ok(CommandRead::TooLong);
                }
                return Ok(CommandRead::Line(String::from_utf8_lossy(&line).into_owned()));
            }
            if self.buf.len() > max_line {
                // Discard until the offending line ends, then report it
                loop {
                    if let Some(pos) = find_crlf(&self.buf) {
                        self.buf.drain(..pos + 2);
                        return Ok(CommandRead::TooLong);
                    }
                    // Keep one byte so a CRLF split across reads still matches
                    let keep = self.buf.len().saturating_sub(1);
                    self.buf.drain(..keep);
                    if self.fill(stream).await? == 0 {
                        return Ok(CommandRead::Closed);
                    }
                }
            }
            if self.fill(stream).await? == 0 {
                return Ok(CommandRead::Closed);
            }
        }
    }

    /// Accumulate an article payload until `\r\n.\r\n`
    ///
    /// The terminator check treats the start of input as preceded by a
    /// virtual CRLF, so an immediately terminated (empty) article is the
    /// buffer starting with `.\r\n`. The cross-chunk case where one read
    /// ends in `\r\n` and the next begins `.\r\n` needs no special
    /// handling: the scan always runs over the accumulated buffer.
    pub async fn read_article<S: AsyncRead + Unpin>(
        &mut self,
        stream: &mut S,
        max_size: usize,
    ) -> io::Result<ArticleRead> {
        let mut scanned = 0usize;
        loop {
            if self.buf.starts_with(b".\r\n") {
                self.buf.drain(..3);
                return Ok(ArticleRead::Payload(Vec::new()));
            }
            if let Some(pos) = self.buf[scanned..]
                .windows(MULTILINE_TERMINATOR.len())
                .position(|w| w == MULTILINE_TERMINATOR)
            {
                let at = scanned + pos;
                let rest = self.buf.split_off(at + MULTILINE_TERMINATOR.len());
                let mut payload = std::mem::replace(&mut self.buf, rest);
                // Keep the final content CRLF, drop ".\r\n"
                payload.truncate(at + 2);
                if payload.len() > max_size {
                    return Ok(ArticleRead::TooLarge);
                }
                return Ok(ArticleRead::Payload(payload));
            }
            if self.buf.len() > max_size {
                // Drain to the terminator keeping only a window for the scan
                loop {
                    if let Some(pos) = self
                        .buf
                        .windows(MULTILINE_TERMINATOR.len())
                        .position(|w| w == MULTILINE_TERMINATOR)
                    {
                        self.buf.drain(..pos + MULTILINE_TERMINATOR.len());
                        return Ok(ArticleRead::TooLarge);
                    }
                    let keep = self.buf.len().saturating_sub(MULTILINE_TERMINATOR.len());
                    self.buf.drain(..keep);
                    if self.fill(stream).await? == 0 {
                        return Ok(ArticleRead::Closed);
                    }
                }
            }
            // Re-scan only the tail that could contain a split terminator
            scanned = self.buf.len().saturating_sub(MULTILINE_TERMINATOR.len());
            if self.fill(stream).await? == 0 {
                return Ok(ArticleRead::Closed);
            }
        }
    }
}

/// Remove dot-stuffing from a received payload
///
/// Lines whose first character is `.` arrive with an extra leading `.`;
/// strip one from each.
#[must_use]
pub fn unstuff(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len());
    let mut line_start = true;
    let mut i = 0;
    while i < payload.len() {
        if line_start && payload[i] == b'.' && payload.get(i + 1) == Some(&b'.') {
            i += 1; // drop the stuffed dot
        }
        line_start = false;
        if payload[i] == b'\n' {
            line_start = true;
        }
        out.push(payload[i]);
        i += 1;
    }
    out
}

/// Assemble a dot-stuffed multi-line payload ending with `.\r\n`
#[must_use]
pub fn encode_multiline(lines: &[String]) -> Vec<u8> {
    let mut out = Vec::with_capacity(
        lines.iter().map(|l| l.len() + 3).sum::<usize>() + MULTILINE_TERMINATOR.len(),
    );
    for line in lines {
        if line.as_bytes().first() == Some(&b'.') {
            out.push(b'.');
        }
        out.extend_from_slice(line.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b".\r\n");
    out
}

/// Compress a multi-line payload (terminator included) as one GZIP stream
pub fn gzip_frame(payload: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(
        Vec::with_capacity(payload.len() / 2 + 32),
        Compression::fast(),
    );
    encoder.write_all(payload)?;
    encoder.finish()
}
