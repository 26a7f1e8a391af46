//! Inbound record framing
//!
//! Splits a client byte stream into newline-terminated records without ever
//! buffering more than `MAX_RECORD_LEN` bytes of a single record. An oversized
//! record is skipped up to its newline, and a record that is not valid UTF-8
//! is reported on its own; neither ends the stream.

use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Longest inbound record accepted, terminator excluded
pub const MAX_RECORD_LEN: usize = 64 * 1024;

/// One framed inbound record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundRecord {
    /// A complete line, terminator stripped
    Line(String),
    /// A record longer than the limit; its bytes were discarded
    Oversized { len: usize },
    /// A record that is not valid UTF-8
    InvalidUtf8,
}

/// Bounded newline framing over any buffered reader
pub struct RecordReader<R> {
    reader: R,
    max_len: usize,
    pending: Vec<u8>,
    overflow: usize,
}

impl<R: AsyncBufRead + Unpin> RecordReader<R> {
    pub fn new(reader: R) -> Self {
        Self::with_max_len(reader, MAX_RECORD_LEN)
    }

    pub fn with_max_len(reader: R, max_len: usize) -> Self {
        Self {
            reader,
            max_len,
            pending: Vec::new(),
            overflow: 0,
        }
    }

    /// Read the next record; `Ok(None)` at end of stream.
    ///
    /// Partial progress is kept across calls, so dropping the future between
    /// reads loses nothing.
    pub async fn next_record(&mut self) -> io::Result<Option<InboundRecord>> {
        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                if self.overflow == 0 && self.pending.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(self.finish_record()));
            }

            let (chunk_len, consumed, complete) = match available.iter().position(|b| *b == b'\n') {
                Some(newline) => (newline, newline + 1, true),
                None => (available.len(), available.len(), false),
            };

            if self.overflow > 0 || self.pending.len() + chunk_len > self.max_len {
                self.overflow += self.pending.len() + chunk_len;
                self.pending.clear();
            } else {
                self.pending.extend_from_slice(&available[..chunk_len]);
            }
            self.reader.consume(consumed);

            if complete {
                return Ok(Some(self.finish_record()));
            }
        }
    }

    fn finish_record(&mut self) -> InboundRecord {
        if self.overflow > 0 {
            let len = std::mem::take(&mut self.overflow);
            self.pending.clear();
            return InboundRecord::Oversized { len };
        }

        let mut bytes = std::mem::take(&mut self.pending);
        if bytes.last() == Some(&b'\r') {
            bytes.pop();
        }
        match String::from_utf8(bytes) {
            Ok(line) => InboundRecord::Line(line),
            Err(_) => InboundRecord::InvalidUtf8,
        }
    }
}
