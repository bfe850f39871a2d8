// Copyright 2025 Janek Bevendorff
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Sequential ARC record reader.

use std::borrow::Cow;
use std::io::{BufRead, BufReader, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

use crate::error::Result;
use crate::header::{decode_header_bytes, HeaderEncoding};
use crate::record::{ArcHeader, ArcRecord};

/// Default maximum length of an ARC header line.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 64 * 1024;

/// Shared flag for stopping readers between records.
pub type CancelFlag = Arc<AtomicBool>;


/// Per-split reader statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderStats {
    /// Records returned.
    pub records: u64,
    /// Malformed headers skipped. Unparseable lines up to the next blank line count once.
    pub parse_failures: u64,
    /// Records with truncated payload.
    pub short_reads: u64,
}


/// ARC record stream iterator.
///
/// Reads records sequentially from an uncompressed ARC stream. The reader can be limited to a
/// split of the stream: it is positioned at `start` and stops before the first record starting
/// at or after `end`. Records starting inside the split are always read completely.
///
/// Malformed header lines are skipped and the reader re-synchronizes on the next valid header
/// line. Only I/O errors of the underlying stream are returned as errors.
pub struct ArcReader<R: Read> {
    reader: BufReader<R>,
    position: u64,
    end: u64,
    max_line_length: usize,
    carry: Vec<u8>,
    resyncing: bool,
    cancel: Option<CancelFlag>,
    finished: bool,
    stats: ReaderStats,
}

impl<R: Read> ArcReader<R> {
    /// Create a reader over a complete stream.
    pub fn new(reader: R) -> Self {
        Self::with_range(reader, 0, u64::MAX)
    }

    /// Create a reader over a split of a stream.
    ///
    /// # Arguments
    ///
    /// * `reader` - Input stream, positioned at `start`
    /// * `start` - Split start offset
    /// * `end` - Split end offset (exclusive)
    pub fn with_range(reader: R, start: u64, end: u64) -> Self {
        ArcReader {
            reader: BufReader::new(reader),
            position: start,
            end,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            carry: Vec::new(),
            resyncing: false,
            cancel: None,
            finished: false,
            stats: ReaderStats::default(),
        }
    }

    /// Set the maximum header line length. Longer lines are treated as malformed.
    pub fn max_line_length(mut self, max_line_length: usize) -> Self {
        self.max_line_length = max_line_length.max(1);
        self
    }

    /// Stop reading once `flag` is set.
    pub fn cancel_on(mut self, flag: CancelFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Current logical stream offset.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn stats(&self) -> ReaderStats {
        self.stats
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    fn read_line(&mut self, line: &mut Vec<u8>) -> Result<usize> {
        line.clear();
        if let Some(i) = self.carry.iter().position(|&b| b == b'\n') {
            line.extend(self.carry.drain(..=i));
        } else {
            line.append(&mut self.carry);
            let limit = self.max_line_length.saturating_sub(line.len()) as u64;
            (&mut self.reader).take(limit).read_until(b'\n', line)?;
        }
        self.position += line.len() as u64;
        Ok(line.len())
    }

    /// Read the next record.
    ///
    /// Returns `Ok(None)` at the end of the stream or split.
    ///
    /// # Errors
    ///
    /// Only I/O failures of the underlying stream are returned as [`crate::Error::StreamFault`].
    pub fn read_next(&mut self) -> Result<Option<ArcRecord>> {
        let mut line = Vec::with_capacity(256);
        loop {
            if self.finished {
                return Ok(None);
            }
            if self.is_cancelled() {
                debug!(position = self.position, "ARC reader cancelled");
                self.finished = true;
                return Ok(None);
            }
            if self.position >= self.end {
                self.finished = true;
                return Ok(None);
            }

            let line_start = self.position;
            if self.read_line(&mut line)? == 0 {
                self.finished = true;
                return Ok(None);
            }

            let trimmed = line.strip_suffix(b"\n").unwrap_or(&line);
            let trimmed = trimmed.strip_suffix(b"\r").unwrap_or(trimmed);
            if trimmed.is_empty() {
                self.resyncing = false;
                continue;
            }
            let text = match std::str::from_utf8(trimmed) {
                Ok(s) => Cow::Borrowed(s),
                Err(_) => Cow::Owned(decode_header_bytes(trimmed, HeaderEncoding::Latin1)),
            };

            let header = match ArcHeader::parse(&text) {
                Ok(header) => header,
                Err(e) if self.resyncing => {
                    trace!(position = line_start, error = %e, "Skipping line while re-synchronizing");
                    continue;
                }
                Err(e) => {
                    debug!(position = line_start, error = %e, "Skipping malformed ARC record header");
                    self.stats.parse_failures += 1;
                    self.resyncing = true;
                    continue;
                }
            };
            self.resyncing = false;

            let mut record = ArcRecord::new();
            record.set_header(header);
            record.set_stream_pos(line_start);

            let carry = std::mem::take(&mut self.carry);
            let mut source = carry.as_slice().chain(&mut self.reader);
            self.position += record.read_payload(&mut source)? as u64;
            if record.is_short_read() {
                self.stats.short_reads += 1;
            }

            // Trailer bytes that are not line breaks already belong to the next record
            let content_len = record.declared_content_length();
            if let Some(i) = record.payload().get(content_len..)
                .and_then(|trailer| trailer.iter().position(|&b| b != b'\n' && b != b'\r')) {
                self.carry = record.split_payload_off(content_len + i);
                self.position -= self.carry.len() as u64;
            }

            self.stats.records += 1;
            return Ok(Some(record));
        }
    }
}

impl<R: Read> Iterator for ArcReader<R> {
    type Item = Result<ArcRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_next() {
            Ok(record) => record.map(Ok),
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}
