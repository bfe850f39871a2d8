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

use std::io;
use encoding::{Encoding, DecoderTrap};
use encoding::all::WINDOWS_1252;


#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum HeaderEncoding {
    Unicode,
    Latin1
}

/// Decode raw header bytes.
///
/// `Unicode` decodes lossily, `Latin1` uses Windows-1252 (the de-facto encoding of HTTP headers).
pub fn decode_header_bytes(bytes: &[u8], encoding: HeaderEncoding) -> String {
    match encoding {
        HeaderEncoding::Unicode => String::from_utf8_lossy(bytes).into_owned(),
        HeaderEncoding::Latin1 => WINDOWS_1252.decode(bytes, DecoderTrap::Replace)
            .unwrap_or_else(|_| String::from_utf8_lossy(bytes).into_owned())
    }
}

/// Ordered HTTP header block with an optional status line.
///
/// Keys are matched case-insensitively, duplicates and insertion order are preserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderMap {
    encoding: HeaderEncoding,
    status_line: Vec<u8>,
    headers: Vec<(Vec<u8>, Vec<u8>)>,
}

impl Default for HeaderMap {
    fn default() -> Self {
        Self::new(HeaderEncoding::Latin1)
    }
}

impl HeaderMap {
    /// Create a new header map with the specified encoding.
    ///
    /// # Arguments
    ///
    /// * `encoding` - Header source encoding
    pub fn new(encoding: HeaderEncoding) -> Self {
        HeaderMap {
            encoding,
            status_line: Vec::new(),
            headers: Vec::new(),
        }
    }

    /// Parse a raw header block.
    ///
    /// Lines are separated by `LF` with an optional preceding `CR`. Parsing stops at the first
    /// empty line. Lines starting with a space or tab continue the previous header, lines
    /// without a colon are skipped.
    ///
    /// # Arguments
    ///
    /// * `block` - Raw header bytes
    /// * `has_status_line` - Whether the first line is a status line
    /// * `encoding` - Header source encoding
    pub fn parse(block: &[u8], has_status_line: bool, encoding: HeaderEncoding) -> Self {
        let mut map = HeaderMap::new(encoding);
        let mut first_line = has_status_line;

        for line in block.split(|&b| b == b'\n') {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.is_empty() {
                if first_line {
                    // Tolerate leading blank lines before the status line
                    continue;
                }
                break;
            }
            if first_line {
                map.set_status_line(line.trim_ascii());
                first_line = false;
                continue;
            }
            if line[0] == b' ' || line[0] == b'\t' {
                map.add_continuation(line.trim_ascii());
                continue;
            }
            if let Some(colon) = line.iter().position(|&b| b == b':') {
                map.append_bytes(&line[..colon], &line[colon + 1..]);
            }
        }
        map
    }

    /// Get the decoded status line.
    pub fn status_line(&self) -> String {
        self.decode(&self.status_line)
    }

    /// Get the raw status line as bytes.
    pub fn status_line_bytes(&self) -> &[u8] {
        &self.status_line
    }

    /// Set status line contents.
    pub fn set_status_line(&mut self, status_line: impl AsRef<[u8]>) {
        self.status_line = status_line.as_ref().to_vec();
    }

    fn decode(&self, byte_str: &[u8]) -> String {
        decode_header_bytes(byte_str, self.encoding)
    }

    /// Get value for (case-insensitive) header key a string.
    /// Duplicate headers are returned as a single value joined with `","`.
    pub fn get(&self, key: &str) -> Option<String> {
        Some(self.decode(&self.get_bytes(key.as_bytes())?))
    }

    /// Get value for (case-insensitive) header key as bytes.
    /// Duplicate headers are returned as a single value joined with `","`.
    pub fn get_bytes(&self, key: &[u8]) -> Option<Vec<u8>> {
        let values: Vec<&[u8]> = self.headers.iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_slice())
            .collect();
        if !values.is_empty() {
            Some(values.as_slice().join(b",".as_slice()))
        } else {
            None
        }
    }

    /// Append header as bytes without checking for existing headers with the same name.
    pub fn append_bytes(&mut self, key: &[u8], value: &[u8]) {
        self.headers.push((key.trim_ascii().to_vec(), value.trim_ascii().to_vec()));
    }

    /// Iterator of decoded keys and values in insertion order.
    pub fn items(&self) -> impl Iterator<Item = (String, String)> + use<'_> {
        self.headers
            .iter()
            .map(|(k, v)| (self.decode(k), self.decode(v)))
    }

    /// Write header block into stream.
    ///
    /// The terminating empty line is not written.
    pub fn write<W: io::Write>(&self, writer: &mut W) -> io::Result<usize> {
        let mut bytes_written = 0usize;
        if !self.status_line.is_empty() {
            writer.write_all(&self.status_line)?;
            writer.write_all(b"\r\n")?;
            bytes_written += self.status_line.len() + 2;
        }
        for (key, value) in &self.headers {
            writer.write_all(key)?;
            writer.write_all(b": ")?;
            writer.write_all(value)?;
            writer.write_all(b"\r\n")?;
            bytes_written += key.len() + value.len() + 4;
        }
        Ok(bytes_written)
    }

    fn add_continuation(&mut self, value: &[u8]) {
        // A continuation without a preceding header has nothing to continue
        if let Some(last) = self.headers.last_mut() {
            if !last.1.is_empty() {
                last.1.push(b' ');
            }
            last.1.extend_from_slice(value);
        }
    }
}
