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

use std::fmt;
use std::io::Read;
use std::str::FromStr;
use std::sync::OnceLock;
use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::header::HeaderMap;
use crate::http::{self, HttpResponse};

/// Number of bytes read beyond the declared content length of a record.
///
/// ARC files in the wild carry three trailing bytes after each record body.
pub const ARC_TRAILER_SLACK: usize = 3;

const ARC_DATE_FORMAT: &str = "%Y%m%d%H%M%S";

// Upper bound for up-front payload allocation, larger payloads grow while reading
const MAX_PREALLOC: usize = 1 << 20;


/// Parse a 14-digit `yyyyMMddHHmmss` archive date (UTC).
pub fn parse_archive_date(token: &str) -> Result<DateTime<Utc>> {
    if token.len() != 14 || !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::InvalidDate(token.to_string()));
    }
    NaiveDateTime::parse_from_str(token, ARC_DATE_FORMAT)
        .map(|d| d.and_utc())
        .map_err(|_| Error::InvalidDate(token.to_string()))
}

/// Format an archive date as `yyyyMMddHHmmss`.
pub fn format_archive_date(date: &DateTime<Utc>) -> String {
    date.format(ARC_DATE_FORMAT).to_string()
}


/// ARC v1 record header line.
///
/// The line consists of exactly five fields separated by a single space:
/// `URL IP_ADDRESS ARCHIVE_DATE CONTENT_TYPE CONTENT_LENGTH`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArcHeader {
    pub url: String,
    pub ip_address: String,
    pub archive_date: DateTime<Utc>,
    pub content_type: String,
    pub content_length: usize,
}

impl ArcHeader {
    /// Parse a header line.
    ///
    /// A terminating `LF` or `CRLF` is ignored.
    ///
    /// # Arguments
    ///
    /// * `line` - ARC record header line
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return Err(Error::MalformedHeader("header line is empty".to_string()));
        }

        let fields: Vec<&str> = line.split(' ').collect();
        if fields.len() != 5 {
            return Err(Error::MalformedHeader(format!(
                "expected 5 fields, found {} in {:?}", fields.len(), line)));
        }
        if fields[0].is_empty() {
            return Err(Error::MalformedHeader(format!("empty URL in {:?}", line)));
        }

        let length = fields[4];
        if length.is_empty() || !length.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::InvalidLength(length.to_string()));
        }

        Ok(ArcHeader {
            url: fields[0].to_string(),
            ip_address: fields[1].to_string(),
            archive_date: parse_archive_date(fields[2])?,
            content_type: fields[3].to_string(),
            content_length: length.parse().map_err(|_| Error::InvalidLength(length.to_string()))?,
        })
    }
}

impl FromStr for ArcHeader {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ArcHeader::parse(s)
    }
}

impl fmt::Display for ArcHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} {} {}",
               self.url,
               self.ip_address,
               format_archive_date(&self.archive_date),
               self.content_type,
               self.content_length)
    }
}


/// Outcome of decoding the HTTP response of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpOutcome {
    /// Record is not an HTTP(S) capture or has no payload.
    NotApplicable,
    Parsed(HttpResponse),
    /// Payload could not be decoded, the message describes why.
    Failed(String),
}

impl HttpOutcome {
    pub fn response(&self) -> Option<&HttpResponse> {
        match self {
            HttpOutcome::Parsed(response) => Some(response),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, HttpOutcome::Failed(_))
    }
}


/// An ARC record.
///
/// Records are populated in two steps, header first and payload second. The HTTP response
/// contained in the payload is decoded on first access and cached for the lifetime of the
/// payload.
#[derive(Debug, Clone)]
pub struct ArcRecord {
    url: String,
    ip_address: String,
    archive_date: DateTime<Utc>,
    content_type: String,
    declared_content_length: usize,
    payload: Vec<u8>,
    short_read: bool,
    extended: bool,
    stream_pos: u64,
    http: OnceLock<HttpOutcome>,
}

impl Default for ArcRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl ArcRecord {
    /// Create a new empty ARC record.
    pub fn new() -> Self {
        ArcRecord {
            url: String::new(),
            ip_address: String::new(),
            archive_date: DateTime::UNIX_EPOCH,
            content_type: String::new(),
            declared_content_length: 0,
            payload: Vec::new(),
            short_read: false,
            extended: false,
            stream_pos: 0,
            http: OnceLock::new(),
        }
    }

    /// Create a record from a parsed header and a complete payload.
    pub fn from_parts(header: ArcHeader, payload: Vec<u8>) -> Self {
        let mut record = ArcRecord::new();
        record.set_header(header);
        record.set_payload(payload);
        record
    }

    /// Set the record metadata from a parsed header.
    pub fn set_header(&mut self, header: ArcHeader) {
        self.url = header.url;
        self.ip_address = header.ip_address;
        self.archive_date = header.archive_date;
        self.content_type = header.content_type;
        self.declared_content_length = header.content_length;
    }

    /// Parse a header line and set the record metadata.
    ///
    /// The record is left untouched if the line is invalid.
    pub fn set_header_line(&mut self, line: &str) -> Result<()> {
        self.set_header(ArcHeader::parse(line)?);
        Ok(())
    }

    /// Record metadata as a header.
    pub fn header(&self) -> ArcHeader {
        ArcHeader {
            url: self.url.clone(),
            ip_address: self.ip_address.clone(),
            archive_date: self.archive_date,
            content_type: self.content_type.clone(),
            content_length: self.declared_content_length,
        }
    }

    /// Read the record payload from a stream positioned right after the header line.
    ///
    /// Attempts to read the declared content length plus [`ARC_TRAILER_SLACK`] bytes. If the
    /// stream ends early, the payload is truncated and [`ArcRecord::is_short_read()`] is set.
    ///
    /// Returns the number of bytes read.
    ///
    /// # Errors
    ///
    /// I/O failures of the stream are returned as [`Error::StreamFault`].
    pub fn read_payload<R: Read>(&mut self, reader: &mut R) -> Result<usize> {
        let expected = self.declared_content_length.saturating_add(ARC_TRAILER_SLACK);
        let mut payload = Vec::with_capacity(expected.min(MAX_PREALLOC));
        reader.take(expected as u64).read_to_end(&mut payload)?;

        self.short_read = payload.len() < expected;
        if self.short_read {
            warn!(url = %self.url, expected, found = payload.len(),
                  "Short ARC record payload, truncating");
        }
        self.payload = payload;
        self.extended = false;
        self.http = OnceLock::new();
        Ok(self.payload.len())
    }

    /// Replace the payload with a complete buffer.
    pub fn set_payload(&mut self, payload: Vec<u8>) {
        self.payload = payload;
        self.short_read = false;
        self.extended = false;
        self.http = OnceLock::new();
    }

    /// Append bytes to the payload.
    ///
    /// Used when the declared content length turns out to be too small. After appending,
    /// the whole payload is treated as record content.
    pub fn append_to_payload(&mut self, data: &[u8]) {
        warn!(url = %self.url, appended = data.len(),
              "Declared content length too small, extending payload");

        let mut payload = Vec::with_capacity(self.payload.len() + data.len());
        payload.extend_from_slice(&self.payload);
        payload.extend_from_slice(data);
        self.payload = payload;
        self.extended = true;
        self.http = OnceLock::new();
    }

    pub(crate) fn set_extended(&mut self, extended: bool) {
        self.extended = extended;
    }

    pub(crate) fn set_stream_pos(&mut self, pos: u64) {
        self.stream_pos = pos;
    }

    /// Split off payload bytes beyond `len` and return them.
    pub(crate) fn split_payload_off(&mut self, len: usize) -> Vec<u8> {
        self.http = OnceLock::new();
        self.payload.split_off(len.min(self.payload.len()))
    }

    /// Record URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn ip_address(&self) -> &str {
        &self.ip_address
    }

    pub fn archive_date(&self) -> DateTime<Utc> {
        self.archive_date
    }

    /// MIME type as declared in the ARC header.
    ///
    /// Not necessarily the same as the `Content-Type` HTTP header inside the payload.
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Content length as declared in the ARC header (may be inaccurate).
    pub fn declared_content_length(&self) -> usize {
        self.declared_content_length
    }

    /// Full raw payload, including trailer bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Record content without trailer bytes.
    ///
    /// This is the payload cut to the declared content length, or the full payload if it
    /// was extended with [`ArcRecord::append_to_payload()`].
    pub fn content(&self) -> &[u8] {
        if self.extended {
            &self.payload
        } else {
            &self.payload[..self.declared_content_length.min(self.payload.len())]
        }
    }

    /// Whether fewer payload bytes than expected were available.
    pub fn is_short_read(&self) -> bool {
        self.short_read
    }

    /// Whether the payload was extended beyond the declared length.
    pub fn is_extended(&self) -> bool {
        self.extended
    }

    /// Offset of the record header in the archive stream.
    pub fn stream_pos(&self) -> u64 {
        self.stream_pos
    }

    /// Decode the HTTP response of this record (cached).
    ///
    /// The response is decoded at most once per payload, failures are cached as well.
    pub fn http_outcome(&self) -> &HttpOutcome {
        self.http.get_or_init(|| match http::decode_response(&self.url, self.content()) {
            Ok(Some(response)) => HttpOutcome::Parsed(response),
            Ok(None) => HttpOutcome::NotApplicable,
            Err(e) => {
                debug!(url = %self.url, error = %e, "Failed to decode HTTP response");
                HttpOutcome::Failed(e.to_string())
            }
        })
    }

    /// HTTP response or `None` if this is not a (valid) HTTP record.
    pub fn http_response(&self) -> Option<&HttpResponse> {
        self.http_outcome().response()
    }

    /// HTTP status code or `None` if the payload is not a valid HTTP response.
    pub fn http_status_code(&self) -> Option<u16> {
        self.http_response().map(HttpResponse::status_code)
    }

    /// HTTP headers or `None` if the payload is not a valid HTTP response.
    pub fn http_headers(&self) -> Option<&HeaderMap> {
        self.http_response().map(HttpResponse::headers)
    }
}

impl fmt::Display for ArcRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {} - {}", self.url, self.archive_date.to_rfc3339(), self.content_type)
    }
}
