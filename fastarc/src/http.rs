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

//! HTTP envelope handling for ARC payloads.
//!
//! Most ARC payloads are complete HTTP responses. [`BoundaryScanner`] finds the end of the
//! header block and [`HttpResponse`] decodes status line, headers and body.

use std::io;

use crate::error::{Error, Result};
use crate::header::{HeaderEncoding, HeaderMap};

const CR: u8 = b'\r';
const LF: u8 = b'\n';

/// State of the `CRLFCRLF` scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanState {
    #[default]
    Start,
    SawCr,
    SawCrLf,
    SawCrLfCr,
    Accept,
}

impl ScanState {
    /// Transition on a single input byte.
    ///
    /// `Accept` is terminal. A `CR` that breaks a partial match starts a new one.
    pub fn next(self, byte: u8) -> ScanState {
        match (self, byte) {
            (ScanState::Accept, _) => ScanState::Accept,
            (ScanState::SawCr, LF) => ScanState::SawCrLf,
            (ScanState::SawCrLf, CR) => ScanState::SawCrLfCr,
            (ScanState::SawCrLfCr, LF) => ScanState::Accept,
            (_, CR) => ScanState::SawCr,
            _ => ScanState::Start,
        }
    }
}

/// Incremental scanner for the `CRLFCRLF` sequence terminating an HTTP header block.
#[derive(Debug, Clone, Default)]
pub struct BoundaryScanner {
    state: ScanState,
    consumed: usize,
}

impl BoundaryScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current scanner state.
    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Feed the next chunk of input.
    ///
    /// Returns the absolute offset (counted over all chunks fed so far) of the first byte after
    /// the boundary once it has been found. Feeding more data after that returns the same offset.
    pub fn feed(&mut self, chunk: &[u8]) -> Option<usize> {
        if self.state == ScanState::Accept {
            return Some(self.consumed);
        }
        for &byte in chunk {
            self.state = self.state.next(byte);
            self.consumed += 1;
            if self.state == ScanState::Accept {
                return Some(self.consumed);
            }
        }
        None
    }

    /// Reset the scanner to its initial state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Offset of the first byte after the first `CRLFCRLF` in `buf`, if any.
pub fn find_header_end(buf: &[u8]) -> Option<usize> {
    BoundaryScanner::new().feed(buf)
}

/// Whether `url` has an `http` or `https` scheme.
pub fn is_http_url(url: &str) -> bool {
    let scheme = match url.split_once("://") {
        Some((scheme, _)) => scheme,
        None => return false,
    };
    scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https")
}

/// An HTTP response recovered from an ARC payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    version: String,
    status_code: u16,
    reason_phrase: Option<String>,
    headers: HeaderMap,
    body_offset: usize,
    body: Vec<u8>,
}

impl HttpResponse {
    /// Parse a complete HTTP response from a payload buffer.
    ///
    /// Fails with [`Error::HttpParseFailure`] if the header block is not terminated or the
    /// status line is not of the form `HTTP/<version> <status> [<reason>]`.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let body_offset = find_header_end(payload)
            .ok_or_else(|| Error::HttpParseFailure("truncated header block".to_string()))?;

        let headers = HeaderMap::parse(&payload[..body_offset], true, HeaderEncoding::Latin1);
        let (version, status_code, reason_phrase) = parse_status_line(headers.status_line_bytes())?;

        Ok(HttpResponse {
            version,
            status_code,
            reason_phrase,
            headers,
            body_offset,
            body: payload[body_offset..].to_vec(),
        })
    }

    /// HTTP version without the `HTTP/` prefix.
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn reason_phrase(&self) -> Option<&str> {
        self.reason_phrase.as_deref()
    }

    /// Response headers in payload order.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Offset of the body within the payload.
    pub fn body_offset(&self) -> usize {
        self.body_offset
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Plain `Content-Type` without additional fields such as `charset=`.
    pub fn mime_type(&self) -> Option<String> {
        self.headers
            .get("Content-Type")?
            .split(';')
            .next()
            .map(|s| s.trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty())
    }

    /// Write the response back into HTTP wire format.
    pub fn write<W: io::Write>(&self, writer: &mut W) -> io::Result<usize> {
        let mut bytes_written = self.headers.write(writer)?;
        writer.write_all(b"\r\n")?;
        writer.write_all(&self.body)?;
        bytes_written += 2 + self.body.len();
        Ok(bytes_written)
    }
}

fn parse_status_line(line: &[u8]) -> Result<(String, u16, Option<String>)> {
    let invalid = || Error::HttpParseFailure(format!(
        "invalid status line {:?}", String::from_utf8_lossy(line)));

    let line = std::str::from_utf8(line).map_err(|_| invalid())?;
    let mut parts = line.splitn(3, ' ');
    let version = parts.next()
        .and_then(|p| p.strip_prefix("HTTP/"))
        .filter(|v| !v.is_empty())
        .ok_or_else(invalid)?;
    let status = parts.next()
        .filter(|s| s.len() == 3 && s.bytes().all(|b| b.is_ascii_digit()))
        .ok_or_else(invalid)?;
    let status_code = status.parse::<u16>().map_err(|_| invalid())?;
    let reason = parts.next()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string);
    Ok((version.to_string(), status_code, reason))
}

/// Decode the HTTP response of a record payload.
///
/// Returns `Ok(None)` without parsing if `url` is not an HTTP(S) URL or `payload` is empty.
pub fn decode_response(url: &str, payload: &[u8]) -> Result<Option<HttpResponse>> {
    if payload.is_empty() || !is_http_url(url) {
        return Ok(None);
    }
    HttpResponse::parse(payload).map(Some)
}


#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[test]
    fn test_scan_basic() {
        assert_eq!(find_header_end(b""), None);
        assert_eq!(find_header_end(b"\r\n\r\n"), Some(4));
        assert_eq!(find_header_end(b"X-A: 1\r\n\r\nBODY"), Some(10));
        assert_eq!(&b"X-A: 1\r\n\r\nBODY"[10..], b"BODY");
        assert_eq!(find_header_end(b"no boundary\r\n here\n\n"), None);
    }

    #[test]
    fn test_scan_no_false_positive() {
        let buf = b"A: 1\r\n\rX\r\n\r\nBODY";
        assert_eq!(find_header_end(buf), Some(12));
        assert_eq!(&buf[12..], b"BODY");
    }

    #[test]
    fn test_scan_overlapping_cr() {
        assert_eq!(find_header_end(b"\r\r\n\r\n"), Some(5));
        assert_eq!(find_header_end(b"\r\n\r\r\n\r\n"), Some(7));
        assert_eq!(find_header_end(b"\r\n\n\r\n\r\n"), Some(7));
    }

    #[test]
    fn test_scan_states() {
        let mut state = ScanState::Start;
        for (byte, expected) in [
            (CR, ScanState::SawCr),
            (LF, ScanState::SawCrLf),
            (CR, ScanState::SawCrLfCr),
            (b'x', ScanState::Start),
            (CR, ScanState::SawCr),
            (LF, ScanState::SawCrLf),
            (CR, ScanState::SawCrLfCr),
            (LF, ScanState::Accept),
            (b'x', ScanState::Accept),
        ] {
            state = state.next(byte);
            assert_eq!(state, expected);
        }
    }

    #[test]
    fn test_scan_incremental() {
        let mut scanner = BoundaryScanner::new();
        assert_eq!(scanner.feed(b"Head: x\r\n"), None);
        assert_eq!(scanner.state(), ScanState::SawCrLf);
        assert_eq!(scanner.feed(b"\r"), None);
        assert_eq!(scanner.feed(b"\nbody"), Some(11));
        assert_eq!(scanner.feed(b"more"), Some(11));
        scanner.reset();
        assert_eq!(scanner.state(), ScanState::Start);
    }

    #[quickcheck]
    fn prop_scan_matches_naive_search(buf: Vec<u8>) -> bool {
        let naive = buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4);
        find_header_end(&buf) == naive
    }

    #[quickcheck]
    fn prop_scan_finds_boundary_in_mixed_crlf(prefix: Vec<bool>) -> bool {
        // Build noise from CR and LF only, then append a guaranteed boundary
        let mut buf: Vec<u8> = prefix.iter().map(|&b| if b { CR } else { LF }).collect();
        buf.extend_from_slice(b"\r\n\r\n");
        let naive = buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4);
        find_header_end(&buf) == naive
    }

    #[test]
    fn test_is_http_url() {
        assert!(is_http_url("http://example.com/"));
        assert!(is_http_url("HTTPS://example.com/"));
        assert!(!is_http_url("ftp://example.com/"));
        assert!(!is_http_url("filedesc://foo.arc"));
        assert!(!is_http_url("example.com"));
    }

    #[test]
    fn test_parse_response() {
        let payload = b"HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=UTF-8\r\n\
            Server: test\r\n\r\n<html></html>";
        let response = HttpResponse::parse(payload).unwrap();
        assert_eq!(response.version(), "1.1");
        assert_eq!(response.status_code(), 200);
        assert_eq!(response.reason_phrase(), Some("OK"));
        assert_eq!(response.headers().items().count(), 2);
        assert_eq!(response.mime_type().as_deref(), Some("text/html"));
        assert_eq!(response.body(), b"<html></html>");
        assert_eq!(&payload[response.body_offset()..], b"<html></html>");

        let mut out = Vec::new();
        response.write(&mut out).unwrap();
        assert_eq!(HttpResponse::parse(&out).unwrap(), response);
    }

    #[test]
    fn test_parse_response_without_reason() {
        let response = HttpResponse::parse(b"HTTP/1.0 204\r\n\r\n").unwrap();
        assert_eq!(response.status_code(), 204);
        assert_eq!(response.reason_phrase(), None);
        assert!(response.body().is_empty());
    }

    #[test]
    fn test_parse_response_failures() {
        assert!(matches!(HttpResponse::parse(b"HTTP/1.1 200 OK\r\nA: b\r\n"),
            Err(Error::HttpParseFailure(_))));
        assert!(matches!(HttpResponse::parse(b"Content-Type: text/html\r\n\r\nx"),
            Err(Error::HttpParseFailure(_))));
        assert!(matches!(HttpResponse::parse(b"HTTP/1.1 2000 OK\r\n\r\n"),
            Err(Error::HttpParseFailure(_))));
        assert!(matches!(HttpResponse::parse(b"HTTP/ 200 OK\r\n\r\n"),
            Err(Error::HttpParseFailure(_))));
    }

    #[test]
    fn test_decode_response_gate() {
        let payload = b"HTTP/1.1 200 OK\r\n\r\nbody";
        assert!(decode_response("ftp://example.com/", payload).unwrap().is_none());
        assert!(decode_response("http://example.com/", b"").unwrap().is_none());
        assert!(decode_response("http://example.com/", payload).unwrap().is_some());
        assert!(decode_response("http://example.com/", b"garbage").is_err());
    }
}
