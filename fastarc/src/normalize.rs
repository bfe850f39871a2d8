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

//! Conversion of archive records and text records into [`Document`]s.

use crate::document::{Document, Metadata};
use crate::http::find_header_end;
use crate::record::ArcRecord;


/// Convert an ARC record into a document.
///
/// The record content (without trailer) is split with [`normalize_payload()`], whether or not
/// it carries a decodable HTTP response. The archive content type serves as fallback if no
/// `Content-Type` header is present.
pub fn normalize_record(record: &ArcRecord) -> Document {
    let mut doc = normalize_payload(record.url(), record.content());
    if doc.content_type().is_none() && !record.content_type().is_empty() {
        doc.set_content_type(record.content_type());
    }
    doc
}

/// Convert a raw payload into a document.
///
/// Everything up to the end of the first `CRLFCRLF` is a header block of `name: value` lines
/// (split at the first colon, lines without a colon are skipped). The remainder becomes the
/// document content. Without a header terminator, the whole payload is content.
pub fn normalize_payload(url: &str, payload: &[u8]) -> Document {
    let boundary = find_header_end(payload).unwrap_or(0);
    let mut doc = Document::new(url);
    let mut metadata = Metadata::new();

    let header_block = String::from_utf8_lossy(&payload[..boundary]);
    for line in header_block.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let (key, value) = (key.trim(), value.trim());
        if key.eq_ignore_ascii_case("content-type") {
            doc.set_content_type(value);
        }
        metadata.insert(key.to_string(), value.to_string());
    }

    doc.set_metadata(metadata);
    doc.set_content(payload[boundary..].to_vec());
    doc
}

/// Convert a plain text record into a document.
///
/// The text is stored as text and as UTF-8 content, no headers are derived.
pub fn normalize_text(key: &str, text: &str) -> Document {
    Document::new(key)
        .with_text(text)
        .with_content(text.as_bytes().to_vec())
}
