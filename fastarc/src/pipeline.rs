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

//! Per-split record processing and parallel fan-out.
//!
//! An [`ArcProcessor`] turns the records of a split into documents, applies the document
//! filter and hands kept documents to a [`DocumentSink`] keyed by record URL.

use std::io::Read;
use std::sync::Arc;
use rayon::prelude::*;
use tracing::{debug, info, info_span, trace};

use crate::config::Config;
use crate::counters::{Counter, Counters};
use crate::document::Document;
use crate::error::Result;
use crate::filter::DocumentFilter;
use crate::normalize::{normalize_record, normalize_text};
use crate::reader::{ArcReader, CancelFlag, ReaderStats, DEFAULT_MAX_LINE_LENGTH};
use crate::record::{ArcRecord, HttpOutcome};


/// Receiver of keyed output documents. Keys are not unique.
pub trait DocumentSink {
    fn emit(&mut self, key: &str, doc: Document) -> Result<()>;
}

impl DocumentSink for Vec<(String, Document)> {
    fn emit(&mut self, key: &str, doc: Document) -> Result<()> {
        self.push((key.to_string(), doc));
        Ok(())
    }
}


/// A byte range of an ARC stream.
///
/// `reader` must be positioned at `start`. Records starting before `end` belong to this split.
#[derive(Debug)]
pub struct Split<R> {
    pub reader: R,
    pub start: u64,
    pub end: u64,
}

impl<R: Read> Split<R> {
    pub fn new(reader: R, start: u64, end: u64) -> Self {
        Split { reader, start, end }
    }

    /// Split covering a whole stream.
    pub fn whole(reader: R) -> Self {
        Self::new(reader, 0, u64::MAX)
    }
}


/// Converts ARC records and text records into filtered documents.
#[derive(Debug, Clone)]
pub struct ArcProcessor {
    filter: DocumentFilter,
    counters: Arc<Counters>,
    parse_http: bool,
    max_line_length: usize,
    cancel: Option<CancelFlag>,
}

impl ArcProcessor {
    pub fn new(filter: DocumentFilter, counters: Arc<Counters>) -> Self {
        ArcProcessor {
            filter,
            counters,
            parse_http: true,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            cancel: None,
        }
    }

    /// Create a processor from configuration.
    ///
    /// # Errors
    ///
    /// Invalid filter rules are reported as [`crate::Error::Config`].
    pub fn from_config(config: &Config, counters: Arc<Counters>) -> Result<Self> {
        Ok(Self::new(config.document_filter()?, counters)
            .parse_http(config.reader.parse_http)
            .max_line_length(config.reader.max_line_length))
    }

    /// Whether to decode HTTP responses in record payloads and count undecodable ones.
    pub fn parse_http(mut self, parse_http: bool) -> Self {
        self.parse_http = parse_http;
        self
    }

    pub fn max_line_length(mut self, max_line_length: usize) -> Self {
        self.max_line_length = max_line_length;
        self
    }

    /// Stop all splits between records once `flag` is set.
    pub fn cancel_on(mut self, flag: CancelFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn filter(&self) -> &DocumentFilter {
        &self.filter
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    /// Normalize and filter a single record. Returns whether a document was emitted.
    pub fn process_record<S: DocumentSink>(&self, record: &ArcRecord, sink: &mut S) -> Result<bool> {
        if self.parse_http {
            if let HttpOutcome::Failed(reason) = record.http_outcome() {
                debug!(url = record.url(), reason = %reason, "Using raw payload for undecodable HTTP response");
                self.counters.incr(Counter::HttpParseFailures);
            }
        }

        let doc = normalize_record(record);
        if !self.filter.gate(&doc, &self.counters) {
            trace!(url = record.url(), "Record skipped by filters");
            return Ok(false);
        }
        sink.emit(record.url(), doc)?;
        Ok(true)
    }

    /// Normalize and filter a text record. Returns whether a document was emitted.
    pub fn process_text<S: DocumentSink>(&self, key: &str, text: &str, sink: &mut S) -> Result<bool> {
        self.counters.incr(Counter::RecordsRead);
        let doc = normalize_text(key, text);
        if !self.filter.gate(&doc, &self.counters) {
            trace!(key, "Text record skipped by filters");
            return Ok(false);
        }
        sink.emit(key, doc)?;
        Ok(true)
    }

    /// Process all records of a split.
    ///
    /// Reader statistics are added to the shared counters even if the split fails.
    ///
    /// # Errors
    ///
    /// Stream and sink failures abort the split.
    pub fn process_split<R, S>(&self, split: Split<R>, sink: &mut S) -> Result<ReaderStats>
    where
        R: Read,
        S: DocumentSink,
    {
        let span = info_span!("split", start = split.start, end = split.end);
        let _guard = span.enter();

        let mut reader = ArcReader::with_range(split.reader, split.start, split.end)
            .max_line_length(self.max_line_length);
        if let Some(flag) = &self.cancel {
            reader = reader.cancel_on(flag.clone());
        }

        let mut emitted = 0u64;
        let mut outcome = Ok(());
        for record in reader.by_ref() {
            match record.and_then(|record| self.process_record(&record, sink)) {
                Ok(true) => emitted += 1,
                Ok(false) => {}
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
        }

        let stats = reader.stats();
        self.counters.add(Counter::RecordsRead, stats.records);
        self.counters.add(Counter::ParseFailures, stats.parse_failures);
        self.counters.add(Counter::ShortReads, stats.short_reads);
        outcome?;

        info!(records = stats.records, emitted, parse_failures = stats.parse_failures,
              short_reads = stats.short_reads, "Finished ARC split");
        Ok(stats)
    }

    /// Process splits in parallel on the rayon thread pool.
    ///
    /// `make_sink` creates the sink for the split with the given index. Results are returned
    /// in split order, a failed split does not affect the others.
    pub fn process_splits<R, S, F>(&self, splits: Vec<Split<R>>, make_sink: F) -> Vec<Result<S>>
    where
        R: Read + Send,
        S: DocumentSink + Send,
        F: Fn(usize) -> S + Sync,
    {
        splits.into_par_iter()
            .enumerate()
            .map(|(i, split)| {
                let mut sink = make_sink(i);
                self.process_split(split, &mut sink)?;
                Ok(sink)
            })
            .collect()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor};
    use std::sync::atomic::AtomicBool;
    use crate::filter::FilterRule;

    fn arc_entry(url: &str, content_type: &str, payload: &[u8]) -> Vec<u8> {
        let mut entry = format!("{url} 10.0.0.1 20120101000000 {content_type} {}\n", payload.len())
            .into_bytes();
        entry.extend_from_slice(payload);
        entry.extend_from_slice(b"\n\n\n");
        entry
    }

    fn sample() -> Vec<u8> {
        [
            arc_entry("http://a.example/", "text/html",
                      b"HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n\r\n<p>a</p>"),
            arc_entry("http://b.example/img.png", "image/png",
                      b"HTTP/1.1 200 OK\r\nContent-Type: image/png\r\n\r\nPNG"),
            arc_entry("http://c.example/", "text/html", b"Content-Type: text/html\r\n\r\nraw"),
        ].concat()
    }

    #[test]
    fn test_process_split() {
        let counters = Arc::new(Counters::new());
        let filter = DocumentFilter::new(vec![FilterRule::mime_type_keep(&["text/".to_string()])]);
        let processor = ArcProcessor::new(filter, counters.clone());

        let mut sink: Vec<(String, Document)> = Vec::new();
        let stats = processor.process_split(Split::whole(Cursor::new(sample())), &mut sink).unwrap();
        assert_eq!(stats.records, 3);

        let keys: Vec<_> = sink.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["http://a.example/", "http://c.example/"]);
        assert_eq!(sink[0].1.content(), Some(b"<p>a</p>".as_slice()));
        assert_eq!(sink[1].1.content(), Some(b"raw".as_slice()));

        assert_eq!(counters.get(Counter::RecordsRead), 3);
        assert_eq!(counters.get(Counter::Kept), 2);
        assert_eq!(counters.get(Counter::Filtered), 1);
        assert_eq!(counters.get(Counter::HttpParseFailures), 1);
        assert_eq!(counters.mime_type("text/html"), 2);
    }

    #[test]
    fn test_process_split_without_http() {
        let counters = Arc::new(Counters::new());
        let processor = ArcProcessor::new(DocumentFilter::keep_all(), counters.clone()).parse_http(false);
        let mut sink: Vec<(String, Document)> = Vec::new();
        processor.process_split(Split::whole(Cursor::new(sample())), &mut sink).unwrap();
        assert_eq!(sink.len(), 3);
        assert_eq!(counters.get(Counter::HttpParseFailures), 0);
        assert_eq!(sink[1].1.content_type(), Some("image/png"));
    }

    #[test]
    fn test_process_text() {
        let counters = Arc::new(Counters::new());
        let processor = ArcProcessor::new(DocumentFilter::keep_all(), counters.clone());
        let mut sink: Vec<(String, Document)> = Vec::new();
        assert!(processor.process_text("K", "hello", &mut sink).unwrap());
        assert_eq!(sink[0].0, "K");
        assert_eq!(sink[0].1.text(), Some("hello"));
        assert_eq!(counters.mime_type("unknown"), 1);
    }

    #[test]
    fn test_process_splits() {
        let data = sample();
        let counters = Arc::new(Counters::new());
        let processor = ArcProcessor::new(DocumentFilter::keep_all(), counters.clone());

        // Second split starts inside the archive date of the second record's header
        let first_len = arc_entry("http://a.example/", "text/html",
                                  b"HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n\r\n<p>a</p>").len();
        let boundary = first_len + "http://b.example/img.png 10.0.0.1 2012".len();
        let splits = vec![
            Split::new(Cursor::new(&data[..]), 0, boundary as u64),
            Split::new(Cursor::new(&data[boundary..]), boundary as u64, data.len() as u64),
        ];
        let results = processor.process_splits(splits, |_| Vec::<(String, Document)>::new());
        let sinks: Vec<_> = results.into_iter().collect::<Result<_>>().unwrap();

        let keys: Vec<Vec<_>> = sinks.iter()
            .map(|s| s.iter().map(|(k, _)| k.clone()).collect())
            .collect();
        assert_eq!(keys, vec![
            vec!["http://a.example/".to_string(), "http://b.example/img.png".to_string()],
            vec!["http://c.example/".to_string()],
        ]);
        assert_eq!(counters.get(Counter::RecordsRead), 3);
        // The header tail and the body line after the blank CRLF each count
        assert_eq!(counters.get(Counter::ParseFailures), 2);
    }

    struct FailingSink;

    impl DocumentSink for FailingSink {
        fn emit(&mut self, _key: &str, _doc: Document) -> Result<()> {
            Err(io::Error::other("sink closed").into())
        }
    }

    #[test]
    fn test_sink_failure_aborts_split() {
        let counters = Arc::new(Counters::new());
        let processor = ArcProcessor::new(DocumentFilter::keep_all(), counters.clone());
        let result = processor.process_split(Split::whole(Cursor::new(sample())), &mut FailingSink);
        assert!(result.is_err());
        assert_eq!(counters.get(Counter::RecordsRead), 1);
    }

    #[test]
    fn test_cancelled_processor() {
        let flag = Arc::new(AtomicBool::new(true));
        let processor = ArcProcessor::new(DocumentFilter::keep_all(), Arc::new(Counters::new()))
            .cancel_on(flag);
        let mut sink: Vec<(String, Document)> = Vec::new();
        let stats = processor.process_split(Split::whole(Cursor::new(sample())), &mut sink).unwrap();
        assert_eq!(stats.records, 0);
        assert!(sink.is_empty());
    }
}
