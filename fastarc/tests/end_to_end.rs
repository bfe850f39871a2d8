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

use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom, Write};
use std::sync::Arc;

use fastarc::codec::{decode_record, encode_record};
use fastarc::merge::group_by_key;
use fastarc::*;

const HEADER: &str = "http://example.com/ 127.0.0.1 20120101000000 text/html 42";
const PAYLOAD: &[u8] = b"Content-Type: text/html\r\n\r\n<html>hi</html>";

fn write_arc(records: &[(&str, &[u8])]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    // ARC files start with a version block, which is itself a record
    let version_block = b"1 0 Internet Archive\nURL IP-address Archive-date Content-type Archive-length\n";
    writeln!(file, "filedesc://crawl.arc 0.0.0.0 20120101000000 text/plain {}", version_block.len()).unwrap();
    file.write_all(version_block).unwrap();
    file.write_all(b"\n").unwrap();

    for (header, payload) in records {
        writeln!(file, "{header}").unwrap();
        file.write_all(payload).unwrap();
        file.write_all(b"\n\n\n").unwrap();
    }
    file.flush().unwrap();
    file
}

#[test]
fn test_declared_length_scenario() {
    assert_eq!(PAYLOAD.len(), 42);
    let file = write_arc(&[(HEADER, PAYLOAD)]);

    let records: Vec<_> = ArcReader::new(File::open(file.path()).unwrap())
        .collect::<Result<_>>()
        .unwrap();
    assert_eq!(records.len(), 2);
    let record = &records[1];
    assert_eq!(record.payload().len(), 45);
    assert!(!record.is_short_read());

    let counters = Arc::new(Counters::new());
    let processor = ArcProcessor::new(DocumentFilter::keep_all(), counters.clone());
    let mut sink: Vec<(String, Document)> = Vec::new();
    assert!(processor.process_record(record, &mut sink).unwrap());

    let (key, doc) = &sink[0];
    assert_eq!(key, "http://example.com/");
    assert_eq!(doc.url(), "http://example.com/");
    assert_eq!(doc.content_type(), Some("text/html"));
    assert_eq!(doc.content(), Some(b"<html>hi</html>".as_slice()));
    assert_eq!(doc.metadata().unwrap()["Content-Type"], "text/html");
}

#[test]
fn test_process_arc_file() {
    let http = b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nServer: test\r\n\r\nplain body";
    let http_header = format!("http://example.org/a.txt 10.1.1.1 20120102030405 text/plain {}", http.len());
    let ftp_header = "ftp://example.org/file 10.1.1.1 20120102030405 text/plain 4";
    let file = write_arc(&[
        (HEADER, PAYLOAD),
        ("not a header at all", b"".as_slice()),
        (http_header.as_str(), http.as_slice()),
        (ftp_header, b"data".as_slice()),
    ]);

    let config = Config::from_toml_str("[filter]\nurl_skip = \"^filedesc:\"\n").unwrap();
    let counters = Arc::new(Counters::new());
    let processor = ArcProcessor::from_config(&config, counters.clone()).unwrap();
    let mut sink: Vec<(String, Document)> = Vec::new();
    let reader = BufReader::new(File::open(file.path()).unwrap());
    processor.process_split(Split::whole(reader), &mut sink).unwrap();

    let keys: Vec<_> = sink.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(keys, vec!["http://example.com/", "http://example.org/a.txt", "ftp://example.org/file"]);

    let plain = &sink[1].1;
    assert_eq!(plain.content(), Some(b"plain body".as_slice()));
    assert_eq!(plain.content_type(), Some("text/plain"));
    assert_eq!(plain.metadata().unwrap()["Server"], "test");

    let ftp = &sink[2].1;
    assert_eq!(ftp.content(), Some(b"data".as_slice()));
    assert_eq!(ftp.content_type(), Some("text/plain"));

    let snapshot = counters.snapshot();
    assert_eq!(snapshot.get(Counter::RecordsRead), 4);
    assert_eq!(snapshot.get(Counter::Kept), 3);
    assert_eq!(snapshot.get(Counter::Filtered), 1);
    assert_eq!(snapshot.get(Counter::ParseFailures), 1);
    assert_eq!(snapshot.get(Counter::HttpParseFailures), 1);
    assert_eq!(snapshot.get(Counter::ShortReads), 0);
}

#[test]
fn test_ftp_record_has_no_http_response() {
    let header = ArcHeader::parse("ftp://example.com/x 127.0.0.1 20120101000000 text/plain 19").unwrap();
    let record = ArcRecord::from_parts(header, b"HTTP/1.1 200 OK\r\n\r\n".to_vec());
    assert!(record.http_response().is_none());
    assert_eq!(record.http_outcome(), &HttpOutcome::NotApplicable);
    assert_eq!(record.http_status_code(), None);
}

#[test]
fn test_merge_partial_documents() {
    let counters = Counters::new();
    let pairs = vec![
        ("K".to_string(), Document::new("K").with_content(b"raw bytes".to_vec())),
        ("other".to_string(), Document::new("other").with_text("unrelated")),
        ("K".to_string(), Document::new("K").with_text("extracted text")),
    ];

    let merged: Vec<_> = group_by_key(pairs)
        .into_iter()
        .filter_map(|(key, docs)| {
            merge_documents(docs, &DocumentFilter::keep_all(), FilterPolicy::OnFinal, &counters)
                .map(|doc| (key, doc))
        })
        .collect();

    assert_eq!(merged.len(), 2);
    let (key, doc) = &merged[0];
    assert_eq!(key, "K");
    assert_eq!(doc.content(), Some(b"raw bytes".as_slice()));
    assert_eq!(doc.text(), Some("extracted text"));
    assert_eq!(counters.get(Counter::Merged), 1);
    assert_eq!(counters.get(Counter::NotMerged), 0);
}

#[test]
fn test_documents_survive_json_lines() {
    let header = ArcHeader::parse(HEADER).unwrap();
    let mut payload = PAYLOAD.to_vec();
    payload.extend_from_slice(b"\n\n\n");
    let record = ArcRecord::from_parts(header, payload);
    let doc = normalize_record(&record);

    let line = serde_json::to_string(&doc).unwrap();
    assert!(!line.contains('\n'));
    let parsed: Document = serde_json::from_str(&line).unwrap();
    assert_eq!(parsed, doc);
}

#[test]
fn test_transport_codec_through_file() {
    let header = ArcHeader::parse(HEADER).unwrap();
    let record = ArcRecord::from_parts(header, PAYLOAD.to_vec());

    let mut file = tempfile::tempfile().unwrap();
    encode_record(&record, &mut file).unwrap();
    encode_record(&record, &mut file).unwrap();
    file.seek(SeekFrom::Start(0)).unwrap();

    let mut reader = BufReader::new(file);
    for _ in 0..2 {
        let decoded = decode_record(&mut reader).unwrap();
        assert_eq!(decoded.header(), record.header());
        assert_eq!(decoded.payload(), record.payload());
    }
    assert!(decode_record(&mut reader).is_err());
}

#[test]
fn test_parallel_files() {
    let files: Vec<_> = (0..4)
        .map(|i| {
            let header = format!("http://example.com/{i} 127.0.0.1 20120101000000 text/html 42");
            write_arc(&[(header.as_str(), PAYLOAD)])
        })
        .collect();

    let counters = Arc::new(Counters::new());
    let processor = ArcProcessor::new(
        DocumentFilter::new(vec![FilterRule::mime_type_keep(&["text/html".to_string()])]),
        counters.clone(),
    );
    let splits = files.iter().map(|f| Split::whole(File::open(f.path()).unwrap())).collect();
    let sinks: Vec<_> = processor.process_splits(splits, |_| Vec::<(String, Document)>::new())
        .into_iter()
        .collect::<Result<_>>()
        .unwrap();

    for (i, sink) in sinks.iter().enumerate() {
        assert_eq!(sink.len(), 1);
        assert_eq!(sink[0].0, format!("http://example.com/{i}"));
    }
    assert_eq!(counters.get(Counter::RecordsRead), 8);
    assert_eq!(counters.get(Counter::Kept), 4);
    assert_eq!(counters.get(Counter::Filtered), 4);
    assert_eq!(counters.mime_type("text/html"), 4);
}
