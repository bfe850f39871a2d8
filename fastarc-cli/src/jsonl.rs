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

//! JSON-lines document input and output.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use fastarc::{Document, DocumentSink};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};


/// One output line: the document key next to the document fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyedDocument {
    pub key: String,
    #[serde(flatten)]
    pub document: Document,
}

/// One text input line.
#[derive(Debug, Clone, Deserialize)]
pub struct TextRecord {
    pub key: String,
    pub text: String,
}


/// Line-oriented JSON writer shared between worker threads.
pub struct JsonLinesWriter {
    out: Mutex<BufWriter<Box<dyn Write + Send>>>,
}

impl JsonLinesWriter {
    /// Write to `path` or to stdout if no path is given.
    pub fn create(path: Option<&Path>) -> Result<Self> {
        let out: Box<dyn Write + Send> = match path {
            Some(path) => Box::new(File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?),
            None => Box::new(io::stdout()),
        };
        Ok(JsonLinesWriter { out: Mutex::new(BufWriter::new(out)) })
    }

    pub fn write(&self, key: &str, document: Document) -> io::Result<()> {
        let keyed = KeyedDocument { key: key.to_string(), document };
        let mut line = serde_json::to_vec(&keyed)?;
        line.push(b'\n');
        self.out.lock().write_all(&line)
    }

    pub fn flush(&self) -> io::Result<()> {
        self.out.lock().flush()
    }

    pub fn sink(&self) -> SharedSink<'_> {
        SharedSink(self)
    }
}

/// [`DocumentSink`] handle of a [`JsonLinesWriter`].
pub struct SharedSink<'a>(&'a JsonLinesWriter);

impl DocumentSink for SharedSink<'_> {
    fn emit(&mut self, key: &str, doc: Document) -> fastarc::Result<()> {
        Ok(self.0.write(key, doc)?)
    }
}


/// Read all JSON lines of a file. Blank lines are ignored.
pub fn read_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut items = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let item = serde_json::from_str(&line)
            .with_context(|| format!("Invalid JSON in {} line {}", path.display(), i + 1))?;
        items.push(item);
    }
    Ok(items)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyed_document_line() {
        let document = Document::new("http://example.com/")
            .with_content(b"<p>".to_vec())
            .with_content_type("text/html");
        let keyed = KeyedDocument { key: "k".to_string(), document };
        let line = serde_json::to_string(&keyed).unwrap();
        assert!(line.starts_with(r#"{"key":"k","url":"http://example.com/""#));
        assert_eq!(serde_json::from_str::<KeyedDocument>(&line).unwrap(), keyed);
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");
        let writer = JsonLinesWriter::create(Some(&path)).unwrap();
        let mut sink = writer.sink();
        sink.emit("a", Document::new("a").with_text("one")).unwrap();
        sink.emit("b", Document::new("b").with_text("two")).unwrap();
        writer.flush().unwrap();

        let docs: Vec<KeyedDocument> = read_lines(&path).unwrap();
        let keys: Vec<_> = docs.iter().map(|d| d.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(docs[1].document.text(), Some("two"));
    }

    #[test]
    fn test_read_invalid_line() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"key":"k","text":"t"}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, "not json").unwrap();
        let err = read_lines::<TextRecord>(file.path()).unwrap_err();
        assert!(err.to_string().contains("line 3"));
    }
}
