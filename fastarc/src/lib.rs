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

//! Reader and document converter for ARC (v1) web archives.
//!
//! ```no_run
//! use std::fs::File;
//! use std::sync::Arc;
//! use fastarc::{ArcProcessor, Counters, DocumentFilter, Split};
//!
//! let counters = Arc::new(Counters::new());
//! let processor = ArcProcessor::new(DocumentFilter::keep_all(), counters.clone());
//! let mut docs: Vec<(String, fastarc::Document)> = Vec::new();
//! processor.process_split(Split::whole(File::open("crawl.arc")?), &mut docs)?;
//! println!("{}", counters.snapshot());
//! # Ok::<(), fastarc::Error>(())
//! ```

pub mod codec;
pub mod config;
pub mod counters;
pub mod document;
pub mod error;
pub mod filter;
pub mod header;
pub mod http;
pub mod merge;
pub mod normalize;
pub mod pipeline;
pub mod reader;
pub mod record;

pub use config::Config;
pub use counters::{Counter, CounterSnapshot, Counters};
pub use document::{Document, Metadata};
pub use error::{Error, Result};
pub use filter::{DocumentFilter, FilterRule};
pub use header::{HeaderEncoding, HeaderMap};
pub use http::{BoundaryScanner, HttpResponse, ScanState};
pub use merge::{merge_documents, FilterPolicy};
pub use normalize::{normalize_payload, normalize_record, normalize_text};
pub use pipeline::{ArcProcessor, DocumentSink, Split};
pub use reader::{ArcReader, CancelFlag, ReaderStats};
pub use record::{ArcHeader, ArcRecord, HttpOutcome, ARC_TRAILER_SLACK};
