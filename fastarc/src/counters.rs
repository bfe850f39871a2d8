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

//! Run-wide processing counters.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use parking_lot::Mutex;
use serde::Serialize;


/// Counter kinds tracked during a processing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    RecordsRead = 0,
    Kept = 1,
    Filtered = 2,
    Merged = 3,
    NotMerged = 4,
    ParseFailures = 5,
    HttpParseFailures = 6,
    ShortReads = 7,
}

impl Counter {
    pub const COUNT: usize = 8;

    pub const ALL: [Counter; Counter::COUNT] = [
        Counter::RecordsRead,
        Counter::Kept,
        Counter::Filtered,
        Counter::Merged,
        Counter::NotMerged,
        Counter::ParseFailures,
        Counter::HttpParseFailures,
        Counter::ShortReads,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Counter::RecordsRead => "records_read",
            Counter::Kept => "kept",
            Counter::Filtered => "filtered",
            Counter::Merged => "merged",
            Counter::NotMerged => "not_merged",
            Counter::ParseFailures => "parse_failures",
            Counter::HttpParseFailures => "http_parse_failures",
            Counter::ShortReads => "short_reads",
        }
    }
}

/// Concurrently updatable counters for one processing run.
///
/// Counters are observability only, nothing in the pipeline branches on them.
#[derive(Debug, Default)]
pub struct Counters {
    values: [AtomicU64; Counter::COUNT],
    mime_types: Mutex<HashMap<String, u64>>,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(&self, counter: Counter) {
        self.add(counter, 1);
    }

    pub fn add(&self, counter: Counter, n: u64) {
        self.values[counter as usize].fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.values[counter as usize].load(Ordering::Relaxed)
    }

    /// Count a kept document of the given MIME type.
    pub fn incr_mime_type(&self, mime_type: &str) {
        *self.mime_types.lock().entry(mime_type.to_string()).or_default() += 1;
    }

    pub fn mime_type(&self, mime_type: &str) -> u64 {
        self.mime_types.lock().get(mime_type).copied().unwrap_or(0)
    }

    /// Reset all counters to zero at the start of a run.
    pub fn reset(&self) {
        for value in &self.values {
            value.store(0, Ordering::Relaxed);
        }
        self.mime_types.lock().clear();
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            counters: Counter::ALL.iter().map(|c| (c.as_str(), self.get(*c))).collect(),
            mime_types: self.mime_types.lock().iter().map(|(k, v)| (k.clone(), *v)).collect(),
        }
    }
}


/// Point-in-time copy of all counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub counters: BTreeMap<&'static str, u64>,
    pub mime_types: BTreeMap<String, u64>,
}

impl CounterSnapshot {
    pub fn get(&self, counter: Counter) -> u64 {
        self.counters.get(counter.as_str()).copied().unwrap_or(0)
    }
}

impl fmt::Display for CounterSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for counter in Counter::ALL {
            writeln!(f, "{:<24}{}", counter.as_str(), self.get(counter))?;
        }
        for (mime_type, count) in &self.mime_types {
            writeln!(f, "mimetype {:<15}{}", mime_type, count)?;
        }
        Ok(())
    }
}
