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

//! Reduction of partial documents sharing the same key.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::counters::{Counter, Counters};
use crate::document::Document;
use crate::filter::DocumentFilter;


/// Where the filter is applied when merging documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterPolicy {
    /// Fold all documents first, then filter the result once.
    #[default]
    OnFinal,
    /// Filter every partial document before folding, the result is not filtered again.
    PerPartial,
}

/// Fill unset fields of `acc` from `candidate`.
///
/// Text is taken if `acc` has blank text and the candidate has non-blank text. Content and
/// metadata are moved over as a whole if `acc` has none. Returns whether anything was taken.
pub fn merge_into(acc: &mut Document, mut candidate: Document) -> bool {
    let mut merged = false;

    if acc.has_blank_text() && !candidate.has_blank_text() {
        if let Some(text) = candidate.take_text() {
            acc.set_text(text);
            merged = true;
        }
    }
    if acc.content().is_none() {
        if let Some(content) = candidate.take_content() {
            acc.set_content(content);
            merged = true;
        }
    }
    if acc.metadata().is_none() {
        if let Some(metadata) = candidate.take_metadata() {
            acc.set_metadata(metadata);
            merged = true;
        }
    }
    merged
}

/// Fold documents in arrival order into the first one.
///
/// Every further document counts as either merged or not merged.
pub fn fold_documents<I>(docs: I, counters: &Counters) -> Option<Document>
where
    I: IntoIterator<Item = Document>,
{
    let mut docs = docs.into_iter();
    let mut acc = docs.next()?;
    for candidate in docs {
        if merge_into(&mut acc, candidate) {
            counters.incr(Counter::Merged);
        } else {
            counters.incr(Counter::NotMerged);
        }
    }
    Some(acc)
}

/// Merge all documents of one key and apply the filter according to `policy`.
///
/// Returns the merged document if it is to be emitted.
pub fn merge_documents<I>(
    docs: I,
    filter: &DocumentFilter,
    policy: FilterPolicy,
    counters: &Counters,
) -> Option<Document>
where
    I: IntoIterator<Item = Document>,
{
    match policy {
        FilterPolicy::OnFinal => {
            let doc = fold_documents(docs, counters)?;
            if filter.gate(&doc, counters) {
                Some(doc)
            } else {
                trace!(url = doc.url(), "Merged document skipped by filters");
                None
            }
        }
        FilterPolicy::PerPartial => {
            fold_documents(docs.into_iter().filter(|d| filter.gate(d, counters)), counters)
        }
    }
}

/// Group keyed documents by key, preserving first-seen key order and arrival order per key.
pub fn group_by_key<I>(pairs: I) -> IndexMap<String, Vec<Document>>
where
    I: IntoIterator<Item = (String, Document)>,
{
    let mut groups: IndexMap<String, Vec<Document>> = IndexMap::new();
    for (key, doc) in pairs {
        groups.entry(key).or_default().push(doc);
    }
    groups
}
