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

//! Keep/discard gate for documents.

use regex::Regex;

use crate::config::FilterConfig;
use crate::counters::{Counter, Counters};
use crate::document::Document;
use crate::error::{Error, Result};


/// A single filter rule.
#[derive(Debug, Clone)]
pub enum FilterRule {
    /// Keep only documents whose URL matches.
    UrlKeep(Regex),
    /// Discard documents whose URL matches.
    UrlSkip(Regex),
    /// Keep only documents whose content type equals or starts with one of the given types.
    MimeTypeKeep(Vec<String>),
    /// Discard documents whose content type equals or starts with one of the given types.
    MimeTypeSkip(Vec<String>),
}

fn matches_mime_type(content_type: Option<&str>, mime_types: &[String]) -> bool {
    let Some(content_type) = content_type else {
        return false;
    };
    let content_type = content_type.trim().to_ascii_lowercase();
    mime_types.iter().any(|m| content_type.starts_with(m.as_str()))
}

fn normalize_mime_types(mime_types: &[String]) -> Vec<String> {
    mime_types.iter()
        .map(|m| m.trim().to_ascii_lowercase())
        .filter(|m| !m.is_empty())
        .collect()
}

impl FilterRule {
    pub fn mime_type_keep(mime_types: &[String]) -> Self {
        FilterRule::MimeTypeKeep(normalize_mime_types(mime_types))
    }

    pub fn mime_type_skip(mime_types: &[String]) -> Self {
        FilterRule::MimeTypeSkip(normalize_mime_types(mime_types))
    }

    /// Whether the rule lets `doc` pass.
    pub fn allows(&self, doc: &Document) -> bool {
        match self {
            FilterRule::UrlKeep(re) => re.is_match(doc.url()),
            FilterRule::UrlSkip(re) => !re.is_match(doc.url()),
            FilterRule::MimeTypeKeep(types) => matches_mime_type(doc.content_type(), types),
            FilterRule::MimeTypeSkip(types) => !matches_mime_type(doc.content_type(), types),
        }
    }
}


/// Conjunction of filter rules. Without rules, every document is kept.
#[derive(Debug, Clone, Default)]
pub struct DocumentFilter {
    rules: Vec<FilterRule>,
}

impl DocumentFilter {
    pub fn new(rules: Vec<FilterRule>) -> Self {
        DocumentFilter { rules }
    }

    /// Filter that keeps every document.
    pub fn keep_all() -> Self {
        Self::default()
    }

    pub fn with_rule(mut self, rule: FilterRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Compile filter rules from configuration.
    ///
    /// # Errors
    ///
    /// Invalid URL patterns are reported as [`Error::Config`].
    pub fn from_config(config: &FilterConfig) -> Result<Self> {
        let compile = |pattern: &str| Regex::new(pattern)
            .map_err(|e| Error::config(format!("invalid URL pattern {pattern:?}"), e));

        let mut filter = DocumentFilter::keep_all();
        if let Some(pattern) = &config.url_keep {
            filter = filter.with_rule(FilterRule::UrlKeep(compile(pattern)?));
        }
        if let Some(pattern) = &config.url_skip {
            filter = filter.with_rule(FilterRule::UrlSkip(compile(pattern)?));
        }
        if !config.mimetype_keep.is_empty() {
            filter = filter.with_rule(FilterRule::mime_type_keep(&config.mimetype_keep));
        }
        if !config.mimetype_skip.is_empty() {
            filter = filter.with_rule(FilterRule::mime_type_skip(&config.mimetype_skip));
        }
        Ok(filter)
    }

    pub fn rules(&self) -> &[FilterRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Whether `doc` passes all rules.
    pub fn keep(&self, doc: &Document) -> bool {
        self.rules.iter().all(|rule| rule.allows(doc))
    }

    /// Like [`DocumentFilter::keep()`], but also counts the decision.
    ///
    /// Kept documents are counted per content type as well.
    pub fn gate(&self, doc: &Document, counters: &Counters) -> bool {
        let keep = self.keep(doc);
        if keep {
            counters.incr(Counter::Kept);
            counters.incr_mime_type(doc.content_type().unwrap_or("unknown"));
        } else {
            counters.incr(Counter::Filtered);
        }
        keep
    }
}
