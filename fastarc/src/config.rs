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

//! TOML configuration.
//!
//! ```toml
//! [filter]
//! url_keep = "^https?://"
//! mimetype_keep = ["text/html", "application/xhtml"]
//!
//! [merge]
//! filter_policy = "on_final"
//!
//! [reader]
//! parse_http = true
//! ```

use std::path::Path;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::filter::DocumentFilter;
use crate::merge::FilterPolicy;
use crate::reader::DEFAULT_MAX_LINE_LENGTH;


/// Document filter rules. Unset rules do not restrict anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilterConfig {
    /// Keep only URLs matching this regex.
    pub url_keep: Option<String>,
    /// Discard URLs matching this regex.
    pub url_skip: Option<String>,
    /// Keep only these MIME types (exact or prefix match).
    pub mimetype_keep: Vec<String>,
    /// Discard these MIME types (exact or prefix match).
    pub mimetype_skip: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MergeConfig {
    pub filter_policy: FilterPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReaderConfig {
    /// Decode HTTP responses in record payloads and count undecodable ones.
    pub parse_http: bool,
    /// Maximum length of an ARC header line in bytes.
    pub max_line_length: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        ReaderConfig {
            parse_http: true,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub filter: FilterConfig,
    pub merge: MergeConfig,
    pub reader: ReaderConfig,
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| Error::config("failed to parse configuration", e))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("failed to read {}", path.display()), e))?;
        Self::from_toml_str(&contents)
    }

    /// Compile the configured filter rules.
    pub fn document_filter(&self) -> Result<DocumentFilter> {
        DocumentFilter::from_config(&self.filter)
    }
}
