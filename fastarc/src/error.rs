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

//! Error types for ARC parsing and document processing.

use std::io;

/// Result type used throughout FastARC.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while reading ARC records or processing documents.
///
/// Header, payload and HTTP errors affect a single record only and are
/// counted and skipped by the record reader and the pipeline. Only
/// [`Error::StreamFault`] means the byte source itself is unusable.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Header line is empty or does not consist of exactly five fields.
    #[error("malformed ARC record header: {0}")]
    MalformedHeader(String),

    /// Archive date is not a valid `yyyyMMddHHmmss` timestamp.
    #[error("invalid ARC archive date: {0:?}")]
    InvalidDate(String),

    /// Declared content length is not a non-negative integer.
    #[error("invalid ARC content length: {0:?}")]
    InvalidLength(String),

    /// Fewer bytes were available than required.
    #[error("short read: expected {expected} bytes, found {found}")]
    ShortRead {
        /// Number of bytes that should have been read.
        expected: usize,
        /// Number of bytes actually available.
        found: usize,
    },

    /// Payload could not be decoded as an HTTP response.
    #[error("HTTP parse failure: {0}")]
    HttpParseFailure(String),

    /// Reading the underlying archive stream failed.
    #[error("archive stream fault: {0}")]
    StreamFault(#[from] io::Error),

    /// Transport encoding or decoding of a record failed.
    #[error("record codec error: {0}")]
    Codec(String),

    /// Invalid configuration.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the configuration problem.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Create a configuration error with an underlying cause.
    pub fn config(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Whether the error affects only the current record.
    ///
    /// Record faults are skipped and counted, everything else aborts the split.
    pub fn is_record_fault(&self) -> bool {
        matches!(
            self,
            Error::MalformedHeader(_)
                | Error::InvalidDate(_)
                | Error::InvalidLength(_)
                | Error::ShortRead { .. }
                | Error::HttpParseFailure(_)
        )
    }
}
