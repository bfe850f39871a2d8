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
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use fastarc::merge::group_by_key;
use fastarc::{merge_documents, ArcProcessor, Config, Counters, DocumentSink, FilterPolicy, Split};
use rayon::prelude::*;
use tracing::{error, info};

use crate::jsonl::{read_lines, JsonLinesWriter, KeyedDocument, TextRecord};
use crate::logging::{init_logging, LogFormat};

mod jsonl;
mod logging;


fn main() {
    let app: App = argh::from_env();
    init_logging(if app.json_logs { LogFormat::Json } else { LogFormat::Pretty });
    if let Err(e) = app.run() {
        eprintln!("{e:?}");
        std::process::exit(1);
    }
}

#[derive(argh::FromArgs)]
#[argh(description = "ARC web archive document converter")]
struct App {
    /// emit logs as JSON
    #[argh(switch)]
    json_logs: bool,

    #[argh(subcommand)]
    subcommand: Subcommand,
}

impl App {
    fn run(self) -> Result<()> {
        match self.subcommand {
            Subcommand::Convert(cmd) => cmd.run(),
            Subcommand::Merge(cmd) => cmd.run(),
        }
    }
}

#[derive(argh::FromArgs)]
#[argh(subcommand)]
enum Subcommand {
    Convert(CmdConvert),
    Merge(CmdMerge),
}


/// Configuration and filter options shared by all subcommands.
#[derive(Debug, Default)]
struct FilterArgs {
    config: Option<PathBuf>,
    url_keep: Option<String>,
    url_skip: Option<String>,
    mimetype_keep: Vec<String>,
    mimetype_skip: Vec<String>,
}

impl FilterArgs {
    /// Load the configuration file and apply command line overrides.
    fn load_config(self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)
                .with_context(|| format!("Invalid configuration {}", path.display()))?,
            None => Config::default(),
        };
        if self.url_keep.is_some() {
            config.filter.url_keep = self.url_keep;
        }
        if self.url_skip.is_some() {
            config.filter.url_skip = self.url_skip;
        }
        if !self.mimetype_keep.is_empty() {
            config.filter.mimetype_keep = self.mimetype_keep;
        }
        if !self.mimetype_skip.is_empty() {
            config.filter.mimetype_skip = self.mimetype_skip;
        }
        Ok(config)
    }
}


/// Converts ARC files or text records into JSON-lines documents
#[derive(argh::FromArgs)]
#[argh(subcommand, name = "convert")]
struct CmdConvert {
    /// input files or directories
    #[argh(positional)]
    inputs: Vec<PathBuf>,

    /// output file, stdout is used otherwise
    #[argh(option, short = 'o')]
    output: Option<PathBuf>,

    /// read JSON-lines text records ({"key": .., "text": ..}) instead of ARC files
    #[argh(switch)]
    text: bool,

    /// do not decode HTTP responses in record payloads
    #[argh(switch)]
    no_http: bool,

    /// path to a TOML configuration file
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// keep only URLs matching this regex
    #[argh(option)]
    url_keep: Option<String>,

    /// discard URLs matching this regex
    #[argh(option)]
    url_skip: Option<String>,

    /// keep only this MIME type (repeatable)
    #[argh(option)]
    mimetype_keep: Vec<String>,

    /// discard this MIME type (repeatable)
    #[argh(option)]
    mimetype_skip: Vec<String>,
}

impl CmdConvert {
    fn run(self) -> Result<()> {
        let text_mode = self.text;
        let filter_args = FilterArgs {
            config: self.config,
            url_keep: self.url_keep,
            url_skip: self.url_skip,
            mimetype_keep: self.mimetype_keep,
            mimetype_skip: self.mimetype_skip,
        };
        let mut config = filter_args.load_config()?;
        if self.no_http {
            config.reader.parse_http = false;
        }

        let files = if text_mode {
            collect_inputs(&self.inputs, is_text_file)?
        } else {
            collect_inputs(&self.inputs, is_arc_file)?
        };
        if files.is_empty() {
            bail!("No input files found");
        }
        info!(files = files.len(), text_mode, "Converting input files");

        let counters = Arc::new(Counters::new());
        let processor = ArcProcessor::from_config(&config, counters.clone())?;
        let writer = JsonLinesWriter::create(self.output.as_deref())?;

        let failed = if text_mode {
            convert_text_files(&processor, &files, &writer)
        } else {
            convert_arc_files(&processor, &files, &writer)
        };
        writer.flush().context("Failed to flush output")?;

        eprint!("{}", counters.snapshot());
        if failed > 0 {
            bail!("{failed} of {} input files failed", files.len());
        }
        Ok(())
    }
}

fn convert_arc_files(processor: &ArcProcessor, files: &[PathBuf], writer: &JsonLinesWriter) -> usize {
    files.par_iter()
        .map(|path| {
            let result = File::open(path)
                .with_context(|| format!("Failed to open {}", path.display()))
                .and_then(|file| Ok(processor.process_split(Split::whole(file), &mut writer.sink())?));
            match result {
                Ok(_) => 0,
                Err(e) => {
                    error!(path = %path.display(), error = %format!("{e:#}"), "Failed to convert ARC file");
                    1
                }
            }
        })
        .sum()
}

fn convert_text_files(processor: &ArcProcessor, files: &[PathBuf], writer: &JsonLinesWriter) -> usize {
    files.par_iter()
        .map(|path| {
            let mut sink = writer.sink();
            let result = read_lines::<TextRecord>(path).and_then(|records| {
                for record in records {
                    processor.process_text(&record.key, &record.text, &mut sink)?;
                }
                Ok(())
            });
            match result {
                Ok(()) => 0,
                Err(e) => {
                    error!(path = %path.display(), error = %format!("{e:#}"), "Failed to convert text file");
                    1
                }
            }
        })
        .sum()
}


/// Merges JSON-lines documents sharing the same key
#[derive(argh::FromArgs)]
#[argh(subcommand, name = "merge")]
struct CmdMerge {
    /// input files or directories, read in the given order
    #[argh(positional)]
    inputs: Vec<PathBuf>,

    /// output file, stdout is used otherwise
    #[argh(option, short = 'o')]
    output: Option<PathBuf>,

    /// path to a TOML configuration file
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// where to apply filters: on_final (default) or per_partial
    #[argh(option, from_str_fn(parse_filter_policy))]
    filter_policy: Option<FilterPolicy>,

    /// keep only URLs matching this regex
    #[argh(option)]
    url_keep: Option<String>,

    /// discard URLs matching this regex
    #[argh(option)]
    url_skip: Option<String>,

    /// keep only this MIME type (repeatable)
    #[argh(option)]
    mimetype_keep: Vec<String>,

    /// discard this MIME type (repeatable)
    #[argh(option)]
    mimetype_skip: Vec<String>,
}

fn parse_filter_policy(value: &str) -> Result<FilterPolicy, String> {
    match value {
        "on_final" => Ok(FilterPolicy::OnFinal),
        "per_partial" => Ok(FilterPolicy::PerPartial),
        _ => Err(format!("unknown filter policy {value:?}, expected on_final or per_partial")),
    }
}

impl CmdMerge {
    fn run(self) -> Result<()> {
        let filter_args = FilterArgs {
            config: self.config,
            url_keep: self.url_keep,
            url_skip: self.url_skip,
            mimetype_keep: self.mimetype_keep,
            mimetype_skip: self.mimetype_skip,
        };
        let mut config = filter_args.load_config()?;
        if let Some(policy) = self.filter_policy {
            config.merge.filter_policy = policy;
        }
        let filter = config.document_filter()?;
        let policy = config.merge.filter_policy;

        let files = collect_inputs(&self.inputs, |_| true)?;
        if files.is_empty() {
            bail!("No input files found");
        }

        let mut pairs = Vec::new();
        for path in &files {
            let docs: Vec<KeyedDocument> = read_lines(path)?;
            pairs.extend(docs.into_iter().map(|d| (d.key, d.document)));
        }
        info!(files = files.len(), documents = pairs.len(), ?policy, "Merging documents");

        let counters = Counters::new();
        let groups: Vec<_> = group_by_key(pairs).into_iter().collect();
        let merged: Vec<_> = groups.into_par_iter()
            .filter_map(|(key, docs)| {
                merge_documents(docs, &filter, policy, &counters).map(|doc| (key, doc))
            })
            .collect();

        let writer = JsonLinesWriter::create(self.output.as_deref())?;
        let mut sink = writer.sink();
        for (key, doc) in merged {
            sink.emit(&key, doc).context("Failed to write output")?;
        }
        writer.flush().context("Failed to flush output")?;

        eprint!("{}", counters.snapshot());
        Ok(())
    }
}


fn is_arc_file(name: &str) -> bool {
    name.ends_with(".arc")
}

fn is_text_file(name: &str) -> bool {
    name.starts_with("textData-")
}

/// Expand input paths. Files are taken as given, directories are walked for files whose name
/// passes `accept`.
fn collect_inputs(inputs: &[PathBuf], accept: fn(&str) -> bool) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if !input.is_dir() {
            files.push(input.clone());
            continue;
        }
        let mut found = Vec::new();
        for entry in walkdir::WalkDir::new(input) {
            let entry = entry.with_context(|| format!("Failed to list {}", input.display()))?;
            if entry.file_type().is_file() && entry.file_name().to_str().is_some_and(accept) {
                found.push(entry.into_path());
            }
        }
        found.sort();
        files.extend(found);
    }
    Ok(files)
}
