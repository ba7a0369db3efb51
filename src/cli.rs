//! CLI interface for the relevance pipeline

use crate::config::OutputFormat;
use crate::error::{RelevanceError, Result};
use crate::pipeline::types::DocumentItem;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "doc-relevance")]
#[command(about = "Offline document relevance pipeline")]
#[command(long_about = "Extract text from documents with an external tool and score it for topical relevance using weighted fuzzy keyword matching")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Score a text file (or stdin with "-")
    Analyze {
        /// Text file to analyse, "-" for stdin
        input: String,

        /// Use the include/exclude/priority scorer instead of the keyword analyzer
        #[arg(short, long)]
        advanced: bool,

        /// Show contexts and category scores
        #[arg(short, long)]
        detailed: bool,

        /// Output format: console, json
        #[arg(short, long)]
        format: Option<String>,
    },

    /// Run the extraction tool on one source
    Extract {
        /// URL or file path
        source: String,

        /// Per-attempt timeout in seconds
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Print the extracted text
        #[arg(short, long)]
        detailed: bool,

        /// Output format: console, json
        #[arg(short, long)]
        format: Option<String>,
    },

    /// Process every document listed in a JSON manifest
    Batch {
        /// JSON array of documents, or an object with a "documents" array
        manifest: PathBuf,

        /// Documents processed at once
        #[arg(short = 'j', long)]
        concurrency: Option<usize>,

        /// Use the include/exclude/priority scorer
        #[arg(short, long)]
        advanced: bool,

        /// Ignore existing content and extract again
        #[arg(long)]
        force: bool,

        /// Extract only
        #[arg(long)]
        skip_analysis: bool,

        /// Show per-document analysis
        #[arg(short, long)]
        detailed: bool,

        /// Output format: console, json
        #[arg(short, long)]
        format: Option<String>,

        /// Write the full batch result as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Keyword set commands
    Keywords {
        #[command(subcommand)]
        action: KeywordsAction,
    },

    /// Show configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
pub enum KeywordsAction {
    /// Print the active keyword set as TOML
    Show {
        /// Show the keyword analyzer's set instead of the scorer's
        #[arg(long)]
        analyzer: bool,
    },

    /// Validate a keyword file (defaults to the configured one)
    Validate {
        /// Keyword TOML file
        file: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Print the configuration file location
    Path,

    /// Reset configuration to defaults
    Reset,
}

/// Parse and validate output format
pub fn parse_output_format(format: &str) -> std::result::Result<OutputFormat, String> {
    match format.to_lowercase().as_str() {
        "console" => Ok(OutputFormat::Console),
        "json" => Ok(OutputFormat::Json),
        _ => Err(format!(
            "Invalid output format: {}. Supported: console, json",
            format
        )),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Manifest {
    List(Vec<DocumentItem>),
    Wrapped { documents: Vec<DocumentItem> },
}

/// Parse a batch manifest, rejecting duplicate or empty ids.
pub fn parse_manifest(content: &str) -> Result<Vec<DocumentItem>> {
    let items = match serde_json::from_str::<Manifest>(content) {
        Ok(Manifest::List(items)) | Ok(Manifest::Wrapped { documents: items }) => items,
        Err(e) => {
            return Err(RelevanceError::InvalidInput(format!(
                "Manifest is neither a document list nor {{\"documents\": [...]}}: {}",
                e
            )))
        }
    };

    let mut seen = HashSet::new();
    for item in &items {
        if item.id.trim().is_empty() {
            return Err(RelevanceError::InvalidInput(format!(
                "Document with source {} has an empty id",
                item.source_url
            )));
        }
        if !seen.insert(item.id.as_str()) {
            return Err(RelevanceError::InvalidInput(format!(
                "Duplicate document id in manifest: {}",
                item.id
            )));
        }
    }

    Ok(items)
}

pub fn load_manifest(path: &Path) -> Result<Vec<DocumentItem>> {
    let content = std::fs::read_to_string(path)?;
    parse_manifest(&content)
}
