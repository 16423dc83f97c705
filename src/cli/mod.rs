//! CLI command definitions and parsing
use crate::query::QueryType;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "puxian",
    version,
    about = "Answer questions about the Puxian dialect from a local corpus",
    long_about = "Puxian classifies each question, retrieves supporting passages with hybrid \
                  lexical and dense search, reranks them, and generates a cited answer with \
                  an OpenAI-compatible model server."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/puxian/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Corpus file to use instead of the configured one
    #[arg(long, global = true, value_name = "FILE")]
    pub corpus: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Answer a question with citations from the corpus
    Ask {
        /// Question to ask
        question: String,

        /// Print the full response as JSON
        #[arg(long)]
        json: bool,
    },

    /// Retrieve supporting passages without generating an answer
    Search {
        /// Search query text
        query: String,

        /// Use this query type's strategy instead of classifying
        #[arg(short = 't', long = "type", value_parser = parse_query_type)]
        query_type: Option<QueryType>,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show how a query is classified and which strategy it gets
    Classify {
        /// Query text
        query: String,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show {
        /// Show only a specific section
        #[arg(short, long)]
        section: Option<String>,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

fn parse_query_type(raw: &str) -> Result<QueryType, String> {
    raw.parse()
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
