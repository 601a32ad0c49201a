//! Command line argument parsing for the blocktree-ords CLI using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::lexical::index::blocktree::{DEFAULT_MAX_BLOCK_SIZE, DEFAULT_MIN_BLOCK_SIZE};

/// blocktree-ords - build and inspect block-tree term dictionaries
#[derive(Parser, Debug, Clone)]
#[command(name = "blocktree-ords")]
#[command(about = "Build and inspect block-tree term dictionaries with term ordinals")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
pub struct BlockTreeOrdsArgs {
    /// Verbosity level (0=quiet, 1=normal, 2=verbose, 3=debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (overrides verbose)
    #[arg(short, long)]
    pub quiet: bool,

    /// Output format
    #[arg(short = 'f', long = "format", default_value = "human")]
    pub output_format: OutputFormat,

    /// Pretty-print JSON output
    #[arg(long)]
    pub pretty: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

impl BlockTreeOrdsArgs {
    /// Get the effective verbosity level
    pub fn verbosity(&self) -> u8 {
        if self.quiet {
            0
        } else {
            match self.verbose {
                0 => 1,
                n => n,
            }
        }
    }

    /// The `log` filter matching the verbosity.
    pub fn log_level(&self) -> log::LevelFilter {
        match self.verbosity() {
            0 => log::LevelFilter::Error,
            1 => log::LevelFilter::Warn,
            2 => log::LevelFilter::Info,
            3 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Write a segment from a text file, one document per line
    Build(BuildArgs),

    /// List the fields of a segment
    Fields(SegmentArgs),

    /// Show block statistics of one or all fields
    Stats(StatsArgs),

    /// List terms, optionally filtered by prefix or wildcard
    Terms(TermsArgs),

    /// Verify the checksums of every segment file
    Check(SegmentArgs),
}

/// Location of a segment.
#[derive(Args, Debug, Clone)]
pub struct SegmentArgs {
    /// Directory holding the segment files
    #[arg(value_name = "DIR")]
    pub dir: PathBuf,

    /// Segment name
    #[arg(value_name = "SEGMENT")]
    pub segment: String,
}

/// Arguments for building a segment
#[derive(Args, Debug, Clone)]
pub struct BuildArgs {
    #[command(flatten)]
    pub location: SegmentArgs,

    /// Input text file; each line is a document, terms are split on whitespace
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Field the terms are indexed under
    #[arg(long, default_value = "body")]
    pub field: String,

    /// Fewest entries per block
    #[arg(long, default_value_t = DEFAULT_MIN_BLOCK_SIZE)]
    pub min_block_size: usize,

    /// Most entries per block before a floor split
    #[arg(long, default_value_t = DEFAULT_MAX_BLOCK_SIZE)]
    pub max_block_size: usize,

    /// Lowercase terms before indexing
    #[arg(long)]
    pub lowercase: bool,
}

/// Arguments for block statistics
#[derive(Args, Debug, Clone)]
pub struct StatsArgs {
    #[command(flatten)]
    pub location: SegmentArgs,

    /// Only this field
    #[arg(long)]
    pub field: Option<String>,
}

/// Arguments for listing terms
#[derive(Args, Debug, Clone)]
pub struct TermsArgs {
    #[command(flatten)]
    pub location: SegmentArgs,

    /// Field to list
    #[arg(long)]
    pub field: String,

    /// Only terms starting with this prefix
    #[arg(long, conflicts_with = "wildcard")]
    pub prefix: Option<String>,

    /// Only terms matching this wildcard pattern (`*` and `?`)
    #[arg(long)]
    pub wildcard: Option<String>,

    /// Start listing after this term
    #[arg(long)]
    pub start: Option<String>,

    /// Stop after this many terms
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Include document frequency and ordinal of each term
    #[arg(long)]
    pub with_stats: bool,
}

/// Output format options
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Human-readable text
    Human,
    /// JSON
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_levels() {
        let args = BlockTreeOrdsArgs::try_parse_from(["blocktree-ords", "fields", "idx", "_0"]).unwrap();
        assert_eq!(args.verbosity(), 1);
        assert_eq!(args.log_level(), log::LevelFilter::Warn);

        let args =
            BlockTreeOrdsArgs::try_parse_from(["blocktree-ords", "-vvv", "fields", "idx", "_0"]).unwrap();
        assert_eq!(args.verbosity(), 3);
        assert_eq!(args.log_level(), log::LevelFilter::Debug);

        let args =
            BlockTreeOrdsArgs::try_parse_from(["blocktree-ords", "-q", "-vv", "fields", "idx", "_0"]).unwrap();
        assert_eq!(args.verbosity(), 0);
    }

    #[test]
    fn test_terms_args() {
        let args = BlockTreeOrdsArgs::try_parse_from([
            "blocktree-ords",
            "--format",
            "json",
            "terms",
            "idx",
            "_0",
            "--field",
            "body",
            "--prefix",
            "ca",
            "--limit",
            "10",
        ])
        .unwrap();
        assert_eq!(args.output_format, OutputFormat::Json);
        match args.command {
            Command::Terms(terms) => {
                assert_eq!(terms.location.segment, "_0");
                assert_eq!(terms.field, "body");
                assert_eq!(terms.prefix.as_deref(), Some("ca"));
                assert_eq!(terms.limit, Some(10));
                assert!(terms.wildcard.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_prefix_conflicts_with_wildcard() {
        let result = BlockTreeOrdsArgs::try_parse_from([
            "blocktree-ords",
            "terms",
            "idx",
            "_0",
            "--field",
            "body",
            "--prefix",
            "a",
            "--wildcard",
            "a*",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_build_defaults() {
        let args =
            BlockTreeOrdsArgs::try_parse_from(["blocktree-ords", "build", "idx", "_0", "docs.txt"]).unwrap();
        match args.command {
            Command::Build(build) => {
                assert_eq!(build.field, "body");
                assert_eq!(build.min_block_size, DEFAULT_MIN_BLOCK_SIZE);
                assert_eq!(build.max_block_size, DEFAULT_MAX_BLOCK_SIZE);
                assert!(!build.lowercase);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
