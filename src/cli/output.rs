//! Output formatting for CLI commands.

use serde::Serialize;

use crate::cli::args::{BlockTreeOrdsArgs, OutputFormat};
use crate::error::Result;
use crate::lexical::index::blocktree::Stats;

/// Result of building a segment.
#[derive(Debug, Serialize)]
pub struct BuildResult {
    pub segment: String,
    pub field: String,
    pub documents: u32,
    pub terms: u64,
    pub files: Vec<String>,
    pub duration_ms: u64,
}

/// Summary of one field of a segment.
#[derive(Debug, Serialize)]
pub struct FieldSummary {
    pub name: String,
    pub number: u32,
    pub terms: u64,
    pub doc_count: u32,
    pub sum_doc_freq: u64,
    pub sum_total_term_freq: Option<u64>,
    pub min_term: String,
    pub max_term: String,
}

/// A listed term.
#[derive(Debug, Serialize)]
pub struct TermEntry {
    pub term: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ord: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_freq: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_term_freq: Option<u64>,
}

/// Result of verifying a segment's checksums.
#[derive(Debug, Serialize)]
pub struct CheckResult {
    pub segment: String,
    pub fields: usize,
}

/// Print `result` in the format selected on the command line.
pub fn output_result<T: Serialize + HumanOutput>(
    message: &str,
    result: &T,
    args: &BlockTreeOrdsArgs,
) -> Result<()> {
    match args.output_format {
        OutputFormat::Human => {
            if args.verbosity() > 0 && !message.is_empty() {
                println!("{message}");
            }
            result.print_human(args);
            Ok(())
        }
        OutputFormat::Json => output_json(result, args),
    }
}

fn output_json<T: Serialize>(result: &T, args: &BlockTreeOrdsArgs) -> Result<()> {
    let json = if args.pretty {
        serde_json::to_string_pretty(result)?
    } else {
        serde_json::to_string(result)?
    };
    println!("{json}");
    Ok(())
}

/// Plain text rendering of a command result.
pub trait HumanOutput {
    fn print_human(&self, args: &BlockTreeOrdsArgs);
}

impl HumanOutput for BuildResult {
    fn print_human(&self, args: &BlockTreeOrdsArgs) {
        println!(
            "Wrote {} terms of field {} from {} documents in {} ms",
            self.terms, self.field, self.documents, self.duration_ms
        );
        if args.verbosity() > 1 {
            for file in &self.files {
                println!("  {file}");
            }
        }
    }
}

impl HumanOutput for Vec<FieldSummary> {
    fn print_human(&self, _args: &BlockTreeOrdsArgs) {
        for field in self {
            println!(
                "{:<20} #{:<4} terms={:<10} docs={:<10} sumDF={}",
                field.name, field.number, field.terms, field.doc_count, field.sum_doc_freq
            );
            println!("{:<20} range [{} .. {}]", "", field.min_term, field.max_term);
        }
    }
}

impl HumanOutput for Vec<Stats> {
    fn print_human(&self, _args: &BlockTreeOrdsArgs) {
        for stats in self {
            print!("{stats}");
        }
    }
}

impl HumanOutput for Vec<TermEntry> {
    fn print_human(&self, _args: &BlockTreeOrdsArgs) {
        for entry in self {
            match (entry.ord, entry.doc_freq) {
                (Some(ord), Some(df)) => println!("{ord:>8}  {}  df={df}", entry.term),
                (None, Some(df)) => println!("{}  df={df}", entry.term),
                (Some(ord), None) => println!("{ord:>8}  {}", entry.term),
                (None, None) => println!("{}", entry.term),
            }
        }
    }
}

impl HumanOutput for CheckResult {
    fn print_human(&self, _args: &BlockTreeOrdsArgs) {
        println!("Segment {}: {} fields, checksums ok", self.segment, self.fields);
    }
}
