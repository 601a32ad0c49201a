//! Command implementations for the blocktree-ords CLI.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use log::{debug, info};

use crate::cli::args::*;
use crate::cli::output::*;
use crate::error::{BlockTreeError, Result};
use crate::lexical::core::automaton::{Automaton, AutomatonType, CompiledAutomaton, wildcard};
use crate::lexical::core::terms::{SeekStatus, Terms, TermsEnum};
use crate::lexical::index::blocktree::{
    BlockTreeConfig, BlockTreeTermsReader, BlockTreeTermsWriter, FieldReader, ReaderOptions, Stats,
};
use crate::lexical::index::field::{FieldInfo, FieldInfos, IndexOptions};
use crate::lexical::index::postings::{PlainPostingsReader, PlainPostingsWriter, Posting};
use crate::lexical::index::segment::{SegmentInfo, SegmentReadState, SegmentWriteState};
use crate::storage::{FileStorage, Storage, StorageConfig};

/// Execute a CLI command.
pub fn execute_command(args: BlockTreeOrdsArgs) -> Result<()> {
    match &args.command {
        Command::Build(build_args) => {
            let result = build_segment(build_args)?;
            output_result("Segment written", &result, &args)
        }
        Command::Fields(location) => {
            let result = list_fields(location)?;
            output_result("", &result, &args)
        }
        Command::Stats(stats_args) => {
            let result = field_stats(stats_args)?;
            output_result("", &result, &args)
        }
        Command::Terms(terms_args) => {
            let result = list_terms(terms_args)?;
            output_result("", &result, &args)
        }
        Command::Check(location) => {
            let result = check_segment(location)?;
            output_result("", &result, &args)
        }
    }
}

/// Index the lines of a text file as documents and write one segment.
pub fn build_segment(args: &BuildArgs) -> Result<BuildResult> {
    let start = Instant::now();
    let config = BlockTreeConfig {
        min_items_in_block: args.min_block_size,
        max_items_in_block: args.max_block_size,
    };
    config.validate()?;

    let text = std::fs::read_to_string(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let mut inverted: BTreeMap<Vec<u8>, BTreeMap<u32, u32>> = BTreeMap::new();
    let mut documents = 0u32;
    for line in text.lines() {
        let doc = documents;
        documents = documents
            .checked_add(1)
            .ok_or_else(|| BlockTreeError::illegal_argument("too many documents"))?;
        for token in line.split_whitespace() {
            let token = if args.lowercase {
                token.to_lowercase()
            } else {
                token.to_string()
            };
            *inverted
                .entry(token.into_bytes())
                .or_default()
                .entry(doc)
                .or_default() += 1;
        }
    }
    info!(
        "indexing {} terms from {} documents of {}",
        inverted.len(),
        documents,
        args.input.display()
    );

    let storage = FileStorage::new(&args.location.dir, StorageConfig::default())?;
    let segment = SegmentInfo::new(args.location.segment.clone(), documents);
    let field_infos = Arc::new(FieldInfos::new(vec![FieldInfo::new(
        args.field.clone(),
        0,
        IndexOptions::DocsAndFreqs,
    )])?);
    let state = SegmentWriteState::new(&segment, field_infos.clone());
    let postings_writer = PlainPostingsWriter::new(&storage, &state)?;
    let mut writer = BlockTreeTermsWriter::new(&storage, &state, Box::new(postings_writer), config)?;
    let field = field_infos
        .field_info(0)
        .ok_or_else(|| BlockTreeError::illegal_state("field 0 missing from field infos"))?
        .clone();
    writer.write_field(
        &field,
        inverted.iter().map(|(term, docs)| {
            let postings: Vec<Posting> = docs
                .iter()
                .map(|(&doc, &freq)| Posting::with_frequency(doc, freq))
                .collect();
            (term, postings)
        }),
    )?;
    writer.close()?;
    segment.write(&storage)?;
    field_infos.write_json(&storage, &segment.name)?;

    let prefix = format!("{}.", segment.name);
    let mut files: Vec<String> = storage
        .list_files()?
        .into_iter()
        .filter(|name| name.starts_with(&prefix))
        .collect();
    files.sort();

    Ok(BuildResult {
        segment: segment.name,
        field: args.field.clone(),
        documents,
        terms: inverted.len() as u64,
        files,
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

/// Open every file of a segment for reading.
pub fn open_segment(location: &SegmentArgs) -> Result<BlockTreeTermsReader> {
    let storage = FileStorage::new(&location.dir, StorageConfig::default())?;
    let segment = SegmentInfo::read(&storage, &location.segment)?;
    let field_infos = Arc::new(FieldInfos::read_json(&storage, &segment.name)?);
    let state = SegmentReadState::new(&segment, field_infos);
    let postings_reader = PlainPostingsReader::open(&storage, &state)?;
    debug!(
        "opening segment {} in {}",
        segment.name,
        location.dir.display()
    );
    BlockTreeTermsReader::open(&storage, &state, Box::new(postings_reader), ReaderOptions::default())
}

fn field<'a>(reader: &'a BlockTreeTermsReader, name: &str) -> Result<&'a FieldReader> {
    reader.terms(name).ok_or_else(|| {
        BlockTreeError::not_found(format!(
            "field {name} has no terms in segment {}",
            reader.segment()
        ))
    })
}

pub fn list_fields(location: &SegmentArgs) -> Result<Vec<FieldSummary>> {
    let reader = open_segment(location)?;
    let mut fields = Vec::with_capacity(reader.len());
    for name in reader.field_names() {
        let terms = field(&reader, name)?;
        fields.push(FieldSummary {
            name: name.to_string(),
            number: terms.field_info().number,
            terms: terms.size(),
            doc_count: terms.doc_count(),
            sum_doc_freq: terms.sum_doc_freq(),
            sum_total_term_freq: terms.has_freqs().then(|| terms.sum_total_term_freq()),
            min_term: String::from_utf8_lossy(terms.min_term()).into_owned(),
            max_term: String::from_utf8_lossy(terms.max_term()).into_owned(),
        });
    }
    Ok(fields)
}

pub fn field_stats(args: &StatsArgs) -> Result<Vec<Stats>> {
    let reader = open_segment(&args.location)?;
    match &args.field {
        Some(name) => Ok(vec![field(&reader, name)?.stats()?]),
        None => reader
            .field_names()
            .map(|name| field(&reader, name)?.stats())
            .collect(),
    }
}

fn term_entry(terms_enum: &mut dyn TermsEnum, with_stats: bool, with_ord: bool) -> Result<TermEntry> {
    let term = String::from_utf8_lossy(terms_enum.term()?).into_owned();
    let ord = if with_ord { Some(terms_enum.ord()?) } else { None };
    let (doc_freq, total_term_freq) = if with_stats {
        (
            Some(terms_enum.doc_freq()?),
            Some(terms_enum.total_term_freq()?),
        )
    } else {
        (None, None)
    };
    Ok(TermEntry {
        term,
        ord,
        doc_freq,
        total_term_freq,
    })
}

/// Collect up to `limit` terms of an automaton enum that sort after `start`.
fn collect_filtered(
    terms_enum: &mut dyn TermsEnum,
    start: Option<&[u8]>,
    limit: usize,
    with_stats: bool,
) -> Result<Vec<TermEntry>> {
    let mut entries = Vec::new();
    while entries.len() < limit {
        let Some(term) = terms_enum.next()? else {
            break;
        };
        if start.is_some_and(|start| term <= start) {
            continue;
        }
        entries.push(term_entry(terms_enum, with_stats, false)?);
    }
    Ok(entries)
}

pub fn list_terms(args: &TermsArgs) -> Result<Vec<TermEntry>> {
    let reader = open_segment(&args.location)?;
    let terms = field(&reader, &args.field)?;
    let limit = args.limit.unwrap_or(usize::MAX);
    let start = args.start.as_deref().map(str::as_bytes);

    let automaton = match (&args.prefix, &args.wildcard) {
        (Some(prefix), _) => Some(Automaton::prefix(prefix.as_bytes())),
        (None, Some(pattern)) => Some(wildcard(pattern)?),
        (None, None) => None,
    };

    let Some(automaton) = automaton else {
        let mut terms_enum = terms.segment_terms()?;
        let mut positioned = match start {
            Some(start) => terms_enum.seek_ceil(start)? == SeekStatus::NotFound,
            None => false,
        };
        let mut entries = Vec::new();
        while entries.len() < limit {
            if positioned {
                positioned = false;
            } else if terms_enum.next()?.is_none() {
                break;
            }
            entries.push(term_entry(&mut terms_enum, args.with_stats, true)?);
        }
        return Ok(entries);
    };

    let compiled = CompiledAutomaton::new(automaton)?;
    debug!("listing terms of {} with a {:?} automaton", args.field, compiled.kind());
    if compiled.kind() == AutomatonType::Normal {
        let mut terms_enum = terms.intersect(&compiled, start)?;
        collect_filtered(terms_enum.as_mut(), None, limit, args.with_stats)
    } else {
        let mut terms_enum = compiled.terms_enum(terms)?;
        collect_filtered(terms_enum.as_mut(), start, limit, args.with_stats)
    }
}

pub fn check_segment(location: &SegmentArgs) -> Result<CheckResult> {
    let reader = open_segment(location)?;
    reader.check_integrity()?;
    info!("segment {} passed integrity checks", reader.segment());
    Ok(CheckResult {
        segment: reader.segment().to_string(),
        fields: reader.len(),
    })
}
