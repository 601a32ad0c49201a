#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::Arc;

use blocktree_ords::error::Result;
use blocktree_ords::lexical::core::terms::TermsEnum;
use blocktree_ords::lexical::index::blocktree::{
    BlockTreeConfig, BlockTreeTermsReader, BlockTreeTermsWriter, ReaderOptions,
};
use blocktree_ords::lexical::index::field::{FieldInfo, FieldInfos, IndexOptions};
use blocktree_ords::lexical::index::postings::{PlainPostingsReader, PlainPostingsWriter, Posting};
use blocktree_ords::lexical::index::segment::{SegmentInfo, SegmentReadState, SegmentWriteState};
use blocktree_ords::storage::Storage;
use rand::rngs::StdRng;
use rand::Rng;

pub const MAX_DOC: u32 = 64;
pub const SEGMENT: &str = "_0";

/// Frequency-carrying field.
pub const BODY: &str = "body";
/// Docs-only field.
pub const ID: &str = "id";

pub fn small_config() -> BlockTreeConfig {
    BlockTreeConfig {
        min_items_in_block: 2,
        max_items_in_block: 4,
    }
}

/// Block size policies the invariance tests run against.
pub fn configs() -> Vec<BlockTreeConfig> {
    [(2, 2), (2, 4), (3, 5), (4, 8), (10, 20), (25, 48)]
        .into_iter()
        .map(|(min, max)| BlockTreeConfig {
            min_items_in_block: min,
            max_items_in_block: max,
        })
        .collect()
}

pub fn field_infos() -> FieldInfos {
    FieldInfos::new(vec![
        FieldInfo::new(BODY, 0, IndexOptions::DocsAndFreqs),
        FieldInfo::new(ID, 1, IndexOptions::Docs),
    ])
    .unwrap()
}

/// The single posting written for the term with ordinal `ord`.
pub fn posting_for(ord: usize) -> Posting {
    Posting::with_frequency((ord as u32 * 7) % MAX_DOC, (ord % 4) as u32 + 1)
}

pub fn to_terms(terms: &[&str]) -> Vec<Vec<u8>> {
    terms.iter().map(|t| t.as_bytes().to_vec()).collect()
}

/// Write a segment holding `fields`, each a sorted term list.
pub fn write_segment(storage: &dyn Storage, config: BlockTreeConfig, fields: &[(&str, &[Vec<u8>])]) {
    let info = SegmentInfo::new(SEGMENT, MAX_DOC);
    let field_infos = Arc::new(field_infos());
    let state = SegmentWriteState::new(&info, field_infos.clone());
    let postings = PlainPostingsWriter::new(storage, &state).unwrap();
    let mut writer = BlockTreeTermsWriter::new(storage, &state, Box::new(postings), config).unwrap();
    for (name, terms) in fields {
        let field = field_infos.field_info_by_name(name).unwrap().clone();
        let postings = terms.iter().enumerate().map(|(ord, term)| {
            let posting = if field.has_freqs() {
                posting_for(ord)
            } else {
                Posting::new(posting_for(ord).doc_id)
            };
            (term, vec![posting])
        });
        writer.write_field(&field, postings).unwrap();
    }
    writer.close().unwrap();
    info.write(storage).unwrap();
    field_infos.write_json(storage, SEGMENT).unwrap();
}

pub fn open_reader(storage: &dyn Storage, options: ReaderOptions) -> Result<BlockTreeTermsReader> {
    let info = SegmentInfo::read(storage, SEGMENT)?;
    let field_infos = Arc::new(FieldInfos::read_json(storage, SEGMENT)?);
    let state = SegmentReadState::new(&info, field_infos);
    let postings = PlainPostingsReader::open(storage, &state)?;
    BlockTreeTermsReader::open(storage, &state, Box::new(postings), options)
}

/// `count` distinct random terms over `alphabet`, sorted.
pub fn random_terms(rng: &mut StdRng, count: usize, alphabet: &[u8], max_len: usize) -> Vec<Vec<u8>> {
    let mut terms = BTreeSet::new();
    while terms.len() < count {
        let len = rng.random_range(1..=max_len);
        let term: Vec<u8> = (0..len)
            .map(|_| alphabet[rng.random_range(0..alphabet.len())])
            .collect();
        terms.insert(term);
    }
    terms.into_iter().collect()
}

/// Drain an enum from its current position.
pub fn collect(terms_enum: &mut dyn TermsEnum) -> Vec<Vec<u8>> {
    let mut terms = Vec::new();
    while let Some(term) = terms_enum.next().unwrap() {
        terms.push(term.to_vec());
    }
    terms
}

pub fn lossy(terms: &[Vec<u8>]) -> Vec<String> {
    terms
        .iter()
        .map(|t| String::from_utf8_lossy(t).into_owned())
        .collect()
}
