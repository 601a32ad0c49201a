//! Postings: the per-term document lists the term dictionary points into.
//!
//! The block-tree dictionary does not know how postings are laid out. It
//! hands each term's postings to a [`PostingsWriterBase`], stores the opaque
//! metadata the writer encodes for it, and gives that metadata back to a
//! [`PostingsReaderBase`] when a term is visited.

pub mod plain;

use bit_vec::BitVec;

use crate::error::Result;
use crate::lexical::index::field::FieldInfo;
use crate::lexical::index::segment::{SegmentReadState, SegmentWriteState};
use crate::storage::{ByteArrayInput, ChecksumIndexOutput, StorageInput};

pub use plain::{PlainPostingsReader, PlainPostingsWriter};

/// Sentinel doc id returned once a postings enum is exhausted.
pub const NO_MORE_DOCS: u32 = u32::MAX;

/// A single posting in a posting list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Posting {
    /// Document ID.
    pub doc_id: u32,
    /// Term frequency in the document.
    pub frequency: u32,
}

impl Posting {
    /// Create a new posting.
    pub fn new(doc_id: u32) -> Self {
        Posting {
            doc_id,
            frequency: 1,
        }
    }

    /// Create a posting with frequency.
    pub fn with_frequency(doc_id: u32, frequency: u32) -> Self {
        Posting { doc_id, frequency }
    }
}

/// Statistics and postings metadata of one term.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockTermState {
    /// Number of documents containing the term.
    pub doc_freq: u32,
    /// Total occurrences; equals `doc_freq` for fields without frequencies.
    pub total_term_freq: u64,
    /// Position of the term among the terms of its block.
    pub term_block_ord: usize,
    /// Start of the term's postings in the postings file.
    pub doc_start_fp: u64,
}

/// A (frequency, norm) pair summarizing the best score a term can reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Impact {
    pub freq: u32,
    pub norm: u64,
}

/// Iterator over the postings of one term.
pub trait PostingsEnum: Send {
    /// Current document, `None` before the first `next_doc`.
    fn doc_id(&self) -> Option<u32>;

    /// Advance to the next document, returning [`NO_MORE_DOCS`] at the end.
    fn next_doc(&mut self) -> Result<u32>;

    /// Advance to the first document `>= target`.
    fn advance(&mut self, target: u32) -> Result<u32> {
        loop {
            let doc = self.next_doc()?;
            if doc >= target {
                return Ok(doc);
            }
        }
    }

    /// Term frequency in the current document.
    fn freq(&self) -> u32;

    /// Upper bound on the number of documents.
    fn cost(&self) -> u64;
}

/// Writes postings and encodes the per-term metadata stored in term blocks.
pub trait PostingsWriterBase: Send {
    /// Called once with the terms file so the writer can stamp its own header.
    fn init(&mut self, terms_out: &mut ChecksumIndexOutput, state: &SegmentWriteState) -> Result<()>;

    /// Start a new field.
    fn set_field(&mut self, field: &FieldInfo);

    /// Write the postings of `term`, marking each document in `docs_seen`.
    fn write_term(
        &mut self,
        term: &[u8],
        postings: &[Posting],
        docs_seen: &mut BitVec,
    ) -> Result<BlockTermState>;

    /// Append the metadata of `state`. With `absolute` false it may be
    /// encoded relative to the previous term of the same block.
    fn encode_term(
        &mut self,
        out: &mut Vec<u8>,
        field: &FieldInfo,
        state: &BlockTermState,
        absolute: bool,
    ) -> Result<()>;

    fn close(&mut self) -> Result<()>;
}

/// Reads postings written by the matching [`PostingsWriterBase`].
pub trait PostingsReaderBase: Send + Sync {
    /// Called once with the terms file, positioned right after its header.
    fn init(&mut self, terms_in: &mut dyn StorageInput, state: &SegmentReadState) -> Result<()>;

    /// Inverse of [`PostingsWriterBase::encode_term`].
    fn decode_term(
        &self,
        input: &mut ByteArrayInput,
        field: &FieldInfo,
        state: &mut BlockTermState,
        absolute: bool,
    ) -> Result<()>;

    fn postings(&self, field: &FieldInfo, state: &BlockTermState) -> Result<Box<dyn PostingsEnum>>;

    fn impacts(&self, field: &FieldInfo, state: &BlockTermState) -> Result<Vec<Impact>>;

    /// Verify checksums of every file this reader owns.
    fn check_integrity(&self) -> Result<()>;
}
