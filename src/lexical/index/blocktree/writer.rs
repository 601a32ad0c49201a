use std::sync::Arc;

use bit_vec::BitVec;
use log::{debug, error, trace, warn};

use crate::error::{BlockTreeError, Result};
use crate::lexical::index::blocktree::output::Output;
use crate::lexical::index::blocktree::{
    BlockTreeConfig, TERMS_CODEC_NAME, TERMS_EXTENSION, TERMS_INDEX_CODEC_NAME,
    TERMS_INDEX_EXTENSION, VERSION_CURRENT, encode_output,
};
use crate::lexical::index::field::{FieldInfo, FieldInfos, IndexOptions};
use crate::lexical::index::postings::{BlockTermState, Posting, PostingsWriterBase};
use crate::lexical::index::segment::SegmentWriteState;
use crate::storage::{ChecksumIndexOutput, DataOutput, Storage, write_footer, write_index_header};
use crate::util::fst::Builder;

/// Writes the block file and the index file of one segment.
///
/// Terms are written one field at a time through a [`TermsWriter`] obtained
/// from [`BlockTreeTermsWriter::field_writer`]. Within a field, terms must be
/// added in strictly increasing byte order.
///
/// Blocks are written when a prefix is abandoned by the incoming terms, so
/// child blocks always precede their parent in the block file but block file
/// pointers are otherwise not ordered by depth.
///
/// # Example
///
/// ```no_run
/// # use std::sync::Arc;
/// # use blocktree_ords::error::Result;
/// # use blocktree_ords::lexical::index::blocktree::{BlockTreeConfig, BlockTreeTermsWriter};
/// # use blocktree_ords::lexical::index::field::{FieldInfo, FieldInfos, IndexOptions};
/// # use blocktree_ords::lexical::index::postings::{PlainPostingsWriter, Posting};
/// # use blocktree_ords::lexical::index::segment::{SegmentInfo, SegmentWriteState};
/// # use blocktree_ords::storage::MemoryStorage;
/// # fn main() -> Result<()> {
/// let storage = MemoryStorage::new();
/// let info = SegmentInfo::new("_0", 10);
/// let fields = Arc::new(FieldInfos::new(vec![FieldInfo::new("body", 0, IndexOptions::Docs)])?);
/// let state = SegmentWriteState::new(&info, fields.clone());
/// let postings = PlainPostingsWriter::new(&storage, &state)?;
///
/// let mut writer = BlockTreeTermsWriter::new(&storage, &state, Box::new(postings), BlockTreeConfig::default())?;
/// let mut terms = writer.field_writer(fields.field_info(0).unwrap())?;
/// terms.add_term(b"apple", &[Posting::new(1)])?;
/// terms.add_term(b"banana", &[Posting::new(2)])?;
/// terms.finish()?;
/// writer.close()?;
/// # Ok(())
/// # }
/// ```
pub struct BlockTreeTermsWriter {
    terms_out: Option<ChecksumIndexOutput>,
    index_out: Option<ChecksumIndexOutput>,
    postings_writer: Box<dyn PostingsWriterBase>,
    config: BlockTreeConfig,
    max_doc: u32,
    field_infos: Arc<FieldInfos>,
    fields: Vec<FieldMetaData>,
    closed: bool,
}

impl std::fmt::Debug for BlockTreeTermsWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockTreeTermsWriter")
            .field("config", &self.config)
            .field("max_doc", &self.max_doc)
            .field("fields", &self.fields.len())
            .field("closed", &self.closed)
            .finish()
    }
}

#[derive(Debug)]
struct FieldMetaData {
    field_info: FieldInfo,
    root_code: Vec<u8>,
    num_terms: u64,
    index_start_fp: u64,
    sum_total_term_freq: u64,
    sum_doc_freq: u64,
    doc_count: u32,
    min_term: Vec<u8>,
    max_term: Vec<u8>,
}

fn open_output(
    storage: &dyn Storage,
    name: String,
    codec: &str,
    state: &SegmentWriteState,
) -> Result<ChecksumIndexOutput> {
    let mut out = ChecksumIndexOutput::new(name.clone(), storage.create_output(&name)?);
    write_index_header(
        &mut out,
        codec,
        VERSION_CURRENT,
        &state.segment_id,
        &state.segment_suffix,
    )?;
    Ok(out)
}

fn output_mut(out: &mut Option<ChecksumIndexOutput>) -> Result<&mut ChecksumIndexOutput> {
    out.as_mut()
        .ok_or_else(|| BlockTreeError::illegal_state("terms writer is closed"))
}

fn close_quietly(out: Option<ChecksumIndexOutput>) {
    if let Some(mut out) = out {
        if let Err(e) = out.close() {
            warn!("failed to close {} after an earlier error: {e}", out.name());
        }
    }
}

impl BlockTreeTermsWriter {
    pub fn new(
        storage: &dyn Storage,
        state: &SegmentWriteState,
        mut postings_writer: Box<dyn PostingsWriterBase>,
        config: BlockTreeConfig,
    ) -> Result<Self> {
        config.validate()?;

        let mut terms_out = open_output(
            storage,
            state.file_name(TERMS_EXTENSION),
            TERMS_CODEC_NAME,
            state,
        )?;
        let index_out = match open_output(
            storage,
            state.file_name(TERMS_INDEX_EXTENSION),
            TERMS_INDEX_CODEC_NAME,
            state,
        ) {
            Ok(out) => out,
            Err(e) => {
                close_quietly(Some(terms_out));
                return Err(e);
            }
        };
        if let Err(e) = postings_writer.init(&mut terms_out, state) {
            close_quietly(Some(terms_out));
            close_quietly(Some(index_out));
            return Err(e);
        }

        Ok(BlockTreeTermsWriter {
            terms_out: Some(terms_out),
            index_out: Some(index_out),
            postings_writer,
            config,
            max_doc: state.max_doc,
            field_infos: state.field_infos.clone(),
            fields: Vec::new(),
            closed: false,
        })
    }

    /// Start writing the terms of `field`.
    pub fn field_writer(&mut self, field: &FieldInfo) -> Result<TermsWriter<'_>> {
        if self.closed {
            return Err(BlockTreeError::illegal_state("terms writer is closed"));
        }
        if self.field_infos.field_info(field.number).is_none() {
            return Err(BlockTreeError::illegal_argument(format!(
                "field {} (number {}) is not part of this segment",
                field.name, field.number
            )));
        }
        if field.index_options == IndexOptions::None {
            return Err(BlockTreeError::illegal_argument(format!(
                "field {} is not indexed",
                field.name
            )));
        }
        if self.fields.iter().any(|f| f.field_info.number == field.number) {
            return Err(BlockTreeError::illegal_argument(format!(
                "field {} was already written",
                field.name
            )));
        }
        self.postings_writer.set_field(field);
        Ok(TermsWriter::new(field.clone(), self))
    }

    /// Write a whole field from an iterator of sorted `(term, postings)` pairs.
    pub fn write_field<T, P>(
        &mut self,
        field: &FieldInfo,
        terms: impl IntoIterator<Item = (T, P)>,
    ) -> Result<()>
    where
        T: AsRef<[u8]>,
        P: AsRef<[Posting]>,
    {
        let mut writer = self.field_writer(field)?;
        for (term, postings) in terms {
            writer.add_term(term.as_ref(), postings.as_ref())?;
        }
        writer.finish()
    }

    fn write_trailers(&mut self) -> Result<()> {
        let terms_out = output_mut(&mut self.terms_out)?;
        let index_out = output_mut(&mut self.index_out)?;
        let dir_start = terms_out.file_pointer();
        let index_dir_start = index_out.file_pointer();

        terms_out.write_vint(self.fields.len() as u32)?;
        for field in &self.fields {
            terms_out.write_vint(field.field_info.number)?;
            terms_out.write_vlong(field.num_terms)?;
            terms_out.write_vint(field.root_code.len() as u32)?;
            terms_out.write_bytes(&field.root_code)?;
            if field.field_info.has_freqs() {
                terms_out.write_vlong(field.sum_total_term_freq)?;
            }
            terms_out.write_vlong(field.sum_doc_freq)?;
            terms_out.write_vint(field.doc_count)?;
            terms_out.write_len_prefixed(&field.min_term)?;
            terms_out.write_len_prefixed(&field.max_term)?;
            index_out.write_vlong(field.index_start_fp)?;
        }
        terms_out.write_be_u64(dir_start)?;
        write_footer(terms_out)?;
        index_out.write_be_u64(index_dir_start)?;
        write_footer(index_out)?;
        Ok(())
    }

    /// Write the trailers and footers and close every output. Safe to call
    /// more than once; only the first error is returned.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut first_error = self.write_trailers().err();
        let mut record = |outcome: Result<()>| {
            if let Err(e) = outcome {
                match first_error {
                    None => first_error = Some(e),
                    Some(_) => warn!("suppressed error while closing terms writer: {e}"),
                }
            }
        };
        if let Some(mut out) = self.terms_out.take() {
            record(out.close());
        }
        if let Some(mut out) = self.index_out.take() {
            record(out.close());
        }
        record(self.postings_writer.close());

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for BlockTreeTermsWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!("closing BlockTreeTermsWriter on drop failed: {e}");
        }
    }
}

#[derive(Debug)]
struct PendingTerm {
    term: Vec<u8>,
    state: BlockTermState,
}

/// Index entries of a sub-block, and the ordinal of its first term within
/// the enclosing block.
#[derive(Debug)]
struct SubIndex {
    entries: Vec<(Vec<u8>, Output)>,
    term_ord_start: u64,
}

#[derive(Debug)]
struct PendingBlock {
    prefix: Vec<u8>,
    fp: u64,
    has_terms: bool,
    is_floor: bool,
    floor_lead_byte: Option<u8>,
    /// Terms in this block, counting everything below its sub-blocks.
    total_term_count: u64,
    sub_indices: Vec<SubIndex>,
    /// Sorted index entries; set on the first block of a chain only.
    index: Vec<(Vec<u8>, Output)>,
    /// Terms in the whole floor chain.
    tot_floor_term_count: u64,
}

#[derive(Debug)]
enum PendingEntry {
    Term(PendingTerm),
    Block(PendingBlock),
}

impl PendingBlock {
    /// Build the index entries of a chain: the entry for this (first) block
    /// followed by the shifted entries of every sub-block in the chain.
    fn compile_index(&mut self, followers: &mut [PendingBlock]) -> Result<()> {
        let mut bytes = Vec::new();
        bytes.write_vlong(encode_output(self.fp, self.has_terms, self.is_floor))?;

        let mut last_sum_total_term_count = 0u64;
        let mut sum_total_term_count = self.total_term_count;
        if self.is_floor {
            bytes.write_vint(followers.len() as u32)?;
            for sub in followers.iter() {
                let lead = sub.floor_lead_byte.ok_or_else(|| {
                    BlockTreeError::illegal_state("floor block without lead byte")
                })?;
                bytes.write_byte(lead)?;
                bytes.write_vlong(sum_total_term_count - last_sum_total_term_count)?;
                last_sum_total_term_count = sum_total_term_count;
                sum_total_term_count += sub.total_term_count;
                bytes.write_vlong(((sub.fp - self.fp) << 1) | u64::from(sub.has_terms))?;
            }
        }

        let mut index = vec![(
            self.prefix.clone(),
            Output::new(bytes, 0, i64::MAX - (sum_total_term_count as i64 - 1)),
        )];

        let mut term_ord_offset = 0u64;
        let own = std::mem::take(&mut self.sub_indices);
        let chain = std::iter::once((own, self.total_term_count)).chain(
            followers
                .iter_mut()
                .map(|b| (std::mem::take(&mut b.sub_indices), b.total_term_count)),
        );
        for (sub_indices, block_term_count) in chain {
            for sub in sub_indices {
                let shift = (term_ord_offset + sub.term_ord_start) as i64;
                for (input, output) in sub.entries {
                    index.push((
                        input,
                        Output::new(output.bytes, output.start_ord + shift, output.end_ord - shift),
                    ));
                }
            }
            term_ord_offset += block_term_count;
        }

        self.tot_floor_term_count = term_ord_offset;
        self.index = index;
        Ok(())
    }
}

/// Writes the terms of a single field.
///
/// Dropping a `TermsWriter` without calling [`TermsWriter::finish`] discards
/// the field. Any error from [`TermsWriter::add_term`] aborts the field.
pub struct TermsWriter<'a> {
    writer: &'a mut BlockTreeTermsWriter,
    field_info: FieldInfo,
    has_freqs: bool,
    num_terms: u64,
    docs_seen: BitVec,
    sum_total_term_freq: u64,
    sum_doc_freq: u64,
    last_term: Vec<u8>,
    prefix_starts: Vec<usize>,
    pending: Vec<PendingEntry>,
    new_blocks: Vec<PendingBlock>,
    first_term: Option<Vec<u8>>,
    max_term: Option<Vec<u8>>,
    suffix_writer: Vec<u8>,
    stats_writer: Vec<u8>,
    meta_writer: Vec<u8>,
    aborted: bool,
}

impl<'a> TermsWriter<'a> {
    fn new(field_info: FieldInfo, writer: &'a mut BlockTreeTermsWriter) -> Self {
        let docs_seen = BitVec::from_elem(writer.max_doc as usize, false);
        TermsWriter {
            has_freqs: field_info.has_freqs(),
            field_info,
            writer,
            num_terms: 0,
            docs_seen,
            sum_total_term_freq: 0,
            sum_doc_freq: 0,
            last_term: Vec::new(),
            prefix_starts: vec![0; 8],
            pending: Vec::new(),
            new_blocks: Vec::new(),
            first_term: None,
            max_term: None,
            suffix_writer: Vec::new(),
            stats_writer: Vec::new(),
            meta_writer: Vec::new(),
            aborted: false,
        }
    }

    /// Add the next term with its postings.
    pub fn add_term(&mut self, term: &[u8], postings: &[Posting]) -> Result<()> {
        if self.aborted {
            return Err(BlockTreeError::illegal_state(format!(
                "field {} was aborted by an earlier error",
                self.field_info.name
            )));
        }
        let result = self.add_term_inner(term, postings);
        if result.is_err() {
            self.aborted = true;
        }
        result
    }

    fn add_term_inner(&mut self, term: &[u8], postings: &[Posting]) -> Result<()> {
        if let Some(last) = &self.max_term {
            if term <= last.as_slice() {
                return Err(BlockTreeError::illegal_argument(format!(
                    "terms must be added in strictly increasing order: {:?} after {:?} in field {}",
                    String::from_utf8_lossy(term),
                    String::from_utf8_lossy(last),
                    self.field_info.name
                )));
            }
        }
        if postings.is_empty() {
            return Err(BlockTreeError::illegal_argument(format!(
                "term {:?} in field {} has no postings",
                String::from_utf8_lossy(term),
                self.field_info.name
            )));
        }

        let state = self
            .writer
            .postings_writer
            .write_term(term, postings, &mut self.docs_seen)?;
        self.push_term(term)?;

        self.sum_doc_freq += u64::from(state.doc_freq);
        self.sum_total_term_freq += state.total_term_freq;
        self.num_terms += 1;
        self.pending.push(PendingEntry::Term(PendingTerm {
            term: term.to_vec(),
            state,
        }));

        if self.first_term.is_none() {
            self.first_term = Some(term.to_vec());
        }
        self.max_term = Some(term.to_vec());
        Ok(())
    }

    /// Push a term onto the pending stack, first writing blocks for every
    /// prefix the new term abandons.
    fn push_term(&mut self, text: &[u8]) -> Result<()> {
        let limit = self.last_term.len().min(text.len());
        let mut pos = 0;
        while pos < limit && self.last_term[pos] == text[pos] {
            pos += 1;
        }

        for i in (pos..self.last_term.len()).rev() {
            let prefix_top_size = self.pending.len() - self.prefix_starts[i];
            if prefix_top_size >= self.writer.config.min_items_in_block {
                self.write_blocks(i + 1, prefix_top_size)?;
                self.prefix_starts[i] = self.pending.len() - 1;
            }
        }

        if self.prefix_starts.len() < text.len() {
            self.prefix_starts.resize(text.len(), 0);
        }
        let pending_len = self.pending.len();
        for start in &mut self.prefix_starts[pos..text.len()] {
            *start = pending_len;
        }

        self.last_term.clear();
        self.last_term.extend_from_slice(text);
        Ok(())
    }

    /// Replace the top `count` pending entries, which share a prefix of
    /// `prefix_length` bytes, with one block entry. Splits into a floor
    /// chain when there are more than `max_items_in_block` entries.
    fn write_blocks(&mut self, prefix_length: usize, count: usize) -> Result<()> {
        let min_items = self.writer.config.min_items_in_block;
        let max_items = self.writer.config.max_items_in_block;

        let start = self.pending.len() - count;
        let end = self.pending.len();

        let mut last_suffix_lead_label: Option<u8> = None;
        let mut first_entry = true;
        let mut has_terms = false;
        let mut has_sub_blocks = false;
        let mut next_block_start = start;
        let mut next_floor_lead_label: Option<u8> = None;

        for i in start..end {
            let (suffix_lead_label, is_term) = match &self.pending[i] {
                PendingEntry::Term(term) => (term.term.get(prefix_length).copied(), true),
                PendingEntry::Block(block) => (block.prefix.get(prefix_length).copied(), false),
            };

            if first_entry || suffix_lead_label != last_suffix_lead_label {
                let items_in_block = i - next_block_start;
                if items_in_block >= min_items && end - next_block_start > max_items {
                    let is_floor = items_in_block < count;
                    let block = self.write_block(
                        prefix_length,
                        is_floor,
                        next_floor_lead_label,
                        next_block_start,
                        i,
                        has_terms,
                        has_sub_blocks,
                    )?;
                    self.new_blocks.push(block);

                    has_terms = false;
                    has_sub_blocks = false;
                    next_floor_lead_label = suffix_lead_label;
                    next_block_start = i;
                }
                last_suffix_lead_label = suffix_lead_label;
                first_entry = false;
            }

            if is_term {
                has_terms = true;
            } else {
                has_sub_blocks = true;
            }
        }

        if next_block_start < end {
            let is_floor = end - next_block_start < count;
            let block = self.write_block(
                prefix_length,
                is_floor,
                next_floor_lead_label,
                next_block_start,
                end,
                has_terms,
                has_sub_blocks,
            )?;
            self.new_blocks.push(block);
        }

        let mut blocks = std::mem::take(&mut self.new_blocks);
        if blocks.is_empty() {
            return Err(BlockTreeError::illegal_state("no block was written"));
        }
        let mut first = blocks.remove(0);
        first.compile_index(&mut blocks)?;

        self.pending.truncate(start);
        self.pending.push(PendingEntry::Block(first));
        Ok(())
    }

    /// Write `pending[start..end]` as one block and return its pending entry.
    #[allow(clippy::too_many_arguments)]
    fn write_block(
        &mut self,
        prefix_length: usize,
        is_floor: bool,
        floor_lead_label: Option<u8>,
        start: usize,
        end: usize,
        has_terms: bool,
        has_sub_blocks: bool,
    ) -> Result<PendingBlock> {
        let start_fp = output_mut(&mut self.writer.terms_out)?.file_pointer();
        let mut prefix = self.last_term[..prefix_length].to_vec();

        let num_entries = end - start;
        let is_last_in_floor = end == self.pending.len();
        // The root and its floor blocks always use the non-leaf layout.
        let is_leaf_block = !has_sub_blocks && prefix_length > 0;

        let mut sub_indices = Vec::new();
        let mut absolute = true;
        let mut total_term_count = 0u64;

        for entry in &mut self.pending[start..end] {
            match entry {
                PendingEntry::Term(term) => {
                    let suffix = &term.term[prefix_length..];
                    if is_leaf_block {
                        self.suffix_writer.write_vint(suffix.len() as u32)?;
                    } else {
                        self.suffix_writer.write_vint((suffix.len() as u32) << 1)?;
                    }
                    self.suffix_writer.write_bytes(suffix)?;

                    self.stats_writer.write_vint(term.state.doc_freq)?;
                    if self.has_freqs {
                        self.stats_writer.write_vlong(
                            term.state.total_term_freq - u64::from(term.state.doc_freq),
                        )?;
                    }

                    self.writer.postings_writer.encode_term(
                        &mut self.meta_writer,
                        &self.field_info,
                        &term.state,
                        absolute,
                    )?;
                    absolute = false;
                    total_term_count += 1;
                }
                PendingEntry::Block(block) => {
                    let suffix = &block.prefix[prefix_length..];
                    self.suffix_writer
                        .write_vint(((suffix.len() as u32) << 1) | 1)?;
                    self.suffix_writer.write_bytes(suffix)?;
                    self.suffix_writer.write_vlong(start_fp - block.fp)?;
                    self.suffix_writer.write_vlong(block.tot_floor_term_count)?;

                    sub_indices.push(SubIndex {
                        entries: std::mem::take(&mut block.index),
                        term_ord_start: total_term_count,
                    });
                    total_term_count += block.tot_floor_term_count;
                }
            }
        }

        let terms_out = output_mut(&mut self.writer.terms_out)?;
        terms_out.write_vint(((num_entries as u32) << 1) | u32::from(is_last_in_floor))?;
        terms_out.write_vint(((self.suffix_writer.len() as u32) << 1) | u32::from(is_leaf_block))?;
        terms_out.write_bytes(&self.suffix_writer)?;
        terms_out.write_vint(self.stats_writer.len() as u32)?;
        terms_out.write_bytes(&self.stats_writer)?;
        terms_out.write_vint(self.meta_writer.len() as u32)?;
        terms_out.write_bytes(&self.meta_writer)?;
        self.suffix_writer.clear();
        self.stats_writer.clear();
        self.meta_writer.clear();

        trace!(
            "wrote block fp={start_fp} prefix={:?} entries={num_entries} leaf={is_leaf_block} floor={is_floor} terms={total_term_count}",
            String::from_utf8_lossy(&prefix)
        );

        if is_floor {
            if let Some(lead) = floor_lead_label {
                prefix.push(lead);
            }
        }

        Ok(PendingBlock {
            prefix,
            fp: start_fp,
            has_terms,
            is_floor,
            floor_lead_byte: floor_lead_label,
            total_term_count,
            sub_indices,
            index: Vec::new(),
            tot_floor_term_count: 0,
        })
    }

    /// Flush the remaining blocks, build the field's index and record its
    /// summary. A field without terms is not recorded.
    pub fn finish(mut self) -> Result<()> {
        if self.aborted {
            return Err(BlockTreeError::illegal_state(format!(
                "field {} was aborted by an earlier error",
                self.field_info.name
            )));
        }
        if self.num_terms == 0 {
            return Ok(());
        }

        self.push_term(&[])?;
        let count = self.pending.len();
        self.write_blocks(0, count)?;

        let root = match self.pending.pop() {
            Some(PendingEntry::Block(root)) if self.pending.is_empty() => root,
            _ => return Err(BlockTreeError::illegal_state("expected a single root block")),
        };
        let root_code = root
            .index
            .first()
            .map(|(_, output)| output.bytes.clone())
            .ok_or_else(|| BlockTreeError::illegal_state("root block has no index entry"))?;

        let mut builder = Builder::new();
        for (input, output) in root.index {
            builder.add(&input, output)?;
        }
        let fst = builder
            .finish()?
            .ok_or_else(|| BlockTreeError::illegal_state("empty terms index"))?;

        let index_out = output_mut(&mut self.writer.index_out)?;
        let index_start_fp = index_out.file_pointer();
        fst.save(index_out)?;

        let doc_count = self.docs_seen.iter().filter(|seen| *seen).count() as u32;
        debug!(
            "flushed field {}: {} terms, root fp {}, index start fp {}, {} index bytes",
            self.field_info.name,
            self.num_terms,
            root.fp,
            index_start_fp,
            fst.num_bytes()
        );

        let (min_term, max_term) = match (self.first_term.take(), self.max_term.take()) {
            (Some(min), Some(max)) => (min, max),
            _ => return Err(BlockTreeError::illegal_state("field has terms but no min/max")),
        };
        let meta = FieldMetaData {
            field_info: self.field_info.clone(),
            root_code,
            num_terms: self.num_terms,
            index_start_fp,
            sum_total_term_freq: self.sum_total_term_freq,
            sum_doc_freq: self.sum_doc_freq,
            doc_count,
            min_term,
            max_term,
        };
        self.writer.fields.push(meta);
        Ok(())
    }
}
