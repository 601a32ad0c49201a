//! Decode state for one open block.
//!
//! Enumerators keep one [`Frame`] per depth of the block tree and reuse them
//! across seeks, so the scratch buffers are allocated once per depth.

use std::io::{Seek, SeekFrom};

use crate::error::{BlockTreeError, Result};
use crate::lexical::index::blocktree::output::Output;
use crate::lexical::index::blocktree::{OUTPUT_FLAG_HAS_TERMS, OUTPUT_FLAG_IS_FLOOR, OUTPUT_FLAGS_NUM_BITS};
use crate::lexical::index::field::FieldInfo;
use crate::lexical::index::postings::{BlockTermState, PostingsReaderBase};
use crate::storage::{ByteArrayInput, DataInput, StorageInput};
use crate::util::fst::FstArc;

/// One follower block of a floor chain, decoded from the index output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FloorBlock {
    pub(crate) lead: u8,
    pub(crate) term_ord: u64,
    pub(crate) fp: u64,
    pub(crate) has_terms: bool,
}

/// What [`Frame::next_entry`] stepped onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Entry {
    Term,
    /// A pointer to a child block; `term_ord` is the ordinal of its first term.
    SubBlock { fp: u64, term_ord: u64 },
}

/// A floor chain as described by one index output.
struct Chain {
    fp: u64,
    has_terms: bool,
    is_floor: bool,
    term_ord: u64,
    floor: Vec<FloorBlock>,
}

impl Chain {
    fn decode(output: &Output) -> Result<Chain> {
        let term_ord = u64::try_from(output.start_ord).map_err(|_| {
            BlockTreeError::corrupt(format!("negative term ordinal in index output {output}"))
        })?;
        let mut reader = output.bytes.as_slice();
        let code = reader.read_vlong()?;
        let fp = code >> OUTPUT_FLAGS_NUM_BITS;
        let is_floor = code & OUTPUT_FLAG_IS_FLOOR != 0;

        let mut floor = Vec::new();
        if is_floor {
            let num_follow = reader.read_vint()? as usize;
            let mut block_ord = term_ord;
            for _ in 0..num_follow {
                let lead = reader.read_byte()?;
                block_ord += reader.read_vlong()?;
                let code = reader.read_vlong()?;
                floor.push(FloorBlock {
                    lead,
                    term_ord: block_ord,
                    fp: fp + (code >> 1),
                    has_terms: code & 1 != 0,
                });
            }
            if floor.is_empty() || floor.windows(2).any(|w| w[0].lead >= w[1].lead) {
                return Err(BlockTreeError::corrupt(format!(
                    "malformed floor data in index output {output}"
                )));
            }
        }
        Ok(Chain {
            fp,
            has_terms: code & OUTPUT_FLAG_HAS_TERMS != 0,
            is_floor,
            term_ord,
            floor,
        })
    }
}

/// A saved read position inside a loaded block.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FrameMark {
    next_ent: usize,
    suffixes_pos: usize,
    suffix_start: usize,
    suffix_len: usize,
    last_sub_fp: Option<u64>,
    term_block_ord: usize,
    term_ord: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Frame {
    /// Arc of the index that led here, when the frame was pushed by a seek.
    pub(crate) arc: Option<FstArc<Output>>,

    /// Length of the shared prefix of every entry in the block.
    pub(crate) prefix: usize,

    /// First block of the chain.
    pub(crate) fp_orig: u64,
    /// Block currently loaded or about to be loaded.
    pub(crate) fp: u64,
    /// File pointer just past the loaded block.
    pub(crate) fp_end: u64,

    pub(crate) has_terms: bool,
    pub(crate) has_terms_orig: bool,
    pub(crate) is_floor: bool,
    pub(crate) floor: Vec<FloorBlock>,

    pub(crate) loaded: bool,
    pub(crate) ent_count: usize,
    pub(crate) next_ent: usize,
    pub(crate) is_last_in_floor: bool,
    pub(crate) is_leaf_block: bool,

    /// Ordinal of the chain's first term.
    pub(crate) term_ord_orig: u64,
    /// Ordinal of the next term this frame will step onto.
    pub(crate) term_ord: u64,

    /// Absolute file pointer of the last sub-block stepped onto.
    pub(crate) last_sub_fp: Option<u64>,

    /// Terms stepped onto so far in the loaded block.
    pub(crate) term_block_ord: usize,
    meta_data_upto: usize,
    pub(crate) state: BlockTermState,

    suffixes: ByteArrayInput,
    stats: ByteArrayInput,
    meta: ByteArrayInput,
    suffix_start: usize,
    suffix_len: usize,
}

impl Frame {
    /// Point the frame at the block at `fp`, without floor data.
    pub(crate) fn reset(&mut self, fp: u64, prefix: usize, term_ord: u64) {
        self.arc = None;
        self.prefix = prefix;
        self.fp_orig = fp;
        self.fp = fp;
        self.has_terms = true;
        self.has_terms_orig = true;
        self.is_floor = false;
        self.floor.clear();
        self.loaded = false;
        self.last_sub_fp = None;
        self.term_ord_orig = term_ord;
        self.term_ord = term_ord;
    }

    /// Point the frame at the chain described by an index output.
    pub(crate) fn reset_from_output(&mut self, output: &Output, prefix: usize) -> Result<()> {
        let chain = Chain::decode(output)?;
        self.reset(chain.fp, prefix, chain.term_ord);
        self.set_chain(chain);
        self.has_terms = self.has_terms_orig;
        Ok(())
    }

    /// Like [`Frame::reset_from_output`], but a frame already loaded on the
    /// same chain keeps its read position and only takes the floor table.
    /// Returns whether the position was kept.
    pub(crate) fn refresh_from_output(&mut self, output: &Output, prefix: usize) -> Result<bool> {
        let chain = Chain::decode(output)?;
        if self.loaded && self.fp_orig == chain.fp && self.prefix == prefix {
            self.set_chain(chain);
            return Ok(true);
        }
        self.reset(chain.fp, prefix, chain.term_ord);
        self.set_chain(chain);
        self.has_terms = self.has_terms_orig;
        Ok(false)
    }

    fn set_chain(&mut self, chain: Chain) {
        self.has_terms_orig = chain.has_terms;
        self.is_floor = chain.is_floor;
        self.term_ord_orig = chain.term_ord;
        self.floor = chain.floor;
    }

    /// Return to the first block of the chain.
    pub(crate) fn rewind(&mut self) {
        self.fp = self.fp_orig;
        self.loaded = false;
        self.has_terms = self.has_terms_orig;
        self.term_ord = self.term_ord_orig;
        self.last_sub_fp = None;
    }

    fn move_to_floor_block(&mut self, idx: usize) {
        let (fp, has_terms, term_ord) = match idx {
            0 => (self.fp_orig, self.has_terms_orig, self.term_ord_orig),
            n => {
                let block = self.floor[n - 1];
                (block.fp, block.has_terms, block.term_ord)
            }
        };
        if fp != self.fp || !self.loaded {
            self.fp = fp;
            self.loaded = false;
            self.has_terms = has_terms;
            self.term_ord = term_ord;
            self.last_sub_fp = None;
        }
    }

    /// Move to the block of the chain that would hold `target`.
    pub(crate) fn scan_to_floor_frame(&mut self, target: &[u8]) {
        if !self.is_floor || target.len() <= self.prefix {
            return;
        }
        let label = target[self.prefix];
        let idx = self.floor.partition_point(|block| block.lead <= label);
        self.move_to_floor_block(idx);
    }

    /// Move to the block of the chain that holds the term with ordinal `ord`.
    pub(crate) fn scan_to_floor_frame_by_ord(&mut self, ord: u64) {
        if !self.is_floor {
            return;
        }
        let idx = self.floor.partition_point(|block| block.term_ord <= ord);
        self.move_to_floor_block(idx);
    }

    /// Read the block at `fp` unless it is already loaded.
    pub(crate) fn load_block(&mut self, input: &mut dyn StorageInput) -> Result<()> {
        if self.loaded {
            return Ok(());
        }
        input.seek(SeekFrom::Start(self.fp))?;

        let code = input.read_vint()?;
        self.ent_count = (code >> 1) as usize;
        self.is_last_in_floor = code & 1 != 0;
        if self.ent_count == 0 {
            return Err(BlockTreeError::corrupt(format!("empty block at fp {}", self.fp)));
        }

        let code = input.read_vint()?;
        self.is_leaf_block = code & 1 != 0;
        self.suffixes.fill_from(input, (code >> 1) as usize)?;

        let num_bytes = input.read_vint()? as usize;
        self.stats.fill_from(input, num_bytes)?;

        let num_bytes = input.read_vint()? as usize;
        self.meta.fill_from(input, num_bytes)?;

        self.fp_end = input.stream_position()?;
        self.loaded = true;
        self.next_ent = 0;
        self.term_block_ord = 0;
        self.meta_data_upto = 0;
        self.last_sub_fp = None;
        self.state = BlockTermState::default();
        Ok(())
    }

    /// Load the block that follows the current one in its floor chain.
    pub(crate) fn load_next_floor_block(&mut self, input: &mut dyn StorageInput) -> Result<()> {
        self.fp = self.fp_end;
        self.loaded = false;
        self.load_block(input)
    }

    pub(crate) fn is_exhausted(&self) -> bool {
        self.loaded && self.next_ent >= self.ent_count
    }

    fn advance(&mut self) -> Result<Entry> {
        if !self.loaded || self.next_ent >= self.ent_count {
            return Err(BlockTreeError::illegal_state(format!(
                "no entry left in block at fp {}",
                self.fp
            )));
        }
        self.next_ent += 1;

        let code = self.suffixes.read_vint()?;
        let (suffix_len, is_sub_block) = if self.is_leaf_block {
            (code as usize, false)
        } else {
            ((code >> 1) as usize, code & 1 != 0)
        };
        self.suffix_start = self.suffixes.position();
        self.suffix_len = suffix_len;
        self.suffixes.skip(suffix_len)?;

        if !is_sub_block {
            self.term_block_ord += 1;
            self.term_ord += 1;
            return Ok(Entry::Term);
        }

        let delta = self.suffixes.read_vlong()?;
        let term_count = self.suffixes.read_vlong()?;
        let fp = self.fp.checked_sub(delta).ok_or_else(|| {
            BlockTreeError::corrupt(format!(
                "sub-block delta {delta} exceeds block fp {}",
                self.fp
            ))
        })?;
        self.last_sub_fp = Some(fp);
        let term_ord = self.term_ord;
        self.term_ord += term_count;
        Ok(Entry::SubBlock { fp, term_ord })
    }

    /// Step onto the next entry, writing its full bytes into `term`.
    pub(crate) fn next_entry(&mut self, term: &mut Vec<u8>) -> Result<Entry> {
        if term.len() < self.prefix {
            return Err(BlockTreeError::illegal_state(format!(
                "term buffer shorter than block prefix {}",
                self.prefix
            )));
        }
        let entry = self.advance()?;
        term.truncate(self.prefix);
        term.extend_from_slice(self.suffix());
        Ok(entry)
    }

    /// Suffix bytes of the entry last stepped onto.
    pub(crate) fn suffix(&self) -> &[u8] {
        &self.suffixes.bytes()[self.suffix_start..self.suffix_start + self.suffix_len]
    }

    /// Skip entries up to and including the sub-block entry pointing at `sub_fp`.
    pub(crate) fn scan_to_sub_block(&mut self, sub_fp: u64) -> Result<()> {
        if self.last_sub_fp == Some(sub_fp) {
            return Ok(());
        }
        while self.next_ent < self.ent_count {
            if let Entry::SubBlock { fp, .. } = self.advance()? {
                if fp == sub_fp {
                    return Ok(());
                }
            }
        }
        Err(BlockTreeError::corrupt(format!(
            "sub-block {sub_fp} not found in block at fp {}",
            self.fp
        )))
    }

    /// Decode stats and postings metadata up to the current term.
    pub(crate) fn decode_meta_data(
        &mut self,
        postings_reader: &dyn PostingsReaderBase,
        field: &FieldInfo,
    ) -> Result<()> {
        let limit = self.term_block_ord;
        let mut absolute = self.meta_data_upto == 0;
        while self.meta_data_upto < limit {
            let doc_freq = self.stats.read_vint()?;
            self.state.doc_freq = doc_freq;
            self.state.total_term_freq = if field.has_freqs() {
                u64::from(doc_freq) + self.stats.read_vlong()?
            } else {
                u64::from(doc_freq)
            };
            postings_reader.decode_term(&mut self.meta, field, &mut self.state, absolute)?;
            self.meta_data_upto += 1;
            absolute = false;
        }
        self.state.term_block_ord = self.meta_data_upto;
        Ok(())
    }

    pub(crate) fn mark(&self) -> FrameMark {
        FrameMark {
            next_ent: self.next_ent,
            suffixes_pos: self.suffixes.position(),
            suffix_start: self.suffix_start,
            suffix_len: self.suffix_len,
            last_sub_fp: self.last_sub_fp,
            term_block_ord: self.term_block_ord,
            term_ord: self.term_ord,
        }
    }

    /// Step back to a position saved by [`Frame::mark`] in the same block.
    pub(crate) fn reset_to_mark(&mut self, mark: FrameMark) {
        self.next_ent = mark.next_ent;
        self.suffixes.set_position(mark.suffixes_pos);
        self.suffix_start = mark.suffix_start;
        self.suffix_len = mark.suffix_len;
        self.last_sub_fp = mark.last_sub_fp;
        self.term_block_ord = mark.term_block_ord;
        self.term_ord = mark.term_ord;
    }

    pub(crate) fn suffix_bytes_len(&self) -> usize {
        self.suffixes.len()
    }

    pub(crate) fn stats_bytes_len(&self) -> usize {
        self.stats.len()
    }
}
