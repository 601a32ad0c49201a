use std::fmt;

use serde::Serialize;

use crate::error::{BlockTreeError, Result};
use crate::lexical::index::blocktree::frame::Frame;

/// Block statistics of a single field, gathered by walking every block.
///
/// Returned by [`FieldReader::stats`](super::FieldReader::stats).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    /// Byte size of the index FST.
    pub index_num_bytes: u64,

    /// Total number of terms in the field.
    pub total_term_count: u64,

    /// Sum of term lengths across all terms in the field.
    pub total_term_bytes: u64,

    /// The number of blocks that are not part of a floor chain.
    pub non_floor_block_count: u64,

    /// The number of floor chains (prefixes with more entries than
    /// `max_items_in_block`).
    pub floor_block_count: u64,

    /// The number of blocks inside floor chains.
    pub floor_sub_block_count: u64,

    /// Blocks holding both terms and sub-blocks.
    pub mixed_block_count: u64,

    /// Blocks holding only terms.
    pub terms_only_block_count: u64,

    /// Blocks holding only sub-blocks.
    pub sub_blocks_only_block_count: u64,

    pub total_block_count: u64,

    /// Number of blocks at each prefix length.
    pub block_count_by_prefix_len: Vec<u64>,

    /// Bytes used to store term suffixes.
    pub total_block_suffix_bytes: u64,

    /// Bytes used to store term statistics, excluding postings metadata.
    pub total_block_stats_bytes: u64,

    /// Postings metadata plus the block headers.
    pub total_block_other_bytes: u64,

    pub segment: String,
    pub field: String,

    #[serde(skip)]
    start_block_count: u64,
    #[serde(skip)]
    end_block_count: u64,
}

impl Stats {
    pub fn new(segment: &str, field: &str) -> Self {
        Stats {
            block_count_by_prefix_len: vec![0; 10],
            segment: segment.to_string(),
            field: field.to_string(),
            ..Default::default()
        }
    }

    pub(crate) fn start_block(&mut self, frame: &Frame, is_floor: bool) {
        self.total_block_count += 1;
        if is_floor {
            if frame.fp == frame.fp_orig {
                self.floor_block_count += 1;
            }
            self.floor_sub_block_count += 1;
        } else {
            self.non_floor_block_count += 1;
        }
        if self.block_count_by_prefix_len.len() <= frame.prefix {
            self.block_count_by_prefix_len.resize(frame.prefix + 1, 0);
        }
        self.block_count_by_prefix_len[frame.prefix] += 1;
        self.start_block_count += 1;
        self.total_block_suffix_bytes += frame.suffix_bytes_len() as u64;
        self.total_block_stats_bytes += frame.stats_bytes_len() as u64;
    }

    pub(crate) fn end_block(&mut self, frame: &Frame) -> Result<()> {
        let term_count = frame.term_block_ord;
        let sub_block_count = frame.ent_count - term_count;
        match (term_count, sub_block_count) {
            (0, s) if s > 0 => self.sub_blocks_only_block_count += 1,
            (t, 0) if t > 0 => self.terms_only_block_count += 1,
            (t, s) if t > 0 && s > 0 => self.mixed_block_count += 1,
            _ => {
                return Err(BlockTreeError::corrupt(format!(
                    "empty block at fp {}",
                    frame.fp
                )));
            }
        }
        self.end_block_count += 1;
        let other_bytes = (frame.fp_end - frame.fp)
            .saturating_sub(frame.suffix_bytes_len() as u64)
            .saturating_sub(frame.stats_bytes_len() as u64);
        self.total_block_other_bytes += other_bytes;
        Ok(())
    }

    pub(crate) fn term(&mut self, term: &[u8]) {
        self.total_term_count += 1;
        self.total_term_bytes += term.len() as u64;
    }

    pub(crate) fn finish(&self) -> Result<()> {
        if self.start_block_count != self.end_block_count {
            return Err(BlockTreeError::illegal_state(format!(
                "started {} blocks but ended {}",
                self.start_block_count, self.end_block_count
            )));
        }
        debug_assert_eq!(
            self.total_block_count,
            self.floor_sub_block_count + self.non_floor_block_count
        );
        debug_assert_eq!(
            self.total_block_count,
            self.mixed_block_count + self.terms_only_block_count + self.sub_blocks_only_block_count
        );
        Ok(())
    }
}

fn per(total: u64, count: u64) -> f64 {
    if count == 0 {
        0.0
    } else {
        total as f64 / count as f64
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "BlockTree stats for field {} of segment {}:", self.field, self.segment)?;
        writeln!(f, "  index FST:")?;
        writeln!(f, "    {} bytes", self.index_num_bytes)?;
        writeln!(f, "  terms:")?;
        writeln!(f, "    {} terms", self.total_term_count)?;
        writeln!(
            f,
            "    {} bytes ({:.1} bytes/term)",
            self.total_term_bytes,
            per(self.total_term_bytes, self.total_term_count)
        )?;
        writeln!(f, "  blocks:")?;
        writeln!(f, "    {} blocks", self.total_block_count)?;
        writeln!(f, "    {} terms-only blocks", self.terms_only_block_count)?;
        writeln!(f, "    {} sub-block-only blocks", self.sub_blocks_only_block_count)?;
        writeln!(f, "    {} mixed blocks", self.mixed_block_count)?;
        writeln!(f, "    {} floor blocks", self.floor_block_count)?;
        writeln!(f, "    {} non-floor blocks", self.non_floor_block_count)?;
        writeln!(f, "    {} floor sub-blocks", self.floor_sub_block_count)?;
        writeln!(
            f,
            "    {} term suffix bytes ({:.1} suffix-bytes/block)",
            self.total_block_suffix_bytes,
            per(self.total_block_suffix_bytes, self.total_block_count)
        )?;
        writeln!(
            f,
            "    {} term stats bytes ({:.1} stats-bytes/block)",
            self.total_block_stats_bytes,
            per(self.total_block_stats_bytes, self.total_block_count)
        )?;
        writeln!(
            f,
            "    {} other bytes ({:.1} other-bytes/block)",
            self.total_block_other_bytes,
            per(self.total_block_other_bytes, self.total_block_count)
        )?;
        if self.total_block_count != 0 {
            writeln!(f, "    by prefix length:")?;
            for (prefix, count) in self.block_count_by_prefix_len.iter().enumerate() {
                if *count != 0 {
                    writeln!(f, "      {prefix:2}: {count}")?;
                }
            }
        }
        Ok(())
    }
}
