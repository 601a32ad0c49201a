//! Block-tree term dictionary with term ordinals.
//!
//! Terms of a field are grouped into blocks that share a prefix. Every block
//! has at most `max_items_in_block` entries; an entry is a term or a pointer
//! to a child block with a longer prefix. Prefixes with too many entries are
//! split into a chain of floor blocks keyed by the next suffix byte. Only the
//! first block of each chain is indexed, in a per-field FST mapping the block
//! prefix to an [`Output`] that carries the block's file pointer, its floor
//! table and the range of term ordinals below it. That range is what makes
//! [`TermsEnum::seek_exact_ord`](crate::lexical::core::terms::TermsEnum::seek_exact_ord)
//! and [`TermsEnum::ord`](crate::lexical::core::terms::TermsEnum::ord) cheap.
//!
//! Two files are written per segment: the block file (`.tio`) holding the
//! block bodies plus the per-field summaries, and the index file (`.tipo`)
//! holding the FSTs.

mod config;
mod frame;
mod intersect;
mod output;
mod reader;
mod segment_enum;
mod stats;
mod writer;

pub use config::{BlockTreeConfig, ReaderOptions};
pub use intersect::IntersectTermsEnum;
pub use output::Output;
pub use reader::{BlockTreeTermsReader, FieldReader};
pub use segment_enum::SegmentTermsEnum;
pub use stats::Stats;
pub use writer::{BlockTreeTermsWriter, TermsWriter};

/// Codec name of the block file.
pub const TERMS_CODEC_NAME: &str = "BlockTreeOrdsTermsDict";

/// Codec name of the index file.
pub const TERMS_INDEX_CODEC_NAME: &str = "BlockTreeOrdsTermsIndex";

pub const VERSION_START: i32 = 1;
pub const VERSION_CURRENT: i32 = VERSION_START;

/// Extension of the block file.
pub const TERMS_EXTENSION: &str = "tio";

/// Extension of the index file.
pub const TERMS_INDEX_EXTENSION: &str = "tipo";

pub const DEFAULT_MIN_BLOCK_SIZE: usize = 25;
pub const DEFAULT_MAX_BLOCK_SIZE: usize = 48;

pub(crate) const OUTPUT_FLAGS_NUM_BITS: u32 = 2;
pub(crate) const OUTPUT_FLAG_IS_FLOOR: u64 = 0x1;
pub(crate) const OUTPUT_FLAG_HAS_TERMS: u64 = 0x2;

/// Pack a block file pointer with its flags into the leading vlong of an
/// index output.
pub(crate) fn encode_output(fp: u64, has_terms: bool, is_floor: bool) -> u64 {
    (fp << OUTPUT_FLAGS_NUM_BITS)
        | if has_terms { OUTPUT_FLAG_HAS_TERMS } else { 0 }
        | if is_floor { OUTPUT_FLAG_IS_FLOOR } else { 0 }
}
