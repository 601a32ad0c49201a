//! # blocktree-ords
//!
//! A block-tree term dictionary that can address terms by ordinal.
//!
//! ## Features
//!
//! - Prefix-compressed term blocks indexed by an FST
//! - Seek by term, seek by ceiling and seek by ordinal
//! - Automaton intersection for wildcard and fuzzy term enumeration
//! - Checksummed files on pluggable storage backends
//! - Per-field block statistics

pub mod cli;
pub mod error;
pub mod lexical;
pub mod storage;
pub mod util;

pub mod prelude {
    pub use crate::error::{BlockTreeError, Result};
    pub use crate::lexical::core::automaton::{Automaton, CompiledAutomaton};
    pub use crate::lexical::core::terms::{SeekStatus, Terms, TermsEnum};
    pub use crate::lexical::index::blocktree::{
        BlockTreeConfig, BlockTreeTermsReader, BlockTreeTermsWriter, FieldReader, ReaderOptions,
    };
    pub use crate::storage::{FileStorage, MemoryStorage, Storage};
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
