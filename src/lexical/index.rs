//! Per-segment index structures.

pub mod blocktree;
pub mod field;
pub mod postings;
pub mod segment;
