//! Utility modules.

pub mod fst;
pub mod varint;

// Re-export commonly used types
pub use varint::*;
