//! Lexical term dictionary.
//!
//! `core` holds the enumeration API and the automata used to intersect with
//! it; `index` holds the on-disk structures of a segment.

pub mod core;
pub mod index;
