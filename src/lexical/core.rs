//! Core term dictionary abstractions.
//!
//! - [`terms`]: the `Terms`/`TermsEnum` enumeration API
//! - [`automaton`]: byte automata compiled for dictionary intersection

pub mod automaton;
pub mod terms;
