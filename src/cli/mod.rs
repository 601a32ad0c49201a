//! Command line interface for building and inspecting block-tree segments.

pub mod args;
pub mod commands;
pub mod output;

pub use args::*;
pub use commands::*;
pub use output::*;
