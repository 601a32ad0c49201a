//! Storage abstraction layer.
//!
//! Named files with random-access inputs, a file system and a memory
//! backend, primitive data encodings and the header/footer integrity
//! framework shared by every file the term dictionary writes.

pub mod checksum;
pub mod data;
pub mod file;
pub mod memory;
pub mod traits;

// Re-export commonly used types
pub use checksum::*;
pub use data::*;
pub use file::*;
pub use memory::*;
pub use traits::*;
