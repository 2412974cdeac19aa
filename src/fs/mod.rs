//! File system helpers
//!
//! Input expansion, ordering and output path resolution for transfers.

mod inputs;

pub use inputs::*;
