//! Checksum module
//!
//! Streaming SHA-256, BLAKE3 and XXHash3 hashing for verifying transfers.

mod integrity;

pub use integrity::*;
