//! Transfer module
//!
//! Drives concurrent uploads and downloads between local paths and a store
//! directory, reporting through the progress view.

mod driver;

pub use driver::*;
