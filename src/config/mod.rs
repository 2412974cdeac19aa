//! Configuration module for transferbar
//!
//! Provides CLI arguments, transfer policies and the fixed render
//! settings of the progress view.

mod settings;

pub use settings::*;
