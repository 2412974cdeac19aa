//! # Transferbar - live progress for concurrent file transfers
//!
//! Transferbar renders one terminal progress line per running transfer.
//! Transfers write through a [`ByteCounter`](progress::ByteCounter), which
//! counts bytes even before a bar exists and hands the count over once the
//! [`ProgressView`](progress::ProgressView) attaches one. When a transfer
//! ends, its completion line replaces the bar for good.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::io::Write;
//! use transferbar::config::ViewConfig;
//! use transferbar::progress::{ByteCounter, ProgressView, TransferKind};
//!
//! let view = ProgressView::new(ViewConfig::default()).unwrap();
//!
//! let file = std::fs::File::create("/tmp/out.bin").unwrap();
//! let mut counter = ByteCounter::new(TransferKind::Upload, 1000, "out.bin", file);
//!
//! // Bytes written before the bar exists are buffered
//! counter.write_all(&[0u8; 100]).unwrap();
//! view.add_bar(&counter.handle());
//! counter.write_all(&[0u8; 900]).unwrap();
//!
//! counter.finalize("Upload complete (1000/1000)");
//! println!("{}", view.join().summary_line());
//! ```
//!
//! ## Running a batch
//!
//! ```no_run
//! use transferbar::config::{TransferOptions, ViewConfig};
//! use transferbar::fs::expand_inputs;
//! use transferbar::progress::ProgressView;
//! use transferbar::transfer::{run_transfers, TransferJob};
//! use std::path::{Path, PathBuf};
//!
//! let inputs = expand_inputs(&[PathBuf::from("./photos")]).unwrap();
//! let jobs: Vec<_> = inputs
//!     .iter()
//!     .map(|input| TransferJob::upload(input, Path::new("/srv/store")))
//!     .collect();
//!
//! let view = ProgressView::new(ViewConfig::default()).unwrap();
//! let results = run_transfers(&jobs, &view, &TransferOptions::default()).unwrap();
//! let summary = view.join();
//! assert_eq!(summary.bars, results.len());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod fs;
pub mod hash;
pub mod progress;
pub mod transfer;

// Re-export commonly used types
pub use config::{ChecksumPolicy, FileOrder, HashAlgorithm, TransferOptions, ViewConfig};
pub use error::{Result, TransferError};
pub use progress::{ByteCounter, CounterHandle, ProgressView, ProgressWidget, TransferKind};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for common usage
    //!
    //! ```no_run
    //! use transferbar::prelude::*;
    //! ```

    pub use crate::config::{ChecksumPolicy, FileOrder, HashAlgorithm, TransferOptions, ViewConfig};
    pub use crate::error::{Result, TransferError};
    pub use crate::fs::{expand_inputs, sort_inputs, InputFile};
    pub use crate::progress::{
        ByteCounter, CounterHandle, ProgressView, ProgressWidget, TransferKind, ViewSummary,
    };
    pub use crate::transfer::{run_transfers, TransferJob, TransferOutcome};
}
