//! Progress reporting module
//!
//! Turns the bytes flowing through concurrent transfers into live terminal
//! progress lines:
//! - [`ByteCounter`] counts bytes on their way to or from a stream
//! - [`ProgressWidget`] is one live line bound to a transfer's size
//! - [`ProgressView`] renders all widgets from a single loop

mod counter;
mod view;
mod widget;

pub use counter::{ByteCounter, CounterHandle, TransferKind};
pub use view::{ProgressView, ViewSummary};
pub use widget::{truncate_name, ProgressWidget, RenderState};
