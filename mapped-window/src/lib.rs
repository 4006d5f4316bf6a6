//! Windowed memory-mapped line access for large, line-delimited files.
//!
//! A [`MappedWindow`] keeps a page-aligned mapping over a bounded slice of a file and
//! walks it one line at a time. When the cursor runs off the end of the current window
//! and the caller asks for extension, the window is released and the next slice is
//! mapped in its place, so arbitrarily large files can be streamed with a fixed
//! address-space budget.
//!
//! The crate exposes:
//! - [`MappedWindow`]: the window itself (reads by copy, by borrowed [`LineView`], or by
//!   checked [`LineSpan`]; line writes with doubling growth).
//! - [`WindowError`] / [`WindowErrorKind`]: failures and the copyable code kept as the
//!   window's last error.
//! - [`page_size`]: the system page size every window start is aligned to.

pub mod error;
pub mod line;
pub mod page;
pub mod window;

pub use error::{Result, WindowError, WindowErrorKind, WriteFailure};
pub use line::{LineSpan, LineView};
pub use page::page_size;
pub use window::{MappedWindow, OpenMode};
