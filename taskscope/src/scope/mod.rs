//! Cancellable scopes: derivation, deadlines, and the cancellation cascade.
//!
//! This module provides:
//! - [`with_cancel`] for scopes ended explicitly through a [`CancelHandle`]
//! - [`with_deadline`] and [`with_timeout`] for deadline-armed scopes
//! - [`CancelScope`], the capability token backing cancellable contexts

mod cancel;
mod handle;
mod link;
mod timer;

pub use cancel::{CancelCallback, CancelScope};
pub use handle::{with_cancel, CancelHandle};
pub use timer::{with_deadline, with_timeout};
