//! # Taskscope
//!
//! Hierarchical cancellation scopes with deadline propagation for async
//! tasks.
//!
//! A unit of work derives a tree of scopes from a root context. Cancelling
//! any scope ends every scope below it, deadlines turn into cancellations on
//! their own, and immutable key/value bindings ride along for passthrough
//! metadata. Cancellation is cooperative: tasks observe an end-of-scope
//! signal and wind down themselves; nothing is interrupted.
//!
//! - **Cancellation trees**: derive children with `with_cancel`, end a whole
//!   subtree through one idempotent handle
//! - **Deadlines**: `with_deadline` and `with_timeout` scopes end themselves
//!   at the given instant, and an earlier explicit cancel wins
//! - **First cause wins**: a scope records exactly one terminal error, which
//!   never changes afterwards
//! - **Value bindings**: `with_value` attaches metadata readable anywhere
//!   down the tree without affecting cancellation
//! - **Foreign parents**: anything implementing `Context` can parent a
//!   scope; cancellation is bridged in by a watcher task
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use taskscope::prelude::*;
//!
//! let (ctx, handle) = with_timeout(&background(), Duration::from_secs(30));
//!
//! tokio::select! {
//!     () = ctx.cancelled() => {
//!         // Deadline hit, or an ancestor was cancelled.
//!     }
//!     result = do_work() => {
//!         handle.cancel(); // Release the subtree early.
//!     }
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, missing_docs, rust_2018_idioms)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod context;
pub mod errors;
pub mod scope;
pub mod signal;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::context::{background, todo, with_value, Context, ContextExt, ContextRef};
    pub use crate::errors::ScopeError;
    pub use crate::scope::{with_cancel, with_deadline, with_timeout, CancelHandle, CancelScope};
    pub use crate::signal::Signal;
}
