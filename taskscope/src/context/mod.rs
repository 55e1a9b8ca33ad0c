//! Context capabilities for scope trees.
//!
//! This module provides:
//! - The [`Context`] capability trait and [`ContextRef`] shared handle
//! - [`background`] and [`todo`] root contexts
//! - [`with_value`] for passthrough key/value bindings

mod capability;
mod root;
mod value;

pub use capability::{Context, ContextExt, ContextRef};
pub use root::{background, todo};
pub use value::with_value;
