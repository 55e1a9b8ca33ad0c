//! Immutable key/value bindings layered over a parent context.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tokio::time::Instant;

use crate::context::{Context, ContextRef};
use crate::errors::ScopeError;
use crate::scope::CancelScope;
use crate::signal::Signal;

/// Context wrapper binding a single key/value pair.
struct ValueContext {
    parent: ContextRef,
    key: String,
    value: Value,
}

impl Context for ValueContext {
    fn deadline(&self) -> Option<Instant> {
        self.parent.deadline()
    }

    fn done(&self) -> Option<Signal> {
        self.parent.done()
    }

    fn err(&self) -> Option<ScopeError> {
        self.parent.err()
    }

    fn value(&self, key: &str) -> Option<Value> {
        if key == self.key {
            Some(self.value.clone())
        } else {
            self.parent.value(key)
        }
    }

    fn cancel_scope(&self) -> Option<CancelScope> {
        self.parent.cancel_scope()
    }
}

impl fmt::Debug for ValueContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueContext")
            .field("key", &self.key)
            .field("parent", &self.parent)
            .finish_non_exhaustive()
    }
}

/// Derives a context carrying a single key/value binding.
///
/// The binding does not affect cancellation: deadline, signal, and error all
/// mirror `parent`. Lookups walk towards the root and return the nearest
/// binding on exact key match, so rebinding a key shadows the ancestor's
/// value.
///
/// # Examples
///
/// ```
/// use taskscope::prelude::*;
///
/// let ctx = with_value(&background(), "request_id", "r-42");
/// assert_eq!(ctx.value("request_id"), Some("r-42".into()));
/// assert_eq!(ctx.value("other"), None);
/// ```
#[must_use]
pub fn with_value(
    parent: &ContextRef,
    key: impl Into<String>,
    value: impl Into<Value>,
) -> ContextRef {
    Arc::new(ValueContext {
        parent: parent.clone(),
        key: key.into(),
        value: value.into(),
    })
}
