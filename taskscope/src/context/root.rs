//! Root contexts that anchor every scope tree.

use std::fmt;
use std::sync::{Arc, OnceLock};

use serde_json::Value;
use tokio::time::Instant;

use crate::context::{Context, ContextRef};
use crate::errors::ScopeError;
use crate::signal::Signal;

/// Terminal context with no deadline, no values, and no cancellation.
struct RootContext {
    name: &'static str,
}

impl Context for RootContext {
    fn deadline(&self) -> Option<Instant> {
        None
    }

    fn done(&self) -> Option<Signal> {
        None
    }

    fn err(&self) -> Option<ScopeError> {
        None
    }

    fn value(&self, _key: &str) -> Option<Value> {
        None
    }
}

impl fmt::Debug for RootContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Returns the process-wide background context.
///
/// The conventional root of a scope tree: never cancelled, never expires,
/// carries no values. Repeated calls return the same instance.
#[must_use]
pub fn background() -> ContextRef {
    static BACKGROUND: OnceLock<ContextRef> = OnceLock::new();
    BACKGROUND
        .get_or_init(|| Arc::new(RootContext { name: "Background" }))
        .clone()
}

/// Returns the process-wide placeholder context.
///
/// Behaves exactly like [`background`] but is a distinct instance, for call
/// sites that have not yet decided which context they should receive.
#[must_use]
pub fn todo() -> ContextRef {
    static TODO: OnceLock<ContextRef> = OnceLock::new();
    TODO.get_or_init(|| Arc::new(RootContext { name: "TODO" }))
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roots_are_singletons() {
        assert!(Arc::ptr_eq(&background(), &background()));
        assert!(Arc::ptr_eq(&todo(), &todo()));
    }

    #[test]
    fn test_roots_are_distinct() {
        assert!(!Arc::ptr_eq(&background(), &todo()));
    }

    #[test]
    fn test_roots_have_no_capabilities() {
        for root in [background(), todo()] {
            assert!(root.deadline().is_none());
            assert!(root.done().is_none());
            assert!(root.err().is_none());
            assert!(root.value("anything").is_none());
            assert!(root.cancel_scope().is_none());
        }
    }

    #[test]
    fn test_root_debug_names() {
        assert_eq!(format!("{:?}", background()), "Background");
        assert_eq!(format!("{:?}", todo()), "TODO");
    }
}
