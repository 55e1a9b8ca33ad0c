//! The capability interface shared by every node in a scope tree.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tokio::time::Instant;

use crate::errors::ScopeError;
use crate::scope::CancelScope;
use crate::signal::Signal;

/// Observation surface of a node in the cancellation tree.
///
/// Consumers receive a [`ContextRef`] and interact with it only through this
/// trait: inspect the effective deadline, wait on the end-of-scope
/// [`Signal`], read the terminal error, and look up value bindings.
/// All methods are safe to call concurrently.
pub trait Context: Send + Sync + fmt::Debug {
    /// Returns the deadline in effect for this node, if any.
    ///
    /// A node without its own deadline reports the nearest ancestor's.
    fn deadline(&self) -> Option<Instant>;

    /// Returns the end-of-scope signal, or `None` if this context can never
    /// be cancelled.
    fn done(&self) -> Option<Signal>;

    /// Returns the terminal error once the context has ended, `None` while
    /// it is still live.
    fn err(&self) -> Option<ScopeError>;

    /// Looks up `key` from this node towards the root, returning the
    /// nearest binding.
    fn value(&self, key: &str) -> Option<Value>;

    /// Returns the cancellable scope backing this context, if there is one.
    ///
    /// Value bindings delegate to their parent; roots and implementations
    /// from outside this crate answer `None`. This is how newly derived
    /// scopes find their nearest cancellable ancestor without inspecting
    /// concrete types.
    fn cancel_scope(&self) -> Option<CancelScope> {
        None
    }
}

/// A shared handle to a node in the cancellation tree.
pub type ContextRef = Arc<dyn Context>;

/// Convenience methods over [`ContextRef`].
pub trait ContextExt {
    /// Completes when the context ends.
    ///
    /// Never completes for contexts that cannot be cancelled.
    fn cancelled(&self) -> impl Future<Output = ()> + Send + '_;

    /// Returns whether the context has ended.
    fn is_cancelled(&self) -> bool;
}

impl ContextExt for ContextRef {
    fn cancelled(&self) -> impl Future<Output = ()> + Send + '_ {
        async move {
            match self.done() {
                Some(signal) => signal.closed().await,
                None => std::future::pending().await,
            }
        }
    }

    fn is_cancelled(&self) -> bool {
        self.err().is_some()
    }
}
