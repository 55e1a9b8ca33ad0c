//! Deriving cancellable scopes and the handle that ends them.

use std::fmt;
use std::sync::Arc;

use crate::context::ContextRef;
use crate::errors::ScopeError;
use crate::scope::cancel::ScopeCore;
use crate::scope::link;

/// Cancels its scope when invoked.
///
/// Cloneable and thread-safe; every clone addresses the same scope, and
/// only the first cancellation from any source takes effect. Dropping the
/// handle does not cancel the scope.
#[derive(Clone)]
pub struct CancelHandle {
    core: Arc<ScopeCore>,
}

impl CancelHandle {
    pub(crate) fn new(core: Arc<ScopeCore>) -> Self {
        Self { core }
    }

    /// Cancels the scope and all its descendants with
    /// [`ScopeError::Cancelled`].
    ///
    /// This is idempotent - repeat calls, and calls after the scope already
    /// ended for another reason, are no-ops.
    pub fn cancel(&self) {
        self.core.cancel(true, ScopeError::Cancelled);
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHandle")
            .field("cancelled", &self.core.is_cancelled())
            .finish()
    }
}

/// Derives a cancellable child scope from `parent`.
///
/// The child ends when the returned handle is invoked or when `parent`
/// ends, whichever happens first. If `parent` is an opaque cancellable
/// context from outside this crate, the link is bridged by a watcher task,
/// which requires a tokio runtime.
///
/// # Examples
///
/// ```
/// use taskscope::prelude::*;
///
/// let (ctx, handle) = with_cancel(&background());
/// assert!(ctx.err().is_none());
///
/// handle.cancel();
/// assert_eq!(ctx.err(), Some(ScopeError::Cancelled));
/// ```
#[must_use]
pub fn with_cancel(parent: &ContextRef) -> (ContextRef, CancelHandle) {
    let core = ScopeCore::new(parent.clone(), None);
    link::attach(parent, &core);
    let ctx: ContextRef = core.clone();
    (ctx, CancelHandle::new(core))
}
