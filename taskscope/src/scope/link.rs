//! Linking freshly derived scopes to their nearest cancellable ancestor.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::context::ContextRef;
use crate::errors::ScopeError;
use crate::scope::cancel::ScopeCore;
use crate::signal::Signal;

/// Links a freshly built `child` to `parent`.
///
/// Three cases: a cancellable ancestor of ours, possibly behind value
/// bindings, takes a registry entry; a context that can never end needs no
/// link at all; anything else is an opaque cancellable source bridged by a
/// watcher task.
pub(crate) fn attach(parent: &ContextRef, child: &Arc<ScopeCore>) {
    if let Some(ancestor) = parent.cancel_scope() {
        if let Err(err) = ancestor.core.add_child(Arc::downgrade(child)) {
            // The ancestor ended before registration; the child was never
            // registered, so there is nothing to detach.
            child.cancel(false, err);
        }
        return;
    }
    let Some(parent_done) = parent.done() else {
        return;
    };
    if let Some(err) = parent.err() {
        child.cancel(false, err);
        return;
    }
    spawn_watcher(parent.clone(), parent_done, child);
}

/// Unregisters `child` from the nearest cancellable ancestor, if any.
///
/// Only the ancestor's lock is taken; callers must not hold the child's.
pub(crate) fn detach(parent: &ContextRef, child: &ScopeCore) {
    if let Some(ancestor) = parent.cancel_scope() {
        ancestor.core.remove_child(child);
    }
}

/// Bridges cancellation from an opaque parent into `child`.
///
/// The task holds the child only weakly and exits as soon as either side
/// ends or the child is dropped, so the bridge never outlives the scopes it
/// links.
fn spawn_watcher(parent: ContextRef, parent_done: Signal, child: &Arc<ScopeCore>) {
    let child_done = child.done_signal();
    let child = Arc::downgrade(child);
    debug!(parent = ?parent, "bridging cancellation from opaque parent");
    tokio::spawn(async move {
        tokio::select! {
            () = parent_done.closed() => {
                if let Some(core) = child.upgrade() {
                    let err = parent.err().unwrap_or_else(|| {
                        warn!("Opaque parent closed without recording an error");
                        ScopeError::Cancelled
                    });
                    core.cancel(false, err);
                }
            }
            () = child_done.closed_or_lost() => {}
        }
    });
}
