//! The cancellable tree node and its cancellation cascade.

use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::mem;
use std::ptr;
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::context::{Context, ContextRef};
use crate::errors::ScopeError;
use crate::scope::link;
use crate::signal::Signal;

/// A callback type for end-of-scope notifications.
pub type CancelCallback = Box<dyn FnOnce(ScopeError) + Send>;

/// Registry entry identifying a child scope.
///
/// Compares and hashes by node address, so the registry is a set of node
/// identities, and the weak reference never keeps a child alive.
struct ChildId(Weak<ScopeCore>);

impl PartialEq for ChildId {
    fn eq(&self, other: &Self) -> bool {
        Weak::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for ChildId {}

impl Hash for ChildId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        ptr::hash(Weak::as_ptr(&self.0), state);
    }
}

/// Mutable half of a scope, guarded by the node's lock.
enum ScopeState {
    /// Live: children may register, callbacks accumulate, and a deadline
    /// alarm may be armed.
    Active {
        children: HashSet<ChildId>,
        callbacks: Vec<CancelCallback>,
        alarm: Option<AbortHandle>,
    },
    /// Ended: the cause is permanent and no further registration is
    /// accepted.
    Cancelled(ScopeError),
}

impl ScopeState {
    fn new() -> Self {
        Self::Active {
            children: HashSet::new(),
            callbacks: Vec::new(),
            alarm: None,
        }
    }
}

/// Shared node behind every cancellable context.
///
/// Children hold their parent strongly; parents hold children weakly through
/// the registry. A node locks only itself or its direct children, and
/// detaching locks only the parent, so lock acquisition always runs
/// parent-to-child and cannot deadlock.
pub(crate) struct ScopeCore {
    parent: ContextRef,
    deadline: Option<Instant>,
    state: Mutex<ScopeState>,
    /// End-of-scope sender, allocated on first observation or cancellation.
    signal: OnceLock<watch::Sender<bool>>,
    weak_self: Weak<ScopeCore>,
}

impl ScopeCore {
    pub(crate) fn new(parent: ContextRef, deadline: Option<Instant>) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            parent,
            deadline,
            state: Mutex::new(ScopeState::new()),
            signal: OnceLock::new(),
            weak_self: weak.clone(),
        })
    }

    /// Returns the terminal error, if the scope has ended.
    pub(crate) fn err(&self) -> Option<ScopeError> {
        match *self.state.lock() {
            ScopeState::Cancelled(err) => Some(err),
            ScopeState::Active { .. } => None,
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.err().is_some()
    }

    /// Returns this scope's signal, allocating it on first use.
    pub(crate) fn done_signal(&self) -> Signal {
        // Sampled before the init closure so no lock is held while the
        // channel is created; a concurrent cancel closes the sender right
        // after, whichever side allocated it.
        let cancelled = self.is_cancelled();
        let tx = self.signal.get_or_init(|| watch::channel(cancelled).0);
        Signal::new(tx.subscribe())
    }

    /// Closes the signal, allocating it pre-closed if nothing observed it
    /// yet.
    fn close_signal(&self) {
        let tx = self.signal.get_or_init(|| watch::channel(true).0);
        tx.send_replace(true);
    }

    /// Registers `child` while live, or reports the terminal error so the
    /// caller can cancel the child instead.
    pub(crate) fn add_child(&self, child: Weak<ScopeCore>) -> Result<(), ScopeError> {
        match &mut *self.state.lock() {
            ScopeState::Active { children, .. } => {
                children.insert(ChildId(child));
                Ok(())
            }
            ScopeState::Cancelled(err) => Err(*err),
        }
    }

    /// Removes `child`'s registration, if still present.
    pub(crate) fn remove_child(&self, child: &ScopeCore) {
        if let ScopeState::Active { children, .. } = &mut *self.state.lock() {
            children.remove(&ChildId(child.weak_self.clone()));
        }
    }

    /// Number of registered children.
    #[cfg(test)]
    pub(crate) fn child_count(&self) -> usize {
        match &*self.state.lock() {
            ScopeState::Active { children, .. } => children.len(),
            ScopeState::Cancelled(_) => 0,
        }
    }

    /// Stores the armed deadline alarm, aborting it instead if the scope
    /// already ended.
    pub(crate) fn store_alarm(&self, alarm: AbortHandle) {
        match &mut *self.state.lock() {
            ScopeState::Active { alarm: slot, .. } => *slot = Some(alarm),
            ScopeState::Cancelled(_) => alarm.abort(),
        }
    }

    /// Registers a callback to run when the scope ends, or runs it now if
    /// it already has.
    pub(crate) fn add_callback(&self, callback: CancelCallback) {
        let fire_now = match &mut *self.state.lock() {
            ScopeState::Active { callbacks, .. } => {
                callbacks.push(callback);
                None
            }
            ScopeState::Cancelled(err) => Some((callback, *err)),
        };
        if let Some((callback, err)) = fire_now {
            invoke_callback(callback, err);
        }
    }

    /// Cancels the scope with `err`, cascading to every registered child.
    ///
    /// Only the first call has effect; it detaches from the parent (when
    /// `remove_from_parent`) and fires accumulated callbacks after all
    /// locks are released. Repeat calls are no-ops.
    pub(crate) fn cancel(&self, remove_from_parent: bool, err: ScopeError) {
        let mut fired = Vec::new();
        let transitioned = self.cancel_locked(err, &mut fired);
        if transitioned && remove_from_parent {
            link::detach(&self.parent, self);
        }
        for (callback, cause) in fired {
            invoke_callback(callback, cause);
        }
    }

    /// Performs the terminal transition under this node's lock, then
    /// recursively cancels children still under it. Callbacks are collected
    /// into `fired` for the caller to run lock-free.
    fn cancel_locked(
        &self,
        err: ScopeError,
        fired: &mut Vec<(CancelCallback, ScopeError)>,
    ) -> bool {
        let mut state = self.state.lock();
        let (children, callbacks, alarm) = match &mut *state {
            ScopeState::Cancelled(_) => return false,
            ScopeState::Active {
                children,
                callbacks,
                alarm,
            } => (mem::take(children), mem::take(callbacks), alarm.take()),
        };
        *state = ScopeState::Cancelled(err);

        if let Some(alarm) = alarm {
            alarm.abort();
        }
        self.close_signal();
        debug!(cause = %err, "scope cancelled");

        fired.extend(callbacks.into_iter().map(|callback| (callback, err)));

        // Children are cancelled while this node's lock is still held, so a
        // child registered here is always covered; locks only ever nest
        // parent-over-child on an acyclic tree.
        for child in children {
            if let Some(core) = child.0.upgrade() {
                core.cancel_locked(err, fired);
            }
        }
        true
    }
}

impl Context for ScopeCore {
    fn deadline(&self) -> Option<Instant> {
        self.deadline.or_else(|| self.parent.deadline())
    }

    fn done(&self) -> Option<Signal> {
        Some(self.done_signal())
    }

    fn err(&self) -> Option<ScopeError> {
        ScopeCore::err(self)
    }

    fn value(&self, key: &str) -> Option<Value> {
        self.parent.value(key)
    }

    fn cancel_scope(&self) -> Option<CancelScope> {
        self.weak_self.upgrade().map(|core| CancelScope { core })
    }
}

impl Drop for ScopeCore {
    fn drop(&mut self) {
        // A cancelled scope already detached and released its alarm; a
        // still-live one leaving scope must not linger in the parent's
        // registry or keep its alarm task sleeping.
        let live = match self.state.get_mut() {
            ScopeState::Active { alarm, .. } => {
                if let Some(alarm) = alarm.take() {
                    alarm.abort();
                }
                true
            }
            ScopeState::Cancelled(_) => false,
        };
        if live {
            link::detach(&self.parent, self);
        }
    }
}

impl fmt::Debug for ScopeCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelScope")
            .field("cancelled", &self.is_cancelled())
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

/// Handle to the cancellable scope backing a context.
///
/// Obtained through [`Context::cancel_scope`]; lets observers inspect a
/// scope directly and register end-of-scope callbacks without going through
/// the capability interface.
#[derive(Clone)]
pub struct CancelScope {
    pub(crate) core: Arc<ScopeCore>,
}

impl CancelScope {
    /// Returns whether the scope has ended.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.core.is_cancelled()
    }

    /// Returns the terminal error, if the scope has ended.
    #[must_use]
    pub fn err(&self) -> Option<ScopeError> {
        self.core.err()
    }

    /// Returns the end-of-scope signal.
    #[must_use]
    pub fn done(&self) -> Signal {
        self.core.done_signal()
    }

    /// Completes when the scope ends.
    pub async fn cancelled(&self) {
        self.done().closed().await;
    }

    /// Registers a callback to be invoked with the terminal error when the
    /// scope ends.
    ///
    /// If already cancelled, the callback is invoked immediately. Callbacks
    /// run outside all internal locks; panics are logged and suppressed.
    pub fn on_cancelled<F>(&self, callback: F)
    where
        F: FnOnce(ScopeError) + Send + 'static,
    {
        self.core.add_callback(Box::new(callback));
    }

    /// Returns this scope as a context, e.g. to derive further children
    /// from it.
    #[must_use]
    pub fn context(&self) -> ContextRef {
        self.core.clone()
    }
}

impl fmt::Debug for CancelScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.core, f)
    }
}

/// Runs an end-of-scope callback, suppressing panics so one callback cannot
/// poison the cascade.
fn invoke_callback(callback: CancelCallback, err: ScopeError) {
    if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        callback(err);
    })) {
        warn!("Cancellation callback panicked: {:?}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::background;

    fn fresh_core() -> Arc<ScopeCore> {
        ScopeCore::new(background(), None)
    }

    #[test]
    fn test_core_starts_live() {
        let core = fresh_core();
        assert!(!core.is_cancelled());
        assert!(core.err().is_none());
        assert!(!core.done_signal().is_closed());
    }

    #[test]
    fn test_cancel_records_first_cause() {
        let core = fresh_core();
        core.cancel(true, ScopeError::Cancelled);
        core.cancel(true, ScopeError::DeadlineExceeded);

        assert_eq!(core.err(), Some(ScopeError::Cancelled));
        assert!(core.done_signal().is_closed());
    }

    #[test]
    fn test_signal_allocated_pre_closed_after_cancel() {
        let core = fresh_core();
        core.cancel(true, ScopeError::DeadlineExceeded);

        // First observation happens after the end of the scope.
        assert!(core.done_signal().is_closed());
    }

    #[test]
    fn test_registry_is_an_identity_set() {
        let parent = fresh_core();
        let child = fresh_core();

        assert!(parent.add_child(Arc::downgrade(&child)).is_ok());
        assert!(parent.add_child(Arc::downgrade(&child)).is_ok());
        assert_eq!(parent.child_count(), 1);

        parent.remove_child(&child);
        assert_eq!(parent.child_count(), 0);
    }

    #[test]
    fn test_add_child_after_cancel_reports_cause() {
        let parent = fresh_core();
        let child = fresh_core();
        parent.cancel(true, ScopeError::DeadlineExceeded);

        assert_eq!(
            parent.add_child(Arc::downgrade(&child)),
            Err(ScopeError::DeadlineExceeded)
        );
    }

    #[test]
    fn test_callback_after_cancel_fires_immediately() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let core = fresh_core();
        core.cancel(true, ScopeError::Cancelled);

        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();
        core.add_callback(Box::new(move |_| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        }));

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancel_scope_capability_round_trip() {
        let core = fresh_core();
        let ctx: ContextRef = core.clone();

        let scope = ctx.cancel_scope().unwrap();
        assert!(!scope.is_cancelled());

        core.cancel(true, ScopeError::Cancelled);
        assert!(scope.is_cancelled());
        assert_eq!(scope.err(), Some(ScopeError::Cancelled));
    }

    #[test]
    fn test_debug_reports_liveness() {
        let core = fresh_core();
        assert!(format!("{core:?}").contains("cancelled: false"));

        core.cancel(true, ScopeError::Cancelled);
        assert!(format!("{core:?}").contains("cancelled: true"));
    }
}
