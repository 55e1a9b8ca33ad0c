//! Testing utilities for code consuming the capability interface.
//!
//! This module provides:
//! - [`StubContext`], a configurable context implemented outside the scope
//!   tree, for exercising consumers against foreign cancellation sources

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::context::{Context, ContextRef};
use crate::errors::ScopeError;
use crate::signal::Signal;

/// A configurable foreign context.
///
/// Implements [`Context`] without being backed by a
/// [`CancelScope`](crate::scope::CancelScope), so scopes derived from it
/// take the watcher path - the same path contexts from outside this crate
/// take. Cancel it with [`cancel`](Self::cancel) to simulate the foreign
/// source ending.
pub struct StubContext {
    deadline: Option<Instant>,
    values: HashMap<String, Value>,
    err: Mutex<Option<ScopeError>>,
    closed: watch::Sender<bool>,
}

impl StubContext {
    /// Creates an open stub with no deadline and no values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            deadline: None,
            values: HashMap::new(),
            err: Mutex::new(None),
            closed: watch::channel(false).0,
        }
    }

    /// Sets the reported deadline.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Adds a value binding.
    #[must_use]
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Wraps the stub into a shareable context handle.
    #[must_use]
    pub fn into_context(self) -> ContextRef {
        Arc::new(self)
    }

    /// Ends the stub with `err` and closes its signal.
    ///
    /// This is idempotent - only the first cause is kept.
    pub fn cancel(&self, err: ScopeError) {
        let mut slot = self.err.lock();
        if slot.is_none() {
            *slot = Some(err);
            self.closed.send_replace(true);
        }
    }
}

impl Default for StubContext {
    fn default() -> Self {
        Self::new()
    }
}

impl Context for StubContext {
    fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    fn done(&self) -> Option<Signal> {
        Some(Signal::new(self.closed.subscribe()))
    }

    fn err(&self) -> Option<ScopeError> {
        *self.err.lock()
    }

    fn value(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }
}

impl fmt::Debug for StubContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StubContext")
            .field("err", &self.err())
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}
