//! Error types for the taskscope library.
//!
//! A scope that has ended always reports exactly one of these causes, and
//! the cause never changes afterwards.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The terminal cause of a cancelled scope.
///
/// Recording is idempotent - only the first cause is kept, whether it came
/// from an explicit cancel, an elapsed deadline, or an ancestor's cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeError {
    /// The scope was cancelled explicitly through its handle or by an
    /// ancestor that was.
    #[error("scope cancelled")]
    Cancelled,

    /// The scope's deadline elapsed before any explicit cancellation.
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

impl ScopeError {
    /// Returns whether the cause was an explicit cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns whether the cause was an elapsed deadline.
    #[must_use]
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, Self::DeadlineExceeded)
    }
}
