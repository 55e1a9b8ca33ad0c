//! Deadline-armed scopes.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep_until, Instant};
use tracing::debug;

use crate::context::ContextRef;
use crate::errors::ScopeError;
use crate::scope::cancel::ScopeCore;
use crate::scope::handle::CancelHandle;
use crate::scope::link;

/// Derives a child scope that is cancelled automatically at `deadline`.
///
/// A deadline not in the future yields an already-ended scope with
/// [`ScopeError::DeadlineExceeded`]. The scope may still end earlier
/// through the handle or an ancestor; any cancellation releases the pending
/// alarm, so an expired timer never overwrites an explicit cancel.
///
/// Must be called within a tokio runtime - the alarm runs as a spawned
/// task.
#[must_use]
pub fn with_deadline(parent: &ContextRef, deadline: Instant) -> (ContextRef, CancelHandle) {
    let core = ScopeCore::new(parent.clone(), Some(deadline));
    link::attach(parent, &core);
    if deadline <= Instant::now() {
        core.cancel(true, ScopeError::DeadlineExceeded);
    } else if !core.is_cancelled() {
        arm_alarm(&core, deadline);
    }
    let ctx: ContextRef = core.clone();
    (ctx, CancelHandle::new(core))
}

/// Derives a child scope that is cancelled automatically after `timeout`.
///
/// Shorthand for [`with_deadline`] at `Instant::now() + timeout`; a zero
/// timeout yields an already-ended scope.
#[must_use]
pub fn with_timeout(parent: &ContextRef, timeout: Duration) -> (ContextRef, CancelHandle) {
    with_deadline(parent, Instant::now() + timeout)
}

/// Spawns the one-shot alarm task and stores its abort handle on the scope.
///
/// The task holds the scope only weakly, so an abandoned scope is not kept
/// alive until its deadline.
fn arm_alarm(core: &Arc<ScopeCore>, deadline: Instant) {
    let weak = Arc::downgrade(core);
    let task = tokio::spawn(async move {
        sleep_until(deadline).await;
        if let Some(core) = weak.upgrade() {
            debug!("deadline elapsed, ending scope");
            core.cancel(true, ScopeError::DeadlineExceeded);
        }
    });
    core.store_alarm(task.abort_handle());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::background;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_fires_once_elapsed() {
        let (ctx, _handle) =
            with_deadline(&background(), Instant::now() + Duration::from_millis(50));
        assert!(ctx.err().is_none());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(ctx.err(), Some(ScopeError::DeadlineExceeded));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_deadline_from_now() {
        let (ctx, _handle) = with_timeout(&background(), Duration::from_secs(2));
        assert_eq!(ctx.deadline(), Some(Instant::now() + Duration::from_secs(2)));
    }

    #[tokio::test]
    async fn test_past_deadline_yields_ended_scope() {
        let (ctx, _handle) =
            with_deadline(&background(), Instant::now() - Duration::from_millis(10));
        assert_eq!(ctx.err(), Some(ScopeError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_zero_timeout_yields_ended_scope() {
        let (ctx, _handle) = with_timeout(&background(), Duration::ZERO);
        assert_eq!(ctx.err(), Some(ScopeError::DeadlineExceeded));
    }
}
