//! Timeout guard: races a task's work against an absolute deadline.

use crate::cancellation::{CancelReason, Task};
use crate::core::Outcome;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

/// Default timeout when the caller supplies none (or zero).
pub const DEFAULT_TIMEOUT_UNITS: i64 = 10;

/// An absolute point in time derived from a requested duration at the
/// moment the guard starts. Immutable once computed.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// Computes a deadline `units` milliseconds from now.
    #[must_use]
    pub fn after_units(units: i64) -> Self {
        let millis = u64::try_from(units).unwrap_or(0);
        Self {
            at: Instant::now() + Duration::from_millis(millis),
        }
    }

    /// The instant the deadline expires.
    #[must_use]
    pub fn instant(&self) -> Instant {
        self.at
    }
}

/// Normalizes a requested duration: absent or zero selects the default,
/// anything else is taken literally (negative means already expired).
#[must_use]
pub fn effective_units(requested: Option<i64>) -> i64 {
    match requested {
        None | Some(0) => DEFAULT_TIMEOUT_UNITS,
        Some(units) => units,
    }
}

/// Races `work` against a deadline under `task`'s cancellation domain.
///
/// Whichever finishes first wins. If `work` completes first the timer is
/// disarmed and its outcome is returned untouched; no late cancellation.
/// If the timer fires first, `Timeout` cancellation is requested and
/// `work` is awaited to completion so every suspension point in the
/// subtree unwinds before the `Cancelled` outcome is returned. The caller
/// never blocks indefinitely and never sees the timeout as an error.
///
/// A negative duration counts as already expired: cancellation is
/// requested before `work` is first polled.
pub async fn run_with_timeout<T, F>(task: &Arc<Task>, requested: Option<i64>, work: F) -> Outcome<T>
where
    F: Future<Output = Outcome<T>>,
{
    let units = effective_units(requested);
    info!(timeout_units = units, "timeout {} units", units);

    if units < 0 {
        task.request_cancel(CancelReason::Timeout);
        let drained = work.await;
        task.finish_cancelled();
        return cancelled_outcome(drained);
    }

    let deadline = Deadline::after_units(units);
    tokio::pin!(work);

    tokio::select! {
        biased;
        outcome = &mut work => {
            match &outcome {
                Outcome::Completed(_) => task.complete(),
                Outcome::Cancelled(_) => task.finish_cancelled(),
                Outcome::Failed(_) => task.fail(),
            }
            outcome
        }
        () = tokio::time::sleep_until(deadline.instant()) => {
            task.request_cancel(CancelReason::Timeout);
            // Wait for the subtree to unwind; the work's own outcome is
            // suppressed unless it already carries a cancellation reason.
            let drained = work.await;
            task.finish_cancelled();
            cancelled_outcome(drained)
        }
    }
}

fn cancelled_outcome<T>(drained: Outcome<T>) -> Outcome<T> {
    match drained {
        Outcome::Cancelled(reason) => Outcome::Cancelled(reason),
        _ => Outcome::Cancelled(CancelReason::Timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::TaskState;
    use crate::errors::CallguardError;
    use std::time::Duration;

    async fn delayed_result(units: u64) -> Result<&'static str, CallguardError> {
        tokio::time::sleep(Duration::from_millis(units)).await;
        Ok("Completed request")
    }

    #[test]
    fn test_effective_units_defaults() {
        assert_eq!(effective_units(None), 10);
        assert_eq!(effective_units(Some(0)), 10);
        assert_eq!(effective_units(Some(250)), 250);
        assert_eq!(effective_units(Some(-1)), -1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_work_faster_than_deadline_completes() {
        let task = Task::root();
        let work = {
            let task = task.clone();
            async move { task.run_cancellable(async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Ok("Completed request")
            }).await }
        };

        let outcome = run_with_timeout(&task, Some(1000), work).await;

        assert!(matches!(outcome, Outcome::Completed("Completed request")));
        assert_eq!(task.state(), TaskState::Completed);
        assert!(!task.token().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_first_cancels_with_timeout_reason() {
        let task = Task::root();
        let work = {
            let task = task.clone();
            async move { task.run_cancellable(async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Ok("too late")
            }).await }
        };

        let started = Instant::now();
        let outcome = run_with_timeout(&task, Some(10), work).await;

        assert_eq!(outcome.cancel_reason(), Some(CancelReason::Timeout));
        assert_eq!(task.state(), TaskState::Cancelled);
        // Observed within a small bounded delta of the deadline.
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_duration_uses_default() {
        let task = Task::root();
        let work = {
            let task = task.clone();
            async move { task.run_cancellable(delayed_result(500)).await }
        };

        let outcome = run_with_timeout(&task, None, work).await;
        assert_eq!(outcome.cancel_reason(), Some(CancelReason::Timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn test_negative_duration_expires_immediately() {
        let task = Task::root();
        let work = {
            let task = task.clone();
            async move {
                // The subtree sees cancellation at its first suspension point.
                assert!(task.token().is_cancelled());
                task.run_cancellable(delayed_result(500)).await
            }
        };

        let outcome = run_with_timeout(&task, Some(-5), work).await;
        assert_eq!(outcome.cancel_reason(), Some(CancelReason::Timeout));
        assert_eq!(task.state(), TaskState::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_passes_through_untouched() {
        let task = Task::root();
        let work = async { Outcome::<&str>::Failed(CallguardError::remote("boom")) };

        let outcome = run_with_timeout(&task, Some(1000), work).await;
        assert!(matches!(outcome, Outcome::Failed(CallguardError::RemoteFailure(_))));
        assert_eq!(task.state(), TaskState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_reason_preserved() {
        // A disconnect marks the token before the deadline; the work
        // unwinds as cancelled and its reason is kept, not rewritten.
        let task = Task::root();
        let work = {
            let task = task.clone();
            async move {
                task.request_cancel(CancelReason::Disconnect);
                task.run_cancellable(delayed_result(500)).await
            }
        };

        let outcome = run_with_timeout(&task, Some(10), work).await;
        assert_eq!(outcome.cancel_reason(), Some(CancelReason::Disconnect));
        assert_eq!(task.state(), TaskState::Cancelled);
    }
}
