//! Non-cancellable region: a child task that runs to natural completion.

use super::task::Task;
use crate::core::Outcome;
use crate::errors::CallguardError;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// Runs `work` as a shielded child task of `parent`.
///
/// The child carries its own token and never observes cancellation
/// requests from the parent's domain: it is spawned onto the runtime so
/// it keeps running on its own schedule, and its result is joined
/// explicitly here. Cancelling the parent marks the parent only; whoever
/// awaits this call still waits for the child.
pub async fn run_protected<T, F, Fut>(parent: &Arc<Task>, work: F) -> Outcome<T>
where
    T: Send + 'static,
    F: FnOnce(Arc<Task>) -> Fut,
    Fut: Future<Output = Result<T, CallguardError>> + Send + 'static,
{
    let child = parent.protected_child();
    debug!(task_id = %child.id(), "entering non-cancellable region");

    let handle = tokio::spawn(work(child.clone()));

    match handle.await {
        Ok(Ok(value)) => {
            child.complete();
            Outcome::Completed(value)
        }
        Ok(Err(err)) => {
            child.fail();
            Outcome::Failed(err)
        }
        Err(join_err) => {
            child.fail();
            Outcome::Failed(CallguardError::TaskPanicked(join_err.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::{CancelReason, TaskState};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_protected_child_survives_parent_cancel() {
        let parent = Task::root();

        let region = {
            let parent = parent.clone();
            tokio::spawn(async move {
                run_protected(&parent, |_child| async {
                    tokio::time::sleep(Duration::from_millis(300)).await;
                    Ok("bookkeeping done")
                })
                .await
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        parent.request_cancel(CancelReason::Timeout);

        let outcome = region.await.unwrap();
        assert!(matches!(outcome, Outcome::Completed("bookkeeping done")));
        assert_eq!(parent.state(), TaskState::Cancelling);
    }

    #[tokio::test]
    async fn test_protected_child_ignores_already_cancelled_parent() {
        let parent = Task::root();
        parent.request_cancel(CancelReason::Disconnect);

        let outcome = run_protected(&parent, |child| async move {
            assert!(!child.token().is_cancelled());
            assert!(child.is_shielded());
            Ok(1u32)
        })
        .await;

        assert!(outcome.is_completed());
    }

    #[tokio::test]
    async fn test_protected_child_failure_maps_to_failed() {
        let parent = Task::root();

        let outcome: Outcome<u32> = run_protected(&parent, |_child| async {
            Err(CallguardError::remote("ledger write failed"))
        })
        .await;

        assert!(matches!(outcome, Outcome::Failed(CallguardError::RemoteFailure(_))));
    }

    #[tokio::test]
    async fn test_protected_child_panic_maps_to_failed() {
        let parent = Task::root();

        let outcome: Outcome<u32> =
            run_protected(&parent, |_child| async { panic!("intentional") }).await;

        assert!(matches!(outcome, Outcome::Failed(CallguardError::TaskPanicked(_))));
    }
}
