//! Callback bridge: adapts one callback-based network exchange into a
//! single awaitable unit with cancellation cleanup.

mod slot;

pub use slot::{Completer, CompletionSlot};

use crate::cancellation::Task;
use crate::core::Outcome;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// The cleanup action releasing an in-flight operation's resources,
/// typically a forcible connection teardown.
pub type CleanupAction = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;

/// One outstanding callback-based network exchange.
///
/// Created when the call is issued; its cleanup action runs exactly once
/// if cancellation preempts the exchange, and never otherwise.
pub struct PendingOperation {
    connection_id: Uuid,
    cleanup: CleanupAction,
}

impl PendingOperation {
    /// Describes an issued exchange and its cleanup action.
    pub fn new<F>(connection_id: Uuid, cleanup: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        Self {
            connection_id,
            cleanup: Box::new(cleanup),
        }
    }

    /// Returns the identifier of the underlying connection handle.
    #[must_use]
    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }
}

impl fmt::Debug for PendingOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingOperation")
            .field("connection_id", &self.connection_id)
            .finish()
    }
}

/// Lifecycle of the cleanup action.
///
/// Cancellation can land between issuing the call and learning its cleanup
/// action; `Requested` records that gap so installation runs the action
/// immediately. The mutex makes run-exactly-once hold even when completion
/// and cancellation arrive from different threads.
enum CleanupState {
    Idle,
    Installed(CleanupAction),
    Requested,
    Done,
}

struct BridgeState<T> {
    slot: Arc<CompletionSlot<T>>,
    cleanup: Mutex<CleanupState>,
}

impl<T> BridgeState<T> {
    /// Called by the cancellation hook after it won the slot.
    fn request_cleanup(&self) {
        let action = {
            let mut state = self.cleanup.lock();
            match std::mem::replace(&mut *state, CleanupState::Done) {
                CleanupState::Installed(action) => Some(action),
                CleanupState::Idle => {
                    *state = CleanupState::Requested;
                    None
                }
                CleanupState::Requested | CleanupState::Done => None,
            }
        };
        if let Some(action) = action {
            run_cleanup(action);
        }
    }

    /// Called once the issued call's cleanup action is known.
    fn install_cleanup(&self, action: CleanupAction) {
        let run_now = {
            let mut state = self.cleanup.lock();
            match std::mem::replace(&mut *state, CleanupState::Done) {
                // Cancellation already asked for it.
                CleanupState::Requested => true,
                CleanupState::Idle => {
                    *state = CleanupState::Installed(action);
                    return;
                }
                CleanupState::Installed(_) | CleanupState::Done => false,
            }
        };
        if run_now {
            run_cleanup(action);
        }
    }
}

fn run_cleanup(action: CleanupAction) {
    if let Err(err) = action() {
        // Never overrides the cancelled outcome already being returned.
        warn!(error = %err, "cleanup action failed");
    }
}

/// Suspends on a callback-based operation until it resolves.
///
/// The cancellation hook is registered on the task's token *before* the
/// call is issued, so a cancellation arriving between issuance and
/// completion is never missed. Exactly one of {network result,
/// cleanup + cancelled} is delivered:
///
/// - cancellation first: the hook wins the slot, the cleanup action runs
///   once, and the caller unblocks with `Cancelled` without waiting for
///   the network;
/// - network first: the result wins the slot, the hook is deregistered,
///   and a cancellation arriving moments later has no effect.
///
/// The task is advanced to the matching terminal state when the slot
/// resolves, so `Cancelling` never outlives the bridge and observers
/// awaiting `terminated()` are released.
pub async fn bridge<T, F>(task: &Arc<Task>, issue: F) -> Outcome<T>
where
    T: Send + 'static,
    F: FnOnce(Completer<T>) -> PendingOperation,
{
    let state = Arc::new(BridgeState {
        slot: Arc::new(CompletionSlot::new()),
        cleanup: Mutex::new(CleanupState::Idle),
    });

    // Hook goes in before the call is issued: no race window.
    let hook_state = state.clone();
    let hook = task.token().on_cancel(move |reason| {
        if hook_state.slot.resolve(Outcome::Cancelled(reason)) {
            info!(%reason, "cancellation observed, resetting connection");
            hook_state.request_cleanup();
        }
    });

    let pending = issue(Completer::new(state.slot.clone()));
    state.install_cleanup(pending.cleanup);

    let outcome = state.slot.wait().await;

    // Disable the hook so a later cancellation cannot touch a finished
    // exchange. A hook that already fired was drained by the token.
    task.token().remove_hook(hook);

    match &outcome {
        Outcome::Completed(_) => task.complete(),
        Outcome::Cancelled(_) => task.finish_cancelled(),
        Outcome::Failed(_) => task.fail(),
    }

    outcome
}
