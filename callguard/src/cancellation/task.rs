//! Task records: lifecycle state, parent/child links, cascading cancel.

use super::token::{CancelReason, CancelToken};
use crate::core::Outcome;
use crate::errors::CallguardError;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};
use tokio::sync::Notify;
use tracing::{debug, warn};
use uuid::Uuid;

/// The lifecycle state of a task.
///
/// States only advance forward: `Active` → `Cancelling` → `Cancelled`
/// on the cancellation path, or `Active` → `Completed`/`Failed` on the
/// normal path. `Cancelling` is transient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// The task is running.
    Active,
    /// Cancellation has been requested; suspension points are unwinding.
    Cancelling,
    /// The task produced a value.
    Completed,
    /// Cancellation completed: suspension points unwound, cleanup ran.
    Cancelled,
    /// The task failed on its own.
    Failed,
}

impl TaskState {
    /// Returns true for states a task can never leave.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            Self::Active => 0,
            Self::Cancelling => 1,
            Self::Completed | Self::Cancelled | Self::Failed => 2,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Cancelling => write!(f, "cancelling"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A cleanup hook run once when the owning task finishes cancelling.
type CleanupHook = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;

/// A unit of asynchronous work with a lifecycle and a parent/child
/// relation to other tasks.
///
/// Tasks created with [`Task::child`] share the parent's [`CancelToken`]
/// and are cancelled when the domain is; tasks created with
/// [`Task::protected_child`] carry their own token and are exempt from the
/// cascade until they complete on their own.
pub struct Task {
    id: Uuid,
    parent: Weak<Task>,
    children: RwLock<Vec<Arc<Task>>>,
    state: RwLock<TaskState>,
    token: Arc<CancelToken>,
    cleanup: Mutex<Option<CleanupHook>>,
    shielded: bool,
    terminal: Notify,
}

impl Task {
    fn new(parent: Weak<Task>, token: Arc<CancelToken>, shielded: bool) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            parent,
            children: RwLock::new(Vec::new()),
            state: RwLock::new(TaskState::Active),
            token,
            cleanup: Mutex::new(None),
            shielded,
            terminal: Notify::new(),
        })
    }

    /// Creates a root task, opening a fresh cancellation domain.
    #[must_use]
    pub fn root() -> Arc<Self> {
        Self::new(Weak::new(), Arc::new(CancelToken::new()), false)
    }

    /// Spawns a child task sharing this task's cancellation domain.
    #[must_use]
    pub fn child(self: &Arc<Self>) -> Arc<Self> {
        let child = Self::new(Arc::downgrade(self), self.token.clone(), false);
        if self.token.is_cancelled() {
            // The domain is already unwinding; a newborn never runs Active.
            child.advance(TaskState::Cancelling);
        }
        self.children.write().push(child.clone());
        child
    }

    /// Spawns a shielded child with its own token.
    ///
    /// The cascade walk skips it entirely; it observes no cancellation
    /// requests from this task's domain.
    #[must_use]
    pub fn protected_child(self: &Arc<Self>) -> Arc<Self> {
        let child = Self::new(Arc::downgrade(self), Arc::new(CancelToken::new()), true);
        self.children.write().push(child.clone());
        child
    }

    /// Returns the task's identifier.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the task's parent, if it is still alive.
    #[must_use]
    pub fn parent(&self) -> Option<Arc<Task>> {
        self.parent.upgrade()
    }

    /// Returns the cancellation token of this task's domain.
    #[must_use]
    pub fn token(&self) -> &Arc<CancelToken> {
        &self.token
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> TaskState {
        *self.state.read()
    }

    /// Returns true if this task ignores its parent's cancellation.
    #[must_use]
    pub fn is_shielded(&self) -> bool {
        self.shielded
    }

    /// Installs the cleanup hook run when this task finishes cancelling.
    pub fn set_cleanup<F>(&self, hook: F)
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        *self.cleanup.lock() = Some(Box::new(hook));
    }

    /// Requests cancellation of this task's domain.
    ///
    /// Returns true only for the call that triggered it. On the winning
    /// call the subtree is walked top-down and every active, non-shielded
    /// task is marked `Cancelling`.
    pub fn request_cancel(self: &Arc<Self>, reason: CancelReason) -> bool {
        let triggered = self.token.request_cancel(reason);
        if triggered {
            debug!(task_id = %self.id, %reason, "cancellation requested");
            self.mark_cancelling();
        }
        triggered
    }

    /// Walks this subtree marking non-shielded tasks as cancelling.
    fn mark_cancelling(&self) {
        if self.shielded {
            return;
        }
        self.advance(TaskState::Cancelling);
        for child in self.children.read().iter() {
            child.mark_cancelling();
        }
    }

    /// Marks normal completion.
    pub fn complete(&self) {
        self.advance(TaskState::Completed);
    }

    /// Marks failure.
    pub fn fail(&self) {
        self.advance(TaskState::Failed);
    }

    /// Marks the end of the cancellation path and runs the cleanup hook.
    ///
    /// The hook runs at most once; a hook failure is logged and never
    /// overrides the cancelled outcome already being returned.
    pub fn finish_cancelled(&self) {
        if self.advance(TaskState::Cancelled) {
            // Take the hook before invoking it: the hook may touch this
            // task (including `set_cleanup`) without deadlocking.
            let hook = self.cleanup.lock().take();
            if let Some(hook) = hook {
                if let Err(err) = hook() {
                    warn!(task_id = %self.id, error = %err, "cleanup hook failed");
                }
            }
        }
    }

    /// Advances the state if the transition moves forward.
    ///
    /// Terminal states are never left and ranks never regress; a rejected
    /// transition returns false.
    fn advance(&self, next: TaskState) -> bool {
        let mut state = self.state.write();
        if state.is_terminal() || next.rank() <= state.rank() {
            return false;
        }
        *state = next;
        drop(state);
        if next.is_terminal() {
            self.terminal.notify_waiters();
        }
        true
    }

    /// Suspends until this task reaches a terminal state.
    pub async fn terminated(&self) {
        loop {
            if self.state().is_terminal() {
                return;
            }
            let notified = self.terminal.notified();
            if self.state().is_terminal() {
                return;
            }
            notified.await;
        }
    }

    /// Races a future against this task's cancellation.
    ///
    /// If cancellation arrives first the future is dropped, which is what
    /// cancels an in-flight declarative client call. Cancellation that was
    /// already requested wins over a simultaneously ready result.
    ///
    /// The task is advanced to the matching terminal state when the race
    /// resolves, so `Cancelling` never outlives the call and observers
    /// awaiting [`Task::terminated`] are released.
    pub async fn run_cancellable<T, F>(&self, fut: F) -> Outcome<T>
    where
        F: Future<Output = Result<T, CallguardError>>,
    {
        let outcome = tokio::select! {
            biased;
            reason = self.token.cancelled() => Outcome::Cancelled(reason),
            result = fut => result.into(),
        };
        match &outcome {
            Outcome::Completed(_) => self.complete(),
            Outcome::Cancelled(_) => self.finish_cancelled(),
            Outcome::Failed(_) => self.fail(),
        }
        outcome
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("shielded", &self.shielded)
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}
