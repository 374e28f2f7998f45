//! The external call contract: one guarded invocation per inbound unit
//! of work, independent of transport.

use crate::cancellation::{CancelReason, Task};
use crate::core::{InvokeStatus, Outcome};
use crate::errors::CallguardError;
use crate::monitor::{watch_disconnect, DisconnectSignal};
use crate::timeout::run_with_timeout;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// Recognized configuration for one invocation.
#[derive(Debug, Default)]
pub struct InvokeOptions {
    /// Requested timeout in time-units; absent or zero selects the
    /// default, negative is already expired.
    pub timeout_units: Option<i64>,
    /// Optional liveness source; absent disables the disconnect monitor.
    pub disconnect: Option<DisconnectSignal>,
}

impl InvokeOptions {
    /// Creates options with defaults: default timeout, no monitor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the requested timeout.
    #[must_use]
    pub fn with_timeout_units(mut self, units: i64) -> Self {
        self.timeout_units = Some(units);
        self
    }

    /// Binds a disconnect signal to the invocation.
    #[must_use]
    pub fn with_disconnect(mut self, signal: DisconnectSignal) -> Self {
        self.disconnect = Some(signal);
        self
    }
}

/// The terminal result delivered to the caller. Always produced; an
/// invocation never blocks indefinitely.
#[derive(Debug)]
pub struct InvokeResult<T> {
    /// Completed, cancelled, or failed.
    pub status: InvokeStatus,
    /// The value, when completed.
    pub value: Option<T>,
    /// Which cancellation source fired, when cancelled.
    pub reason: Option<CancelReason>,
    /// The failure, when failed. Remote failures are never conflated
    /// with cancellation.
    pub error: Option<CallguardError>,
}

impl<T> From<Outcome<T>> for InvokeResult<T> {
    fn from(outcome: Outcome<T>) -> Self {
        match outcome {
            Outcome::Completed(value) => Self {
                status: InvokeStatus::Completed,
                value: Some(value),
                reason: None,
                error: None,
            },
            Outcome::Cancelled(reason) => Self {
                status: InvokeStatus::Cancelled,
                value: None,
                reason: Some(reason),
                error: None,
            },
            Outcome::Failed(error) => Self {
                status: InvokeStatus::Failed,
                value: None,
                reason: None,
                error: Some(error),
            },
        }
    }
}

/// Runs one unit of work under a fresh cancellation domain.
///
/// Creates the root task, optionally registers the disconnect monitor,
/// and wraps the work in the timeout guard. Whichever cancellation source
/// fires first marks the domain's token; the work observes the mark at
/// its next suspension point.
pub async fn invoke<T, F, Fut>(options: InvokeOptions, work: F) -> InvokeResult<T>
where
    F: FnOnce(Arc<Task>) -> Fut,
    Fut: Future<Output = Outcome<T>>,
{
    let root = Task::root();
    debug!(task_id = %root.id(), "invocation started");

    let _monitor = options
        .disconnect
        .map(|signal| watch_disconnect(signal, root.clone()));

    let outcome = run_with_timeout(&root, options.timeout_units, work(root.clone())).await;
    InvokeResult::from(outcome)
}
