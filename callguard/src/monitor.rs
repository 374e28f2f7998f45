//! Disconnect monitor: bridges peer-connection liveness into cancellation.

use crate::cancellation::{CancelReason, Task};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Creates a connected trigger/signal pair for one connection's liveness.
#[must_use]
pub fn disconnect_channel() -> (DisconnectTrigger, DisconnectSignal) {
    let (tx, rx) = watch::channel(false);
    (DisconnectTrigger { tx }, DisconnectSignal { rx })
}

/// The connection side: fired when the peer closes the connection.
pub struct DisconnectTrigger {
    tx: watch::Sender<bool>,
}

impl DisconnectTrigger {
    /// Marks the connection closed. Idempotent.
    pub fn close(&self) {
        self.tx.send_replace(true);
    }
}

impl fmt::Debug for DisconnectTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisconnectTrigger")
            .field("closed", &*self.tx.borrow())
            .finish()
    }
}

/// The observer side of a connection's liveness event.
#[derive(Clone)]
pub struct DisconnectSignal {
    rx: watch::Receiver<bool>,
}

impl DisconnectSignal {
    /// Returns true if the peer has already closed the connection.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        *self.rx.borrow()
    }

    /// Suspends until the peer closes the connection.
    ///
    /// Resolves immediately when registered after the connection already
    /// closed, and also when the trigger side is dropped.
    pub async fn closed(mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                // Trigger dropped: the connection is gone either way.
                return;
            }
        }
    }
}

impl fmt::Debug for DisconnectSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisconnectSignal")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Handle to a running disconnect observer.
///
/// The observer deregisters itself once the bound task reaches a terminal
/// state, so it never fires against a reused or closed handle.
#[derive(Debug)]
pub struct MonitorHandle {
    handle: JoinHandle<()>,
}

impl MonitorHandle {
    /// Returns true once the observer has deregistered.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Registers a one-shot observer binding `signal` to `task`.
///
/// When the peer closes the connection the observer fires exactly once,
/// requesting `Disconnect` cancellation of the task's domain. When the
/// task reaches a terminal state first, the observer deregisters without
/// firing.
pub fn watch_disconnect(signal: DisconnectSignal, task: Arc<Task>) -> MonitorHandle {
    let handle = tokio::spawn(async move {
        tokio::select! {
            () = signal.closed() => {
                info!(task_id = %task.id(), "peer disconnected, cancelling request");
                task.request_cancel(CancelReason::Disconnect);
            }
            () = task.terminated() => {
                debug!(task_id = %task.id(), "task finished, disconnect observer deregistered");
            }
        }
    });
    MonitorHandle { handle }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::TaskState;
    use std::time::Duration;

    #[tokio::test]
    async fn test_disconnect_cancels_bound_task() {
        let task = Task::root();
        let (trigger, signal) = disconnect_channel();
        let monitor = watch_disconnect(signal, task.clone());

        trigger.close();
        trigger.close(); // idempotent

        // Observer runs on the runtime; give it a turn.
        tokio::time::timeout(Duration::from_secs(1), async {
            while !task.token().is_cancelled() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        assert_eq!(task.token().reason(), Some(CancelReason::Disconnect));
        assert_eq!(task.state(), TaskState::Cancelling);

        while !monitor.is_finished() {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_register_after_close_fires_immediately() {
        let task = Task::root();
        let (trigger, signal) = disconnect_channel();
        trigger.close();
        assert!(signal.is_closed());

        watch_disconnect(signal, task.clone());

        tokio::time::timeout(Duration::from_secs(1), async {
            while !task.token().is_cancelled() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        assert_eq!(task.token().reason(), Some(CancelReason::Disconnect));
    }

    #[tokio::test]
    async fn test_deregisters_on_terminal_task() {
        let task = Task::root();
        let (trigger, signal) = disconnect_channel();
        let monitor = watch_disconnect(signal, task.clone());

        task.complete();

        tokio::time::timeout(Duration::from_secs(1), async {
            while !monitor.is_finished() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        // Closing the handle afterwards must not cancel anything.
        trigger.close();
        tokio::task::yield_now().await;
        assert!(!task.token().is_cancelled());
        assert_eq!(task.state(), TaskState::Completed);
    }

    #[tokio::test]
    async fn test_dropped_trigger_counts_as_disconnect() {
        let task = Task::root();
        let (trigger, signal) = disconnect_channel();
        watch_disconnect(signal, task.clone());

        drop(trigger);

        tokio::time::timeout(Duration::from_secs(1), async {
            while !task.token().is_cancelled() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        assert_eq!(task.token().reason(), Some(CancelReason::Disconnect));
    }
}
