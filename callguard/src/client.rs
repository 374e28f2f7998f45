//! Transport trait seams: the callback-style connection and the
//! declarative remote client.
//!
//! Two ways to reach the remote peer, mirroring the two call paths the
//! core supports: a manually-managed connection whose in-flight exchange
//! is torn down by the bridge's cleanup hook, and a declarative client
//! whose in-flight call is cancelled simply by dropping its future.

use crate::bridge::{bridge, PendingOperation};
use crate::cancellation::Task;
use crate::core::Outcome;
use crate::errors::CallguardError;
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

/// Callback delivering the terminal result of one exchange.
pub type CompletionCallback = Box<dyn FnOnce(Result<String, CallguardError>) + Send>;

/// A callback-style network connection.
pub trait Connection: Send + Sync {
    /// Identifier of the underlying connection handle.
    fn id(&self) -> Uuid;

    /// Issues the exchange; `on_done` fires at most once with the result.
    fn send(&self, on_done: CompletionCallback);

    /// Forcibly terminates the connection, abandoning any in-flight
    /// exchange. Used as the bridge's cleanup action.
    fn reset(&self) -> anyhow::Result<()>;
}

/// A declarative remote-call client.
///
/// Cancellation needs no manual connection handling here: dropping the
/// in-flight future abandons the call.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Performs the remote call and returns the response body.
    async fn call(&self) -> Result<String, CallguardError>;
}

/// Runs one exchange over a callback-style connection as an awaitable
/// unit under `task`'s cancellation domain.
///
/// If cancellation preempts the exchange, the connection is reset exactly
/// once and the caller unblocks with a `Cancelled` outcome.
pub async fn call_over_connection(
    task: &Arc<Task>,
    conn: Arc<dyn Connection>,
) -> Outcome<String> {
    bridge(task, |completer| {
        let reset_conn = conn.clone();
        conn.send(Box::new(move |result| {
            // Losing to cancellation is the suppressed-race path.
            completer.complete(result).ok();
        }));
        PendingOperation::new(conn.id(), move || reset_conn.reset())
    })
    .await
}
