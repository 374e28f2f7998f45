//! Mock transports for exercising the cancellation paths.

use crate::client::{CompletionCallback, Connection, RemoteClient};
use crate::errors::CallguardError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Latency of the simulated long-running remote endpoint.
pub const REMOTE_DELAY_UNITS: u64 = 500;

/// Body the simulated remote endpoint responds with.
pub const REMOTE_RESPONSE: &str = "Completed request";

/// A callback-style connection to a simulated peer.
///
/// The response arrives after a fixed latency; a reset abandons the
/// in-flight exchange so the callback never fires. Sends and resets are
/// counted for exactly-once assertions.
pub struct MockConnection {
    id: Uuid,
    latency_units: u64,
    response: String,
    failure: Option<String>,
    aborted: Arc<AtomicBool>,
    sends: AtomicUsize,
    resets: AtomicUsize,
}

impl MockConnection {
    /// Creates a connection answering `response` after `latency_units`.
    #[must_use]
    pub fn new(latency_units: u64, response: &str) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            latency_units,
            response: response.to_string(),
            failure: None,
            aborted: Arc::new(AtomicBool::new(false)),
            sends: AtomicUsize::new(0),
            resets: AtomicUsize::new(0),
        })
    }

    /// Creates a connection that reports a remote failure after
    /// `latency_units`.
    #[must_use]
    pub fn failing(latency_units: u64, message: &str) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            latency_units,
            response: String::new(),
            failure: Some(message.to_string()),
            aborted: Arc::new(AtomicBool::new(false)),
            sends: AtomicUsize::new(0),
            resets: AtomicUsize::new(0),
        })
    }

    /// Number of exchanges issued.
    #[must_use]
    pub fn send_count(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    /// Number of times the connection was forcibly reset.
    #[must_use]
    pub fn reset_count(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }
}

impl Connection for MockConnection {
    fn id(&self) -> Uuid {
        self.id
    }

    fn send(&self, on_done: CompletionCallback) {
        self.sends.fetch_add(1, Ordering::SeqCst);

        let latency = Duration::from_millis(self.latency_units);
        let aborted = self.aborted.clone();
        let result = match &self.failure {
            Some(message) => Err(CallguardError::RemoteFailure(message.clone())),
            None => Ok(self.response.clone()),
        };

        tokio::spawn(async move {
            tokio::time::sleep(latency).await;
            // A reset connection never answers.
            if !aborted.load(Ordering::SeqCst) {
                on_done(result);
            }
        });
    }

    fn reset(&self) -> anyhow::Result<()> {
        self.resets.fetch_add(1, Ordering::SeqCst);
        self.aborted.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl std::fmt::Debug for MockConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockConnection")
            .field("id", &self.id)
            .field("latency_units", &self.latency_units)
            .field("sends", &self.send_count())
            .field("resets", &self.reset_count())
            .finish()
    }
}

/// A declarative client answering after a fixed latency.
pub struct MockRemoteClient {
    latency_units: u64,
    response: String,
    calls: AtomicUsize,
}

impl MockRemoteClient {
    /// Creates a client answering `response` after `latency_units`.
    #[must_use]
    pub fn new(latency_units: u64, response: &str) -> Arc<Self> {
        Arc::new(Self {
            latency_units,
            response: response.to_string(),
            calls: AtomicUsize::new(0),
        })
    }

    /// Creates a client matching the simulated long-running endpoint.
    #[must_use]
    pub fn long_running() -> Arc<Self> {
        Self::new(REMOTE_DELAY_UNITS, REMOTE_RESPONSE)
    }

    /// Number of calls issued.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteClient for MockRemoteClient {
    async fn call(&self) -> Result<String, CallguardError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(self.latency_units)).await;
        Ok(self.response.clone())
    }
}
