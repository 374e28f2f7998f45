//! Error types for the callguard crate.
//!
//! Cancellation is not an error here: timeout- and disconnect-driven
//! cancellation surface as a `Cancelled` outcome with the reason recorded.
//! The variants below cover genuine failures and the boundary conversions
//! callers may want when a cancelled outcome must become an error.

use thiserror::Error;

/// The main error type for callguard operations.
#[derive(Debug, Error)]
pub enum CallguardError {
    /// The deadline elapsed before the guarded operation completed.
    ///
    /// The guard itself never returns this; it exists for callers that
    /// convert a `Cancelled(Timeout)` outcome into an error at their own
    /// boundary.
    #[error("timeout exceeded before completion")]
    TimeoutExceeded,

    /// The peer closed the inbound connection before completion.
    #[error("peer disconnected before completion")]
    PeerDisconnected,

    /// The remote operation reported its own failure, unrelated to
    /// cancellation. Propagates as a `Failed` outcome, never `Cancelled`.
    #[error("remote failure: {0}")]
    RemoteFailure(String),

    /// A completion slot was resolved twice by the same completer.
    /// Must never occur; indicates a broken callback chain.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// A protected child task panicked before producing a result.
    #[error("task panicked: {0}")]
    TaskPanicked(String),
}

impl CallguardError {
    /// Creates a remote failure from any displayable cause.
    #[must_use]
    pub fn remote(cause: impl std::fmt::Display) -> Self {
        Self::RemoteFailure(cause.to_string())
    }
}
