//! Outcome of a guarded operation and its serializable status.

use crate::cancellation::CancelReason;
use crate::errors::CallguardError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The result of a guarded asynchronous operation.
///
/// Exactly one of the three arms is ever produced per operation:
/// completion and cancellation racing against each other resolve to
/// whichever arrived first, with the loser suppressed.
#[derive(Debug)]
pub enum Outcome<T> {
    /// The operation finished and produced a value.
    Completed(T),
    /// Cancellation won the race; the reason records which source fired.
    Cancelled(CancelReason),
    /// The operation reported its own failure, unrelated to cancellation.
    Failed(CallguardError),
}

impl<T> Outcome<T> {
    /// Returns true if the operation completed normally.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    /// Returns true if cancellation won.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Returns the cancellation reason, if cancelled.
    #[must_use]
    pub fn cancel_reason(&self) -> Option<CancelReason> {
        match self {
            Self::Cancelled(reason) => Some(*reason),
            _ => None,
        }
    }

    /// Returns the status tag for this outcome.
    #[must_use]
    pub fn status(&self) -> InvokeStatus {
        match self {
            Self::Completed(_) => InvokeStatus::Completed,
            Self::Cancelled(_) => InvokeStatus::Cancelled,
            Self::Failed(_) => InvokeStatus::Failed,
        }
    }

    /// Maps the completed value, leaving the other arms untouched.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Outcome<U> {
        match self {
            Self::Completed(value) => Outcome::Completed(f(value)),
            Self::Cancelled(reason) => Outcome::Cancelled(reason),
            Self::Failed(err) => Outcome::Failed(err),
        }
    }
}

impl<T> From<Result<T, CallguardError>> for Outcome<T> {
    fn from(result: Result<T, CallguardError>) -> Self {
        match result {
            Ok(value) => Self::Completed(value),
            Err(err) => Self::Failed(err),
        }
    }
}

/// The terminal status delivered to the external caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvokeStatus {
    /// The work completed and produced a value.
    Completed,
    /// The work was cancelled by a timeout or disconnect.
    Cancelled,
    /// The work failed on its own.
    Failed,
}

impl fmt::Display for InvokeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_predicates() {
        let done: Outcome<u32> = Outcome::Completed(7);
        assert!(done.is_completed());
        assert!(!done.is_cancelled());
        assert_eq!(done.status(), InvokeStatus::Completed);

        let cancelled: Outcome<u32> = Outcome::Cancelled(CancelReason::Timeout);
        assert!(cancelled.is_cancelled());
        assert_eq!(cancelled.cancel_reason(), Some(CancelReason::Timeout));
    }

    #[test]
    fn test_outcome_from_result() {
        let ok: Outcome<&str> = Ok("value").into();
        assert!(ok.is_completed());

        let err: Outcome<&str> = Err(CallguardError::remote("down")).into();
        assert_eq!(err.status(), InvokeStatus::Failed);
    }

    #[test]
    fn test_outcome_map() {
        let doubled = Outcome::Completed(21).map(|v| v * 2);
        assert!(matches!(doubled, Outcome::Completed(42)));

        let cancelled: Outcome<u32> = Outcome::Cancelled(CancelReason::Disconnect);
        assert!(cancelled.map(|v| v * 2).is_cancelled());
    }

    #[test]
    fn test_status_serialize() {
        let json = serde_json::to_string(&InvokeStatus::Cancelled).unwrap();
        assert_eq!(json, r#""cancelled""#);

        let parsed: InvokeStatus = serde_json::from_str(r#""failed""#).unwrap();
        assert_eq!(parsed, InvokeStatus::Failed);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(InvokeStatus::Completed.to_string(), "completed");
        assert_eq!(InvokeStatus::Cancelled.to_string(), "cancelled");
    }
}
