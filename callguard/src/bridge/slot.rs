//! One-shot completion cell arbitrating network results and cancellation.

use crate::core::Outcome;
use crate::errors::CallguardError;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::error;

const EMPTY: u8 = 0;
const WRITING: u8 = 1;
const READY: u8 = 2;

/// A one-shot result cell resolved exactly once by whichever of
/// {network success, network failure, cancellation} arrives first.
///
/// Resolution is arbitrated by an atomic compare-and-set, so completion
/// callbacks and cancellation hooks may race from different threads;
/// losing the race is the normal suppressed path, not an error. Single
/// consumer: one caller awaits [`CompletionSlot::wait`].
pub struct CompletionSlot<T> {
    state: AtomicU8,
    value: Mutex<Option<Outcome<T>>>,
    notify: Notify,
}

impl<T> CompletionSlot<T> {
    /// Creates an unresolved slot.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(EMPTY),
            value: Mutex::new(None),
            notify: Notify::new(),
        }
    }

    /// Resolves the slot, returning true if this call won.
    ///
    /// The losing side of a resolution race gets false and its outcome is
    /// dropped.
    pub fn resolve(&self, outcome: Outcome<T>) -> bool {
        if self
            .state
            .compare_exchange(EMPTY, WRITING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        *self.value.lock() = Some(outcome);
        self.state.store(READY, Ordering::SeqCst);
        self.notify.notify_waiters();
        true
    }

    /// Returns true once a resolution has been published.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.state.load(Ordering::SeqCst) == READY
    }

    /// Suspends until the slot resolves, then takes the outcome.
    pub async fn wait(&self) -> Outcome<T> {
        loop {
            if self.is_resolved() {
                return self.take();
            }
            let notified = self.notify.notified();
            if self.is_resolved() {
                return self.take();
            }
            notified.await;
        }
    }

    fn take(&self) -> Outcome<T> {
        match self.value.lock().take() {
            Some(outcome) => outcome,
            None => {
                // A second consumer is a caller bug.
                error!("completion slot consumed twice");
                Outcome::Failed(CallguardError::ProtocolViolation(
                    "completion slot consumed twice".to_string(),
                ))
            }
        }
    }
}

impl<T> Default for CompletionSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for CompletionSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionSlot")
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

/// The handle a callback chain uses to deliver its terminal result.
///
/// Cloneable so it can travel through connect/send/receive callbacks, but
/// the chain as a whole may complete only once: a second completion is a
/// protocol violation.
pub struct Completer<T> {
    slot: Arc<CompletionSlot<T>>,
    used: Arc<AtomicBool>,
}

impl<T> Clone for Completer<T> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
            used: self.used.clone(),
        }
    }
}

impl<T> Completer<T> {
    /// Creates a completer resolving into `slot`.
    #[must_use]
    pub fn new(slot: Arc<CompletionSlot<T>>) -> Self {
        Self {
            slot,
            used: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Delivers the network result.
    ///
    /// Returns `Ok(true)` if the result won the slot, `Ok(false)` if
    /// cancellation got there first (the result is suppressed), and
    /// `Err(ProtocolViolation)` if this chain already completed once.
    pub fn complete(&self, result: Result<T, CallguardError>) -> Result<bool, CallguardError> {
        if self.used.swap(true, Ordering::SeqCst) {
            error!("callback chain delivered a second completion");
            return Err(CallguardError::ProtocolViolation(
                "callback chain completed twice".to_string(),
            ));
        }
        Ok(self.slot.resolve(result.into()))
    }
}

impl<T> fmt::Debug for Completer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completer")
            .field("used", &self.used.load(Ordering::SeqCst))
            .finish()
    }
}
