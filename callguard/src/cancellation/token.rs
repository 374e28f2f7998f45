//! Cancellation token: the write-once cancellation flag for one domain.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::Notify;
use tracing::warn;

/// Why a cancellation domain was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// The timeout guard's deadline elapsed.
    Timeout,
    /// The peer closed the inbound connection.
    Disconnect,
    /// The parent task's domain was cancelled.
    ParentCancelled,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::Disconnect => write!(f, "disconnect"),
            Self::ParentCancelled => write!(f, "parent_cancelled"),
        }
    }
}

/// Identifier for a registered cancellation hook, used to deregister it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookId(u64);

/// A one-shot callback fired when the token is cancelled.
type CancelHook = Box<dyn FnOnce(CancelReason) + Send>;

/// A token for cooperative cancellation, shared by every task in one
/// cancellation domain.
///
/// Write-once: the first `request_cancel` wins and records the reason and
/// trigger time; later requests are no-ops. Readers are many; the single
/// write is an atomic compare-and-set.
#[derive(Default)]
pub struct CancelToken {
    /// Whether cancellation has been requested.
    cancelled: AtomicBool,
    /// The reason for cancellation (first writer wins).
    reason: RwLock<Option<CancelReason>>,
    /// When the winning request arrived.
    triggered_at: RwLock<Option<DateTime<Utc>>>,
    /// One-shot hooks to fire on cancellation.
    hooks: Mutex<Vec<(u64, CancelHook)>>,
    /// Wakes `cancelled()` waiters.
    notify: Notify,
    /// Next hook id.
    next_hook_id: AtomicU64,
}

impl CancelToken {
    /// Creates a new, uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation with a reason.
    ///
    /// Idempotent: returns true only for the call that triggered the
    /// cancellation; subsequent calls are no-ops returning false.
    /// Registered hooks are fired exactly once, in registration order.
    /// Hook panics are logged and suppressed.
    pub fn request_cancel(&self, reason: CancelReason) -> bool {
        if self
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        *self.reason.write() = Some(reason);
        *self.triggered_at.write() = Some(Utc::now());

        let hooks: Vec<(u64, CancelHook)> = {
            let mut lock = self.hooks.lock();
            std::mem::take(&mut *lock)
        };
        for (_, hook) in hooks {
            if let Err(panic) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                hook(reason);
            })) {
                warn!(?panic, "cancellation hook panicked");
            }
        }

        self.notify.notify_waiters();
        true
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the cancellation reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<CancelReason> {
        *self.reason.read()
    }

    /// Returns when the winning cancellation request arrived.
    #[must_use]
    pub fn triggered_at(&self) -> Option<DateTime<Utc>> {
        *self.triggered_at.read()
    }

    /// Registers a one-shot hook fired when the token is cancelled.
    ///
    /// If the token is already cancelled, the hook runs immediately.
    /// The returned id can be passed to [`CancelToken::remove_hook`] to
    /// disable a hook that has not fired yet.
    pub fn on_cancel<F>(&self, hook: F) -> HookId
    where
        F: FnOnce(CancelReason) + Send + 'static,
    {
        let id = self.next_hook_id.fetch_add(1, Ordering::Relaxed);
        if self.is_cancelled() {
            let reason = self.reason().unwrap_or(CancelReason::ParentCancelled);
            if let Err(panic) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                hook(reason);
            })) {
                warn!(?panic, "cancellation hook panicked");
            }
        } else {
            self.hooks.lock().push((id, Box::new(hook)));
        }
        HookId(id)
    }

    /// Deregisters a hook that has not fired yet.
    ///
    /// Returns true if the hook was still pending and is now removed.
    pub fn remove_hook(&self, id: HookId) -> bool {
        let mut hooks = self.hooks.lock();
        let before = hooks.len();
        hooks.retain(|(hook_id, _)| *hook_id != id.0);
        hooks.len() < before
    }

    /// Suspends until the token is cancelled, resolving with the reason.
    ///
    /// Resolves immediately if cancellation has already been requested.
    pub async fn cancelled(&self) -> CancelReason {
        loop {
            if self.is_cancelled() {
                return self.reason().unwrap_or(CancelReason::ParentCancelled);
            }
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return self.reason().unwrap_or(CancelReason::ParentCancelled);
            }
            notified.await;
        }
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_token_default_not_cancelled() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        assert!(token.reason().is_none());
        assert!(token.triggered_at().is_none());
    }

    #[test]
    fn test_request_cancel_records_reason_and_time() {
        let token = CancelToken::new();
        assert!(token.request_cancel(CancelReason::Timeout));

        assert!(token.is_cancelled());
        assert_eq!(token.reason(), Some(CancelReason::Timeout));
        assert!(token.triggered_at().is_some());
    }

    #[test]
    fn test_request_cancel_idempotent() {
        let token = CancelToken::new();
        assert!(token.request_cancel(CancelReason::Disconnect));
        // Second request is a no-op and reports "not the trigger".
        assert!(!token.request_cancel(CancelReason::Timeout));
        assert_eq!(token.reason(), Some(CancelReason::Disconnect));
    }

    #[test]
    fn test_hook_fires_on_cancel() {
        let token = CancelToken::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let fired_clone = fired.clone();
        token.on_cancel(move |reason| {
            assert_eq!(reason, CancelReason::Timeout);
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(fired.load(Ordering::SeqCst), 0);
        token.request_cancel(CancelReason::Timeout);
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        // Already drained; a second request cannot refire.
        token.request_cancel(CancelReason::Timeout);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_hook_fires_immediately_when_already_cancelled() {
        let token = CancelToken::new();
        token.request_cancel(CancelReason::Disconnect);

        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = fired.clone();
        token.on_cancel(move |reason| {
            assert_eq!(reason, CancelReason::Disconnect);
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remove_hook_disables_it() {
        let token = CancelToken::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let fired_clone = fired.clone();
        let id = token.on_cancel(move |_| {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert!(token.remove_hook(id));
        assert!(!token.remove_hook(id));

        token.request_cancel(CancelReason::Timeout);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_hook_panic_suppressed() {
        let token = CancelToken::new();
        token.on_cancel(|_| panic!("intentional"));

        token.request_cancel(CancelReason::Timeout);
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiter() {
        let token = Arc::new(CancelToken::new());

        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.cancelled().await })
        };

        tokio::task::yield_now().await;
        token.request_cancel(CancelReason::Disconnect);

        let reason = waiter.await.unwrap();
        assert_eq!(reason, CancelReason::Disconnect);
    }

    #[tokio::test]
    async fn test_cancelled_resolves_immediately_when_cancelled() {
        let token = CancelToken::new();
        token.request_cancel(CancelReason::Timeout);
        assert_eq!(token.cancelled().await, CancelReason::Timeout);
    }

    #[test]
    fn test_reason_serialize() {
        let json = serde_json::to_string(&CancelReason::ParentCancelled).unwrap();
        assert_eq!(json, r#""parent_cancelled""#);
    }
}
