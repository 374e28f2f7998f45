//! Request fixtures mirroring the four endpoint variants the core serves.

use super::mocks::MockConnection;
use crate::cancellation::run_protected;
use crate::client::{call_over_connection, RemoteClient};
use crate::invoke::{invoke, InvokeOptions, InvokeResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Variant 1 and 4: a timeout (or disconnect) race against a manually
/// managed connection, resetting it on cancellation.
pub async fn manual_connection_call(
    options: InvokeOptions,
    conn: Arc<MockConnection>,
) -> InvokeResult<String> {
    invoke(options, |task| async move {
        // The exchange runs on an inner child of the request's task, the
        // way a handler spawns and awaits a nested call.
        let call = task.child();
        call_over_connection(&call, conn).await
    })
    .await
}

/// Variant 2: the same race through a declarative client; dropping the
/// in-flight future is the cancellation.
pub async fn declarative_client_call(
    options: InvokeOptions,
    client: Arc<dyn RemoteClient>,
) -> InvokeResult<String> {
    invoke(options, |task| async move {
        let call = task.child();
        call.run_cancellable(client.call()).await
    })
    .await
}

/// Report from the protected-sibling variant.
#[derive(Debug)]
pub struct ProtectedCallReport {
    /// The overall invocation result.
    pub result: InvokeResult<String>,
    /// Whether the non-cancellable sibling ran to completion before the
    /// invocation returned.
    pub region_completed: bool,
}

/// Variant 3: the primary call races the deadline while a sibling task in
/// a non-cancellable region performs fixed-delay bookkeeping. Both are
/// joined before the invocation returns.
pub async fn call_with_protected_delay(
    options: InvokeOptions,
    conn: Arc<MockConnection>,
    region_units: u64,
) -> ProtectedCallReport {
    let region_completed = Arc::new(AtomicBool::new(false));

    let flag = region_completed.clone();
    let result = invoke(options, |task| async move {
        let call = task.child();
        let primary = call_over_connection(&call, conn);
        let region = run_protected(&task, move |_child| async move {
            tokio::time::sleep(Duration::from_millis(region_units)).await;
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });

        let (primary_outcome, _region_outcome) = futures::future::join(primary, region).await;
        primary_outcome
    })
    .await;

    ProtectedCallReport {
        result,
        region_completed: region_completed.load(Ordering::SeqCst),
    }
}
