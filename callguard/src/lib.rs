//! # Callguard
//!
//! Structured cancellation and timeout coordination for asynchronous
//! remote calls.
//!
//! Callguard solves a recurring, hard-to-get-right problem: propagating
//! cancellation and timeout signals through a chain of asynchronous
//! operations that mix tree-shaped task composition with callback-driven
//! network I/O, while guaranteeing that the underlying resources are
//! released exactly once when cancellation occurs. It provides:
//!
//! - **Cancellation domains**: a write-once [`cancellation::CancelToken`]
//!   shared by a tree of [`cancellation::Task`]s, with cascading
//!   parent-to-child cancellation
//! - **Timeout guarding**: [`timeout::run_with_timeout`] races work
//!   against a deadline and never lets the caller block forever
//! - **Callback bridging**: [`bridge::bridge`] adapts a callback-based
//!   network exchange into one awaitable unit, with a cleanup hook that
//!   fires exactly once on cancellation
//! - **Non-cancellable regions**: [`cancellation::run_protected`] runs a
//!   child to natural completion regardless of its parent's cancellation
//! - **Disconnect monitoring**: [`monitor::watch_disconnect`] turns a
//!   peer closing the connection into the same cancellation path as a
//!   timeout
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use callguard::prelude::*;
//!
//! let result = invoke(
//!     InvokeOptions::new().with_timeout_units(1000),
//!     |task| async move { call_over_connection(&task, conn).await },
//! )
//! .await;
//! ```

#![warn(missing_docs, rust_2018_idioms)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod bridge;
pub mod cancellation;
pub mod client;
pub mod core;
pub mod errors;
pub mod invoke;
pub mod monitor;
pub mod observability;
pub mod testing;
pub mod timeout;


/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::bridge::{bridge, Completer, CompletionSlot, PendingOperation};
    pub use crate::cancellation::{
        run_protected, CancelReason, CancelToken, Task, TaskState,
    };
    pub use crate::client::{call_over_connection, Connection, RemoteClient};
    pub use crate::core::{InvokeStatus, Outcome};
    pub use crate::errors::CallguardError;
    pub use crate::invoke::{invoke, InvokeOptions, InvokeResult};
    pub use crate::monitor::{disconnect_channel, watch_disconnect, DisconnectSignal};
    pub use crate::timeout::{run_with_timeout, Deadline, DEFAULT_TIMEOUT_UNITS};
}
