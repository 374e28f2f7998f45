//! Structured cancellation: tokens, task lifecycle, and shielded regions.
//!
//! This module provides:
//! - [`CancelToken`] for write-once, reason-carrying cancellation
//! - [`Task`] records with cascading parent-to-child cancellation
//! - [`run_protected`] for regions that ignore the cascade

mod region;
mod task;
mod token;

pub use region::run_protected;
pub use task::{Task, TaskState};
pub use token::{CancelReason, CancelToken, HookId};
