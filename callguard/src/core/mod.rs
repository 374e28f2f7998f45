//! Core result types shared across the crate.

mod outcome;

pub use outcome::{InvokeStatus, Outcome};
