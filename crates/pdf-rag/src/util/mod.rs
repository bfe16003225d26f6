//! Shared helpers

pub mod retry;

pub use retry::{RetryFailure, RetryPolicy};
