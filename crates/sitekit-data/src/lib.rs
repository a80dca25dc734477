//! Fetch errors and retry policies.
//!
//! This crate provides:
//! - `FetchError` - Failure of a caller-supplied fetch operation
//! - `ErrorClass` - Client / server / other classification
//! - `RetryPolicy` - Classification-based retry decisions
//! - `BackoffStrategy` - Delay between retry attempts

mod error;
mod retry;

pub use error::*;
pub use retry::*;
