//! Utility modules for netdiag-core
//!
//! - retry: exponential backoff for dynamic-policy calls

mod retry;

pub use retry::{retry_with_backoff, retry_with_scaled_backoff, RetryConfig, RetryError};
