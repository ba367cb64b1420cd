//! HTTP transport with bounded retry and failure classification.

mod client;
mod error;
mod retry;

pub use client::{Body, FilePart, HttpClient, Method, RawResponse};
pub use error::TransportError;
pub use retry::{
    Disposition, MAX_ATTEMPTS, MAX_RETRIES, MAX_RETRY_DELAY_MS, RETRY_DELAY_MS, RetryPolicy,
    classify_status,
};
