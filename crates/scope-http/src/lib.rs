//! scope-http
//!
//! reqwest-backed implementations of the metadata, nearest-neighbor and row
//! enrichment services, with per-stage timeouts and bounded retry.

pub mod client;
pub mod retry;
pub mod urls;

pub use client::HttpServices;
pub use retry::RetryPolicy;
