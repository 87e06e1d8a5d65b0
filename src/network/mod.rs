//! HTTP networking module
//!
//! Provides the HTTP client used by hosted providers.

mod client;

pub use client::HttpClient;
