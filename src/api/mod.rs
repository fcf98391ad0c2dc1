//! Client for the key-management service API.
//!
//! The service owns the license-key inventory; this module provides the
//! authenticated HTTP client, the wire models, and the retry policy used for
//! transport failures.

pub mod client;
pub mod models;
pub mod retry;

pub use client::{ApiError, KeyApiClient, WriteOutcome};
pub use models::{Key, KeyStats, KeyType, KeysResponse, TypeStats};
pub use retry::{RetryPolicy, DEFAULT_MAX_ATTEMPTS};
