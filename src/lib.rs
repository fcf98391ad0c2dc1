//! Keywarden core library
//!
//! The core of a chat-platform bot mediating a remote license-key inventory:
//! an authenticated HTTP client with bounded retry for the key-management
//! API, an SQLite-backed expiring cache shielding that API from repeated
//! identical queries, and the orchestration service tying them together.
//! Frontends (the bundled CLI, or a chat integration) stay presentational.

pub mod api;
pub mod cache;
pub mod cli;
pub mod config;
pub mod maintenance;
pub mod notify;
pub mod ratelimit;
pub mod service;
