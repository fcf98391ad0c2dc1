//! Cache module for shielding the key-management API from repeated queries
//!
//! This module provides an expiring key-value cache backed by a local SQLite
//! database. Entries carry creation timestamps and are invalidated on read
//! once they outlive a caller-supplied expiry window; bulk maintenance
//! (sweeping and compaction) runs on a schedule.

mod store;

pub use store::{CacheError, CacheStore, DEFAULT_SWEEP_EXPIRY_MINUTES};
