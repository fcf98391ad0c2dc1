//! Command-line interface parsing for Keywarden
//!
//! This module defines the subcommand surface used to drive the key service
//! locally. The chat-platform frontend registers its own commands elsewhere;
//! this is the operator's direct line to the same operations.

use clap::{Parser, Subcommand};
use thiserror::Error;

use crate::api::KeyType;

/// Error types for CLI argument parsing
#[derive(Debug, Error)]
pub enum CliError {
    /// The specified key type is not recognized
    #[error("Invalid key type: '{0}'. Valid types: day, week, month, lifetime")]
    InvalidKeyType(String),
}

/// Keywarden - license-key inventory operations and cache maintenance
#[derive(Parser, Debug)]
#[command(name = "keywarden")]
#[command(about = "License-key inventory operations and cache maintenance")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Operations exposed by the binary.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Request an unused key of the given tier for a user
    GetKey {
        /// Key tier: day, week, month, or lifetime
        key_type: String,
        /// Username the key is assigned to
        #[arg(long)]
        user: String,
    },
    /// Check the status of a key by its value
    CheckKey {
        /// The key value to look up
        value: String,
    },
    /// Show the availability summary (served from cache when fresh)
    Availability,
    /// Show fresh detailed statistics, bypassing the cache
    Stats,
    /// List keys of one tier
    ListKeys {
        /// Key tier: day, week, month, or lifetime
        key_type: String,
        /// Include keys that are already assigned
        #[arg(long)]
        show_used: bool,
        /// Maximum number of keys to show
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Add a new key to the inventory
    AddKey {
        /// The key value to add
        value: String,
        /// Key tier: day, week, month, or lifetime
        key_type: String,
        /// Name recorded as the acting administrator
        #[arg(long, default_value = "admin")]
        actor: String,
    },
    /// Unassign a key from its current user
    UnassignKey {
        /// The key value to unassign
        value: String,
        /// Name recorded as the acting administrator
        #[arg(long, default_value = "admin")]
        actor: String,
    },
    /// Remove every cached entry
    ClearCache,
    /// Run cache maintenance (sweep expired entries, then compact)
    Maintain {
        /// Keep running a cycle every N hours instead of exiting
        #[arg(long, value_name = "HOURS")]
        every_hours: Option<u64>,
    },
}

/// Parses a key-type string argument into a KeyType.
///
/// # Arguments
/// * `s` - The key-type string from the CLI
///
/// # Returns
/// * `Ok(KeyType)` if the string matches a valid tier
/// * `Err(CliError::InvalidKeyType)` if the string doesn't match
pub fn parse_key_type_arg(s: &str) -> Result<KeyType, CliError> {
    KeyType::from_str(s).ok_or_else(|| CliError::InvalidKeyType(s.to_string()))
}
