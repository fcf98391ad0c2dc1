//! Wire models for the key-management service API.
//!
//! These mirror the JSON payloads the remote service produces and consumes.
//! Field names on the wire are camelCase; deserialization is tolerant of
//! omitted optional fields so a partially filled response still parses.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// License key tiers understood by the key-management service.
///
/// The wire format identifies tiers by a small integer discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    /// 24-hour key (id 0)
    Day,
    /// 7-day key (id 1)
    Week,
    /// 30-day key (id 2)
    Month,
    /// Non-expiring key (id 3)
    Lifetime,
}

impl KeyType {
    /// Returns a slice containing all key tiers.
    pub fn all() -> &'static [KeyType] {
        &[
            KeyType::Day,
            KeyType::Week,
            KeyType::Month,
            KeyType::Lifetime,
        ]
    }

    /// Returns the wire discriminator for this tier.
    pub fn id(self) -> u8 {
        match self {
            KeyType::Day => 0,
            KeyType::Week => 1,
            KeyType::Month => 2,
            KeyType::Lifetime => 3,
        }
    }

    /// Looks up a tier by its wire discriminator.
    pub fn from_id(id: u8) -> Option<KeyType> {
        match id {
            0 => Some(KeyType::Day),
            1 => Some(KeyType::Week),
            2 => Some(KeyType::Month),
            3 => Some(KeyType::Lifetime),
            _ => None,
        }
    }

    /// Returns a human-readable label for the tier.
    pub fn label(self) -> &'static str {
        match self {
            KeyType::Day => "Day",
            KeyType::Week => "Week",
            KeyType::Month => "Month",
            KeyType::Lifetime => "Lifetime",
        }
    }

    /// Parses user input into a KeyType.
    ///
    /// Matching is case-insensitive and supports aliases:
    /// - "day" | "daily" | "0" -> Day
    /// - "week" | "weekly" | "1" -> Week
    /// - "month" | "monthly" | "2" -> Month
    /// - "lifetime" | "life" | "3" -> Lifetime
    ///
    /// Returns `None` if the input doesn't match any tier.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<KeyType> {
        match s.to_lowercase().trim() {
            "day" | "daily" | "0" => Some(KeyType::Day),
            "week" | "weekly" | "1" => Some(KeyType::Week),
            "month" | "monthly" | "2" => Some(KeyType::Month),
            "lifetime" | "life" | "3" => Some(KeyType::Lifetime),
            _ => None,
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A license key as reported by the key-management service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Key {
    /// Key ID in the remote database
    pub id: i64,
    /// The redeemable key value
    pub value: String,
    /// Tier discriminator (0=Day, 1=Week, 2=Month, 3=Lifetime)
    #[serde(rename = "type")]
    pub type_id: u8,
    /// Human-readable tier name
    #[serde(default)]
    pub type_name: String,
    /// Whether the key has been handed out
    pub used: bool,
    /// Username the key is assigned to, if any
    #[serde(default)]
    pub discord_username: Option<String>,
}

impl Key {
    /// Returns the tier of this key, if the discriminator is known.
    pub fn key_type(&self) -> Option<KeyType> {
        KeyType::from_id(self.type_id)
    }
}

/// Response envelope for key-listing endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeysResponse {
    /// Keys matching the query
    #[serde(default)]
    pub keys: Vec<Key>,
}

/// Per-tier counts within a stats response.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TypeStats {
    /// Total keys of this tier
    #[serde(default)]
    pub total: u64,
    /// Keys of this tier already handed out
    #[serde(default)]
    pub used: u64,
    /// Keys of this tier still available
    #[serde(default)]
    pub available: u64,
}

/// Aggregate inventory statistics from the stats endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyStats {
    /// Total keys in the inventory
    #[serde(default)]
    pub total_keys: u64,
    /// Keys already handed out
    #[serde(default)]
    pub used_keys: u64,
    /// Keys still available
    #[serde(default)]
    pub available_keys: u64,
    /// Per-tier breakdown keyed by tier name
    #[serde(default)]
    pub keys_by_type: HashMap<String, TypeStats>,
}
