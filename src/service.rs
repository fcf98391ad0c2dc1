//! Orchestration of the key-management API client and the response cache.
//!
//! `KeyService` is the connective tissue between the two: availability
//! queries consult the cache before touching the API, successful fetches
//! refresh it, and cache failures degrade to live lookups. The service also
//! owns the request cooldown map and the notification sinks, so the frontend
//! (chat integration or CLI) stays purely presentational.

use std::sync::Arc;
use std::time::Duration;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::api::{ApiError, Key, KeyApiClient, KeyStats, KeyType};
use crate::cache::CacheStore;
use crate::notify::{color, WebhookNotifier};
use crate::ratelimit::Cooldowns;

/// Minimum accepted length for a new key value.
pub const MIN_KEY_LENGTH: usize = 5;

/// Maximum accepted length for a new key value.
pub const MAX_KEY_LENGTH: usize = 50;

/// Cap on the number of keys returned by a listing.
pub const MAX_LISTED_KEYS: usize = 25;

/// Default spacing between key requests per user.
pub const DEFAULT_REQUEST_COOLDOWN: Duration = Duration::from_secs(60);

/// Default per-read cache expiry, in minutes.
pub const DEFAULT_CACHE_EXPIRY_MINUTES: i64 = 5;

/// Cache key for the aggregate stats summary.
const STATS_CACHE_KEY: &str = "key_stats";

/// Cached availability summary for one key tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeAvailability {
    /// Unused keys of the tier
    pub available: u64,
    /// All keys of the tier
    pub total: u64,
}

/// Cache key for a tier's availability summary.
fn availability_cache_key(key_type: KeyType) -> String {
    format!("keys_type_{}", key_type.id())
}

/// A key handed out to a requester.
#[derive(Debug, Clone)]
pub struct KeyGrant {
    /// Remote ID of the granted key
    pub key_id: i64,
    /// The redeemable key value
    pub value: String,
    /// Tier of the granted key
    pub key_type: KeyType,
}

/// Result of a key listing: the capped page plus the matching count.
#[derive(Debug, Clone)]
pub struct KeyListing {
    /// Keys shown, at most [`MAX_LISTED_KEYS`]
    pub keys: Vec<Key>,
    /// Total keys matching the filter before the cap
    pub matching: usize,
}

/// Errors surfaced by key-service operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The requester must wait before asking for another key
    #[error("requests are rate limited; retry in {}s", .0.as_secs())]
    Cooldown(Duration),

    /// No unused key of the requested tier exists
    #[error("no {0} keys are currently available")]
    NoKeysAvailable(KeyType),

    /// No key with the given value exists
    #[error("key not found")]
    KeyNotFound,

    /// The key exists but is not assigned to anyone
    #[error("key is not currently assigned to any user")]
    KeyNotAssigned,

    /// The key value fails length validation
    #[error("key values must be between {MIN_KEY_LENGTH} and {MAX_KEY_LENGTH} characters")]
    InvalidKeyValue,

    /// The remote service did not accept a write operation
    #[error("the key service rejected the operation")]
    Rejected {
        /// The underlying failure, when one was observed
        error: Option<ApiError>,
    },

    /// A read operation against the remote service failed
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Mediates key requests and admin operations over the API client and the
/// response cache.
pub struct KeyService {
    api: KeyApiClient,
    cache: Arc<CacheStore>,
    cooldowns: Cooldowns,
    notifications: WebhookNotifier,
    admin_notifications: WebhookNotifier,
    cache_enabled: bool,
    cache_expiry_minutes: i64,
}

impl KeyService {
    /// Creates a service with default cache settings, the default request
    /// cooldown, and notifications disabled.
    pub fn new(api: KeyApiClient, cache: Arc<CacheStore>) -> Self {
        Self {
            api,
            cache,
            cooldowns: Cooldowns::new(DEFAULT_REQUEST_COOLDOWN),
            notifications: WebhookNotifier::disabled(),
            admin_notifications: WebhookNotifier::disabled(),
            cache_enabled: true,
            cache_expiry_minutes: DEFAULT_CACHE_EXPIRY_MINUTES,
        }
    }

    /// Overrides whether and for how long query results are cached.
    pub fn with_cache_settings(mut self, enabled: bool, expiry_minutes: i64) -> Self {
        self.cache_enabled = enabled;
        self.cache_expiry_minutes = expiry_minutes;
        self
    }

    /// Overrides the per-user key request cooldown.
    pub fn with_request_cooldown(mut self, period: Duration) -> Self {
        self.cooldowns = Cooldowns::new(period);
        self
    }

    /// Attaches the user-facing and admin notification sinks.
    pub fn with_notifications(mut self, user: WebhookNotifier, admin: WebhookNotifier) -> Self {
        self.notifications = user;
        self.admin_notifications = admin;
        self
    }

    /// Reads a cached value, degrading to a miss on storage failure.
    async fn cached<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self
            .cache
            .read(key, self.cache_enabled, self.cache_expiry_minutes)
            .await
        {
            Ok(value) => value,
            Err(err) => {
                warn!("cache read failed for {}: {}", key, err);
                None
            }
        }
    }

    /// Refreshes a cache entry, logging (not propagating) storage failures.
    async fn refresh_cache<T: Serialize>(&self, key: &str, value: &T) {
        if !self.cache_enabled {
            return;
        }
        if let Err(err) = self.cache.write(key, value).await {
            warn!("cache update failed for {}: {}", key, err);
        }
    }

    /// Hands out an unused key of the requested tier to `user`.
    ///
    /// Applies the per-user cooldown, short-circuits on cached zero
    /// availability, refreshes the availability cache from the live listing,
    /// and marks the first unused key as used. Picking the first unused key
    /// can race with a concurrent requester; the remote service arbitrates
    /// the actual assignment.
    pub async fn request_key(
        &self,
        user: &str,
        key_type: KeyType,
    ) -> Result<KeyGrant, ServiceError> {
        let cooldown_id = format!("{}:getkey", user);
        if let Some(remaining) = self.cooldowns.check(&cooldown_id) {
            return Err(ServiceError::Cooldown(remaining));
        }
        self.cooldowns.record(&cooldown_id);

        let cache_key = availability_cache_key(key_type);
        if let Some(cached) = self.cached::<TypeAvailability>(&cache_key).await {
            if cached.available == 0 {
                return Err(ServiceError::NoKeysAvailable(key_type));
            }
        }

        let response = self.api.get_keys_by_type(key_type).await?;
        let unused: Vec<&Key> = response.keys.iter().filter(|k| !k.used).collect();

        self.refresh_cache(
            &cache_key,
            &TypeAvailability {
                available: unused.len() as u64,
                total: response.keys.len() as u64,
            },
        )
        .await;

        let Some(key) = unused.first() else {
            return Err(ServiceError::NoKeysAvailable(key_type));
        };

        let outcome = self.api.mark_key_used(key.id, user).await;
        if !outcome.accepted {
            return Err(ServiceError::Rejected {
                error: outcome.error,
            });
        }

        info!("key {} ({}) assigned to {}", key.value, key_type, user);
        self.notifications
            .send(
                "Key Assigned",
                &format!("A {} key was assigned to {}", key_type, user),
                color::BLUE,
            )
            .await;

        Ok(KeyGrant {
            key_id: key.id,
            value: key.value.clone(),
            key_type,
        })
    }

    /// Looks up a key by its value.
    pub async fn check_key(&self, value: &str) -> Result<Option<Key>, ApiError> {
        let response = self.api.get_all_keys().await?;
        Ok(response.keys.into_iter().find(|k| k.value == value))
    }

    /// Returns the aggregate availability summary, read through the cache.
    pub async fn availability(&self) -> Result<KeyStats, ApiError> {
        if let Some(stats) = self.cached::<KeyStats>(STATS_CACHE_KEY).await {
            return Ok(stats);
        }
        let stats = self.api.get_stats().await?;
        self.refresh_cache(STATS_CACHE_KEY, &stats).await;
        Ok(stats)
    }

    /// Returns fresh aggregate statistics, bypassing the cache.
    pub async fn detailed_stats(&self) -> Result<KeyStats, ApiError> {
        self.api.get_stats().await
    }

    /// Lists keys of one tier, optionally including used ones.
    ///
    /// The listing is capped at [`MAX_LISTED_KEYS`] regardless of `limit`.
    pub async fn list_keys(
        &self,
        key_type: KeyType,
        include_used: bool,
        limit: usize,
    ) -> Result<KeyListing, ApiError> {
        let response = self.api.get_keys_by_type(key_type).await?;
        let mut keys = response.keys;
        if !include_used {
            keys.retain(|k| !k.used);
        }
        let matching = keys.len();
        keys.truncate(limit.min(MAX_LISTED_KEYS));
        Ok(KeyListing { keys, matching })
    }

    /// Adds a new key to the inventory on behalf of `actor`.
    pub async fn add_key(
        &self,
        actor: &str,
        value: &str,
        key_type: KeyType,
    ) -> Result<(), ServiceError> {
        let length = value.chars().count();
        if !(MIN_KEY_LENGTH..=MAX_KEY_LENGTH).contains(&length) {
            return Err(ServiceError::InvalidKeyValue);
        }

        let outcome = self.api.add_key(value, key_type).await;
        if !outcome.accepted {
            return Err(ServiceError::Rejected {
                error: outcome.error,
            });
        }

        info!("key {} ({}) added by {}", value, key_type, actor);
        self.admin_notifications
            .send_admin(
                "Key Added",
                &format!("A {} key was added by {}", key_type, actor),
                color::GREEN,
            )
            .await;
        Ok(())
    }

    /// Returns an assigned key to the available pool on behalf of `actor`.
    ///
    /// Returns the username the key was previously assigned to.
    pub async fn unassign_key(&self, actor: &str, value: &str) -> Result<String, ServiceError> {
        let response = self.api.get_all_keys().await?;
        let Some(key) = response.keys.iter().find(|k| k.value == value) else {
            return Err(ServiceError::KeyNotFound);
        };
        if !key.used {
            return Err(ServiceError::KeyNotAssigned);
        }

        let previous = key.discord_username.clone().unwrap_or_default();
        let outcome = self.api.mark_key_unused(key.id).await;
        if !outcome.accepted {
            return Err(ServiceError::Rejected {
                error: outcome.error,
            });
        }

        info!("key {} unassigned from {} by {}", value, previous, actor);
        self.admin_notifications
            .send_admin(
                "Key Unassigned",
                &format!(
                    "Key: {}\nPrevious User: {}\nUnassigned by: {}",
                    value, previous, actor
                ),
                color::ORANGE,
            )
            .await;
        Ok(previous)
    }
}
