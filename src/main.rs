//! Keywarden - license-key inventory operations from the terminal
//!
//! Loads configuration from the environment (with `.env` support), builds
//! the key service on top of the API client and the response cache, and
//! dispatches one subcommand.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use keywarden::api::KeyApiClient;
use keywarden::cache::CacheStore;
use keywarden::cli::{parse_key_type_arg, Cli, Command};
use keywarden::config::Config;
use keywarden::maintenance;
use keywarden::notify::WebhookNotifier;
use keywarden::service::KeyService;

/// Initializes the tracing subscriber, seeding the filter from the
/// configured log level unless RUST_LOG overrides it.
fn init_tracing(log_level: &str) {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("keywarden={}", log_level))),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Prints the per-tier breakdown of a stats response in a stable order.
fn print_tier_breakdown(stats: &keywarden::api::KeyStats) {
    let mut tiers: Vec<_> = stats.keys_by_type.iter().collect();
    tiers.sort_by(|a, b| a.0.cmp(b.0));
    for (name, tier) in tiers {
        println!(
            "  {}: available {} / {} (used {})",
            name, tier.available, tier.total, tier.used
        );
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Pick up a local .env before reading the environment.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    init_tracing(&config.log_level);

    let cache_path = config
        .cache_path
        .clone()
        .map(PathBuf::from)
        .or_else(CacheStore::default_path)
        .unwrap_or_else(|| PathBuf::from("cache.db"));
    let cache = Arc::new(CacheStore::new(cache_path));

    let api = KeyApiClient::new(&config.api_base_url, &config.api_key);
    let service = KeyService::new(api, Arc::clone(&cache))
        .with_cache_settings(config.cache_enabled, config.cache_expiry_minutes)
        .with_request_cooldown(Duration::from_secs(config.request_cooldown_secs))
        .with_notifications(
            WebhookNotifier::new(config.notification_webhook_url.clone()),
            WebhookNotifier::new(config.admin_webhook_url.clone()),
        );

    match cli.command {
        Command::GetKey { key_type, user } => {
            let key_type = parse_key_type_arg(&key_type)?;
            let grant = service.request_key(&user, key_type).await?;
            println!("Assigned {} key to {}: {}", grant.key_type, user, grant.value);
            println!("Keep this key private and do not share it!");
        }
        Command::CheckKey { value } => match service.check_key(&value).await? {
            None => println!("This key does not exist in the system."),
            Some(key) => {
                println!("Key: {}", key.value);
                println!("Type: {}", key.type_name);
                if key.used {
                    println!("Status: Used");
                    println!(
                        "Assigned to: {}",
                        key.discord_username.unwrap_or_else(|| "None".to_string())
                    );
                } else {
                    println!("Status: Available");
                }
            }
        },
        Command::Availability => {
            let stats = service.availability().await?;
            println!(
                "Available: {} / {} keys",
                stats.available_keys, stats.total_keys
            );
            print_tier_breakdown(&stats);
        }
        Command::Stats => {
            let stats = service.detailed_stats().await?;
            println!("Total keys: {}", stats.total_keys);
            println!("Used keys: {}", stats.used_keys);
            println!("Available keys: {}", stats.available_keys);
            print_tier_breakdown(&stats);
            if stats.total_keys > 0 {
                let usage = stats.used_keys as f64 / stats.total_keys as f64 * 100.0;
                println!("Overall usage: {:.1}%", usage);
            }
        }
        Command::ListKeys {
            key_type,
            show_used,
            limit,
        } => {
            let key_type = parse_key_type_arg(&key_type)?;
            let listing = service.list_keys(key_type, show_used, limit).await?;
            if listing.keys.is_empty() {
                if show_used {
                    println!("No {} keys found.", key_type);
                } else {
                    println!("No available {} keys found.", key_type);
                }
            } else {
                println!(
                    "Showing {} out of {} {} keys",
                    listing.keys.len(),
                    listing.matching,
                    key_type
                );
                for key in listing.keys {
                    if key.used {
                        println!(
                            "  {} - Used by {}",
                            key.value,
                            key.discord_username.unwrap_or_else(|| "None".to_string())
                        );
                    } else {
                        println!("  {} - Available", key.value);
                    }
                }
            }
        }
        Command::AddKey {
            value,
            key_type,
            actor,
        } => {
            let key_type = parse_key_type_arg(&key_type)?;
            service.add_key(&actor, &value, key_type).await?;
            println!("Successfully added {} key: {}", key_type, value);
        }
        Command::UnassignKey { value, actor } => {
            let previous = service.unassign_key(&actor, &value).await?;
            println!("Successfully unassigned key {} from {}", value, previous);
        }
        Command::ClearCache => {
            cache.clear().await?;
            println!("Cache cleared.");
        }
        Command::Maintain { every_hours } => match every_hours {
            None => maintenance::run_cycle(&cache, config.cache_expiry_minutes).await,
            Some(hours) => {
                let handle = maintenance::spawn(
                    Arc::clone(&cache),
                    config.cache_expiry_minutes,
                    Duration::from_secs(hours.max(1) * 3600),
                );
                tokio::signal::ctrl_c().await?;
                handle.abort();
            }
        },
    }

    Ok(())
}
