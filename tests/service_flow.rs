//! End-to-end tests for the key service orchestration.
//!
//! A stateful mock inventory server stands in for the key-management
//! service; a throwaway SQLite file backs the cache. The tests exercise the
//! read-through caching, the grant flow, the admin flows, and the webhook
//! notification payloads.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::{json, Value};
use tempfile::TempDir;

use keywarden::api::{KeyApiClient, KeyType, RetryPolicy};
use keywarden::cache::CacheStore;
use keywarden::notify::WebhookNotifier;
use keywarden::service::{KeyService, ServiceError, TypeAvailability};

/// Shared state for the mock inventory server.
#[derive(Clone)]
struct Inventory {
    keys: Arc<Mutex<Vec<Value>>>,
    type_hits: Arc<AtomicUsize>,
    stats_hits: Arc<AtomicUsize>,
}

impl Inventory {
    fn new(keys: Vec<Value>) -> Self {
        Self {
            keys: Arc::new(Mutex::new(keys)),
            type_hits: Arc::new(AtomicUsize::new(0)),
            stats_hits: Arc::new(AtomicUsize::new(0)),
        }
    }
}

fn key_fixture(id: i64, value: &str, type_id: u8, used: bool, username: Option<&str>) -> Value {
    json!({
        "id": id,
        "value": value,
        "type": type_id,
        "typeName": KeyType::from_id(type_id).map(|t| t.label()).unwrap_or("Unknown"),
        "used": used,
        "discordUsername": username,
    })
}

async fn all_keys(State(inv): State<Inventory>) -> Json<Value> {
    let keys = inv.keys.lock().unwrap().clone();
    Json(json!({ "keys": keys }))
}

async fn keys_by_type(State(inv): State<Inventory>, Path(type_id): Path<u8>) -> Json<Value> {
    inv.type_hits.fetch_add(1, Ordering::SeqCst);
    let keys: Vec<Value> = inv
        .keys
        .lock()
        .unwrap()
        .iter()
        .filter(|k| k["type"].as_u64() == Some(type_id as u64))
        .cloned()
        .collect();
    Json(json!({ "keys": keys }))
}

async fn add_key(State(inv): State<Inventory>, Json(body): Json<Value>) -> Json<Value> {
    let mut keys = inv.keys.lock().unwrap();
    let next_id = keys.len() as i64 + 1;
    let type_id = body["type"].as_u64().unwrap_or(0) as u8;
    keys.push(key_fixture(
        next_id,
        body["value"].as_str().unwrap_or(""),
        type_id,
        false,
        None,
    ));
    Json(json!({ "status": "success" }))
}

async fn use_key(
    State(inv): State<Inventory>,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> Json<Value> {
    let mut keys = inv.keys.lock().unwrap();
    for key in keys.iter_mut() {
        if key["id"].as_i64() == Some(id) {
            key["used"] = json!(true);
            key["discordUsername"] = body["discordUsername"].clone();
        }
    }
    Json(json!({ "status": "success" }))
}

async fn unuse_key(State(inv): State<Inventory>, Path(id): Path<i64>) -> Json<Value> {
    let mut keys = inv.keys.lock().unwrap();
    for key in keys.iter_mut() {
        if key["id"].as_i64() == Some(id) {
            key["used"] = json!(false);
            key["discordUsername"] = json!(null);
        }
    }
    Json(json!({ "status": "success" }))
}

async fn stats(State(inv): State<Inventory>) -> Json<Value> {
    inv.stats_hits.fetch_add(1, Ordering::SeqCst);
    let keys = inv.keys.lock().unwrap();
    let total = keys.len() as u64;
    let used = keys.iter().filter(|k| k["used"] == json!(true)).count() as u64;
    Json(json!({
        "totalKeys": total,
        "usedKeys": used,
        "availableKeys": total - used,
        "keysByType": {}
    }))
}

fn inventory_app(inv: Inventory) -> Router {
    Router::new()
        .route("/keys", get(all_keys).post(add_key))
        .route("/keys/type/:type_id", get(keys_by_type))
        .route("/keys/:id/use", put(use_key))
        .route("/keys/:id/unuse", put(unuse_key))
        .route("/stats", get(stats))
        .with_state(inv)
}

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock server");
    let addr = listener.local_addr().expect("mock server address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("mock server");
    });
    addr
}

struct Harness {
    service: KeyService,
    cache: Arc<CacheStore>,
    inventory: Inventory,
    _temp_dir: TempDir,
}

async fn harness(keys: Vec<Value>) -> Harness {
    let inventory = Inventory::new(keys);
    let addr = serve(inventory_app(inventory.clone())).await;
    let temp_dir = TempDir::new().expect("temp dir");
    let cache = Arc::new(CacheStore::new(temp_dir.path().join("cache.db")));
    let api = KeyApiClient::new(format!("http://{}", addr), "test-key")
        .with_retry_policy(RetryPolicy::new(2, Duration::from_millis(10)));
    let service = KeyService::new(api, Arc::clone(&cache));
    Harness {
        service,
        cache,
        inventory,
        _temp_dir: temp_dir,
    }
}

#[tokio::test]
async fn test_request_key_assigns_first_unused_and_refreshes_cache() {
    let harness = harness(vec![
        key_fixture(1, "DAY-USED-001", 0, true, Some("grace")),
        key_fixture(2, "DAY-FREE-002", 0, false, None),
        key_fixture(3, "DAY-FREE-003", 0, false, None),
    ])
    .await;

    let grant = harness
        .service
        .request_key("ada", KeyType::Day)
        .await
        .expect("grant");

    assert_eq!(grant.value, "DAY-FREE-002");
    assert_eq!(grant.key_type, KeyType::Day);

    // The remote inventory now shows the key as used by the requester.
    let keys = harness.inventory.keys.lock().unwrap().clone();
    let assigned = keys.iter().find(|k| k["id"].as_i64() == Some(2)).unwrap();
    assert_eq!(assigned["used"], json!(true));
    assert_eq!(assigned["discordUsername"], json!("ada"));

    // The availability cache was refreshed from the pre-assignment listing.
    let cached: Option<TypeAvailability> = harness
        .cache
        .read("keys_type_0", true, 5)
        .await
        .expect("cache read");
    assert_eq!(
        cached,
        Some(TypeAvailability {
            available: 2,
            total: 3
        })
    );
}

#[tokio::test]
async fn test_cached_zero_availability_skips_the_api_entirely() {
    let harness = harness(vec![key_fixture(1, "DAY-FREE-001", 0, false, None)]).await;

    harness
        .cache
        .write(
            "keys_type_0",
            &TypeAvailability {
                available: 0,
                total: 1,
            },
        )
        .await
        .expect("seed cache");

    let result = harness.service.request_key("ada", KeyType::Day).await;

    assert!(matches!(
        result,
        Err(ServiceError::NoKeysAvailable(KeyType::Day))
    ));
    assert_eq!(harness.inventory.type_hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_exhausted_tier_reports_no_keys_after_live_check() {
    let harness = harness(vec![key_fixture(1, "DAY-USED-001", 0, true, Some("grace"))]).await;

    let result = harness.service.request_key("ada", KeyType::Day).await;

    assert!(matches!(
        result,
        Err(ServiceError::NoKeysAvailable(KeyType::Day))
    ));
    assert_eq!(harness.inventory.type_hits.load(Ordering::SeqCst), 1);

    // The zero availability was cached, so the next requester is answered
    // without another API call.
    let result = harness.service.request_key("grace", KeyType::Day).await;
    assert!(matches!(result, Err(ServiceError::NoKeysAvailable(_))));
    assert_eq!(harness.inventory.type_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_availability_is_served_from_cache_between_calls() {
    let harness = harness(vec![
        key_fixture(1, "DAY-FREE-001", 0, false, None),
        key_fixture(2, "WEEK-USED-002", 1, true, Some("grace")),
    ])
    .await;

    let first = harness.service.availability().await.expect("stats");
    let second = harness.service.availability().await.expect("stats");

    assert_eq!(first.total_keys, 2);
    assert_eq!(second.available_keys, first.available_keys);
    assert_eq!(harness.inventory.stats_hits.load(Ordering::SeqCst), 1);

    // The uncached admin view always asks the service.
    harness.service.detailed_stats().await.expect("stats");
    assert_eq!(harness.inventory.stats_hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_disabled_cache_always_consults_the_api() {
    let Harness {
        service,
        inventory,
        _temp_dir,
        ..
    } = harness(vec![key_fixture(1, "DAY-FREE-001", 0, false, None)]).await;
    let service = service.with_cache_settings(false, 5);

    service.availability().await.expect("stats");
    service.availability().await.expect("stats");

    assert_eq!(inventory.stats_hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_check_key_finds_by_value() {
    let harness = harness(vec![
        key_fixture(1, "MONTH-USED-001", 2, true, Some("grace")),
        key_fixture(2, "MONTH-FREE-002", 2, false, None),
    ])
    .await;

    let found = harness
        .service
        .check_key("MONTH-USED-001")
        .await
        .expect("lookup");
    let key = found.expect("key exists");
    assert!(key.used);
    assert_eq!(key.discord_username.as_deref(), Some("grace"));

    let missing = harness
        .service
        .check_key("NO-SUCH-KEY")
        .await
        .expect("lookup");
    assert!(missing.is_none());
}

#[tokio::test]
async fn test_unassign_key_returns_previous_holder() {
    let harness = harness(vec![
        key_fixture(1, "WEEK-USED-001", 1, true, Some("grace")),
        key_fixture(2, "WEEK-FREE-002", 1, false, None),
    ])
    .await;

    let previous = harness
        .service
        .unassign_key("admin", "WEEK-USED-001")
        .await
        .expect("unassign");
    assert_eq!(previous, "grace");

    let keys = harness.inventory.keys.lock().unwrap().clone();
    let released = keys.iter().find(|k| k["id"].as_i64() == Some(1)).unwrap();
    assert_eq!(released["used"], json!(false));

    // Unknown and unassigned keys are rejected without a write.
    let missing = harness.service.unassign_key("admin", "NO-SUCH-KEY").await;
    assert!(matches!(missing, Err(ServiceError::KeyNotFound)));
    let unassigned = harness.service.unassign_key("admin", "WEEK-FREE-002").await;
    assert!(matches!(unassigned, Err(ServiceError::KeyNotAssigned)));
}

#[tokio::test]
async fn test_add_key_appends_to_inventory() {
    let harness = harness(vec![]).await;

    harness
        .service
        .add_key("admin", "LIFE-KEY-001", KeyType::Lifetime)
        .await
        .expect("add");

    let keys = harness.inventory.keys.lock().unwrap().clone();
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0]["value"], json!("LIFE-KEY-001"));
    assert_eq!(keys[0]["type"], json!(3));
}

/// Captures webhook posts for payload assertions.
#[derive(Clone, Default)]
struct WebhookLog {
    posts: Arc<Mutex<Vec<Value>>>,
}

async fn capture_webhook(State(log): State<WebhookLog>, Json(body): Json<Value>) -> StatusCode {
    log.posts.lock().unwrap().push(body);
    StatusCode::NO_CONTENT
}

#[tokio::test]
async fn test_notifications_carry_embed_payloads() {
    let log = WebhookLog::default();
    let webhook_app = Router::new()
        .route("/hook", post(capture_webhook))
        .with_state(log.clone());
    let webhook_addr = serve(webhook_app).await;
    let webhook_url = format!("http://{}/hook", webhook_addr);

    let Harness {
        service,
        inventory: _,
        _temp_dir,
        ..
    } = harness(vec![key_fixture(1, "DAY-FREE-001", 0, false, None)]).await;
    let service = service.with_notifications(
        WebhookNotifier::new(Some(webhook_url.clone())),
        WebhookNotifier::new(Some(webhook_url)),
    );

    service
        .request_key("ada", KeyType::Day)
        .await
        .expect("grant");
    service
        .add_key("admin", "DAY-KEY-NEW-01", KeyType::Day)
        .await
        .expect("add");

    let posts = log.posts.lock().unwrap().clone();
    assert_eq!(posts.len(), 2);

    let assigned = &posts[0]["embeds"][0];
    assert_eq!(assigned["title"], json!("Key Assigned"));
    assert_eq!(assigned["color"], json!(0x3498DB));
    assert!(assigned["description"]
        .as_str()
        .unwrap()
        .contains("assigned to ada"));
    assert!(assigned["timestamp"].is_string());

    let added = &posts[1]["embeds"][0];
    assert_eq!(added["title"], json!("[ADMIN] Key Added"));
    assert_eq!(added["color"], json!(0x00FF00));
}
