//! Webhook notification sink for observability events.
//!
//! Posts Discord-style embeds (title, description, color, timestamp) to a
//! configured webhook URL. Notifications are fire-and-forget: failures are
//! logged and reported as `false`, never propagated. Posts are spaced out to
//! stay under the webhook rate limit.

use std::time::{Duration, Instant};

use chrono::Utc;
use reqwest::Client;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, error};

/// Embed colors used for notification events.
pub mod color {
    /// Informational events (key assignments)
    pub const BLUE: u32 = 0x3498DB;
    /// Additions and healthy-state events
    pub const GREEN: u32 = 0x00FF00;
    /// Unassignments
    pub const ORANGE: u32 = 0xFFA500;
    /// Errors and security alerts
    pub const RED: u32 = 0xFF0000;
}

/// Minimum spacing between webhook posts.
const SEND_SPACING: Duration = Duration::from_secs(2);

/// Sends embed notifications to a single webhook URL.
///
/// A notifier without a URL is disabled and drops every notification.
#[derive(Debug)]
pub struct WebhookNotifier {
    client: Client,
    url: Option<String>,
    last_sent: Mutex<Option<Instant>>,
}

impl WebhookNotifier {
    /// Creates a notifier posting to `url`; `None` disables it.
    pub fn new(url: Option<String>) -> Self {
        Self {
            client: Client::new(),
            url,
            last_sent: Mutex::new(None),
        }
    }

    /// Creates a notifier that drops everything.
    pub fn disabled() -> Self {
        Self::new(None)
    }

    /// Whether a webhook URL is configured.
    pub fn is_enabled(&self) -> bool {
        self.url.is_some()
    }

    /// Posts an embed notification.
    ///
    /// Returns whether the webhook accepted the post. Failures are logged,
    /// never propagated.
    pub async fn send(&self, title: &str, description: &str, color: u32) -> bool {
        let Some(url) = &self.url else {
            debug!("no webhook URL configured, dropping notification '{}'", title);
            return false;
        };

        let payload = json!({
            "embeds": [{
                "title": title,
                "description": description,
                "color": color,
                "timestamp": Utc::now().to_rfc3339(),
            }]
        });

        // The lock both spaces out posts and keeps them in order.
        let mut last_sent = self.last_sent.lock().await;
        if let Some(last) = *last_sent {
            if let Some(wait) = SEND_SPACING.checked_sub(last.elapsed()) {
                tokio::time::sleep(wait).await;
            }
        }

        match self.client.post(url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                *last_sent = Some(Instant::now());
                true
            }
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                error!("failed to send webhook (status {}): {}", status, body);
                false
            }
            Err(err) => {
                error!("error sending webhook: {}", err);
                false
            }
        }
    }

    /// Posts an embed notification with the admin prefix on the title.
    pub async fn send_admin(&self, title: &str, description: &str, color: u32) -> bool {
        self.send(&format!("[ADMIN] {}", title), description, color)
            .await
    }
}
