use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Keys of a standard Web Push subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}

/// A browser push subscription as registered by the service worker.
/// `endpoint` is the unique identity; `locale` drives notification text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebPushSubscription {
    pub endpoint: String,
    pub keys: SubscriptionKeys,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

/// A registered APNs device token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceToken {
    pub token: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

/// What both delivery channels carry. Web push sends it verbatim as the
/// notification JSON; APNs maps title/body into the `aps` alert.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    pub speed_knots: f64,
    pub avg_speed_20min: f64,
    pub url: String,
    pub icon: String,
    pub badge: String,
    pub timestamp: String,
}
