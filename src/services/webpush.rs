use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::RwLock;
use tracing::{info, warn};
use web_push::{
    ContentEncoding, HyperWebPushClient, SubscriptionInfo, VapidSignatureBuilder, WebPushClient,
    WebPushError, WebPushMessageBuilder,
};

use crate::models::push::{NotificationPayload, WebPushSubscription};
use crate::services::PushError;

/// File-backed set of browser push subscriptions, unique by endpoint. The
/// whole array is rewritten on every mutation; volumes here are tiny.
pub struct SubscriptionStore {
    path: PathBuf,
    subs: RwLock<Vec<WebPushSubscription>>,
}

impl SubscriptionStore {
    pub fn load(path: PathBuf) -> Self {
        let subs = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<Vec<WebPushSubscription>>(&raw) {
                Ok(subs) => {
                    info!("Loaded {} web push subscriptions", subs.len());
                    subs
                }
                Err(e) => {
                    warn!("Unreadable subscription file {:?}: {}", path, e);
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };
        Self {
            path,
            subs: RwLock::new(subs),
        }
    }

    pub fn all(&self) -> Vec<WebPushSubscription> {
        self.subs.read().expect("subscription lock poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.subs.read().expect("subscription lock poisoned").len()
    }

    async fn persist(&self, snapshot: &[WebPushSubscription]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.ok();
        }
        let raw = serde_json::to_string_pretty(snapshot)?;
        tokio::fs::write(&self.path, raw)
            .await
            .with_context(|| format!("failed to persist subscriptions to {:?}", self.path))
    }

    /// Returns true when the endpoint was new.
    pub async fn add(&self, sub: WebPushSubscription) -> Result<bool> {
        let snapshot = {
            let mut subs = self.subs.write().expect("subscription lock poisoned");
            if subs.iter().any(|s| s.endpoint == sub.endpoint) {
                return Ok(false);
            }
            subs.push(sub);
            subs.clone()
        };
        self.persist(&snapshot).await?;
        Ok(true)
    }

    /// Returns true when an entry was actually removed.
    pub async fn remove(&self, endpoint: &str) -> Result<bool> {
        let snapshot = {
            let mut subs = self.subs.write().expect("subscription lock poisoned");
            let before = subs.len();
            subs.retain(|s| s.endpoint != endpoint);
            if subs.len() == before {
                return Ok(false);
            }
            subs.clone()
        };
        self.persist(&snapshot).await?;
        Ok(true)
    }
}

/// VAPID-authenticated Web Push sender. Absent VAPID keys disable the
/// channel without touching the rest of the engine.
pub struct WebPushChannel {
    client: HyperWebPushClient,
    private_key: String,
    subject: String,
}

impl WebPushChannel {
    pub fn new(private_key: Option<String>, subject: String) -> Option<Self> {
        match private_key {
            Some(private_key) => Some(Self {
                client: HyperWebPushClient::new(),
                private_key,
                subject,
            }),
            None => {
                info!("VAPID_PRIVATE_KEY not set, web push channel disabled");
                None
            }
        }
    }

    pub async fn send(
        &self,
        sub: &WebPushSubscription,
        payload: &NotificationPayload,
    ) -> Result<(), PushError> {
        let subscription = SubscriptionInfo::new(
            sub.endpoint.clone(),
            sub.keys.p256dh.clone(),
            sub.keys.auth.clone(),
        );

        let mut signature =
            VapidSignatureBuilder::from_base64(&self.private_key, web_push::URL_SAFE_NO_PAD, &subscription)
                .map_err(|e| PushError::Transient(format!("vapid key rejected: {}", e)))?;
        signature.add_claim("sub", self.subject.as_str());
        let signature = signature
            .build()
            .map_err(|e| PushError::Transient(format!("vapid signature failed: {}", e)))?;

        let body = serde_json::to_vec(payload)
            .map_err(|e| PushError::Transient(format!("payload encode failed: {}", e)))?;

        let mut message = WebPushMessageBuilder::new(&subscription);
        message.set_payload(ContentEncoding::Aes128Gcm, &body);
        message.set_vapid_signature(signature);
        let message = message
            .build()
            .map_err(|e| PushError::Transient(format!("message build failed: {}", e)))?;

        self.client.send(message).await.map_err(|e| match e {
            // 404/410 from the push service: the subscription is gone
            WebPushError::EndpointNotValid | WebPushError::EndpointNotFound => {
                PushError::Permanent(e.to_string())
            }
            other => PushError::Transient(other.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::push::SubscriptionKeys;
    use chrono::Utc;

    fn sub(endpoint: &str) -> WebPushSubscription {
        WebPushSubscription {
            endpoint: endpoint.to_string(),
            keys: SubscriptionKeys {
                p256dh: "BNcRdreALRFXTkOOUHK1EtK2wtaz5Ry4YfYCA_0QTpQtUbVlUls0VJXg7A8u-Ts1XbjhazAkj7I99e8QcYP7DkM".to_string(),
                auth: "tBHItJI5svbpez7KI4CCXg".to_string(),
            },
            locale: Some("en".to_string()),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_add_is_idempotent_by_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let store = SubscriptionStore::load(dir.path().join("subscriptions.json"));

        assert!(store.add(sub("https://push.example/a")).await.unwrap());
        assert!(!store.add(sub("https://push.example/a")).await.unwrap());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_remove_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subscriptions.json");

        let store = SubscriptionStore::load(path.clone());
        store.add(sub("https://push.example/a")).await.unwrap();
        store.add(sub("https://push.example/b")).await.unwrap();
        assert!(store.remove("https://push.example/a").await.unwrap());
        assert!(!store.remove("https://push.example/missing").await.unwrap());

        let reloaded = SubscriptionStore::load(path);
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.all()[0].endpoint, "https://push.example/b");
    }

    #[test]
    fn test_channel_disabled_without_key() {
        assert!(WebPushChannel::new(None, "mailto:x@y.z".to_string()).is_none());
    }
}
