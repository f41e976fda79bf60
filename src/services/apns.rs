use anyhow::{Context, Result};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::models::push::{DeviceToken, NotificationPayload};
use crate::services::PushError;

/// Provider tokens may be reused for up to an hour; refresh comfortably
/// before that.
const TOKEN_LIFETIME: Duration = Duration::from_secs(50 * 60);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const PRODUCTION_HOST: &str = "https://api.push.apple.com";
const SANDBOX_HOST: &str = "https://api.sandbox.push.apple.com";

/// Push credentials document. A missing file disables the mobile channel
/// entirely; nothing else is affected.
#[derive(Debug, Clone, Deserialize)]
pub struct ApnsCredentials {
    pub key_path: String,
    pub key_id: String,
    pub team_id: String,
    pub bundle_id: String,
    #[serde(default)]
    pub sandbox: bool,
}

impl ApnsCredentials {
    pub fn load(path: &PathBuf) -> Option<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(_) => {
                info!("No APNs credentials at {:?}, mobile push disabled", path);
                return None;
            }
        };
        match serde_json::from_str::<Self>(&raw) {
            Ok(creds) => Some(creds),
            Err(e) => {
                warn!("Invalid APNs credentials document {:?}: {}", path, e);
                None
            }
        }
    }
}

/// File-backed set of registered device tokens, unique by token string.
pub struct TokenStore {
    path: PathBuf,
    tokens: RwLock<Vec<DeviceToken>>,
}

impl TokenStore {
    pub fn load(path: PathBuf) -> Self {
        let tokens = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<Vec<DeviceToken>>(&raw) {
                Ok(tokens) => {
                    info!("Loaded {} device tokens", tokens.len());
                    tokens
                }
                Err(e) => {
                    warn!("Unreadable token file {:?}: {}", path, e);
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };
        Self {
            path,
            tokens: RwLock::new(tokens),
        }
    }

    pub fn all(&self) -> Vec<DeviceToken> {
        self.tokens.read().expect("token lock poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.tokens.read().expect("token lock poisoned").len()
    }

    async fn persist(&self, snapshot: &[DeviceToken]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.ok();
        }
        let raw = serde_json::to_string_pretty(snapshot)?;
        tokio::fs::write(&self.path, raw)
            .await
            .with_context(|| format!("failed to persist device tokens to {:?}", self.path))
    }

    pub async fn add(&self, token: DeviceToken) -> Result<bool> {
        let snapshot = {
            let mut tokens = self.tokens.write().expect("token lock poisoned");
            if tokens.iter().any(|t| t.token == token.token) {
                return Ok(false);
            }
            tokens.push(token);
            tokens.clone()
        };
        self.persist(&snapshot).await?;
        Ok(true)
    }

    pub async fn remove(&self, token: &str) -> Result<bool> {
        let snapshot = {
            let mut tokens = self.tokens.write().expect("token lock poisoned");
            let before = tokens.len();
            tokens.retain(|t| t.token != token);
            if tokens.len() == before {
                return Ok(false);
            }
            tokens.clone()
        };
        self.persist(&snapshot).await?;
        Ok(true)
    }
}

#[derive(Debug, Serialize)]
struct ProviderClaims {
    iss: String,
    iat: u64,
}

/// Map an APNs response to the delivery taxonomy: reasons that mean the
/// token will never work again cause removal, everything else is counted
/// as transient.
pub fn classify_response(status: u16, reason: Option<&str>) -> PushError {
    let reason = reason.unwrap_or("");
    if status == 410 || matches!(reason, "BadDeviceToken" | "Unregistered" | "DeviceTokenNotForTopic") {
        PushError::Permanent(format!("HTTP {} {}", status, reason))
    } else {
        PushError::Transient(format!("HTTP {} {}", status, reason))
    }
}

/// Token-authenticated APNs sender over HTTP/2. The signed provider token
/// is cached and reused until it nears the hour limit.
pub struct ApnsClient {
    http: reqwest::Client,
    credentials: ApnsCredentials,
    encoding_key: EncodingKey,
    host: String,
    cached_token: Mutex<Option<(String, Instant)>>,
}

impl ApnsClient {
    pub fn new(credentials: ApnsCredentials) -> Result<Self> {
        let pem = std::fs::read(&credentials.key_path)
            .with_context(|| format!("failed to read APNs signing key {}", credentials.key_path))?;
        let encoding_key =
            EncodingKey::from_ec_pem(&pem).context("APNs signing key is not a valid EC PEM")?;

        // APNs speaks HTTP/2 only; reqwest negotiates it over ALPN.
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build APNs http client")?;

        let host = if credentials.sandbox {
            SANDBOX_HOST
        } else {
            PRODUCTION_HOST
        };

        info!(
            "APNs channel ready for topic {} ({})",
            credentials.bundle_id,
            if credentials.sandbox { "sandbox" } else { "production" }
        );

        Ok(Self {
            http,
            host: host.to_string(),
            encoding_key,
            credentials,
            cached_token: Mutex::new(None),
        })
    }

    fn provider_token(&self) -> Result<String, PushError> {
        let mut cached = self.cached_token.lock().expect("apns token lock poisoned");
        if let Some((token, minted)) = cached.as_ref() {
            if minted.elapsed() < TOKEN_LIFETIME {
                return Ok(token.clone());
            }
        }

        let mut header = Header::new(Algorithm::ES256);
        header.kid = Some(self.credentials.key_id.clone());
        let claims = ProviderClaims {
            iss: self.credentials.team_id.clone(),
            iat: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map_err(|e| PushError::Transient(e.to_string()))?
                .as_secs(),
        };
        let token = jsonwebtoken::encode(&header, &claims, &self.encoding_key)
            .map_err(|e| PushError::Transient(format!("provider token signing failed: {}", e)))?;

        *cached = Some((token.clone(), Instant::now()));
        Ok(token)
    }

    pub async fn send(&self, device_token: &str, payload: &NotificationPayload) -> Result<(), PushError> {
        let bearer = self.provider_token()?;
        let url = format!("{}/3/device/{}", self.host, device_token);

        let body = json!({
            "aps": {
                "alert": { "title": payload.title, "body": payload.body },
                "sound": "default",
                "badge": 1,
            },
            "url": payload.url,
            "speedKnots": payload.speed_knots,
            "avgSpeed20Min": payload.avg_speed_20min,
            "timestamp": payload.timestamp,
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(bearer)
            .header("apns-topic", &self.credentials.bundle_id)
            .header("apns-push-type", "alert")
            .header("apns-priority", "10")
            .json(&body)
            .send()
            .await
            .map_err(|e| PushError::Transient(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let reason = response
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|v| v.get("reason").and_then(|r| r.as_str()).map(String::from));
        Err(classify_response(status.as_u16(), reason.as_deref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_credentials_parse() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("apns.json");
        std::fs::write(
            &path,
            r#"{"key_path":"/keys/AuthKey.p8","key_id":"ABC123DEFG","team_id":"TEAM123456","bundle_id":"com.example.wind"}"#,
        )
        .unwrap();
        let creds = ApnsCredentials::load(&path).unwrap();
        assert_eq!(creds.key_id, "ABC123DEFG");
        assert!(!creds.sandbox);
    }

    #[test]
    fn test_missing_credentials_disable_channel() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ApnsCredentials::load(&dir.path().join("apns.json")).is_none());
    }

    #[test]
    fn test_classify_response_permanent_reasons() {
        assert!(matches!(
            classify_response(410, Some("Unregistered")),
            PushError::Permanent(_)
        ));
        assert!(matches!(
            classify_response(400, Some("BadDeviceToken")),
            PushError::Permanent(_)
        ));
        assert!(matches!(
            classify_response(500, Some("InternalServerError")),
            PushError::Transient(_)
        ));
        assert!(matches!(classify_response(429, None), PushError::Transient(_)));
    }

    #[tokio::test]
    async fn test_token_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device_tokens.json");

        let store = TokenStore::load(path.clone());
        let token = DeviceToken {
            token: "f00d".to_string(),
            created_at: Utc::now(),
        };
        assert!(store.add(token.clone()).await.unwrap());
        assert!(!store.add(token).await.unwrap());

        let reloaded = TokenStore::load(path);
        assert_eq!(reloaded.len(), 1);
        assert!(reloaded.remove("f00d").await.unwrap());
        assert_eq!(reloaded.len(), 0);
    }
}
