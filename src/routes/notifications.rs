use actix_web::{get, post, web, HttpResponse, Result};
use chrono::Utc;
use serde::Deserialize;
use tracing::{error, info};

use crate::models::api_responses::{ErrorResponse, NotificationStatsResponse, SuccessResponse};
use crate::models::push::{DeviceToken, WebPushSubscription};
use crate::server::AppState;

fn internal_error(context: &str) -> HttpResponse {
    HttpResponse::InternalServerError().json(ErrorResponse {
        error: context.to_string(),
    })
}

/// POST /api/notifications/subscribe - Register a web push subscription.
/// Body is the standard subscription JSON from the service worker.
#[post("/notifications/subscribe")]
pub async fn post_subscribe(
    state: web::Data<AppState>,
    body: web::Json<WebPushSubscription>,
) -> Result<HttpResponse> {
    let sub = body.into_inner();
    if sub.endpoint.is_empty() || !sub.endpoint.starts_with("https://") {
        return Ok(HttpResponse::BadRequest().json(serde_json::json!({
            "error": "subscription endpoint must be an https URL"
        })));
    }

    match state.notifications.subscribe_web(sub).await {
        Ok(added) => {
            info!("Web push subscription registered (new: {})", added);
            Ok(HttpResponse::Ok().json(SuccessResponse {
                success: true,
                message: Some(if added { "subscribed" } else { "already subscribed" }.to_string()),
            }))
        }
        Err(e) => {
            error!("Failed to store subscription: {:#}", e);
            Ok(internal_error("Failed to store subscription"))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UnsubscribeRequest {
    endpoint: String,
}

/// POST /api/notifications/unsubscribe - Remove a subscription by endpoint
#[post("/notifications/unsubscribe")]
pub async fn post_unsubscribe(
    state: web::Data<AppState>,
    body: web::Json<UnsubscribeRequest>,
) -> Result<HttpResponse> {
    match state.notifications.unsubscribe_web(&body.endpoint).await {
        Ok(removed) => Ok(HttpResponse::Ok().json(SuccessResponse {
            success: removed,
            message: Some(if removed { "unsubscribed" } else { "not found" }.to_string()),
        })),
        Err(e) => {
            error!("Failed to remove subscription: {:#}", e);
            Ok(internal_error("Failed to remove subscription"))
        }
    }
}

/// GET /api/notifications/vapid-public-key - Key the service worker needs
/// to create a subscription
#[get("/notifications/vapid-public-key")]
pub async fn get_vapid_public_key(state: web::Data<AppState>) -> Result<HttpResponse> {
    match &state.config.vapid_public_key {
        Some(key) => Ok(HttpResponse::Ok().json(serde_json::json!({ "publicKey": key }))),
        None => Ok(HttpResponse::NotFound().json(serde_json::json!({
            "error": "web push is not configured"
        }))),
    }
}

/// GET /api/notifications/stats - Recipient counts
#[get("/notifications/stats")]
pub async fn get_stats(state: web::Data<AppState>) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(NotificationStatsResponse {
        web_subscriptions: state.notifications.subscription_count(),
        device_tokens: state.notifications.token_count(),
        notified_today: state.notifications.notified_today(),
    }))
}

/// POST /api/notifications/test - Fire a dummy notification (admin).
/// Bypasses both the stability predicate and the daily cap.
#[post("/notifications/test")]
pub async fn post_test(state: web::Data<AppState>) -> Result<HttpResponse> {
    info!("Test notification triggered");
    let summary = state.notifications.send_test().await;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "sent": summary.sent,
        "pruned": summary.pruned,
        "transient": summary.transient,
    })))
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    token: String,
}

/// POST /api/notifications/apns/register - Register a mobile device token
#[post("/notifications/apns/register")]
pub async fn post_apns_register(
    state: web::Data<AppState>,
    body: web::Json<TokenRequest>,
) -> Result<HttpResponse> {
    let token = body.into_inner().token;
    if token.is_empty() || !token.chars().all(|c| c.is_ascii_hexdigit()) {
        return Ok(HttpResponse::BadRequest().json(serde_json::json!({
            "error": "token must be a hex device token"
        })));
    }

    match state
        .notifications
        .register_token(DeviceToken {
            token,
            created_at: Utc::now(),
        })
        .await
    {
        Ok(added) => Ok(HttpResponse::Ok().json(SuccessResponse {
            success: true,
            message: Some(if added { "registered" } else { "already registered" }.to_string()),
        })),
        Err(e) => {
            error!("Failed to store device token: {:#}", e);
            Ok(internal_error("Failed to store device token"))
        }
    }
}

/// POST /api/notifications/apns/unregister - Remove a mobile device token
#[post("/notifications/apns/unregister")]
pub async fn post_apns_unregister(
    state: web::Data<AppState>,
    body: web::Json<TokenRequest>,
) -> Result<HttpResponse> {
    match state.notifications.unregister_token(&body.token).await {
        Ok(removed) => Ok(HttpResponse::Ok().json(SuccessResponse {
            success: removed,
            message: Some(if removed { "unregistered" } else { "not found" }.to_string()),
        })),
        Err(e) => {
            error!("Failed to remove device token: {:#}", e);
            Ok(internal_error("Failed to remove device token"))
        }
    }
}
