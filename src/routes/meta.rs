use actix_web::{get, HttpResponse, Result};
use chrono::Utc;

use crate::models::api_responses::VersionResponse;

/// GET /health - liveness probe
#[get("/health")]
pub async fn health() -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().body("OK"))
}

/// GET /api/version - running app version
#[get("/version")]
pub async fn version() -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(VersionResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
    }))
}
