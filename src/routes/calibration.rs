use actix_web::{get, post, web, HttpResponse, Result};
use tracing::{error, info};

use crate::models::api_responses::{CalibrationRequest, CalibrationResponse};
use crate::server::AppState;
use crate::services::calibration::{OFFSET_MAX, OFFSET_MIN};

/// GET /api/calibration - Current direction offset
#[get("/calibration")]
pub async fn get_calibration(state: web::Data<AppState>) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(CalibrationResponse {
        offset: state.calibration.offset(),
        updated_at: state.calibration.updated_at(),
    }))
}

/// POST /api/calibration - Set the direction offset. Out-of-bounds values
/// are a 400 and leave the stored offset untouched.
#[post("/calibration")]
pub async fn post_calibration(
    state: web::Data<AppState>,
    body: web::Json<CalibrationRequest>,
) -> Result<HttpResponse> {
    let offset = body.offset;
    if !offset.is_finite() || !(OFFSET_MIN..=OFFSET_MAX).contains(&offset) {
        return Ok(HttpResponse::BadRequest().json(serde_json::json!({
            "error": format!("offset must be within [{}, {}]", OFFSET_MIN, OFFSET_MAX)
        })));
    }

    match state.calibration.set_offset(offset).await {
        Ok(()) => {
            info!("Calibration offset updated to {}°", offset);
            Ok(HttpResponse::Ok().json(CalibrationResponse {
                offset: state.calibration.offset(),
                updated_at: state.calibration.updated_at(),
            }))
        }
        Err(e) => {
            error!("Failed to persist calibration: {:#}", e);
            Ok(HttpResponse::InternalServerError()
                .json(serde_json::json!({ "error": "Failed to persist calibration" })))
        }
    }
}
