use actix_web::{get, post, web, HttpResponse, Result};
use serde::Deserialize;
use tracing::{error, info};

use crate::models::api_responses::{ModelAccuracyResponse, SuccessResponse};
use crate::server::AppState;
use crate::services::forecast::BEST_MODEL_MIN_EVALS;

#[derive(Debug, Deserialize)]
pub struct ForecastQuery {
    model: Option<String>,
}

/// GET /api/wind/forecast/models - Per-model accuracy rollup
#[get("/wind/forecast/models")]
pub async fn get_models(state: web::Data<AppState>) -> Result<HttpResponse> {
    let best = match state.forecast.best_model_id().await {
        Ok(best) => best,
        Err(e) => {
            error!("Failed to select best model: {:#}", e);
            return Ok(HttpResponse::InternalServerError()
                .json(serde_json::json!({ "error": "Failed to read model scores" })));
        }
    };

    match state.storage.model_scores().await {
        Ok(scores) => {
            let rollup: Vec<ModelAccuracyResponse> = scores
                .into_iter()
                .map(|score| ModelAccuracyResponse {
                    state: score.state(BEST_MODEL_MIN_EVALS),
                    is_best: score.model_id == best,
                    score,
                })
                .collect();
            Ok(HttpResponse::Ok().json(rollup))
        }
        Err(e) => {
            error!("Failed to read model scores: {:#}", e);
            Ok(HttpResponse::InternalServerError()
                .json(serde_json::json!({ "error": "Failed to read model scores" })))
        }
    }
}

/// GET /api/wind/forecast/compare - All models side by side
#[get("/wind/forecast/compare")]
pub async fn get_compare(state: web::Data<AppState>) -> Result<HttpResponse> {
    match state.forecast.compare_forecasts().await {
        Ok(forecasts) => Ok(HttpResponse::Ok().json(forecasts)),
        Err(e) => {
            error!("Failed to compare forecasts: {:#}", e);
            Ok(HttpResponse::InternalServerError()
                .json(serde_json::json!({ "error": "Failed to compare forecasts" })))
        }
    }
}

/// POST /api/wind/forecast/snapshot - Force-run snapshot ingestion (admin)
#[post("/wind/forecast/snapshot")]
pub async fn post_snapshot(state: web::Data<AppState>) -> Result<HttpResponse> {
    info!("Manual forecast snapshot triggered");
    match state.forecast.run_snapshot_cycle().await {
        Ok(rows) => Ok(HttpResponse::Ok().json(SuccessResponse {
            success: true,
            message: Some(format!("{} snapshot rows stored", rows)),
        })),
        Err(e) => {
            error!("Manual snapshot cycle failed: {:#}", e);
            Ok(HttpResponse::InternalServerError()
                .json(serde_json::json!({ "error": "All forecast models failed" })))
        }
    }
}

/// POST /api/wind/forecast/evaluate - Force-run scoring (admin)
#[post("/wind/forecast/evaluate")]
pub async fn post_evaluate(state: web::Data<AppState>) -> Result<HttpResponse> {
    info!("Manual forecast scoring triggered");
    match state.scoring.run().await {
        Ok(summary) => Ok(HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "accuracyRows": summary.accuracy_rows,
            "modelsScored": summary.models_scored,
        }))),
        Err(e) => {
            error!("Manual scoring run failed: {:#}", e);
            Ok(HttpResponse::InternalServerError()
                .json(serde_json::json!({ "error": "Scoring run failed" })))
        }
    }
}

/// GET /api/wind/forecast - Forecast with correction factor applied.
/// Defaults to the current best model.
#[get("/wind/forecast")]
pub async fn get_forecast(
    state: web::Data<AppState>,
    query: web::Query<ForecastQuery>,
) -> Result<HttpResponse> {
    match state.forecast.serve_forecast(query.model.as_deref()).await {
        Ok(response) => Ok(HttpResponse::Ok().json(response)),
        Err(e) if e.to_string().starts_with("unknown forecast model") => {
            Ok(HttpResponse::BadRequest().json(serde_json::json!({ "error": e.to_string() })))
        }
        Err(e) => {
            error!("Failed to serve forecast: {:#}", e);
            Ok(HttpResponse::InternalServerError()
                .json(serde_json::json!({ "error": "Failed to serve forecast" })))
        }
    }
}
