use actix_web::{get, web, HttpResponse};
use serde_json::json;

use crate::error::{AppError, Result};
use crate::handlers::FeedHandlerState;
use crate::metrics;

/// GET /health - probes the content store
#[get("/health")]
pub async fn health_check(state: web::Data<FeedHandlerState>) -> Result<HttpResponse> {
    state
        .service
        .repository()
        .health_check()
        .await
        .map_err(|e| AppError::ServiceUnavailable(e.to_string()))?;

    Ok(HttpResponse::Ok().json(json!({
        "status": "ok",
        "service": "feed-composer",
    })))
}

/// GET /metrics - Prometheus text exposition
#[get("/metrics")]
pub async fn metrics_endpoint() -> Result<HttpResponse> {
    let body = metrics::render().map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(body))
}
