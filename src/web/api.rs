use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, info};

use super::AppState;
use crate::errors::LogoError;
use crate::models::{LogoSize, LogoStats};

#[derive(Debug, Deserialize)]
pub struct LogoQueryParams {
    pub size: Option<String>,
    pub bg: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ImportQueryParams {
    pub source: Option<String>,
}

pub async fn healthz() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "logo-service",
    }))
}

/// Serve a logo image for the given stock symbol.
/// Route: GET /api/v1/logos/:symbol?size=m&bg=ffffff
///
/// A cache miss triggers acquisition through the provider chain, so the
/// first request for a symbol can take several seconds.
pub async fn get_logo(
    Path(symbol): Path<String>,
    Query(params): Query<LogoQueryParams>,
    State(state): State<AppState>,
) -> Result<(HeaderMap, Vec<u8>), (StatusCode, Json<Value>)> {
    let symbol = symbol.to_uppercase();

    let size_param = params.size.as_deref().unwrap_or("m");
    let size: LogoSize = size_param.parse().map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid size: must be xs, s, m, l, or xl" })),
        )
    })?;

    let mut data = state
        .service
        .get_logo(&symbol, size, &state.shutdown_token)
        .await
        .map_err(|e| error_response(&symbol, &e))?;

    // Flatten onto a background color if requested
    if let Some(bg) = params.bg.as_deref().filter(|bg| !bg.is_empty()) {
        data = state.service.apply_background(&data, bg).map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("invalid background color: {e}") })),
            )
        })?;
    }

    // Logos don't change often
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, "image/png".parse().unwrap());
    headers.insert(
        header::CACHE_CONTROL,
        "public, max-age=86400".parse().unwrap(),
    );
    Ok((headers, data))
}

fn error_response(symbol: &str, err: &LogoError) -> (StatusCode, Json<Value>) {
    match err {
        LogoError::InvalidSize { .. } => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid size: must be xs, s, m, l, or xl" })),
        ),
        LogoError::InvalidColor { .. } => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": format!("invalid background color: {err}") })),
        ),
        // Only raised by the final blob read, after the record itself was
        // found or ingested
        LogoError::NotFound { .. } => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "logo size not available" })),
        ),
        LogoError::Database(_)
        | LogoError::Storage { .. }
        | LogoError::Internal { .. }
        | LogoError::Cancelled => {
            error!("Failed to serve logo for '{}': {}", symbol, err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "internal error" })),
            )
        }
        // Acquisition failures all collapse to a generic miss
        _ => {
            debug!("No logo available for '{}': {}", symbol, err);
            (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "logo not found" })),
            )
        }
    }
}

/// Logo counts and service statistics.
/// Route: GET /api/v1/admin/stats
pub async fn stats(
    State(state): State<AppState>,
) -> Result<Json<LogoStats>, (StatusCode, Json<Value>)> {
    match state.service.stats().await {
        Ok(stats) => Ok(Json(stats)),
        Err(e) => {
            error!("Failed to collect logo stats: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "internal error" })),
            ))
        }
    }
}

/// Trigger a bulk logo import in a background task.
/// Route: POST /api/v1/admin/import?source=all
///
/// Responds 202 immediately. The task runs on the process-level cancellation
/// scope, so it survives the client disconnecting but still stops on
/// shutdown.
pub async fn import(
    Query(params): Query<ImportQueryParams>,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    let source = params.source.unwrap_or_else(|| "all".to_string());

    if source != "all" && source != "github" {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid source: must be 'all' or 'github'" })),
        ));
    }

    let service = state.service.clone();
    let token = state.shutdown_token.clone();
    let task_source = source.clone();
    tokio::spawn(async move {
        info!("Starting background import from source '{}'", task_source);
        if let Err(e) = service.import(&task_source, &token).await {
            error!("Background import failed: {}", e);
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "status": "accepted",
            "source": source,
            "message": "import started in background",
        })),
    ))
}
