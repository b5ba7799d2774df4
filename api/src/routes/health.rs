use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use tracing::warn;

use crate::types::ParentKind;
use crate::AppState;

/// GET /api/health
///
/// Reports whether the parameter store answers, plus the nested resource
/// families this server exposes. 503 when the database is unreachable.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let resources: Vec<&str> = ParentKind::ALL
        .into_iter()
        .map(ParentKind::path_segment)
        .collect();

    match state.store.ping() {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "database": "ok",
                "resources": resources,
                "version": env!("CARGO_PKG_VERSION")
            })),
        ),
        Err(e) => {
            warn!("Health check failed: {:#}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "degraded",
                    "database": "unavailable",
                    "resources": resources,
                    "version": env!("CARGO_PKG_VERSION")
                })),
            )
        }
    }
}
