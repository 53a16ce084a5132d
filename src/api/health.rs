use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

use crate::api::AppState;
use crate::database;

/// Service health: database reachability plus the set of configured
/// payment providers.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let db_healthy = database::health_check(&state.pool).await.is_ok();

    let status = if db_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let providers: Vec<&str> = state
        .config
        .gateways
        .enabled_providers()
        .iter()
        .map(|p| p.as_str())
        .collect();

    let body = json!({
        "status": if db_healthy { "healthy" } else { "degraded" },
        "version": env!("CARGO_PKG_VERSION"),
        "environment": state.config.server.environment,
        "database": if db_healthy { "up" } else { "down" },
        "providers": providers,
    });

    (status, Json(body))
}
