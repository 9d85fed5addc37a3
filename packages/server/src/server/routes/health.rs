use axum::{extract::Extension, http::StatusCode, Json};
use serde::Serialize;

use crate::server::app::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    storage: StorageHealth,
    running_jobs: usize,
}

#[derive(Serialize)]
pub struct StorageHealth {
    backend: &'static str,
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Health check endpoint
///
/// Returns 200 OK when storage answers within five seconds, 503 Service
/// Unavailable otherwise.
pub async fn health_handler(
    Extension(state): Extension<AppState>,
) -> (StatusCode, Json<HealthResponse>) {
    let check = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        state.jobs.store().health_check(),
    )
    .await;

    let storage = match check {
        Ok(Ok(())) => StorageHealth {
            backend: state.storage_backend,
            status: "ok".to_string(),
            error: None,
        },
        Ok(Err(e)) => StorageHealth {
            backend: state.storage_backend,
            status: "error".to_string(),
            error: Some(format!("Health check failed: {}", e)),
        },
        Err(_) => StorageHealth {
            backend: state.storage_backend,
            status: "error".to_string(),
            error: Some("Health check timeout (>5s)".to_string()),
        },
    };

    let is_healthy = storage.status == "ok";
    let overall_status = if is_healthy { "healthy" } else { "unhealthy" };
    let status_code = if is_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(HealthResponse {
            status: overall_status.to_string(),
            storage,
            running_jobs: state.jobs.running_jobs(),
        }),
    )
}
