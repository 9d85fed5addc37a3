//! Application setup and server configuration.

use axum::{
    extract::{DefaultBodyLimit, Extension},
    http::{header::CONTENT_TYPE, HeaderName, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use email_extraction::JobManager;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::server::middleware::{
    caller_middleware, CSV_UPLOAD_HEADER, DAILY_LIMIT_HEADER, OWNER_ID_HEADER, UNLIMITED_HEADER,
};
use crate::server::routes::{
    cancel_job_handler, create_job_handler, export_job_handler, get_job_handler, health_handler,
    list_jobs_handler, quota_handler, upload_job_handler,
};

/// Largest accepted CSV upload.
pub const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub jobs: JobManager,
    pub storage_backend: &'static str,
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    let allow_origin = if origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            CONTENT_TYPE,
            HeaderName::from_static(OWNER_ID_HEADER),
            HeaderName::from_static(DAILY_LIMIT_HEADER),
            HeaderName::from_static(CSV_UPLOAD_HEADER),
            HeaderName::from_static(UNLIMITED_HEADER),
        ])
}

/// Build the Axum application router
pub fn build_app(state: AppState, allowed_origins: &[String]) -> Router {
    let api = Router::new()
        .route("/jobs", post(create_job_handler).get(list_jobs_handler))
        .route(
            "/jobs/upload",
            post(upload_job_handler).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/jobs/:id", get(get_job_handler))
        .route("/jobs/:id/cancel", post(cancel_job_handler))
        .route("/jobs/:id/export", get(export_job_handler))
        .route("/quota", get(quota_handler));

    Router::new()
        .nest("/api", api)
        // Health check (no caller required)
        .route("/health", get(health_handler))
        // Middleware layers (applied in reverse order - last added runs first)
        .layer(middleware::from_fn(caller_middleware))
        .layer(Extension(state))
        .layer(cors_layer(allowed_origins))
        .layer(TraceLayer::new_for_http())
}
