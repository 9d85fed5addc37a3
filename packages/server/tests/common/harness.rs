//! Test harness: the real router over in-memory storage and mock network stages.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    http::{Request, StatusCode},
    Router,
};
use email_extraction::{
    testing::{wait_for_terminal, MockFetcher, MockRenderer, MockWhois},
    Job, JobId, JobManager, MemoryQuotaGuard, MemoryStore, Orchestrator, PipelineConfig,
};
use http_body_util::BodyExt;
use server_core::server::{build_app, AppState};
use tower::ServiceExt;

pub const BOUNDARY: &str = "----extraction-test-boundary";

pub struct TestHarness {
    pub app: Router,
    pub store: Arc<MemoryStore>,
    pub quota: Arc<MemoryQuotaGuard>,
}

impl TestHarness {
    pub fn new(fetcher: MockFetcher) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let config = PipelineConfig::default()
            .with_max_retries(0)
            .with_stage_timeout(Duration::from_secs(2));
        let orchestrator = Orchestrator::standard(
            Arc::new(fetcher),
            Some(Arc::new(MockRenderer::new())),
            Arc::new(MockWhois::new()),
            config,
        );

        let store = Arc::new(MemoryStore::new());
        let quota = Arc::new(MemoryQuotaGuard::new());
        let jobs = JobManager::new(store.clone(), quota.clone(), orchestrator);
        let app = build_app(
            AppState {
                jobs,
                storage_backend: "memory",
            },
            &[],
        );

        Self { app, store, quota }
    }

    /// Send a request, returning status and body.
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Bytes) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body)
    }

    pub async fn send_json(&self, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let (status, body) = self.send(request).await;
        let json = if body.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, json)
    }

    pub async fn wait_for_job(&self, id: &str) -> Job {
        let id: JobId = id.parse().unwrap();
        wait_for_terminal(self.store.as_ref(), id, Duration::from_secs(5))
            .await
            .unwrap()
    }
}

/// Request builder carrying gateway identity headers.
pub fn as_owner(owner: &str) -> axum::http::request::Builder {
    Request::builder()
        .header("x-owner-id", owner)
        .header("x-daily-extraction-limit", "10")
}

pub fn json_body(value: serde_json::Value) -> Body {
    Body::from(serde_json::to_vec(&value).unwrap())
}

/// Single-file multipart body with the given field name.
pub fn multipart_body(field: &str, filename: &str, content: &str) -> Body {
    Body::from(format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
         Content-Type: text/csv\r\n\r\n\
         {content}\r\n\
         --{BOUNDARY}--\r\n"
    ))
}
