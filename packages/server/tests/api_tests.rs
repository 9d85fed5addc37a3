//! HTTP route tests against the full router.

mod common;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use email_extraction::{testing::MockFetcher, Caller, Entitlements};
use serde_json::json;

use common::*;

fn homepage_with_email() -> MockFetcher {
    MockFetcher::new().with_page("https://example.com", "<p>Contact: sales@example.com</p>")
}

#[tokio::test]
async fn health_is_public() {
    let harness = TestHarness::new(MockFetcher::new());

    let (status, body) = harness
        .send_json(Request::get("/health").body(Body::empty()).unwrap())
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["storage"]["backend"], "memory");
}

#[tokio::test]
async fn missing_owner_is_unauthorized() {
    let harness = TestHarness::new(MockFetcher::new());

    let (status, body) = harness
        .send_json(
            Request::post("/api/jobs")
                .header(header::CONTENT_TYPE, "application/json")
                .body(json_body(json!({ "url": "example.com" })))
                .unwrap(),
        )
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");
    assert_eq!(harness.store.job_count(), 0);
}

#[tokio::test]
async fn create_poll_and_export_single_url() {
    let harness = TestHarness::new(homepage_with_email());

    let (status, created) = harness
        .send_json(
            as_owner("user-1")
                .method(Method::POST)
                .uri("/api/jobs")
                .header(header::CONTENT_TYPE, "application/json")
                .body(json_body(json!({ "url": "https://example.com" })))
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["urls"], json!(["https://example.com"]));

    harness.wait_for_job(&id).await;

    let (status, job) = harness
        .send_json(
            as_owner("user-1")
                .uri(format!("/api/jobs/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(job["status"], "completed");
    assert_eq!(job["total_emails"], 1);
    assert_eq!(job["results"][0]["emails"], json!(["sales@example.com"]));
    assert_eq!(
        job["results"][0]["early_exit_after"],
        "homepage_email_extraction"
    );

    let export = as_owner("user-1")
        .uri(format!("/api/jobs/{id}/export"))
        .body(Body::empty())
        .unwrap();
    let response = tower::ServiceExt::oneshot(harness.app.clone(), export)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/csv; charset=utf-8"
    );

    let (_, csv) = harness
        .send(
            as_owner("user-1")
                .uri(format!("/api/jobs/{id}/export"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(
        std::str::from_utf8(&csv).unwrap(),
        "url,email\r\nhttps://example.com,sales@example.com\r\n"
    );
}

#[tokio::test]
async fn other_owners_cannot_see_jobs() {
    let harness = TestHarness::new(homepage_with_email());

    let (_, created) = harness
        .send_json(
            as_owner("user-1")
                .method(Method::POST)
                .uri("/api/jobs")
                .header(header::CONTENT_TYPE, "application/json")
                .body(json_body(json!({ "url": "example.com" })))
                .unwrap(),
        )
        .await;
    let id = created["id"].as_str().unwrap();

    let (status, body) = harness
        .send_json(
            as_owner("user-2")
                .uri(format!("/api/jobs/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, list) = harness
        .send_json(
            as_owner("user-2")
                .uri("/api/jobs?limit=5")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["jobs"], json!([]));
    assert_eq!(list["limit"], 5);
}

#[tokio::test]
async fn exhausted_quota_returns_429() {
    let harness = TestHarness::new(MockFetcher::new());
    let caller = Caller::new(
        "user-1",
        Entitlements {
            daily_extraction_limit: 10,
            ..Entitlements::default()
        },
    );
    harness.quota.set_used(&caller, 10);

    let (status, body) = harness
        .send_json(
            as_owner("user-1")
                .method(Method::POST)
                .uri("/api/jobs")
                .header(header::CONTENT_TYPE, "application/json")
                .body(json_body(json!({ "url": "example.com" })))
                .unwrap(),
        )
        .await;

    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "quota_exceeded");
    assert_eq!(body["quota"]["reason"], "exhausted");
    assert_eq!(harness.store.job_count(), 0);

    let (_, quota) = harness
        .send_json(
            as_owner("user-1")
                .uri("/api/quota")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(quota["used"], 10);
    assert_eq!(quota["remaining"], 0);
    assert_eq!(quota["unlimited"], false);
}

#[tokio::test]
async fn empty_url_list_is_bad_request() {
    let harness = TestHarness::new(MockFetcher::new());

    let (status, body) = harness
        .send_json(
            as_owner("user-1")
                .method(Method::POST)
                .uri("/api/jobs")
                .header(header::CONTENT_TYPE, "application/json")
                .body(json_body(json!({ "urls": "\n  \n" })))
                .unwrap(),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_input");
}

#[tokio::test]
async fn csv_upload_requires_entitlement() {
    let harness = TestHarness::new(MockFetcher::new());

    let (status, body) = harness
        .send_json(
            as_owner("user-1")
                .method(Method::POST)
                .uri("/api/jobs/upload")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={BOUNDARY}"),
                )
                .body(multipart_body("file", "sites.csv", "Website\nexample.com"))
                .unwrap(),
        )
        .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "csv_upload_not_allowed");
}

#[tokio::test]
async fn csv_upload_creates_deduplicated_job() {
    let harness = TestHarness::new(MockFetcher::new());
    let csv = "Website\na.example\nb.example\na.example\nc.example";

    let (status, job) = harness
        .send_json(
            as_owner("user-1")
                .header("x-can-use-csv-upload", "true")
                .method(Method::POST)
                .uri("/api/jobs/upload")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={BOUNDARY}"),
                )
                .body(multipart_body("file", "sites.csv", csv))
                .unwrap(),
        )
        .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(
        job["urls"],
        json!(["https://a.example", "https://b.example", "https://c.example"])
    );
}

#[tokio::test]
async fn unusable_csv_is_unprocessable() {
    let harness = TestHarness::new(MockFetcher::new());

    let (status, body) = harness
        .send_json(
            as_owner("user-1")
                .header("x-can-use-csv-upload", "true")
                .method(Method::POST)
                .uri("/api/jobs/upload")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={BOUNDARY}"),
                )
                .body(multipart_body("file", "sites.csv", "Website\nnot a site\n"))
                .unwrap(),
        )
        .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "parse_error");
}

#[tokio::test]
async fn export_before_finish_is_conflict_and_cancel_finishes() {
    let fetcher = MockFetcher::new()
        .with_page("https://slow.example", "<p>x@slow.example</p>")
        .with_delay(std::time::Duration::from_secs(30));
    let harness = TestHarness::new(fetcher);

    let (_, created) = harness
        .send_json(
            as_owner("user-1")
                .method(Method::POST)
                .uri("/api/jobs")
                .header(header::CONTENT_TYPE, "application/json")
                .body(json_body(json!({ "url": "slow.example" })))
                .unwrap(),
        )
        .await;
    let id = created["id"].as_str().unwrap().to_string();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let (status, body) = harness
        .send_json(
            as_owner("user-1")
                .uri(format!("/api/jobs/{id}/export"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "not_ready");

    let (status, cancelled) = harness
        .send_json(
            as_owner("user-1")
                .method(Method::POST)
                .uri(format!("/api/jobs/{id}/cancel"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "failed");
    assert!(cancelled["cancelled_at"].is_string());

    let (status, _) = harness
        .send(
            as_owner("user-1")
                .uri(format!("/api/jobs/{id}/export"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn invalid_job_id_is_rejected() {
    let harness = TestHarness::new(MockFetcher::new());

    let (status, _) = harness
        .send(
            as_owner("user-1")
                .uri("/api/jobs/not-a-uuid")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}
