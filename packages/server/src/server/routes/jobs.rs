//! Job endpoints: create, upload, poll, list, cancel, export.

use axum::{
    extract::{Extension, Multipart, Path, Query},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use email_extraction::{Job, JobId, UrlInput};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::server::app::AppState;
use crate::server::error::{ApiError, ApiResult};
use crate::server::middleware::CallerAuth;

/// Multipart field carrying the CSV upload.
pub const UPLOAD_FIELD: &str = "file";

const DEFAULT_PAGE_SIZE: usize = 20;

/// Body of `POST /api/jobs`: either one `url` or a newline-separated `urls`.
#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub url: Option<String>,
    pub urls: Option<String>,
}

impl CreateJobRequest {
    fn into_input(self) -> ApiResult<UrlInput> {
        match (self.url, self.urls) {
            (Some(url), None) => Ok(UrlInput::Single(url)),
            (None, Some(urls)) => Ok(UrlInput::List(urls)),
            (Some(_), Some(_)) => Err(ApiError::BadRequest(
                "provide either `url` or `urls`, not both".into(),
            )),
            (None, None) => Err(ApiError::BadRequest("`url` or `urls` is required".into())),
        }
    }
}

pub async fn create_job_handler(
    Extension(state): Extension<AppState>,
    CallerAuth(caller): CallerAuth,
    Json(request): Json<CreateJobRequest>,
) -> ApiResult<(StatusCode, Json<Job>)> {
    let input = request.into_input()?;
    let job = state.jobs.create_job(&caller, input).await?;
    Ok((StatusCode::ACCEPTED, Json(job)))
}

pub async fn upload_job_handler(
    Extension(state): Extension<AppState>,
    CallerAuth(caller): CallerAuth,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<Job>)> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("invalid multipart body: {e}")))?
    {
        if field.name() == Some(UPLOAD_FIELD) {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(format!("failed to read upload: {e}")))?;
            upload = Some(bytes.to_vec());
            break;
        }
    }

    let bytes = upload.ok_or_else(|| {
        ApiError::BadRequest(format!("multipart field `{UPLOAD_FIELD}` is required"))
    })?;
    info!(owner_id = %caller.owner_id, bytes = bytes.len(), "CSV upload received");

    let job = state.jobs.create_job(&caller, UrlInput::Csv(bytes)).await?;
    Ok((StatusCode::ACCEPTED, Json(job)))
}

pub async fn get_job_handler(
    Extension(state): Extension<AppState>,
    CallerAuth(caller): CallerAuth,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Job>> {
    let job = state
        .jobs
        .get_job(&caller.owner_id, JobId::from_uuid(id))
        .await?;
    Ok(Json(job))
}

#[derive(Debug, Deserialize)]
pub struct ListJobsParams {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Serialize)]
pub struct JobListResponse {
    pub jobs: Vec<Job>,
    pub limit: usize,
    pub offset: usize,
}

pub async fn list_jobs_handler(
    Extension(state): Extension<AppState>,
    CallerAuth(caller): CallerAuth,
    Query(params): Query<ListJobsParams>,
) -> ApiResult<Json<JobListResponse>> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, email_extraction::jobs::MAX_PAGE_SIZE);
    let offset = params.offset.unwrap_or(0);

    let jobs = state.jobs.list_jobs(&caller.owner_id, limit, offset).await?;
    Ok(Json(JobListResponse {
        jobs,
        limit,
        offset,
    }))
}

pub async fn cancel_job_handler(
    Extension(state): Extension<AppState>,
    CallerAuth(caller): CallerAuth,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Job>> {
    let job = state
        .jobs
        .cancel_job(&caller.owner_id, JobId::from_uuid(id))
        .await?;
    Ok(Json(job))
}

pub async fn export_job_handler(
    Extension(state): Extension<AppState>,
    CallerAuth(caller): CallerAuth,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let id = JobId::from_uuid(id);
    let csv = state.jobs.export(&caller.owner_id, id).await?;
    let disposition = format!("attachment; filename=\"emails-{id}.csv\"");

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    ))
}
