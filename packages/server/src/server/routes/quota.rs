use axum::{extract::Extension, Json};
use chrono::{DateTime, Utc};
use email_extraction::QuotaLimit;
use serde::Serialize;

use crate::server::app::AppState;
use crate::server::error::ApiResult;
use crate::server::middleware::CallerAuth;

#[derive(Debug, Serialize)]
pub struct QuotaStatusResponse {
    pub used: u32,
    /// `None` when unlimited
    pub limit: Option<u32>,
    pub remaining: Option<u32>,
    pub unlimited: bool,
    pub reset_time: DateTime<Utc>,
}

/// Today's usage for the calling owner.
pub async fn quota_handler(
    Extension(state): Extension<AppState>,
    CallerAuth(caller): CallerAuth,
) -> ApiResult<Json<QuotaStatusResponse>> {
    let record = state.jobs.quota_status(&caller).await?;
    let limit = match record.limit {
        QuotaLimit::Finite(limit) => Some(limit),
        QuotaLimit::Unlimited => None,
    };
    Ok(Json(QuotaStatusResponse {
        used: record.used,
        limit,
        remaining: record.remaining(),
        unlimited: limit.is_none(),
        reset_time: record.reset_time,
    }))
}
