//! Caller identity from the upstream auth gateway.
//!
//! The gateway authenticates the user and forwards identity and billing
//! entitlements as headers. This middleware turns them into a `Caller` in the
//! request extensions; the `CallerAuth` extractor rejects requests without one.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use email_extraction::{Caller, Entitlements};
use tracing::debug;

use crate::server::error::ApiError;

pub const OWNER_ID_HEADER: &str = "x-owner-id";
pub const DAILY_LIMIT_HEADER: &str = "x-daily-extraction-limit";
pub const CSV_UPLOAD_HEADER: &str = "x-can-use-csv-upload";
pub const UNLIMITED_HEADER: &str = "x-unlimited";

/// Caller middleware
///
/// Adds `Caller` to request extensions when an owner id is present. Requests
/// without one continue (health checks are public) and are rejected by
/// `CallerAuth` on protected routes.
pub async fn caller_middleware(
    mut request: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    if let Some(caller) = caller_from_headers(request.headers()) {
        debug!(owner_id = %caller.owner_id, "Caller identified");
        request.extensions_mut().insert(caller);
    }
    next.run(request).await
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn flag(headers: &HeaderMap, name: &str) -> bool {
    header(headers, name)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

/// Build a caller from gateway headers. Missing entitlement headers fall back
/// to the free tier.
pub fn caller_from_headers(headers: &HeaderMap) -> Option<Caller> {
    let owner_id = header(headers, OWNER_ID_HEADER)?;
    let defaults = Entitlements::default();

    let entitlements = Entitlements {
        daily_extraction_limit: header(headers, DAILY_LIMIT_HEADER)
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.daily_extraction_limit),
        can_use_csv_upload: flag(headers, CSV_UPLOAD_HEADER),
        is_unlimited: flag(headers, UNLIMITED_HEADER),
    };

    Some(Caller::new(owner_id, entitlements))
}

/// Extractor for an authenticated caller.
pub struct CallerAuth(pub Caller);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CallerAuth {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Caller>()
            .cloned()
            .map(CallerAuth)
            .ok_or(ApiError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn reads_identity_and_entitlements() {
        let mut headers = HeaderMap::new();
        headers.insert(OWNER_ID_HEADER, HeaderValue::from_static("user-42"));
        headers.insert(DAILY_LIMIT_HEADER, HeaderValue::from_static("250"));
        headers.insert(CSV_UPLOAD_HEADER, HeaderValue::from_static("true"));

        let caller = caller_from_headers(&headers).unwrap();
        assert_eq!(caller.owner_id.as_str(), "user-42");
        assert_eq!(caller.entitlements.daily_extraction_limit, 250);
        assert!(caller.entitlements.can_use_csv_upload);
        assert!(!caller.entitlements.is_unlimited);
    }

    #[test]
    fn missing_owner_is_anonymous() {
        let mut headers = HeaderMap::new();
        headers.insert(DAILY_LIMIT_HEADER, HeaderValue::from_static("5"));
        assert!(caller_from_headers(&headers).is_none());

        headers.insert(OWNER_ID_HEADER, HeaderValue::from_static("   "));
        assert!(caller_from_headers(&headers).is_none());
    }

    #[test]
    fn bad_limit_falls_back_to_free_tier() {
        let mut headers = HeaderMap::new();
        headers.insert(OWNER_ID_HEADER, HeaderValue::from_static("user-1"));
        headers.insert(DAILY_LIMIT_HEADER, HeaderValue::from_static("lots"));

        let caller = caller_from_headers(&headers).unwrap();
        assert_eq!(caller.entitlements, Entitlements::default());
    }
}
