//! HTTP page fetcher built on reqwest.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{StageError, StageResult};
use crate::traits::fetcher::PageFetcher;
use crate::types::config::{PipelineConfig, DEFAULT_USER_AGENT};
use crate::types::page::FetchedPage;

/// Bodies larger than this are truncated before extraction.
const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Headers kept on the fetched page.
const KEPT_HEADERS: &[&str] = &["content-type", "server", "x-powered-by"];

/// Fetches pages with a plain GET and follows redirects.
///
/// For JavaScript-heavy sites the headless browser stage renders the page
/// instead.
///
/// # Example
///
/// ```rust,ignore
/// use email_extraction::fetchers::{HttpFetcher, FetcherExt};
/// use email_extraction::ValidatedFetcher;
///
/// let fetcher = ValidatedFetcher::new(HttpFetcher::new()?).rate_limited(5);
/// let page = fetcher.fetch("https://example.com").await?;
/// ```
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> reqwest::Result<Self> {
        Self::with_settings(DEFAULT_USER_AGENT, Duration::from_secs(30))
    }

    pub fn from_config(config: &PipelineConfig) -> reqwest::Result<Self> {
        Self::with_settings(&config.user_agent, config.stage_timeout)
    }

    pub fn with_settings(user_agent: &str, timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;
        Ok(Self { client })
    }

    /// Set a custom HTTP client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> StageResult<FetchedPage> {
        debug!(url = %url, "HTTP fetch starting");
        let response = self
            .client
            .get(url)
            .header("Accept", "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8")
            .send()
            .await
            .map_err(|e| {
                warn!(url = %url, error = %e, "HTTP request failed");
                StageError::from(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            debug!(url = %url, status = status.as_u16(), "Non-success response");
            return Err(StageError::http_status(status.as_u16(), url));
        }

        let final_url = response.url().to_string();

        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter(|(k, _)| KEPT_HEADERS.contains(&k.as_str()))
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
            .collect();
        let content_type = headers.get("content-type").cloned();

        let mut response = response;
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(StageError::from)? {
            if append_capped(&mut body, &chunk, MAX_BODY_BYTES) {
                debug!(url = %url, cap = MAX_BODY_BYTES, "Body truncated at size cap");
                break;
            }
        }
        let html = String::from_utf8_lossy(&body).into_owned();

        debug!(url = %url, bytes = body.len(), "Page fetched");

        Ok(FetchedPage {
            url: url.to_string(),
            final_url,
            status: status.as_u16(),
            html,
            content_type,
            fetched_at: Utc::now(),
            headers,
        })
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Append `chunk` up to `cap` total bytes. Returns true once the cap is reached.
fn append_capped(body: &mut Vec<u8>, chunk: &[u8], cap: usize) -> bool {
    let room = cap.saturating_sub(body.len());
    if chunk.len() >= room {
        body.extend_from_slice(&chunk[..room]);
        return true;
    }
    body.extend_from_slice(chunk);
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StageErrorKind;

    #[test]
    fn body_reading_stops_at_the_cap() {
        let mut body = Vec::new();
        assert!(!append_capped(&mut body, b"abcd", 6));
        assert!(append_capped(&mut body, b"efgh", 6));
        assert_eq!(body, b"abcdef");
    }

    #[test]
    fn body_under_the_cap_is_kept_whole() {
        let mut body = Vec::new();
        assert!(!append_capped(&mut body, b"<p>hi</p>", 1024));
        assert_eq!(body, b"<p>hi</p>");
    }

    #[tokio::test]
    async fn connection_refused_is_unreachable() {
        let fetcher = HttpFetcher::with_settings("test", Duration::from_secs(2)).unwrap();
        // Port 9 (discard) is closed on loopback in test environments
        let err = fetcher.fetch("http://127.0.0.1:9/").await.unwrap_err();
        assert!(matches!(
            err.kind,
            StageErrorKind::Unreachable | StageErrorKind::Timeout
        ));
    }
}
