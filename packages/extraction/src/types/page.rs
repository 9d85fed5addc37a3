//! Fetched page content passed between stages.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A page as returned by a fetcher or renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchedPage {
    /// URL that was requested
    pub url: String,

    /// URL after redirects
    pub final_url: String,

    /// HTTP status code (200 for rendered pages)
    pub status: u16,

    /// Raw HTML body
    pub html: String,

    /// Content-Type, if reported
    pub content_type: Option<String>,

    /// When the page was fetched
    pub fetched_at: DateTime<Utc>,

    /// Response headers of interest
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl FetchedPage {
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            final_url: url.clone(),
            url,
            status: 200,
            html: html.into(),
            content_type: Some("text/html".to_string()),
            fetched_at: Utc::now(),
            headers: HashMap::new(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn with_final_url(mut self, url: impl Into<String>) -> Self {
        self.final_url = url.into();
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
