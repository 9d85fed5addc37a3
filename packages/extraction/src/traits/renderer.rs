//! Headless browser rendering.

use async_trait::async_trait;

use crate::error::StageResult;
use crate::types::page::FetchedPage;

/// Renders a page in a real browser so client-side content is present in the DOM.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Load `url` and return the rendered document.
    async fn render(&self, url: &str) -> StageResult<FetchedPage>;
}
