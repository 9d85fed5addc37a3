//! Headless Chrome rendering over WebDriver (fantoccini).

use async_trait::async_trait;
use chrono::Utc;
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::map::Map as JsonMap;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{StageError, StageResult};
use crate::traits::fetcher::UrlValidator;
use crate::traits::renderer::PageRenderer;
use crate::types::page::FetchedPage;

const CHROME_ARGS: &[&str] = &[
    "--headless=new",
    "--no-sandbox",
    "--disable-gpu",
    "--disable-dev-shm-usage",
    "--window-size=1280,900",
    "--disable-extensions",
    "--disable-background-networking",
    "--disable-sync",
    "--mute-audio",
    "--log-level=1",
];

/// Renders pages in headless Chrome through a running WebDriver endpoint.
///
/// A fresh session is opened per render and always closed afterwards.
pub struct WebDriverRenderer {
    webdriver_url: String,
    user_agent: String,
    settle: Duration,
    validator: UrlValidator,
}

impl WebDriverRenderer {
    pub fn new(webdriver_url: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            webdriver_url: webdriver_url.into(),
            user_agent: user_agent.into(),
            settle: Duration::from_millis(1500),
            validator: UrlValidator::new(),
        }
    }

    /// How long to let client-side scripts run after the body appears.
    pub fn with_settle_time(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn with_validator(mut self, validator: UrlValidator) -> Self {
        self.validator = validator;
        self
    }

    fn capabilities(&self) -> JsonMap<String, serde_json::Value> {
        let mut args: Vec<String> = CHROME_ARGS.iter().map(|a| a.to_string()).collect();
        args.push(format!("--user-agent={}", self.user_agent));

        let mut caps = JsonMap::new();
        caps.insert("browserName".to_string(), serde_json::json!("chrome"));
        caps.insert(
            "goog:chromeOptions".to_string(),
            serde_json::json!({ "args": args }),
        );
        caps
    }

    async fn connect(&self) -> StageResult<Client> {
        debug!(webdriver = %self.webdriver_url, "Connecting to WebDriver");
        let mut builder = ClientBuilder::native();
        builder.capabilities(self.capabilities());
        builder.connect(&self.webdriver_url).await.map_err(|e| {
            warn!(webdriver = %self.webdriver_url, error = %e, "WebDriver connection failed");
            StageError::unavailable(format!("headless browser unavailable: {e}"))
        })
    }

    async fn load(&self, client: &Client, url: &str) -> StageResult<FetchedPage> {
        client
            .goto(url)
            .await
            .map_err(|e| StageError::unreachable(format!("browser navigation failed: {e}")))?;

        // Body presence is the readiness signal; scripts get a short settle window after it
        client
            .wait()
            .at_most(Duration::from_secs(10))
            .for_element(Locator::Css("body"))
            .await
            .map_err(|e| StageError::timeout(format!("page never rendered a body: {e}")))?;
        tokio::time::sleep(self.settle).await;

        let html = client
            .source()
            .await
            .map_err(|e| StageError::parse_failure(format!("could not read rendered DOM: {e}")))?;
        let final_url = client
            .current_url()
            .await
            .map(|u| u.to_string())
            .unwrap_or_else(|_| url.to_string());

        Ok(FetchedPage {
            url: url.to_string(),
            final_url,
            status: 200,
            html,
            content_type: Some("text/html".to_string()),
            fetched_at: Utc::now(),
            headers: HashMap::new(),
        })
    }
}

#[async_trait]
impl PageRenderer for WebDriverRenderer {
    async fn render(&self, url: &str) -> StageResult<FetchedPage> {
        self.validator.validate_with_dns(url).await?;

        let client = self.connect().await?;
        let result = self.load(&client, url).await;

        if let Err(e) = client.close().await {
            warn!(url = %url, error = %e, "Failed to close WebDriver session cleanly");
        }

        if let Ok(page) = &result {
            info!(url = %url, bytes = page.html.len(), "Rendered page in headless browser");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StageErrorKind;

    #[test]
    fn capabilities_carry_user_agent() {
        let renderer = WebDriverRenderer::new("http://localhost:9515", "TestAgent/1.0");
        let caps = renderer.capabilities();
        let args = caps["goog:chromeOptions"]["args"].as_array().unwrap();
        assert!(args.iter().any(|a| a == "--user-agent=TestAgent/1.0"));
        assert!(args.iter().any(|a| a == "--headless=new"));
    }

    #[tokio::test]
    async fn blocked_target_never_reaches_browser() {
        let renderer = WebDriverRenderer::new("http://localhost:1", "TestAgent/1.0");
        let err = renderer.render("http://169.254.169.254/").await.unwrap_err();
        assert_eq!(err.kind, StageErrorKind::Blocked);
    }
}
