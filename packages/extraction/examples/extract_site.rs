//! Run the extraction pipeline for one site and print what each stage did.
//!
//! ```text
//! cargo run -p email-extraction --example extract_site -- example.com
//! WEBDRIVER_URL=http://localhost:9515 cargo run -p email-extraction --example extract_site -- example.com
//! ```

use std::sync::Arc;

use email_extraction::{
    normalize_url, FetcherExt, HttpFetcher, NullSink, Orchestrator, PageRenderer, PipelineConfig,
    TcpWhoisClient, ValidatedFetcher, WebDriverRenderer,
};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let target = std::env::args().nth(1).ok_or("usage: extract_site <url>")?;
    let url = normalize_url(&target).ok_or("not a website URL")?;

    let mut config = PipelineConfig::default();
    if let Ok(webdriver) = std::env::var("WEBDRIVER_URL") {
        config = config.with_webdriver_url(webdriver);
    }

    let fetcher = Arc::new(
        ValidatedFetcher::new(HttpFetcher::from_config(&config)?)
            .rate_limited(config.requests_per_second),
    );
    let renderer = config.webdriver_url.as_ref().map(|endpoint| {
        Arc::new(WebDriverRenderer::new(endpoint.clone(), config.user_agent.clone()))
            as Arc<dyn PageRenderer>
    });
    let whois = Arc::new(TcpWhoisClient::new(
        config.whois_server.clone(),
        config.whois_timeout,
    ));

    let orchestrator = Orchestrator::standard(fetcher, renderer, whois, config);
    let result = orchestrator
        .run(&url, &NullSink, &CancellationToken::new())
        .await;

    for entry in result.progress.entries() {
        println!(
            "{:<28} {:<10} {:>6}ms  {}",
            entry.step.to_string(),
            format!("{:?}", entry.status),
            entry.duration_ms.unwrap_or(0),
            entry.message
        );
    }
    println!();
    println!("{} ({:?})", result.url, result.status);
    for email in &result.emails {
        println!("  {email}");
    }
    Ok(())
}
