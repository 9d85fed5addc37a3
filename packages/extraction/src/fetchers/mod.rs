//! Network-backed implementations of the fetching traits.

pub mod http;
pub mod rate_limited;
pub mod webdriver;
pub mod whois;

pub use http::HttpFetcher;
pub use rate_limited::{FetcherExt, RateLimitedFetcher};
pub use webdriver::WebDriverRenderer;
pub use whois::TcpWhoisClient;
