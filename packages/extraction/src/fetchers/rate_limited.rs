//! Rate-limited fetcher wrapper.
//!
//! Wraps any PageFetcher with rate limiting using the governor crate.

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use std::num::NonZeroU32;
use std::sync::Arc;

use crate::error::StageResult;
use crate::traits::fetcher::PageFetcher;
use crate::types::page::FetchedPage;

type DefaultRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// A fetcher wrapper that enforces a shared outbound request rate.
///
/// One limiter is shared by every pipeline of every job, so the rate is a
/// process-wide ceiling rather than per target.
pub struct RateLimitedFetcher<F: PageFetcher> {
    inner: F,
    limiter: Arc<DefaultRateLimiter>,
}

impl<F: PageFetcher> RateLimitedFetcher<F> {
    /// Zero is treated as one request per second.
    pub fn new(fetcher: F, requests_per_second: u32) -> Self {
        let rps = NonZeroU32::new(requests_per_second).unwrap_or(nonzero!(1u32));
        Self::with_quota(fetcher, Quota::per_second(rps))
    }

    pub fn with_quota(fetcher: F, quota: Quota) -> Self {
        Self {
            inner: fetcher,
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    /// Sustained rate with a larger initial burst.
    pub fn with_burst(fetcher: F, requests_per_second: u32, burst: u32) -> Self {
        let rps = NonZeroU32::new(requests_per_second).unwrap_or(nonzero!(1u32));
        let burst = NonZeroU32::new(burst).unwrap_or(rps);
        Self::with_quota(fetcher, Quota::per_second(rps).allow_burst(burst))
    }
}

#[async_trait]
impl<F: PageFetcher> PageFetcher for RateLimitedFetcher<F> {
    async fn fetch(&self, url: &str) -> StageResult<FetchedPage> {
        self.limiter.until_ready().await;
        self.inner.fetch(url).await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

/// Extension trait for easy rate limiting.
pub trait FetcherExt: PageFetcher + Sized {
    fn rate_limited(self, requests_per_second: u32) -> RateLimitedFetcher<Self> {
        RateLimitedFetcher::new(self, requests_per_second)
    }
}

impl<F: PageFetcher + Sized> FetcherExt for F {}
