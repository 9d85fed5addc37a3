//! WHOIS lookups.

use async_trait::async_trait;

use crate::error::StageResult;

/// Resolves a registrable domain to its WHOIS record text.
#[async_trait]
pub trait WhoisClient: Send + Sync {
    /// Return the most specific WHOIS response available for `domain`.
    async fn lookup(&self, domain: &str) -> StageResult<String>;
}
