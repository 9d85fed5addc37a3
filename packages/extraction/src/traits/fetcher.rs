//! Page fetching trait and URL validation for SSRF protection.

use async_trait::async_trait;
use std::collections::HashSet;
use std::net::IpAddr;

use crate::error::{SecurityError, SecurityResult, StageError, StageResult};
use crate::types::page::FetchedPage;

/// Fetches a single page over HTTP.
///
/// Implementations return `Err` with `http_status` for non-2xx responses so
/// that callers can tell "reached but refused" apart from "unreachable".
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> StageResult<FetchedPage>;

    /// Fetcher name for logging.
    fn name(&self) -> &str {
        "fetcher"
    }
}

#[async_trait]
impl<T: PageFetcher + ?Sized> PageFetcher for std::sync::Arc<T> {
    async fn fetch(&self, url: &str) -> StageResult<FetchedPage> {
        (**self).fetch(url).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

const BLOCKED_HOSTS: &[&str] = &[
    "localhost",
    "127.0.0.1",
    "::1",
    "[::1]",
    "0.0.0.0",
    "metadata.google.internal",
    "metadata.gke.internal",
    "instance-data",
];

const BLOCKED_CIDRS: &[&str] = &[
    "10.0.0.0/8",
    "172.16.0.0/12",
    "192.168.0.0/16",
    "169.254.0.0/16", // Link-local / cloud metadata
    "127.0.0.0/8",
    "0.0.0.0/8",
    "100.64.0.0/10", // Carrier-grade NAT
    "::1/128",
    "fc00::/7",
    "fe80::/10",
];

/// URL validator for SSRF protection.
///
/// Target sites come from untrusted user input, so every outbound URL is
/// checked against loopback, private and metadata ranges before it is fetched.
#[derive(Debug, Clone)]
pub struct UrlValidator {
    allowed_schemes: HashSet<String>,
    blocked_hosts: HashSet<String>,
    blocked_cidrs: Vec<ipnet::IpNet>,
    /// Bypass normal validation (tests, trusted internal targets)
    allowed_hosts: HashSet<String>,
}

impl Default for UrlValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl UrlValidator {
    pub fn new() -> Self {
        Self {
            allowed_schemes: ["http", "https"].into_iter().map(String::from).collect(),
            blocked_hosts: BLOCKED_HOSTS.iter().map(|h| h.to_string()).collect(),
            blocked_cidrs: BLOCKED_CIDRS
                .iter()
                .filter_map(|cidr| cidr.parse().ok())
                .collect(),
            allowed_hosts: HashSet::new(),
        }
    }

    /// Add an allowed host (bypasses validation).
    pub fn allow_host(mut self, host: impl Into<String>) -> Self {
        self.allowed_hosts.insert(host.into());
        self
    }

    /// Block an additional host.
    pub fn block_host(mut self, host: impl Into<String>) -> Self {
        self.blocked_hosts.insert(host.into());
        self
    }

    fn check_ip(&self, ip: IpAddr) -> SecurityResult<()> {
        match self.blocked_cidrs.iter().find(|cidr| cidr.contains(&ip)) {
            Some(_) => Err(SecurityError::BlockedCidr(ip.to_string())),
            None => Ok(()),
        }
    }

    /// Validate a URL for safety without touching the network.
    pub fn validate(&self, url: &str) -> SecurityResult<()> {
        let parsed = url::Url::parse(url)?;

        if !self.allowed_schemes.contains(parsed.scheme()) {
            return Err(SecurityError::DisallowedScheme(parsed.scheme().to_string()));
        }

        let host = parsed.host_str().ok_or(SecurityError::NoHost)?;

        if self.allowed_hosts.contains(host) {
            return Ok(());
        }

        if self.blocked_hosts.contains(host) {
            return Err(SecurityError::BlockedHost(host.to_string()));
        }

        let bare = host.trim_start_matches('[').trim_end_matches(']');
        if let Ok(ip) = bare.parse::<IpAddr>() {
            self.check_ip(ip)?;
        }

        Ok(())
    }

    /// Validate a URL and resolve DNS to check the actual IP.
    ///
    /// Catches hostnames that resolve to internal addresses. A failed lookup
    /// is left for the fetch itself to report as unreachable.
    pub async fn validate_with_dns(&self, url: &str) -> SecurityResult<()> {
        self.validate(url)?;

        let parsed = url::Url::parse(url)?;
        let host = parsed.host_str().ok_or(SecurityError::NoHost)?;

        if self.allowed_hosts.contains(host) || host.parse::<IpAddr>().is_ok() {
            return Ok(());
        }

        let port = parsed.port_or_known_default().unwrap_or(80);
        let addrs = match tokio::net::lookup_host((host, port)).await {
            Ok(addrs) => addrs,
            Err(_) => return Ok(()),
        };

        for addr in addrs {
            self.check_ip(addr.ip()).map_err(|_| {
                SecurityError::BlockedCidr(format!(
                    "DNS for {} resolved to blocked IP {}",
                    host,
                    addr.ip()
                ))
            })?;
        }

        Ok(())
    }

    /// Validate a bare `host:port` endpoint, such as a WHOIS referral.
    pub async fn validate_host(&self, host: &str, port: u16) -> SecurityResult<()> {
        let host = if host.contains(':') && !host.starts_with('[') {
            format!("[{host}]")
        } else {
            host.to_string()
        };
        self.validate_with_dns(&format!("https://{host}:{port}/")).await
    }
}

/// A fetcher that validates URLs before fetching.
pub struct ValidatedFetcher<F: PageFetcher> {
    inner: F,
    validator: UrlValidator,
}

impl<F: PageFetcher> ValidatedFetcher<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            inner: fetcher,
            validator: UrlValidator::new(),
        }
    }

    pub fn with_validator(fetcher: F, validator: UrlValidator) -> Self {
        Self {
            inner: fetcher,
            validator,
        }
    }
}

#[async_trait]
impl<F: PageFetcher> PageFetcher for ValidatedFetcher<F> {
    async fn fetch(&self, url: &str) -> StageResult<FetchedPage> {
        self.validator.validate_with_dns(url).await?;

        let page = self.inner.fetch(url).await?;

        // Redirects may land somewhere we would not have fetched directly
        if page.final_url != page.url {
            self.validator
                .validate(&page.final_url)
                .map_err(StageError::from)?;
        }

        Ok(page)
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
