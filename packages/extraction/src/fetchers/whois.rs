//! WHOIS over TCP port 43 with referral following.

use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::error::{StageError, StageResult};
use crate::traits::fetcher::UrlValidator;
use crate::traits::whois::WhoisClient;

const WHOIS_PORT: u16 = 43;
const MAX_RESPONSE_BYTES: u64 = 256 * 1024;
const MAX_REFERRALS: usize = 2;

/// Queries a root WHOIS server and follows registry/registrar referrals.
///
/// Starting at `whois.iana.org`, the TLD registry is found from the `refer:`
/// line, then the registrar from `Registrar WHOIS Server:`. The deepest
/// successful response wins; a failing referral falls back to the previous one.
/// Referral hosts come from remote replies and pass the same SSRF checks as
/// page fetches before they are contacted.
pub struct TcpWhoisClient {
    root_server: String,
    timeout: Duration,
    validator: UrlValidator,
}

impl TcpWhoisClient {
    pub fn new(root_server: impl Into<String>, timeout: Duration) -> Self {
        Self {
            root_server: root_server.into(),
            timeout,
            validator: UrlValidator::new(),
        }
    }

    pub fn with_validator(mut self, validator: UrlValidator) -> Self {
        self.validator = validator;
        self
    }

    async fn referral_allowed(&self, host: &str) -> bool {
        match self.validator.validate_host(host, WHOIS_PORT).await {
            Ok(()) => true,
            Err(e) => {
                warn!(server = %host, error = %e, "Refusing WHOIS referral");
                false
            }
        }
    }

    async fn query(&self, server: &str, query: &str) -> StageResult<String> {
        debug!(server = %server, query = %query, "WHOIS query");
        let exchange = async {
            let mut stream = TcpStream::connect((server, WHOIS_PORT)).await?;
            stream.write_all(format!("{query}\r\n").as_bytes()).await?;
            let mut buf = Vec::new();
            stream.take(MAX_RESPONSE_BYTES).read_to_end(&mut buf).await?;
            Ok::<_, std::io::Error>(buf)
        };

        let bytes = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| StageError::timeout(format!("WHOIS server {server} timed out")))?
            .map_err(|e| StageError::unreachable(format!("WHOIS server {server}: {e}")))?;

        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[async_trait]
impl WhoisClient for TcpWhoisClient {
    async fn lookup(&self, domain: &str) -> StageResult<String> {
        let mut response = self.query(&self.root_server, domain).await?;
        let mut server = self.root_server.clone();

        for _ in 0..MAX_REFERRALS {
            let next = match referral(&response) {
                Some(next) if !next.eq_ignore_ascii_case(&server) => next,
                _ => break,
            };
            if !self.referral_allowed(&next).await {
                break;
            }
            match self.query(&next, domain).await {
                Ok(body) if !body.trim().is_empty() => {
                    response = body;
                    server = next;
                }
                Ok(_) => break,
                Err(e) => {
                    warn!(server = %next, error = %e, "WHOIS referral failed, keeping previous response");
                    break;
                }
            }
        }

        if is_no_match(&response) {
            return Err(StageError::parse_failure(format!(
                "no WHOIS record for {domain}"
            )));
        }
        Ok(response)
    }
}

/// Next server named by a WHOIS response, if any.
pub fn referral(response: &str) -> Option<String> {
    response.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim();
        let is_referral = matches!(
            key.as_str(),
            "refer" | "whois" | "registrar whois server" | "referralserver"
        );
        if !is_referral || value.is_empty() {
            return None;
        }
        let host = value
            .trim_start_matches("whois://")
            .trim_start_matches("rwhois://")
            .split(['/', ':'])
            .next()?
            .trim();
        (!host.is_empty()).then(|| host.to_ascii_lowercase())
    })
}

fn is_no_match(response: &str) -> bool {
    let lower = response.to_ascii_lowercase();
    response.trim().is_empty()
        || lower.contains("no match for")
        || lower.contains("not found")
        || lower.contains("no data found")
        || lower.contains("no entries found")
}
