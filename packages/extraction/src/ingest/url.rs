//! URL normalization and newline-list parsing.

use indexmap::IndexSet;
use std::net::IpAddr;
use tracing::debug;
use url::{Host, Url};

/// Normalize user input into a fetchable website URL.
///
/// Adds `https://` when no scheme is given, lower-cases the host, drops the
/// fragment and the bare trailing `/` of a root path. Returns `None` for
/// anything that is not an http(s) URL with a domain-like or IP host.
pub fn normalize_url(input: &str) -> Option<String> {
    let trimmed = input
        .trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '<' || c == '>')
        .trim();
    if trimmed.is_empty() || trimmed.chars().any(char::is_whitespace) {
        return None;
    }

    let candidate = if has_scheme(trimmed) {
        trimmed.to_string()
    } else if let Some(rest) = trimmed.strip_prefix("//") {
        format!("https://{rest}")
    } else {
        format!("https://{trimmed}")
    };

    let mut url = Url::parse(&candidate).ok()?;
    if !matches!(url.scheme(), "http" | "https")
        || !url.username().is_empty()
        || url.password().is_some()
    {
        return None;
    }
    match url.host()? {
        Host::Domain(domain) if !is_domain_like(domain) => return None,
        _ => {}
    }
    url.set_fragment(None);

    let mut normalized = url.to_string();
    if url.path() == "/" && url.query().is_none() && normalized.ends_with('/') {
        normalized.pop();
    }
    Some(normalized)
}

/// Whether the text before the first `://` is a scheme token (`[A-Za-z][A-Za-z0-9+.-]*`).
fn has_scheme(input: &str) -> bool {
    let Some((scheme, _)) = input.split_once("://") else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Whether `value` could name a website (used to spot CSV header cells).
pub fn looks_like_url(value: &str) -> bool {
    normalize_url(value).is_some()
}

/// Host of a normalized URL, without a leading `www.`.
pub fn registrable_host(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    if host.parse::<IpAddr>().is_ok() || host.starts_with('[') {
        return Some(host.to_string());
    }
    Some(host.strip_prefix("www.").unwrap_or(host).to_string())
}

fn is_domain_like(domain: &str) -> bool {
    let domain = domain.trim_end_matches('.');
    let mut labels = domain.split('.');
    let tld = match labels.next_back() {
        Some(tld) => tld,
        None => return false,
    };
    if !domain.contains('.') || domain.split('.').any(str::is_empty) {
        return false;
    }
    tld.starts_with("xn--") || (tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic()))
}

/// Normalize and de-duplicate URLs, keeping first-seen order.
///
/// Returns the accepted URLs and the raw entries that were rejected.
pub fn normalize_all<'a, I>(entries: I) -> (Vec<String>, Vec<String>)
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = IndexSet::new();
    let mut rejected = Vec::new();
    for entry in entries {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        match normalize_url(entry) {
            Some(url) => {
                seen.insert(url);
            }
            None => rejected.push(entry.to_string()),
        }
    }
    (seen.into_iter().collect(), rejected)
}

/// Parse a single URL or a newline-delimited list.
///
/// Entries may also be separated by commas or other whitespace on one line.
pub fn parse_url_list(text: &str) -> Vec<String> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let entries = text
        .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .filter(|s| !s.is_empty());
    let (urls, rejected) = normalize_all(entries);
    if !rejected.is_empty() {
        debug!(rejected = rejected.len(), "Dropped unusable URL list entries");
    }
    urls
}
