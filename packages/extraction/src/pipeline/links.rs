//! Contact and about page discovery.

use lazy_static::lazy_static;
use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

use crate::types::page::FetchedPage;

lazy_static! {
    static ref ANCHOR: Selector = Selector::parse("a[href]").unwrap();
}

/// Paths tried when the homepage links to nothing that looks like a contact page.
pub const FALLBACK_PATHS: &[&str] = &["/contact", "/contact-us", "/about", "/about-us", "/impressum"];

/// Path fragments that mark a contact-like page, strongest first.
const PATH_KEYWORDS: &[(&str, u32)] = &[
    ("contact", 10),
    ("kontakt", 10),
    ("impressum", 9),
    ("imprint", 9),
    ("get-in-touch", 8),
    ("support", 5),
    ("about", 4),
    ("team", 3),
    ("legal", 2),
];

/// Anchor text that marks a contact-like link.
const TEXT_KEYWORDS: &[(&str, u32)] = &[
    ("contact", 6),
    ("get in touch", 6),
    ("reach us", 5),
    ("impressum", 5),
    ("email us", 5),
    ("about", 3),
    ("team", 2),
];

fn same_site(a: &Url, b: &Url) -> bool {
    let strip = |u: &Url| {
        u.host_str()
            .map(|h| h.trim_start_matches("www.").to_ascii_lowercase())
    };
    strip(a).is_some() && strip(a) == strip(b)
}

fn score(url: &Url, text: &str) -> u32 {
    let path = url.path().to_ascii_lowercase();
    let text = text.to_ascii_lowercase();
    let path_score = PATH_KEYWORDS
        .iter()
        .filter(|(kw, _)| path.contains(kw))
        .map(|(_, s)| *s)
        .max()
        .unwrap_or(0);
    let text_score = TEXT_KEYWORDS
        .iter()
        .filter(|(kw, _)| text.contains(kw))
        .map(|(_, s)| *s)
        .max()
        .unwrap_or(0);
    path_score + text_score
}

/// Same-site links that look like contact, about or imprint pages.
///
/// Ranked by how strongly path and anchor text suggest contact details, ties
/// kept in document order, capped at `max`.
pub fn discover_contact_links(page: &FetchedPage, max: usize) -> Vec<String> {
    let Ok(base) = Url::parse(&page.final_url) else {
        return Vec::new();
    };
    let document = Html::parse_document(&page.html);

    let mut seen = HashSet::new();
    seen.insert(strip_fragment(&base));

    let mut candidates: Vec<(u32, usize, String)> = Vec::new();
    for (position, anchor) in document.select(&ANCHOR).enumerate() {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let href = href.trim();
        if href.is_empty()
            || href.starts_with('#')
            || href.starts_with("mailto:")
            || href.starts_with("tel:")
            || href.starts_with("javascript:")
        {
            continue;
        }
        let Ok(resolved) = base.join(href) else {
            continue;
        };
        if !matches!(resolved.scheme(), "http" | "https") || !same_site(&base, &resolved) {
            continue;
        }

        let text: String = anchor.text().collect::<Vec<_>>().join(" ");
        let score = score(&resolved, &text);
        if score == 0 {
            continue;
        }

        let key = strip_fragment(&resolved);
        if seen.insert(key.clone()) {
            candidates.push((score, position, key));
        }
    }

    candidates.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    candidates.into_iter().take(max).map(|(_, _, url)| url).collect()
}

/// Well-known contact paths on the target's own origin.
pub fn fallback_contact_urls(target: &str, max: usize) -> Vec<String> {
    let Ok(base) = Url::parse(target) else {
        return Vec::new();
    };
    FALLBACK_PATHS
        .iter()
        .filter_map(|path| base.join(path).ok())
        .map(|u| u.to_string())
        .take(max)
        .collect()
}

fn strip_fragment(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.to_string()
}
