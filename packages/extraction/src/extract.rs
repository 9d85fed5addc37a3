//! Email matching over page HTML and WHOIS records.

use indexmap::IndexSet;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Conservative address pattern; validity beyond shape is checked in `is_plausible_email`
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"(?i)\b[a-z0-9][a-z0-9._+-]{0,63}@(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,24}\b"
    ).unwrap();

    // Obfuscated or encoded `@`
    static ref ENCODED_AT: Regex = Regex::new(
        r"(?i)&#0*64;|&#x0*40;|&commat;|%40"
    ).unwrap();

    // Retina asset names such as logo@2x.png
    static ref RETINA_SUFFIX: Regex = Regex::new(r"(?i)^\d+(?:\.\d+)?x\.").unwrap();
}

/// File extensions that show up after an `@` in asset paths, never real TLDs.
const ASSET_SUFFIXES: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "webp", "svg", "bmp", "ico", "tif", "tiff", "avif", "css", "js",
    "mjs", "map", "json", "mp4", "webm", "mp3", "woff", "woff2", "ttf", "otf", "eot", "pdf",
];

/// Domains that only ever appear as tracking or placeholder addresses.
const IGNORED_DOMAINS: &[&str] = &[
    "sentry.io",
    "wixpress.com",
    "sentry-next.wixpress.com",
    "domain.com",
    "yourdomain.com",
    "email.tld",
];

/// Markers of privacy proxies and redacted WHOIS contacts.
const PRIVACY_MARKERS: &[&str] = &[
    "redacted",
    "privacy",
    "proxy",
    "protect",
    "whoisguard",
    "withheld",
    "anonymi",
    "not disclosed",
    "contact the registrar",
    "gdpr",
];

/// Decode the encodings sites use to hide `@` from naive scrapers.
fn decode_obfuscation(text: &str) -> String {
    let decoded = ENCODED_AT.replace_all(text, "@");
    decoded.replace("%20", " ").replace("&#46;", ".").replace("&period;", ".")
}

/// Whether a regex match is a real-looking address rather than an asset path
/// or a tracking identifier.
pub fn is_plausible_email(candidate: &str) -> bool {
    let Some((local, domain)) = candidate.rsplit_once('@') else {
        return false;
    };
    let domain = domain.to_ascii_lowercase();

    if local.is_empty() || local.starts_with('.') || local.ends_with('.') || local.contains("..") {
        return false;
    }

    let tld = domain.rsplit('.').next().unwrap_or("");
    if ASSET_SUFFIXES.contains(&tld) {
        return false;
    }

    if RETINA_SUFFIX.is_match(&domain) {
        return false;
    }

    if IGNORED_DOMAINS
        .iter()
        .any(|ignored| domain == *ignored || domain.ends_with(&format!(".{ignored}")))
    {
        return false;
    }

    true
}

/// Find email addresses in page HTML or plain text.
///
/// Covers plain addresses, `mailto:` links and the common encodings of `@`
/// (`%40`, `&#64;`, `&#x40;`). Results are lower-cased, de-duplicated and
/// in order of first appearance.
pub fn extract_emails(text: &str) -> IndexSet<String> {
    let decoded = decode_obfuscation(text);
    EMAIL_REGEX
        .find_iter(&decoded)
        .map(|m| m.as_str())
        .filter(|candidate| is_plausible_email(candidate))
        .map(|email| email.to_lowercase())
        .collect()
}

fn is_private(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    PRIVACY_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Contact emails from a WHOIS record.
///
/// Only registrant, admin and tech email fields are considered; redacted
/// values and privacy-proxy addresses are skipped.
pub fn whois_contact_emails(record: &str) -> IndexSet<String> {
    let mut emails = IndexSet::new();
    for line in record.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let is_contact_field = ["registrant", "admin", "tech"]
            .iter()
            .any(|role| key.contains(role))
            && key.contains("email");
        if !is_contact_field || is_private(value) {
            continue;
        }
        for email in extract_emails(value) {
            if !is_private(&email) {
                emails.insert(email);
            }
        }
    }
    emails
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn finds_plain_and_mailto_addresses_in_order() {
        let html = r#"
            <p>Contact: Sales@Example.com</p>
            <a href="mailto:info@example.com?subject=Hi">Email us</a>
            <footer>sales@example.com</footer>
        "#;
        let emails: Vec<_> = extract_emails(html).into_iter().collect();
        assert_eq!(emails, vec!["sales@example.com", "info@example.com"]);
    }

    #[test]
    fn decodes_encoded_at_signs() {
        let html = "a&#64;example.com b&#x40;example.org c%40example.net d&commat;example.io";
        let emails: Vec<_> = extract_emails(html).into_iter().collect();
        assert_eq!(
            emails,
            vec!["a@example.com", "b@example.org", "c@example.net", "d@example.io"]
        );
    }

    #[test]
    fn rejects_asset_filenames() {
        let html = r#"<img src="/img/logo@2x.png"><img srcset="hero@3x.webp 3x"><link href="x@1.5x.css">"#;
        assert!(extract_emails(html).is_empty());
    }

    #[test]
    fn rejects_tracking_and_malformed_addresses() {
        assert!(!is_plausible_email("abc123@o12345.ingest.sentry.io"));
        assert!(!is_plausible_email("foo@sentry-next.wixpress.com"));
        assert!(!is_plausible_email("a..b@example.com"));
        assert!(!is_plausible_email(".a@example.com"));
        assert!(is_plausible_email("first.last@example.com"));
    }

    #[test]
    fn whois_skips_redacted_and_proxy_contacts() {
        let record = "\
Domain Name: EXAMPLE.COM
Registrar Abuse Contact Email: abuse@registrar.com
Registrant Email: owner@example.com
Admin Email: REDACTED FOR PRIVACY
Tech Email: 1234@privacyprotect.org
Tech Email: hostmaster@example.com
";
        let emails: Vec<_> = whois_contact_emails(record).into_iter().collect();
        assert_eq!(emails, vec!["owner@example.com", "hostmaster@example.com"]);
    }

    proptest! {
        #[test]
        fn extracted_emails_are_lowercase_and_unique(text in "\\PC{0,200}") {
            let emails = extract_emails(&text);
            let lower: IndexSet<String> = emails.iter().map(|e| e.to_lowercase()).collect();
            prop_assert_eq!(lower.len(), emails.len());
            for email in &emails {
                prop_assert_eq!(email, &email.to_lowercase());
                prop_assert!(email.contains('@'));
            }
        }

        #[test]
        fn embedded_address_is_found(local in "[a-z][a-z0-9]{0,10}", host in "[a-z]{3,10}") {
            let email = format!("{local}@mail{host}.com");
            let text = format!("<p>Write to {email} today</p>");
            prop_assert!(extract_emails(&text).contains(&email));
        }
    }
}
