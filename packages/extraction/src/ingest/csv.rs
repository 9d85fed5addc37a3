//! CSV upload parsing.

use tracing::{debug, info};

use super::url::{looks_like_url, normalize_all};
use crate::error::ParseError;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Extract target URLs from the first column of an uploaded CSV file.
///
/// A leading header row is skipped when its first cell does not look like a
/// website. Cells are trimmed, empty cells dropped, `https://` added where no
/// scheme is given, and duplicates removed (host compared case-insensitively).
///
/// Fails with `Malformed` when the bytes are not delimited text (binary
/// content, invalid UTF-8) and with `NoUsableUrls` when nothing usable remains.
pub fn parse_csv(bytes: &[u8]) -> Result<Vec<String>, ParseError> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);

    if let Some(pos) = bytes.iter().position(|b| *b == 0) {
        let line = bytes[..pos].iter().filter(|b| **b == b'\n').count() as u64 + 1;
        return Err(ParseError::Malformed {
            line,
            detail: "file contains binary data".to_string(),
        });
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let mut cells: Vec<String> = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(|e| ParseError::Malformed {
            line: e.position().map(|p| p.line()).unwrap_or(index as u64 + 1),
            detail: e.to_string(),
        })?;

        let first = record.get(0).unwrap_or("").to_string();
        if index == 0 && !first.is_empty() && !looks_like_url(&first) {
            debug!(header = %first, "Skipping CSV header row");
            continue;
        }
        cells.push(first);
    }

    let (urls, rejected) = normalize_all(cells.iter().map(String::as_str));
    info!(
        urls = urls.len(),
        rejected = rejected.len(),
        "Parsed CSV upload"
    );

    if urls.is_empty() {
        return Err(ParseError::NoUsableUrls);
    }
    Ok(urls)
}
