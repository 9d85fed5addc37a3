//! Turning user input into normalized target URLs.

pub mod csv;
pub mod url;

pub use self::csv::parse_csv;
pub use self::url::{normalize_url, parse_url_list};
