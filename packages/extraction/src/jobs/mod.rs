//! Job management: admission, dispatch, cancellation and export.

pub mod export;
pub mod manager;

pub use export::export_csv;
pub use manager::{JobManager, UrlInput, MAX_PAGE_SIZE};
