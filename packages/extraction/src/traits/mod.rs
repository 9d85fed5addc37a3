//! Core trait abstractions for the extraction library.
//!
//! Fetching, rendering, WHOIS and storage sit behind these traits so the
//! pipeline can run against real network services or test doubles.

pub mod fetcher;
pub mod renderer;
pub mod store;
pub mod whois;
