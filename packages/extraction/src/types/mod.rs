//! Data types for jobs, results, progress and quota.

pub mod config;
pub mod job;
pub mod page;
pub mod progress;
pub mod quota;
pub mod result;
