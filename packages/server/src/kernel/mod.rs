//! Kernel module - server infrastructure and dependencies.

pub mod extraction_service;

pub use extraction_service::{build_job_manager, create_storage, Storage};
