//! Per-URL extraction pipeline.
//!
//! - `stages`: the five stage executors behind one `StageExecutor` trait
//! - `orchestrator`: the state machine that runs them and owns progress
//! - `policy`: early termination between stages
//! - `retry`: per-stage timeouts and transient-failure retries
//! - `links`: contact page discovery

pub mod links;
pub mod orchestrator;
pub mod policy;
pub mod retry;
pub mod stages;

pub use orchestrator::{NullSink, Orchestrator, ProgressSink};
pub use policy::{RunAllStages, SufficiencyThreshold, TerminationPolicy};
pub use retry::{run_with_retry, RetryPolicy};
pub use stages::{
    standard_stages, ContactPages, HeadlessScan, HomepageEmailExtraction, HomepageScan,
    StageContext, StageExecutor, StageOutput, WhoisLookup,
};
