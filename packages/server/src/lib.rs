// Email Extraction - API Core
//
// HTTP surface for the email extraction job pipeline. Job admission,
// dispatch and persistence live in the `email-extraction` library; this
// crate wires configuration, storage and routes around it.

pub mod config;
pub mod kernel;
pub mod server;

pub use config::*;
