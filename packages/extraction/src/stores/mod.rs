//! Storage implementations for the extraction library.
//!
//! Available backends:
//! - `MemoryStore` / `MemoryQuotaGuard` - In-memory storage (always available)
//! - `PostgresStore` - PostgreSQL storage for both traits (requires `postgres` feature)

pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::{MemoryQuotaGuard, MemoryStore};

#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;
