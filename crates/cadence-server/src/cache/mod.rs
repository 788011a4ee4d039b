//! Caches for image lookups and generated summaries.

pub mod store;
pub mod ttl;

pub use store::{CachedSummary, MemoryStore, SharedStore, SqliteStore, StoreError, SummaryStore};
pub use ttl::TtlCache;
