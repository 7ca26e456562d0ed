//! Generic cache storage for resource keys.
//!
//! This module provides a domain-agnostic caching mechanism that:
//! - Stores one whole value per resource key together with its write time
//! - Never merges partially: every fetch or optimistic write replaces the value
//! - Leaves freshness decisions to the query engine

mod storage;
mod traits;

pub use storage::CacheStore;
pub use traits::{CacheEntry, CacheResult, CacheSource, Cacheable, QueryData};
