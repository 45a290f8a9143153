//! Result cache shared by all service clients.
//!
//! - [`CacheKey`] derives a stable identifier from a normalized query, the
//!   ontology filter, and the service name.
//! - [`CacheManager`] stores successful search payloads in memory and,
//!   optionally, on disk. See the [`manager`] module docs for lookup order,
//!   eviction, and the failure policy.
//!
//! Only successful payloads are ever stored; error responses are never cached.

mod disk;
mod key;
pub mod manager;

pub use key::CacheKey;
pub use manager::{CacheConfig, CacheEntry, CacheManager, CacheStats};
