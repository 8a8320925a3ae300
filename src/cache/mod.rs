//! Cache layer
//!
//! A set of independent TTL caches, one per [`Namespace`]. Each namespace
//! has its own TTL and entry bound. Writers must invalidate the entries they
//! affect as soon as the write succeeds.

pub mod manager;
pub mod namespace;
pub mod sweeper;
pub mod ttl;

pub use manager::{CacheManager, CacheStats};
pub use namespace::{compose_key, CacheKey, Namespace, KEY_SEPARATOR};
pub use sweeper::{Sweepable, Sweeper};
pub use ttl::{Counters, TtlCache};
