//! In-process caching: the generic [`TtlCache`] and the [`HotPathCache`]
//! built on it.

pub mod hot_path;
pub mod ttl_cache;

pub use hot_path::{CacheStats, HotPathCache};
pub use ttl_cache::{CachePolicy, TtlCache};
