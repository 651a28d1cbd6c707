//! Named response caches.

mod dir;
mod manager;
mod storage;

pub use dir::{entry_file_name, DirCacheStorage};
pub use manager::{cache_key, ApiHit, CacheManager};
pub use storage::{CacheStorage, MemoryCacheStorage};
