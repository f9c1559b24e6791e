mod memory;
mod redis_cache;
mod types;
mod writer;

pub use self::memory::MemoryCache;
pub use self::redis_cache::RedisCache;
pub use self::types::{CacheClient, CacheError, Subscription};
pub use self::writer::{CacheWriter, Promotion, StagingSet, DEFAULT_BATCH_SIZE};
