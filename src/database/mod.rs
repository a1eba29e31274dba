pub mod channel;
pub mod credential;
pub mod file_store;
pub mod redis_connection;
pub mod tiered_cache;

pub use file_store::{FileCacheEntry, FileStore};
pub use redis_connection::RedisDatabase;
pub use tiered_cache::{
    CacheServiceTrait, DynCacheService, DynFastTier, FastTierTrait, MockFastTierTrait, TieredCache,
};
