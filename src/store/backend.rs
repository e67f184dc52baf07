use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Raw key-value primitives the bot needs from its store: sets, hashes,
/// sorted sets and expiring strings. Each call is individually atomic;
/// nothing here is transactional.
#[async_trait]
pub trait KvBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn sadd(&self, key: &str, member: &str) -> Result<()>;
    async fn srem(&self, key: &str, member: &str) -> Result<()>;
    async fn smembers(&self, key: &str) -> Result<Vec<String>>;
    async fn scard(&self, key: &str) -> Result<u64>;

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()>;
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>>;
    async fn hdel(&self, key: &str, field: &str) -> Result<()>;

    async fn zadd(&self, key: &str, member: &str, score: i64) -> Result<()>;
    /// Members with `min <= score <= max`, in no guaranteed order.
    async fn zrangebyscore(&self, key: &str, min: i64, max: i64) -> Result<Vec<String>>;
    async fn zrange_all(&self, key: &str) -> Result<Vec<String>>;
    async fn zremrangebyscore(&self, key: &str, min: i64, max: i64) -> Result<u64>;

    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
    async fn exists(&self, key: &str) -> Result<bool>;
}
