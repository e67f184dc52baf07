//! In-process `KvBackend` for tests and local runs without `REDIS_URL`.
//! Expiry uses `tokio::time::Instant`, so paused-clock tests can advance
//! past a TTL without sleeping.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use super::backend::KvBackend;

#[derive(Default)]
struct State {
    strings: HashMap<String, (String, Option<Instant>)>,
    sets: HashMap<String, BTreeSet<String>>,
    hashes: HashMap<String, HashMap<String, String>>,
    zsets: HashMap<String, HashMap<String, i64>>,
}

#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
    range_reads: AtomicUsize,
    reject_range_queries: AtomicBool,
    reject_hash_deletes: AtomicBool,
    unavailable: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many sorted-set reads (by score or full) have been served.
    pub fn range_reads(&self) -> usize {
        self.range_reads.load(Ordering::SeqCst)
    }

    /// Make `zrangebyscore` fail, as some hosted stores do for range queries.
    pub fn reject_range_queries(&self, on: bool) {
        self.reject_range_queries.store(on, Ordering::SeqCst);
    }

    /// Make `hdel` fail while everything else keeps working.
    pub fn reject_hash_deletes(&self, on: bool) {
        self.reject_hash_deletes.store(on, Ordering::SeqCst);
    }

    /// Make every call fail (simulated outage).
    pub fn set_unavailable(&self, on: bool) {
        self.unavailable.store(on, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(anyhow!("memory backend unavailable"));
        }
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        }
    }

    fn live_string(state: &mut State, key: &str) -> Option<String> {
        let expired = match state.strings.get(key) {
            Some((_, Some(deadline))) => Instant::now() >= *deadline,
            Some((_, None)) => false,
            None => return None,
        };
        if expired {
            state.strings.remove(key);
            return None;
        }
        state.strings.get(key).map(|(v, _)| v.clone())
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<()> {
        self.check()?;
        self.lock()
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> Result<()> {
        self.check()?;
        if let Some(set) = self.lock().sets.get_mut(key) {
            set.remove(member);
        }
        Ok(())
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        self.check()?;
        Ok(self
            .lock()
            .sets
            .get(key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn scard(&self, key: &str) -> Result<u64> {
        self.check()?;
        Ok(self.lock().sets.get(key).map_or(0, |s| s.len() as u64))
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()> {
        self.check()?;
        self.lock()
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        self.check()?;
        Ok(self
            .lock()
            .hashes
            .get(key)
            .and_then(|h| h.get(field).cloned()))
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<()> {
        self.check()?;
        if self.reject_hash_deletes.load(Ordering::SeqCst) {
            return Err(anyhow!("HDEL refused"));
        }
        if let Some(h) = self.lock().hashes.get_mut(key) {
            h.remove(field);
        }
        Ok(())
    }

    async fn zadd(&self, key: &str, member: &str, score: i64) -> Result<()> {
        self.check()?;
        self.lock()
            .zsets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string(), score);
        Ok(())
    }

    async fn zrangebyscore(&self, key: &str, min: i64, max: i64) -> Result<Vec<String>> {
        self.check()?;
        self.range_reads.fetch_add(1, Ordering::SeqCst);
        if self.reject_range_queries.load(Ordering::SeqCst) {
            return Err(anyhow!("ZRANGEBYSCORE not supported"));
        }
        Ok(self
            .lock()
            .zsets
            .get(key)
            .map(|z| {
                z.iter()
                    .filter(|(_, s)| **s >= min && **s <= max)
                    .map(|(m, _)| m.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn zrange_all(&self, key: &str) -> Result<Vec<String>> {
        self.check()?;
        self.range_reads.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .lock()
            .zsets
            .get(key)
            .map(|z| z.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn zremrangebyscore(&self, key: &str, min: i64, max: i64) -> Result<u64> {
        self.check()?;
        let mut state = self.lock();
        let Some(z) = state.zsets.get_mut(key) else {
            return Ok(0);
        };
        let before = z.len();
        z.retain(|_, s| *s < min || *s > max);
        Ok((before - z.len()) as u64)
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check()?;
        Ok(Self::live_string(&mut self.lock(), key))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.check()?;
        // A TTL past the clock's range never expires.
        let deadline = Instant::now().checked_add(ttl);
        self.lock()
            .strings
            .insert(key.to_string(), (value.to_string(), deadline));
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.check()?;
        Ok(Self::live_string(&mut self.lock(), key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn strings_expire_after_ttl() {
        let kv = MemoryBackend::new();
        kv.set_ex("k", "v", Duration::from_secs(60)).await.unwrap();
        assert!(kv.exists("k").await.unwrap());

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(kv.get("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!kv.exists("k").await.unwrap());
        assert!(kv.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn zset_range_is_inclusive() {
        let kv = MemoryBackend::new();
        kv.zadd("z", "a", 10).await.unwrap();
        kv.zadd("z", "b", 20).await.unwrap();
        kv.zadd("z", "c", 30).await.unwrap();

        let mut got = kv.zrangebyscore("z", 10, 20).await.unwrap();
        got.sort();
        assert_eq!(got, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(kv.zremrangebyscore("z", i64::MIN, 15).await.unwrap(), 1);
        assert_eq!(kv.zrange_all("z").await.unwrap().len(), 2);
        assert_eq!(kv.range_reads(), 2);
    }

    #[tokio::test]
    async fn huge_ttl_never_expires() {
        let kv = MemoryBackend::new();
        kv.set_ex("k", "v", Duration::from_secs(u64::MAX)).await.unwrap();
        assert!(kv.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn outage_fails_every_call() {
        let kv = MemoryBackend::new();
        kv.set_unavailable(true);
        assert!(kv.sadd("s", "1").await.is_err());
        assert!(kv.smembers("s").await.is_err());
    }
}
