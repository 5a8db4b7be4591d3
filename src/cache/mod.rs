//! Shared key-value store used for rate-limit counters and the metadata cache.
//! State lives outside the process so every instance sees the same counters.

mod redis_store;

pub use redis_store::RedisStore;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError>;

    /// Atomically increments the counter at `key`, creating it at 1.
    async fn incr(&self, key: &str) -> Result<i64, CacheError>;

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Remaining lifetime, `None` when the key is missing or never expires.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError>;

    async fn exists(&self, key: &str) -> Result<bool, CacheError>;
}

#[cfg(test)]
pub(crate) mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Instant;

    /// Single-process stand-in for Redis.
    #[derive(Default)]
    pub struct MemoryStore {
        entries: Mutex<HashMap<String, (Vec<u8>, Option<Instant>)>>,
        pub fail: std::sync::atomic::AtomicBool,
    }

    impl MemoryStore {
        fn check(&self) -> Result<(), CacheError> {
            if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(CacheError::Redis(redis::RedisError::from((
                    redis::ErrorKind::IoError,
                    "store offline",
                ))));
            }
            Ok(())
        }

        fn live(entry: &(Vec<u8>, Option<Instant>)) -> bool {
            entry.1.map(|deadline| deadline > Instant::now()).unwrap_or(true)
        }

        pub fn keys(&self) -> Vec<String> {
            self.entries.lock().unwrap().keys().cloned().collect()
        }
    }

    #[async_trait]
    impl KeyValueStore for MemoryStore {
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
            self.check()?;
            let entries = self.entries.lock().unwrap();
            Ok(entries.get(key).filter(|e| Self::live(e)).map(|e| e.0.clone()))
        }

        async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
            self.check()?;
            self.entries
                .lock()
                .unwrap()
                .insert(key.to_string(), (value.to_vec(), Some(Instant::now() + ttl)));
            Ok(())
        }

        async fn incr(&self, key: &str) -> Result<i64, CacheError> {
            self.check()?;
            let mut entries = self.entries.lock().unwrap();
            let current = entries
                .get(key)
                .filter(|e| Self::live(e))
                .cloned()
                .unwrap_or((b"0".to_vec(), None));
            let next = String::from_utf8_lossy(&current.0).parse::<i64>().unwrap_or(0) + 1;
            entries.insert(key.to_string(), (next.to_string().into_bytes(), current.1));
            Ok(next)
        }

        async fn expire(&self, key: &str, ttl: Duration) -> Result<(), CacheError> {
            self.check()?;
            if let Some(entry) = self.entries.lock().unwrap().get_mut(key) {
                entry.1 = Some(Instant::now() + ttl);
            }
            Ok(())
        }

        async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
            self.check()?;
            let entries = self.entries.lock().unwrap();
            Ok(entries
                .get(key)
                .filter(|e| Self::live(e))
                .and_then(|e| e.1)
                .map(|deadline| deadline.saturating_duration_since(Instant::now())))
        }

        async fn exists(&self, key: &str) -> Result<bool, CacheError> {
            self.check()?;
            Ok(self.entries.lock().unwrap().get(key).map(Self::live).unwrap_or(false))
        }
    }
}
