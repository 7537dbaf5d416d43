//! Low-latency key/value cache with TTL expiry, counters, and per-day token
//! buckets. The trait mirrors what the deployment's shared cache offers; the
//! in-memory implementation backs single-process deployments and tests.

pub mod keys;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Local, TimeZone, Utc};
use dashmap::DashMap;
use std::time::Duration;

/// Cache abstraction used for device bindings, SMS code records, and the
/// daily token buckets throttling code sends.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Store a string, optionally expiring after `ttl`.
    async fn set_string(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// Fetch a string; `None` when absent or expired.
    async fn get_string(&self, key: &str) -> Result<Option<String>>;

    /// Store an integer, optionally expiring after `ttl`.
    async fn set_integer(&self, key: &str, value: i64, ttl: Option<Duration>) -> Result<()>;

    /// Fetch an integer; `None` when absent or expired.
    async fn get_integer(&self, key: &str) -> Result<Option<i64>>;

    /// Increment (creating at 1 when absent) and return the new value.
    async fn incr(&self, key: &str) -> Result<i64>;

    /// Decrement (creating at -1 when absent) and return the new value.
    async fn decr(&self, key: &str) -> Result<i64>;

    /// Remove a key. Returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Remaining tokens in a daily bucket without consuming one. An absent
    /// bucket reports the full allowance.
    async fn get_daily_token(&self, key: &str, total: i64) -> Result<i64>;

    /// Consume one token from a daily bucket and return the remainder. The
    /// bucket expires at the next local midnight, so allowances reset on the
    /// natural day boundary.
    async fn take_daily_token(&self, key: &str, total: i64) -> Result<i64>;
}

/// Seconds until the next local midnight.
pub fn secs_until_local_midnight() -> u64 {
    let now = Local::now();
    let tomorrow = now.date_naive() + chrono::Days::new(1);
    let midnight = tomorrow.and_time(chrono::NaiveTime::MIN);
    let target = Local
        .from_local_datetime(&midnight)
        .earliest()
        .unwrap_or_else(|| now + chrono::Duration::hours(24));
    (target - now).num_seconds().max(1) as u64
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    /// Unix millis; `None` never expires.
    expires_at: Option<i64>,
}

impl Entry {
    fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at.is_some_and(|at| at <= now_ms)
    }
}

/// In-memory cache with lazy expiry.
#[derive(Default)]
pub struct InMemoryCache {
    entries: DashMap<String, Entry>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn put(&self, key: &str, value: String, ttl: Option<Duration>) {
        let expires_at = ttl.map(|ttl| Utc::now().timestamp_millis() + ttl.as_millis() as i64);
        self.entries
            .insert(key.to_string(), Entry { value, expires_at });
    }

    fn live_value(&self, key: &str) -> Option<String> {
        let now_ms = Utc::now().timestamp_millis();
        // The read guard must drop before the expired entry is removed.
        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now_ms) => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        None
    }

    fn adjust_integer(&self, key: &str, delta: i64) -> i64 {
        let now_ms = Utc::now().timestamp_millis();
        let mut entry = self.entries.entry(key.to_string()).or_insert(Entry {
            value: "0".to_string(),
            expires_at: None,
        });
        if entry.is_expired(now_ms) {
            entry.value = "0".to_string();
            entry.expires_at = None;
        }
        let current: i64 = entry.value.parse().unwrap_or(0);
        let next = current + delta;
        entry.value = next.to_string();
        next
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn set_string(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        self.put(key, value.to_string(), ttl);
        Ok(())
    }

    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        Ok(self.live_value(key))
    }

    async fn set_integer(&self, key: &str, value: i64, ttl: Option<Duration>) -> Result<()> {
        self.put(key, value.to_string(), ttl);
        Ok(())
    }

    async fn get_integer(&self, key: &str) -> Result<Option<i64>> {
        Ok(self.live_value(key).and_then(|v| v.parse().ok()))
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        Ok(self.adjust_integer(key, 1))
    }

    async fn decr(&self, key: &str) -> Result<i64> {
        Ok(self.adjust_integer(key, -1))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn get_daily_token(&self, key: &str, total: i64) -> Result<i64> {
        Ok(self.live_value(key).and_then(|v| v.parse().ok()).unwrap_or(total))
    }

    async fn take_daily_token(&self, key: &str, total: i64) -> Result<i64> {
        let now_ms = Utc::now().timestamp_millis();
        let mut entry = self.entries.entry(key.to_string()).or_insert(Entry {
            value: total.to_string(),
            expires_at: None,
        });
        if entry.is_expired(now_ms) {
            entry.value = total.to_string();
        }
        let remaining: i64 = entry.value.parse().unwrap_or(total);
        let next = if remaining > 0 { remaining - 1 } else { remaining };
        entry.value = next.to_string();
        entry.expires_at =
            Some(now_ms + Duration::from_secs(secs_until_local_midnight()).as_millis() as i64);
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_string_roundtrip() {
        let cache = InMemoryCache::new();
        cache.set_string("k", "v", None).await.unwrap();
        assert_eq!(cache.get_string("k").await.unwrap().as_deref(), Some("v"));
        assert!(cache.get_string("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let cache = InMemoryCache::new();
        cache
            .set_string("k", "v", Some(Duration::from_millis(20)))
            .await
            .unwrap();
        assert!(cache.get_string("k").await.unwrap().is_some());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(cache.get_string("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_incr_decr() {
        let cache = InMemoryCache::new();
        assert_eq!(cache.incr("n").await.unwrap(), 1);
        assert_eq!(cache.incr("n").await.unwrap(), 2);
        assert_eq!(cache.decr("n").await.unwrap(), 1);
        assert_eq!(cache.get_integer("n").await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_daily_token_bucket_drains_to_zero() {
        let cache = InMemoryCache::new();
        assert_eq!(cache.get_daily_token("bucket", 5).await.unwrap(), 5);

        for expected in (0..5).rev() {
            assert_eq!(cache.take_daily_token("bucket", 5).await.unwrap(), expected);
        }
        // Exhausted bucket stays at zero.
        assert_eq!(cache.take_daily_token("bucket", 5).await.unwrap(), 0);
        assert_eq!(cache.get_daily_token("bucket", 5).await.unwrap(), 0);
    }

    #[test]
    fn test_midnight_is_in_the_future() {
        let secs = secs_until_local_midnight();
        assert!(secs >= 1);
        assert!(secs <= 24 * 3600);
    }
}
