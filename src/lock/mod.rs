//! Redlock-style distributed mutex over one or more lock nodes.
//!
//! Each node offers the three primitives the algorithm needs: `SET NX PX`,
//! compare-and-delete, and compare-and-pexpire. Acquisition succeeds when a
//! quorum `(N/2)+1` of nodes accepted the token and the remaining validity
//! (TTL minus elapsed time minus clock drift) is positive.

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use rand::{distr::Alphanumeric, RngExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error};

/// Length of the random ownership token written to every node.
const TOKEN_LEN: usize = 22;

#[derive(Debug, Error)]
pub enum LockError {
    /// Fewer than quorum nodes accepted the token within the retry budget.
    #[error("lock quorum not reached for resource {resource}")]
    QuorumNotReached { resource: String },
    /// The compare-and-expire found the token gone on too many nodes.
    #[error("lock already expired for resource {resource}")]
    LockExpired { resource: String },
}

/// A single lock node. The three operations are atomic per node.
#[async_trait]
pub trait LockNode: Send + Sync {
    /// Set `resource = token` only if absent, with a TTL in milliseconds.
    async fn try_set_nx_px(&self, resource: &str, token: &str, ttl_ms: u64) -> Result<bool>;

    /// Delete `resource` only while it still holds `token`.
    async fn compare_and_delete(&self, resource: &str, token: &str) -> Result<bool>;

    /// Refresh the TTL of `resource` only while it still holds `token`.
    async fn compare_and_expire(&self, resource: &str, token: &str, ttl_ms: u64) -> Result<bool>;
}

/// A successfully acquired lock.
#[derive(Debug, Clone)]
pub struct HeldLock {
    pub resource: String,
    pub token: String,
    /// Milliseconds of guaranteed ownership at acquisition time.
    pub validity_ms: i64,
}

/// Redlock over `N` nodes with bounded retry.
pub struct Redlock {
    nodes: Vec<Arc<dyn LockNode>>,
    quorum: usize,
    retry_count: u32,
    retry_delay: Duration,
}

impl Redlock {
    pub fn new(nodes: Vec<Arc<dyn LockNode>>) -> Self {
        Self::with_retries(nodes, 3, Duration::from_millis(200))
    }

    pub fn with_retries(
        nodes: Vec<Arc<dyn LockNode>>,
        retry_count: u32,
        retry_delay: Duration,
    ) -> Self {
        let quorum = (nodes.len() / 2) + 1;
        debug!(nodes = nodes.len(), quorum, "Redlock configured");
        Self {
            nodes,
            quorum,
            retry_count,
            retry_delay,
        }
    }

    /// Acquire `resource` for `ttl_ms` milliseconds.
    pub async fn acquire(&self, resource: &str, ttl_ms: u64) -> Result<HeldLock, LockError> {
        let token = random_token();
        // 2 ms on top of the proportional drift accounts for expiry
        // precision plus a minimum drift for small TTLs.
        let drift = (ttl_ms as f64 * 0.01).ceil() as i64 + 2;

        let mut attempt = 0;
        loop {
            let mut accepted = 0usize;
            let started = Instant::now();
            for node in &self.nodes {
                match node.try_set_nx_px(resource, &token, ttl_ms).await {
                    Ok(true) => accepted += 1,
                    Ok(false) => {}
                    Err(err) => {
                        error!(resource, error = %err, "lock node rejected SET NX PX");
                    }
                }
            }
            let elapsed_ms = started.elapsed().as_millis() as i64;

            let validity_ms = ttl_ms as i64 - elapsed_ms - drift;
            if validity_ms > 0 && accepted >= self.quorum {
                return Ok(HeldLock {
                    resource: resource.to_string(),
                    token,
                    validity_ms,
                });
            }

            // Best-effort cleanup before the next round so a partial grab
            // does not starve other contenders for a full TTL.
            for node in &self.nodes {
                let _ = node.compare_and_delete(resource, &token).await;
            }

            attempt += 1;
            if attempt >= self.retry_count {
                return Err(LockError::QuorumNotReached {
                    resource: resource.to_string(),
                });
            }
            tokio::time::sleep(self.retry_delay).await;
        }
    }

    /// Release a held lock on every node. Returns false when any node failed
    /// to answer (the entries will still lapse with their TTL).
    pub async fn release(&self, lock: &HeldLock) -> bool {
        let mut clean = true;
        for node in &self.nodes {
            if let Err(err) = node.compare_and_delete(&lock.resource, &lock.token).await {
                error!(resource = %lock.resource, error = %err, "lock node failed to release");
                clean = false;
            }
        }
        clean
    }

    /// Extend ownership of a held lock. Fails with [`LockError::LockExpired`]
    /// when fewer than quorum nodes still carried the token.
    pub async fn extend(&self, lock: &HeldLock, ttl_ms: u64) -> Result<(), LockError> {
        let mut refreshed = 0usize;
        for node in &self.nodes {
            match node
                .compare_and_expire(&lock.resource, &lock.token, ttl_ms)
                .await
            {
                Ok(true) => refreshed += 1,
                Ok(false) => {}
                Err(err) => {
                    error!(resource = %lock.resource, error = %err, "lock node failed to extend");
                }
            }
        }
        if refreshed >= self.quorum {
            Ok(())
        } else {
            Err(LockError::LockExpired {
                resource: lock.resource.clone(),
            })
        }
    }
}

fn random_token() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// Single-node in-memory lock backend.
#[derive(Default)]
pub struct InMemoryLockNode {
    entries: DashMap<String, (String, Instant)>,
}

impl InMemoryLockNode {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockNode for InMemoryLockNode {
    async fn try_set_nx_px(&self, resource: &str, token: &str, ttl_ms: u64) -> Result<bool> {
        let now = Instant::now();
        let mut entry = self
            .entries
            .entry(resource.to_string())
            .or_insert_with(|| (String::new(), now));
        let (held_token, expires_at) = entry.value();
        if !held_token.is_empty() && *expires_at > now {
            return Ok(false);
        }
        *entry.value_mut() = (token.to_string(), now + Duration::from_millis(ttl_ms));
        Ok(true)
    }

    async fn compare_and_delete(&self, resource: &str, token: &str) -> Result<bool> {
        Ok(self
            .entries
            .remove_if(resource, |_, (held, _)| held == token)
            .is_some())
    }

    async fn compare_and_expire(&self, resource: &str, token: &str, ttl_ms: u64) -> Result<bool> {
        let now = Instant::now();
        if let Some(mut entry) = self.entries.get_mut(resource) {
            let (held, expires_at) = entry.value();
            if held == token && *expires_at > now {
                entry.value_mut().1 = now + Duration::from_millis(ttl_ms);
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_node_lock() -> Redlock {
        Redlock::with_retries(
            vec![Arc::new(InMemoryLockNode::new())],
            2,
            Duration::from_millis(10),
        )
    }

    #[tokio::test]
    async fn test_acquire_and_release() {
        let redlock = single_node_lock();
        let lock = redlock.acquire("room:1:queue_lock", 2000).await.unwrap();
        assert_eq!(lock.token.len(), TOKEN_LEN);
        assert!(lock.validity_ms > 0);
        assert!(redlock.release(&lock).await);
    }

    #[tokio::test]
    async fn test_mutual_exclusion() {
        let redlock = single_node_lock();
        let held = redlock.acquire("res", 5000).await.unwrap();

        let second = redlock.acquire("res", 5000).await;
        assert!(matches!(second, Err(LockError::QuorumNotReached { .. })));

        redlock.release(&held).await;
        assert!(redlock.acquire("res", 5000).await.is_ok());
    }

    #[tokio::test]
    async fn test_reacquire_after_ttl_lapse() {
        let redlock = single_node_lock();
        let _held = redlock.acquire("res", 40).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(redlock.acquire("res", 2000).await.is_ok());
    }

    #[tokio::test]
    async fn test_extend_succeeds_while_held() {
        let redlock = single_node_lock();
        let lock = redlock.acquire("res", 2000).await.unwrap();
        assert!(redlock.extend(&lock, 2000).await.is_ok());
    }

    #[tokio::test]
    async fn test_extend_fails_after_release() {
        let redlock = single_node_lock();
        let lock = redlock.acquire("res", 2000).await.unwrap();
        redlock.release(&lock).await;
        assert!(matches!(
            redlock.extend(&lock, 2000).await,
            Err(LockError::LockExpired { .. })
        ));
    }

    #[tokio::test]
    async fn test_quorum_over_three_nodes() {
        let nodes: Vec<Arc<dyn LockNode>> = vec![
            Arc::new(InMemoryLockNode::new()),
            Arc::new(InMemoryLockNode::new()),
            Arc::new(InMemoryLockNode::new()),
        ];
        let redlock = Redlock::with_retries(nodes, 1, Duration::from_millis(10));
        let lock = redlock.acquire("res", 2000).await.unwrap();
        assert!(lock.validity_ms > 0);
    }

    #[tokio::test]
    async fn test_tokens_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for _ in 0..64 {
            assert!(seen.insert(random_token()));
        }
    }
}
