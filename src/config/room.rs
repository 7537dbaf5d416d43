//! Room engine timing: background kick delays and the queue lock.

use super::defaults::{
    default_battle_off_secs, default_lock_retry_count, default_lock_retry_delay_ms,
    default_lock_ttl_ms, default_queue_kick_secs,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomTimingConfig {
    /// Seconds a seated-but-idle user may linger before the forced kick.
    #[serde(default = "default_queue_kick_secs")]
    pub queue_kick_secs: u64,
    /// Seconds a user may stay flagged in-battle before the forced end.
    #[serde(default = "default_battle_off_secs")]
    pub battle_off_secs: u64,
    #[serde(default)]
    pub lock: LockConfig,
}

impl Default for RoomTimingConfig {
    fn default() -> Self {
        Self {
            queue_kick_secs: default_queue_kick_secs(),
            battle_off_secs: default_battle_off_secs(),
            lock: LockConfig::default(),
        }
    }
}

/// Room queue lock acquisition settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    #[serde(default = "default_lock_ttl_ms")]
    pub ttl_ms: u64,
    #[serde(default = "default_lock_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_lock_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl_ms: default_lock_ttl_ms(),
            retry_count: default_lock_retry_count(),
            retry_delay_ms: default_lock_retry_delay_ms(),
        }
    }
}
