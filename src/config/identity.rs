//! Token and SMS settings.

use super::defaults::{
    default_sms_code_validity_secs, default_sms_daily_quota, default_token_valid_duration_days,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Bearer token lifetime in days.
    #[serde(default = "default_token_valid_duration_days")]
    pub token_valid_duration_days: u64,
    /// How long an issued SMS code stays redeemable.
    #[serde(default = "default_sms_code_validity_secs")]
    pub sms_code_validity_secs: u64,
    /// Code-send requests allowed per phone number per natural day.
    #[serde(default = "default_sms_daily_quota")]
    pub sms_daily_quota: i64,
    /// Base64-encoded 32-byte Ed25519 seed for token signing. A random
    /// seed is generated when unset, which invalidates tokens on restart.
    #[serde(default)]
    pub signing_key_seed: Option<String>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            token_valid_duration_days: default_token_valid_duration_days(),
            sms_code_validity_secs: default_sms_code_validity_secs(),
            sms_daily_quota: default_sms_daily_quota(),
            signing_key_seed: None,
        }
    }
}
