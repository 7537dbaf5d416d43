//! Per-request authentication: account/token headers checked against the
//! signed claims and the device binding stored at verification time.

use super::token::{TokenKeeper, SYS_ACCOUNT, SYS_DEVICE_ID};
use crate::cache::{keys, Cache};
use std::sync::Arc;
use tracing::debug;

/// Gate consulted by the HTTP middleware for every authenticated route.
pub struct AuthGate {
    cache: Arc<dyn Cache>,
    tokens: Arc<TokenKeeper>,
    deploy_env: String,
}

impl AuthGate {
    pub fn new(cache: Arc<dyn Cache>, tokens: Arc<TokenKeeper>, deploy_env: String) -> Self {
        Self {
            cache,
            tokens,
            deploy_env,
        }
    }

    /// A request is authenticated iff both headers are present, the stored
    /// device for the account matches the token's claims, and the signature
    /// and expiry check out. The system account skips the device lookup.
    pub async fn authenticate(&self, account: &str, token: &str) -> bool {
        if account.is_empty() || token.is_empty() {
            return false;
        }

        let device_id = if account == SYS_ACCOUNT {
            SYS_DEVICE_ID.to_string()
        } else {
            let key = keys::device_id_for_account(&self.deploy_env, account);
            match self.cache.get_string(&key).await {
                Ok(Some(device_id)) if !device_id.is_empty() => device_id,
                Ok(_) => {
                    debug!(account, "no device binding for account");
                    return false;
                }
                Err(err) => {
                    debug!(account, error = %err, "device binding lookup failed");
                    return false;
                }
            }
        };

        self.tokens.verify(account, &device_id, token)
    }

    /// Record the account→device binding minted alongside a fresh token.
    pub async fn bind_device(&self, account: &str, device_id: &str) -> anyhow::Result<()> {
        self.cache
            .set_string(
                &keys::device_id_for_account(&self.deploy_env, account),
                device_id,
                None,
            )
            .await
    }
}
