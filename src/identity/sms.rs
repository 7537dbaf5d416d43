//! SMS one-time-code flow.
//!
//! Issue: a per-phone daily token bucket (default 5/day, resetting at local
//! midnight) gates the vendor call; the vendor's `msg_id` is cached together
//! with the issue timestamp. Verify: the cached record must exist and be
//! inside the validity window, then the vendor confirms the code.

use crate::cache::{keys, Cache};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{debug, error};

#[derive(Debug, Error)]
pub enum SmsError {
    #[error("invalid mobile number: {0}")]
    InvalidMobile(String),
    #[error("daily SMS quota exhausted for {0}")]
    TokenBucketExhausted(String),
    #[error("no redeemable code for {0}")]
    CodeExpired(String),
    #[error("verification code mismatch for {0}")]
    CodeMismatch(String),
    #[error(transparent)]
    Infra(#[from] anyhow::Error),
}

/// The SMS vendor boundary: request a code send, then confirm a user-supplied
/// code against the returned message id.
#[async_trait]
pub trait SmsVendor: Send + Sync {
    async fn request_code(&self, phone_number: &str) -> Result<String>;
    async fn check_code(&self, msg_id: &str, code: &str) -> Result<bool>;
}

/// Deterministic vendor for single-process deployments and tests: the code
/// is derived from the message id, so no out-of-band delivery is needed.
#[derive(Default)]
pub struct StaticSmsVendor;

impl StaticSmsVendor {
    pub fn new() -> Self {
        Self
    }

    /// The six-digit code this vendor accepts for a message id.
    pub fn code_for(msg_id: &str) -> String {
        let digest = Sha256::digest(msg_id.as_bytes());
        let n = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]) % 1_000_000;
        format!("{n:06}")
    }
}

#[async_trait]
impl SmsVendor for StaticSmsVendor {
    async fn request_code(&self, phone_number: &str) -> Result<String> {
        let digest = Sha256::digest(format!("sms:{phone_number}").as_bytes());
        let mut msg_id = String::with_capacity(24);
        for byte in digest.iter().take(12) {
            msg_id.push_str(&format!("{byte:02x}"));
        }
        Ok(msg_id)
    }

    async fn check_code(&self, msg_id: &str, code: &str) -> Result<bool> {
        let expected = Self::code_for(msg_id);
        Ok(expected.as_bytes().ct_eq(code.as_bytes()).into())
    }
}

/// Cached record written when a code is issued.
#[derive(Debug, Serialize, Deserialize)]
struct CodeRecord {
    msg_id: String,
    issued_ts: i64,
}

/// Mainland mobile shape: 11 digits, `1`, second digit 3-9.
pub fn is_valid_phone_number(number: &str) -> bool {
    let bytes = number.as_bytes();
    bytes.len() == 11
        && bytes[0] == b'1'
        && (b'3'..=b'9').contains(&bytes[1])
        && bytes.iter().all(u8::is_ascii_digit)
}

/// Orchestrates the issue/verify flow against the cache and the vendor.
pub struct SmsService {
    cache: Arc<dyn Cache>,
    vendor: Arc<dyn SmsVendor>,
    deploy_env: String,
    validity_secs: u64,
    daily_quota: i64,
}

impl SmsService {
    pub fn new(
        cache: Arc<dyn Cache>,
        vendor: Arc<dyn SmsVendor>,
        deploy_env: String,
        validity_secs: u64,
        daily_quota: i64,
    ) -> Self {
        Self {
            cache,
            vendor,
            deploy_env,
            validity_secs,
            daily_quota,
        }
    }

    /// Issue a code. Returns the remaining daily tokens after the send.
    pub async fn issue(&self, phone_number: &str) -> Result<i64, SmsError> {
        if !is_valid_phone_number(phone_number) {
            return Err(SmsError::InvalidMobile(phone_number.to_string()));
        }

        let bucket_key = keys::sms_daily_tokens(&self.deploy_env, phone_number);
        let remaining = self
            .cache
            .get_daily_token(&bucket_key, self.daily_quota)
            .await?;
        if remaining == 0 {
            return Err(SmsError::TokenBucketExhausted(phone_number.to_string()));
        }

        let msg_id = self.vendor.request_code(phone_number).await.map_err(|e| {
            error!(alarm = true, phone_number, error = %e, "SMS vendor rejected code request");
            SmsError::Infra(e)
        })?;

        let record = CodeRecord {
            msg_id,
            issued_ts: chrono::Utc::now().timestamp(),
        };
        let record_json = serde_json::to_string(&record).map_err(anyhow::Error::from)?;
        self.cache
            .set_string(
                &keys::sms_code_record(&self.deploy_env, phone_number),
                &record_json,
                None,
            )
            .await?;

        let remaining = self
            .cache
            .take_daily_token(&bucket_key, self.daily_quota)
            .await?;
        debug!(phone_number, remaining, "issued SMS code");
        Ok(remaining)
    }

    /// Verify a user-supplied code.
    pub async fn verify(&self, phone_number: &str, code: &str) -> Result<(), SmsError> {
        let record_key = keys::sms_code_record(&self.deploy_env, phone_number);
        let Some(raw) = self.cache.get_string(&record_key).await? else {
            return Err(SmsError::CodeExpired(phone_number.to_string()));
        };
        let record: CodeRecord =
            serde_json::from_str(&raw).map_err(anyhow::Error::from)?;

        let age = chrono::Utc::now().timestamp() - record.issued_ts;
        if age > self.validity_secs as i64 {
            return Err(SmsError::CodeExpired(phone_number.to_string()));
        }

        let valid = self.vendor.check_code(&record.msg_id, code).await?;
        if !valid {
            return Err(SmsError::CodeMismatch(phone_number.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;

    fn service(quota: i64, validity_secs: u64) -> SmsService {
        SmsService::new(
            Arc::new(InMemoryCache::new()),
            Arc::new(StaticSmsVendor::new()),
            "test".to_string(),
            validity_secs,
            quota,
        )
    }

    async fn issue_and_code(service: &SmsService, phone: &str) -> String {
        service.issue(phone).await.unwrap();
        let msg_id = StaticSmsVendor::new().request_code(phone).await.unwrap();
        StaticSmsVendor::code_for(&msg_id)
    }

    #[test]
    fn test_phone_number_validation() {
        assert!(is_valid_phone_number("13800000001"));
        assert!(is_valid_phone_number("19912345678"));
        assert!(!is_valid_phone_number("12800000001")); // second digit 2
        assert!(!is_valid_phone_number("2380000000"));
        assert!(!is_valid_phone_number("1380000000a"));
        assert!(!is_valid_phone_number("138000000012"));
    }

    #[tokio::test]
    async fn test_issue_then_verify() {
        let service = service(5, 60);
        let code = issue_and_code(&service, "13800000001").await;
        service.verify("13800000001", &code).await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_mobile_rejected() {
        let service = service(5, 60);
        let err = service.issue("not-a-phone").await.unwrap_err();
        assert!(matches!(err, SmsError::InvalidMobile(_)));
    }

    #[tokio::test]
    async fn test_daily_quota_exhaustion() {
        let service = service(2, 60);
        assert_eq!(service.issue("13800000001").await.unwrap(), 1);
        assert_eq!(service.issue("13800000001").await.unwrap(), 0);
        let err = service.issue("13800000001").await.unwrap_err();
        assert!(matches!(err, SmsError::TokenBucketExhausted(_)));
    }

    #[tokio::test]
    async fn test_wrong_code_rejected() {
        let service = service(5, 60);
        let code = issue_and_code(&service, "13800000001").await;
        let wrong = if code == "000000" { "000001" } else { "000000" };
        let err = service.verify("13800000001", wrong).await.unwrap_err();
        assert!(matches!(err, SmsError::CodeMismatch(_)));
    }

    #[tokio::test]
    async fn test_verify_without_issue_rejected() {
        let service = service(5, 60);
        let err = service.verify("13800000001", "123456").await.unwrap_err();
        assert!(matches!(err, SmsError::CodeExpired(_)));
    }

    #[tokio::test]
    async fn test_stale_code_rejected() {
        // Zero-second validity: any code is already stale by the next call.
        let service = service(5, 0);
        let code = issue_and_code(&service, "13800000001").await;
        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        let err = service.verify("13800000001", &code).await.unwrap_err();
        assert!(matches!(err, SmsError::CodeExpired(_)));
    }
}
