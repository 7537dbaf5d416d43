//! Asymmetric-signed bearer tokens.
//!
//! A token is `base64url(claims JSON) . base64url(Ed25519 signature)`. The
//! claims carry the account, the device the session was minted on, and the
//! expiry. Verification allows a one-hour leeway for clock skew and requires
//! the caller-presented account/device pair to match the claims exactly.

use anyhow::Result;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Privileged system account; skips the stored-device lookup.
pub const SYS_ACCOUNT: &str = "ums-admin";
/// Fixed device id for the system account.
pub const SYS_DEVICE_ID: &str = "ABCDEF12-34567890ABCDEF12";

/// Clock-skew allowance during verification.
const VERIFY_LEEWAY_SECS: i64 = 3600;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenClaims {
    pub account: String,
    pub device_id: String,
    /// Unix seconds.
    pub exp: i64,
}

/// Issues and verifies bearer tokens with one Ed25519 key pair.
pub struct TokenKeeper {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
    ttl: Duration,
}

impl TokenKeeper {
    /// Build a keeper from an optional base64-encoded 32-byte seed. Without a
    /// seed a random key is generated, which invalidates tokens on restart.
    pub fn new(seed_b64: Option<&str>, ttl_days: u64) -> Result<Self> {
        let seed: [u8; 32] = match seed_b64 {
            Some(encoded) => {
                let bytes = URL_SAFE_NO_PAD
                    .decode(encoded.trim_end_matches('='))
                    .map_err(|e| anyhow::anyhow!("invalid signing key seed: {e}"))?;
                bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| anyhow::anyhow!("signing key seed must be 32 bytes"))?
            }
            None => {
                let mut bytes = [0u8; 32];
                getrandom::fill(&mut bytes)
                    .map_err(|e| anyhow::anyhow!("failed to gather key entropy: {e}"))?;
                bytes
            }
        };
        let signing_key = SigningKey::from_bytes(&seed);
        let verifying_key = signing_key.verifying_key();
        Ok(Self {
            signing_key,
            verifying_key,
            ttl: Duration::from_secs(ttl_days * 24 * 3600),
        })
    }

    /// Mint a token for an account/device pair with the configured TTL.
    pub fn issue(&self, account: &str, device_id: &str) -> Result<String> {
        let exp = chrono::Utc::now().timestamp() + self.ttl.as_secs() as i64;
        self.issue_with_exp(account, device_id, exp)
    }

    /// Mint a token with an explicit expiry (exercised by the expiry tests).
    pub fn issue_with_exp(&self, account: &str, device_id: &str, exp: i64) -> Result<String> {
        let claims = TokenClaims {
            account: account.to_string(),
            device_id: device_id.to_string(),
            exp,
        };
        let payload = serde_json::to_vec(&claims)?;
        let signature = self.signing_key.sign(&payload);
        Ok(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&payload),
            URL_SAFE_NO_PAD.encode(signature.to_bytes())
        ))
    }

    /// Verify signature, expiry (with leeway), and the account/device binding.
    pub fn verify(&self, account: &str, device_id: &str, token: &str) -> bool {
        let Some(claims) = self.decode(token) else {
            return false;
        };
        if claims.exp + VERIFY_LEEWAY_SECS < chrono::Utc::now().timestamp() {
            return false;
        }
        claims.account == account && claims.device_id == device_id
    }

    /// Decode and signature-check a token without judging expiry or binding.
    pub fn decode(&self, token: &str) -> Option<TokenClaims> {
        let (payload_b64, signature_b64) = token.split_once('.')?;
        let payload = URL_SAFE_NO_PAD.decode(payload_b64).ok()?;
        let signature_bytes = URL_SAFE_NO_PAD.decode(signature_b64).ok()?;
        let signature = Signature::from_slice(&signature_bytes).ok()?;
        self.verifying_key.verify(&payload, &signature).ok()?;
        serde_json::from_slice(&payload).ok()
    }
}
