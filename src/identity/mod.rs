//! Identity & session layer: SMS one-time codes, signed bearer tokens, and
//! the per-request authentication gate with device binding.

pub mod auth;
pub mod sms;
pub mod token;

pub use auth::AuthGate;
pub use sms::{SmsError, SmsService, SmsVendor, StaticSmsVendor};
pub use token::{TokenClaims, TokenKeeper, SYS_ACCOUNT, SYS_DEVICE_ID};
