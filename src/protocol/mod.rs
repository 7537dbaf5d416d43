//! Wire protocol for the gateway HTTP surface.
//!
//! Every response uses the uniform envelope [`ApiResponse`] and is returned
//! with HTTP status 200; the outcome lives in the envelope `code`.

pub mod error_codes;
pub mod types;

pub use error_codes::ApiCode;

pub use types::{
    ApiResponse, GameResultCallback, GameResultOutcome, ListRoomsQuery, ReadyData, RoomQuery,
    RoomRequest, SitData, SitRequest, SmsIssueData, SmsIssueRequest, SmsVerifyData,
    SmsVerifyRequest,
};

/// Header carrying the caller's account identifier.
pub const HDR_SEC_ACCOUNT: &str = "x-sec-account";
/// Header carrying the caller's bearer token.
pub const HDR_SEC_TOKEN: &str = "x-sec-token";
/// Header carrying the client application version.
pub const HDR_APP_VERSION: &str = "app-version";
