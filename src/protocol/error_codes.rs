use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric API codes carried in the response envelope.
///
/// HTTP status is always 200; clients branch on these codes. `0` is success,
/// `10xxx` are gateway-level failures, `2xxxxx` is the app-version gate, and
/// `20xxx` are domain rejections from room transitions and the SMS flow.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApiCode {
    Ok,
    Unauthorized,
    Internal,
    StaleAppVersion,

    // Room transition rejections
    QueueFull,
    SeatOccupied,
    SeatFrozen,
    InBattle,
    NotSeated,
    SeatOutOfBounds,

    // Identity / SMS rejections
    InvalidMobile,
    TokenBucketExhausted,
    CodeExpired,
    CodeMismatch,
}

impl ApiCode {
    /// The numeric code written into the response envelope.
    pub fn code(self) -> i64 {
        match self {
            Self::Ok => 0,
            Self::Unauthorized => 10401,
            Self::Internal => 10500,
            Self::StaleAppVersion => 200_001,
            Self::QueueFull => 20001,
            Self::SeatOccupied => 20002,
            Self::SeatFrozen => 20003,
            Self::InBattle => 20004,
            Self::NotSeated => 20005,
            Self::SeatOutOfBounds => 20006,
            Self::InvalidMobile => 20101,
            Self::TokenBucketExhausted => 20102,
            Self::CodeExpired => 20103,
            Self::CodeMismatch => 20104,
        }
    }

    /// Default human-readable message for the envelope `msg` field.
    pub fn message(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Unauthorized => "Unauthorized",
            Self::Internal => "internal error",
            Self::StaleAppVersion => "illegal request, please upgrade the app",
            Self::QueueFull => "the game queue is already full",
            Self::SeatOccupied => "that seat is already taken",
            Self::SeatFrozen => "you were removed from the queue recently, try again later",
            Self::InBattle => "not allowed while a battle is in progress",
            Self::NotSeated => "take a seat in the queue first",
            Self::SeatOutOfBounds => "that seat does not exist in this room",
            Self::InvalidMobile => "invalid mobile number",
            Self::TokenBucketExhausted => "daily SMS quota reached, try again tomorrow",
            Self::CodeExpired => "the verification code has expired",
            Self::CodeMismatch => "wrong verification code",
        }
    }
}

impl fmt::Display for ApiCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct() {
        let all = [
            ApiCode::Ok,
            ApiCode::Unauthorized,
            ApiCode::Internal,
            ApiCode::StaleAppVersion,
            ApiCode::QueueFull,
            ApiCode::SeatOccupied,
            ApiCode::SeatFrozen,
            ApiCode::InBattle,
            ApiCode::NotSeated,
            ApiCode::SeatOutOfBounds,
            ApiCode::InvalidMobile,
            ApiCode::TokenBucketExhausted,
            ApiCode::CodeExpired,
            ApiCode::CodeMismatch,
        ];
        let mut seen = std::collections::HashSet::new();
        for code in all {
            assert!(
                seen.insert(code.code()),
                "duplicate numeric code for {code:?}"
            );
            assert!(!code.message().is_empty());
        }
    }

    #[test]
    fn test_reserved_gateway_codes() {
        assert_eq!(ApiCode::Ok.code(), 0);
        assert_eq!(ApiCode::Unauthorized.code(), 10401);
        assert_eq!(ApiCode::Internal.code(), 10500);
        assert_eq!(ApiCode::StaleAppVersion.code(), 200_001);
    }
}
