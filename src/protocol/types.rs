use serde::{Deserialize, Serialize};

use super::error_codes::ApiCode;

/// Uniform response envelope. Serialized with HTTP status 200 on every path;
/// `data` is omitted when there is no payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub code: i64,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            code: ApiCode::Ok.code(),
            msg: ApiCode::Ok.message().to_string(),
            data: Some(data),
        }
    }

    pub fn ok_empty() -> Self {
        Self {
            code: ApiCode::Ok.code(),
            msg: ApiCode::Ok.message().to_string(),
            data: None,
        }
    }

    pub fn failure(code: ApiCode) -> Self {
        Self {
            code: code.code(),
            msg: code.message().to_string(),
            data: None,
        }
    }

    pub fn failure_with(code: ApiCode, data: T) -> Self {
        Self {
            code: code.code(),
            msg: code.message().to_string(),
            data: Some(data),
        }
    }
}

/// Body of `POST /api/v1/sms`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsIssueRequest {
    pub phone_number: String,
}

/// Payload returned after a code was issued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsIssueData {
    /// Daily tokens left for this phone number after the send.
    pub remaining: i64,
}

/// Body of `POST /api/v1/sms/verify`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsVerifyRequest {
    pub phone_number: String,
    pub code: String,
    pub device_type: i32,
    pub device_id: String,
    #[serde(default)]
    pub push_registration_id: String,
}

/// Payload returned after a successful verification: the minted session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsVerifyData {
    pub uid: String,
    pub account: String,
    pub token: String,
}

/// Body shared by the room-scoped operations that only need a target room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomRequest {
    pub room_id: String,
}

/// Body of `POST /api/v1/room/queue/sit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SitRequest {
    pub room_id: String,
    pub x: usize,
    pub y: usize,
}

/// Payload returned by a successful sit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SitData {
    /// True when this sit filled the last open seat.
    pub queue_is_full: bool,
}

/// Payload returned by a successful ready / battle-start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyData {
    /// True when this transition completed the set.
    pub completed: bool,
}

/// Query string of `GET /api/v1/room`.
#[derive(Debug, Clone, Deserialize)]
pub struct RoomQuery {
    pub room_id: String,
    #[serde(default)]
    pub fast: bool,
}

/// Query string of `GET /api/v1/room/list`.
#[derive(Debug, Clone, Deserialize)]
pub struct ListRoomsQuery {
    #[serde(default = "default_game_index")]
    pub game_index: String,
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub fast: bool,
}

fn default_game_index() -> String {
    "all".to_string()
}

fn default_limit() -> usize {
    10
}

/// Optional battle outcome details inside a game-result callback.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameResultOutcome {
    #[serde(default)]
    pub game_idx: i32,
    #[serde(default)]
    pub win: bool,
    #[serde(default)]
    pub screenshots: Vec<String>,
}

/// Body of `POST /api/v1/game/result`, pushed by the external game server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameResultCallback {
    pub request_id: String,
    #[serde(default)]
    pub err_code: i32,
    pub app_uid: String,
    #[serde(default)]
    pub app_user_nickname: String,
    #[serde(default)]
    pub app_user_avatar: String,
    pub app_aid: String,
    #[serde(default)]
    pub app_ai_player_nickname: String,
    #[serde(default)]
    pub app_ai_player_avatar: String,
    pub app_room_id: String,
    pub app_game_index: String,
    #[serde(default)]
    pub game_region: String,
    #[serde(default)]
    pub game_uid: String,
    #[serde(default)]
    pub bot_id: String,
    pub order_id: String,
    #[serde(default)]
    pub result_type: i32,
    #[serde(default)]
    pub result: Option<GameResultOutcome>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_omits_empty_data() {
        let resp: ApiResponse<SitData> = ApiResponse::ok_empty();
        let json = serde_json::to_string(&resp).unwrap();
        assert_eq!(json, r#"{"code":0,"msg":"OK"}"#);
    }

    #[test]
    fn test_envelope_carries_data() {
        let resp = ApiResponse::ok(SitData {
            queue_is_full: true,
        });
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["code"], 0);
        assert_eq!(json["data"]["queue_is_full"], true);
    }

    #[test]
    fn test_list_query_defaults() {
        let q: ListRoomsQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(q.game_index, "all");
        assert_eq!(q.offset, 0);
        assert_eq!(q.limit, 10);
        assert!(!q.fast);
    }

    #[test]
    fn test_game_result_callback_minimal() {
        let body = serde_json::json!({
            "request_id": "r-1",
            "app_uid": "User_1",
            "app_aid": "ai_001",
            "app_room_id": "room_000001",
            "app_game_index": "lolm",
            "order_id": "order-9",
        });
        let cb: GameResultCallback = serde_json::from_value(body).unwrap();
        assert_eq!(cb.err_code, 0);
        assert!(cb.result.is_none());
    }
}
