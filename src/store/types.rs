//! Document types persisted by the gateway store.

use serde::{Deserialize, Serialize};

/// Current unix timestamp in seconds.
pub fn unix_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

/// A registered human user. One live (`is_deleted == false`) row may exist
/// per account; a recreated account lives in the shadow collection instead.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub uid: String,
    /// Phone number or third-party identity.
    pub account: String,
    /// System username derived from the uid.
    pub account_usr: String,
    /// 1 = iOS, 2 = Android.
    pub device_type: i32,
    pub device_id: String,
    pub push_registration_id: String,
    pub nickname: String,
    pub gender: i32,
    pub avatar: String,
    pub birthday: String,
    pub age: i32,
    /// Legacy allowance counters kept for wire compatibility.
    pub extra_free_play_cnt: i64,
    pub extra_invited_user_cnt: i64,
    pub create_ts: i64,
    pub update_ts: i64,
    pub is_online: bool,
    pub is_deleted: bool,
    pub delete_reason: String,
}

/// A game the platform integrates with, keyed by its short index
/// (e.g. `lolm`, `wuhu`, `avalon`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstalledGame {
    pub index: String,
    pub en_name: String,
    pub zh_name: String,
    pub logo: String,
    pub slogan: String,
    pub tags: Vec<String>,
    pub min_online_user_cnt: i64,
    pub max_online_user_cnt: i64,
    pub update_ts: i64,
}

/// An AI persona. Masters own a room; slaves assist one, ordered by
/// `slave_number`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstalledAiPlayer {
    pub id: String,
    pub room_id: String,
    pub is_master: bool,
    pub slave_number: i32,
    pub nickname: String,
    pub gender: i32,
    pub age: i32,
    pub avatar: String,
    pub game_index: String,
    pub self_text_intro: String,
    pub tags: Vec<String>,
    pub state: i32,
    pub be_hosting: bool,
    pub installed: bool,
    pub be_hosting_room_id: Option<String>,
    pub update_ts: i64,
}

/// A slave AI attached to an installed room, in display order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomAssistant {
    pub assistant_id: String,
    pub assistant_nickname: String,
    pub assistant_gender: i32,
    pub assistant_avatar: String,
}

/// A live room. The four `*_cnt` fields are denormalized counters, each the
/// sum of the `ai_player_cnt` baseline and the matching per-user records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstalledRoom {
    pub id: String,
    pub game_index: String,
    pub rule_title: String,
    pub rule_content: String,
    pub title: String,
    pub cover: String,
    pub announcement: String,
    pub tags: Vec<String>,
    pub owner_id: String,
    pub owner_nickname: String,
    pub owner_gender: i32,
    pub owner_avatar: String,
    pub assistants: Vec<RoomAssistant>,
    pub carrying_capacity: i64,
    /// Grid descriptor: rows separated by `;`, cells by `,` (e.g. `"X,X;X,X"`).
    pub queue_symbol: String,
    pub ai_player_cnt: i64,
    pub rank_weight: i64,
    pub be_hosting: bool,
    pub online_user_cnt: i64,
    pub in_game_queue_user_cnt: i64,
    pub in_game_queue_be_ready_user_cnt: i64,
    pub in_game_battle_user_cnt: i64,
    pub update_ts: i64,
}

impl InstalledRoom {
    /// `(rows, cols)` derived from the queue symbol.
    pub fn queue_dims(&self) -> (usize, usize) {
        let rows: Vec<&str> = self.queue_symbol.split(';').collect();
        let cols = rows.first().map_or(0, |r| r.split(',').count());
        (rows.len(), cols)
    }
}

/// Presence record: is the user inside the room right now.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomPresence {
    pub room_id: String,
    pub user_id: String,
    pub user_nickname: String,
    pub user_avatar: String,
    pub online: bool,
    pub update_ts: i64,
}

/// Seat record: the user's spot in the queue grid, plus the freeze window
/// applied after a forced kick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSeat {
    pub room_id: String,
    pub user_id: String,
    pub user_nickname: String,
    pub user_avatar: String,
    pub in_game_queue: bool,
    pub at_game_queue_x_coord: usize,
    pub at_game_queue_y_coord: usize,
    /// Unix seconds until which re-seating is rejected; 0 when not frozen.
    pub frozen_time: i64,
    pub update_ts: i64,
}

/// Readiness record within the seat queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomReady {
    pub room_id: String,
    pub user_id: String,
    pub user_nickname: String,
    pub user_avatar: String,
    pub in_game_queue_be_ready: bool,
    pub update_ts: i64,
}

/// Battle record: is the user inside the third-party game.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomBattle {
    pub room_id: String,
    pub user_id: String,
    pub user_nickname: String,
    pub user_avatar: String,
    pub in_game_battle: bool,
    pub update_ts: i64,
}

/// A seated user as returned to listing callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatedUser {
    pub room_id: String,
    pub user_id: String,
    pub user_nickname: String,
    pub user_avatar: String,
    pub at_game_queue_x_coord: usize,
    pub at_game_queue_y_coord: usize,
    pub is_ai: bool,
    pub is_be_ready: bool,
}

/// Raw battle outcome pushed by the external game server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameResultRecord {
    pub trace_id: String,
    pub status_code: i32,
    pub app_uid: String,
    pub app_user_nickname: String,
    pub app_user_avatar: String,
    pub app_aid: String,
    pub app_ai_player_nickname: String,
    pub app_ai_player_avatar: String,
    pub app_room_id: String,
    pub app_game_index: String,
    pub game_region: String,
    pub game_uid: String,
    pub game_bid: String,
    pub order_id: String,
    pub result_type: i32,
    pub result_game_idx: Option<i32>,
    pub result_win: Option<bool>,
    pub result_screenshots: Option<Vec<String>>,
    pub create_ts: i64,
}

/// Per-user aggregate battle statistics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersonalGameStats {
    pub uid: String,
    pub play_cnt: i64,
    pub winning_play_cnt: i64,
    pub win_rate: f64,
    pub update_ts: i64,
}

/// Fields needed to create a user account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub uid: Option<String>,
    pub account: String,
    pub device_type: i32,
    pub device_id: String,
    pub push_registration_id: String,
}

/// A stored counter next to its value recomputed from the state records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterPair {
    pub stored: i64,
    pub recomputed: i64,
}

impl CounterPair {
    pub fn is_consistent(self) -> bool {
        self.stored == self.recomputed
    }
}

/// Reconciliation of all four room counters against per-user truth.
#[derive(Debug, Clone)]
pub struct CounterReconciliation {
    pub room_id: String,
    pub online: CounterPair,
    pub queue: CounterPair,
    pub ready: CounterPair,
    pub battle: CounterPair,
}

impl CounterReconciliation {
    pub fn is_consistent(&self) -> bool {
        self.online.is_consistent()
            && self.queue.is_consistent()
            && self.ready.is_consistent()
            && self.battle.is_consistent()
    }
}
