//! Read models returned by the listing endpoints.

use crate::store::InstalledRoom;
use serde::{Deserialize, Serialize};

/// One cell of the hydrated seat grid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueOccupant {
    pub user_id: String,
    pub user_nickname: String,
    pub user_avatar: String,
    pub is_ai: bool,
    pub is_be_ready: bool,
}

/// `rows × cols` seat grid; `None` is an open seat.
pub type SeatGrid = Vec<Vec<Option<QueueOccupant>>>;

/// A user shown in the room's presence list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceEntry {
    pub user_id: String,
    pub user_nickname: String,
    pub user_avatar: String,
    pub is_ai: bool,
}

/// Fast-path listing entry: counters and owner identity only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSummary {
    pub id: String,
    pub game_index: String,
    pub carrying_capacity: i64,
    pub queue_symbol: String,
    pub ai_player_cnt: i64,
    pub online_user_cnt: i64,
    pub in_game_queue_user_cnt: i64,
    pub in_game_queue_be_ready_user_cnt: i64,
    pub in_game_battle_user_cnt: i64,
    pub owner_id: String,
    pub owner_nickname: String,
    pub owner_avatar: String,
    pub be_hosting: bool,
}

impl From<&InstalledRoom> for RoomSummary {
    fn from(room: &InstalledRoom) -> Self {
        Self {
            id: room.id.clone(),
            game_index: room.game_index.clone(),
            carrying_capacity: room.carrying_capacity,
            queue_symbol: room.queue_symbol.clone(),
            ai_player_cnt: room.ai_player_cnt,
            online_user_cnt: room.online_user_cnt,
            in_game_queue_user_cnt: room.in_game_queue_user_cnt,
            in_game_queue_be_ready_user_cnt: room.in_game_queue_be_ready_user_cnt,
            in_game_battle_user_cnt: room.in_game_battle_user_cnt,
            owner_id: room.owner_id.clone(),
            owner_nickname: room.owner_nickname.clone(),
            owner_avatar: room.owner_avatar.clone(),
            be_hosting: room.be_hosting,
        }
    }
}

/// Slow-path listing entry: full display fields plus the hydrated presence
/// list and seat grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomDetail {
    pub id: String,
    pub game_index: String,
    pub rule_title: String,
    pub rule_content: String,
    pub title: String,
    pub cover: String,
    pub tags: Vec<String>,
    pub announcement: String,
    pub carrying_capacity: i64,
    pub queue_symbol: String,
    pub ai_player_cnt: i64,
    pub online_user_cnt: i64,
    pub in_game_queue_user_cnt: i64,
    pub in_game_queue_be_ready_user_cnt: i64,
    pub in_game_battle_user_cnt: i64,
    pub owner_id: String,
    pub owner_nickname: String,
    pub owner_avatar: String,
    pub be_hosting: bool,
    pub online_users: Vec<PresenceEntry>,
    pub in_game_queue_users: SeatGrid,
}
