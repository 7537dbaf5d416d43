//! Durable document store abstraction.
//!
//! The trait captures the collection operations the gateway needs: bootstrap
//! upserts, the per-room×user state transitions with their precondition
//! matrix, ranked listing, account management with the shadow collection,
//! and counter reconciliation. Each transition method is atomic: state
//! record and counter delta commit together or not at all.

pub mod memory;
pub mod types;

pub use memory::InMemoryStore;
pub use types::{
    CounterPair, CounterReconciliation, GameResultRecord, InstalledAiPlayer, InstalledGame,
    InstalledRoom, NewUser, PersonalGameStats, RoomAssistant, RoomBattle, RoomPresence, RoomReady,
    RoomSeat, SeatedUser, UserProfile,
};

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

/// Seconds a force-kicked user stays frozen out of the seat queue.
pub const FORCED_KICK_FREEZE_SECS: i64 = 300;

/// Rejections from the transition precondition matrix, plus storage faults.
#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("the game queue of room {room_id} is full")]
    QueueFull { room_id: String },

    #[error("seat ({x},{y}) in room {room_id} is occupied")]
    SeatOccupied { room_id: String, x: usize, y: usize },

    #[error("seat ({x},{y}) is outside the queue grid of room {room_id}")]
    SeatOutOfBounds { room_id: String, x: usize, y: usize },

    #[error("user {user_id} is frozen out of room {room_id} for {seconds_left}s")]
    Frozen {
        room_id: String,
        user_id: String,
        seconds_left: i64,
    },

    #[error("user {user_id} is in battle in room {room_id}")]
    InBattle { room_id: String, user_id: String },

    #[error("user {user_id} is not seated in room {room_id}")]
    NotSeated { room_id: String, user_id: String },

    #[error("room {0} not found")]
    RoomNotFound(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// The user a transition acts on, with the display fields denormalized onto
/// the state records.
#[derive(Debug, Clone)]
pub struct RoomActor {
    pub room_id: String,
    pub user_id: String,
    pub user_nickname: String,
    pub user_avatar: String,
}

/// Outcome of a presence transition. `applied == false` means the call was
/// filtered as a no-op (already in the requested state).
#[derive(Debug, Clone)]
pub struct PresenceShift {
    pub applied: bool,
    pub room: InstalledRoom,
}

/// Outcome of a successful sit.
#[derive(Debug, Clone)]
pub struct SeatShift {
    pub applied: bool,
    /// True when this sit claimed the last open seat.
    pub queue_is_full: bool,
    pub room: InstalledRoom,
}

/// Outcome of a stand (voluntary or forced).
#[derive(Debug, Clone)]
pub struct UnseatShift {
    pub applied: bool,
    pub room: InstalledRoom,
}

/// Outcome of a readiness transition.
#[derive(Debug, Clone)]
pub struct ReadyShift {
    pub applied: bool,
    /// True when this transition completed the ready set.
    pub all_ready: bool,
    pub room: InstalledRoom,
}

/// Outcome of a battle transition.
#[derive(Debug, Clone)]
pub struct BattleShift {
    pub applied: bool,
    /// True when this transition put the whole queue into battle.
    pub all_in_battle: bool,
    pub room: InstalledRoom,
}

/// Store abstraction for the gateway. All methods are cancel-safe at their
/// await points; transition methods are internally transactional.
#[async_trait]
pub trait GatewayStore: Send + Sync {
    async fn health_check(&self) -> bool;

    // Bootstrap upserts -----------------------------------------------------

    async fn upsert_game(&self, game: InstalledGame) -> Result<()>;

    async fn upsert_ai_player(&self, ai_player: InstalledAiPlayer) -> Result<()>;

    /// Upsert a room for its master AI. Recomputes every counter as the live
    /// record count plus the `ai_player_cnt` baseline, so bootstrap heals any
    /// drift left by a crash.
    async fn upsert_room_master(&self, room: InstalledRoom) -> Result<()>;

    /// Append a slave AI to a room's assistant list, keeping display order.
    async fn add_room_assistant(&self, room_id: &str, assistant: RoomAssistant) -> Result<()>;

    // Room queries ----------------------------------------------------------

    async fn get_room(&self, room_id: &str) -> Result<Option<InstalledRoom>>;

    /// Rooms ranked by `be_hosting desc, rank_weight desc,
    /// in_game_queue_user_cnt asc, online_user_cnt desc, update_ts desc`.
    /// `game_index == "all"` lists every room.
    async fn list_rooms(
        &self,
        game_index: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<InstalledRoom>>;

    /// Online users of a room, earliest entry first.
    async fn room_presences(&self, room_id: &str, limit: usize) -> Result<Vec<RoomPresence>>;

    /// Seated users of a room with their readiness flag, earliest seat first.
    async fn seated_users(&self, room_id: &str) -> Result<Vec<SeatedUser>>;

    async fn seat_record(&self, room_id: &str, user_id: &str) -> Result<Option<RoomSeat>>;

    /// The room a user is currently battling in, if any.
    async fn battle_room_of(&self, user_id: &str) -> Result<Option<String>>;

    // State transitions -----------------------------------------------------

    async fn set_presence(
        &self,
        actor: &RoomActor,
        online: bool,
    ) -> Result<PresenceShift, TransitionError>;

    async fn seat_user(
        &self,
        actor: &RoomActor,
        x: usize,
        y: usize,
    ) -> Result<SeatShift, TransitionError>;

    /// Remove a user from the queue. A forced removal freezes the user out
    /// for [`FORCED_KICK_FREEZE_SECS`].
    async fn unseat_user(
        &self,
        actor: &RoomActor,
        force: bool,
    ) -> Result<UnseatShift, TransitionError>;

    async fn set_ready(
        &self,
        actor: &RoomActor,
        ready: bool,
    ) -> Result<ReadyShift, TransitionError>;

    async fn set_battle(
        &self,
        actor: &RoomActor,
        in_battle: bool,
    ) -> Result<BattleShift, TransitionError>;

    // Accounts --------------------------------------------------------------

    /// Create (or re-initialize) an account. `recreate` writes to the shadow
    /// collection so the old data stays with the old identity.
    async fn create_user(&self, new_user: NewUser, recreate: bool) -> Result<UserProfile>;

    /// Shadow-first lookup by account.
    async fn user_by_account(&self, account: &str) -> Result<Option<UserProfile>>;

    /// Shadow-first lookup by uid.
    async fn user_by_uid(&self, uid: &str) -> Result<Option<UserProfile>>;

    async fn set_user_online(&self, account: &str, online: bool) -> Result<()>;

    async fn delete_user(&self, account: &str, delete_reason: &str) -> Result<()>;

    /// Clear the deletion flag on a primary account row.
    async fn restore_user(&self, account: &str) -> Result<()>;

    /// Whether a deleted account's 15-day re-activation window has lapsed.
    /// Accounts with no deleted row count as expired.
    async fn is_activation_expired(&self, account: &str) -> Result<bool>;

    /// The uid of the live (non-deleted) primary row for an account.
    async fn live_account_uid(&self, account: &str) -> Result<Option<String>>;

    /// Whether a live shadow row exists for the account.
    async fn is_account_recreated(&self, account: &str) -> Result<bool>;

    async fn user_cnt(&self) -> Result<u64>;

    // Game results ----------------------------------------------------------

    /// Insert a raw game result. Rejects a duplicate `(app_uid, create_ts)`
    /// pair so redelivered callbacks stay idempotent.
    async fn insert_game_result(&self, record: GameResultRecord) -> Result<bool>;

    async fn personal_stats(&self, uid: &str) -> Result<Option<PersonalGameStats>>;

    async fn upsert_personal_stats(&self, stats: PersonalGameStats) -> Result<()>;

    // Verification ----------------------------------------------------------

    /// Recompute the four counters of a room from the state records.
    async fn recount_room_counters(&self, room_id: &str) -> Result<CounterReconciliation>;

    async fn room_ids(&self) -> Result<Vec<String>>;
}
