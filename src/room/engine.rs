//! The room lifecycle engine.
//!
//! Every mutating seat/ready/battle operation follows the same shape:
//! acquire the room queue lock, run the transition as one store transaction,
//! publish the room event while the lock is still held (so per-room event
//! order follows commit order), release the lock. Presence transitions are
//! transaction-only. A filtered no-op transition never emits an event.

use crate::cache::keys;
use crate::events::{
    new_trace_id, EventProducer, RoomEventBody, RoomEventEnvelope, RoomEventKind,
};
use crate::lock::{HeldLock, Redlock};
use crate::room::layout::{build_seat_grid, LayoutOverrides};
use crate::room::view::{PresenceEntry, RoomDetail, RoomSummary};
use crate::store::{
    BattleShift, GatewayStore, InstalledRoom, ReadyShift, RoomActor, SeatShift, TransitionError,
    UnseatShift,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Presence hydration cap on the slow listing path.
const PRESENCE_LIST_LIMIT: usize = 100;

#[derive(Debug, Error)]
pub enum RoomError {
    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("could not acquire the queue lock of room {room_id}")]
    LockUnavailable { room_id: String },
}

#[derive(Debug, Clone, Copy, Default)]
struct EventFlags {
    queue_is_full: Option<bool>,
    queue_is_ready: Option<bool>,
    queue_is_in_game_battle: Option<bool>,
}

/// Coordinates room state transitions, event publication, and listing.
pub struct RoomEngine {
    store: Arc<dyn GatewayStore>,
    lock: Arc<Redlock>,
    producer: Arc<dyn EventProducer>,
    deploy_env: String,
    lock_ttl_ms: u64,
    layout_overrides: LayoutOverrides,
}

impl RoomEngine {
    pub fn new(
        store: Arc<dyn GatewayStore>,
        lock: Arc<Redlock>,
        producer: Arc<dyn EventProducer>,
        deploy_env: String,
        lock_ttl_ms: u64,
        layout_overrides: LayoutOverrides,
    ) -> Self {
        Self {
            store,
            lock,
            producer,
            deploy_env,
            lock_ttl_ms,
            layout_overrides,
        }
    }

    pub fn store(&self) -> &Arc<dyn GatewayStore> {
        &self.store
    }

    // Presence --------------------------------------------------------------

    /// Mark the user present in the room. Repeated enters are filtered.
    pub async fn enter_room(&self, actor: &RoomActor) -> Result<(), RoomError> {
        let shift = self.store.set_presence(actor, true).await?;
        if shift.applied {
            self.emit(RoomEventKind::EnterRoom, &shift.room, actor, EventFlags::default())
                .await;
        }
        Ok(())
    }

    /// Take the user out of the room. Clears readiness and the seat first
    /// (each with its own event) unless a battle pins them, then drops
    /// presence. A leave without a prior enter is filtered throughout.
    pub async fn leave_room(&self, actor: &RoomActor) -> Result<(), RoomError> {
        let held = self.acquire_queue_lock(&actor.room_id).await?;

        // A user in battle keeps seat and readiness; only presence drops.
        let seat_result = async {
            match self.store.set_ready(actor, false).await {
                Ok(shift) => {
                    if shift.applied {
                        self.emit(
                            RoomEventKind::InQueueNotBeReady,
                            &shift.room,
                            actor,
                            EventFlags {
                                queue_is_ready: Some(false),
                                ..EventFlags::default()
                            },
                        )
                        .await;
                    }
                }
                Err(TransitionError::InBattle { .. }) => return Ok(()),
                Err(err) => return Err(err),
            }
            match self.store.unseat_user(actor, false).await {
                Ok(shift) => {
                    if shift.applied {
                        self.emit(
                            RoomEventKind::LeaveQueue,
                            &shift.room,
                            actor,
                            EventFlags {
                                queue_is_full: Some(false),
                                ..EventFlags::default()
                            },
                        )
                        .await;
                    }
                    Ok(())
                }
                Err(TransitionError::InBattle { .. }) => Ok(()),
                Err(err) => Err(err),
            }
        }
        .await;
        self.release(&held).await;
        seat_result?;

        let shift = self.store.set_presence(actor, false).await?;
        if shift.applied {
            self.emit(RoomEventKind::LeaveRoom, &shift.room, actor, EventFlags::default())
                .await;
        }
        Ok(())
    }

    // Seats -----------------------------------------------------------------

    /// Seat the user at `(x, y)`.
    pub async fn sit(&self, actor: &RoomActor, x: usize, y: usize) -> Result<SeatShift, RoomError> {
        let held = self.acquire_queue_lock(&actor.room_id).await?;
        let result = self.store.seat_user(actor, x, y).await;
        if let Ok(shift) = &result {
            if shift.applied {
                self.emit(
                    RoomEventKind::EnterQueue,
                    &shift.room,
                    actor,
                    EventFlags {
                        queue_is_full: Some(shift.queue_is_full),
                        ..EventFlags::default()
                    },
                )
                .await;
            }
        }
        self.release(&held).await;
        Ok(result?)
    }

    /// Remove the user from the queue. Readiness is cleared first so the
    /// `ready ⇒ seated` implication is never observable as violated; a
    /// forced removal freezes re-seating.
    pub async fn stand(&self, actor: &RoomActor, force: bool) -> Result<UnseatShift, RoomError> {
        let held = self.acquire_queue_lock(&actor.room_id).await?;
        let result = async {
            let ready_shift = self.store.set_ready(actor, false).await?;
            if ready_shift.applied {
                self.emit(
                    RoomEventKind::InQueueNotBeReady,
                    &ready_shift.room,
                    actor,
                    EventFlags {
                        queue_is_ready: Some(false),
                        ..EventFlags::default()
                    },
                )
                .await;
            }

            let shift = self.store.unseat_user(actor, force).await?;
            if shift.applied {
                self.emit(
                    RoomEventKind::LeaveQueue,
                    &shift.room,
                    actor,
                    EventFlags {
                        queue_is_full: Some(false),
                        ..EventFlags::default()
                    },
                )
                .await;
            }
            Ok(shift)
        }
        .await;
        self.release(&held).await;
        result
    }

    // Readiness -------------------------------------------------------------

    /// Signal readiness. `all_ready` on the returned shift marks the
    /// transition that completed the set.
    pub async fn ready(&self, actor: &RoomActor) -> Result<ReadyShift, RoomError> {
        let held = self.acquire_queue_lock(&actor.room_id).await?;
        let result = self.store.set_ready(actor, true).await;
        if let Ok(shift) = &result {
            if shift.applied {
                self.emit(
                    RoomEventKind::InQueueBeReady,
                    &shift.room,
                    actor,
                    EventFlags {
                        queue_is_ready: Some(shift.all_ready),
                        ..EventFlags::default()
                    },
                )
                .await;
            }
        }
        self.release(&held).await;
        Ok(result?)
    }

    /// Withdraw readiness. Rejected while the user is in battle.
    pub async fn unready(&self, actor: &RoomActor) -> Result<ReadyShift, RoomError> {
        let held = self.acquire_queue_lock(&actor.room_id).await?;
        let result = self.store.set_ready(actor, false).await;
        if let Ok(shift) = &result {
            if shift.applied {
                self.emit(
                    RoomEventKind::InQueueNotBeReady,
                    &shift.room,
                    actor,
                    EventFlags {
                        queue_is_ready: Some(false),
                        ..EventFlags::default()
                    },
                )
                .await;
            }
        }
        self.release(&held).await;
        Ok(result?)
    }

    // Battles ---------------------------------------------------------------

    /// Flag the user as inside the third-party game.
    pub async fn start_battle(&self, actor: &RoomActor) -> Result<BattleShift, RoomError> {
        let held = self.acquire_queue_lock(&actor.room_id).await?;
        let result = self.store.set_battle(actor, true).await;
        if let Ok(shift) = &result {
            if shift.applied {
                self.emit(
                    RoomEventKind::Start3rdPartyGame,
                    &shift.room,
                    actor,
                    EventFlags {
                        queue_is_in_game_battle: Some(shift.all_in_battle),
                        ..EventFlags::default()
                    },
                )
                .await;
            }
        }
        self.release(&held).await;
        Ok(result?)
    }

    /// Flag the user as back from the third-party game.
    pub async fn end_battle(&self, actor: &RoomActor) -> Result<BattleShift, RoomError> {
        let held = self.acquire_queue_lock(&actor.room_id).await?;
        let result = self.store.set_battle(actor, false).await;
        if let Ok(shift) = &result {
            if shift.applied {
                self.emit(
                    RoomEventKind::End3rdPartyGame,
                    &shift.room,
                    actor,
                    EventFlags {
                        queue_is_in_game_battle: Some(false),
                        ..EventFlags::default()
                    },
                )
                .await;
            }
        }
        self.release(&held).await;
        Ok(result?)
    }

    // Listing ---------------------------------------------------------------

    /// Fast path: counters and owner identity only.
    pub async fn list_rooms_fast(
        &self,
        game_index: &str,
        offset: usize,
        limit: usize,
    ) -> anyhow::Result<Vec<RoomSummary>> {
        let rooms = self.store.list_rooms(game_index, offset, limit).await?;
        Ok(rooms.iter().map(RoomSummary::from).collect())
    }

    /// Slow path: additionally hydrates the presence list (capped) and the
    /// seat grid with AI pre-fill.
    pub async fn list_rooms_full(
        &self,
        game_index: &str,
        offset: usize,
        limit: usize,
    ) -> anyhow::Result<Vec<RoomDetail>> {
        let rooms = self.store.list_rooms(game_index, offset, limit).await?;
        let mut details = Vec::with_capacity(rooms.len());
        for room in &rooms {
            details.push(self.hydrate(room).await?);
        }
        Ok(details)
    }

    pub async fn get_room_fast(&self, room_id: &str) -> anyhow::Result<Option<RoomSummary>> {
        Ok(self
            .store
            .get_room(room_id)
            .await?
            .as_ref()
            .map(RoomSummary::from))
    }

    pub async fn get_room_full(&self, room_id: &str) -> anyhow::Result<Option<RoomDetail>> {
        match self.store.get_room(room_id).await? {
            Some(room) => Ok(Some(self.hydrate(&room).await?)),
            None => Ok(None),
        }
    }

    async fn hydrate(&self, room: &InstalledRoom) -> anyhow::Result<RoomDetail> {
        let mut online_users: Vec<PresenceEntry> = Vec::new();
        online_users.push(PresenceEntry {
            user_id: room.owner_id.clone(),
            user_nickname: room.owner_nickname.clone(),
            user_avatar: room.owner_avatar.clone(),
            is_ai: true,
        });
        for assistant in &room.assistants {
            online_users.push(PresenceEntry {
                user_id: assistant.assistant_id.clone(),
                user_nickname: assistant.assistant_nickname.clone(),
                user_avatar: assistant.assistant_avatar.clone(),
                is_ai: true,
            });
        }
        for presence in self
            .store
            .room_presences(&room.id, PRESENCE_LIST_LIMIT)
            .await?
        {
            online_users.push(PresenceEntry {
                user_id: presence.user_id,
                user_nickname: presence.user_nickname,
                user_avatar: presence.user_avatar,
                is_ai: false,
            });
        }

        let seated = self.store.seated_users(&room.id).await?;
        let prefill = self
            .layout_overrides
            .prefill_for(&room.game_index, &room.id);
        let grid = build_seat_grid(room, &seated, prefill);

        Ok(RoomDetail {
            id: room.id.clone(),
            game_index: room.game_index.clone(),
            rule_title: room.rule_title.clone(),
            rule_content: room.rule_content.clone(),
            title: room.title.clone(),
            cover: room.cover.clone(),
            tags: room.tags.clone(),
            announcement: room.announcement.clone(),
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
            online_users,
            in_game_queue_users: grid,
        })
    }

    // Plumbing --------------------------------------------------------------

    async fn acquire_queue_lock(&self, room_id: &str) -> Result<HeldLock, RoomError> {
        let resource = keys::room_queue_lock(&self.deploy_env, room_id);
        self.lock
            .acquire(&resource, self.lock_ttl_ms)
            .await
            .map_err(|err| {
                error!(alarm = true, room_id, error = %err, "room queue lock unavailable");
                RoomError::LockUnavailable {
                    room_id: room_id.to_string(),
                }
            })
    }

    async fn release(&self, held: &HeldLock) {
        if !self.lock.release(held).await {
            warn!(resource = %held.resource, "queue lock released uncleanly");
        }
    }

    async fn emit(
        &self,
        kind: RoomEventKind,
        room: &InstalledRoom,
        actor: &RoomActor,
        flags: EventFlags,
    ) {
        let body = RoomEventBody {
            room_id: room.id.clone(),
            game_index: room.game_index.clone(),
            be_hosting: room.be_hosting,
            uid: actor.user_id.clone(),
            nickname: actor.user_nickname.clone(),
            avatar: actor.user_avatar.clone(),
            owner_id: room.owner_id.clone(),
            owner_nickname: room.owner_nickname.clone(),
            owner_avatar: room.owner_avatar.clone(),
            queue_is_full: flags.queue_is_full,
            queue_is_ready: flags.queue_is_ready,
            queue_is_in_game_battle: flags.queue_is_in_game_battle,
        };
        let envelope = match RoomEventEnvelope::wrap(kind, &body, new_trace_id()) {
            Ok(envelope) => envelope,
            Err(err) => {
                error!(alarm = true, room_id = %room.id, error = %err, "failed to encode room event");
                return;
            }
        };
        // The transition already committed; a publish failure must not roll
        // it back. Downstream reconciles via trace ids.
        if let Err(err) = self
            .producer
            .send_room_event(None, &room.id, &envelope)
            .await
        {
            error!(alarm = true, room_id = %room.id, event = ?kind, error = %err, "failed to publish room event");
        } else {
            debug!(room_id = %room.id, event = ?kind, uid = %actor.user_id, "published room event");
        }
    }
}
