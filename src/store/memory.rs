//! In-memory store implementation.
//!
//! Every collection lives inside one `Collections` struct behind a single
//! `RwLock`; holding the writer guard is the transaction boundary. A
//! transition therefore reads its preconditions and commits the state record
//! together with the counter delta atomically, exactly the contract the
//! engine relies on.

use super::types::*;
use super::{
    BattleShift, GatewayStore, PresenceShift, ReadyShift, RoomActor, SeatShift, TransitionError,
    UnseatShift, FORCED_KICK_FREEZE_SECS,
};
use anyhow::Result;
use async_trait::async_trait;
use rand::RngExt;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Generate a fresh user id: `User_` + unix seconds + 4 random digits.
pub fn new_uid() -> String {
    let suffix: u32 = rand::rng().random_range(1000..10000);
    format!("User_{}{}", unix_ts(), suffix)
}

type RoomUserKey = (String, String);

#[derive(Default)]
struct Collections {
    users: HashMap<String, UserProfile>,
    /// Shadow rows for deleted-then-recreated accounts.
    users_shadow: HashMap<String, UserProfile>,
    games: HashMap<String, InstalledGame>,
    ai_players: HashMap<String, InstalledAiPlayer>,
    rooms: HashMap<String, InstalledRoom>,
    presences: HashMap<RoomUserKey, RoomPresence>,
    seats: HashMap<RoomUserKey, RoomSeat>,
    ready: HashMap<RoomUserKey, RoomReady>,
    battles: HashMap<RoomUserKey, RoomBattle>,
    game_results: HashMap<(String, i64), GameResultRecord>,
    personal_stats: HashMap<String, PersonalGameStats>,
}

impl Collections {
    fn live_counts(&self, room_id: &str) -> (i64, i64, i64, i64) {
        let online = self
            .presences
            .values()
            .filter(|p| p.room_id == room_id && p.online)
            .count() as i64;
        let seated = self
            .seats
            .values()
            .filter(|s| s.room_id == room_id && s.in_game_queue)
            .count() as i64;
        let ready = self
            .ready
            .values()
            .filter(|r| r.room_id == room_id && r.in_game_queue_be_ready)
            .count() as i64;
        let battling = self
            .battles
            .values()
            .filter(|b| b.room_id == room_id && b.in_game_battle)
            .count() as i64;
        (online, seated, ready, battling)
    }
}

/// Single-process store for deployments without an external database and for
/// the test suites.
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Collections>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a stored queue counter, bypassing the transition paths.
    /// Exists so drift detection can be exercised.
    #[cfg(test)]
    pub async fn force_queue_counter(&self, room_id: &str, value: i64) {
        let mut inner = self.inner.write().await;
        if let Some(room) = inner.rooms.get_mut(room_id) {
            room.in_game_queue_user_cnt = value;
        }
    }
}

fn room_of<'a>(
    rooms: &'a mut HashMap<String, InstalledRoom>,
    room_id: &str,
) -> Result<&'a mut InstalledRoom, TransitionError> {
    rooms
        .get_mut(room_id)
        .ok_or_else(|| TransitionError::RoomNotFound(room_id.to_string()))
}

#[async_trait]
impl GatewayStore for InMemoryStore {
    async fn health_check(&self) -> bool {
        true
    }

    async fn upsert_game(&self, game: InstalledGame) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.games.insert(game.index.clone(), game);
        Ok(())
    }

    async fn upsert_ai_player(&self, ai_player: InstalledAiPlayer) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.ai_players.insert(ai_player.id.clone(), ai_player);
        Ok(())
    }

    async fn upsert_room_master(&self, mut room: InstalledRoom) -> Result<()> {
        let mut inner = self.inner.write().await;
        // Counters are authoritative for reads but derivable: re-seed them
        // from the live records plus the AI baseline on every bootstrap.
        let (online, seated, ready, battling) = inner.live_counts(&room.id);
        room.online_user_cnt = online + room.ai_player_cnt;
        room.in_game_queue_user_cnt = seated + room.ai_player_cnt;
        room.in_game_queue_be_ready_user_cnt = ready + room.ai_player_cnt;
        room.in_game_battle_user_cnt = battling + room.ai_player_cnt;
        room.assistants = Vec::new();
        room.update_ts = unix_ts();
        inner.rooms.insert(room.id.clone(), room);
        Ok(())
    }

    async fn add_room_assistant(&self, room_id: &str, assistant: RoomAssistant) -> Result<()> {
        let mut inner = self.inner.write().await;
        let room = inner
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| anyhow::anyhow!("room {room_id} not installed"))?;
        room.assistants.push(assistant);
        room.update_ts = unix_ts();
        Ok(())
    }

    async fn get_room(&self, room_id: &str) -> Result<Option<InstalledRoom>> {
        let inner = self.inner.read().await;
        Ok(inner.rooms.get(room_id).cloned())
    }

    async fn list_rooms(
        &self,
        game_index: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<InstalledRoom>> {
        let inner = self.inner.read().await;
        let mut rooms: Vec<InstalledRoom> = inner
            .rooms
            .values()
            .filter(|r| game_index == "all" || r.game_index == game_index)
            .cloned()
            .collect();
        rooms.sort_by(|a, b| {
            b.be_hosting
                .cmp(&a.be_hosting)
                .then(b.rank_weight.cmp(&a.rank_weight))
                .then(a.in_game_queue_user_cnt.cmp(&b.in_game_queue_user_cnt))
                .then(b.online_user_cnt.cmp(&a.online_user_cnt))
                .then(b.update_ts.cmp(&a.update_ts))
        });
        Ok(rooms.into_iter().skip(offset).take(limit).collect())
    }

    async fn room_presences(&self, room_id: &str, limit: usize) -> Result<Vec<RoomPresence>> {
        let inner = self.inner.read().await;
        let mut list: Vec<RoomPresence> = inner
            .presences
            .values()
            .filter(|p| p.room_id == room_id && p.online)
            .cloned()
            .collect();
        list.sort_by_key(|p| p.update_ts);
        list.truncate(limit);
        Ok(list)
    }

    async fn seated_users(&self, room_id: &str) -> Result<Vec<SeatedUser>> {
        let inner = self.inner.read().await;
        let mut seats: Vec<RoomSeat> = inner
            .seats
            .values()
            .filter(|s| s.room_id == room_id && s.in_game_queue)
            .cloned()
            .collect();
        seats.sort_by_key(|s| s.update_ts);
        Ok(seats
            .into_iter()
            .map(|s| {
                let key = (s.room_id.clone(), s.user_id.clone());
                let is_be_ready = inner
                    .ready
                    .get(&key)
                    .is_some_and(|r| r.in_game_queue_be_ready);
                SeatedUser {
                    room_id: s.room_id,
                    user_id: s.user_id,
                    user_nickname: s.user_nickname,
                    user_avatar: s.user_avatar,
                    at_game_queue_x_coord: s.at_game_queue_x_coord,
                    at_game_queue_y_coord: s.at_game_queue_y_coord,
                    is_ai: false,
                    is_be_ready,
                }
            })
            .collect())
    }

    async fn seat_record(&self, room_id: &str, user_id: &str) -> Result<Option<RoomSeat>> {
        let inner = self.inner.read().await;
        Ok(inner
            .seats
            .get(&(room_id.to_string(), user_id.to_string()))
            .cloned())
    }

    async fn battle_room_of(&self, user_id: &str) -> Result<Option<String>> {
        let inner = self.inner.read().await;
        Ok(inner
            .battles
            .values()
            .find(|b| b.user_id == user_id && b.in_game_battle)
            .map(|b| b.room_id.clone()))
    }

    async fn set_presence(
        &self,
        actor: &RoomActor,
        online: bool,
    ) -> Result<PresenceShift, TransitionError> {
        let mut inner = self.inner.write().await;
        let key = (actor.room_id.clone(), actor.user_id.clone());

        let current = inner.presences.get(&key);
        let filtered = match current {
            // Already in the requested state: do not double-count.
            Some(doc) => doc.online == online,
            // Leaving a room never entered is ignored.
            None => !online,
        };
        if filtered {
            let room = room_of(&mut inner.rooms, &actor.room_id)?.clone();
            return Ok(PresenceShift {
                applied: false,
                room,
            });
        }

        let update_ts = unix_ts();
        inner.presences.insert(
            key,
            RoomPresence {
                room_id: actor.room_id.clone(),
                user_id: actor.user_id.clone(),
                user_nickname: actor.user_nickname.clone(),
                user_avatar: actor.user_avatar.clone(),
                online,
                update_ts,
            },
        );

        let room = room_of(&mut inner.rooms, &actor.room_id)?;
        room.online_user_cnt += if online { 1 } else { -1 };
        room.update_ts = update_ts;
        Ok(PresenceShift {
            applied: true,
            room: room.clone(),
        })
    }

    async fn seat_user(
        &self,
        actor: &RoomActor,
        x: usize,
        y: usize,
    ) -> Result<SeatShift, TransitionError> {
        let mut inner = self.inner.write().await;
        let key = (actor.room_id.clone(), actor.user_id.clone());

        let room = inner
            .rooms
            .get(&actor.room_id)
            .ok_or_else(|| TransitionError::RoomNotFound(actor.room_id.clone()))?
            .clone();

        let (rows, cols) = room.queue_dims();
        if x >= rows || y >= cols {
            return Err(TransitionError::SeatOutOfBounds {
                room_id: actor.room_id.clone(),
                x,
                y,
            });
        }

        if let Some(doc) = inner.seats.get(&key) {
            if doc.in_game_queue {
                // Already seated: repeated sit is a no-op.
                return Ok(SeatShift {
                    applied: false,
                    queue_is_full: false,
                    room,
                });
            }
            let now = unix_ts();
            if doc.frozen_time > 0 && doc.frozen_time > now {
                return Err(TransitionError::Frozen {
                    room_id: actor.room_id.clone(),
                    user_id: actor.user_id.clone(),
                    seconds_left: doc.frozen_time - now,
                });
            }
        }

        if room.in_game_queue_user_cnt >= room.carrying_capacity {
            return Err(TransitionError::QueueFull {
                room_id: actor.room_id.clone(),
            });
        }
        // This sit claims the last seat when exactly one spot is open.
        let queue_is_full = room.carrying_capacity - room.in_game_queue_user_cnt == 1;

        let occupied = inner.seats.values().any(|s| {
            s.room_id == actor.room_id
                && s.in_game_queue
                && s.at_game_queue_x_coord == x
                && s.at_game_queue_y_coord == y
        });
        if occupied {
            return Err(TransitionError::SeatOccupied {
                room_id: actor.room_id.clone(),
                x,
                y,
            });
        }

        let update_ts = unix_ts();
        inner.seats.insert(
            key,
            RoomSeat {
                room_id: actor.room_id.clone(),
                user_id: actor.user_id.clone(),
                user_nickname: actor.user_nickname.clone(),
                user_avatar: actor.user_avatar.clone(),
                in_game_queue: true,
                at_game_queue_x_coord: x,
                at_game_queue_y_coord: y,
                frozen_time: 0,
                update_ts,
            },
        );

        let room = room_of(&mut inner.rooms, &actor.room_id)?;
        room.in_game_queue_user_cnt += 1;
        room.update_ts = update_ts;
        Ok(SeatShift {
            applied: true,
            queue_is_full,
            room: room.clone(),
        })
    }

    async fn unseat_user(
        &self,
        actor: &RoomActor,
        force: bool,
    ) -> Result<UnseatShift, TransitionError> {
        let mut inner = self.inner.write().await;
        let key = (actor.room_id.clone(), actor.user_id.clone());

        let seated = inner.seats.get(&key).is_some_and(|s| s.in_game_queue);
        if !seated {
            let room = room_of(&mut inner.rooms, &actor.room_id)?.clone();
            return Ok(UnseatShift {
                applied: false,
                room,
            });
        }

        let in_battle = inner.battles.get(&key).is_some_and(|b| b.in_game_battle);
        if in_battle {
            return Err(TransitionError::InBattle {
                room_id: actor.room_id.clone(),
                user_id: actor.user_id.clone(),
            });
        }

        let update_ts = unix_ts();
        if let Some(seat) = inner.seats.get_mut(&key) {
            seat.in_game_queue = false;
            seat.frozen_time = if force {
                update_ts + FORCED_KICK_FREEZE_SECS
            } else {
                0
            };
            seat.update_ts = update_ts;
        }

        let room = room_of(&mut inner.rooms, &actor.room_id)?;
        room.in_game_queue_user_cnt -= 1;
        room.update_ts = update_ts;
        Ok(UnseatShift {
            applied: true,
            room: room.clone(),
        })
    }

    async fn set_ready(
        &self,
        actor: &RoomActor,
        ready: bool,
    ) -> Result<ReadyShift, TransitionError> {
        let mut inner = self.inner.write().await;
        let key = (actor.room_id.clone(), actor.user_id.clone());

        let current = inner.ready.get(&key);
        let filtered = match current {
            Some(doc) => doc.in_game_queue_be_ready == ready,
            None => !ready,
        };
        if filtered {
            let room = room_of(&mut inner.rooms, &actor.room_id)?.clone();
            return Ok(ReadyShift {
                applied: false,
                all_ready: false,
                room,
            });
        }

        let in_battle = inner.battles.get(&key).is_some_and(|b| b.in_game_battle);
        if !ready && in_battle {
            return Err(TransitionError::InBattle {
                room_id: actor.room_id.clone(),
                user_id: actor.user_id.clone(),
            });
        }

        if ready {
            let seated = inner.seats.get(&key).is_some_and(|s| s.in_game_queue);
            if !seated {
                return Err(TransitionError::NotSeated {
                    room_id: actor.room_id.clone(),
                    user_id: actor.user_id.clone(),
                });
            }
        }

        let room_snapshot = inner
            .rooms
            .get(&actor.room_id)
            .ok_or_else(|| TransitionError::RoomNotFound(actor.room_id.clone()))?;
        // Completion is judged before the increment: this transition is the
        // one that fills the set when exactly one slot is outstanding.
        let all_ready = ready
            && room_snapshot.carrying_capacity - room_snapshot.in_game_queue_be_ready_user_cnt
                == 1;

        let update_ts = unix_ts();
        inner.ready.insert(
            key,
            RoomReady {
                room_id: actor.room_id.clone(),
                user_id: actor.user_id.clone(),
                user_nickname: actor.user_nickname.clone(),
                user_avatar: actor.user_avatar.clone(),
                in_game_queue_be_ready: ready,
                update_ts,
            },
        );

        let room = room_of(&mut inner.rooms, &actor.room_id)?;
        room.in_game_queue_be_ready_user_cnt += if ready { 1 } else { -1 };
        room.update_ts = update_ts;
        Ok(ReadyShift {
            applied: true,
            all_ready,
            room: room.clone(),
        })
    }

    async fn set_battle(
        &self,
        actor: &RoomActor,
        in_battle: bool,
    ) -> Result<BattleShift, TransitionError> {
        let mut inner = self.inner.write().await;
        let key = (actor.room_id.clone(), actor.user_id.clone());

        let current = inner.battles.get(&key);
        let filtered = match current {
            Some(doc) => doc.in_game_battle == in_battle,
            None => !in_battle,
        };
        if filtered {
            let room = room_of(&mut inner.rooms, &actor.room_id)?.clone();
            return Ok(BattleShift {
                applied: false,
                all_in_battle: false,
                room,
            });
        }

        let room_snapshot = inner
            .rooms
            .get(&actor.room_id)
            .ok_or_else(|| TransitionError::RoomNotFound(actor.room_id.clone()))?;
        let all_in_battle = in_battle
            && room_snapshot.carrying_capacity - room_snapshot.in_game_battle_user_cnt == 1;

        let update_ts = unix_ts();
        inner.battles.insert(
            key,
            RoomBattle {
                room_id: actor.room_id.clone(),
                user_id: actor.user_id.clone(),
                user_nickname: actor.user_nickname.clone(),
                user_avatar: actor.user_avatar.clone(),
                in_game_battle: in_battle,
                update_ts,
            },
        );

        let room = room_of(&mut inner.rooms, &actor.room_id)?;
        room.in_game_battle_user_cnt += if in_battle { 1 } else { -1 };
        room.update_ts = update_ts;
        Ok(BattleShift {
            applied: true,
            all_in_battle,
            room: room.clone(),
        })
    }

    async fn create_user(&self, new_user: NewUser, recreate: bool) -> Result<UserProfile> {
        let mut inner = self.inner.write().await;
        let uid = new_user.uid.unwrap_or_else(new_uid);
        let now = unix_ts();
        let profile = UserProfile {
            uid: uid.clone(),
            account: new_user.account.clone(),
            account_usr: uid,
            device_type: new_user.device_type,
            device_id: new_user.device_id,
            push_registration_id: new_user.push_registration_id,
            nickname: String::new(),
            gender: 0,
            avatar: String::new(),
            birthday: String::new(),
            age: 0,
            extra_free_play_cnt: 1_000_000,
            extra_invited_user_cnt: 0,
            create_ts: now,
            update_ts: now,
            is_online: false,
            is_deleted: false,
            delete_reason: String::new(),
        };
        let target = if recreate {
            &mut inner.users_shadow
        } else {
            &mut inner.users
        };
        target.insert(new_user.account, profile.clone());
        Ok(profile)
    }

    async fn user_by_account(&self, account: &str) -> Result<Option<UserProfile>> {
        let inner = self.inner.read().await;
        if let Some(shadow) = inner.users_shadow.get(account) {
            if !shadow.is_deleted {
                return Ok(Some(shadow.clone()));
            }
        }
        Ok(inner.users.get(account).cloned())
    }

    async fn user_by_uid(&self, uid: &str) -> Result<Option<UserProfile>> {
        let inner = self.inner.read().await;
        if let Some(shadow) = inner
            .users_shadow
            .values()
            .find(|u| u.uid == uid && !u.is_deleted)
        {
            return Ok(Some(shadow.clone()));
        }
        Ok(inner.users.values().find(|u| u.uid == uid).cloned())
    }

    async fn set_user_online(&self, account: &str, online: bool) -> Result<()> {
        let mut inner = self.inner.write().await;
        let recreated = inner
            .users_shadow
            .get(account)
            .is_some_and(|u| !u.is_deleted);
        let target = if recreated {
            &mut inner.users_shadow
        } else {
            &mut inner.users
        };
        if let Some(user) = target.get_mut(account) {
            if !user.is_deleted {
                user.is_online = online;
                user.update_ts = unix_ts();
            }
        }
        Ok(())
    }

    async fn delete_user(&self, account: &str, delete_reason: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(user) = inner.users.get_mut(account) {
            user.is_deleted = true;
            user.delete_reason = delete_reason.to_string();
            user.update_ts = unix_ts();
        }
        Ok(())
    }

    async fn restore_user(&self, account: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(user) = inner.users.get_mut(account) {
            user.is_deleted = false;
            user.delete_reason = String::new();
            user.update_ts = unix_ts();
        }
        Ok(())
    }

    async fn is_activation_expired(&self, account: &str) -> Result<bool> {
        const REACTIVATION_WINDOW_SECS: i64 = 15 * 24 * 3600;
        let inner = self.inner.read().await;
        Ok(match inner.users.get(account).filter(|u| u.is_deleted) {
            Some(user) => unix_ts() - user.update_ts > REACTIVATION_WINDOW_SECS,
            None => true,
        })
    }

    async fn live_account_uid(&self, account: &str) -> Result<Option<String>> {
        let inner = self.inner.read().await;
        Ok(inner
            .users
            .get(account)
            .filter(|u| !u.is_deleted)
            .map(|u| u.uid.clone()))
    }

    async fn is_account_recreated(&self, account: &str) -> Result<bool> {
        let inner = self.inner.read().await;
        Ok(inner
            .users_shadow
            .get(account)
            .is_some_and(|u| !u.is_deleted))
    }

    async fn user_cnt(&self) -> Result<u64> {
        let inner = self.inner.read().await;
        Ok(inner.users.len() as u64)
    }

    async fn insert_game_result(&self, record: GameResultRecord) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let key = (record.app_uid.clone(), record.create_ts);
        if inner.game_results.contains_key(&key) {
            return Ok(false);
        }
        inner.game_results.insert(key, record);
        Ok(true)
    }

    async fn personal_stats(&self, uid: &str) -> Result<Option<PersonalGameStats>> {
        let inner = self.inner.read().await;
        Ok(inner.personal_stats.get(uid).cloned())
    }

    async fn upsert_personal_stats(&self, stats: PersonalGameStats) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.personal_stats.insert(stats.uid.clone(), stats);
        Ok(())
    }

    async fn recount_room_counters(&self, room_id: &str) -> Result<CounterReconciliation> {
        let inner = self.inner.read().await;
        let room = inner
            .rooms
            .get(room_id)
            .ok_or_else(|| anyhow::anyhow!("room {room_id} not installed"))?;
        let (online, seated, ready, battling) = inner.live_counts(room_id);
        let baseline = room.ai_player_cnt;
        Ok(CounterReconciliation {
            room_id: room_id.to_string(),
            online: CounterPair {
                stored: room.online_user_cnt,
                recomputed: online + baseline,
            },
            queue: CounterPair {
                stored: room.in_game_queue_user_cnt,
                recomputed: seated + baseline,
            },
            ready: CounterPair {
                stored: room.in_game_queue_be_ready_user_cnt,
                recomputed: ready + baseline,
            },
            battle: CounterPair {
                stored: room.in_game_battle_user_cnt,
                recomputed: battling + baseline,
            },
        })
    }

    async fn room_ids(&self) -> Result<Vec<String>> {
        let inner = self.inner.read().await;
        let mut ids: Vec<String> = inner.rooms.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lolm_room(id: &str) -> InstalledRoom {
        InstalledRoom {
            id: id.to_string(),
            game_index: "lolm".to_string(),
            rule_title: "5v5".to_string(),
            rule_content: String::new(),
            title: "ranked grind".to_string(),
            cover: String::new(),
            announcement: String::new(),
            tags: vec![],
            owner_id: "ai_master".to_string(),
            owner_nickname: "Master".to_string(),
            owner_gender: 1,
            owner_avatar: String::new(),
            assistants: vec![],
            carrying_capacity: 5,
            queue_symbol: "X;X;X;X;X".to_string(),
            ai_player_cnt: 1,
            rank_weight: 0,
            be_hosting: false,
            online_user_cnt: 0,
            in_game_queue_user_cnt: 0,
            in_game_queue_be_ready_user_cnt: 0,
            in_game_battle_user_cnt: 0,
            update_ts: 0,
        }
    }

    fn actor(room_id: &str, user_id: &str) -> RoomActor {
        RoomActor {
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
            user_nickname: user_id.to_string(),
            user_avatar: String::new(),
        }
    }

    async fn store_with_room(id: &str) -> InMemoryStore {
        let store = InMemoryStore::new();
        store.upsert_room_master(lolm_room(id)).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_bootstrap_seeds_counters_with_ai_baseline() {
        let store = store_with_room("room_1").await;
        let room = store.get_room("room_1").await.unwrap().unwrap();
        assert_eq!(room.online_user_cnt, 1);
        assert_eq!(room.in_game_queue_user_cnt, 1);
        assert_eq!(room.in_game_queue_be_ready_user_cnt, 1);
        assert_eq!(room.in_game_battle_user_cnt, 1);
    }

    #[tokio::test]
    async fn test_presence_enter_is_idempotent() {
        let store = store_with_room("room_1").await;
        let u1 = actor("room_1", "u1");

        let first = store.set_presence(&u1, true).await.unwrap();
        assert!(first.applied);
        assert_eq!(first.room.online_user_cnt, 2);

        let second = store.set_presence(&u1, true).await.unwrap();
        assert!(!second.applied);
        assert_eq!(second.room.online_user_cnt, 2);
    }

    #[tokio::test]
    async fn test_presence_leave_without_enter_is_filtered() {
        let store = store_with_room("room_1").await;
        let shift = store
            .set_presence(&actor("room_1", "ghost"), false)
            .await
            .unwrap();
        assert!(!shift.applied);
        assert_eq!(shift.room.online_user_cnt, 1);
    }

    #[tokio::test]
    async fn test_sit_occupied_seat_rejected() {
        let store = store_with_room("room_1").await;
        store.seat_user(&actor("room_1", "u1"), 1, 0).await.unwrap();

        let err = store
            .seat_user(&actor("room_1", "u2"), 1, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, TransitionError::SeatOccupied { x: 1, y: 0, .. }));
    }

    #[tokio::test]
    async fn test_sit_out_of_bounds_rejected() {
        let store = store_with_room("room_1").await;
        let err = store
            .seat_user(&actor("room_1", "u1"), 5, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, TransitionError::SeatOutOfBounds { .. }));
    }

    #[tokio::test]
    async fn test_capacity_enforced_and_last_seat_flagged() {
        let store = store_with_room("room_1").await;
        // Baseline 1 + 4 humans reaches capacity 5.
        for (i, uid) in ["u1", "u2", "u3"].iter().enumerate() {
            let shift = store
                .seat_user(&actor("room_1", uid), i + 1, 0)
                .await
                .unwrap();
            assert!(!shift.queue_is_full, "{uid} should not fill the queue");
        }
        let last = store.seat_user(&actor("room_1", "u4"), 4, 0).await.unwrap();
        assert!(last.queue_is_full);

        let err = store
            .seat_user(&actor("room_1", "u5"), 0, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, TransitionError::QueueFull { .. }));
    }

    #[tokio::test]
    async fn test_voluntary_stand_leaves_no_freeze() {
        let store = store_with_room("room_1").await;
        let u1 = actor("room_1", "u1");
        store.seat_user(&u1, 1, 0).await.unwrap();

        let shift = store.unseat_user(&u1, false).await.unwrap();
        assert!(shift.applied);
        assert_eq!(shift.room.in_game_queue_user_cnt, 1);

        // Can immediately re-seat at the same spot.
        assert!(store.seat_user(&u1, 1, 0).await.unwrap().applied);
    }

    #[tokio::test]
    async fn test_forced_kick_freezes_reseating() {
        let store = store_with_room("room_1").await;
        let u1 = actor("room_1", "u1");
        store.seat_user(&u1, 1, 0).await.unwrap();
        store.unseat_user(&u1, true).await.unwrap();

        let err = store.seat_user(&u1, 1, 0).await.unwrap_err();
        match err {
            TransitionError::Frozen { seconds_left, .. } => {
                assert!(seconds_left > 0 && seconds_left <= FORCED_KICK_FREEZE_SECS);
            }
            other => panic!("expected Frozen, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stand_while_in_battle_rejected() {
        let store = store_with_room("room_1").await;
        let u1 = actor("room_1", "u1");
        store.seat_user(&u1, 1, 0).await.unwrap();
        store.set_battle(&u1, true).await.unwrap();

        let err = store.unseat_user(&u1, false).await.unwrap_err();
        assert!(matches!(err, TransitionError::InBattle { .. }));
    }

    #[tokio::test]
    async fn test_ready_requires_seat() {
        let store = store_with_room("room_1").await;
        let err = store
            .set_ready(&actor("room_1", "u1"), true)
            .await
            .unwrap_err();
        assert!(matches!(err, TransitionError::NotSeated { .. }));
    }

    #[tokio::test]
    async fn test_unready_while_in_battle_rejected() {
        let store = store_with_room("room_1").await;
        let u1 = actor("room_1", "u1");
        store.seat_user(&u1, 1, 0).await.unwrap();
        store.set_ready(&u1, true).await.unwrap();
        store.set_battle(&u1, true).await.unwrap();

        let err = store.set_ready(&u1, false).await.unwrap_err();
        assert!(matches!(err, TransitionError::InBattle { .. }));
    }

    #[tokio::test]
    async fn test_ready_completion_fires_on_final_transition() {
        let store = store_with_room("room_1").await;
        // Capacity 5, AI baseline 1: four humans complete the set.
        for (i, uid) in ["u1", "u2", "u3", "u4"].iter().enumerate() {
            store
                .seat_user(&actor("room_1", uid), i + 1, 0)
                .await
                .unwrap();
        }
        for uid in ["u1", "u2", "u3"] {
            let shift = store.set_ready(&actor("room_1", uid), true).await.unwrap();
            assert!(!shift.all_ready, "{uid} should not complete the set");
        }
        let last = store.set_ready(&actor("room_1", "u4"), true).await.unwrap();
        assert!(last.all_ready);

        // A later unready-then-ready does not report completion twice in a
        // row without the count dipping first.
        store.set_ready(&actor("room_1", "u4"), false).await.unwrap();
        let again = store.set_ready(&actor("room_1", "u4"), true).await.unwrap();
        assert!(again.all_ready);
    }

    #[tokio::test]
    async fn test_battle_transitions_filter_noops() {
        let store = store_with_room("room_1").await;
        let u1 = actor("room_1", "u1");

        // Ending a battle never started is ignored.
        let shift = store.set_battle(&u1, false).await.unwrap();
        assert!(!shift.applied);

        let start = store.set_battle(&u1, true).await.unwrap();
        assert!(start.applied);
        let repeat = store.set_battle(&u1, true).await.unwrap();
        assert!(!repeat.applied);
        assert_eq!(repeat.room.in_game_battle_user_cnt, 2);

        assert_eq!(
            store.battle_room_of("u1").await.unwrap().as_deref(),
            Some("room_1")
        );
    }

    #[tokio::test]
    async fn test_counters_reconcile_after_mixed_traffic() {
        let store = store_with_room("room_1").await;
        for (i, uid) in ["u1", "u2", "u3"].iter().enumerate() {
            let a = actor("room_1", uid);
            store.set_presence(&a, true).await.unwrap();
            store.seat_user(&a, i + 1, 0).await.unwrap();
        }
        store.set_ready(&actor("room_1", "u1"), true).await.unwrap();
        store
            .unseat_user(&actor("room_1", "u3"), false)
            .await
            .unwrap();
        store
            .set_presence(&actor("room_1", "u3"), false)
            .await
            .unwrap();

        let recon = store.recount_room_counters("room_1").await.unwrap();
        assert!(recon.is_consistent(), "drifted: {recon:?}");
        assert_eq!(recon.online.stored, 3); // baseline 1 + u1 + u2
        assert_eq!(recon.queue.stored, 3);
        assert_eq!(recon.ready.stored, 2);
    }

    #[tokio::test]
    async fn test_list_rooms_ranking_order() {
        let store = InMemoryStore::new();

        let mut hosted = lolm_room("room_hosted");
        hosted.be_hosting = true;
        store.upsert_room_master(hosted).await.unwrap();

        let mut weighted = lolm_room("room_weighted");
        weighted.rank_weight = 10;
        store.upsert_room_master(weighted).await.unwrap();

        let plain = lolm_room("room_plain");
        store.upsert_room_master(plain).await.unwrap();

        // A seated human makes room_plain rank below an equally weighted
        // emptier room.
        let mut emptier = lolm_room("room_emptier");
        emptier.ai_player_cnt = 0;
        store.upsert_room_master(emptier).await.unwrap();
        store
            .seat_user(&actor("room_plain", "u1"), 1, 0)
            .await
            .unwrap();

        let rooms = store.list_rooms("lolm", 0, 10).await.unwrap();
        let ids: Vec<&str> = rooms.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids[0], "room_hosted");
        assert_eq!(ids[1], "room_weighted");
        assert_eq!(ids[2], "room_emptier"); // queue count 0 sorts before 1 and 2
        assert_eq!(ids[3], "room_plain");

        // Unknown index filters everything; "all" keeps everything.
        assert!(store.list_rooms("wuhu", 0, 10).await.unwrap().is_empty());
        assert_eq!(store.list_rooms("all", 0, 10).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_shadow_account_precedence() {
        let store = InMemoryStore::new();
        let first = store
            .create_user(
                NewUser {
                    uid: None,
                    account: "13800000001".to_string(),
                    device_type: 1,
                    device_id: "dev-a".to_string(),
                    push_registration_id: String::new(),
                },
                false,
            )
            .await
            .unwrap();

        store
            .delete_user("13800000001", "user request")
            .await
            .unwrap();
        assert!(store.live_account_uid("13800000001").await.unwrap().is_none());

        // Recreation lands in the shadow collection and wins lookups.
        let second = store
            .create_user(
                NewUser {
                    uid: None,
                    account: "13800000001".to_string(),
                    device_type: 2,
                    device_id: "dev-b".to_string(),
                    push_registration_id: String::new(),
                },
                true,
            )
            .await
            .unwrap();
        assert!(store.is_account_recreated("13800000001").await.unwrap());

        let resolved = store
            .user_by_account("13800000001")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved.uid, second.uid);
        assert_ne!(resolved.uid, first.uid);
        assert_eq!(resolved.device_id, "dev-b");
    }

    #[tokio::test]
    async fn test_recently_deleted_account_can_be_restored() {
        let store = InMemoryStore::new();
        let user = store
            .create_user(
                NewUser {
                    uid: None,
                    account: "13800000002".to_string(),
                    device_type: 1,
                    device_id: "dev-a".to_string(),
                    push_registration_id: String::new(),
                },
                false,
            )
            .await
            .unwrap();

        store.delete_user("13800000002", "cooling off").await.unwrap();
        // Freshly deleted: still inside the 15-day window.
        assert!(!store.is_activation_expired("13800000002").await.unwrap());
        // An account never deleted counts as expired.
        assert!(store.is_activation_expired("unknown").await.unwrap());

        store.restore_user("13800000002").await.unwrap();
        assert_eq!(
            store.live_account_uid("13800000002").await.unwrap().as_deref(),
            Some(user.uid.as_str())
        );
    }

    #[tokio::test]
    async fn test_duplicate_game_result_rejected() {
        let store = InMemoryStore::new();
        let record = GameResultRecord {
            trace_id: "t-1".to_string(),
            status_code: 0,
            app_uid: "User_1".to_string(),
            app_user_nickname: String::new(),
            app_user_avatar: String::new(),
            app_aid: "ai_1".to_string(),
            app_ai_player_nickname: String::new(),
            app_ai_player_avatar: String::new(),
            app_room_id: "room_1".to_string(),
            app_game_index: "lolm".to_string(),
            game_region: String::new(),
            game_uid: String::new(),
            game_bid: String::new(),
            order_id: "o-1".to_string(),
            result_type: 1,
            result_game_idx: Some(3),
            result_win: Some(true),
            result_screenshots: None,
            create_ts: 1_700_000_000,
        };
        assert!(store.insert_game_result(record.clone()).await.unwrap());
        assert!(!store.insert_game_result(record).await.unwrap());
    }

    #[tokio::test]
    async fn test_seated_users_carry_ready_flag() {
        let store = store_with_room("room_1").await;
        store.seat_user(&actor("room_1", "u1"), 1, 0).await.unwrap();
        store.seat_user(&actor("room_1", "u2"), 2, 0).await.unwrap();
        store.set_ready(&actor("room_1", "u1"), true).await.unwrap();

        let seated = store.seated_users("room_1").await.unwrap();
        assert_eq!(seated.len(), 2);
        let u1 = seated.iter().find(|s| s.user_id == "u1").unwrap();
        let u2 = seated.iter().find(|s| s.user_id == "u2").unwrap();
        assert!(u1.is_be_ready);
        assert!(!u2.is_be_ready);
    }

    #[test]
    fn test_new_uid_shape() {
        let uid = new_uid();
        assert!(uid.starts_with("User_"));
        assert!(uid.len() > "User_".len() + 10);
    }
}
