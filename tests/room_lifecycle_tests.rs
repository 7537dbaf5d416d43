//! End-to-end room lifecycle scenarios against the engine and the in-memory
//! infrastructure stack.

use companion_gateway::events::{InMemoryProducer, RoomEventEnvelope, RoomEventKind};
use companion_gateway::lock::{InMemoryLockNode, LockNode, Redlock};
use companion_gateway::room::{LayoutOverrides, RoomEngine, RoomError, SeatPrefill};
use companion_gateway::store::{
    GatewayStore, InMemoryStore, InstalledRoom, RoomActor, RoomAssistant, TransitionError,
};
use std::sync::Arc;

const ROOM_EVENTS: &str = "room-events";

fn room(id: &str, game_index: &str, symbol: &str, capacity: i64, ai_cnt: i64) -> InstalledRoom {
    InstalledRoom {
        id: id.to_string(),
        game_index: game_index.to_string(),
        rule_title: String::new(),
        rule_content: String::new(),
        title: String::new(),
        cover: String::new(),
        announcement: String::new(),
        tags: vec![],
        owner_id: format!("ai_{id}"),
        owner_nickname: "Master".to_string(),
        owner_gender: 1,
        owner_avatar: String::new(),
        assistants: vec![],
        carrying_capacity: capacity,
        queue_symbol: symbol.to_string(),
        ai_player_cnt: ai_cnt,
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

struct Fixture {
    engine: RoomEngine,
    store: Arc<InMemoryStore>,
    producer: Arc<InMemoryProducer>,
}

fn fixture(overrides: LayoutOverrides) -> Fixture {
    let store = Arc::new(InMemoryStore::new());
    let producer = Arc::new(InMemoryProducer::new(
        "results".to_string(),
        ROOM_EVENTS.to_string(),
    ));
    let nodes: Vec<Arc<dyn LockNode>> = vec![Arc::new(InMemoryLockNode::new())];
    let engine = RoomEngine::new(
        store.clone(),
        Arc::new(Redlock::new(nodes)),
        producer.clone(),
        "test".to_string(),
        2000,
        overrides,
    );
    Fixture {
        engine,
        store,
        producer,
    }
}

async fn event_kinds(producer: &InMemoryProducer) -> Vec<RoomEventKind> {
    producer
        .messages(ROOM_EVENTS)
        .await
        .iter()
        .map(|m| {
            let envelope: RoomEventEnvelope = serde_json::from_str(&m.payload).unwrap();
            envelope.event_type
        })
        .collect()
}

/// Hosted two-seat room with master and slave AIs pre-filling both cells.
#[tokio::test]
async fn test_hosted_room_listing_prefills_both_ai_seats() {
    let mut overrides = LayoutOverrides::default();
    overrides
        .0
        .insert("room_000509".to_string(), SeatPrefill::SlaveBelow);
    let f = fixture(overrides);

    let mut hosted = room("room_000509", "lolm", "X;X", 2, 2);
    hosted.be_hosting = true;
    f.store.upsert_room_master(hosted).await.unwrap();
    f.store
        .add_room_assistant(
            "room_000509",
            RoomAssistant {
                assistant_id: "ai_slave".to_string(),
                assistant_nickname: "Slave".to_string(),
                assistant_gender: 2,
                assistant_avatar: String::new(),
            },
        )
        .await
        .unwrap();

    let rooms = f.engine.list_rooms_full("all", 0, 10).await.unwrap();
    assert_eq!(rooms.len(), 1);
    let detail = &rooms[0];
    assert_eq!(detail.online_user_cnt, 2);
    assert_eq!(detail.in_game_queue_user_cnt, 2);

    let top = detail.in_game_queue_users[0][0].as_ref().unwrap();
    let bottom = detail.in_game_queue_users[1][0].as_ref().unwrap();
    assert_eq!(top.user_id, "ai_room_000509");
    assert!(top.is_ai);
    assert_eq!(bottom.user_id, "ai_slave");
    assert!(bottom.is_ai);
}

/// Seat contention on a five-row LoL-Mobile shape.
#[tokio::test]
async fn test_sit_conflict_and_counter_movement() {
    let f = fixture(LayoutOverrides::default());
    f.store
        .upsert_room_master(room("r", "lolm", "X;X;X;X;X", 5, 1))
        .await
        .unwrap();

    let shift = f.engine.sit(&actor("r", "u1"), 1, 0).await.unwrap();
    assert!(shift.applied);
    assert_eq!(shift.room.in_game_queue_user_cnt, 2); // baseline 1 + u1

    let err = f.engine.sit(&actor("r", "u2"), 1, 0).await.unwrap_err();
    assert!(matches!(
        err,
        RoomError::Transition(TransitionError::SeatOccupied { x: 1, y: 0, .. })
    ));
}

/// A voluntary stand leaves no freeze; the seat is immediately reusable.
#[tokio::test]
async fn test_voluntary_stand_then_immediate_resit() {
    let f = fixture(LayoutOverrides::default());
    f.store
        .upsert_room_master(room("r", "lolm", "X;X;X;X;X", 5, 1))
        .await
        .unwrap();
    let u1 = actor("r", "u1");

    f.engine.sit(&u1, 1, 0).await.unwrap();
    let shift = f.engine.stand(&u1, false).await.unwrap();
    assert!(shift.applied);
    assert_eq!(shift.room.in_game_queue_user_cnt, 1);

    let seat = f.store.seat_record("r", "u1").await.unwrap().unwrap();
    assert_eq!(seat.frozen_time, 0);

    let resit = f.engine.sit(&u1, 1, 0).await.unwrap();
    assert!(resit.applied);
}

/// A forced kick freezes the user out for roughly five minutes.
#[tokio::test]
async fn test_forced_kick_applies_freeze_window() {
    let f = fixture(LayoutOverrides::default());
    f.store
        .upsert_room_master(room("r", "lolm", "X;X;X;X;X", 5, 1))
        .await
        .unwrap();
    let u1 = actor("r", "u1");

    f.engine.sit(&u1, 1, 0).await.unwrap();
    f.engine.stand(&u1, true).await.unwrap();

    match f.engine.sit(&u1, 1, 0).await.unwrap_err() {
        RoomError::Transition(TransitionError::Frozen { seconds_left, .. }) => {
            assert!(
                (295..=300).contains(&seconds_left),
                "freeze window should be about 300s, got {seconds_left}"
            );
        }
        other => panic!("expected Frozen, got {other:?}"),
    }
}

/// The fifth ready in a five-seat room completes the set and the emitted
/// event says so; earlier readies do not.
#[tokio::test]
async fn test_ready_completion_matches_capacity() {
    let f = fixture(LayoutOverrides::default());
    f.store
        .upsert_room_master(room("r", "lolm", "X;X;X;X;X", 5, 1))
        .await
        .unwrap();

    for (i, uid) in ["u1", "u2", "u3", "u4"].iter().enumerate() {
        f.engine.sit(&actor("r", uid), i + 1, 0).await.unwrap();
    }
    for uid in ["u1", "u2", "u3"] {
        assert!(!f.engine.ready(&actor("r", uid)).await.unwrap().all_ready);
    }
    let last = f.engine.ready(&actor("r", "u4")).await.unwrap();
    assert!(last.all_ready);
    assert_eq!(last.room.in_game_queue_be_ready_user_cnt, 5);

    let messages = f.producer.messages(ROOM_EVENTS).await;
    let envelope: RoomEventEnvelope =
        serde_json::from_str(&messages.last().unwrap().payload).unwrap();
    assert_eq!(envelope.event_type, RoomEventKind::InQueueBeReady);
    assert_eq!(envelope.body().unwrap().queue_is_ready, Some(true));
}

/// Repeating a transition changes nothing: no counter delta, no event.
#[tokio::test]
async fn test_transition_idempotence() {
    let f = fixture(LayoutOverrides::default());
    f.store
        .upsert_room_master(room("r", "lolm", "X;X;X;X;X", 5, 1))
        .await
        .unwrap();
    let u1 = actor("r", "u1");

    f.engine.enter_room(&u1).await.unwrap();
    f.engine.enter_room(&u1).await.unwrap();
    f.engine.sit(&u1, 1, 0).await.unwrap();
    f.engine.sit(&u1, 1, 0).await.unwrap();
    f.engine.start_battle(&u1).await.unwrap();
    f.engine.start_battle(&u1).await.unwrap();

    let room = f.store.get_room("r").await.unwrap().unwrap();
    assert_eq!(room.online_user_cnt, 2);
    assert_eq!(room.in_game_queue_user_cnt, 2);
    assert_eq!(room.in_game_battle_user_cnt, 2);

    assert_eq!(
        event_kinds(&f.producer).await,
        vec![
            RoomEventKind::EnterRoom,
            RoomEventKind::EnterQueue,
            RoomEventKind::Start3rdPartyGame,
        ]
    );
}

/// Battle membership implies queue membership, and readiness implies a seat,
/// throughout a full session.
#[tokio::test]
async fn test_state_implications_hold() {
    let f = fixture(LayoutOverrides::default());
    f.store
        .upsert_room_master(room("r", "lolm", "X;X;X;X;X", 5, 1))
        .await
        .unwrap();
    let u1 = actor("r", "u1");

    f.engine.enter_room(&u1).await.unwrap();
    f.engine.sit(&u1, 1, 0).await.unwrap();
    f.engine.ready(&u1).await.unwrap();
    f.engine.start_battle(&u1).await.unwrap();

    // In battle: the seat and readiness are pinned.
    assert!(matches!(
        f.engine.stand(&u1, false).await.unwrap_err(),
        RoomError::Transition(TransitionError::InBattle { .. })
    ));
    assert!(matches!(
        f.engine.unready(&u1).await.unwrap_err(),
        RoomError::Transition(TransitionError::InBattle { .. })
    ));

    f.engine.end_battle(&u1).await.unwrap();
    f.engine.stand(&u1, false).await.unwrap();

    // Readiness fell with the seat; a bare ready without a seat is refused.
    let recon = f.store.recount_room_counters("r").await.unwrap();
    assert!(recon.is_consistent());
    assert!(matches!(
        f.engine.ready(&u1).await.unwrap_err(),
        RoomError::Transition(TransitionError::NotSeated { .. })
    ));
}

/// Counters stay reconcilable with per-user truth across a busy session.
#[tokio::test]
async fn test_counters_never_drift() {
    let f = fixture(LayoutOverrides::default());
    f.store
        .upsert_room_master(room("r", "lolm", "X,X;X,X;X,X", 5, 1))
        .await
        .unwrap();

    for (i, uid) in ["u1", "u2", "u3", "u4"].iter().enumerate() {
        let a = actor("r", uid);
        f.engine.enter_room(&a).await.unwrap();
        f.engine.sit(&a, i / 2, i % 2).await.unwrap();
        f.engine.ready(&a).await.unwrap();
    }
    f.engine.unready(&actor("r", "u2")).await.unwrap();
    f.engine.stand(&actor("r", "u2"), false).await.unwrap();
    f.engine.leave_room(&actor("r", "u3")).await.unwrap();
    f.engine.start_battle(&actor("r", "u1")).await.unwrap();

    let recon = f.store.recount_room_counters("r").await.unwrap();
    assert!(recon.is_consistent(), "drifted: {recon:?}");

    let room = f.store.get_room("r").await.unwrap().unwrap();
    assert_eq!(room.online_user_cnt, 4); // baseline + u1, u2, u4
    assert_eq!(room.in_game_queue_user_cnt, 3); // baseline + u1, u4
    assert_eq!(room.in_game_queue_be_ready_user_cnt, 3);
    assert_eq!(room.in_game_battle_user_cnt, 2);
}
