//! Contention tests: the room queue lock plus the transactional store must
//! serialize racing transitions without losing or double-counting any.

use companion_gateway::lock::{InMemoryLockNode, LockNode, Redlock};
use companion_gateway::events::InMemoryProducer;
use companion_gateway::room::{LayoutOverrides, RoomEngine, RoomError};
use companion_gateway::store::{
    GatewayStore, InMemoryStore, InstalledRoom, RoomActor, TransitionError,
};
use std::sync::Arc;
use tokio::sync::Barrier;

fn room(id: &str, symbol: &str, capacity: i64, ai_cnt: i64) -> InstalledRoom {
    InstalledRoom {
        id: id.to_string(),
        game_index: "lolm".to_string(),
        rule_title: String::new(),
        rule_content: String::new(),
        title: String::new(),
        cover: String::new(),
        announcement: String::new(),
        tags: vec![],
        owner_id: "ai_master".to_string(),
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

async fn engine_with(room_doc: InstalledRoom) -> (Arc<RoomEngine>, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    store.upsert_room_master(room_doc).await.unwrap();
    let nodes: Vec<Arc<dyn LockNode>> = vec![Arc::new(InMemoryLockNode::new())];
    let engine = Arc::new(RoomEngine::new(
        store.clone(),
        Arc::new(Redlock::new(nodes)),
        Arc::new(InMemoryProducer::new(
            "results".to_string(),
            "room-events".to_string(),
        )),
        "test".to_string(),
        2000,
        LayoutOverrides::default(),
    ));
    (engine, store)
}

#[tokio::test]
async fn test_parallel_sits_on_same_seat_admit_exactly_one() {
    let (engine, store) = engine_with(room("r", "X;X;X;X;X", 5, 1)).await;

    let contenders = 4;
    let barrier = Arc::new(Barrier::new(contenders));
    let mut handles = Vec::with_capacity(contenders);
    for i in 0..contenders {
        let engine = Arc::clone(&engine);
        let barrier = Arc::clone(&barrier);
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            engine.sit(&actor("r", &format!("u{i}")), 1, 0).await
        }));
    }

    let mut successes = 0;
    let mut occupied = 0;
    for handle in handles {
        match handle.await.expect("task should not panic") {
            Ok(shift) => {
                assert!(shift.applied);
                successes += 1;
            }
            Err(RoomError::Transition(TransitionError::SeatOccupied { .. })) => occupied += 1,
            Err(other) => panic!("unexpected rejection: {other:?}"),
        }
    }
    assert_eq!(successes, 1, "exactly one contender wins the seat");
    assert_eq!(occupied, contenders - 1);

    let room = store.get_room("r").await.unwrap().unwrap();
    assert_eq!(room.in_game_queue_user_cnt, 2);
    assert!(store
        .recount_room_counters("r")
        .await
        .unwrap()
        .is_consistent());
}

#[tokio::test]
async fn test_capacity_race_admits_exactly_capacity() {
    // Six distinct seats raced into a five-seat room with no AI baseline.
    let (engine, store) = engine_with(room("r", "X,X;X,X;X,X", 5, 0)).await;

    let contenders = 6;
    let barrier = Arc::new(Barrier::new(contenders));
    let mut handles = Vec::with_capacity(contenders);
    for i in 0..contenders {
        let engine = Arc::clone(&engine);
        let barrier = Arc::clone(&barrier);
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            engine
                .sit(&actor("r", &format!("u{i}")), i / 2, i % 2)
                .await
        }));
    }

    let mut successes = 0;
    let mut full = 0;
    let mut last_seat_flags = 0;
    for handle in handles {
        match handle.await.expect("task should not panic") {
            Ok(shift) => {
                successes += 1;
                if shift.queue_is_full {
                    last_seat_flags += 1;
                }
            }
            Err(RoomError::Transition(TransitionError::QueueFull { .. })) => full += 1,
            Err(other) => panic!("unexpected rejection: {other:?}"),
        }
    }
    assert_eq!(successes, 5);
    assert_eq!(full, 1);
    assert_eq!(last_seat_flags, 1, "exactly one sit claims the last seat");

    let room = store.get_room("r").await.unwrap().unwrap();
    assert_eq!(room.in_game_queue_user_cnt, 5);
}

#[tokio::test]
async fn test_parallel_readies_complete_exactly_once() {
    let (engine, _) = engine_with(room("r", "X;X;X;X;X", 5, 1)).await;

    for (i, uid) in ["u0", "u1", "u2", "u3"].iter().enumerate() {
        engine.sit(&actor("r", uid), i + 1, 0).await.unwrap();
    }

    let contenders = 4;
    let barrier = Arc::new(Barrier::new(contenders));
    let mut handles = Vec::with_capacity(contenders);
    for i in 0..contenders {
        let engine = Arc::clone(&engine);
        let barrier = Arc::clone(&barrier);
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            engine.ready(&actor("r", &format!("u{i}"))).await
        }));
    }

    let mut completions = 0;
    for handle in handles {
        let shift = handle
            .await
            .expect("task should not panic")
            .expect("ready should succeed");
        if shift.all_ready {
            completions += 1;
        }
    }
    assert_eq!(completions, 1, "only the set-completing ready reports it");
}

#[tokio::test]
async fn test_racing_duplicate_transitions_count_once() {
    let (engine, store) = engine_with(room("r", "X;X;X;X;X", 5, 1)).await;

    let contenders = 8;
    let barrier = Arc::new(Barrier::new(contenders));
    let mut handles = Vec::with_capacity(contenders);
    for _ in 0..contenders {
        let engine = Arc::clone(&engine);
        let barrier = Arc::clone(&barrier);
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            engine.enter_room(&actor("r", "u1")).await
        }));
    }
    for handle in handles {
        handle.await.expect("task should not panic").unwrap();
    }

    let room = store.get_room("r").await.unwrap().unwrap();
    assert_eq!(
        room.online_user_cnt, 2,
        "eight racing enters count the user once"
    );
}
