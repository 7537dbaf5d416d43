//! Game-result ingestion.
//!
//! Pipeline for a callback from the external game server: validate, persist
//! the raw result (idempotent on `(app_uid, create_ts)`), fold the outcome
//! into the user's aggregates under the storage retry profile, publish the
//! result event keyed by `order_id`. A publish failure is alarmed but never
//! surfaced: the persisted result is authoritative and downstream reconciles.

use crate::events::{EventProducer, GameResultEvent};
use crate::protocol::GameResultCallback;
use crate::retry::retry_storage_operation;
use crate::store::types::unix_ts;
use crate::store::{GameResultRecord, GatewayStore, PersonalGameStats};
use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info, warn};

pub struct GameResultIngestor {
    store: Arc<dyn GatewayStore>,
    producer: Arc<dyn EventProducer>,
}

impl GameResultIngestor {
    pub fn new(store: Arc<dyn GatewayStore>, producer: Arc<dyn EventProducer>) -> Self {
        Self { store, producer }
    }

    pub async fn ingest(&self, callback: GameResultCallback) -> Result<()> {
        let receive_time_ms = chrono::Utc::now().timestamp_millis();
        let record = record_from_callback(&callback);

        let inserted = self.store.insert_game_result(record).await?;
        if !inserted {
            // Redelivery of a result we already hold.
            info!(
                app_uid = %callback.app_uid,
                order_id = %callback.order_id,
                "duplicate game result dropped"
            );
            return Ok(());
        }

        if callback.err_code == 0 {
            let won = callback.result.as_ref().is_some_and(|r| r.win);
            let uid = callback.app_uid.clone();
            let store = self.store.clone();
            retry_storage_operation("update_personal_stats", || {
                let store = store.clone();
                let uid = uid.clone();
                async move { fold_into_stats(store.as_ref(), &uid, won).await }
            })
            .await?;
        } else {
            warn!(
                app_uid = %callback.app_uid,
                order_id = %callback.order_id,
                err_code = callback.err_code,
                "game result reported a failed battle"
            );
        }

        let event = event_from_callback(&callback, receive_time_ms);
        if let Err(err) = self
            .producer
            .send_game_result(None, &callback.order_id, &event)
            .await
        {
            error!(
                alarm = true,
                order_id = %callback.order_id,
                error = %err,
                "failed to publish game result event"
            );
        }
        Ok(())
    }
}

async fn fold_into_stats(store: &dyn GatewayStore, uid: &str, won: bool) -> Result<()> {
    let mut stats = store
        .personal_stats(uid)
        .await?
        .unwrap_or_else(|| PersonalGameStats {
            uid: uid.to_string(),
            play_cnt: 0,
            winning_play_cnt: 0,
            win_rate: 0.0,
            update_ts: 0,
        });
    stats.play_cnt += 1;
    if won {
        stats.winning_play_cnt += 1;
    }
    stats.win_rate = stats.winning_play_cnt as f64 / stats.play_cnt as f64;
    stats.update_ts = unix_ts();
    store.upsert_personal_stats(stats).await
}

fn record_from_callback(callback: &GameResultCallback) -> GameResultRecord {
    GameResultRecord {
        trace_id: callback.request_id.clone(),
        status_code: callback.err_code,
        app_uid: callback.app_uid.clone(),
        app_user_nickname: callback.app_user_nickname.clone(),
        app_user_avatar: callback.app_user_avatar.clone(),
        app_aid: callback.app_aid.clone(),
        app_ai_player_nickname: callback.app_ai_player_nickname.clone(),
        app_ai_player_avatar: callback.app_ai_player_avatar.clone(),
        app_room_id: callback.app_room_id.clone(),
        app_game_index: callback.app_game_index.clone(),
        game_region: callback.game_region.clone(),
        game_uid: callback.game_uid.clone(),
        game_bid: callback.bot_id.clone(),
        order_id: callback.order_id.clone(),
        result_type: callback.result_type,
        result_game_idx: callback.result.as_ref().map(|r| r.game_idx),
        result_win: callback.result.as_ref().map(|r| r.win),
        result_screenshots: callback.result.as_ref().map(|r| r.screenshots.clone()),
        create_ts: unix_ts(),
    }
}

fn event_from_callback(callback: &GameResultCallback, receive_time_ms: i64) -> GameResultEvent {
    // A failed battle publishes identifiers only; outcome fields are left
    // out so consumers cannot mistake them for a played game.
    let succeeded = callback.err_code == 0;
    GameResultEvent {
        trace_id: callback.request_id.clone(),
        status_code: callback.err_code,
        app_user_id: callback.app_uid.clone(),
        app_user_nickname: callback.app_user_nickname.clone(),
        app_user_avatar: callback.app_user_avatar.clone(),
        app_ai_player_id: callback.app_aid.clone(),
        app_ai_player_nickname: callback.app_ai_player_nickname.clone(),
        app_ai_player_avatar: callback.app_ai_player_avatar.clone(),
        app_room_id: callback.app_room_id.clone(),
        app_game_index: callback.app_game_index.clone(),
        game_region: callback.game_region.clone(),
        game_uid: callback.game_uid.clone(),
        game_bid: callback.bot_id.clone(),
        order_id: callback.order_id.clone(),
        result_type: callback.result_type,
        result_game_idx: if succeeded {
            Some(callback.result.as_ref().map_or(-1, |r| r.game_idx))
        } else {
            None
        },
        result_win: if succeeded {
            Some(callback.result.as_ref().is_some_and(|r| r.win))
        } else {
            None
        },
        result_screenshots: if succeeded {
            Some(
                callback
                    .result
                    .as_ref()
                    .map_or_else(Vec::new, |r| r.screenshots.clone()),
            )
        } else {
            None
        },
        receive_time_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::InMemoryProducer;
    use crate::protocol::GameResultOutcome;
    use crate::store::InMemoryStore;

    fn callback(order_id: &str, win: bool) -> GameResultCallback {
        GameResultCallback {
            request_id: format!("req-{order_id}"),
            err_code: 0,
            app_uid: "User_1".to_string(),
            app_user_nickname: "player".to_string(),
            app_user_avatar: String::new(),
            app_aid: "ai_1".to_string(),
            app_ai_player_nickname: "Master".to_string(),
            app_ai_player_avatar: String::new(),
            app_room_id: "room_1".to_string(),
            app_game_index: "lolm".to_string(),
            game_region: "cn-east".to_string(),
            game_uid: "g-17".to_string(),
            bot_id: "bot-3".to_string(),
            order_id: order_id.to_string(),
            result_type: 1,
            result: Some(GameResultOutcome {
                game_idx: 2,
                win,
                screenshots: vec!["s1.png".to_string()],
            }),
        }
    }

    fn ingestor() -> (GameResultIngestor, Arc<InMemoryStore>, Arc<InMemoryProducer>) {
        let store = Arc::new(InMemoryStore::new());
        let producer = Arc::new(InMemoryProducer::new(
            "results".to_string(),
            "room-events".to_string(),
        ));
        (
            GameResultIngestor::new(store.clone(), producer.clone()),
            store,
            producer,
        )
    }

    #[tokio::test]
    async fn test_ingest_updates_stats_and_publishes() {
        let (ingestor, store, producer) = ingestor();
        ingestor.ingest(callback("o-1", true)).await.unwrap();

        let stats = store.personal_stats("User_1").await.unwrap().unwrap();
        assert_eq!(stats.play_cnt, 1);
        assert_eq!(stats.winning_play_cnt, 1);
        assert!((stats.win_rate - 1.0).abs() < f64::EPSILON);

        let messages = producer.messages("results").await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].key, "o-1");
        let event: GameResultEvent = serde_json::from_str(&messages[0].payload).unwrap();
        assert_eq!(event.result_win, Some(true));
        assert_eq!(event.trace_id, "req-o-1");
    }

    #[tokio::test]
    async fn test_win_rate_accumulates() {
        let (ingestor, store, _) = ingestor();
        ingestor.ingest(callback("o-1", true)).await.unwrap();
        // Distinct create_ts second is not guaranteed, so wait past it.
        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        ingestor.ingest(callback("o-2", false)).await.unwrap();

        let stats = store.personal_stats("User_1").await.unwrap().unwrap();
        assert_eq!(stats.play_cnt, 2);
        assert_eq!(stats.winning_play_cnt, 1);
        assert!((stats.win_rate - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_duplicate_delivery_counted_once() {
        let (ingestor, store, producer) = ingestor();
        // Same uid and same second: the raw-store uniqueness drops the second
        // delivery before stats or events happen.
        ingestor.ingest(callback("o-1", true)).await.unwrap();
        ingestor.ingest(callback("o-1", true)).await.unwrap();

        let stats = store.personal_stats("User_1").await.unwrap().unwrap();
        assert_eq!(stats.play_cnt, 1);
        assert_eq!(producer.messages("results").await.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_battle_skips_stats_but_publishes() {
        let (ingestor, store, producer) = ingestor();
        let mut cb = callback("o-1", false);
        cb.err_code = 503;
        cb.result = None;
        ingestor.ingest(cb).await.unwrap();

        assert!(store.personal_stats("User_1").await.unwrap().is_none());
        let messages = producer.messages("results").await;
        assert_eq!(messages.len(), 1);
        let event: GameResultEvent = serde_json::from_str(&messages[0].payload).unwrap();
        assert_eq!(event.status_code, 503);
        assert_eq!(event.result_win, None);
    }
}
