//! Typed room/result events and the bus producer.
//!
//! Room events are wrapped in an envelope carrying the serialized body, a
//! trace id, and the publish timestamp, then keyed by the caller (typically
//! `room_id` or `order_id`) so all events for one room or result land on one
//! partition. Sends are synchronous with a bounded confirmation timeout;
//! failures are logged and alarmed but never surfaced to the transition that
//! produced them — downstream dedupes on `trace_id`.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;

/// Confirmation window for a single publish.
pub const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Fresh correlation id carried from a transition into its emitted event.
pub fn new_trace_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Room lifecycle event types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomEventKind {
    EnterRoom,
    LeaveRoom,
    EnterQueue,
    LeaveQueue,
    InQueueBeReady,
    InQueueNotBeReady,
    Start3rdPartyGame,
    End3rdPartyGame,
}

/// Body shared by every room event. The three trailing booleans are only
/// present on the event types that define them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RoomEventBody {
    pub room_id: String,
    pub game_index: String,
    pub be_hosting: bool,
    pub uid: String,
    pub nickname: String,
    pub avatar: String,
    pub owner_id: String,
    pub owner_nickname: String,
    pub owner_avatar: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_is_full: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_is_ready: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_is_in_game_battle: Option<bool>,
}

/// Envelope published on the room-event topic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomEventEnvelope {
    pub event_type: RoomEventKind,
    /// Serialized [`RoomEventBody`].
    pub event_body: String,
    pub trace_id: String,
    pub timestamp_ms: i64,
}

impl RoomEventEnvelope {
    pub fn wrap(kind: RoomEventKind, body: &RoomEventBody, trace_id: String) -> Result<Self> {
        Ok(Self {
            event_type: kind,
            event_body: serde_json::to_string(body)?,
            trace_id,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
        })
    }

    pub fn body(&self) -> Result<RoomEventBody> {
        Ok(serde_json::from_str(&self.event_body)?)
    }
}

/// Event published on the result topic after a game-result callback.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameResultEvent {
    pub trace_id: String,
    pub status_code: i32,
    pub app_user_id: String,
    pub app_user_nickname: String,
    pub app_user_avatar: String,
    pub app_ai_player_id: String,
    pub app_ai_player_nickname: String,
    pub app_ai_player_avatar: String,
    pub app_room_id: String,
    pub app_game_index: String,
    pub game_region: String,
    pub game_uid: String,
    pub game_bid: String,
    pub order_id: String,
    pub result_type: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_game_idx: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_win: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_screenshots: Option<Vec<String>>,
    pub receive_time_ms: i64,
}

/// Producer over the two event streams. `topic = None` selects the
/// configured default for the stream.
#[async_trait]
pub trait EventProducer: Send + Sync {
    async fn send_room_event(
        &self,
        topic: Option<&str>,
        key: &str,
        envelope: &RoomEventEnvelope,
    ) -> Result<()>;

    async fn send_game_result(
        &self,
        topic: Option<&str>,
        key: &str,
        event: &GameResultEvent,
    ) -> Result<()>;
}

/// A message retained by the in-memory producer.
#[derive(Debug, Clone)]
pub struct ProducedMessage {
    pub key: String,
    pub payload: String,
}

/// In-memory producer retaining every publish per topic. Backs tests and
/// single-process deployments where downstream consumers poll the gateway.
pub struct InMemoryProducer {
    default_result_topic: String,
    default_room_event_topic: String,
    topics: Mutex<HashMap<String, Vec<ProducedMessage>>>,
}

impl InMemoryProducer {
    pub fn new(default_result_topic: String, default_room_event_topic: String) -> Self {
        Self {
            default_result_topic,
            default_room_event_topic,
            topics: Mutex::new(HashMap::new()),
        }
    }

    /// Messages published to a topic so far.
    pub async fn messages(&self, topic: &str) -> Vec<ProducedMessage> {
        let topics = self.topics.lock().await;
        topics.get(topic).cloned().unwrap_or_default()
    }

    async fn append(&self, topic: &str, key: &str, payload: String) {
        let mut topics = self.topics.lock().await;
        topics.entry(topic.to_string()).or_default().push(ProducedMessage {
            key: key.to_string(),
            payload,
        });
    }
}

#[async_trait]
impl EventProducer for InMemoryProducer {
    async fn send_room_event(
        &self,
        topic: Option<&str>,
        key: &str,
        envelope: &RoomEventEnvelope,
    ) -> Result<()> {
        let topic = topic.unwrap_or(&self.default_room_event_topic);
        let payload = serde_json::to_string(envelope)?;
        tokio::time::timeout(SEND_TIMEOUT, self.append(topic, key, payload))
            .await
            .map_err(|_| anyhow::anyhow!("room event publish timed out after {SEND_TIMEOUT:?}"))?;
        Ok(())
    }

    async fn send_game_result(
        &self,
        topic: Option<&str>,
        key: &str,
        event: &GameResultEvent,
    ) -> Result<()> {
        let topic = topic.unwrap_or(&self.default_result_topic);
        let payload = serde_json::to_string(event)?;
        tokio::time::timeout(SEND_TIMEOUT, self.append(topic, key, payload))
            .await
            .map_err(|_| anyhow::anyhow!("game result publish timed out after {SEND_TIMEOUT:?}"))?;
        Ok(())
    }
}
