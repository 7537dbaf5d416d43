//! Event bus topic names.

use super::defaults::{default_result_topic, default_room_event_topic};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventTopicsConfig {
    /// Topic carrying game-result events.
    #[serde(default = "default_result_topic")]
    pub result_topic: String,
    /// Topic carrying room lifecycle events.
    #[serde(default = "default_room_event_topic")]
    pub room_event_topic: String,
}

impl Default for EventTopicsConfig {
    fn default() -> Self {
        Self {
            result_topic: default_result_topic(),
            room_event_topic: default_room_event_topic(),
        }
    }
}
