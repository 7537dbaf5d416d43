//! Root configuration types.

use super::defaults::default_port;
use super::events::EventTopicsConfig;
use super::identity::IdentityConfig;
use super::logging::LoggingConfig;
use super::room::RoomTimingConfig;
use super::server::ServerConfig;
use serde::{Deserialize, Serialize};

/// Root configuration struct for the companion gateway.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub room: RoomTimingConfig,
    #[serde(default)]
    pub events: EventTopicsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Path to the declarative business configuration (games, AI personas,
    /// room definitions) applied at startup. Bootstrap is skipped when unset.
    #[serde(default)]
    pub business_conf_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            server: ServerConfig::default(),
            identity: IdentityConfig::default(),
            room: RoomTimingConfig::default(),
            events: EventTopicsConfig::default(),
            logging: LoggingConfig::default(),
            business_conf_path: None,
        }
    }
}
