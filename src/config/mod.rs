//! Configuration module for the companion gateway.
//!
//! Layered loading with sensible defaults:
//! - JSON configuration files
//! - Environment variable overrides (nested `COMPANION__*` plus the flat
//!   deployment names the platform has always used, e.g. `DEPLOY_ENV`)
//!
//! # Module Structure
//!
//! - [`types`]: Root `Config` struct
//! - [`server`]: HTTP surface and app-version gate
//! - [`identity`]: Token and SMS settings
//! - [`room`]: Room engine timeouts and lock settings
//! - [`events`]: Event bus topic names
//! - [`logging`]: Logging configuration
//! - [`loader`]: Configuration loading functions
//! - [`defaults`]: Default value functions

pub mod defaults;
pub mod events;
pub mod identity;
pub mod loader;
pub mod logging;
pub mod room;
pub mod server;
pub mod types;

pub use events::EventTopicsConfig;
pub use identity::IdentityConfig;
pub use loader::load;
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use room::{LockConfig, RoomTimingConfig};
pub use server::ServerConfig;
pub use types::Config;
