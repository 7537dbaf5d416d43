#![cfg_attr(not(test), deny(clippy::panic))]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::struct_excessive_bools,
    clippy::too_many_arguments,
    clippy::too_many_lines,
    clippy::similar_names
)]

//! # Companion Gateway
//!
//! API gateway for a multiplayer game-companion platform. Human users join
//! themed rooms hosted by AI personas, claim seats in a fixed-shape queue
//! grid, signal readiness, and transition together into a third-party game
//! battle whose result is ingested asynchronously and republished downstream.
//!
//! Every room is a small persistent state machine under contention: the room
//! lifecycle engine coordinates transitions through a room-scoped distributed
//! lock and a transactional document store, keeping four denormalized
//! counters consistent with per-user state at all times.

/// TTL key/value cache, counters, and daily token buckets
pub mod cache;

/// Server configuration and environment variables
pub mod config;

/// Typed room/result events and the bus producer
pub mod events;

/// SMS one-time codes, signed bearer tokens, device binding
pub mod identity;

/// Redlock-style distributed locking
pub mod lock;

/// Structured logging configuration
pub mod logging;

/// Wire envelope, API codes, and request/response types
pub mod protocol;

/// Game-result ingestion and personal stats
pub mod result;

/// Retry logic utilities
pub mod retry;

/// Room lifecycle engine: presence, seats, readiness, battles
pub mod room;

/// HTTP server orchestration
pub mod server;

/// Document store abstraction (in-memory implementation)
pub mod store;

/// Delayed kick tasks for stuck queue/battle users
pub mod timeouts;
