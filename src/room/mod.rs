//! Room lifecycle engine and its satellites.
//!
//! The engine drives every per-room state transition through a room-scoped
//! distributed lock and a transactional store write, then publishes the
//! matching room event while still holding the lock so event order follows
//! commit order per room.

pub mod bootstrap;
pub mod engine;
pub mod layout;
pub mod verifier;
pub mod view;

pub use bootstrap::{bootstrap, BusinessConf};
pub use engine::{RoomEngine, RoomError};
pub use layout::{LayoutOverrides, QueueLayout, SeatPrefill};
pub use verifier::CounterVerifier;
pub use view::{QueueOccupant, RoomDetail, RoomSummary, SeatGrid};
