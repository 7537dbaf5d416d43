//! Seat-grid geometry and AI pre-fill strategies.
//!
//! `queue_symbol` encodes the grid shape (`"X,X;X,X"`: rows split by `;`,
//! cells by `,`). Which cells the room's AIs pre-occupy depends on the game;
//! operator-hosted rooms can override the choice per room id.

use crate::store::{InstalledRoom, SeatedUser};
use crate::room::view::{QueueOccupant, SeatGrid};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Parsed queue grid shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueLayout {
    pub rows: usize,
    pub cols: usize,
}

impl QueueLayout {
    pub fn parse(queue_symbol: &str) -> Self {
        let rows: Vec<&str> = queue_symbol.split(';').collect();
        let cols = rows.first().map_or(0, |r| r.split(',').count());
        Self {
            rows: rows.len(),
            cols,
        }
    }

    pub fn contains(&self, x: usize, y: usize) -> bool {
        x < self.rows && y < self.cols
    }
}

/// Where the room's AIs sit before any human arrives.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SeatPrefill {
    /// Master at `(0,0)` only. Fallback for every game.
    MasterOnly,
    /// Master at `(0,0)`, first slave at `(0,1)` (two-column shapes).
    SlaveRight,
    /// Master at `(0,0)`, first slave at `(1,0)` (hosted single-column rooms).
    SlaveBelow,
}

/// Per-room pre-fill overrides, loaded from configuration rather than coded
/// into the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LayoutOverrides(pub HashMap<String, SeatPrefill>);

impl LayoutOverrides {
    /// Strategy for a room: the per-room override wins, then the game rules.
    pub fn prefill_for(&self, game_index: &str, room_id: &str) -> SeatPrefill {
        if let Some(prefill) = self.0.get(room_id) {
            return *prefill;
        }
        match game_index {
            "wuhu" => SeatPrefill::SlaveRight,
            _ => SeatPrefill::MasterOnly,
        }
    }
}

fn ai_occupant(user_id: &str, nickname: &str, avatar: &str) -> QueueOccupant {
    QueueOccupant {
        user_id: user_id.to_string(),
        user_nickname: nickname.to_string(),
        user_avatar: avatar.to_string(),
        is_ai: true,
        is_be_ready: true,
    }
}

/// Materialize the seat grid: AIs at their pre-fill cells, seated humans at
/// their stored coordinates. Out-of-grid records are dropped rather than
/// letting one bad row distort the whole response.
pub fn build_seat_grid(
    room: &InstalledRoom,
    seated: &[SeatedUser],
    prefill: SeatPrefill,
) -> SeatGrid {
    let layout = QueueLayout::parse(&room.queue_symbol);
    let mut grid: SeatGrid = vec![vec![None; layout.cols]; layout.rows];

    if layout.contains(0, 0) {
        grid[0][0] = Some(ai_occupant(
            &room.owner_id,
            &room.owner_nickname,
            &room.owner_avatar,
        ));
    }
    let slave_cell = match prefill {
        SeatPrefill::MasterOnly => None,
        SeatPrefill::SlaveRight => Some((0, 1)),
        SeatPrefill::SlaveBelow => Some((1, 0)),
    };
    if let (Some((x, y)), Some(assistant)) = (slave_cell, room.assistants.first()) {
        if layout.contains(x, y) {
            grid[x][y] = Some(ai_occupant(
                &assistant.assistant_id,
                &assistant.assistant_nickname,
                &assistant.assistant_avatar,
            ));
        }
    }

    for user in seated {
        let (x, y) = (user.at_game_queue_x_coord, user.at_game_queue_y_coord);
        if layout.contains(x, y) {
            grid[x][y] = Some(QueueOccupant {
                user_id: user.user_id.clone(),
                user_nickname: user.user_nickname.clone(),
                user_avatar: user.user_avatar.clone(),
                is_ai: false,
                is_be_ready: user.is_be_ready,
            });
        }
    }

    grid
}
