//! Game simulation modules

pub mod board;
pub mod piece;
pub mod room;
pub mod session;
pub mod snapshot;

pub use room::{GameRoom, RoomHandle, RoomSettings, RoomStatus};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Connection-scoped player identifier
pub type PlayerId = Uuid;

/// Room identifier
pub type RoomId = Uuid;

/// Horizontal or downward move request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveDirection {
    Left,
    Down,
    Right,
}

/// A single player action as it arrives from a client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerAction {
    Move(MoveDirection),
    Rotate,
    Drop,
    Hold,
}

/// Input buffered for a player until the next tick consumes it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingAction {
    pub direction: Option<MoveDirection>,
    pub rotate: bool,
    pub drop: bool,
    pub hold: bool,
}

impl PendingAction {
    /// Fold an incoming action into the buffer.
    /// A later move replaces an earlier unconsumed one; the rest are one-shot flags.
    pub fn record(&mut self, action: PlayerAction) {
        match action {
            PlayerAction::Move(direction) => self.direction = Some(direction),
            PlayerAction::Rotate => self.rotate = true,
            PlayerAction::Drop => self.drop = true,
            PlayerAction::Hold => self.hold = true,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
