//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::game::piece::{Position, TetrominoType};
use crate::game::{MoveDirection, PlayerId, RoomId, RoomStatus};

/// How a player wants to be matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinMode {
    /// Private room, started immediately
    Solo,
    /// Shared room for up to two players, started explicitly
    Multi,
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Find or create a room
    JoinRoom { player_id: PlayerId, mode: JoinMode },

    /// Leave a room
    LeaveRoom {
        room_id: RoomId,
        player_id: PlayerId,
    },

    /// Start a multi room waiting in the lobby
    StartGame { room_id: RoomId },

    MoveTetromino {
        player_id: PlayerId,
        direction: MoveDirection,
    },

    RotateTetromino { player_id: PlayerId },

    /// Hard drop
    DropTetromino { player_id: PlayerId },

    /// Hold, or swap with the held piece
    SwapTetromino { player_id: PlayerId },

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },
}

impl ClientMsg {
    /// The player a message claims to act for, if it names one
    pub fn player_id(&self) -> Option<PlayerId> {
        match self {
            ClientMsg::JoinRoom { player_id, .. }
            | ClientMsg::LeaveRoom { player_id, .. }
            | ClientMsg::MoveTetromino { player_id, .. }
            | ClientMsg::RotateTetromino { player_id }
            | ClientMsg::DropTetromino { player_id }
            | ClientMsg::SwapTetromino { player_id } => Some(*player_id),
            ClientMsg::StartGame { .. } | ClientMsg::Ping { .. } => None,
        }
    }
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection; `player_id` must be echoed back
    Welcome { player_id: PlayerId, server_time: u64 },

    /// Reply to `join_room`
    JoinRoomAck {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<RoomSnapshot>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    /// Reply to `leave_room`
    LeaveRoomAck {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    /// Full room state, sent every tick while playing
    GameStateUpdate(RoomSnapshot),

    /// Sent once, right before the room stops
    GameWinner { room_id: RoomId, player_id: PlayerId },

    /// A member left the room
    LeaveRoom { player_id: PlayerId },

    /// Error message
    Error { code: String, message: String },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}

/// Aggregated state of every player in a room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub room_id: RoomId,
    pub status: RoomStatus,
    pub players: BTreeMap<PlayerId, PlayerSnapshot>,
}

/// One player's board and piece state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    /// Rows top to bottom, 1 = filled
    pub board: Vec<Vec<u8>>,
    pub held_type: Option<TetrominoType>,
    pub active_piece: Option<ActivePieceSnapshot>,
    pub queue: Vec<TetrominoType>,
    pub is_game_over: bool,
    pub lines_cleared: u32,
}

/// The falling piece as the client draws it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivePieceSnapshot {
    #[serde(rename = "type")]
    pub kind: TetrominoType,
    /// Degrees clockwise: 0, 90, 180 or 270
    pub rotation: u16,
    /// Cell offsets relative to `position`
    pub shape: Vec<[i32; 2]>,
    pub position: Position,
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn client_messages_use_snake_case_tags() {
        let player_id = Uuid::new_v4();
        let raw = format!(
            r#"{{"type":"move_tetromino","player_id":"{player_id}","direction":"left"}}"#
        );

        match serde_json::from_str::<ClientMsg>(&raw).expect("valid move message") {
            ClientMsg::MoveTetromino {
                player_id: id,
                direction,
            } => {
                assert_eq!(id, player_id);
                assert_eq!(direction, MoveDirection::Left);
            }
            other => panic!("unexpected message: {other:?}"),
        }

        let join = format!(r#"{{"type":"join_room","player_id":"{player_id}","mode":"multi"}}"#);
        let msg: ClientMsg = serde_json::from_str(&join).expect("valid join message");
        assert_eq!(msg.player_id(), Some(player_id));
    }

    #[test]
    fn unknown_direction_is_rejected() {
        let raw = format!(
            r#"{{"type":"move_tetromino","player_id":"{}","direction":"up"}}"#,
            Uuid::new_v4()
        );
        assert!(serde_json::from_str::<ClientMsg>(&raw).is_err());
    }

    #[test]
    fn failed_leave_ack_carries_reason() {
        let msg = ServerMsg::LeaveRoomAck {
            success: false,
            reason: Some("The room does not exist".to_string()),
        };
        let json = serde_json::to_value(&msg).expect("serializable");

        assert_eq!(json["type"], "leave_room_ack");
        assert_eq!(json["success"], false);
        assert_eq!(json["reason"], "The room does not exist");
    }

    #[test]
    fn state_update_inlines_the_snapshot() {
        let room_id = Uuid::new_v4();
        let msg = ServerMsg::GameStateUpdate(RoomSnapshot {
            room_id,
            status: RoomStatus::Playing,
            players: BTreeMap::new(),
        });
        let json = serde_json::to_value(&msg).expect("serializable");

        assert_eq!(json["type"], "game_state_update");
        assert_eq!(json["room_id"], room_id.to_string());
        assert_eq!(json["status"], "playing");
    }
}
