//! Snapshot building for network transmission

use std::collections::BTreeMap;

use crate::ws::protocol::{ActivePieceSnapshot, PlayerSnapshot, RoomSnapshot, ServerMsg};

use super::board::BlockState;
use super::piece::ActivePiece;
use super::session::PlayerSession;
use super::{RoomId, RoomStatus};

/// Build the aggregated room state from its sessions
pub fn room_snapshot<'a>(
    room_id: RoomId,
    status: RoomStatus,
    sessions: impl IntoIterator<Item = &'a PlayerSession>,
) -> RoomSnapshot {
    let players: BTreeMap<_, _> = sessions
        .into_iter()
        .map(|session| (session.id(), player_snapshot(session)))
        .collect();

    RoomSnapshot {
        room_id,
        status,
        players,
    }
}

/// Wrap a room snapshot as the per-tick broadcast
pub fn state_update<'a>(
    room_id: RoomId,
    status: RoomStatus,
    sessions: impl IntoIterator<Item = &'a PlayerSession>,
) -> ServerMsg {
    ServerMsg::GameStateUpdate(room_snapshot(room_id, status, sessions))
}

pub fn player_snapshot(session: &PlayerSession) -> PlayerSnapshot {
    let board = session
        .board()
        .rows()
        .map(|row| {
            row.iter()
                .map(|cell| u8::from(*cell == BlockState::Filled))
                .collect()
        })
        .collect();

    PlayerSnapshot {
        board,
        held_type: session.held(),
        active_piece: session.active_piece().map(piece_snapshot),
        queue: session.queue().collect(),
        is_game_over: session.is_game_over(),
        lines_cleared: session.lines_cleared(),
    }
}

fn piece_snapshot(piece: &ActivePiece) -> ActivePieceSnapshot {
    ActivePieceSnapshot {
        kind: piece.kind(),
        rotation: piece.rotation().degrees(),
        shape: piece.shape().iter().map(|&(x, y)| [x, y]).collect(),
        position: piece.position(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::board::{BOARD_COLS, BOARD_ROWS};
    use crate::game::session::tests::session;
    use crate::game::session::QUEUE_LEN;
    use crate::game::PendingAction;
    use std::time::Duration;
    use uuid::Uuid;

    #[test]
    fn player_snapshot_mirrors_session() {
        let mut s = session(11);
        s.update(Duration::from_millis(16), &PendingAction::default());

        let snap = player_snapshot(&s);

        assert_eq!(snap.board.len(), BOARD_ROWS);
        assert!(snap.board.iter().all(|row| row.len() == BOARD_COLS));
        assert!(snap.board.iter().flatten().all(|c| *c == 0));
        assert_eq!(snap.queue.len(), QUEUE_LEN);
        assert_eq!(snap.held_type, None);
        assert!(!snap.is_game_over);

        let piece = snap.active_piece.expect("piece spawned on first update");
        assert_eq!(piece.shape.len(), 4);
        assert_eq!(piece.rotation, 0);
    }

    #[test]
    fn room_snapshot_keys_players_by_id() {
        let a = session(1);
        let b = session(2);
        let room_id = Uuid::new_v4();

        let snap = room_snapshot(room_id, RoomStatus::Lobby, [&a, &b]);

        assert_eq!(snap.room_id, room_id);
        assert_eq!(snap.status, RoomStatus::Lobby);
        assert!(snap.players.contains_key(&a.id()));
        assert!(snap.players.contains_key(&b.id()));
        // No piece before the first tick
        assert!(snap.players.values().all(|p| p.active_piece.is_none()));
    }
}
