//! Per-player game state: board, active piece, hold slot and upcoming queue

use std::collections::VecDeque;
use std::time::Duration;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use super::board::Board;
use super::piece::{ActivePiece, TetrominoType};
use super::{PendingAction, PlayerId};

/// Number of upcoming pieces shown to the player
pub const QUEUE_LEN: usize = 5;

/// Authoritative state of one player inside a room
#[derive(Debug)]
pub struct PlayerSession {
    id: PlayerId,
    board: Board,
    active: Option<ActivePiece>,
    held: Option<TetrominoType>,
    queue: VecDeque<TetrominoType>,
    game_over: bool,
    can_hold: bool,
    lines_cleared: u32,
    rng: ChaCha8Rng,
}

impl PlayerSession {
    pub fn new(id: PlayerId, seed: u64, gravity_interval: Duration) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let queue = (0..QUEUE_LEN)
            .map(|_| TetrominoType::random(&mut rng))
            .collect();

        Self {
            id,
            board: Board::new(gravity_interval),
            active: None,
            held: None,
            queue,
            game_over: false,
            can_hold: true,
            lines_cleared: 0,
            rng,
        }
    }

    /// Run one tick with the action buffered since the previous one
    pub fn update(&mut self, dt: Duration, action: &PendingAction) {
        if self.game_over {
            return;
        }

        if action.hold && self.can_hold {
            self.hold();
        }

        self.spawn_if_needed();
        let piece = self
            .active
            .as_mut()
            .expect("a piece is always active after spawning");
        if self.board.collides(&piece.shape(), piece.position()) {
            debug!(player_id = %self.id, kind = ?piece.kind(), "Spawn blocked, game over");
            self.game_over = true;
            return;
        }
        let report = self.board.apply_tick(dt, piece, action);

        if report.locked {
            self.can_hold = true;
            self.lines_cleared += report.lines_cleared;
            if report.lines_cleared > 0 {
                debug!(player_id = %self.id, lines = report.lines_cleared, "Cleared lines");
            }
        }

        if self.board.is_overflowing() {
            debug!(player_id = %self.id, "Board overflowed, game over");
            self.game_over = true;
        }
    }

    /// Park the active piece in the hold slot, or swap it with the held one
    fn hold(&mut self) {
        self.spawn_if_needed();
        let Some(current) = self.active.as_ref().map(ActivePiece::kind) else {
            return;
        };

        match self.held.replace(current) {
            None => self.active = None,
            Some(held) => self.active = Some(ActivePiece::spawn(held)),
        }

        self.can_hold = false;
    }

    /// Take the next piece from the queue if the previous one is gone or placed
    fn spawn_if_needed(&mut self) {
        if !self.active.as_ref().map_or(true, ActivePiece::is_placed) {
            return;
        }

        let kind = self
            .queue
            .pop_front()
            .expect("piece queue is refilled on every spawn");
        self.queue.push_back(TetrominoType::random(&mut self.rng));
        assert_eq!(self.queue.len(), QUEUE_LEN);
        self.active = Some(ActivePiece::spawn(kind));
    }

    pub fn id(&self) -> PlayerId {
        self.id
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    /// The falling piece, if one exists and has not been locked yet
    pub fn active_piece(&self) -> Option<&ActivePiece> {
        self.active.as_ref().filter(|p| !p.is_placed())
    }

    pub fn held(&self) -> Option<TetrominoType> {
        self.held
    }

    pub fn queue(&self) -> impl ExactSizeIterator<Item = TetrominoType> + '_ {
        self.queue.iter().copied()
    }

    pub fn is_game_over(&self) -> bool {
        self.game_over
    }

    pub fn can_hold(&self) -> bool {
        self.can_hold
    }

    pub fn lines_cleared(&self) -> u32 {
        self.lines_cleared
    }

    #[cfg(test)]
    pub(crate) fn board_mut(&mut self) -> &mut Board {
        &mut self.board
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::game::board::{BlockState, BOARD_COLS, BOARD_ROWS, DEFAULT_GRAVITY_INTERVAL};
    use uuid::Uuid;

    const FRAME: Duration = Duration::from_millis(16);

    pub(crate) fn session(seed: u64) -> PlayerSession {
        PlayerSession::new(Uuid::new_v4(), seed, DEFAULT_GRAVITY_INTERVAL)
    }

    /// Stack the board up to row 2, leaving the last column open so nothing
    /// clears. The next one or two placed pieces reach the top row.
    pub(crate) fn bury(session: &mut PlayerSession) {
        for y in 2..BOARD_ROWS as i32 {
            for x in 0..BOARD_COLS as i32 - 1 {
                session.board_mut().set(x, y, BlockState::Filled);
            }
        }
    }

    /// Bury the board and hard drop until the session is over
    pub(crate) fn top_out(session: &mut PlayerSession) {
        bury(session);

        for _ in 0..10 {
            if session.is_game_over() {
                break;
            }
            session.update(FRAME, &hard_drop());
        }
        assert!(session.is_game_over());
    }

    fn hold() -> PendingAction {
        PendingAction {
            hold: true,
            ..PendingAction::default()
        }
    }

    fn hard_drop() -> PendingAction {
        PendingAction {
            drop: true,
            ..PendingAction::default()
        }
    }

    #[test]
    fn first_update_spawns_from_queue_front() {
        let mut s = session(1);
        let front = s.queue().next();

        s.update(FRAME, &PendingAction::default());

        assert_eq!(s.active_piece().map(ActivePiece::kind), front);
        assert_eq!(s.queue().len(), QUEUE_LEN);
    }

    #[test]
    fn queue_stays_full_across_many_spawns() {
        let mut s = session(2);
        for _ in 0..12 {
            s.update(FRAME, &hard_drop());
            assert_eq!(s.queue().len(), QUEUE_LEN);
            if s.is_game_over() {
                break;
            }
        }
    }

    #[test]
    fn first_hold_parks_piece_and_spawns_next() {
        let mut s = session(3);
        s.update(FRAME, &PendingAction::default());
        let first = s.active_piece().map(ActivePiece::kind);
        let next = s.queue().next();

        s.update(FRAME, &hold());

        assert_eq!(s.held(), first);
        assert_eq!(s.active_piece().map(ActivePiece::kind), next);
        assert!(!s.can_hold());
    }

    #[test]
    fn hold_is_locked_until_a_piece_is_placed() {
        let mut s = session(4);
        s.update(FRAME, &hold());
        let held = s.held();
        let active = s.active_piece().map(ActivePiece::kind);

        s.update(FRAME, &hold());

        assert_eq!(s.held(), held);
        assert_eq!(s.active_piece().map(ActivePiece::kind), active);
    }

    #[test]
    fn second_hold_after_placement_swaps_kinds() {
        let mut s = session(5);
        s.update(FRAME, &hold());
        let parked = s.held().expect("held after first hold");

        s.update(FRAME, &hard_drop());
        assert!(s.can_hold());

        // The next update spawns a fresh piece, then swaps it with the held one
        let upcoming = s.queue().next().expect("queue is never empty");
        s.update(FRAME, &hold());

        assert_eq!(s.held(), Some(upcoming));
        let swapped = s.active_piece().expect("swapped piece is active");
        assert_eq!(swapped.kind(), parked);
        assert_eq!(swapped.position(), crate::game::piece::SPAWN_POSITION);
    }

    #[test]
    fn hard_drop_places_piece_and_counts_lines() {
        let mut s = session(6);
        s.update(FRAME, &hard_drop());

        assert!(s.active_piece().is_none());
        assert_eq!(s.board().filled_count(), 4);
        assert_eq!(s.lines_cleared(), 0);
    }

    #[test]
    fn game_over_is_permanent() {
        let mut s = session(7);
        top_out(&mut s);

        for _ in 0..5 {
            s.update(FRAME, &hard_drop());
            s.update(FRAME, &PendingAction::default());
            assert!(s.is_game_over());
        }
    }

    #[test]
    fn blocked_spawn_ends_the_game() {
        let mut s = session(8);
        // Floating row left behind by a clear; the top row stays empty
        for x in 0..BOARD_COLS as i32 - 1 {
            s.board_mut().set(x, 1, BlockState::Filled);
        }

        s.update(FRAME, &hard_drop());

        assert!(s.is_game_over());
        assert!(!s.board().is_overflowing());
        assert_eq!(s.board().filled_count(), BOARD_COLS - 1);
    }

    #[test]
    fn same_seed_draws_same_queue() {
        let a = session(42);
        let b = session(42);
        assert!(a.queue().eq(b.queue()));
    }
}
