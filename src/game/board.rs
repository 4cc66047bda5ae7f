//! Playfield physics: collision, wall kicks, gravity, locking and line clears

use std::time::Duration;

use super::piece::{ActivePiece, Position, Shape};
use super::{MoveDirection, PendingAction};

pub const BOARD_ROWS: usize = 20;
pub const BOARD_COLS: usize = 10;

/// Horizontal offsets tried, in order, when a rotation collides
pub const KICK_OFFSETS: [i32; 5] = [0, -1, 1, -2, 2];

/// Default time between automatic one-row falls
pub const DEFAULT_GRAVITY_INTERVAL: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockState {
    #[default]
    Empty,
    Filled,
}

type Row = [BlockState; BOARD_COLS];

const EMPTY_ROW: Row = [BlockState::Empty; BOARD_COLS];

/// What happened to the active piece during one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// The piece was locked into the grid this tick
    pub locked: bool,
    pub lines_cleared: u32,
}

/// Fixed 20x10 grid plus the gravity accumulator of its owner
#[derive(Debug, Clone)]
pub struct Board {
    rows: Vec<Row>,
    gravity_elapsed: Duration,
    gravity_interval: Duration,
}

impl Board {
    pub fn new(gravity_interval: Duration) -> Self {
        Self {
            rows: vec![EMPTY_ROW; BOARD_ROWS],
            gravity_elapsed: Duration::ZERO,
            gravity_interval,
        }
    }

    /// Advance the active piece by one tick of `dt` with the buffered action
    pub fn apply_tick(
        &mut self,
        dt: Duration,
        piece: &mut ActivePiece,
        action: &PendingAction,
    ) -> TickReport {
        if piece.is_placed() {
            return TickReport::default();
        }

        if action.rotate {
            self.try_rotate(piece);
        } else {
            match action.direction {
                Some(MoveDirection::Left) => {
                    self.try_shift(piece, -1, 0);
                }
                Some(MoveDirection::Right) => {
                    self.try_shift(piece, 1, 0);
                }
                // Soft drop goes through the gravity step below
                Some(MoveDirection::Down) | None => {}
            }
        }

        if action.drop {
            return self.hard_drop(piece);
        }

        self.gravity_elapsed += dt;
        let soft_drop = action.direction == Some(MoveDirection::Down);
        if self.gravity_elapsed < self.gravity_interval && !soft_drop {
            return TickReport::default();
        }

        self.gravity_elapsed = Duration::ZERO;
        if self.try_shift(piece, 0, 1) {
            TickReport::default()
        } else {
            self.lock(piece)
        }
    }

    /// Rotate clockwise, trying each kick offset in turn. Leaves the piece
    /// untouched when every candidate collides.
    pub fn try_rotate(&self, piece: &mut ActivePiece) -> bool {
        let next = piece.rotation().next();
        let shape = piece.kind().shape(next);
        let origin = piece.position();

        for dx in KICK_OFFSETS {
            let candidate = origin.offset(dx, 0);
            if !self.collides(&shape, candidate) {
                piece.rotate_to(next, candidate);
                return true;
            }
        }

        false
    }

    /// Move by (dx, dy) if the destination is free
    pub fn try_shift(&self, piece: &mut ActivePiece, dx: i32, dy: i32) -> bool {
        let target = piece.position().offset(dx, dy);
        if self.collides(&piece.shape(), target) {
            return false;
        }
        piece.move_to(target);
        true
    }

    /// Drop to the lowest free row at the current column and lock there
    pub fn hard_drop(&mut self, piece: &mut ActivePiece) -> TickReport {
        let y = self.landing_row(piece);
        let position = piece.position();
        piece.move_to(Position { x: position.x, y });
        self.lock(piece)
    }

    /// Deepest y reachable by falling straight down from the current position
    pub fn landing_row(&self, piece: &ActivePiece) -> i32 {
        let shape = piece.shape();
        let mut position = piece.position();
        while !self.collides(&shape, position.offset(0, 1)) {
            position = position.offset(0, 1);
        }
        position.y
    }

    /// True when `shape` at `origin` hits a wall, the floor or a filled cell.
    /// Cells above the top edge never collide.
    pub fn collides(&self, shape: &Shape, origin: Position) -> bool {
        shape.iter().any(|&(dx, dy)| {
            let x = origin.x + dx;
            let y = origin.y + dy;

            if x < 0 || x >= BOARD_COLS as i32 || y >= BOARD_ROWS as i32 {
                return true;
            }
            if y < 0 {
                return false;
            }
            self.rows[y as usize][x as usize] == BlockState::Filled
        })
    }

    /// Write the piece into the grid, flag it placed and clear full rows
    fn lock(&mut self, piece: &mut ActivePiece) -> TickReport {
        for cell in piece.cells() {
            if let Some(slot) = self.cell_mut(cell.x, cell.y) {
                if *slot == BlockState::Empty {
                    *slot = BlockState::Filled;
                }
            }
        }

        piece.mark_placed();
        self.gravity_elapsed = Duration::ZERO;

        TickReport {
            locked: true,
            lines_cleared: self.clear_lines(),
        }
    }

    /// Remove every full row, scanning bottom to top. Each removal inserts an
    /// empty row at the top and the same index is checked again.
    pub fn clear_lines(&mut self) -> u32 {
        let mut cleared = 0;
        let mut row = BOARD_ROWS;

        while row > 0 {
            let index = row - 1;
            if self.rows[index].iter().all(|c| *c == BlockState::Filled) {
                self.rows.remove(index);
                self.rows.insert(0, EMPTY_ROW);
                cleared += 1;
            } else {
                row -= 1;
            }
        }

        cleared
    }

    /// Anything left in the top row means the stack has reached the ceiling
    pub fn is_overflowing(&self) -> bool {
        self.rows[0].iter().any(|c| *c == BlockState::Filled)
    }

    pub fn get(&self, x: i32, y: i32) -> Option<BlockState> {
        if x < 0 || y < 0 {
            return None;
        }
        self.rows
            .get(y as usize)
            .and_then(|row| row.get(x as usize))
            .copied()
    }

    fn cell_mut(&mut self, x: i32, y: i32) -> Option<&mut BlockState> {
        if x < 0 || y < 0 {
            return None;
        }
        self.rows
            .get_mut(y as usize)
            .and_then(|row| row.get_mut(x as usize))
    }

    pub fn filled_count(&self) -> usize {
        self.rows
            .iter()
            .flatten()
            .filter(|c| **c == BlockState::Filled)
            .count()
    }

    pub fn rows(&self) -> impl Iterator<Item = &[BlockState]> + '_ {
        self.rows.iter().map(|row| row.as_slice())
    }

    #[cfg(test)]
    pub(crate) fn set(&mut self, x: i32, y: i32, state: BlockState) {
        if let Some(slot) = self.cell_mut(x, y) {
            *slot = state;
        }
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::new(DEFAULT_GRAVITY_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::piece::{Rotation, TetrominoType, SPAWN_POSITION};

    const FRAME: Duration = Duration::from_millis(16);

    fn fill_row(board: &mut Board, y: i32, except: &[i32]) {
        for x in 0..BOARD_COLS as i32 {
            if !except.contains(&x) {
                board.set(x, y, BlockState::Filled);
            }
        }
    }

    fn action(direction: Option<MoveDirection>) -> PendingAction {
        PendingAction {
            direction,
            ..PendingAction::default()
        }
    }

    #[test]
    fn new_board_is_empty_with_fixed_dimensions() {
        let board = Board::default();
        assert_eq!(board.rows().count(), BOARD_ROWS);
        assert!(board.rows().all(|row| row.len() == BOARD_COLS));
        assert_eq!(board.filled_count(), 0);
        assert!(!board.is_overflowing());
    }

    #[test]
    fn collision_rules() {
        let mut board = Board::default();
        let single: Shape = [(0, 0), (0, 0), (0, 0), (0, 0)];

        assert!(board.collides(&single, Position { x: -1, y: 5 }));
        assert!(board.collides(&single, Position { x: BOARD_COLS as i32, y: 5 }));
        assert!(board.collides(&single, Position { x: 4, y: BOARD_ROWS as i32 }));
        assert!(!board.collides(&single, Position { x: 4, y: -3 }));

        board.set(4, 10, BlockState::Filled);
        assert!(board.collides(&single, Position { x: 4, y: 10 }));
        assert!(!board.collides(&single, Position { x: 5, y: 10 }));
    }

    #[test]
    fn o_piece_soft_drops_one_row_per_down_action() {
        let mut board = Board::default();
        let mut piece = ActivePiece::spawn(TetrominoType::O);
        let start = piece.position().y;

        for _ in 0..3 {
            let report = board.apply_tick(FRAME, &mut piece, &action(Some(MoveDirection::Down)));
            assert!(!report.locked);
        }

        assert_eq!(piece.position().y, start + 3);
        assert_eq!(piece.position().x, SPAWN_POSITION.x);
    }

    #[test]
    fn horizontal_moves_stop_at_walls() {
        let mut board = Board::default();
        let mut piece = ActivePiece::spawn(TetrominoType::O);

        // O occupies columns 1..=2 of its box, so the left wall is reached at x = -1
        for _ in 0..10 {
            board.apply_tick(Duration::ZERO, &mut piece, &action(Some(MoveDirection::Left)));
        }
        assert_eq!(piece.position().x, -1);

        for _ in 0..20 {
            board.apply_tick(Duration::ZERO, &mut piece, &action(Some(MoveDirection::Right)));
        }
        assert_eq!(piece.position().x, BOARD_COLS as i32 - 3);
    }

    #[test]
    fn gravity_steps_after_interval_and_locks_on_floor() {
        let mut board = Board::new(Duration::from_millis(100));
        let mut piece = ActivePiece::spawn(TetrominoType::O);
        let idle = PendingAction::default();

        board.apply_tick(Duration::from_millis(60), &mut piece, &idle);
        assert_eq!(piece.position().y, 0);
        board.apply_tick(Duration::from_millis(60), &mut piece, &idle);
        assert_eq!(piece.position().y, 1);

        let mut locked = false;
        for _ in 0..100 {
            if board
                .apply_tick(Duration::from_millis(100), &mut piece, &idle)
                .locked
            {
                locked = true;
                break;
            }
        }

        assert!(locked);
        assert!(piece.is_placed());
        assert_eq!(board.get(4, BOARD_ROWS as i32 - 1), Some(BlockState::Filled));
        assert_eq!(board.filled_count(), 4);
    }

    #[test]
    fn four_unobstructed_rotations_restore_the_piece() {
        let board = Board::default();
        for kind in TetrominoType::ALL {
            let mut piece = ActivePiece::spawn(kind);
            let original = piece.clone();

            for _ in 0..4 {
                assert!(board.try_rotate(&mut piece));
            }

            assert_eq!(piece, original, "{kind:?}");
        }
    }

    #[test]
    fn wall_kick_shifts_piece_off_the_wall() {
        let board = Board::default();
        let mut piece = ActivePiece::spawn(TetrominoType::I);
        piece.rotate_to(Rotation::Deg90, Position { x: -2, y: 5 });

        // Horizontal I from x = -2 would poke out of the left wall; kick +2 fits
        assert!(board.try_rotate(&mut piece));
        assert_eq!(piece.rotation(), Rotation::Deg180);
        assert_eq!(piece.position(), Position { x: 0, y: 5 });
    }

    #[test]
    fn rotation_is_a_no_op_when_every_kick_collides() {
        let mut board = Board::default();
        let mut piece = ActivePiece::spawn(TetrominoType::I);
        piece.rotate_to(Rotation::Deg90, Position { x: 3, y: 10 });

        // Vertical I sits in column 5, rows 10..=13; block row 12 elsewhere
        fill_row(&mut board, 12, &[5]);
        let before = piece.clone();

        let report = board.apply_tick(
            Duration::ZERO,
            &mut piece,
            &PendingAction {
                rotate: true,
                ..PendingAction::default()
            },
        );

        assert!(!report.locked);
        assert_eq!(piece, before);
    }

    #[test]
    fn hard_drop_lands_on_the_deepest_free_row_and_locks() {
        let mut board = Board::default();
        board.set(4, 15, BlockState::Filled);
        let mut piece = ActivePiece::spawn(TetrominoType::O);

        let expected = board.landing_row(&piece);
        let shape = piece.shape();
        assert!(!board.collides(&shape, Position { x: piece.position().x, y: expected }));
        assert!(board.collides(&shape, Position { x: piece.position().x, y: expected + 1 }));

        let report = board.apply_tick(
            FRAME,
            &mut piece,
            &PendingAction {
                drop: true,
                ..PendingAction::default()
            },
        );

        assert!(report.locked);
        assert!(piece.is_placed());
        assert_eq!(piece.position().y, expected);
        assert_eq!(expected, 13);
        assert_eq!(board.filled_count(), 5);
    }

    #[test]
    fn hard_drop_completing_bottom_row_clears_it() {
        let mut board = Board::default();
        let bottom = BOARD_ROWS as i32 - 1;
        fill_row(&mut board, bottom, &[8, 9]);
        let before = board.filled_count();

        // O box columns 1..=2, so origin x = 7 covers columns 8 and 9
        let mut piece = ActivePiece::spawn(TetrominoType::O);
        piece.move_to(Position { x: 7, y: 0 });

        let report = board.hard_drop(&mut piece);

        assert_eq!(report.lines_cleared, 1);
        assert_eq!(board.rows().count(), BOARD_ROWS);
        // Four cells added, one full row of BOARD_COLS removed
        assert_eq!(board.filled_count(), before + 4 - BOARD_COLS);
        assert_eq!(board.get(8, bottom), Some(BlockState::Filled));
        assert_eq!(board.get(9, bottom), Some(BlockState::Filled));
        assert_eq!(board.get(0, bottom), Some(BlockState::Empty));
    }

    #[test]
    fn clearing_multiple_rows_preserves_remaining_order() {
        let mut board = Board::default();
        fill_row(&mut board, 19, &[]);
        fill_row(&mut board, 18, &[0]);
        fill_row(&mut board, 17, &[]);
        board.set(2, 16, BlockState::Filled);
        let before = board.filled_count();

        let cleared = board.clear_lines();

        assert_eq!(cleared, 2);
        assert_eq!(board.filled_count(), before - 2 * BOARD_COLS);
        // Partial row 18 drops to 19, the marker from 16 lands on 18
        assert_eq!(board.get(0, 19), Some(BlockState::Empty));
        assert_eq!(board.get(1, 19), Some(BlockState::Filled));
        assert_eq!(board.get(2, 18), Some(BlockState::Filled));
        assert_eq!(board.get(3, 18), Some(BlockState::Empty));
        assert!(board.rows().take(18).all(|row| row.iter().all(|c| *c == BlockState::Empty)));
    }

    #[test]
    fn locking_into_the_top_row_overflows() {
        let mut board = Board::default();
        for y in 1..BOARD_ROWS as i32 {
            fill_row(&mut board, y, &[9]);
        }
        let mut piece = ActivePiece::spawn(TetrominoType::O);

        let report = board.apply_tick(Duration::ZERO, &mut piece, &action(Some(MoveDirection::Down)));

        assert!(report.locked);
        assert!(board.is_overflowing());
        // Only empty, in-bounds cells were written
        assert_eq!(board.get(4, 0), Some(BlockState::Filled));
        assert_eq!(board.get(5, 0), Some(BlockState::Filled));
    }
}
