//! Tetromino kinds, rotation states and the falling piece

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Offsets of the four cells of a piece relative to its origin
pub type Shape = [(i32, i32); 4];

/// Where every freshly spawned piece starts
pub const SPAWN_POSITION: Position = Position { x: 3, y: 0 };

/// The seven canonical tetromino kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TetrominoType {
    I,
    O,
    T,
    S,
    Z,
    J,
    L,
}

impl TetrominoType {
    pub const ALL: [TetrominoType; 7] = [
        TetrominoType::I,
        TetrominoType::O,
        TetrominoType::T,
        TetrominoType::S,
        TetrominoType::Z,
        TetrominoType::J,
        TetrominoType::L,
    ];

    /// Uniform draw over all kinds. No bag: repeats and droughts are possible.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::ALL[rng.gen_range(0..Self::ALL.len())]
    }

    /// Cell offsets of this kind in the given rotation state
    pub fn shape(self, rotation: Rotation) -> Shape {
        SHAPES[self as usize][rotation.index()]
    }
}

/// Rotation state, clockwise in quarter turns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    const ORDER: [Rotation; 4] = [
        Rotation::Deg0,
        Rotation::Deg90,
        Rotation::Deg180,
        Rotation::Deg270,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Next clockwise state, wrapping 270 back to 0
    pub fn next(self) -> Self {
        Self::ORDER[(self.index() + 1) % Self::ORDER.len()]
    }

    pub fn degrees(self) -> u16 {
        90 * self.index() as u16
    }
}

/// Board coordinate; y grows downward and may be negative above the board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

/// The piece a player is currently steering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivePiece {
    kind: TetrominoType,
    rotation: Rotation,
    position: Position,
    placed: bool,
}

impl ActivePiece {
    /// A new piece at the spawn position in its initial rotation
    pub fn spawn(kind: TetrominoType) -> Self {
        Self {
            kind,
            rotation: Rotation::Deg0,
            position: SPAWN_POSITION,
            placed: false,
        }
    }

    pub fn kind(&self) -> TetrominoType {
        self.kind
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn shape(&self) -> Shape {
        self.kind.shape(self.rotation)
    }

    pub fn is_placed(&self) -> bool {
        self.placed
    }

    /// Absolute board coordinates of the four cells
    pub fn cells(&self) -> impl Iterator<Item = Position> + '_ {
        let origin = self.position;
        self.shape()
            .into_iter()
            .map(move |(dx, dy)| origin.offset(dx, dy))
    }

    pub(crate) fn move_to(&mut self, position: Position) {
        self.position = position;
    }

    pub(crate) fn rotate_to(&mut self, rotation: Rotation, position: Position) {
        self.rotation = rotation;
        self.position = position;
    }

    pub(crate) fn mark_placed(&mut self) {
        self.placed = true;
    }
}

// Indexed by [TetrominoType as usize][Rotation::index()], each inside a 4x4 box.
const SHAPES: [[Shape; 4]; 7] = [
    // I
    [
        [(0, 1), (1, 1), (2, 1), (3, 1)],
        [(2, 0), (2, 1), (2, 2), (2, 3)],
        [(0, 2), (1, 2), (2, 2), (3, 2)],
        [(1, 0), (1, 1), (1, 2), (1, 3)],
    ],
    // O
    [
        [(1, 0), (2, 0), (1, 1), (2, 1)],
        [(1, 0), (2, 0), (1, 1), (2, 1)],
        [(1, 0), (2, 0), (1, 1), (2, 1)],
        [(1, 0), (2, 0), (1, 1), (2, 1)],
    ],
    // T
    [
        [(1, 0), (0, 1), (1, 1), (2, 1)],
        [(1, 0), (1, 1), (2, 1), (1, 2)],
        [(0, 1), (1, 1), (2, 1), (1, 2)],
        [(1, 0), (0, 1), (1, 1), (1, 2)],
    ],
    // S
    [
        [(1, 0), (2, 0), (0, 1), (1, 1)],
        [(1, 0), (1, 1), (2, 1), (2, 2)],
        [(1, 1), (2, 1), (0, 2), (1, 2)],
        [(0, 0), (0, 1), (1, 1), (1, 2)],
    ],
    // Z
    [
        [(0, 0), (1, 0), (1, 1), (2, 1)],
        [(2, 0), (1, 1), (2, 1), (1, 2)],
        [(0, 1), (1, 1), (1, 2), (2, 2)],
        [(1, 0), (0, 1), (1, 1), (0, 2)],
    ],
    // J
    [
        [(0, 0), (0, 1), (1, 1), (2, 1)],
        [(1, 0), (2, 0), (1, 1), (1, 2)],
        [(0, 1), (1, 1), (2, 1), (2, 2)],
        [(1, 0), (1, 1), (0, 2), (1, 2)],
    ],
    // L
    [
        [(2, 0), (0, 1), (1, 1), (2, 1)],
        [(1, 0), (1, 1), (1, 2), (2, 2)],
        [(0, 1), (1, 1), (2, 1), (0, 2)],
        [(0, 0), (1, 0), (1, 1), (1, 2)],
    ],
];
