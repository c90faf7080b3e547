//! Piece geometry: the 21 standard pieces, their transforms, and the board
//! footprint of a transformed piece at an anchor.
//!
//! This is pure geometry. Whether a footprint is a *legal* move is decided by
//! the external [`LegalityOracle`](crate::ports::LegalityOracle).

use serde::{Deserialize, Serialize};

use crate::board::Position;

/// Pieces each player starts with.
pub const PLAYER_BLOCK_COUNT: u32 = 21;

// ---------------------------------------------------------------------------
// BlockType
// ---------------------------------------------------------------------------

/// The 21 pieces. Discriminants are the server's piece ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum BlockType {
    Single = 1,
    Domino = 2,
    TrioLine = 3,
    TrioAngle = 4,
    TetroI = 5,
    TetroO = 6,
    TetroT = 7,
    TetroL = 8,
    TetroS = 9,
    PentoF = 10,
    PentoI = 11,
    PentoL = 12,
    PentoN = 13,
    PentoP = 14,
    PentoT = 15,
    PentoU = 16,
    PentoV = 17,
    PentoW = 18,
    PentoX = 19,
    PentoY = 20,
    PentoZ = 21,
}

impl BlockType {
    /// Every piece in server id order.
    pub const ALL: [BlockType; 21] = [
        BlockType::Single,
        BlockType::Domino,
        BlockType::TrioLine,
        BlockType::TrioAngle,
        BlockType::TetroI,
        BlockType::TetroO,
        BlockType::TetroT,
        BlockType::TetroL,
        BlockType::TetroS,
        BlockType::PentoF,
        BlockType::PentoI,
        BlockType::PentoL,
        BlockType::PentoN,
        BlockType::PentoP,
        BlockType::PentoT,
        BlockType::PentoU,
        BlockType::PentoV,
        BlockType::PentoW,
        BlockType::PentoX,
        BlockType::PentoY,
        BlockType::PentoZ,
    ];

    /// Looks up a piece by server id.
    pub fn from_server_id(id: u8) -> Option<Self> {
        Self::ALL.get((id as usize).checked_sub(1)?).copied()
    }

    /// The server id of this piece.
    pub fn server_id(self) -> u8 {
        self as u8
    }

    /// Untransformed `(row, col)` offsets.
    pub fn base_cells(self) -> &'static [(i32, i32)] {
        match self {
            BlockType::Single => &[(0, 0)],
            BlockType::Domino => &[(0, 0), (0, 1)],
            BlockType::TrioLine => &[(0, 0), (0, 1), (0, 2)],
            BlockType::TrioAngle => &[(0, 0), (0, 1), (1, 1)],
            BlockType::TetroI => &[(0, 0), (0, 1), (0, 2), (0, 3)],
            BlockType::TetroO => &[(0, 0), (0, 1), (1, 0), (1, 1)],
            BlockType::TetroT => &[(0, 0), (0, 1), (0, 2), (1, 1)],
            BlockType::TetroL => &[(0, 0), (0, 1), (0, 2), (1, 0)],
            BlockType::TetroS => &[(0, 0), (0, 1), (1, 1), (1, 2)],
            BlockType::PentoF => &[(0, 1), (0, 2), (1, 0), (1, 1), (2, 1)],
            BlockType::PentoI => &[(0, 0), (0, 1), (0, 2), (0, 3), (0, 4)],
            BlockType::PentoL => &[(0, 0), (0, 1), (0, 2), (0, 3), (1, 0)],
            BlockType::PentoN => &[(0, 0), (0, 1), (0, 2), (1, 2), (1, 3)],
            BlockType::PentoP => &[(0, 0), (0, 1), (1, 0), (1, 1), (2, 0)],
            BlockType::PentoT => &[(0, 0), (0, 1), (0, 2), (1, 1), (2, 1)],
            BlockType::PentoU => &[(0, 0), (0, 2), (1, 0), (1, 1), (1, 2)],
            BlockType::PentoV => &[(0, 0), (1, 0), (2, 0), (2, 1), (2, 2)],
            BlockType::PentoW => &[(0, 0), (1, 0), (1, 1), (2, 1), (2, 2)],
            BlockType::PentoX => &[(0, 1), (1, 0), (1, 1), (1, 2), (2, 1)],
            BlockType::PentoY => &[(0, 0), (0, 1), (0, 2), (0, 3), (1, 1)],
            BlockType::PentoZ => &[(0, 0), (0, 1), (1, 1), (2, 1), (2, 2)],
        }
    }

    /// Number of board cells this piece covers (its score value).
    pub fn cell_count(self) -> usize {
        self.base_cells().len()
    }
}

// ---------------------------------------------------------------------------
// Transforms
// ---------------------------------------------------------------------------

/// Clockwise rotation. Discriminants are the server's rotation ids.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Rotation {
    #[default]
    Deg0 = 0,
    Deg90 = 1,
    Deg180 = 2,
    Deg270 = 3,
}

impl Rotation {
    /// Next rotation clockwise.
    pub fn clockwise(self) -> Self {
        match self {
            Rotation::Deg0 => Rotation::Deg90,
            Rotation::Deg90 => Rotation::Deg180,
            Rotation::Deg180 => Rotation::Deg270,
            Rotation::Deg270 => Rotation::Deg0,
        }
    }

    fn apply(self, (r, c): (i32, i32)) -> (i32, i32) {
        match self {
            Rotation::Deg0 => (r, c),
            Rotation::Deg90 => (c, -r),
            Rotation::Deg180 => (-r, -c),
            Rotation::Deg270 => (-c, r),
        }
    }
}

/// Mirror state. Discriminants are the server's flip ids.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum FlipState {
    #[default]
    Normal = 0,
    Horizontal = 1,
    Vertical = 2,
    Both = 3,
}

impl FlipState {
    /// Toggles the horizontal mirror, keeping any vertical one.
    pub fn flip_horizontal(self) -> Self {
        match self {
            FlipState::Normal => FlipState::Horizontal,
            FlipState::Horizontal => FlipState::Normal,
            FlipState::Vertical => FlipState::Both,
            FlipState::Both => FlipState::Vertical,
        }
    }

    /// Whether any mirror is applied.
    pub fn is_flipped(self) -> bool {
        self != FlipState::Normal
    }

    fn apply(self, (r, c): (i32, i32)) -> (i32, i32) {
        match self {
            FlipState::Normal => (r, c),
            FlipState::Horizontal => (r, -c),
            FlipState::Vertical => (-r, c),
            FlipState::Both => (-r, -c),
        }
    }
}

// ---------------------------------------------------------------------------
// BlockShape
// ---------------------------------------------------------------------------

/// A piece together with its orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockShape {
    /// Which piece.
    pub block_type: BlockType,
    /// Clockwise rotation.
    #[serde(default)]
    pub rotation: Rotation,
    /// Mirror state.
    #[serde(default)]
    pub flip: FlipState,
}

impl BlockShape {
    /// Untransformed piece.
    pub fn new(block_type: BlockType) -> Self {
        Self {
            block_type,
            rotation: Rotation::Deg0,
            flip: FlipState::Normal,
        }
    }

    /// Same piece with a different orientation.
    pub fn oriented(self, rotation: Rotation, flip: FlipState) -> Self {
        Self {
            rotation,
            flip,
            ..self
        }
    }

    /// Cell offsets after flipping, then rotating, then normalizing so the
    /// smallest row and column are both 0. Sorted, so two orientations that
    /// cover the same cells compare equal.
    pub fn cells(&self) -> Vec<(i32, i32)> {
        let mut cells: Vec<(i32, i32)> = self
            .block_type
            .base_cells()
            .iter()
            .map(|&cell| self.rotation.apply(self.flip.apply(cell)))
            .collect();

        let min_r = cells.iter().map(|c| c.0).min().unwrap_or(0);
        let min_c = cells.iter().map(|c| c.1).min().unwrap_or(0);
        for cell in &mut cells {
            cell.0 -= min_r;
            cell.1 -= min_c;
        }
        cells.sort_unstable();
        cells
    }

    /// Absolute board positions covered when the shape is anchored at
    /// `anchor` (top-left of the normalized bounding box).
    pub fn footprint(&self, anchor: Position) -> Vec<Position> {
        self.cells()
            .into_iter()
            .map(|(r, c)| Position::new(anchor.row + r, anchor.col + c))
            .collect()
    }
}
