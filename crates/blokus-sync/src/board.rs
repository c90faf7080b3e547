//! The authoritative ownership grid and the reconciler that is its only
//! writer.
//!
//! [`BoardReconciler`] applies full snapshots by diffing against the last
//! applied snapshot, and incremental placements by point update. Both return
//! the list of [`CellChange`]s the renderer has to redraw; nothing else.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::slot::{ClientSlot, SlotColorMapper};

/// Board edge length.
pub const BOARD_SIZE: usize = 20;

/// Server cell code for an empty cell.
pub const SERVER_CELL_EMPTY: i32 = 0;

/// Server cell code for an obstacle.
pub const SERVER_CELL_OBSTACLE: i32 = -1;

// ---------------------------------------------------------------------------
// Position
// ---------------------------------------------------------------------------

/// A board coordinate. Signed so off-board positions from the network can be
/// represented and rejected instead of wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    /// Row, top to bottom.
    pub row: i32,
    /// Column, left to right.
    pub col: i32,
}

impl Position {
    pub const fn new(row: i32, col: i32) -> Self {
        Self { row, col }
    }

    /// Whether the position lies on the board.
    pub fn is_on_board(self) -> bool {
        self.indices().is_some()
    }

    fn indices(self) -> Option<(usize, usize)> {
        let row = usize::try_from(self.row).ok()?;
        let col = usize::try_from(self.col).ok()?;
        (row < BOARD_SIZE && col < BOARD_SIZE).then_some((row, col))
    }
}

// ---------------------------------------------------------------------------
// CellOwner
// ---------------------------------------------------------------------------

/// Occupancy of a single cell, in client numbering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellOwner {
    #[default]
    Empty,
    Slot(ClientSlot),
    Obstacle,
}

impl CellOwner {
    /// Decodes a server cell code: `0` empty, `1..=4` server slot, `-1`
    /// obstacle.
    pub fn from_server(code: i32, mapper: &SlotColorMapper) -> Option<Self> {
        match code {
            SERVER_CELL_EMPTY => Some(CellOwner::Empty),
            SERVER_CELL_OBSTACLE => Some(CellOwner::Obstacle),
            other => mapper.to_client(i64::from(other)).ok().map(CellOwner::Slot),
        }
    }

    pub fn is_empty(self) -> bool {
        self == CellOwner::Empty
    }
}

// ---------------------------------------------------------------------------
// BoardGrid
// ---------------------------------------------------------------------------

/// Fixed-size ownership grid, indexed `[row][col]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardGrid {
    cells: [[CellOwner; BOARD_SIZE]; BOARD_SIZE],
}

impl Default for BoardGrid {
    fn default() -> Self {
        Self::empty()
    }
}

impl BoardGrid {
    /// An all-empty board.
    pub const fn empty() -> Self {
        Self {
            cells: [[CellOwner::Empty; BOARD_SIZE]; BOARD_SIZE],
        }
    }

    /// Owner at `pos`, or `None` when off-board.
    pub fn get(&self, pos: Position) -> Option<CellOwner> {
        pos.indices().map(|(r, c)| self.cells[r][c])
    }

    /// Whether `pos` is on the board and empty.
    pub fn is_free(&self, pos: Position) -> bool {
        self.get(pos) == Some(CellOwner::Empty)
    }

    /// Number of cells owned by `slot`.
    pub fn count_owned(&self, slot: ClientSlot) -> usize {
        self.cells
            .iter()
            .flatten()
            .filter(|&&owner| owner == CellOwner::Slot(slot))
            .count()
    }

    /// Iterates `(position, owner)` over every cell in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (Position, CellOwner)> + '_ {
        self.cells.iter().enumerate().flat_map(|(r, row)| {
            row.iter()
                .enumerate()
                .map(move |(c, &owner)| (Position::new(r as i32, c as i32), owner))
        })
    }

    fn set(&mut self, pos: Position, owner: CellOwner) -> Option<CellOwner> {
        let (r, c) = pos.indices()?;
        Some(std::mem::replace(&mut self.cells[r][c], owner))
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Why a snapshot could not be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BoardError {
    /// Dimensions are not `BOARD_SIZE x BOARD_SIZE`.
    #[error("snapshot is {rows}x{cols}, expected 20x20")]
    Malformed {
        /// Rows received.
        rows: usize,
        /// Widest row received.
        cols: usize,
    },
    /// A cell code that is neither empty, obstacle, nor a server slot.
    #[error("unknown cell code {value} at ({row}, {col})")]
    InvalidCell {
        /// Row of the bad cell.
        row: usize,
        /// Column of the bad cell.
        col: usize,
        /// The raw code.
        value: i32,
    },
}

fn check_dimensions<T>(rows: &[Vec<T>]) -> Result<(), BoardError> {
    let widest = rows.iter().map(Vec::len).max().unwrap_or(0);
    if rows.len() != BOARD_SIZE || rows.iter().any(|row| row.len() != BOARD_SIZE) {
        return Err(BoardError::Malformed {
            rows: rows.len(),
            cols: widest,
        });
    }
    Ok(())
}

/// Translates a server-numbered snapshot into client numbering. Fails
/// without partial output.
pub fn decode_server_grid(
    raw: &[Vec<i32>],
    mapper: &SlotColorMapper,
) -> Result<Vec<Vec<CellOwner>>, BoardError> {
    check_dimensions(raw)?;
    raw.iter()
        .enumerate()
        .map(|(row, cells)| {
            cells
                .iter()
                .enumerate()
                .map(|(col, &value)| {
                    CellOwner::from_server(value, mapper)
                        .ok_or(BoardError::InvalidCell { row, col, value })
                })
                .collect()
        })
        .collect()
}

// ---------------------------------------------------------------------------
// BoardReconciler
// ---------------------------------------------------------------------------

/// One cell whose owner changed and must be redrawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellChange {
    pub position: Position,
    pub owner: CellOwner,
}

/// Owns the live grid and the last-applied snapshot used for diffing.
#[derive(Debug, Default)]
pub struct BoardReconciler {
    grid: BoardGrid,
    /// `None` until the first snapshot after a reset.
    previous: Option<BoardGrid>,
}

impl BoardReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read access for renderers and the legality oracle.
    pub fn grid(&self) -> &BoardGrid {
        &self.grid
    }

    /// Whether a snapshot has been applied since the last reset.
    pub fn has_baseline(&self) -> bool {
        self.previous.is_some()
    }

    /// Applies a full authoritative snapshot.
    ///
    /// Without a baseline every cell is written and every non-empty cell is
    /// reported (plus any cell the snapshot cleared). With a baseline only
    /// cells that differ from it are written and reported, so applying the
    /// same snapshot twice reports nothing the second time. A snapshot with
    /// the wrong dimensions is rejected whole.
    pub fn apply_full_snapshot(
        &mut self,
        snapshot: &[Vec<CellOwner>],
    ) -> Result<Vec<CellChange>, BoardError> {
        check_dimensions(snapshot)?;

        let mut incoming = BoardGrid::empty();
        for (r, row) in snapshot.iter().enumerate() {
            incoming.cells[r].copy_from_slice(row);
        }

        let mut changes = Vec::new();
        match self.previous {
            None => {
                for (pos, owner) in incoming.iter() {
                    let old = self.grid.set(pos, owner);
                    if !owner.is_empty() || old != Some(owner) {
                        changes.push(CellChange { position: pos, owner });
                    }
                }
            }
            Some(ref previous) => {
                for ((pos, owner), (_, before)) in incoming.iter().zip(previous.iter()) {
                    if owner != before {
                        self.grid.set(pos, owner);
                        changes.push(CellChange { position: pos, owner });
                    }
                }
            }
        }

        debug!(
            changed = changes.len(),
            baseline = self.previous.is_some(),
            "applied board snapshot"
        );
        self.previous = Some(incoming);
        Ok(changes)
    }

    /// Applies an authoritative list of cells from a single placement.
    ///
    /// Overwrites unconditionally and point-updates the baseline for exactly
    /// those cells. Off-board positions are logged and skipped.
    pub fn apply_cell_updates(&mut self, cells: &[(Position, CellOwner)]) -> Vec<CellChange> {
        let mut changes = Vec::with_capacity(cells.len());
        for &(position, owner) in cells {
            let Some(old) = self.grid.set(position, owner) else {
                warn!(row = position.row, col = position.col, "skipping off-board cell update");
                continue;
            };
            if let Some(previous) = self.previous.as_mut() {
                previous.set(position, owner);
            }
            if old != owner {
                changes.push(CellChange { position, owner });
            }
        }
        changes
    }

    /// Clears the board and forgets the baseline (game start, room leave).
    /// Returns the cells that were occupied, now empty.
    pub fn reset(&mut self) -> Vec<CellChange> {
        let cleared = self
            .grid
            .iter()
            .filter(|(_, owner)| !owner.is_empty())
            .map(|(position, _)| CellChange {
                position,
                owner: CellOwner::Empty,
            })
            .collect();
        self.grid = BoardGrid::empty();
        self.previous = None;
        cleared
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(i: usize) -> CellOwner {
        CellOwner::Slot(ClientSlot::new(i).unwrap())
    }

    fn empty_snapshot() -> Vec<Vec<CellOwner>> {
        vec![vec![CellOwner::Empty; BOARD_SIZE]; BOARD_SIZE]
    }

    #[test]
    fn test_first_snapshot_reports_non_empty_cells() {
        let mut board = BoardReconciler::new();
        let mut snap = empty_snapshot();
        snap[0][0] = slot(0);
        snap[19][19] = slot(3);
        snap[10][10] = CellOwner::Obstacle;

        let changes = board.apply_full_snapshot(&snap).unwrap();
        assert_eq!(changes.len(), 3);
        assert_eq!(board.grid().get(Position::new(19, 19)), Some(slot(3)));
        assert!(board.has_baseline());
    }

    #[test]
    fn test_identical_snapshot_is_idempotent() {
        let mut board = BoardReconciler::new();
        let mut snap = empty_snapshot();
        snap[4][4] = slot(2);
        board.apply_full_snapshot(&snap).unwrap();

        let second = board.apply_full_snapshot(&snap).unwrap();
        assert!(second.is_empty());
    }

    #[test]
    fn test_diff_reports_exactly_changed_cells() {
        let mut board = BoardReconciler::new();
        let mut snap = empty_snapshot();
        snap[0][0] = slot(0);
        board.apply_full_snapshot(&snap).unwrap();

        let mut next = snap.clone();
        next[0][0] = CellOwner::Empty;
        next[1][1] = slot(1);
        next[2][2] = slot(1);
        next[3][3] = CellOwner::Obstacle;

        let changes = board.apply_full_snapshot(&next).unwrap();
        assert_eq!(changes.len(), 4);
        assert!(changes.contains(&CellChange {
            position: Position::new(0, 0),
            owner: CellOwner::Empty
        }));
        assert!(board.grid().is_free(Position::new(0, 0)));
    }

    #[test]
    fn test_malformed_snapshot_rejected_without_partial_apply() {
        let mut board = BoardReconciler::new();
        let mut snap = vec![vec![slot(0); BOARD_SIZE]; BOARD_SIZE - 1];
        assert_eq!(
            board.apply_full_snapshot(&snap),
            Err(BoardError::Malformed { rows: 19, cols: 20 })
        );

        snap.push(vec![slot(0); BOARD_SIZE + 1]);
        assert!(board.apply_full_snapshot(&snap).is_err());
        assert_eq!(board.grid(), &BoardGrid::empty());
        assert!(!board.has_baseline());
    }

    #[test]
    fn test_cell_updates_overwrite_and_update_baseline() {
        let mut board = BoardReconciler::new();
        board.apply_full_snapshot(&empty_snapshot()).unwrap();

        let cells = [
            (Position::new(5, 5), slot(2)),
            (Position::new(5, 6), slot(2)),
        ];
        assert_eq!(board.apply_cell_updates(&cells).len(), 2);

        // A snapshot that agrees with the point update reports nothing.
        let mut snap = empty_snapshot();
        snap[5][5] = slot(2);
        snap[5][6] = slot(2);
        assert!(board.apply_full_snapshot(&snap).unwrap().is_empty());
    }

    #[test]
    fn test_off_board_cell_update_skipped() {
        let mut board = BoardReconciler::new();
        let changes = board.apply_cell_updates(&[
            (Position::new(-1, 0), slot(0)),
            (Position::new(0, 20), slot(0)),
            (Position::new(0, 0), slot(0)),
        ]);
        assert_eq!(changes.len(), 1);
        assert_eq!(board.grid().count_owned(ClientSlot::new(0).unwrap()), 1);
    }

    #[test]
    fn test_decode_server_grid() {
        let mapper = SlotColorMapper;
        let mut raw = vec![vec![0; BOARD_SIZE]; BOARD_SIZE];
        raw[3][5] = 2;
        raw[0][0] = -1;
        let decoded = decode_server_grid(&raw, &mapper).unwrap();
        assert_eq!(decoded[3][5], slot(1));
        assert_eq!(decoded[0][0], CellOwner::Obstacle);

        raw[1][1] = 7;
        assert_eq!(
            decode_server_grid(&raw, &mapper),
            Err(BoardError::InvalidCell { row: 1, col: 1, value: 7 })
        );
    }

    #[test]
    fn test_reset_clears_grid_and_baseline() {
        let mut board = BoardReconciler::new();
        board.apply_cell_updates(&[(Position::new(1, 1), slot(1))]);
        assert_eq!(
            board.reset(),
            vec![CellChange {
                position: Position::new(1, 1),
                owner: CellOwner::Empty
            }]
        );
        assert_eq!(board.grid(), &BoardGrid::empty());
        assert!(!board.has_baseline());
    }
}
