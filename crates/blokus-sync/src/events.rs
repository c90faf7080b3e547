//! Inbound server events, local input, outbound requests, and the UI events
//! the session fans out to observers.
//!
//! Server events carry slots in *server* numbering (`1..=4`) and raw cell
//! codes; the session translates them once, at its boundary. Everything
//! downstream of the session speaks [`ClientSlot`].

use serde::{Deserialize, Serialize};

use crate::blocks::{BlockShape, BlockType, FlipState, Rotation};
use crate::board::{CellOwner, Position};
use crate::error::SyncError;
use crate::slot::ClientSlot;

// ---------------------------------------------------------------------------
// ServerEvent (server → client)
// ---------------------------------------------------------------------------

/// A seated player as listed in a room join response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeatInfo {
    /// Server slot `1..=4`.
    pub slot: i64,
    pub user_id: String,
    pub display_name: String,
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub is_host: bool,
}

/// Authoritative events, in arrival order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerEvent {
    /// Full roster on entering a room.
    RoomJoined {
        room_id: String,
        players: Vec<SeatInfo>,
    },
    PlayerJoined {
        slot: i64,
        user_id: String,
        display_name: String,
    },
    PlayerLeft {
        slot: i64,
    },
    PlayerReady {
        slot: i64,
        ready: bool,
    },
    HostChanged {
        slot: i64,
    },
    GameStarted,
    TurnChanged {
        /// Server slot whose turn it now is.
        slot: i64,
        /// Full turn length; the session default applies when absent.
        #[serde(default)]
        turn_time_seconds: Option<f32>,
        /// Time left on the new turn at send time.
        remaining_seconds: f32,
        #[serde(default)]
        previous_turn_timed_out: bool,
        #[serde(default)]
        turn_number: u32,
    },
    /// Whole board, `[row][col]` of server cell codes.
    BoardSnapshot {
        grid: Vec<Vec<i32>>,
    },
    /// The cells of one accepted placement.
    CellsPlaced {
        slot: i64,
        #[serde(default)]
        block: Option<BlockType>,
        cells: Vec<Position>,
        #[serde(default)]
        score_gained: Option<u32>,
    },
    /// The server refused the local player's placement.
    PlacementRejected {
        code: String,
    },
    ScoresUpdated {
        /// `(server slot, total score)` pairs.
        scores: Vec<(i64, u32)>,
    },
    GameEnded {
        /// Server slot of the winner; `None` or `0` for a draw.
        #[serde(default)]
        winner: Option<i64>,
    },
    Disconnected {
        code: String,
    },
    RoomLeft,
}

// ---------------------------------------------------------------------------
// LocalInput
// ---------------------------------------------------------------------------

/// Player input, as recorded by input layers and replay scripts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LocalInput {
    Select {
        block: BlockType,
        #[serde(default)]
        rotation: Rotation,
        #[serde(default)]
        flip: FlipState,
        anchor: Position,
    },
    Confirm,
    Cancel,
}

// ---------------------------------------------------------------------------
// Outbound requests
// ---------------------------------------------------------------------------

/// A confirmed placement, immutable once built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementRequest {
    pub slot: ClientSlot,
    pub block_type: BlockType,
    pub anchor: Position,
    pub rotation: Rotation,
    pub flip: FlipState,
}

impl PlacementRequest {
    pub fn new(slot: ClientSlot, shape: BlockShape, anchor: Position) -> Self {
        Self {
            slot,
            block_type: shape.block_type,
            anchor,
            rotation: shape.rotation,
            flip: shape.flip,
        }
    }

    pub fn shape(&self) -> BlockShape {
        BlockShape::new(self.block_type).oriented(self.rotation, self.flip)
    }
}

/// Everything the session can send, for transports that queue or log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutboundRequest {
    Placement(PlacementRequest),
    Pass,
    Resync,
}

// ---------------------------------------------------------------------------
// UI events (session → observers)
// ---------------------------------------------------------------------------

/// How the preview should be tinted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreviewValidity {
    Valid,
    Invalid,
    /// No preview; the cell list is empty.
    Cleared,
}

/// Informational, non-blocking notices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Notice {
    GameStarted,
    /// The turn that just ended ran out of time.
    PreviousTurnTimedOut { previous: Option<ClientSlot> },
    GameEnded { winner: Option<ClientSlot> },
}

/// Everything observers are told about, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    CellVisualChanged {
        position: Position,
        owner: CellOwner,
    },
    PreviewChanged {
        cells: Vec<Position>,
        validity: PreviewValidity,
    },
    TurnDisplayChanged {
        slot: Option<ClientSlot>,
        remaining_seconds: u32,
    },
    ErrorSurfaced(SyncError),
    Notice(Notice),
}

impl UiEvent {
    pub(crate) fn preview_cleared() -> Self {
        UiEvent::PreviewChanged {
            cells: Vec::new(),
            validity: PreviewValidity::Cleared,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_changed_optional_fields_default() {
        let ron_str = "TurnChanged(slot: 2, remaining_seconds: 12.5)";
        let event: ServerEvent = ron::from_str(ron_str).unwrap();
        assert_eq!(
            event,
            ServerEvent::TurnChanged {
                slot: 2,
                turn_time_seconds: None,
                remaining_seconds: 12.5,
                previous_turn_timed_out: false,
                turn_number: 0,
            }
        );
    }

    #[test]
    fn test_cells_placed_from_json() {
        let json = r#"{"CellsPlaced":{"slot":3,"cells":[{"row":5,"col":5},{"row":5,"col":6}]}}"#;
        let event: ServerEvent = serde_json::from_str(json).unwrap();
        match event {
            ServerEvent::CellsPlaced { slot, cells, block, .. } => {
                assert_eq!(slot, 3);
                assert_eq!(cells, vec![Position::new(5, 5), Position::new(5, 6)]);
                assert_eq!(block, None);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_local_select_defaults_orientation() {
        let input: LocalInput =
            ron::from_str("Select(block: PentoX, anchor: (row: 1, col: 2))").unwrap();
        assert_eq!(
            input,
            LocalInput::Select {
                block: BlockType::PentoX,
                rotation: Rotation::Deg0,
                flip: FlipState::Normal,
                anchor: Position::new(1, 2),
            }
        );
    }

    #[test]
    fn test_placement_request_keeps_orientation() {
        let shape = BlockShape::new(BlockType::TetroL).oriented(Rotation::Deg270, FlipState::Vertical);
        let request = PlacementRequest::new(ClientSlot::new(2).unwrap(), shape, Position::new(4, 4));
        assert_eq!(request.shape(), shape);
        assert_eq!(request.block_type, BlockType::TetroL);
    }
}
