//! Client-side match synchronization for four-player Blokus: turn state,
//! board reconciliation, slot translation, optimistic placement preview, and
//! duplicate-request suppression, owned together by a [`MatchSession`].

pub mod blocks;
pub mod board;
pub mod dedup;
pub mod error;
pub mod events;
pub mod match_state;
pub mod ports;
pub mod predictor;
pub mod session;
pub mod slot;
pub mod turn;

pub use blocks::{BlockShape, BlockType, FlipState, PLAYER_BLOCK_COUNT, Rotation};
pub use board::{BOARD_SIZE, BoardGrid, BoardReconciler, CellChange, CellOwner, Position};
pub use dedup::{InFlightKey, Operation, RequestDeduplicator};
pub use error::{DisconnectReason, PredictionError, RejectionReason, SyncError};
pub use events::{
    LocalInput, Notice, OutboundRequest, PlacementRequest, PreviewValidity, SeatInfo, ServerEvent,
    UiEvent,
};
pub use match_state::{MatchState, PlayerInfo};
pub use ports::{LegalityOracle, MatchObserver, ObserverId, Transport};
pub use predictor::{PendingPreview, PlacementPredictor, PredictorState};
pub use session::{MatchSession, SessionConfig};
pub use slot::{ClientSlot, MAX_PLAYERS, PlayerColor, SlotColorMapper, SlotError};
pub use turn::{MAX_TURN_DURATION, TurnCoordinator, TurnPhase, TurnSignal};
