//! Seams to the collaborators the session does not own: the network
//! transport, the placement rules, and the UI.

use crate::blocks::BlockShape;
use crate::board::{BoardGrid, CellOwner, Position};
use crate::error::SyncError;
use crate::events::{Notice, PlacementRequest, PreviewValidity};
use crate::slot::ClientSlot;

/// Outbound side of the network layer. Calls are fire-and-forget; answers
/// come back as [`ServerEvent`](crate::events::ServerEvent)s.
pub trait Transport {
    fn submit_placement(&mut self, request: &PlacementRequest);
    fn submit_pass(&mut self);
    fn request_resync(&mut self);
}

/// Placement rules, consulted for the optimistic preview only.
///
/// Must be pure: the session may call it at any time against the current
/// authoritative grid. Implementations that need the placing player's color
/// are constructed with the local slot.
pub trait LegalityOracle {
    fn can_place(&self, shape: &BlockShape, anchor: Position, grid: &BoardGrid) -> bool;
}

impl<F> LegalityOracle for F
where
    F: Fn(&BlockShape, Position, &BoardGrid) -> bool,
{
    fn can_place(&self, shape: &BlockShape, anchor: Position, grid: &BoardGrid) -> bool {
        self(shape, anchor, grid)
    }
}

/// Rendering/UI callbacks. Every method defaults to a no-op so observers
/// implement only what they draw.
pub trait MatchObserver {
    fn on_cell_visual_changed(&mut self, _position: Position, _owner: CellOwner) {}

    /// `cells` is empty when `validity` is [`PreviewValidity::Cleared`].
    fn on_preview_changed(&mut self, _cells: &[Position], _validity: PreviewValidity) {}

    /// `slot` is `None` when no turn is active.
    fn on_turn_display_changed(&mut self, _slot: Option<ClientSlot>, _remaining_seconds: u32) {}

    /// Only user-facing errors are surfaced.
    fn on_error_surfaced(&mut self, _error: &SyncError) {}

    fn on_notice(&mut self, _notice: Notice) {}
}

/// Handle returned by observer registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(pub(crate) u64);
