//! Optimistic placement preview with confirm/reject/rollback.
//!
//! ```text
//! Idle ──select──▶ PreviewActive ──confirm──▶ Confirmed ──server answer──▶ Idle
//!                       │  ▲
//!                       └──┘ select again (replaces)
//!                       └──cancel / turn lost──▶ Idle
//! ```
//!
//! The preview is a UX hint. The predictor never writes the board: whatever
//! the server places is applied by the reconciler even when the local oracle
//! disagreed.

use std::time::Instant;

use tracing::debug;

use crate::blocks::BlockShape;
use crate::board::{BoardGrid, Position};
use crate::dedup::{InFlightKey, RequestDeduplicator};
use crate::error::PredictionError;
use crate::events::PlacementRequest;
use crate::ports::LegalityOracle;
use crate::slot::ClientSlot;
use crate::turn::TurnCoordinator;

/// A selected, unconfirmed placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPreview {
    pub shape: BlockShape,
    pub anchor: Position,
    /// Board cells the piece would cover.
    pub cells: Vec<Position>,
    /// The oracle's verdict at selection time.
    pub locally_valid: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PredictorState {
    #[default]
    Idle,
    PreviewActive(PendingPreview),
    /// Sent; no placement input until the server answers.
    Confirmed {
        request: PlacementRequest,
        key: InFlightKey,
    },
}

#[derive(Debug)]
pub struct PlacementPredictor {
    local_slot: ClientSlot,
    state: PredictorState,
}

impl PlacementPredictor {
    pub fn new(local_slot: ClientSlot) -> Self {
        Self {
            local_slot,
            state: PredictorState::Idle,
        }
    }

    pub fn state(&self) -> &PredictorState {
        &self.state
    }

    pub fn preview(&self) -> Option<&PendingPreview> {
        match &self.state {
            PredictorState::PreviewActive(preview) => Some(preview),
            _ => None,
        }
    }

    pub fn is_awaiting_server(&self) -> bool {
        matches!(self.state, PredictorState::Confirmed { .. })
    }

    /// Selects `shape` at `anchor`, replacing any current preview.
    ///
    /// Refused while a confirmed placement is pending or when the local turn
    /// is not open. Refusal leaves the current preview untouched.
    pub fn select_for_preview(
        &mut self,
        shape: BlockShape,
        anchor: Position,
        turn: &TurnCoordinator,
        oracle: &impl LegalityOracle,
        grid: &BoardGrid,
        now: Instant,
    ) -> Result<&PendingPreview, PredictionError> {
        if self.is_awaiting_server() {
            return Err(PredictionError::AwaitingServer);
        }
        if !turn.local_turn_open(now) {
            return Err(PredictionError::NotLocalTurn);
        }

        let locally_valid = oracle.can_place(&shape, anchor, grid);
        let cells = shape.footprint(anchor);
        debug!(?shape, ?anchor, locally_valid, "preview selected");

        self.state = PredictorState::PreviewActive(PendingPreview {
            shape,
            anchor,
            cells,
            locally_valid,
        });
        self.preview().ok_or(PredictionError::NoActivePreview)
    }

    /// Turns the active preview into a [`PlacementRequest`] and claims its
    /// in-flight key.
    ///
    /// The turn is re-checked here: if it ran out since selection the preview
    /// is dropped and [`PredictionError::StaleTurnAttempt`] is returned.
    pub fn confirm(
        &mut self,
        turn: &TurnCoordinator,
        dedup: &mut RequestDeduplicator,
        now: Instant,
    ) -> Result<PlacementRequest, PredictionError> {
        let preview = match &self.state {
            PredictorState::Idle => return Err(PredictionError::NoActivePreview),
            PredictorState::Confirmed { .. } => return Err(PredictionError::DuplicateSubmission),
            PredictorState::PreviewActive(preview) => preview,
        };

        if !turn.local_turn_open(now) {
            debug!("confirm after local turn closed; dropping preview");
            self.state = PredictorState::Idle;
            return Err(PredictionError::StaleTurnAttempt);
        }
        if !preview.locally_valid {
            return Err(PredictionError::LocallyInvalid);
        }

        let request = PlacementRequest::new(self.local_slot, preview.shape, preview.anchor);
        let key = InFlightKey::placement(self.local_slot, preview.anchor, preview.shape.block_type);
        if !dedup.try_begin(key, now) {
            return Err(PredictionError::DuplicateSubmission);
        }

        debug!(?request, "placement confirmed");
        self.state = PredictorState::Confirmed { request, key };
        Ok(request)
    }

    /// Discards the active preview.
    pub fn cancel(&mut self) -> Result<(), PredictionError> {
        match self.state {
            PredictorState::PreviewActive(_) => {
                self.state = PredictorState::Idle;
                Ok(())
            }
            PredictorState::Idle => Err(PredictionError::NoActivePreview),
            PredictorState::Confirmed { .. } => Err(PredictionError::AwaitingServer),
        }
    }

    /// Any authoritative placement clears local state unconditionally.
    /// Returns the previous state so the caller can release keys and redraw.
    pub fn on_authoritative_placement(&mut self) -> PredictorState {
        std::mem::take(&mut self.state)
    }

    /// Server refused the placement: roll back to `Idle`. Returns the
    /// in-flight key of the refused request, if one was pending.
    pub fn on_rejected(&mut self) -> Option<InFlightKey> {
        match std::mem::take(&mut self.state) {
            PredictorState::Confirmed { key, .. } => Some(key),
            _ => None,
        }
    }

    /// The local turn ended. Drops an unconfirmed preview; a confirmed
    /// placement keeps waiting for the server. Returns whether a preview was
    /// dropped.
    pub fn on_turn_lost(&mut self) -> bool {
        if matches!(self.state, PredictorState::PreviewActive(_)) {
            self.state = PredictorState::Idle;
            true
        } else {
            false
        }
    }

    /// A turn change arrived while a confirmed placement was still waiting.
    /// The server has moved on, so the placement is abandoned and its key
    /// returned for release. Previews are left alone.
    pub fn release_confirmed(&mut self) -> Option<InFlightKey> {
        match &self.state {
            PredictorState::Confirmed { key, .. } => {
                let key = *key;
                self.state = PredictorState::Idle;
                Some(key)
            }
            _ => None,
        }
    }

    /// Back to `Idle`, whatever the state. Returns whether anything was
    /// showing.
    pub fn reset(&mut self) -> bool {
        !matches!(std::mem::take(&mut self.state), PredictorState::Idle)
    }
}
