//! Error taxonomy for match synchronization.
//!
//! [`SyncError`] has one variant per failure class. Reconciliation and slot
//! mapping failures are recovered locally (resync or drop); server rejections
//! and disconnects are always surfaced to the player with a reason-coded
//! message. [`SyncError::is_user_facing`] encodes that split.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::board::BoardError;
use crate::slot::SlotError;

// ---------------------------------------------------------------------------
// RejectionReason
// ---------------------------------------------------------------------------

/// Why the server refused a placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RejectionReason {
    /// At least one target cell is already taken.
    Occupied,
    /// The shape breaks the corner/edge placement rules or leaves the board.
    InvalidGeometry,
    /// The placement arrived outside the sender's turn.
    NotYourTurn,
}

impl RejectionReason {
    /// Maps a raw server error code to a reason. Unknown codes are treated
    /// as geometry failures, the server's generic invalid-move answer.
    pub fn classify(server_code: &str) -> Self {
        let code = server_code.trim().to_ascii_uppercase();
        if code.contains("NOT_YOUR_TURN") || code.contains("NOT_MY_TURN") {
            RejectionReason::NotYourTurn
        } else if code.contains("OCCUPIED") {
            RejectionReason::Occupied
        } else {
            RejectionReason::InvalidGeometry
        }
    }

    /// Message shown to the player.
    pub fn user_message(self) -> &'static str {
        match self {
            RejectionReason::Occupied => "That space is already taken.",
            RejectionReason::InvalidGeometry => {
                "That piece can't go there. It must touch one of your corners and no edges."
            }
            RejectionReason::NotYourTurn => "It's not your turn.",
        }
    }
}

// ---------------------------------------------------------------------------
// DisconnectReason
// ---------------------------------------------------------------------------

/// Why the connection to the match ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisconnectReason {
    /// Token expired, invalid, or refused.
    Auth,
    /// The same account logged in from somewhere else.
    DuplicateLogin,
    /// The server stopped hearing from us.
    Timeout,
    /// The server failed internally.
    ServerError,
    /// Transport-level loss, or anything the server did not name.
    Network,
}

impl DisconnectReason {
    /// Maps a raw server disconnect code to a reason.
    pub fn classify(server_code: &str) -> Self {
        match server_code.trim().to_ascii_uppercase().as_str() {
            "DUPLICATE_USER_IP" | "DUPLICATE_LOGIN" => DisconnectReason::DuplicateLogin,
            "TOKEN_EXPIRED" | "INVALID_TOKEN" | "AUTHENTICATION_FAILED" | "UNAUTHORIZED" => {
                DisconnectReason::Auth
            }
            "TIMEOUT" => DisconnectReason::Timeout,
            "SERVER_ERROR" => DisconnectReason::ServerError,
            _ => DisconnectReason::Network,
        }
    }

    /// Message shown to the player before they are routed back out.
    pub fn user_message(self) -> &'static str {
        match self {
            DisconnectReason::Auth => "Your session has expired. Please log in again.",
            DisconnectReason::DuplicateLogin => {
                "This account was signed in from another device."
            }
            DisconnectReason::Timeout => "The connection to the server timed out.",
            DisconnectReason::ServerError => "The server ran into a problem and closed the match.",
            DisconnectReason::Network => "Lost connection to the server.",
        }
    }
}

// ---------------------------------------------------------------------------
// SyncError
// ---------------------------------------------------------------------------

/// Every failure class the synchronization core can produce.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// A snapshot did not have board dimensions.
    #[error("malformed board state ({rows} rows, widest row {cols})")]
    MalformedBoardState {
        /// Rows received.
        rows: usize,
        /// Widest row received.
        cols: usize,
    },
    /// A server slot outside `1..=4`.
    #[error("invalid slot {0}")]
    InvalidSlot(i64),
    /// Confirm attempted after the local turn already ran out.
    #[error("turn expired before the placement was confirmed")]
    StaleTurnAttempt,
    /// The server refused a placement.
    #[error("placement rejected: {0:?}")]
    PlacementRejectedByServer(RejectionReason),
    /// The same request is already in flight.
    #[error("duplicate submission dropped")]
    DuplicateSubmission,
    /// No turn broadcast arrived within the grace window after expiry.
    #[error("no turn change {waited:?} after local turn expired")]
    DesyncDetected {
        /// Time since the deadline when the desync was declared.
        waited: Duration,
    },
    /// The connection ended.
    #[error("disconnected: {0:?}")]
    Disconnected(DisconnectReason),
}

impl SyncError {
    /// Whether this error is shown to the player rather than recovered
    /// silently.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            SyncError::PlacementRejectedByServer(_) | SyncError::Disconnected(_)
        )
    }

    /// Player-facing text, for user-facing errors.
    pub fn user_message(&self) -> Option<&'static str> {
        match self {
            SyncError::PlacementRejectedByServer(reason) => Some(reason.user_message()),
            SyncError::Disconnected(reason) => Some(reason.user_message()),
            _ => None,
        }
    }
}

impl From<SlotError> for SyncError {
    fn from(err: SlotError) -> Self {
        SyncError::InvalidSlot(err.raw_value())
    }
}

impl From<BoardError> for SyncError {
    fn from(err: BoardError) -> Self {
        match err {
            BoardError::Malformed { rows, cols } => SyncError::MalformedBoardState { rows, cols },
            BoardError::InvalidCell { value, .. } => SyncError::InvalidSlot(i64::from(value)),
        }
    }
}

// ---------------------------------------------------------------------------
// PredictionError
// ---------------------------------------------------------------------------

/// Why a local placement input was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PredictionError {
    /// Input arrived while another player (or nobody) holds the turn.
    #[error("not the local player's turn")]
    NotLocalTurn,
    /// A confirmed placement is still waiting for the server.
    #[error("waiting for the server to answer the last placement")]
    AwaitingServer,
    /// Confirm or cancel with nothing selected.
    #[error("no placement preview is active")]
    NoActivePreview,
    /// The legality oracle rejected the previewed placement.
    #[error("previewed placement is not legal")]
    LocallyInvalid,
    /// The turn ran out between selection and confirmation.
    #[error("turn expired before confirmation")]
    StaleTurnAttempt,
    /// An identical placement is already in flight.
    #[error("identical placement already in flight")]
    DuplicateSubmission,
    /// The session was torn down.
    #[error("match session is closed")]
    SessionClosed,
}

impl PredictionError {
    /// The taxonomy class, where one exists. Pure input refusals
    /// (wrong turn, nothing selected) are not sync failures.
    pub fn as_sync_error(self) -> Option<SyncError> {
        match self {
            PredictionError::StaleTurnAttempt => Some(SyncError::StaleTurnAttempt),
            PredictionError::DuplicateSubmission => Some(SyncError::DuplicateSubmission),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnect_classification() {
        assert_eq!(
            DisconnectReason::classify("DUPLICATE_USER_IP"),
            DisconnectReason::DuplicateLogin
        );
        for code in ["TOKEN_EXPIRED", "INVALID_TOKEN", "AUTHENTICATION_FAILED", "unauthorized"] {
            assert_eq!(DisconnectReason::classify(code), DisconnectReason::Auth, "{code}");
        }
        assert_eq!(DisconnectReason::classify("TIMEOUT"), DisconnectReason::Timeout);
        assert_eq!(DisconnectReason::classify("SERVER_ERROR"), DisconnectReason::ServerError);
        assert_eq!(DisconnectReason::classify("socket closed"), DisconnectReason::Network);
    }

    #[test]
    fn test_rejection_classification() {
        assert_eq!(RejectionReason::classify("CELL_OCCUPIED"), RejectionReason::Occupied);
        assert_eq!(RejectionReason::classify("not_your_turn"), RejectionReason::NotYourTurn);
        assert_eq!(
            RejectionReason::classify("RESULT_INVALID_MOVE"),
            RejectionReason::InvalidGeometry
        );
    }

    #[test]
    fn test_every_disconnect_has_specific_message() {
        let reasons = [
            DisconnectReason::Auth,
            DisconnectReason::DuplicateLogin,
            DisconnectReason::Timeout,
            DisconnectReason::ServerError,
            DisconnectReason::Network,
        ];
        let mut messages: Vec<_> = reasons.iter().map(|r| r.user_message()).collect();
        messages.sort_unstable();
        messages.dedup();
        assert_eq!(messages.len(), reasons.len());
    }

    #[test]
    fn test_user_facing_split() {
        assert!(SyncError::PlacementRejectedByServer(RejectionReason::Occupied).is_user_facing());
        assert!(SyncError::Disconnected(DisconnectReason::Timeout).is_user_facing());
        assert!(!SyncError::StaleTurnAttempt.is_user_facing());
        assert!(!SyncError::DuplicateSubmission.is_user_facing());
        assert!(!SyncError::MalformedBoardState { rows: 3, cols: 3 }.is_user_facing());
        assert_eq!(SyncError::InvalidSlot(9).user_message(), None);
    }

    #[test]
    fn test_component_errors_convert() {
        assert_eq!(
            SyncError::from(SlotError::InvalidServerSlot(5)),
            SyncError::InvalidSlot(5)
        );
        assert_eq!(
            SyncError::from(BoardError::Malformed { rows: 19, cols: 20 }),
            SyncError::MalformedBoardState { rows: 19, cols: 20 }
        );
        assert_eq!(
            PredictionError::StaleTurnAttempt.as_sync_error(),
            Some(SyncError::StaleTurnAttempt)
        );
        assert_eq!(PredictionError::NotLocalTurn.as_sync_error(), None);
    }
}
