//! Turn ownership, the countdown, and timeout-driven auto-pass.
//!
//! The coordinator never advances the turn itself: only the server's
//! turn-change broadcast does. When the local deadline passes it reports
//! [`TurnSignal::LocalTurnExpired`] once, and if no broadcast follows within
//! the grace window it reports [`TurnSignal::DesyncDetected`] once.
//!
//! Time is passed in as `now` everywhere. The countdown is derived from the
//! deadline, not from tick counts, so skipped ticks are harmless.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::dedup::{InFlightKey, RequestDeduplicator};
use crate::slot::ClientSlot;

/// Default wait after local expiry before declaring a desync.
pub const DEFAULT_TURN_GRACE: Duration = Duration::from_secs(5);

/// Default turn length when the server omits it.
pub const DEFAULT_TURN_DURATION: Duration = Duration::from_secs(30);

/// Longest turn a deadline is armed for. Larger server values are capped.
pub const MAX_TURN_DURATION: Duration = Duration::from_secs(60 * 60);

// ---------------------------------------------------------------------------
// TurnPhase / TurnSignal
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    WaitingForStart,
    /// Game running. Whose turn it is lives in the coordinator and stays
    /// unset until the first authoritative turn change.
    TurnActive,
    Ended { winner: Option<ClientSlot> },
}

/// What the coordinator wants the session to act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnSignal {
    /// Whole-second countdown changed.
    DisplayChanged {
        slot: Option<ClientSlot>,
        remaining_seconds: u32,
    },
    /// The turn that just ended timed out.
    PreviousTurnTimedOut { previous: Option<ClientSlot> },
    /// The local deadline passed. Fires once per deadline.
    LocalTurnExpired,
    /// No turn change arrived within the grace window. Fires once per
    /// deadline.
    DesyncDetected { waited: Duration },
}

/// Converts a server seconds value, treating negative or non-finite values
/// as zero.
pub fn seconds_to_duration(secs: f32) -> Duration {
    Duration::try_from_secs_f32(secs).unwrap_or(Duration::ZERO)
}

fn whole_seconds(remaining: Duration) -> u32 {
    remaining.as_secs_f32().ceil() as u32
}

// ---------------------------------------------------------------------------
// TurnCoordinator
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct TurnCoordinator {
    local_slot: ClientSlot,
    phase: TurnPhase,
    current: Option<ClientSlot>,
    turn_number: u32,
    turn_duration: Duration,
    deadline: Option<Instant>,
    /// Latched when `LocalTurnExpired` fires; cleared by the next turn change.
    expired_at: Option<Instant>,
    desync_reported: bool,
    grace: Duration,
    last_displayed: Option<u32>,
}

impl TurnCoordinator {
    pub fn new(local_slot: ClientSlot, grace: Duration) -> Self {
        Self {
            local_slot,
            phase: TurnPhase::WaitingForStart,
            current: None,
            turn_number: 0,
            turn_duration: DEFAULT_TURN_DURATION,
            deadline: None,
            expired_at: None,
            desync_reported: false,
            grace,
            last_displayed: None,
        }
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub fn local_slot(&self) -> ClientSlot {
        self.local_slot
    }

    /// Slot whose turn it is, if any.
    pub fn current_slot(&self) -> Option<ClientSlot> {
        self.current
    }

    pub fn turn_number(&self) -> u32 {
        self.turn_number
    }

    pub fn turn_duration(&self) -> Duration {
        self.turn_duration
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left on the current turn, zero once the deadline passes.
    pub fn remaining(&self, now: Instant) -> Duration {
        self.deadline
            .map_or(Duration::ZERO, |deadline| deadline.saturating_duration_since(now))
    }

    /// True iff the game is running and the current turn belongs to the
    /// local slot.
    pub fn is_local_players_turn(&self) -> bool {
        self.phase == TurnPhase::TurnActive && self.current == Some(self.local_slot)
    }

    /// [`Self::is_local_players_turn`] and the deadline has not passed yet.
    /// Gate for accepting placement input.
    pub fn local_turn_open(&self, now: Instant) -> bool {
        self.is_local_players_turn() && self.deadline.is_some_and(|deadline| now < deadline)
    }

    pub fn on_game_started(&mut self) {
        info!(local = %self.local_slot, "game started");
        self.phase = TurnPhase::TurnActive;
        self.clear_turn();
        self.turn_number = 0;
    }

    /// Applies an authoritative turn change and re-arms the countdown.
    ///
    /// Ignored once the game has ended. A turn change before the game start
    /// event starts the game implicitly.
    pub fn on_turn_changed(
        &mut self,
        slot: ClientSlot,
        turn_duration: Duration,
        remaining: Duration,
        previous_timed_out: bool,
        turn_number: u32,
        now: Instant,
    ) -> Vec<TurnSignal> {
        match self.phase {
            TurnPhase::Ended { .. } => {
                debug!(%slot, "ignoring turn change after game end");
                return Vec::new();
            }
            TurnPhase::WaitingForStart => {
                debug!(%slot, "turn change before game start; starting implicitly");
                self.phase = TurnPhase::TurnActive;
            }
            TurnPhase::TurnActive => {}
        }

        if remaining > MAX_TURN_DURATION || turn_duration > MAX_TURN_DURATION {
            warn!(?remaining, ?turn_duration, "capping oversized turn timing");
        }
        let remaining = remaining.min(MAX_TURN_DURATION);
        let previous = self.current.replace(slot);
        self.turn_number = turn_number;
        self.turn_duration = turn_duration.min(MAX_TURN_DURATION);
        self.deadline = Some(now.checked_add(remaining).unwrap_or(now));
        self.expired_at = None;
        self.desync_reported = false;

        let remaining_seconds = whole_seconds(remaining);
        self.last_displayed = Some(remaining_seconds);
        debug!(%slot, turn_number, remaining_seconds, "turn changed");

        let mut signals = Vec::with_capacity(2);
        if previous_timed_out {
            signals.push(TurnSignal::PreviousTurnTimedOut { previous });
        }
        signals.push(TurnSignal::DisplayChanged {
            slot: Some(slot),
            remaining_seconds,
        });
        signals
    }

    /// Polled once per frame.
    pub fn tick(&mut self, now: Instant) -> Vec<TurnSignal> {
        let mut signals = Vec::new();
        if self.phase != TurnPhase::TurnActive {
            return signals;
        }
        let Some(deadline) = self.deadline else {
            return signals;
        };

        let remaining_seconds = whole_seconds(deadline.saturating_duration_since(now));
        if self.last_displayed != Some(remaining_seconds) {
            self.last_displayed = Some(remaining_seconds);
            signals.push(TurnSignal::DisplayChanged {
                slot: self.current,
                remaining_seconds,
            });
        }

        if now >= deadline && self.current == Some(self.local_slot) && self.expired_at.is_none() {
            info!(local = %self.local_slot, "local turn expired");
            self.expired_at = Some(now);
            signals.push(TurnSignal::LocalTurnExpired);
        }

        if let Some(expired_at) = self.expired_at
            && !self.desync_reported
            && now.saturating_duration_since(expired_at) >= self.grace
        {
            let waited = now.saturating_duration_since(deadline);
            warn!(?waited, "no turn change after local expiry");
            self.desync_reported = true;
            signals.push(TurnSignal::DesyncDetected { waited });
        }

        signals
    }

    /// Claims the pass key for the expired local turn. Returns `true` if the
    /// caller should send the pass; the turn itself is not advanced.
    pub fn on_local_turn_expired(&self, dedup: &mut RequestDeduplicator, now: Instant) -> bool {
        dedup.try_begin(InFlightKey::pass(self.local_slot), now)
    }

    /// Disables all further turn input.
    pub fn on_game_ended(&mut self, winner: Option<ClientSlot>) {
        info!(?winner, "game ended");
        self.phase = TurnPhase::Ended { winner };
        self.clear_turn();
    }

    /// Back to waiting for a game (room leave, disconnect).
    pub fn reset(&mut self) {
        self.phase = TurnPhase::WaitingForStart;
        self.clear_turn();
        self.turn_number = 0;
    }

    fn clear_turn(&mut self) {
        self.current = None;
        self.deadline = None;
        self.expired_at = None;
        self.desync_reported = false;
        self.last_displayed = None;
    }
}
