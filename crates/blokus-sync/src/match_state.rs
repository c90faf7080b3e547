//! Room roster and per-player match bookkeeping.
//!
//! Created on room join and dropped on leave. Turn ownership is not kept
//! here; the [`TurnCoordinator`](crate::turn::TurnCoordinator) owns it.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::blocks::PLAYER_BLOCK_COUNT;
use crate::slot::{ClientSlot, MAX_PLAYERS};

/// One seated player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub user_id: String,
    pub display_name: String,
    pub ready: bool,
    pub is_host: bool,
    pub score: u32,
    pub remaining_blocks: u32,
}

impl PlayerInfo {
    fn new(user_id: String, display_name: String) -> Self {
        Self {
            user_id,
            display_name,
            ready: false,
            is_host: false,
            score: 0,
            remaining_blocks: PLAYER_BLOCK_COUNT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchState {
    room_id: String,
    players: [Option<PlayerInfo>; MAX_PLAYERS],
    game_started: bool,
}

impl MatchState {
    pub fn new(room_id: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            players: Default::default(),
            game_started: false,
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn is_game_started(&self) -> bool {
        self.game_started
    }

    pub fn player(&self, slot: ClientSlot) -> Option<&PlayerInfo> {
        self.players[slot.index()].as_ref()
    }

    /// Seated players in slot order.
    pub fn players(&self) -> impl Iterator<Item = (ClientSlot, &PlayerInfo)> {
        ClientSlot::all().filter_map(|slot| self.player(slot).map(|info| (slot, info)))
    }

    pub fn player_count(&self) -> usize {
        self.players.iter().flatten().count()
    }

    pub fn host(&self) -> Option<ClientSlot> {
        self.players()
            .find(|(_, info)| info.is_host)
            .map(|(slot, _)| slot)
    }

    /// Seats a player, replacing whoever held the slot. The first player in
    /// an empty room becomes host.
    pub fn seat_player(
        &mut self,
        slot: ClientSlot,
        user_id: impl Into<String>,
        display_name: impl Into<String>,
    ) {
        let mut info = PlayerInfo::new(user_id.into(), display_name.into());
        let replaced = self.players[slot.index()].take();
        let had_host = replaced.as_ref().is_some_and(|p| p.is_host);
        if self.host().is_none() {
            info.is_host = had_host || !self.game_started;
        }
        debug!(%slot, user = %info.user_id, host = info.is_host, "player seated");
        self.players[slot.index()] = Some(info);
    }

    /// Frees a slot. If the host left, the lowest occupied slot inherits.
    pub fn remove_player(&mut self, slot: ClientSlot) -> Option<PlayerInfo> {
        let removed = self.players[slot.index()].take()?;
        if removed.is_host
            && let Some(next) = self.players.iter_mut().flatten().next()
        {
            next.is_host = true;
            debug!(user = %next.user_id, "host migrated");
        }
        Some(removed)
    }

    pub fn set_ready(&mut self, slot: ClientSlot, ready: bool) -> bool {
        match self.players[slot.index()].as_mut() {
            Some(info) => {
                info.ready = ready;
                true
            }
            None => {
                warn!(%slot, "ready change for empty slot");
                false
            }
        }
    }

    /// Makes `slot` the only host. Ignored for an empty slot.
    pub fn set_host(&mut self, slot: ClientSlot) -> bool {
        if self.players[slot.index()].is_none() {
            warn!(%slot, "host change to empty slot");
            return false;
        }
        for (index, player) in self.players.iter_mut().enumerate() {
            if let Some(info) = player {
                info.is_host = index == slot.index();
            }
        }
        true
    }

    /// Overwrites totals with the server's.
    pub fn apply_scores(&mut self, scores: &[(ClientSlot, u32)]) {
        for &(slot, score) in scores {
            if let Some(info) = self.players[slot.index()].as_mut() {
                info.score = score;
            }
        }
    }

    /// One accepted placement: one block fewer, `score_gained` more points.
    pub fn record_placement(&mut self, slot: ClientSlot, score_gained: u32) {
        if let Some(info) = self.players[slot.index()].as_mut() {
            info.remaining_blocks = info.remaining_blocks.saturating_sub(1);
            info.score += score_gained;
        }
    }

    pub fn start_game(&mut self) {
        self.reset_for_new_game();
        self.game_started = true;
    }

    /// Readiness is cleared so the room can ready up again.
    pub fn end_game(&mut self) {
        self.game_started = false;
        for info in self.players.iter_mut().flatten() {
            info.ready = false;
        }
    }

    /// Fresh scores and blocks for everyone seated.
    pub fn reset_for_new_game(&mut self) {
        self.game_started = false;
        for info in self.players.iter_mut().flatten() {
            info.score = 0;
            info.remaining_blocks = PLAYER_BLOCK_COUNT;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(i: usize) -> ClientSlot {
        ClientSlot::new(i).unwrap()
    }

    fn hosts(state: &MatchState) -> usize {
        state.players().filter(|(_, p)| p.is_host).count()
    }

    #[test]
    fn test_first_player_becomes_host() {
        let mut state = MatchState::new("room-1");
        state.seat_player(slot(2), "u2", "Bea");
        state.seat_player(slot(0), "u0", "Al");
        assert_eq!(state.host(), Some(slot(2)));
        assert_eq!(hosts(&state), 1);
    }

    #[test]
    fn test_host_migrates_to_lowest_slot() {
        let mut state = MatchState::new("room-1");
        state.seat_player(slot(1), "u1", "A");
        state.seat_player(slot(3), "u3", "B");
        state.seat_player(slot(2), "u2", "C");

        let removed = state.remove_player(slot(1)).unwrap();
        assert!(removed.is_host);
        assert_eq!(state.host(), Some(slot(2)));
        assert_eq!(hosts(&state), 1);
    }

    #[test]
    fn test_last_player_leaving_empties_room() {
        let mut state = MatchState::new("room-1");
        state.seat_player(slot(0), "u0", "A");
        state.remove_player(slot(0));
        assert_eq!(state.player_count(), 0);
        assert_eq!(state.host(), None);
        assert!(state.remove_player(slot(0)).is_none());
    }

    #[test]
    fn test_set_host_is_exclusive() {
        let mut state = MatchState::new("room-1");
        state.seat_player(slot(0), "u0", "A");
        state.seat_player(slot(1), "u1", "B");
        assert!(state.set_host(slot(1)));
        assert_eq!(state.host(), Some(slot(1)));
        assert_eq!(hosts(&state), 1);
        assert!(!state.set_host(slot(3)));
    }

    #[test]
    fn test_placement_and_scores() {
        let mut state = MatchState::new("room-1");
        state.seat_player(slot(0), "u0", "A");
        state.start_game();
        state.record_placement(slot(0), 5);
        state.record_placement(slot(0), 1);

        let info = state.player(slot(0)).unwrap();
        assert_eq!(info.score, 6);
        assert_eq!(info.remaining_blocks, PLAYER_BLOCK_COUNT - 2);

        state.apply_scores(&[(slot(0), 40), (slot(3), 9)]);
        assert_eq!(state.player(slot(0)).unwrap().score, 40);
    }

    #[test]
    fn test_game_lifecycle_resets_counters() {
        let mut state = MatchState::new("room-1");
        state.seat_player(slot(0), "u0", "A");
        state.set_ready(slot(0), true);
        state.start_game();
        assert!(state.is_game_started());
        state.record_placement(slot(0), 4);

        state.end_game();
        assert!(!state.is_game_started());
        assert!(!state.player(slot(0)).unwrap().ready);

        state.start_game();
        let info = state.player(slot(0)).unwrap();
        assert_eq!(info.score, 0);
        assert_eq!(info.remaining_blocks, PLAYER_BLOCK_COUNT);
    }

    #[test]
    fn test_ready_on_empty_slot_rejected() {
        let mut state = MatchState::new("room-1");
        assert!(!state.set_ready(slot(1), true));
    }
}
