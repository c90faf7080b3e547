//! The match session: owner of every synchronization component for one
//! room, and the single entry point for server events, local input, and the
//! clock.
//!
//! All calls are serialized by the caller; nothing here is shared across
//! threads. Server slots are translated to [`ClientSlot`]s exactly once, in
//! [`MatchSession::handle`].

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::blocks::BlockShape;
use crate::board::{BoardGrid, BoardReconciler, CellChange, CellOwner, Position, decode_server_grid};
use crate::dedup::{DEFAULT_DEDUP_TTL, InFlightKey, Operation, RequestDeduplicator};
use crate::error::{DisconnectReason, PredictionError, RejectionReason, SyncError};
use crate::events::{
    LocalInput, Notice, PlacementRequest, PreviewValidity, SeatInfo, ServerEvent, UiEvent,
};
use crate::match_state::MatchState;
use crate::ports::{LegalityOracle, MatchObserver, ObserverId, Transport};
use crate::predictor::{PlacementPredictor, PredictorState};
use crate::slot::{ClientSlot, SlotColorMapper};
use crate::turn::{
    DEFAULT_TURN_DURATION, DEFAULT_TURN_GRACE, TurnCoordinator, TurnPhase, TurnSignal,
    seconds_to_duration,
};

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Timing knobs for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Wait after the local turn expires before forcing a resync.
    pub turn_grace: Duration,
    /// Lifetime of an unanswered in-flight request.
    pub dedup_ttl: Duration,
    /// Turn length used when a turn change omits it.
    pub default_turn_duration: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            turn_grace: DEFAULT_TURN_GRACE,
            dedup_ttl: DEFAULT_DEDUP_TTL,
            default_turn_duration: DEFAULT_TURN_DURATION,
        }
    }
}

// ---------------------------------------------------------------------------
// MatchSession
// ---------------------------------------------------------------------------

pub struct MatchSession<T: Transport, L: LegalityOracle> {
    config: SessionConfig,
    mapper: SlotColorMapper,
    local_slot: ClientSlot,
    state: MatchState,
    board: BoardReconciler,
    turn: TurnCoordinator,
    predictor: PlacementPredictor,
    dedup: RequestDeduplicator,
    transport: T,
    oracle: L,
    observers: Vec<(ObserverId, Box<dyn MatchObserver>)>,
    next_observer_id: u64,
    closed: bool,
}

impl<T: Transport, L: LegalityOracle> MatchSession<T, L> {
    /// Creates the session for a room the local player has joined in
    /// `local_server_slot` (server numbering).
    pub fn join(
        room_id: impl Into<String>,
        local_server_slot: i64,
        config: SessionConfig,
        transport: T,
        oracle: L,
    ) -> Result<Self, SyncError> {
        let mapper = SlotColorMapper;
        let local_slot = mapper.to_client(local_server_slot)?;
        let state = MatchState::new(room_id);
        info!(room = %state.room_id(), local = %local_slot, "joined room");

        Ok(Self {
            config,
            mapper,
            local_slot,
            state,
            board: BoardReconciler::new(),
            turn: TurnCoordinator::new(local_slot, config.turn_grace),
            predictor: PlacementPredictor::new(local_slot),
            dedup: RequestDeduplicator::new(config.dedup_ttl),
            transport,
            oracle,
            observers: Vec::new(),
            next_observer_id: 0,
            closed: false,
        })
    }

    // -- accessors ----------------------------------------------------------

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn local_slot(&self) -> ClientSlot {
        self.local_slot
    }

    pub fn mapper(&self) -> &SlotColorMapper {
        &self.mapper
    }

    pub fn board(&self) -> &BoardGrid {
        self.board.grid()
    }

    pub fn match_state(&self) -> &MatchState {
        &self.state
    }

    pub fn turn(&self) -> &TurnCoordinator {
        &self.turn
    }

    pub fn predictor(&self) -> &PlacementPredictor {
        &self.predictor
    }

    pub fn dedup(&self) -> &RequestDeduplicator {
        &self.dedup
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn oracle(&self) -> &L {
        &self.oracle
    }

    pub fn is_local_players_turn(&self) -> bool {
        self.turn.is_local_players_turn()
    }

    /// Set after leave or disconnect; every later call is a no-op.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    // -- observers ----------------------------------------------------------

    pub fn register_observer(&mut self, observer: Box<dyn MatchObserver>) -> ObserverId {
        let id = ObserverId(self.next_observer_id);
        self.next_observer_id += 1;
        self.observers.push((id, observer));
        id
    }

    /// Removes and returns the observer, if still registered.
    pub fn unregister_observer(&mut self, id: ObserverId) -> Option<Box<dyn MatchObserver>> {
        let index = self.observers.iter().position(|(oid, _)| *oid == id)?;
        Some(self.observers.remove(index).1)
    }

    // -- server events ------------------------------------------------------

    /// Applies one authoritative event.
    ///
    /// Errors are the locally recovered kind (invalid slot, malformed
    /// snapshot): the event was dropped and any needed resync was already
    /// requested. User-facing failures go to observers instead.
    pub fn handle(&mut self, event: ServerEvent, now: Instant) -> Result<(), SyncError> {
        if self.closed {
            debug!(?event, "session closed; ignoring event");
            return Ok(());
        }

        match event {
            ServerEvent::RoomJoined { room_id, players } => self.on_room_joined(room_id, &players),
            ServerEvent::PlayerJoined {
                slot,
                user_id,
                display_name,
            } => {
                let slot = self.client_slot(slot)?;
                self.state.seat_player(slot, user_id, display_name);
                Ok(())
            }
            ServerEvent::PlayerLeft { slot } => {
                let slot = self.client_slot(slot)?;
                self.state.remove_player(slot);
                Ok(())
            }
            ServerEvent::PlayerReady { slot, ready } => {
                let slot = self.client_slot(slot)?;
                self.state.set_ready(slot, ready);
                Ok(())
            }
            ServerEvent::HostChanged { slot } => {
                let slot = self.client_slot(slot)?;
                self.state.set_host(slot);
                Ok(())
            }
            ServerEvent::GameStarted => {
                self.on_game_started();
                Ok(())
            }
            ServerEvent::TurnChanged {
                slot,
                turn_time_seconds,
                remaining_seconds,
                previous_turn_timed_out,
                turn_number,
            } => {
                let slot = self.client_slot(slot)?;
                let duration = turn_time_seconds
                    .map(seconds_to_duration)
                    .unwrap_or(self.config.default_turn_duration);
                self.on_turn_changed(
                    slot,
                    duration,
                    seconds_to_duration(remaining_seconds),
                    previous_turn_timed_out,
                    turn_number,
                    now,
                );
                Ok(())
            }
            ServerEvent::BoardSnapshot { grid } => self.on_board_snapshot(&grid, now),
            ServerEvent::CellsPlaced {
                slot,
                block,
                cells,
                score_gained,
            } => {
                let slot = self.client_slot(slot)?;
                let gained = score_gained
                    .or(block.map(|b| b.cell_count() as u32))
                    .unwrap_or(cells.len() as u32);
                self.on_cells_placed(slot, &cells, gained);
                Ok(())
            }
            ServerEvent::PlacementRejected { code } => {
                self.on_placement_rejected(RejectionReason::classify(&code));
                Ok(())
            }
            ServerEvent::ScoresUpdated { scores } => {
                let scores = scores
                    .into_iter()
                    .map(|(slot, score)| Ok((self.client_slot(slot)?, score)))
                    .collect::<Result<Vec<_>, SyncError>>()?;
                self.state.apply_scores(&scores);
                Ok(())
            }
            ServerEvent::GameEnded { winner } => {
                self.on_game_ended(winner);
                Ok(())
            }
            ServerEvent::Disconnected { code } => {
                self.on_disconnected(DisconnectReason::classify(&code));
                Ok(())
            }
            ServerEvent::RoomLeft => {
                self.leave();
                Ok(())
            }
        }
    }

    fn client_slot(&self, server_slot: i64) -> Result<ClientSlot, SyncError> {
        self.mapper.to_client(server_slot).map_err(|err| {
            warn!(%err, "dropping event with invalid slot");
            SyncError::from(err)
        })
    }

    fn on_room_joined(&mut self, room_id: String, players: &[SeatInfo]) -> Result<(), SyncError> {
        let mut state = MatchState::new(room_id);
        let mut host = None;
        for seat in players {
            let slot = self.client_slot(seat.slot)?;
            state.seat_player(slot, seat.user_id.clone(), seat.display_name.clone());
            state.set_ready(slot, seat.ready);
            if seat.is_host {
                host = Some(slot);
            }
        }
        if let Some(host) = host {
            state.set_host(host);
        }
        info!(room = %state.room_id(), players = state.player_count(), "room roster received");
        self.state = state;
        Ok(())
    }

    fn on_game_started(&mut self) {
        info!(room = %self.state.room_id(), "game started");
        self.state.start_game();
        let cleared = self.board.reset();
        self.emit_cells(cleared);
        if self.predictor.reset() {
            self.emit(UiEvent::preview_cleared());
        }
        self.dedup.clear();
        self.turn.on_game_started();
        self.emit(UiEvent::Notice(Notice::GameStarted));
    }

    fn on_turn_changed(
        &mut self,
        slot: ClientSlot,
        duration: Duration,
        remaining: Duration,
        previous_timed_out: bool,
        turn_number: u32,
        now: Instant,
    ) {
        if self.state.player(slot).is_none() {
            warn!(%slot, "turn given to an empty seat");
        }
        self.dedup.end(&InFlightKey::pass(self.local_slot));
        if self.turn.phase() == TurnPhase::WaitingForStart {
            self.state.start_game();
        }

        let signals = self.turn.on_turn_changed(
            slot,
            duration,
            remaining,
            previous_timed_out,
            turn_number,
            now,
        );
        if let Some(key) = self.predictor.release_confirmed() {
            debug!(%slot, "turn moved on with the placement unanswered");
            self.dedup.end(&key);
            self.emit(UiEvent::preview_cleared());
        }
        if slot != self.local_slot && self.predictor.on_turn_lost() {
            self.emit(UiEvent::preview_cleared());
        }
        self.dispatch_turn_signals(signals, now);
    }

    fn on_board_snapshot(&mut self, grid: &[Vec<i32>], now: Instant) -> Result<(), SyncError> {
        self.dedup.end(&InFlightKey::resync(self.local_slot));
        let applied = decode_server_grid(grid, &self.mapper)
            .and_then(|cells| self.board.apply_full_snapshot(&cells));
        match applied {
            Ok(changes) => {
                self.emit_cells(changes);
                Ok(())
            }
            Err(err) => {
                warn!(%err, "rejecting board snapshot");
                self.request_resync(now);
                Err(err.into())
            }
        }
    }

    fn on_cells_placed(&mut self, slot: ClientSlot, cells: &[Position], score_gained: u32) {
        let owner = CellOwner::Slot(slot);
        let updates: Vec<_> = cells.iter().map(|&position| (position, owner)).collect();
        let changes = self.board.apply_cell_updates(&updates);

        match self.predictor.on_authoritative_placement() {
            PredictorState::Idle => {}
            PredictorState::PreviewActive(_) => self.emit(UiEvent::preview_cleared()),
            PredictorState::Confirmed { key, .. } => {
                self.dedup.end(&key);
                self.emit(UiEvent::preview_cleared());
            }
        }
        if slot == self.local_slot {
            self.dedup.end_matching(Operation::Placement, self.local_slot);
        }
        debug!(%slot, cells = cells.len(), changed = changes.len(), "placement applied");
        self.emit_cells(changes);
        self.state.record_placement(slot, score_gained);
    }

    fn on_placement_rejected(&mut self, reason: RejectionReason) {
        info!(?reason, "placement rejected by server");
        match self.predictor.on_rejected() {
            Some(key) => {
                self.dedup.end(&key);
            }
            None => {
                self.dedup.end_matching(Operation::Placement, self.local_slot);
            }
        }
        self.emit(UiEvent::preview_cleared());
        self.surface(SyncError::PlacementRejectedByServer(reason));
    }

    fn on_game_ended(&mut self, winner: Option<i64>) {
        let winner = match winner {
            None | Some(0) => None,
            Some(server_slot) => match self.mapper.to_client(server_slot) {
                Ok(slot) => Some(slot),
                Err(err) => {
                    warn!(%err, "ignoring invalid winner slot");
                    None
                }
            },
        };

        self.turn.on_game_ended(winner);
        self.state.end_game();
        if self.predictor.reset() {
            self.emit(UiEvent::preview_cleared());
        }
        self.dedup.clear();
        self.emit(UiEvent::TurnDisplayChanged {
            slot: None,
            remaining_seconds: 0,
        });
        self.emit(UiEvent::Notice(Notice::GameEnded { winner }));
    }

    fn on_disconnected(&mut self, reason: DisconnectReason) {
        info!(?reason, room = %self.state.room_id(), "disconnected");
        self.teardown();
        self.surface(SyncError::Disconnected(reason));
    }

    /// Leaves the room: cancels timers, drops in-flight keys, clears the
    /// board. The session is closed afterwards.
    pub fn leave(&mut self) {
        if self.closed {
            return;
        }
        info!(room = %self.state.room_id(), "leaving room");
        self.teardown();
    }

    fn teardown(&mut self) {
        if self.predictor.reset() {
            self.emit(UiEvent::preview_cleared());
        }
        self.dedup.clear();
        self.turn.reset();
        self.board.reset();
        self.state = MatchState::new(self.state.room_id().to_owned());
        self.closed = true;
    }

    // -- local input --------------------------------------------------------

    /// Shows `shape` at `anchor` as a preview, tinted by the oracle's verdict.
    pub fn select_for_preview(
        &mut self,
        shape: BlockShape,
        anchor: Position,
        now: Instant,
    ) -> Result<(), PredictionError> {
        if self.closed {
            return Err(PredictionError::SessionClosed);
        }
        let preview = self.predictor.select_for_preview(
            shape,
            anchor,
            &self.turn,
            &self.oracle,
            self.board.grid(),
            now,
        )?;
        let validity = if preview.locally_valid {
            PreviewValidity::Valid
        } else {
            PreviewValidity::Invalid
        };
        let cells = preview.cells.clone();
        self.emit(UiEvent::PreviewChanged { cells, validity });
        Ok(())
    }

    /// Sends the active preview. At most one network call per preview.
    pub fn confirm(&mut self, now: Instant) -> Result<PlacementRequest, PredictionError> {
        if self.closed {
            return Err(PredictionError::SessionClosed);
        }
        match self.predictor.confirm(&self.turn, &mut self.dedup, now) {
            Ok(request) => {
                info!(?request, "submitting placement");
                self.transport.submit_placement(&request);
                Ok(request)
            }
            Err(PredictionError::StaleTurnAttempt) => {
                debug!("confirm arrived after the turn closed; dropped");
                self.emit(UiEvent::preview_cleared());
                Err(PredictionError::StaleTurnAttempt)
            }
            Err(err) => {
                debug!(%err, "confirm refused");
                Err(err)
            }
        }
    }

    pub fn cancel(&mut self) -> Result<(), PredictionError> {
        if self.closed {
            return Err(PredictionError::SessionClosed);
        }
        self.predictor.cancel()?;
        self.emit(UiEvent::preview_cleared());
        Ok(())
    }

    /// Routes a recorded [`LocalInput`].
    pub fn apply_local_input(&mut self, input: &LocalInput, now: Instant) -> Result<(), PredictionError> {
        match *input {
            LocalInput::Select {
                block,
                rotation,
                flip,
                anchor,
            } => self.select_for_preview(BlockShape::new(block).oriented(rotation, flip), anchor, now),
            LocalInput::Confirm => self.confirm(now).map(|_| ()),
            LocalInput::Cancel => self.cancel(),
        }
    }

    // -- clock --------------------------------------------------------------

    /// Advances the countdown, auto-passes an expired local turn, forces a
    /// resync after the grace window, and expires stale in-flight keys.
    pub fn tick(&mut self, now: Instant) {
        if self.closed {
            return;
        }
        self.dedup.sweep(now);
        let signals = self.turn.tick(now);
        self.dispatch_turn_signals(signals, now);
    }

    /// Asks the server for a full snapshot unless one is already pending.
    pub fn request_resync(&mut self, now: Instant) -> bool {
        if self.closed || !self.dedup.try_begin(InFlightKey::resync(self.local_slot), now) {
            return false;
        }
        info!("requesting full resync");
        self.transport.request_resync();
        true
    }

    fn dispatch_turn_signals(&mut self, signals: Vec<TurnSignal>, now: Instant) {
        for signal in signals {
            match signal {
                TurnSignal::DisplayChanged {
                    slot,
                    remaining_seconds,
                } => self.emit(UiEvent::TurnDisplayChanged {
                    slot,
                    remaining_seconds,
                }),
                TurnSignal::PreviousTurnTimedOut { previous } => {
                    self.emit(UiEvent::Notice(Notice::PreviousTurnTimedOut { previous }));
                }
                TurnSignal::LocalTurnExpired => {
                    if self.predictor.on_turn_lost() {
                        self.emit(UiEvent::preview_cleared());
                    }
                    if self.turn.on_local_turn_expired(&mut self.dedup, now) {
                        info!("auto-passing expired turn");
                        self.transport.submit_pass();
                    } else {
                        debug!("pass already in flight");
                    }
                }
                TurnSignal::DesyncDetected { waited } => {
                    warn!(?waited, "turn desync detected");
                    self.surface(SyncError::DesyncDetected { waited });
                    self.request_resync(now);
                }
            }
        }
    }

    // -- fan-out ------------------------------------------------------------

    fn surface(&mut self, error: SyncError) {
        if error.is_user_facing() {
            self.emit(UiEvent::ErrorSurfaced(error));
        } else {
            debug!(%error, "recovered locally");
        }
    }

    fn emit_cells(&mut self, changes: Vec<CellChange>) {
        for change in changes {
            self.emit(UiEvent::CellVisualChanged {
                position: change.position,
                owner: change.owner,
            });
        }
    }

    fn emit(&mut self, event: UiEvent) {
        for (_, observer) in &mut self.observers {
            match &event {
                UiEvent::CellVisualChanged { position, owner } => {
                    observer.on_cell_visual_changed(*position, *owner)
                }
                UiEvent::PreviewChanged { cells, validity } => {
                    observer.on_preview_changed(cells, *validity)
                }
                UiEvent::TurnDisplayChanged {
                    slot,
                    remaining_seconds,
                } => observer.on_turn_display_changed(*slot, *remaining_seconds),
                UiEvent::ErrorSurfaced(error) => observer.on_error_surfaced(error),
                UiEvent::Notice(notice) => observer.on_notice(*notice),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::blocks::BlockType;
    use crate::board::BOARD_SIZE;
    use crate::events::OutboundRequest;

    // -- doubles --------------------------------------------------------------

    #[derive(Clone, Default)]
    struct RecordingTransport(Rc<RefCell<Vec<OutboundRequest>>>);

    impl Transport for RecordingTransport {
        fn submit_placement(&mut self, request: &PlacementRequest) {
            self.0.borrow_mut().push(OutboundRequest::Placement(*request));
        }
        fn submit_pass(&mut self) {
            self.0.borrow_mut().push(OutboundRequest::Pass);
        }
        fn request_resync(&mut self) {
            self.0.borrow_mut().push(OutboundRequest::Resync);
        }
    }

    impl RecordingTransport {
        fn count(&self, wanted: fn(&OutboundRequest) -> bool) -> usize {
            self.0.borrow().iter().filter(|r| wanted(r)).count()
        }
    }

    #[derive(Clone, Default)]
    struct RecordingObserver(Rc<RefCell<Vec<UiEvent>>>);

    impl MatchObserver for RecordingObserver {
        fn on_cell_visual_changed(&mut self, position: Position, owner: CellOwner) {
            self.0
                .borrow_mut()
                .push(UiEvent::CellVisualChanged { position, owner });
        }
        fn on_preview_changed(&mut self, cells: &[Position], validity: PreviewValidity) {
            self.0.borrow_mut().push(UiEvent::PreviewChanged {
                cells: cells.to_vec(),
                validity,
            });
        }
        fn on_error_surfaced(&mut self, error: &SyncError) {
            self.0.borrow_mut().push(UiEvent::ErrorSurfaced(error.clone()));
        }
    }

    impl RecordingObserver {
        fn cell_events(&self) -> usize {
            self.0
                .borrow()
                .iter()
                .filter(|e| matches!(e, UiEvent::CellVisualChanged { .. }))
                .count()
        }
        fn take(&self) -> Vec<UiEvent> {
            std::mem::take(&mut *self.0.borrow_mut())
        }
    }

    fn permissive(_: &BlockShape, _: Position, _: &BoardGrid) -> bool {
        true
    }

    type TestSession = MatchSession<RecordingTransport, fn(&BlockShape, Position, &BoardGrid) -> bool>;

    fn session(local_server_slot: i64) -> (TestSession, RecordingTransport, RecordingObserver) {
        let transport = RecordingTransport::default();
        let observer = RecordingObserver::default();
        let mut session = MatchSession::join(
            "room-7",
            local_server_slot,
            SessionConfig::default(),
            transport.clone(),
            permissive as fn(&BlockShape, Position, &BoardGrid) -> bool,
        )
        .unwrap();
        session.register_observer(Box::new(observer.clone()));
        (session, transport, observer)
    }

    fn turn_to(server_slot: i64, remaining: f32) -> ServerEvent {
        ServerEvent::TurnChanged {
            slot: server_slot,
            turn_time_seconds: Some(30.0),
            remaining_seconds: remaining,
            previous_turn_timed_out: false,
            turn_number: 1,
        }
    }

    fn empty_raw() -> Vec<Vec<i32>> {
        vec![vec![0; BOARD_SIZE]; BOARD_SIZE]
    }

    // -- tests ---------------------------------------------------------------

    #[test]
    fn test_join_rejects_invalid_local_slot() {
        let result = MatchSession::join(
            "room",
            0,
            SessionConfig::default(),
            RecordingTransport::default(),
            permissive as fn(&BlockShape, Position, &BoardGrid) -> bool,
        );
        assert_eq!(result.err(), Some(SyncError::InvalidSlot(0)));
    }

    #[test]
    fn test_single_cell_snapshot_change() {
        let now = Instant::now();
        let (mut session, _, observer) = session(1);
        session.handle(ServerEvent::GameStarted, now).unwrap();
        session
            .handle(ServerEvent::BoardSnapshot { grid: empty_raw() }, now)
            .unwrap();
        observer.take();

        let mut next = empty_raw();
        next[3][5] = 2;
        session
            .handle(ServerEvent::BoardSnapshot { grid: next }, now)
            .unwrap();

        let slot1 = CellOwner::Slot(ClientSlot::new(1).unwrap());
        assert_eq!(session.board().get(Position::new(3, 5)), Some(slot1));
        assert_eq!(
            observer.take(),
            vec![UiEvent::CellVisualChanged {
                position: Position::new(3, 5),
                owner: slot1
            }]
        );
    }

    #[test]
    fn test_cells_placed_ignores_local_preview() {
        let now = Instant::now();
        let (mut session, _, observer) = session(1);
        session.handle(ServerEvent::GameStarted, now).unwrap();
        session.handle(turn_to(1, 30.0), now).unwrap();
        session
            .select_for_preview(BlockShape::new(BlockType::Single), Position::new(0, 0), now)
            .unwrap();

        let cells = vec![Position::new(5, 5), Position::new(5, 6), Position::new(5, 7)];
        session
            .handle(
                ServerEvent::CellsPlaced {
                    slot: 3,
                    block: Some(BlockType::TrioLine),
                    cells: cells.clone(),
                    score_gained: None,
                },
                now,
            )
            .unwrap();

        let slot2 = CellOwner::Slot(ClientSlot::new(2).unwrap());
        for cell in &cells {
            assert_eq!(session.board().get(*cell), Some(slot2));
        }
        assert!(session.board().is_free(Position::new(0, 0)));
        assert_eq!(session.predictor().state(), &PredictorState::Idle);
        assert_eq!(observer.cell_events(), 3);
    }

    #[test]
    fn test_zero_remaining_local_turn_passes_once() {
        let now = Instant::now();
        let (mut session, transport, _) = session(1);
        session.handle(ServerEvent::GameStarted, now).unwrap();
        session
            .handle(
                ServerEvent::TurnChanged {
                    slot: 1,
                    turn_time_seconds: Some(60.0),
                    remaining_seconds: 0.0,
                    previous_turn_timed_out: false,
                    turn_number: 1,
                },
                now,
            )
            .unwrap();

        for frame in 0..120 {
            session.tick(now + Duration::from_millis(frame * 16));
        }
        assert_eq!(transport.count(|r| *r == OutboundRequest::Pass), 1);
    }

    #[test]
    fn test_zero_remaining_remote_turn_is_not_local() {
        let now = Instant::now();
        let (mut session, transport, _) = session(1);
        session.handle(ServerEvent::GameStarted, now).unwrap();
        session.handle(turn_to(2, 0.0), now).unwrap();
        assert!(!session.is_local_players_turn());
        session.tick(now + Duration::from_secs(1));
        assert_eq!(transport.count(|r| *r == OutboundRequest::Pass), 0);
    }

    #[test]
    fn test_double_confirm_submits_once() {
        let now = Instant::now();
        let (mut session, transport, _) = session(2);
        session.handle(ServerEvent::GameStarted, now).unwrap();
        session.handle(turn_to(2, 30.0), now).unwrap();
        session
            .select_for_preview(BlockShape::new(BlockType::TetroO), Position::new(0, 0), now)
            .unwrap();

        assert!(session.confirm(now).is_ok());
        assert_eq!(
            session.confirm(now),
            Err(PredictionError::DuplicateSubmission)
        );
        assert_eq!(
            transport.count(|r| matches!(r, OutboundRequest::Placement(_))),
            1
        );
    }

    #[test]
    fn test_rejection_clears_preview_and_leaves_board() {
        let now = Instant::now();
        let (mut session, _, observer) = session(1);
        session.handle(ServerEvent::GameStarted, now).unwrap();
        session.handle(turn_to(1, 30.0), now).unwrap();
        session
            .select_for_preview(BlockShape::new(BlockType::Domino), Position::new(0, 0), now)
            .unwrap();
        session.confirm(now).unwrap();
        observer.take();

        session
            .handle(
                ServerEvent::PlacementRejected {
                    code: "CELL_OCCUPIED".into(),
                },
                now,
            )
            .unwrap();

        assert_eq!(session.predictor().state(), &PredictorState::Idle);
        assert_eq!(session.board(), &BoardGrid::empty());
        assert!(session.dedup().is_empty());
        let events = observer.take();
        assert!(events.contains(&UiEvent::ErrorSurfaced(
            SyncError::PlacementRejectedByServer(RejectionReason::Occupied)
        )));
        assert_eq!(observer.cell_events(), 0);
    }

    #[test]
    fn test_malformed_snapshot_requests_resync() {
        let now = Instant::now();
        let (mut session, transport, _) = session(1);
        let short = vec![vec![0; BOARD_SIZE]; 3];

        let result = session.handle(ServerEvent::BoardSnapshot { grid: short.clone() }, now);
        assert_eq!(
            result,
            Err(SyncError::MalformedBoardState { rows: 3, cols: 20 })
        );
        // The follow-up snapshot ended the first resync key, so a second bad
        // snapshot asks again.
        let _ = session.handle(ServerEvent::BoardSnapshot { grid: short }, now);
        assert_eq!(transport.count(|r| *r == OutboundRequest::Resync), 2);
    }

    #[test]
    fn test_invalid_slot_event_is_dropped() {
        let now = Instant::now();
        let (mut session, _, _) = session(1);
        assert_eq!(
            session.handle(turn_to(5, 30.0), now),
            Err(SyncError::InvalidSlot(5))
        );
        assert_eq!(session.turn().current_slot(), None);
    }

    #[test]
    fn test_desync_forces_resync() {
        let now = Instant::now();
        let (mut session, transport, _) = session(1);
        session.handle(ServerEvent::GameStarted, now).unwrap();
        session.handle(turn_to(1, 1.0), now).unwrap();

        session.tick(now + Duration::from_secs(1));
        session.tick(now + Duration::from_secs(7));
        session.tick(now + Duration::from_secs(8));
        assert_eq!(transport.count(|r| *r == OutboundRequest::Pass), 1);
        assert_eq!(transport.count(|r| *r == OutboundRequest::Resync), 1);
    }

    #[test]
    fn test_disconnect_is_terminal() {
        let now = Instant::now();
        let (mut session, transport, observer) = session(1);
        session.handle(ServerEvent::GameStarted, now).unwrap();
        session.handle(turn_to(1, 30.0), now).unwrap();
        session
            .handle(
                ServerEvent::Disconnected {
                    code: "DUPLICATE_USER_IP".into(),
                },
                now,
            )
            .unwrap();

        assert!(session.is_closed());
        assert!(observer.take().contains(&UiEvent::ErrorSurfaced(SyncError::Disconnected(
            DisconnectReason::DuplicateLogin
        ))));
        assert_eq!(
            session.select_for_preview(BlockShape::new(BlockType::Single), Position::new(0, 0), now),
            Err(PredictionError::SessionClosed)
        );
        session.tick(now + Duration::from_secs(60));
        assert!(transport.0.borrow().is_empty());
    }

    #[test]
    fn test_unregistered_observer_stops_receiving() {
        let now = Instant::now();
        let (mut session, _, observer) = session(1);
        let second = RecordingObserver::default();
        let id = session.register_observer(Box::new(second.clone()));
        assert!(session.unregister_observer(id).is_some());
        assert!(session.unregister_observer(id).is_none());

        session.handle(ServerEvent::GameStarted, now).unwrap();
        let mut raw = empty_raw();
        raw[0][0] = 1;
        session.handle(ServerEvent::BoardSnapshot { grid: raw }, now).unwrap();
        assert_eq!(observer.cell_events(), 1);
        assert_eq!(second.cell_events(), 0);
    }

    #[test]
    fn test_roster_events() {
        let now = Instant::now();
        let (mut session, _, _) = session(1);
        session
            .handle(
                ServerEvent::RoomJoined {
                    room_id: "room-9".into(),
                    players: vec![
                        SeatInfo {
                            slot: 1,
                            user_id: "a".into(),
                            display_name: "Ann".into(),
                            ready: true,
                            is_host: false,
                        },
                        SeatInfo {
                            slot: 2,
                            user_id: "b".into(),
                            display_name: "Ben".into(),
                            ready: false,
                            is_host: true,
                        },
                    ],
                },
                now,
            )
            .unwrap();

        let state = session.match_state();
        assert_eq!(state.room_id(), "room-9");
        assert_eq!(state.host(), Some(ClientSlot::new(1).unwrap()));
        assert!(state.player(ClientSlot::new(0).unwrap()).unwrap().ready);

        session.handle(ServerEvent::PlayerLeft { slot: 2 }, now).unwrap();
        assert_eq!(
            session.match_state().host(),
            Some(ClientSlot::new(0).unwrap())
        );
    }

    #[test]
    fn test_unanswered_placement_released_by_turn_change() {
        let now = Instant::now();
        let (mut session, transport, _) = session(1);
        session.handle(ServerEvent::GameStarted, now).unwrap();
        session.handle(turn_to(1, 30.0), now).unwrap();
        session
            .select_for_preview(BlockShape::new(BlockType::Single), Position::new(0, 0), now)
            .unwrap();
        session.confirm(now).unwrap();

        // No CellsPlaced or rejection ever arrives for that placement.
        let later = now + Duration::from_secs(31);
        session
            .handle(
                ServerEvent::TurnChanged {
                    slot: 2,
                    turn_time_seconds: Some(30.0),
                    remaining_seconds: 30.0,
                    previous_turn_timed_out: true,
                    turn_number: 2,
                },
                later,
            )
            .unwrap();
        assert_eq!(session.predictor().state(), &PredictorState::Idle);
        assert!(session.dedup().is_empty());

        session.tick(now + Duration::from_secs(51));
        let back = now + Duration::from_secs(61);
        session.handle(turn_to(1, 30.0), back).unwrap();
        session
            .select_for_preview(BlockShape::new(BlockType::Single), Position::new(0, 0), back)
            .unwrap();
        session.confirm(back).unwrap();
        assert_eq!(
            transport.count(|r| matches!(r, OutboundRequest::Placement(_))),
            2
        );
    }

    #[test]
    fn test_remote_placement_releases_local_pending_key() {
        let now = Instant::now();
        let (mut session, _, _) = session(1);
        session.handle(ServerEvent::GameStarted, now).unwrap();
        session.handle(turn_to(1, 30.0), now).unwrap();
        session
            .select_for_preview(BlockShape::new(BlockType::Domino), Position::new(0, 0), now)
            .unwrap();
        session.confirm(now).unwrap();
        assert_eq!(session.dedup().len(), 1);

        session
            .handle(
                ServerEvent::CellsPlaced {
                    slot: 3,
                    block: Some(BlockType::Single),
                    cells: vec![Position::new(19, 0)],
                    score_gained: None,
                },
                now,
            )
            .unwrap();
        assert_eq!(session.predictor().state(), &PredictorState::Idle);
        assert!(session.dedup().is_empty());
    }

    #[test]
    fn test_huge_remaining_seconds_does_not_panic() {
        let now = Instant::now();
        let (mut session, _, _) = session(1);
        session.handle(ServerEvent::GameStarted, now).unwrap();
        session.handle(turn_to(2, 1.0e19), now).unwrap();
        assert_eq!(
            session.turn().deadline(),
            Some(now + crate::turn::MAX_TURN_DURATION)
        );
        session.tick(now + Duration::from_secs(1));
    }
}
