//! Scripted match replay: feeds a timed list of server events and local
//! inputs through a [`MatchSession`] on a synthetic clock.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::{Duration, Instant};

use blokus_config::GameConfig;
use blokus_sync::{
    BlockShape, BoardGrid, CellOwner, ClientSlot, LegalityOracle, LocalInput, MatchObserver,
    MatchSession, Notice, OutboundRequest, PlacementRequest, Position, PreviewValidity,
    ServerEvent, SessionConfig, SyncError, Transport,
};
use serde::Deserialize;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("failed to read script {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse script: {0}")]
    Parse(#[from] ron::error::SpannedError),
    #[error("failed to start session: {0}")]
    Session(#[from] SyncError),
}

// ---------------------------------------------------------------------------
// Script format
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub enum ScriptStep {
    Server(ServerEvent),
    Local(LocalInput),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScriptEntry {
    /// Offset from replay start.
    pub at_ms: u64,
    pub step: ScriptStep,
}

/// A whole replay file.
#[derive(Debug, Clone, Deserialize)]
pub struct Script {
    pub room_id: String,
    /// Local player's seat, server numbering.
    pub local_slot: i64,
    /// Extra clock time after the last step, so trailing timeouts can fire.
    #[serde(default)]
    pub run_out_ms: u64,
    pub steps: Vec<ScriptEntry>,
}

impl Script {
    pub fn load(path: &Path) -> Result<Self, ReplayError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ReplayError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, ReplayError> {
        Ok(ron::from_str(contents)?)
    }
}

/// Typed session timing from the `game` config section. Unusable values
/// fall back to the session defaults.
pub fn session_config(game: &GameConfig) -> SessionConfig {
    let defaults = SessionConfig::default();
    let secs = |value: f32, fallback: Duration| {
        Duration::try_from_secs_f32(value).unwrap_or(fallback)
    };
    SessionConfig {
        turn_grace: secs(game.turn_grace_seconds, defaults.turn_grace),
        dedup_ttl: secs(game.dedup_ttl_seconds, defaults.dedup_ttl),
        default_turn_duration: Duration::from_secs(u64::from(game.default_turn_seconds)),
    }
}

// ---------------------------------------------------------------------------
// Stand-in collaborators
// ---------------------------------------------------------------------------

/// Logs and records every outbound request instead of sending it.
#[derive(Debug, Default)]
pub struct LoggingTransport {
    sent: Vec<OutboundRequest>,
}

impl LoggingTransport {
    fn count(&self, wanted: impl Fn(&OutboundRequest) -> bool) -> usize {
        self.sent.iter().filter(|r| wanted(r)).count()
    }
}

impl Transport for LoggingTransport {
    fn submit_placement(&mut self, request: &PlacementRequest) {
        info!(
            slot = %request.slot,
            block = ?request.block_type,
            row = request.anchor.row,
            col = request.anchor.col,
            "-> placement"
        );
        self.sent.push(OutboundRequest::Placement(*request));
    }

    fn submit_pass(&mut self) {
        info!("-> pass");
        self.sent.push(OutboundRequest::Pass);
    }

    fn request_resync(&mut self) {
        info!("-> resync");
        self.sent.push(OutboundRequest::Resync);
    }
}

/// Accepts any footprint that lies on the board over empty cells. Corner
/// and edge rules are not checked.
#[derive(Debug, Default, Clone, Copy)]
pub struct OccupancyOracle;

impl LegalityOracle for OccupancyOracle {
    fn can_place(&self, shape: &BlockShape, anchor: Position, grid: &BoardGrid) -> bool {
        shape.footprint(anchor).into_iter().all(|cell| grid.is_free(cell))
    }
}

/// Traces UI events and keeps the surfaced errors for the summary.
struct TracingObserver {
    surfaced: Rc<RefCell<Vec<SyncError>>>,
}

impl MatchObserver for TracingObserver {
    fn on_cell_visual_changed(&mut self, position: Position, owner: CellOwner) {
        debug!(row = position.row, col = position.col, ?owner, "cell");
    }

    fn on_preview_changed(&mut self, cells: &[Position], validity: PreviewValidity) {
        debug!(cells = cells.len(), ?validity, "preview");
    }

    fn on_turn_display_changed(&mut self, slot: Option<ClientSlot>, remaining_seconds: u32) {
        debug!(?slot, remaining_seconds, "countdown");
    }

    fn on_error_surfaced(&mut self, error: &SyncError) {
        warn!(%error, message = error.user_message().unwrap_or_default(), "surfaced to player");
        self.surfaced.borrow_mut().push(error.clone());
    }

    fn on_notice(&mut self, notice: Notice) {
        info!(?notice, "notice");
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplaySummary {
    pub steps: usize,
    pub ticks: u64,
    pub placements: usize,
    pub passes: usize,
    pub resyncs: usize,
    /// Server events dropped as invalid.
    pub dropped_events: usize,
    /// Local inputs the session refused.
    pub refused_inputs: usize,
    pub surfaced_errors: Vec<SyncError>,
    pub occupied_cells: usize,
}

/// Runs `script` to completion, ticking the session at `tick_rate_hz`
/// between steps.
pub fn run_script(
    script: &Script,
    config: SessionConfig,
    tick_rate_hz: u32,
) -> Result<ReplaySummary, ReplayError> {
    let start = Instant::now();
    let tick = Duration::from_secs(1) / tick_rate_hz.max(1);
    let surfaced = Rc::new(RefCell::new(Vec::new()));

    let mut session = MatchSession::join(
        script.room_id.as_str(),
        script.local_slot,
        config,
        LoggingTransport::default(),
        OccupancyOracle,
    )?;
    session.register_observer(Box::new(TracingObserver {
        surfaced: Rc::clone(&surfaced),
    }));

    let mut summary = ReplaySummary::default();
    let mut clock = Duration::ZERO;
    let mut advance_to = |session: &mut MatchSession<LoggingTransport, OccupancyOracle>,
                          target: Duration,
                          ticks: &mut u64| {
        while clock + tick <= target {
            clock += tick;
            session.tick(start + clock);
            *ticks += 1;
        }
        clock = clock.max(target);
        start + clock
    };

    for entry in &script.steps {
        let now = advance_to(
            &mut session,
            Duration::from_millis(entry.at_ms),
            &mut summary.ticks,
        );
        match &entry.step {
            ScriptStep::Server(event) => {
                if let Err(err) = session.handle(event.clone(), now) {
                    warn!(%err, at_ms = entry.at_ms, "server event dropped");
                    summary.dropped_events += 1;
                }
            }
            ScriptStep::Local(input) => {
                if let Err(err) = session.apply_local_input(input, now) {
                    info!(%err, at_ms = entry.at_ms, "input refused");
                    summary.refused_inputs += 1;
                }
            }
        }
        session.tick(now);
        summary.steps += 1;
    }

    let end = script.steps.last().map_or(0, |entry| entry.at_ms) + script.run_out_ms;
    advance_to(&mut session, Duration::from_millis(end), &mut summary.ticks);

    let transport = session.transport();
    summary.placements = transport.count(|r| matches!(r, OutboundRequest::Placement(_)));
    summary.passes = transport.count(|r| *r == OutboundRequest::Pass);
    summary.resyncs = transport.count(|r| *r == OutboundRequest::Resync);
    summary.occupied_cells = session
        .board()
        .iter()
        .filter(|(_, owner)| !owner.is_empty())
        .count();
    summary.surfaced_errors = surfaced.borrow().clone();
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use blokus_sync::{DisconnectReason, RejectionReason};

    use super::*;

    const SAMPLE: &str = include_str!("../scripts/sample.ron");

    #[test]
    fn test_sample_script_parses() {
        let script = Script::parse(SAMPLE).unwrap();
        assert_eq!(script.local_slot, 1);
        assert!(!script.steps.is_empty());
    }

    #[test]
    fn test_sample_script_replays() {
        let script = Script::parse(SAMPLE).unwrap();
        let summary = run_script(&script, SessionConfig::default(), 60).unwrap();

        assert_eq!(summary.steps, script.steps.len());
        assert_eq!(summary.placements, 2);
        assert_eq!(summary.passes, 1);
        assert_eq!(summary.dropped_events, 0);
        assert_eq!(
            summary.surfaced_errors,
            vec![
                SyncError::PlacementRejectedByServer(RejectionReason::Occupied),
                SyncError::Disconnected(DisconnectReason::Timeout),
            ]
        );
    }

    #[test]
    fn test_timeout_in_run_out_passes_once() {
        let script = Script::parse(
            r#"(
                room_id: "r",
                local_slot: 2,
                run_out_ms: 3000,
                steps: [
                    (at_ms: 0, step: Server(GameStarted)),
                    (at_ms: 0, step: Server(TurnChanged(slot: 2, remaining_seconds: 1.0))),
                ],
            )"#,
        )
        .unwrap();
        let summary = run_script(&script, SessionConfig::default(), 30).unwrap();
        assert_eq!(summary.passes, 1);
        assert_eq!(summary.resyncs, 0);
        assert!(summary.ticks >= 89);
    }

    #[test]
    fn test_invalid_local_slot_fails() {
        let script = Script::parse(r#"(room_id: "r", local_slot: 9, steps: [])"#).unwrap();
        assert!(matches!(
            run_script(&script, SessionConfig::default(), 60),
            Err(ReplayError::Session(SyncError::InvalidSlot(9)))
        ));
    }

    #[test]
    fn test_session_config_from_game_section() {
        let mut game = GameConfig::default();
        game.turn_grace_seconds = 2.5;
        game.dedup_ttl_seconds = -1.0;
        let config = session_config(&game);
        assert_eq!(config.turn_grace, Duration::from_millis(2_500));
        assert_eq!(config.dedup_ttl, SessionConfig::default().dedup_ttl);
        assert_eq!(config.default_turn_duration, Duration::from_secs(30));
    }

    #[test]
    fn test_occupancy_oracle() {
        let grid = BoardGrid::empty();
        let oracle = OccupancyOracle;
        let bar = BlockShape::new(blokus_sync::BlockType::PentoI);
        assert!(oracle.can_place(&bar, Position::new(0, 15), &grid));
        assert!(!oracle.can_place(&bar, Position::new(0, 16), &grid));
    }
}
