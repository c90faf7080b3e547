//! In-flight request guard.
//!
//! Each outbound request is keyed by [`InFlightKey`]. While a key is in
//! flight, identical requests are dropped. Keys are ended by the matching
//! authoritative response, and otherwise expire after a TTL so a lost
//! response can never lock the player out.

use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::blocks::BlockType;
use crate::board::Position;
use crate::slot::ClientSlot;

/// Default lifetime of an unanswered key.
pub const DEFAULT_DEDUP_TTL: Duration = Duration::from_secs(10);

/// Kind of outbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    Placement,
    Pass,
    Resync,
}

/// Composite identity of a submission: operation, slot, and for placements
/// the anchor and piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InFlightKey {
    pub operation: Operation,
    pub slot: ClientSlot,
    pub anchor: Option<Position>,
    pub block: Option<BlockType>,
}

impl InFlightKey {
    pub fn placement(slot: ClientSlot, anchor: Position, block: BlockType) -> Self {
        Self {
            operation: Operation::Placement,
            slot,
            anchor: Some(anchor),
            block: Some(block),
        }
    }

    pub fn pass(slot: ClientSlot) -> Self {
        Self {
            operation: Operation::Pass,
            slot,
            anchor: None,
            block: None,
        }
    }

    pub fn resync(slot: ClientSlot) -> Self {
        Self {
            operation: Operation::Resync,
            slot,
            anchor: None,
            block: None,
        }
    }
}

/// Tracks in-flight keys with their expiry instants.
#[derive(Debug)]
pub struct RequestDeduplicator {
    in_flight: FxHashMap<InFlightKey, Instant>,
    ttl: Duration,
}

impl Default for RequestDeduplicator {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_TTL)
    }
}

impl RequestDeduplicator {
    pub fn new(ttl: Duration) -> Self {
        Self {
            in_flight: FxHashMap::default(),
            ttl,
        }
    }

    /// Claims `key`. Returns `false` if it is already in flight and not yet
    /// expired; the caller must then drop the request.
    pub fn try_begin(&mut self, key: InFlightKey, now: Instant) -> bool {
        if let Some(&until) = self.in_flight.get(&key)
            && until > now
        {
            debug!(?key, "dropping duplicate submission");
            return false;
        }
        self.in_flight.insert(key, now + self.ttl);
        true
    }

    /// Releases `key` on success or failure. Returns whether it was held.
    pub fn end(&mut self, key: &InFlightKey) -> bool {
        self.in_flight.remove(key).is_some()
    }

    /// Releases `key` regardless of its state. Alias of [`Self::end`] kept
    /// separate so call sites that bypass the normal response path stand out.
    pub fn force_clear(&mut self, key: &InFlightKey) -> bool {
        trace!(?key, "force-clearing in-flight key");
        self.end(key)
    }

    /// Releases every key of `operation` held for `slot`.
    pub fn end_matching(&mut self, operation: Operation, slot: ClientSlot) -> usize {
        let before = self.in_flight.len();
        self.in_flight
            .retain(|key, _| !(key.operation == operation && key.slot == slot));
        before - self.in_flight.len()
    }

    /// Drops expired keys. Returns how many were removed.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let before = self.in_flight.len();
        self.in_flight.retain(|_, until| *until > now);
        let expired = before - self.in_flight.len();
        if expired > 0 {
            debug!(expired, "expired stale in-flight keys");
        }
        expired
    }

    /// Whether `key` is currently held (ignoring expiry).
    pub fn is_in_flight(&self, key: &InFlightKey) -> bool {
        self.in_flight.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }

    /// Releases everything (room leave, disconnect).
    pub fn clear(&mut self) {
        self.in_flight.clear();
    }
}
