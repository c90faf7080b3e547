//! Translation between the server's 1-based color slots and the client's
//! 0-based slot indices.
//!
//! The server numbers players `1..=4` (0 means "nobody"); the client indexes
//! its arrays `0..=3`. Every conversion goes through [`SlotColorMapper`] so
//! no component does its own `+ 1` / `- 1`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Maximum number of seats in a match.
pub const MAX_PLAYERS: usize = 4;

// ---------------------------------------------------------------------------
// PlayerColor
// ---------------------------------------------------------------------------

/// Fixed seat colors, in client index order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayerColor {
    /// Client index 0 (server slot 1).
    Blue,
    /// Client index 1 (server slot 2).
    Yellow,
    /// Client index 2 (server slot 3).
    Red,
    /// Client index 3 (server slot 4).
    Green,
}

impl PlayerColor {
    /// All colors in client index order.
    pub const ALL: [PlayerColor; MAX_PLAYERS] = [
        PlayerColor::Blue,
        PlayerColor::Yellow,
        PlayerColor::Red,
        PlayerColor::Green,
    ];

    /// Display name for UI labels.
    pub fn name(self) -> &'static str {
        match self {
            PlayerColor::Blue => "Blue",
            PlayerColor::Yellow => "Yellow",
            PlayerColor::Red => "Red",
            PlayerColor::Green => "Green",
        }
    }
}

// ---------------------------------------------------------------------------
// ClientSlot
// ---------------------------------------------------------------------------

/// A validated 0-based client slot index.
///
/// Only constructible through [`SlotColorMapper`] or [`ClientSlot::new`], so
/// holding one proves the index is in `0..MAX_PLAYERS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct ClientSlot(u8);

impl ClientSlot {
    /// Validates a raw client index.
    pub fn new(index: usize) -> Result<Self, SlotError> {
        if index < MAX_PLAYERS {
            Ok(Self(index as u8))
        } else {
            Err(SlotError::InvalidClientIndex(index))
        }
    }

    /// The 0-based index, for array access.
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// The seat color owned by this slot.
    pub fn color(self) -> PlayerColor {
        PlayerColor::ALL[self.index()]
    }

    /// Iterates over every slot in index order.
    pub fn all() -> impl Iterator<Item = ClientSlot> {
        (0..MAX_PLAYERS as u8).map(ClientSlot)
    }
}

impl TryFrom<u8> for ClientSlot {
    type Error = SlotError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        ClientSlot::new(value as usize)
    }
}

impl From<ClientSlot> for u8 {
    fn from(slot: ClientSlot) -> Self {
        slot.0
    }
}

impl fmt::Display for ClientSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot{}({})", self.0, self.color().name())
    }
}

// ---------------------------------------------------------------------------
// SlotError
// ---------------------------------------------------------------------------

/// A slot number outside the valid range of its numbering scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SlotError {
    /// Server slot outside `1..=4`.
    #[error("invalid server slot {0} (expected 1..=4)")]
    InvalidServerSlot(i64),
    /// Client index outside `0..=3`.
    #[error("invalid client slot index {0} (expected 0..=3)")]
    InvalidClientIndex(usize),
}

impl SlotError {
    /// The offending raw value, widened for logging and error reporting.
    pub fn raw_value(self) -> i64 {
        match self {
            SlotError::InvalidServerSlot(v) => v,
            SlotError::InvalidClientIndex(v) => v as i64,
        }
    }
}

// ---------------------------------------------------------------------------
// SlotColorMapper
// ---------------------------------------------------------------------------

/// Stateless, bidirectional server/client slot translation.
///
/// Zero-sized and `Copy`; components receive one at construction so the
/// numbering boundary is explicit in every signature that crosses it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotColorMapper;

impl SlotColorMapper {
    /// Maps server slot `{1,2,3,4}` to client index `{0,1,2,3}`.
    pub fn server_slot_to_client_index(&self, server_slot: i64) -> Result<usize, SlotError> {
        self.to_client(server_slot).map(ClientSlot::index)
    }

    /// Maps client index `{0,1,2,3}` to server slot `{1,2,3,4}`.
    pub fn client_index_to_server_slot(&self, index: usize) -> Result<i64, SlotError> {
        ClientSlot::new(index).map(|slot| self.to_server(slot))
    }

    /// Typed variant of [`Self::server_slot_to_client_index`].
    pub fn to_client(&self, server_slot: i64) -> Result<ClientSlot, SlotError> {
        if (1..=MAX_PLAYERS as i64).contains(&server_slot) {
            Ok(ClientSlot((server_slot - 1) as u8))
        } else {
            Err(SlotError::InvalidServerSlot(server_slot))
        }
    }

    /// Typed variant of [`Self::client_index_to_server_slot`]; infallible.
    pub fn to_server(&self, slot: ClientSlot) -> i64 {
        slot.0 as i64 + 1
    }

    /// Seat color for a server slot.
    pub fn color_for_server_slot(&self, server_slot: i64) -> Result<PlayerColor, SlotError> {
        self.to_client(server_slot).map(ClientSlot::color)
    }
}
