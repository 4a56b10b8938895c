//! Per-tram state and the fleet aggregator.
//!
//! Pure logic: `apply()` folds one message into the fleet and reports what
//! changed. Trams are stored in first-seen order so a tram's dashboard slot
//! never moves, and a side index maps `tram_id` to that slot.

use std::collections::HashMap;

use serde::Serialize;

use crate::types::{Message, TramId, Warning};

// ---------------------------------------------------------------------------
// Fleet events (output)
// ---------------------------------------------------------------------------

/// What a successful `apply()` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FleetEvent {
    /// First message for this tram; a new slot was created.
    NewTram { tram_id: TramId, order: usize },
    /// An existing tram's fields were overwritten.
    Updated { tram_id: TramId, order: usize },
}

impl FleetEvent {
    pub fn order(&self) -> usize {
        match self {
            FleetEvent::NewTram { order, .. } | FleetEvent::Updated { order, .. } => *order,
        }
    }
}

// ---------------------------------------------------------------------------
// Tram state
// ---------------------------------------------------------------------------

/// Latest known state of one tram.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TramState {
    pub tram_id: TramId,
    pub location: Option<String>,
    pub passenger_count: Option<u32>,
    /// Insertion index; equals this tram's position in every snapshot.
    pub first_seen_order: usize,
    pub message_count: u64,
}

impl TramState {
    pub fn new(tram_id: TramId, first_seen_order: usize) -> Self {
        TramState {
            tram_id,
            location: None,
            passenger_count: None,
            first_seen_order,
            message_count: 0,
        }
    }
}

/// Parse a passenger count: ASCII digits only, no sign or whitespace, fits `u32`.
pub fn parse_passenger_count(value: &str) -> Option<u32> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

// ---------------------------------------------------------------------------
// Fleet
// ---------------------------------------------------------------------------

/// Every tram seen this session, keyed by id, ordered by first sighting.
///
/// Entries are never removed, so the fleet only grows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fleet {
    trams: Vec<TramState>,
    index: HashMap<TramId, usize>,
}

impl Fleet {
    pub fn new() -> Self {
        Fleet::default()
    }

    /// Fold one message into the fleet.
    ///
    /// A rejected message leaves the fleet untouched, including not creating
    /// a slot for a tram that was never seen before.
    pub fn apply(&mut self, msg: &Message) -> Result<FleetEvent, Warning> {
        let count = match msg {
            Message::PassengerCountUpdate { tram_id, value } => {
                match parse_passenger_count(value) {
                    Some(n) => Some(n),
                    None => {
                        let warning = Warning::InvalidPassengerCount {
                            tram_id: tram_id.to_string(),
                            value: value.clone(),
                        };
                        tracing::warn!(%warning, "rejected message");
                        return Err(warning);
                    }
                }
            }
            Message::LocationUpdate { .. } => None,
        };

        let tram_id = msg.tram_id();
        let (order, is_new) = match self.index.get(tram_id.as_bytes()) {
            Some(&order) => (order, false),
            None => {
                let order = self.trams.len();
                self.trams.push(TramState::new(tram_id.clone(), order));
                self.index.insert(tram_id.clone(), order);
                tracing::debug!(%tram_id, order, "new tram");
                (order, true)
            }
        };

        let tram = &mut self.trams[order];
        tram.message_count += 1;
        match msg {
            Message::LocationUpdate { location, .. } => tram.location = Some(location.clone()),
            Message::PassengerCountUpdate { .. } => tram.passenger_count = count,
        }

        let tram_id = tram_id.clone();
        Ok(if is_new {
            FleetEvent::NewTram { tram_id, order }
        } else {
            FleetEvent::Updated { tram_id, order }
        })
    }

    /// Read-only view of all trams in first-seen order.
    pub fn snapshot(&self) -> &[TramState] {
        &self.trams
    }

    /// Look a tram up by its raw id bytes. Accepts `&str` or `&TramId`.
    pub fn get(&self, tram_id: impl AsRef<[u8]>) -> Option<&TramState> {
        self.index.get(tram_id.as_ref()).map(|&i| &self.trams[i])
    }

    pub fn len(&self) -> usize {
        self.trams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trams.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
