//! Shared types, error enums, and wire constants for tram-core.

use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

/// Fatal errors. Any of these ends the session.
#[derive(Debug, Error)]
pub enum TramError {
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
    #[error("stream ended mid-record ({buffered} bytes buffered)")]
    UnexpectedEndOfStream { buffered: usize },
    #[error("content is {0} bytes, wire limit is 255")]
    ContentTooLong(usize),
    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, TramError>;

/// Recoverable conditions. The session logs them, reports them to the
/// sink, and keeps going without touching fleet state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Warning {
    #[error("unknown message kind {kind:?}, skipping until next MSGTYPE")]
    UnknownMessageKind { kind: String },
    #[error("{kind} message missing {missing}, dropped")]
    MalformedMessage {
        kind: MessageKind,
        missing: &'static str,
    },
    #[error("invalid passenger count {value:?} for {tram_id}")]
    InvalidPassengerCount { tram_id: String, value: String },
    #[error("skipped {records} record(s) before the first MSGTYPE")]
    PreludeSkipped { records: usize },
}

// ---------------------------------------------------------------------------
// Wire field names
// ---------------------------------------------------------------------------

pub const FIELD_MSGTYPE: &[u8] = b"MSGTYPE";
pub const FIELD_TRAM_ID: &[u8] = b"TRAM_ID";
pub const FIELD_VALUE: &[u8] = b"VALUE";

pub const KIND_LOCATION: &[u8] = b"LOCATION";
pub const KIND_PASSENGER_COUNT: &[u8] = b"PASSENGER_COUNT";

/// Largest content a single length byte can describe.
pub const MAX_CONTENT_LEN: usize = u8::MAX as usize;

// ---------------------------------------------------------------------------
// Records and messages
// ---------------------------------------------------------------------------

/// One `(name, value)` field pair read off the wire.
///
/// Payloads stay opaque bytes; text decoding happens when a message is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub name: Bytes,
    pub value: Bytes,
}

impl Record {
    pub fn new(name: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Record {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn is_msgtype(&self) -> bool {
        &self.name[..] == FIELD_MSGTYPE
    }
}

/// Message kinds the assembler knows how to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MessageKind {
    Location,
    PassengerCount,
}

impl MessageKind {
    /// Map a `MSGTYPE` value to a known kind.
    pub fn from_wire(value: &[u8]) -> Option<Self> {
        match value {
            KIND_LOCATION => Some(MessageKind::Location),
            KIND_PASSENGER_COUNT => Some(MessageKind::PassengerCount),
            _ => None,
        }
    }

    pub fn wire_name(&self) -> &'static str {
        match self {
            MessageKind::Location => "LOCATION",
            MessageKind::PassengerCount => "PASSENGER_COUNT",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Tram identifier exactly as it arrived on the wire.
///
/// Identity is the raw bytes, so two ids that only differ in invalid UTF-8
/// stay distinct. Text is decoded lossily for display and serialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TramId(Bytes);

impl TramId {
    pub fn new(raw: impl Into<Bytes>) -> Self {
        TramId(raw.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

// `Bytes` hashes as its slice, so map lookups by `&[u8]` agree with `Hash`.
impl std::borrow::Borrow<[u8]> for TramId {
    fn borrow(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for TramId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for TramId {
    fn from(s: &str) -> Self {
        TramId(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<String> for TramId {
    fn from(s: String) -> Self {
        TramId(Bytes::from(s))
    }
}

impl From<Bytes> for TramId {
    fn from(raw: Bytes) -> Self {
        TramId(raw)
    }
}

impl PartialEq<str> for TramId {
    fn eq(&self, other: &str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl PartialEq<&str> for TramId {
    fn eq(&self, other: &&str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl std::fmt::Display for TramId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

impl Serialize for TramId {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&String::from_utf8_lossy(&self.0))
    }
}

/// A complete logical update for one tram.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum Message {
    LocationUpdate { tram_id: TramId, location: String },
    /// `value` is the raw decimal text; the fleet validates it on apply.
    PassengerCountUpdate { tram_id: TramId, value: String },
}

impl Message {
    pub fn tram_id(&self) -> &TramId {
        match self {
            Message::LocationUpdate { tram_id, .. } => tram_id,
            Message::PassengerCountUpdate { tram_id, .. } => tram_id,
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Message::LocationUpdate { .. } => MessageKind::Location,
            Message::PassengerCountUpdate { .. } => MessageKind::PassengerCount,
        }
    }
}

/// Decode payload bytes for display. Invalid UTF-8 is replaced, not rejected.
pub fn payload_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
