//! Group records into typed messages.
//!
//! A `MSGTYPE` record opens a message; every record after it belongs to
//! that message until the next `MSGTYPE` (or end of stream) closes it.
//! Records are not positional: `TRAM_ID` and `VALUE` may come in any order,
//! and a repeated field overwrites the earlier one.

use std::collections::HashSet;

use bytes::Bytes;

use crate::types::{
    payload_text, Message, MessageKind, Record, TramId, Warning, FIELD_TRAM_ID, FIELD_VALUE,
};

/// Fields collected so far for an open message.
#[derive(Debug, Clone)]
struct Partial {
    kind: MessageKind,
    tram_id: Option<Bytes>,
    value: Option<Bytes>,
}

impl Partial {
    fn new(kind: MessageKind) -> Self {
        Partial {
            kind,
            tram_id: None,
            value: None,
        }
    }

    fn merge(&mut self, record: Record) {
        match &record.name[..] {
            FIELD_TRAM_ID => self.tram_id = Some(record.value),
            FIELD_VALUE => self.value = Some(record.value),
            other => {
                tracing::debug!(
                    kind = %self.kind,
                    field = %payload_text(other),
                    "ignoring unrecognised field"
                );
            }
        }
    }

    fn build(self) -> Result<Message, Warning> {
        let kind = self.kind;
        let tram_id = self.tram_id.ok_or(Warning::MalformedMessage {
            kind,
            missing: "TRAM_ID",
        })?;
        let value = self.value.ok_or(Warning::MalformedMessage {
            kind,
            missing: "VALUE",
        })?;

        let tram_id = TramId::from(tram_id);
        let value = payload_text(&value);
        Ok(match kind {
            MessageKind::Location => Message::LocationUpdate {
                tram_id,
                location: value,
            },
            MessageKind::PassengerCount => Message::PassengerCountUpdate { tram_id, value },
        })
    }
}

#[derive(Debug)]
enum State {
    /// Start of stream, before any `MSGTYPE`.
    AwaitingMsgType,
    Accumulating(Partial),
    /// Inside a message of a kind we don't understand.
    Skipping,
}

/// `MSGTYPE`-driven message assembler.
#[derive(Debug)]
pub struct Assembler {
    state: State,
    prelude_records: usize,
    prelude_reported: bool,
    unknown_reported: HashSet<Bytes>,
    warnings: Vec<Warning>,
    pub unknown_skipped: u64,
}

impl Default for Assembler {
    fn default() -> Self {
        Assembler::new()
    }
}

impl Assembler {
    pub fn new() -> Self {
        Assembler {
            state: State::AwaitingMsgType,
            prelude_records: 0,
            prelude_reported: false,
            unknown_reported: HashSet::new(),
            warnings: Vec::new(),
            unknown_skipped: 0,
        }
    }

    /// Feed one record. Returns a message when this record closes a complete one.
    pub fn push(&mut self, record: Record) -> Option<Message> {
        if !record.is_msgtype() {
            match &mut self.state {
                State::AwaitingMsgType => self.prelude_records += 1,
                State::Accumulating(partial) => partial.merge(record),
                State::Skipping => {}
            }
            return None;
        }

        let next = self.open(record.value);
        let previous = std::mem::replace(&mut self.state, next);
        self.close(previous)
    }

    /// End of stream: flush whatever message is still open.
    pub fn finish(&mut self) -> Option<Message> {
        self.report_prelude();
        let last = std::mem::replace(&mut self.state, State::AwaitingMsgType);
        self.close(last)
    }

    /// Forget the open message without reporting it (cancellation).
    pub fn reset(&mut self) {
        self.state = State::AwaitingMsgType;
    }

    /// Drain warnings raised since the last call.
    pub fn take_warnings(&mut self) -> Vec<Warning> {
        std::mem::take(&mut self.warnings)
    }

    fn open(&mut self, kind_value: Bytes) -> State {
        self.report_prelude();
        match MessageKind::from_wire(&kind_value) {
            Some(kind) => State::Accumulating(Partial::new(kind)),
            None => {
                self.unknown_skipped += 1;
                if self.unknown_reported.insert(kind_value.clone()) {
                    self.warn(Warning::UnknownMessageKind {
                        kind: payload_text(&kind_value),
                    });
                }
                State::Skipping
            }
        }
    }

    fn close(&mut self, state: State) -> Option<Message> {
        let State::Accumulating(partial) = state else {
            return None;
        };
        match partial.build() {
            Ok(msg) => Some(msg),
            Err(w) => {
                self.warn(w);
                None
            }
        }
    }

    fn report_prelude(&mut self) {
        if self.prelude_records > 0 && !self.prelude_reported {
            self.prelude_reported = true;
            self.warn(Warning::PreludeSkipped {
                records: self.prelude_records,
            });
        }
    }

    fn warn(&mut self, warning: Warning) {
        tracing::warn!(%warning, "recoverable protocol error");
        self.warnings.push(warning);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(name: &str, value: &str) -> Record {
        Record::new(name.to_string(), value.to_string())
    }

    fn run(records: &[(&str, &str)]) -> (Vec<Message>, Vec<Warning>) {
        let mut asm = Assembler::new();
        let mut out = Vec::new();
        for (name, value) in records {
            out.extend(asm.push(rec(name, value)));
        }
        out.extend(asm.finish());
        (out, asm.take_warnings())
    }

    fn location(tram: &str, place: &str) -> Message {
        Message::LocationUpdate {
            tram_id: tram.into(),
            location: place.into(),
        }
    }

    #[test]
    fn test_single_location_message() {
        let (msgs, warnings) = run(&[
            ("MSGTYPE", "LOCATION"),
            ("TRAM_ID", "TRAMABC"),
            ("VALUE", "CITY"),
        ]);
        assert_eq!(msgs, vec![location("TRAMABC", "CITY")]);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_message_closed_by_next_msgtype() {
        let mut asm = Assembler::new();
        assert!(asm.push(rec("MSGTYPE", "PASSENGER_COUNT")).is_none());
        assert!(asm.push(rec("TRAM_ID", "T1")).is_none());
        assert!(asm.push(rec("VALUE", "22")).is_none());

        let msg = asm.push(rec("MSGTYPE", "LOCATION"));
        assert_eq!(
            msg,
            Some(Message::PassengerCountUpdate {
                tram_id: "T1".into(),
                value: "22".into(),
            })
        );
        // New message is open but empty: finishing it is malformed.
        assert!(asm.finish().is_none());
        assert_eq!(asm.take_warnings().len(), 1);
    }

    #[test]
    fn test_field_order_does_not_matter() {
        let (msgs, _) = run(&[
            ("MSGTYPE", "LOCATION"),
            ("VALUE", "Depot"),
            ("TRAM_ID", "T9"),
        ]);
        assert_eq!(msgs, vec![location("T9", "Depot")]);
    }

    #[test]
    fn test_duplicate_field_last_wins() {
        let (msgs, warnings) = run(&[
            ("MSGTYPE", "LOCATION"),
            ("TRAM_ID", "T1"),
            ("VALUE", "Flinders"),
            ("VALUE", "Williams"),
        ]);
        assert_eq!(msgs, vec![location("T1", "Williams")]);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_unknown_kind_skipped() {
        let (msgs, warnings) = run(&[
            ("MSGTYPE", "HEARTBEAT"),
            ("TRAM_ID", "TRAMX"),
            ("VALUE", "ping"),
            ("MSGTYPE", "LOCATION"),
            ("TRAM_ID", "TRAMX"),
            ("VALUE", "Depot"),
        ]);
        assert_eq!(msgs, vec![location("TRAMX", "Depot")]);
        assert_eq!(
            warnings,
            vec![Warning::UnknownMessageKind {
                kind: "HEARTBEAT".into()
            }]
        );
    }

    #[test]
    fn test_unknown_kind_warned_once_per_kind() {
        let mut asm = Assembler::new();
        for kind in ["HEARTBEAT", "HEARTBEAT", "DOORS", "HEARTBEAT"] {
            asm.push(rec("MSGTYPE", kind));
        }
        asm.finish();
        assert_eq!(asm.take_warnings().len(), 2);
        assert_eq!(asm.unknown_skipped, 4);
    }

    #[test]
    fn test_missing_field_drops_message() {
        let (msgs, warnings) = run(&[
            ("MSGTYPE", "LOCATION"),
            ("VALUE", "Nowhere"),
            ("MSGTYPE", "PASSENGER_COUNT"),
            ("TRAM_ID", "T2"),
            ("VALUE", "5"),
        ]);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].tram_id(), "T2");
        assert_eq!(
            warnings,
            vec![Warning::MalformedMessage {
                kind: MessageKind::Location,
                missing: "TRAM_ID",
            }]
        );
    }

    #[test]
    fn test_prelude_skipped_once() {
        let (msgs, warnings) = run(&[
            ("VALUE", "stale"),
            ("TRAM_ID", "T0"),
            ("MSGTYPE", "LOCATION"),
            ("TRAM_ID", "T1"),
            ("VALUE", "City"),
        ]);
        assert_eq!(msgs, vec![location("T1", "City")]);
        assert_eq!(warnings, vec![Warning::PreludeSkipped { records: 2 }]);
    }

    #[test]
    fn test_prelude_only_stream() {
        let (msgs, warnings) = run(&[("TRAM_ID", "T0")]);
        assert!(msgs.is_empty());
        assert_eq!(warnings, vec![Warning::PreludeSkipped { records: 1 }]);
    }

    #[test]
    fn test_unrecognised_field_ignored() {
        let (msgs, warnings) = run(&[
            ("MSGTYPE", "LOCATION"),
            ("TRAM_ID", "T1"),
            ("SPEED", "40"),
            ("VALUE", "City"),
        ]);
        assert_eq!(msgs, vec![location("T1", "City")]);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_empty_stream() {
        let (msgs, warnings) = run(&[]);
        assert!(msgs.is_empty());
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_reset_discards_open_message() {
        let mut asm = Assembler::new();
        asm.push(rec("MSGTYPE", "LOCATION"));
        asm.push(rec("TRAM_ID", "T1"));
        asm.reset();
        assert!(asm.finish().is_none());
        assert!(asm.take_warnings().is_empty());
    }
}
