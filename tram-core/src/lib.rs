//! tram-core: Pure decode + fleet tracking library for the tram telemetry feed.
//!
//! No async, no sockets: the transport is injected as bytes or a blocking
//! `Read`. This crate is the core used by the `tram-dashboard` binary.

pub mod assemble;
pub mod fleet;
pub mod frame;
pub mod session;
pub mod types;

// Re-export commonly used types at crate root
pub use assemble::Assembler;
pub use fleet::{Fleet, FleetEvent, TramState};
pub use frame::{encode_record, FrameDecoder, RecordReader};
pub use session::{Session, SessionStats, SnapshotSink};
pub use types::*;
