//! The read → decode → assemble → apply → snapshot pipeline.
//!
//! `Session` owns no transport. Callers either push bytes with `feed()` and
//! close with `finish()` (async sockets, signal handling), or hand a blocking
//! reader to `run()`.

use std::io::{ErrorKind, Read};

use serde::Serialize;

use crate::assemble::Assembler;
use crate::fleet::{Fleet, TramState};
use crate::frame::{FrameDecoder, DEFAULT_READ_SIZE};
use crate::types::{Message, Result, Warning};

/// Receives a full fleet snapshot after every applied message.
///
/// Called on the pipeline thread, so implementations should return quickly.
pub trait SnapshotSink {
    fn on_snapshot(&mut self, snapshot: &[TramState], stats: &SessionStats);

    fn on_warning(&mut self, _warning: &Warning) {}
}

impl<F: FnMut(&[TramState])> SnapshotSink for F {
    fn on_snapshot(&mut self, snapshot: &[TramState], _stats: &SessionStats) {
        self(snapshot)
    }
}

/// Running counters for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub bytes_read: u64,
    pub records: u64,
    pub messages: u64,
    pub applied: u64,
    pub warnings: u64,
}

/// One publisher session: decoder, assembler, and fleet wired together.
#[derive(Debug, Default)]
pub struct Session {
    decoder: FrameDecoder,
    assembler: Assembler,
    fleet: Fleet,
    stats: SessionStats,
}

impl Session {
    pub fn new() -> Self {
        Session::default()
    }

    pub fn fleet(&self) -> &Fleet {
        &self.fleet
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Process bytes from one transport read.
    pub fn feed<S: SnapshotSink + ?Sized>(&mut self, data: &[u8], sink: &mut S) {
        self.stats.bytes_read += data.len() as u64;
        self.decoder.push(data);
        while let Some(record) = self.decoder.next_record() {
            self.stats.records += 1;
            let msg = self.assembler.push(record);
            self.drain_warnings(sink);
            if let Some(msg) = msg {
                self.apply(&msg, sink);
            }
        }
    }

    /// Clean end of stream from the transport.
    ///
    /// Flushes the last open message. If the stream stopped mid-record this
    /// returns `UnexpectedEndOfStream` and applies nothing further.
    pub fn finish<S: SnapshotSink + ?Sized>(&mut self, sink: &mut S) -> Result<()> {
        self.decoder.finish()?;
        let msg = self.assembler.finish();
        self.drain_warnings(sink);
        if let Some(msg) = msg {
            self.apply(&msg, sink);
        }
        Ok(())
    }

    /// Stop without error: drop any partial record and the open message.
    pub fn cancel(&mut self) {
        let dropped = self.decoder.discard();
        self.assembler.reset();
        tracing::debug!(dropped, "session cancelled");
    }

    /// Drive the pipeline from a blocking byte source until it ends.
    pub fn run<R, S>(&mut self, reader: R, sink: &mut S) -> Result<()>
    where
        R: Read,
        S: SnapshotSink + ?Sized,
    {
        self.run_with_read_size(reader, sink, DEFAULT_READ_SIZE)
    }

    pub fn run_with_read_size<R, S>(
        &mut self,
        mut reader: R,
        sink: &mut S,
        read_size: usize,
    ) -> Result<()>
    where
        R: Read,
        S: SnapshotSink + ?Sized,
    {
        let mut chunk = vec![0u8; read_size.max(1)];
        loop {
            let n = match reader.read(&mut chunk) {
                Ok(0) => return self.finish(sink),
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            self.feed(&chunk[..n], sink);
        }
    }

    fn apply<S: SnapshotSink + ?Sized>(&mut self, msg: &Message, sink: &mut S) {
        self.stats.messages += 1;
        match self.fleet.apply(msg) {
            Ok(_) => {
                self.stats.applied += 1;
                sink.on_snapshot(self.fleet.snapshot(), &self.stats);
            }
            Err(warning) => {
                self.stats.warnings += 1;
                sink.on_warning(&warning);
            }
        }
    }

    fn drain_warnings<S: SnapshotSink + ?Sized>(&mut self, sink: &mut S) {
        for warning in self.assembler.take_warnings() {
            self.stats.warnings += 1;
            sink.on_warning(&warning);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
