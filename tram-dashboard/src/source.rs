//! Byte sources for a session: the live TCP publisher or a capture file.

use std::fs;
use std::future::Future;
use std::io::{self, Read};
use std::path::Path;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpStream;

use tram_core::{FrameDecoder, Record, Result, Session, SnapshotSink};

/// How a live session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Publisher closed the stream on a record boundary.
    Ended,
    /// Shutdown signal arrived first.
    Cancelled,
}

/// Connect to the publisher and run the session until EOF or shutdown.
pub async fn stream_tcp<S, F>(
    host: &str,
    port: u16,
    read_size: usize,
    session: &mut Session,
    sink: &mut S,
    shutdown: F,
) -> Result<Outcome>
where
    S: SnapshotSink + ?Sized,
    F: Future<Output = ()>,
{
    let stream = TcpStream::connect((host, port)).await?;
    tracing::info!(host, port, "connected to publisher");
    pump(stream, read_size, session, sink, shutdown).await
}

/// Feed an async byte source into the session.
///
/// Only the read suspends; decoding and rendering run inline between reads.
pub async fn pump<R, S, F>(
    mut reader: R,
    read_size: usize,
    session: &mut Session,
    sink: &mut S,
    shutdown: F,
) -> Result<Outcome>
where
    R: AsyncRead + Unpin,
    S: SnapshotSink + ?Sized,
    F: Future<Output = ()>,
{
    let mut buf = vec![0u8; read_size.max(1)];
    tokio::pin!(shutdown);

    loop {
        let n = tokio::select! {
            res = reader.read(&mut buf) => res?,
            _ = &mut shutdown => {
                session.cancel();
                return Ok(Outcome::Cancelled);
            }
        };
        if n == 0 {
            session.finish(sink)?;
            return Ok(Outcome::Ended);
        }
        session.feed(&buf[..n], sink);
    }
}

/// Connect to the publisher and hand every decoded record to `on_record`
/// until EOF or shutdown. Records are not assembled into messages.
pub async fn dump_tcp<D, F>(
    host: &str,
    port: u16,
    read_size: usize,
    on_record: D,
    shutdown: F,
) -> Result<Outcome>
where
    D: FnMut(&Record),
    F: Future<Output = ()>,
{
    let stream = TcpStream::connect((host, port)).await?;
    tracing::info!(host, port, "connected to publisher");
    pump_records(stream, read_size, on_record, shutdown).await
}

/// Decode raw records off an async byte source.
pub async fn pump_records<R, D, F>(
    mut reader: R,
    read_size: usize,
    mut on_record: D,
    shutdown: F,
) -> Result<Outcome>
where
    R: AsyncRead + Unpin,
    D: FnMut(&Record),
    F: Future<Output = ()>,
{
    let mut decoder = FrameDecoder::new();
    let mut buf = vec![0u8; read_size.max(1)];
    tokio::pin!(shutdown);

    loop {
        let n = tokio::select! {
            res = reader.read(&mut buf) => res?,
            _ = &mut shutdown => {
                let dropped = decoder.discard();
                if dropped > 0 {
                    tracing::debug!(dropped, "discarded partial record");
                }
                return Ok(Outcome::Cancelled);
            }
        };
        if n == 0 {
            decoder.finish()?;
            return Ok(Outcome::Ended);
        }
        decoder.push(&buf[..n]);
        while let Some(record) = decoder.next_record() {
            on_record(&record);
        }
    }
}

/// Wait for Ctrl+C or SIGTERM (Unix).
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    tracing::info!("shutdown requested");
}

/// Open a captured byte stream. `-` reads stdin.
pub fn open_capture(path: &Path) -> io::Result<Box<dyn Read>> {
    if path.to_str() == Some("-") {
        Ok(Box::new(io::stdin().lock()))
    } else {
        Ok(Box::new(io::BufReader::new(fs::File::open(path)?)))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
