//! Terminal rendering of fleet snapshots.

use std::io::Write;

use comfy_table::{Cell, Table};
use serde_json::json;

use tram_core::{SessionStats, SnapshotSink, TramState, Warning};

use crate::config::RenderFormat;

const CLEAR_SCREEN: &str = "\x1B[2J\x1B[H";

/// Snapshot sink that redraws the whole dashboard on every update.
pub struct Dashboard<W: Write> {
    out: W,
    format: RenderFormat,
    clear: bool,
    last_warning: Option<String>,
}

impl<W: Write> Dashboard<W> {
    pub fn new(out: W, format: RenderFormat, clear: bool) -> Self {
        Dashboard {
            out,
            format,
            clear,
            last_warning: None,
        }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }

    fn draw(&mut self, snapshot: &[TramState], stats: &SessionStats) -> std::io::Result<()> {
        let body = match self.format {
            RenderFormat::Table => render_table(snapshot, stats, self.last_warning.as_deref()),
            RenderFormat::Plain => render_plain(snapshot),
            RenderFormat::Json => render_json(snapshot, stats),
        };
        if self.clear && self.format != RenderFormat::Json {
            self.out.write_all(CLEAR_SCREEN.as_bytes())?;
        }
        writeln!(self.out, "{body}")?;
        self.out.flush()
    }
}

impl<W: Write> SnapshotSink for Dashboard<W> {
    fn on_snapshot(&mut self, snapshot: &[TramState], stats: &SessionStats) {
        if let Err(e) = self.draw(snapshot, stats) {
            tracing::warn!(error = %e, "failed to draw dashboard");
        }
    }

    fn on_warning(&mut self, warning: &Warning) {
        if self.format == RenderFormat::Json {
            let line = json!({ "warning": warning.to_string() });
            if let Err(e) = writeln!(self.out, "{line}") {
                tracing::warn!(error = %e, "failed to write warning");
            }
        }
        self.last_warning = Some(warning.to_string());
    }
}

fn dash<T: ToString>(v: Option<T>) -> String {
    v.map(|v| v.to_string()).unwrap_or_else(|| "-".into())
}

/// Boxed table, one row per tram in first-seen order, plus a status line.
pub fn render_table(
    snapshot: &[TramState],
    stats: &SessionStats,
    last_warning: Option<&str>,
) -> String {
    let mut table = Table::new();
    table.set_header(vec!["#", "Tram", "Location", "Passengers"]);

    for tram in snapshot {
        table.add_row(vec![
            Cell::new(tram.first_seen_order + 1),
            Cell::new(&tram.tram_id),
            Cell::new(dash(tram.location.as_deref())),
            Cell::new(dash(tram.passenger_count)),
        ]);
    }

    let mut out = format!("Realtime Tram Dashboard\n{table}\n");
    out.push_str(&format!(
        "Trams: {}  Messages: {} applied / {} received  Warnings: {}",
        snapshot.len(),
        stats.applied,
        stats.messages,
        stats.warnings
    ));
    if let Some(w) = last_warning {
        out.push_str(&format!("\nLast warning: {w}"));
    }
    out
}

/// Indented text layout, one block per tram.
pub fn render_plain(snapshot: &[TramState]) -> String {
    let mut out = String::from("Realtime Tram Dashboard\n");
    for tram in snapshot {
        out.push_str(&format!(
            "\nTram {} ({}):\n    Location: {}\n    Passenger Count: {}\n",
            tram.first_seen_order + 1,
            tram.tram_id,
            dash(tram.location.as_deref()),
            dash(tram.passenger_count),
        ));
    }
    out
}

/// One JSON object per snapshot.
pub fn render_json(snapshot: &[TramState], stats: &SessionStats) -> String {
    json!({ "trams": snapshot, "stats": stats }).to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
