//! tram-dashboard: live terminal dashboard for the tram telemetry publisher.

use std::io::{self, Read};
use std::path::{Path, PathBuf};

use clap::Parser;

use tram_core::{payload_text, Record, RecordReader, Session, TramError};

mod config;
mod render;
mod source;

use config::{Config, RenderFormat};

use render::Dashboard;
use source::Outcome;

#[derive(Parser)]
#[command(name = "tram-dashboard", version, about = "Realtime tram fleet dashboard")]
struct Cli {
    /// Publisher port (falls back to the config file)
    port: Option<u16>,

    /// Publisher host
    #[arg(long, env = "TRAM_HOST")]
    host: Option<String>,

    /// Output format: table, plain, or json
    #[arg(short, long)]
    format: Option<RenderFormat>,

    /// Don't clear the terminal between redraws
    #[arg(long)]
    no_clear: bool,

    /// Read a captured byte stream instead of connecting (`-` for stdin)
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Print each decoded record instead of the dashboard
    #[arg(short, long)]
    raw: bool,

    /// Alternative config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the effective settings to the config file and exit
    #[arg(long)]
    save_config: bool,
}

/// Effective settings after merging the config file with CLI flags.
#[derive(Debug, Clone, PartialEq)]
struct Settings {
    host: String,
    port: Option<u16>,
    format: RenderFormat,
    clear: bool,
    read_size: usize,
}

impl Settings {
    fn resolve(cli: &Cli, config: Config) -> Self {
        Settings {
            host: cli.host.clone().unwrap_or(config.publisher.host),
            port: cli.port.or(config.publisher.port),
            format: cli.format.unwrap_or(config.dashboard.format),
            clear: config.dashboard.clear && !cli.no_clear,
            read_size: config.dashboard.read_buffer,
        }
    }

    fn require_port(&self) -> Result<u16, TramError> {
        self.port
            .ok_or_else(|| TramError::Config("no port provided".into()))
    }

    fn to_config(&self) -> Config {
        let mut config = Config::default();
        config.publisher.host = self.host.clone();
        config.publisher.port = self.port;
        config.dashboard.format = self.format;
        config.dashboard.clear = self.clear;
        config.dashboard.read_buffer = self.read_size;
        config
    }
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => config::load_config_from(path),
        None => config::load_config(),
    };
    let settings = Settings::resolve(&cli, config);

    let result = if cli.save_config {
        cmd_save_config(cli.config.as_deref(), &settings)
    } else {
        match (&cli.replay, cli.raw) {
            (Some(file), true) => source::open_capture(file)
                .map_err(TramError::from)
                .and_then(cmd_raw),
            (None, true) => cmd_raw_live(&settings),
            (Some(file), false) => cmd_replay(file, &settings),
            (None, false) => cmd_watch(&settings),
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn runtime() -> Result<tokio::runtime::Runtime, TramError> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}

/// Live session against the publisher. Single-threaded runtime; only the
/// socket read suspends.
fn cmd_watch(settings: &Settings) -> Result<(), TramError> {
    let port = settings.require_port()?;
    let runtime = runtime()?;

    let mut session = Session::new();
    let mut dashboard = Dashboard::new(io::stdout(), settings.format, settings.clear);

    let outcome = runtime.block_on(source::stream_tcp(
        &settings.host,
        port,
        settings.read_size,
        &mut session,
        &mut dashboard,
        source::shutdown_signal(),
    ));

    let stats = session.stats();
    match outcome? {
        Outcome::Ended => tracing::info!(
            trams = session.fleet().len(),
            messages = stats.messages,
            warnings = stats.warnings,
            "publisher closed the stream"
        ),
        Outcome::Cancelled => tracing::info!(trams = session.fleet().len(), "cancelled"),
    }
    Ok(())
}

/// Run a captured byte stream through the same pipeline.
fn cmd_replay(file: &Path, settings: &Settings) -> Result<(), TramError> {
    let reader = source::open_capture(file)?;
    let mut session = Session::new();
    let mut dashboard = Dashboard::new(io::stdout(), settings.format, settings.clear);

    session.run_with_read_size(reader, &mut dashboard, settings.read_size)?;

    let stats = session.stats();
    eprintln!(
        "Replay complete: {} ({} bytes, {} records, {} messages, {} warnings, {} trams)",
        file.display(),
        stats.bytes_read,
        stats.records,
        stats.messages,
        stats.warnings,
        session.fleet().len()
    );
    Ok(())
}

/// Dump raw `name => value` records from a capture.
fn cmd_raw<R: Read>(reader: R) -> Result<(), TramError> {
    let mut records = RecordReader::new(reader);
    let mut count = 0u64;
    while let Some(record) = records.next_record()? {
        count += 1;
        print_record(&record);
    }
    eprintln!("{count} records");
    Ok(())
}

/// Dump raw records straight off the publisher until it closes or a
/// shutdown signal arrives.
fn cmd_raw_live(settings: &Settings) -> Result<(), TramError> {
    let port = settings.require_port()?;
    let runtime = runtime()?;

    let mut count = 0u64;
    let outcome = runtime.block_on(source::dump_tcp(
        &settings.host,
        port,
        settings.read_size,
        |record| {
            count += 1;
            print_record(record);
        },
        source::shutdown_signal(),
    ))?;

    eprintln!("{count} records");
    if outcome == Outcome::Cancelled {
        tracing::info!("cancelled");
    }
    Ok(())
}

fn print_record(record: &Record) {
    if record.is_msgtype() {
        println!("---");
    }
    println!(
        "{} => {}",
        payload_text(&record.name),
        payload_text(&record.value)
    );
}

fn cmd_save_config(path: Option<&Path>, settings: &Settings) -> Result<(), TramError> {
    let config = settings.to_config();
    let path = match path {
        Some(path) => {
            config::save_config_to(&config, path)?;
            path.to_path_buf()
        }
        None => config::save_config(&config)?,
    };
    eprintln!("Config saved to {}", path.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
