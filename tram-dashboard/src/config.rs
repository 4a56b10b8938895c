//! Configuration file management.
//!
//! Reads/writes `~/.tram-dashboard/config.yaml` with the publisher address
//! and dashboard display settings. Command-line flags override these.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use tram_core::frame::DEFAULT_READ_SIZE;
use tram_core::TramError;

/// Full configuration structure.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub publisher: PublisherConfig,
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublisherConfig {
    pub host: String,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardConfig {
    pub format: RenderFormat,
    pub clear: bool,
    pub read_buffer: usize,
}

/// How snapshots are drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderFormat {
    Table,
    Plain,
    Json,
}

impl RenderFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderFormat::Table => "table",
            RenderFormat::Plain => "plain",
            RenderFormat::Json => "json",
        }
    }
}

impl FromStr for RenderFormat {
    type Err = TramError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "table" => Ok(RenderFormat::Table),
            "plain" => Ok(RenderFormat::Plain),
            "json" => Ok(RenderFormat::Json),
            other => Err(TramError::Config(format!("unknown format: {other}"))),
        }
    }
}

impl std::fmt::Display for RenderFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            publisher: PublisherConfig {
                host: "127.0.0.1".into(),
                port: None,
            },
            dashboard: DashboardConfig {
                format: RenderFormat::Table,
                clear: true,
                read_buffer: DEFAULT_READ_SIZE,
            },
        }
    }
}

/// Get the config directory path (`~/.tram-dashboard/`).
pub fn config_dir() -> PathBuf {
    dirs_home().join(".tram-dashboard")
}

/// Get the config file path.
pub fn config_file() -> PathBuf {
    config_dir().join("config.yaml")
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Load config from `~/.tram-dashboard/config.yaml`.
///
/// Returns default config if file doesn't exist.
pub fn load_config() -> Config {
    load_config_from(&config_file())
}

/// Load config from an explicit path, falling back to defaults.
pub fn load_config_from(path: &Path) -> Config {
    if !path.exists() {
        return Config::default();
    }

    match std::fs::read_to_string(path) {
        Ok(text) => parse_config(&text),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "unreadable config, using defaults");
            Config::default()
        }
    }
}

/// Save config to `~/.tram-dashboard/config.yaml`.
pub fn save_config(config: &Config) -> Result<PathBuf, TramError> {
    let path = config_file();
    save_config_to(config, &path)?;
    Ok(path)
}

pub fn save_config_to(config: &Config, path: &Path) -> Result<(), TramError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| TramError::Config(e.to_string()))?;
    }
    std::fs::write(path, serialize_config(config)).map_err(|e| TramError::Config(e.to_string()))
}

/// Parse simple YAML-like config text. Unknown keys and bad values are ignored.
fn parse_config(text: &str) -> Config {
    let mut config = Config::default();
    let mut current_section: Option<String> = None;

    for line in text.lines() {
        let stripped = strip_comment(line).trim();
        if stripped.is_empty() {
            continue;
        }

        let is_indented = line.starts_with("  ") || line.starts_with('\t');

        let Some((key, val)) = stripped.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let val = val.trim();

        if !is_indented {
            current_section = val.is_empty().then(|| key.to_string());
            continue;
        }

        match (current_section.as_deref(), key) {
            (Some("publisher"), "host") => {
                if let Some(v) = parse_string_value(val) {
                    config.publisher.host = v;
                }
            }
            (Some("publisher"), "port") => {
                config.publisher.port = parse_string_value(val).and_then(|v| v.parse().ok());
            }
            (Some("dashboard"), "format") => {
                if let Some(v) = parse_string_value(val).and_then(|v| v.parse().ok()) {
                    config.dashboard.format = v;
                }
            }
            (Some("dashboard"), "clear") => {
                if let Some(v) = parse_bool_value(val) {
                    config.dashboard.clear = v;
                }
            }
            (Some("dashboard"), "read_buffer") => {
                if let Some(v) = val.parse::<usize>().ok().filter(|n| *n > 0) {
                    config.dashboard.read_buffer = v;
                }
            }
            _ => {}
        }
    }

    config
}

/// Cut a trailing comment. `#` starts one only at the start of the line or
/// after whitespace, and never inside a quoted value.
fn strip_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    let mut prev: Option<char> = None;
    for (i, c) in line.char_indices() {
        let at_boundary = prev.map_or(true, |p| p.is_whitespace() || p == ':');
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if (c == '"' || c == '\'') && at_boundary => quote = Some(c),
            None if c == '#' && prev.map_or(true, char::is_whitespace) => return &line[..i],
            None => {}
        }
        prev = Some(c);
    }
    line
}

fn parse_string_value(val: &str) -> Option<String> {
    if val == "null" || val == "~" || val.is_empty() {
        return None;
    }
    // Strip quotes
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        return Some(val[1..val.len() - 1].to_string());
    }
    Some(val.to_string())
}

fn parse_bool_value(val: &str) -> Option<bool> {
    match val {
        "true" | "yes" | "on" => Some(true),
        "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Serialize config to YAML-like text.
fn serialize_config(config: &Config) -> String {
    let mut lines = vec!["# tram-dashboard configuration".to_string(), String::new()];

    lines.push("publisher:".into());
    lines.push(format!("  host: \"{}\"", config.publisher.host));
    match config.publisher.port {
        Some(p) => lines.push(format!("  port: {p}")),
        None => lines.push("  port: null".into()),
    }
    lines.push(String::new());

    lines.push("dashboard:".into());
    lines.push(format!("  format: {}", config.dashboard.format));
    lines.push(format!("  clear: {}", config.dashboard.clear));
    lines.push(format!("  read_buffer: {}", config.dashboard.read_buffer));

    lines.join("\n") + "\n"
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
