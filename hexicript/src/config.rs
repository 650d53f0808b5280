//! Engine configuration file reader.
//!
//! The file is flat `key: value` (or `key = value`) lines with dotted keys:
//!
//! | Key | Default | Meaning |
//! |-----|---------|---------|
//! | `performance.max_loops_per_tick` | 1000 | iteration cap per loop statement |
//! | `performance.max_execution_time_ms` | 5000 | wall-clock cap per invocation |
//! | `performance.optimization.enable_async_execution` | true | `spawn` uses the worker pool |
//! | `performance.worker_threads` | 0 | worker pool size (0 = runtime default) |
//! | `defaults.max_script_lines` | 10000 | statement cap checked at load |
//! | `variables.retention_secs` | 1800 | ephemeral variable lifetime |
//! | `shutdown.grace_period_ms` | 5000 | wait for in-flight async work |
//! | `script_extension` | `.hxs` | extension picked up from directories |
//! | `debug` | false | binary log level |
//!
//! Lines starting with `#` are comments.  Unknown keys and bad values are
//! reported as [`ConfigError`]s and otherwise ignored.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::script::Limits;

// ── Public API ────────────────────────────────────────────────────────────────

/// A non-fatal error encountered while loading a config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub line: usize,
    pub message: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Engine settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub max_loops_per_tick: u64,
    pub max_execution_time: Duration,
    pub max_script_lines: usize,
    pub enable_async_execution: bool,
    pub variable_retention: Duration,
    pub shutdown_grace: Duration,
    pub worker_threads: usize,
    pub script_extension: String,
    pub debug: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_loops_per_tick: 1000,
            max_execution_time: Duration::from_millis(5000),
            max_script_lines: 10_000,
            enable_async_execution: true,
            variable_retention: Duration::from_secs(1800),
            shutdown_grace: Duration::from_millis(5000),
            worker_threads: 0,
            script_extension: ".hxs".to_owned(),
            debug: false,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-invocation caps derived from this config.
    pub fn limits(&self) -> Limits {
        Limits { max_loops: self.max_loops_per_tick, max_execution_time: self.max_execution_time }
    }

    /// Parse a config string.
    ///
    /// Returns the config (defaults where a key is absent or invalid) and
    /// a list of the problems found.
    pub fn load_str(s: &str) -> (Self, Vec<ConfigError>) {
        let mut config = EngineConfig::new();
        let mut errors = Vec::new();

        for (i, raw) in s.lines().enumerate() {
            let lineno = i + 1;
            let line = raw.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = split_entry(line) else {
                errors.push(ConfigError { line: lineno, message: format!("expected `key: value`, got {line:?}") });
                continue;
            };

            if let Err(message) = config.apply(key, value) {
                errors.push(ConfigError { line: lineno, message });
            }
        }

        (config, errors)
    }

    /// Read and parse a config file from disk.
    pub fn load_file(path: &Path) -> std::io::Result<(Self, Vec<ConfigError>)> {
        let s = std::fs::read_to_string(path)?;
        Ok(Self::load_str(&s))
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key {
            "performance.max_loops_per_tick" => self.max_loops_per_tick = parse_num(key, value)?,
            "performance.max_execution_time_ms" => {
                self.max_execution_time = Duration::from_millis(parse_num(key, value)?);
            }
            "performance.optimization.enable_async_execution" => {
                self.enable_async_execution = parse_bool(key, value)?;
            }
            "performance.worker_threads" => self.worker_threads = parse_num(key, value)?,
            "defaults.max_script_lines" => self.max_script_lines = parse_num(key, value)?,
            "variables.retention_secs" => {
                self.variable_retention = Duration::from_secs(parse_num(key, value)?);
            }
            "shutdown.grace_period_ms" => self.shutdown_grace = Duration::from_millis(parse_num(key, value)?),
            "script_extension" => {
                let ext = unquote(value);
                if ext.is_empty() {
                    return Err("script_extension must not be empty".to_owned());
                }
                self.script_extension = if ext.starts_with('.') { ext.to_owned() } else { format!(".{ext}") };
            }
            "debug" => self.debug = parse_bool(key, value)?,
            _ => return Err(format!("unknown key: {key}")),
        }
        Ok(())
    }
}

// ── Line helpers ──────────────────────────────────────────────────────────────

/// Split `key: value` / `key = value`, dropping a trailing ` # comment`.
fn split_entry(line: &str) -> Option<(&str, &str)> {
    let sep = line.find([':', '='])?;
    let key = line[..sep].trim();
    let mut value = line[sep + 1..].trim();
    if let Some(pos) = value.find(" #") {
        value = value[..pos].trim_end();
    }
    (!key.is_empty()).then_some((key, value))
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, String> {
    unquote(value).parse().map_err(|_| format!("{key}: not a number: {value:?}"))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, String> {
    match unquote(value).to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(format!("{key}: not a boolean: {value:?}")),
    }
}

fn unquote(s: &str) -> &str {
    crate::script::expr::unquote(s.trim())
}

// ── Path helpers ──────────────────────────────────────────────────────────────

/// Search for the user config file: `./hexicript.conf`, then
/// `hexicript.conf` in the platform config directory.
pub fn find_user_config() -> Option<PathBuf> {
    let local = PathBuf::from("hexicript.conf");
    if local.exists() {
        return Some(local);
    }
    directories::ProjectDirs::from("", "", "hexicript")
        .map(|dirs| dirs.config_dir().join("hexicript.conf"))
        .filter(|p| p.exists())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
