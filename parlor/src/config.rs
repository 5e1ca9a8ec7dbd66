//! Configuration for the Parlor client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/parlor/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

use crate::effects::EffectSettings;
use crate::transport::session::SessionConfig;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// The server URL is not a valid ws:// or wss:// URL.
    #[error("invalid server url {url}: {reason}")]
    InvalidServerUrl {
        /// The offending URL.
        url: String,
        /// Why it was rejected.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    server: ServerFileConfig,
    session: SessionFileConfig,
    effects: EffectsFileConfig,
}

/// `[server]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    url: Option<String>,
    token: Option<String>,
}

/// `[session]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SessionFileConfig {
    initial_backoff_ms: Option<u64>,
    max_backoff_secs: Option<u64>,
    event_buffer: Option<usize>,
}

/// `[effects]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct EffectsFileConfig {
    notifications: Option<bool>,
    sound: Option<String>,
    speech: Option<bool>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Chat server WebSocket URL; `None` runs the offline demo.
    pub server_url: Option<String>,
    /// Stored credential for token login.
    pub token: Option<String>,
    /// Reconnect tuning for the session supervisor.
    pub session: SessionConfig,
    /// Side-effect switches. `sound` of `"none"` disables sound.
    pub effects: EffectSettings,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            token: None,
            session: SessionConfig::default(),
            effects: EffectSettings::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed, or if the resolved server URL is not a WebSocket URL.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        let config = Self::resolve(cli, &file);
        if let Some(ref url) = config.server_url {
            validate_server_url(url)?;
        }
        Ok(config)
    }

    /// Resolve a `ClientConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default. Separated from `load()` to
    /// enable unit testing without CLI parsing.
    #[must_use]
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        let sound = cli
            .sound
            .clone()
            .or_else(|| file.effects.sound.clone())
            .or(defaults.effects.sound);

        Self {
            server_url: cli.server_url.clone().or_else(|| file.server.url.clone()),
            token: cli.token.clone().or_else(|| file.server.token.clone()),
            session: SessionConfig {
                initial_backoff: file
                    .session
                    .initial_backoff_ms
                    .map_or(defaults.session.initial_backoff, Duration::from_millis),
                max_backoff: file
                    .session
                    .max_backoff_secs
                    .map_or(defaults.session.max_backoff, Duration::from_secs),
                event_buffer: file
                    .session
                    .event_buffer
                    .unwrap_or(defaults.session.event_buffer),
            },
            effects: EffectSettings {
                notifications: file
                    .effects
                    .notifications
                    .unwrap_or(defaults.effects.notifications),
                // "none" disables the sound channel outright.
                sound: sound.filter(|name| name != "none"),
                speech: file.effects.speech.unwrap_or(defaults.effects.speech),
            },
        }
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Realtime chat synchronization client")]
pub struct CliArgs {
    /// WebSocket URL of the chat server.
    #[arg(long, env = "PARLOR_SERVER")]
    pub server_url: Option<String>,

    /// Credential token for login (falls back to guest when absent
    /// or refused).
    #[arg(long, env = "PARLOR_TOKEN")]
    pub token: Option<String>,

    /// Path to config file (default: `~/.config/parlor/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Notification sound name ("none" disables sound).
    #[arg(long)]
    pub sound: Option<String>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "PARLOR_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/parlor.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            // No config dir available — use defaults.
            return Ok(ConfigFile::default());
        };
        config_dir.join("parlor").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}

/// Check the server URL parses and carries a WebSocket scheme.
fn validate_server_url(raw: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(raw).map_err(|e| ConfigError::InvalidServerUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "ws" | "wss" => Ok(()),
        other => Err(ConfigError::InvalidServerUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme {other}"),
        }),
    }
}
