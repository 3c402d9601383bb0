//! Configuration for the task board server.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/taskboard/config.toml`)
//! 4. Compiled defaults
//!
//! Users for the static token authenticator only come from the file:
//!
//! ```toml
//! [[auth.users]]
//! token = "s3cret"
//! id = "alice"
//! name = "Alice"
//! ```

use std::path::PathBuf;

use taskboard_proto::presence::UserRef;

use crate::audit::DEFAULT_AUDIT_CAPACITY;
use crate::auth::StaticTokenAuthenticator;
use crate::server::DEFAULT_MAX_FRAME_SIZE;

/// Errors that can occur when loading server configuration.
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
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct BoardConfigFile {
    server: ServerFileConfig,
    log: LogFileConfig,
    auth: AuthFileConfig,
}

/// `[server]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    bind_addr: Option<String>,
    max_frame_size: Option<usize>,
    audit_capacity: Option<usize>,
}

/// `[log]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct LogFileConfig {
    level: Option<String>,
    file: Option<PathBuf>,
}

/// `[auth]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct AuthFileConfig {
    users: Vec<UserEntry>,
}

/// One `[[auth.users]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct UserEntry {
    /// Session token presented by the client.
    pub token: String,
    /// Stable user id.
    pub id: String,
    /// Display name.
    pub name: String,
}

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// CLI arguments for the board server.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Collaborative task board server")]
pub struct BoardCliArgs {
    /// Address to bind the server to.
    #[arg(short, long, env = "TASKBOARD_ADDR")]
    pub bind: Option<String>,

    /// Path to config file (default: `~/.config/taskboard/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Maximum accepted WebSocket frame size in bytes.
    #[arg(long)]
    pub max_frame_size: Option<usize>,

    /// Number of audit entries kept in memory.
    #[arg(long)]
    pub audit_capacity: Option<usize>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, env = "TASKBOARD_LOG")]
    pub log_level: Option<String>,

    /// Write logs to this file instead of stderr.
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved board server configuration.
#[derive(Debug, Clone)]
pub struct BoardConfig {
    /// Address to bind the server to (e.g., `0.0.0.0:9000`).
    pub bind_addr: String,
    /// Maximum accepted frame size in bytes.
    pub max_frame_size: usize,
    /// Number of audit entries kept before the oldest is evicted.
    pub audit_capacity: usize,
    /// Log level filter string.
    pub log_level: String,
    /// Log file path; `None` logs to stderr.
    pub log_file: Option<PathBuf>,
    /// Token table for the static authenticator.
    pub users: Vec<UserEntry>,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:9000".to_string(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            audit_capacity: DEFAULT_AUDIT_CAPACITY,
            log_level: "info".to_string(),
            log_file: None,
            users: Vec::new(),
        }
    }
}

impl BoardConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an error.
    /// If no `--config` is given, the default path is tried and a missing
    /// file is treated as empty config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file cannot be read or parsed.
    pub fn load(cli: &BoardCliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, file))
    }

    /// Priority: CLI > file > default.
    fn resolve(cli: &BoardCliArgs, file: BoardConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            bind_addr: cli
                .bind
                .clone()
                .or(file.server.bind_addr)
                .unwrap_or(defaults.bind_addr),
            max_frame_size: cli
                .max_frame_size
                .or(file.server.max_frame_size)
                .unwrap_or(defaults.max_frame_size),
            audit_capacity: cli
                .audit_capacity
                .or(file.server.audit_capacity)
                .unwrap_or(defaults.audit_capacity),
            log_level: cli
                .log_level
                .clone()
                .or(file.log.level)
                .unwrap_or(defaults.log_level),
            log_file: cli.log_file.clone().or(file.log.file),
            users: file.auth.users,
        }
    }

    /// Builds the token authenticator from the configured users.
    ///
    /// A token listed twice keeps its last entry.
    #[must_use]
    pub fn authenticator(&self) -> StaticTokenAuthenticator {
        self.users
            .iter()
            .map(|u| (u.token.clone(), UserRef::new(u.id.as_str(), u.name.as_str())))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<BoardConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(BoardConfigFile::default());
        };
        config_dir.join("taskboard").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BoardConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
