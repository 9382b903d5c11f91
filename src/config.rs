//! Hub configuration
//!
//! Loaded from a TOML (or JSON, by extension) file passed with `-f`. Every
//! section and field has a default, so an empty file is a valid config.
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 3000
//! cors_origins = ["http://localhost:8080"]
//!
//! [relay]
//! window_seconds = 16
//! window_capacity = 16
//! session_grace_secs = 30
//!
//! [storage]
//! backend = "sqlite"
//! path = "./attestation.db"
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use tracing::trace;

use crate::relay::WindowPolicy;
use crate::relay::dispatcher::DEFAULT_BROADCAST_CAPACITY;
use crate::relay::window::WINDOW_SECONDS;

/// Storage backend configuration
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    #[serde(rename = "none")]
    None,

    /// SQLite database (default)
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./attestation.db")
}

/// HTTP / WebSocket listener
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: crate::util::get_default_port(),
            cors_origins: vec!["http://localhost:8080".to_string()],
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Window and session lifetime settings
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub window_seconds: i64,
    pub window_capacity: usize,
    pub broadcast_capacity: usize,
    /// How long a disconnected machine's window is kept for a reconnect
    pub session_grace_secs: u64,
    pub janitor_interval_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            window_seconds: WINDOW_SECONDS,
            window_capacity: WINDOW_SECONDS as usize,
            broadcast_capacity: DEFAULT_BROADCAST_CAPACITY,
            session_grace_secs: 30,
            janitor_interval_secs: 5,
        }
    }
}

impl RelayConfig {
    pub fn window_policy(&self) -> WindowPolicy {
        WindowPolicy {
            max_age_secs: self.window_seconds,
            capacity: self.window_capacity,
        }
    }

    pub fn session_grace(&self) -> Duration {
        Duration::from_secs(self.session_grace_secs)
    }

    pub fn janitor_interval(&self) -> Duration {
        Duration::from_secs(self.janitor_interval_secs.max(1))
    }
}

#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub relay: RelayConfig,
    pub storage: StorageConfig,
}

impl Config {
    /// Apply `PORT` / `DATABASE_PATH` from the environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(crate::util::get_port(), crate::util::get_database_path());
    }

    pub fn apply_overrides(&mut self, port: Option<u16>, database_path: Option<PathBuf>) {
        if let Some(port) = port {
            trace!("port overridden to {port}");
            self.server.port = port;
        }

        if let Some(path) = database_path {
            trace!("database path overridden to {}", path.display());
            self.storage = StorageConfig::Sqlite { path };
        }
    }

    fn validate(self) -> anyhow::Result<Self> {
        if self.relay.window_seconds < 0 {
            anyhow::bail!("relay.window_seconds must not be negative");
        }
        if self.relay.window_capacity == 0 {
            anyhow::bail!("relay.window_capacity must be at least 1");
        }
        Ok(self)
    }
}

pub fn parse_config(content: &str, json: bool) -> anyhow::Result<Config> {
    let config: Config = if json {
        serde_json::from_str(content).context("invalid JSON configuration")?
    } else {
        toml::from_str(content).context("invalid TOML configuration")?
    };

    config.validate()
}

pub fn read_config_file(path: impl AsRef<Path>) -> anyhow::Result<Config> {
    let path = path.as_ref();
    let file_content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let json = path.extension().is_some_and(|ext| ext == "json");

    parse_config(&file_content, json).inspect(|config| trace!("loaded config: {config:?}"))
}
