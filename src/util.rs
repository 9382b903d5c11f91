use std::path::{Path, PathBuf};

use anyhow::Context;

const PORT: &str = "PORT";

const DEFAULT_PORT: u16 = 3000;

pub fn get_default_port() -> u16 {
    DEFAULT_PORT
}

/// Port override from the environment, if set and valid
pub fn get_port() -> Option<u16> {
    std::env::var(PORT).ok().and_then(|port| port.trim().parse().ok())
}

const DATABASE_PATH: &str = "DATABASE_PATH";

pub fn get_database_path() -> Option<PathBuf> {
    std::env::var(DATABASE_PATH)
        .ok()
        .filter(|path| !path.trim().is_empty())
        .map(PathBuf::from)
}

pub const DEFAULT_MACHINE_ID_PATH: &str = "/etc/machine-id";

/// Read the machine identifier (e.g. `/etc/machine-id`)
pub fn read_machine_id(path: impl AsRef<Path>) -> anyhow::Result<String> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read machine id from {}", path.display()))?;

    let machine_id = content.trim();
    if machine_id.is_empty() {
        anyhow::bail!("machine id file {} is empty", path.display());
    }

    Ok(machine_id.to_string())
}

/// Seconds since the Unix epoch
pub fn unix_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}
