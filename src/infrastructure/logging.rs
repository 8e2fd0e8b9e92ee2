use crate::infrastructure::error::InfraError;
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

pub const LOG_FILE: &str = "checkin.log";

/// Installs a JSON-lines subscriber writing to `logs_dir/checkin.log`.
/// `RUST_LOG` takes precedence over `default_level`. Returns `false` when a
/// global subscriber was already installed.
pub fn init_logging(logs_dir: &Path, default_level: &str) -> Result<bool, InfraError> {
    fs::create_dir_all(logs_dir)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(logs_dir.join(LOG_FILE))?;
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|error| {
            InfraError::InvalidConfig(format!("invalid log level '{default_level}': {error}"))
        })?;

    let installed = tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .try_init()
        .is_ok();
    Ok(installed)
}
