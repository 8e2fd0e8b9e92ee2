use crate::infrastructure::config::{ensure_default_configs, load_app_config, AppConfig};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::logging::init_logging;
use crate::infrastructure::storage::initialize_database;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug)]
pub struct BootstrapResult {
    pub workspace_root: PathBuf,
    pub database_path: PathBuf,
    pub logs_dir: PathBuf,
    pub config: AppConfig,
}

pub fn bootstrap_workspace(workspace_root: &Path) -> Result<BootstrapResult, InfraError> {
    let config_dir = workspace_root.join("config");
    let state_dir = workspace_root.join("state");
    let logs_dir = workspace_root.join("logs");
    let database_path = state_dir.join("checkin.sqlite");

    fs::create_dir_all(&config_dir)?;
    fs::create_dir_all(&state_dir)?;
    fs::create_dir_all(&logs_dir)?;

    ensure_default_configs(&config_dir)?;
    let config = load_app_config(&config_dir)?;
    initialize_database(&database_path)?;
    init_logging(&logs_dir, &config.log_level)?;
    info!(
        workspace_root = %workspace_root.display(),
        timezone = %config.timezone,
        "workspace bootstrapped"
    );

    Ok(BootstrapResult {
        workspace_root: workspace_root.to_path_buf(),
        database_path,
        logs_dir,
        config,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::logging::LOG_FILE;

    #[test]
    fn creates_layout_defaults_and_schema() {
        let dir = tempfile::tempdir().expect("temp dir");

        let result = bootstrap_workspace(dir.path()).expect("bootstrap");

        assert!(dir.path().join("config/app.json").exists());
        assert!(dir.path().join("config/toggles.json").exists());
        assert!(result.database_path.exists());
        assert!(result.logs_dir.join(LOG_FILE).exists());
        assert_eq!(result.config, AppConfig::default());

        let connection = rusqlite::Connection::open(&result.database_path).expect("open db");
        let tables: i64 = connection
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('senior_state', 'check_ins')",
                [],
                |row| row.get(0),
            )
            .expect("count tables");
        assert_eq!(tables, 2);
    }

    #[test]
    fn bootstrap_is_repeatable() {
        let dir = tempfile::tempdir().expect("temp dir");
        bootstrap_workspace(dir.path()).expect("first bootstrap");
        bootstrap_workspace(dir.path()).expect("second bootstrap");
    }

    #[test]
    fn invalid_config_fails_bootstrap() {
        let dir = tempfile::tempdir().expect("temp dir");
        fs::create_dir_all(dir.path().join("config")).expect("config dir");
        fs::write(dir.path().join("config/app.json"), r#"{"schema":1,"timezone":"Nowhere/Land"}"#)
            .expect("write app.json");

        assert!(matches!(
            bootstrap_workspace(dir.path()),
            Err(InfraError::InvalidConfig(_))
        ));
    }
}
