use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Not authenticated")]
    NotAuthenticated,
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

impl InfraError {
    pub fn is_transient(&self) -> bool {
        match self {
            InfraError::Transport(message) => {
                let message = message.to_ascii_lowercase();
                !(message.contains("permission") || message.contains("denied"))
            }
            InfraError::Sqlite(rusqlite::Error::SqliteFailure(error, _)) => matches!(
                error.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_are_transient_unless_permission_related() {
        assert!(InfraError::Transport("network unreachable".to_string()).is_transient());
        assert!(!InfraError::Transport("PERMISSION_DENIED".to_string()).is_transient());
        assert!(!InfraError::NotAuthenticated.is_transient());
        assert!(!InfraError::InvalidConfig("schema".to_string()).is_transient());
    }
}
