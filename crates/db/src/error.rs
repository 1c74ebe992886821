use locsync_core::error::SyncError;
use locsync_core::types::DbId;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Cannot encode or decode stored JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Cannot write asset: {0}")]
    Io(#[from] std::io::Error),

    #[error("Target record {0} does not exist")]
    RecordMissing(DbId),
}

impl DbError {
    /// Map into the engine taxonomy as a repository failure.
    pub fn into_repository(self) -> SyncError {
        SyncError::Repository(self.to_string())
    }

    /// Map into the engine taxonomy as a state store failure.
    pub fn into_state(self) -> SyncError {
        SyncError::State(self.to_string())
    }
}

impl From<DbError> for SyncError {
    fn from(err: DbError) -> Self {
        err.into_repository()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn maps_into_engine_errors() {
        assert_matches!(
            SyncError::from(DbError::RecordMissing(4)),
            SyncError::Repository(msg) if msg.contains("4")
        );
        assert_matches!(DbError::RecordMissing(4).into_state(), SyncError::State(_));
    }
}
