use thiserror::Error;

/// Failures at the member-record store boundary.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("member '{0}' not found")]
    NotFound(String),

    #[error("record changed since read (expected version {expected}, found {found})")]
    Stale { expected: u64, found: u64 },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

/// Failures surfaced by the Dan-completion synchronizer. All of them are
/// recoverable: the caller keeps its last known progress and may retry.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("member '{0}' not found")]
    NotFound(String),

    #[error("persistence unavailable: {0}")]
    PersistenceUnavailable(#[source] StoreError),

    #[error("record kept changing during sync: {0}")]
    StaleWrite(#[source] StoreError),
}

impl From<StoreError> for SyncError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(user) => SyncError::NotFound(user),
            StoreError::Stale { .. } => SyncError::StaleWrite(e),
            other => SyncError::PersistenceUnavailable(other),
        }
    }
}
