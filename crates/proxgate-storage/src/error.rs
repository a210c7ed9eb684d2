use thiserror::Error;

/// Storage-specific error types.
///
/// Every failure of the directory source or the audit log surfaces as one of
/// these. Callers treat them as recoverable: a failed refresh keeps the
/// previous authorization table.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database connection or query execution failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration execution failed
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// The directory has no door with this name
    #[error("Unknown door: {0}")]
    UnknownDoor(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The directory could not be reached (used by in-memory sources)
    #[error("Directory unavailable: {0}")]
    Unavailable(String),
}

/// Specialized result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
