use proxgate_storage::StorageError;
use thiserror::Error;

/// Errors surfaced by door management.
#[derive(Debug, Error)]
pub enum DoorError {
    /// No door with this name is running.
    #[error("Unknown door: {0}")]
    UnknownDoor(String),

    /// A door with this name is already running.
    #[error("Duplicate door: {0}")]
    DuplicateDoor(String),

    /// The directory source failed.
    #[error("Directory error: {0}")]
    Directory(#[from] StorageError),

    /// Invalid door configuration.
    #[error(transparent)]
    Config(#[from] proxgate_core::Error),
}

pub type Result<T> = std::result::Result<T, DoorError>;
