//! Storage layer for the proxgate door controller.
//!
//! This crate provides SQLite-backed persistence for the door directory and
//! the access audit trail.
//!
//! # Architecture
//!
//! - [`Database`] - Connection pool manager with embedded migrations
//! - [`DirectorySource`] - Source of per-door authorization data, implemented
//!   by [`SqliteDirectory`] and [`MemoryDirectory`], dispatched through
//!   [`AnyDirectory`]
//! - [`AccessLogRepository`] - Append-only audit trail of decisions
//!
//! # Schema
//!
//! Cards belong to an access group; `door_access` grants a group entry to a
//! door and carries the per-door `after_hours` and `magic` flags. A card is
//! authorized for a door when it is enabled, inside its optional
//! `valid_from`/`expires` window, and its group has a `door_access` row for
//! that door.
//!
//! # Examples
//!
//! ```no_run
//! use proxgate_storage::{Database, DatabaseConfig, DirectorySource, SqliteDirectory};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new(DatabaseConfig::new("proxgate.db")).await?;
//! let directory = SqliteDirectory::new(db.pool().clone());
//!
//! let snapshot = directory.load_door("front").await?;
//! println!(
//!     "{} cards, default unlocked: {}",
//!     snapshot.cards.len(),
//!     snapshot.default_unlocked
//! );
//! # Ok(())
//! # }
//! ```

pub mod access_log;
pub mod connection;
pub mod directory;
pub mod error;

pub use access_log::{AccessAction, AccessLogEntry, AccessLogRepository, SqliteAccessLogRepository};
pub use connection::{Database, DatabaseConfig};
pub use directory::{AnyDirectory, DirectorySource, DoorSnapshot, MemoryDirectory, SqliteDirectory};
pub use error::{StorageError, StorageResult};
