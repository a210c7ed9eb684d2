//! Directory source: who may open which door.
//!
//! The directory is the source of truth behind each door's authorization
//! cache. For a door name it answers with every currently valid, enabled
//! card authorized for that door plus the door's administrative
//! default-unlocked flag, and it accepts updates of that flag.
//!
//! Two implementations are provided: [`SqliteDirectory`] over the schema in
//! `migrations/`, and [`MemoryDirectory`] for tests and simulators.
//! [`AnyDirectory`] dispatches between them.

#![allow(async_fn_in_trait)]

use crate::error::{StorageError, StorageResult};
use chrono::{DateTime, Utc};
use proxgate_core::{AuthorizedCard, CardKey};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

/// Everything the directory knows about one door at one instant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DoorSnapshot {
    pub cards: HashMap<CardKey, AuthorizedCard>,
    pub default_unlocked: bool,
}

/// Source of door authorization data.
pub trait DirectorySource: Send + Sync {
    /// Load the authorized cards and default-unlocked flag of `door`.
    ///
    /// Only cards that are enabled and inside their validity window at the
    /// time of the query are returned.
    async fn load_door(&self, door: &str) -> StorageResult<DoorSnapshot>;

    /// Persist the default-unlocked flag of `door`.
    async fn set_default_unlocked(&self, door: &str, unlocked: bool) -> StorageResult<()>;
}

#[derive(Debug, sqlx::FromRow)]
struct AuthorizedCardRow {
    card_id: String,
    real_name: String,
    nick_name: String,
    after_hours: bool,
    magic: bool,
}

/// SQLite implementation of [`DirectorySource`]
#[derive(Debug, Clone)]
pub struct SqliteDirectory {
    pool: SqlitePool,
}

impl SqliteDirectory {
    /// Create a new SQLite directory
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Make sure a door row exists for `door`. Returns `true` if it was
    /// created.
    pub async fn ensure_door(&self, door: &str) -> StorageResult<bool> {
        let result = sqlx::query("INSERT OR IGNORE INTO door (name) VALUES (?)")
            .bind(door)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn load_door_at(&self, door: &str, now: DateTime<Utc>) -> StorageResult<DoorSnapshot> {
        let mut tx = self.pool.begin().await?;

        let default_unlocked: Option<bool> =
            sqlx::query_scalar("SELECT default_unlocked FROM door WHERE name = ?")
                .bind(door)
                .fetch_optional(&mut *tx)
                .await?;
        let default_unlocked =
            default_unlocked.ok_or_else(|| StorageError::UnknownDoor(door.to_string()))?;

        let rows = sqlx::query_as::<_, AuthorizedCardRow>(
            r#"
            SELECT c.card_id, c.user AS real_name, c.nick AS nick_name,
                   da.after_hours, da.magic
            FROM card c
            JOIN door_access da ON da.access_group_id = c.access_group_id
            JOIN door d ON d.id = da.door_id
            WHERE d.name = ?
              AND c.disabled = 0
              AND (c.valid_from IS NULL OR c.valid_from <= ?)
              AND (c.expires IS NULL OR c.expires > ?)
            "#,
        )
        .bind(door)
        .bind(now)
        .bind(now)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        let mut cards = HashMap::with_capacity(rows.len());
        for row in rows {
            let key = match CardKey::new(&row.card_id) {
                Ok(key) => key,
                Err(e) => {
                    warn!(door, card = %row.card_id, error = %e, "skipping card with invalid id");
                    continue;
                }
            };
            let card = AuthorizedCard::new(row.real_name, row.nick_name)
                .with_after_hours(row.after_hours)
                .with_magic(row.magic);
            cards.insert(key, card);
        }

        debug!(door, cards = cards.len(), default_unlocked, "directory loaded");
        Ok(DoorSnapshot {
            cards,
            default_unlocked,
        })
    }
}

impl DirectorySource for SqliteDirectory {
    async fn load_door(&self, door: &str) -> StorageResult<DoorSnapshot> {
        self.load_door_at(door, Utc::now()).await
    }

    async fn set_default_unlocked(&self, door: &str, unlocked: bool) -> StorageResult<()> {
        let result = sqlx::query("UPDATE door SET default_unlocked = ? WHERE name = ?")
            .bind(unlocked)
            .bind(door)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::UnknownDoor(door.to_string()));
        }
        Ok(())
    }
}

/// In-memory [`DirectorySource`].
///
/// Clones share the same data, so a test can keep one clone to edit the
/// directory while a door reads from another.
#[derive(Debug, Clone, Default)]
pub struct MemoryDirectory {
    inner: Arc<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    doors: Mutex<HashMap<String, DoorSnapshot>>,
    unavailable: AtomicBool,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace everything known about `door`.
    pub fn insert_door(&self, door: impl Into<String>, snapshot: DoorSnapshot) {
        self.doors().insert(door.into(), snapshot);
    }

    /// Authorize `card` at `door`, creating the door if needed.
    pub fn insert_card(&self, door: &str, key: CardKey, card: AuthorizedCard) {
        self.doors()
            .entry(door.to_string())
            .or_default()
            .cards
            .insert(key, card);
    }

    /// Revoke `key` at `door`.
    pub fn remove_card(&self, door: &str, key: &CardKey) {
        if let Some(snapshot) = self.doors().get_mut(door) {
            snapshot.cards.remove(key);
        }
    }

    /// Current default-unlocked flag of `door`, if the door exists.
    pub fn default_unlocked(&self, door: &str) -> Option<bool> {
        self.doors().get(door).map(|snapshot| snapshot.default_unlocked)
    }

    /// Make every call fail as if the directory were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::Release);
    }

    fn doors(&self) -> std::sync::MutexGuard<'_, HashMap<String, DoorSnapshot>> {
        self.inner
            .doors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn check_available(&self) -> StorageResult<()> {
        if self.inner.unavailable.load(Ordering::Acquire) {
            return Err(StorageError::Unavailable("memory directory offline".into()));
        }
        Ok(())
    }
}

impl DirectorySource for MemoryDirectory {
    async fn load_door(&self, door: &str) -> StorageResult<DoorSnapshot> {
        self.check_available()?;
        self.doors()
            .get(door)
            .cloned()
            .ok_or_else(|| StorageError::UnknownDoor(door.to_string()))
    }

    async fn set_default_unlocked(&self, door: &str, unlocked: bool) -> StorageResult<()> {
        self.check_available()?;
        let mut doors = self.doors();
        let snapshot = doors
            .get_mut(door)
            .ok_or_else(|| StorageError::UnknownDoor(door.to_string()))?;
        snapshot.default_unlocked = unlocked;
        Ok(())
    }
}

/// Any supported directory source.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum AnyDirectory {
    Sqlite(SqliteDirectory),
    Memory(MemoryDirectory),
}

impl From<SqliteDirectory> for AnyDirectory {
    fn from(directory: SqliteDirectory) -> Self {
        Self::Sqlite(directory)
    }
}

impl From<MemoryDirectory> for AnyDirectory {
    fn from(directory: MemoryDirectory) -> Self {
        Self::Memory(directory)
    }
}

impl DirectorySource for AnyDirectory {
    async fn load_door(&self, door: &str) -> StorageResult<DoorSnapshot> {
        match self {
            Self::Sqlite(directory) => directory.load_door(door).await,
            Self::Memory(directory) => directory.load_door(door).await,
        }
    }

    async fn set_default_unlocked(&self, door: &str, unlocked: bool) -> StorageResult<()> {
        match self {
            Self::Sqlite(directory) => directory.set_default_unlocked(door, unlocked).await,
            Self::Memory(directory) => directory.set_default_unlocked(door, unlocked).await,
        }
    }
}
