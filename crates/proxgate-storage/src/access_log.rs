//! Audit trail of access decisions.

#![allow(async_fn_in_trait)]

use crate::error::StorageResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::fmt;

/// Outcome recorded for one decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum AccessAction {
    Allow,
    Deny,
}

impl fmt::Display for AccessAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessAction::Allow => write!(f, "ALLOW"),
            AccessAction::Deny => write!(f, "DENY"),
        }
    }
}

/// A row of the `access_log` table.
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use proxgate_storage::access_log::{AccessAction, AccessLogEntry};
///
/// let entry = AccessLogEntry::new(Utc::now(), "40-12345", AccessAction::Allow, "front")
///     .with_detail("Optic");
/// assert_eq!(entry.detail.as_deref(), Some("Optic"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AccessLogEntry {
    /// Auto-increment primary key (0 before insertion)
    pub id: i64,

    /// When the card was read
    pub logged: DateTime<Utc>,

    /// Card identifier as presented (`"{facility}-{number}"`)
    pub card_id: String,

    pub action: AccessAction,

    /// Door name from configuration
    pub door: String,

    /// Holder name, or why the decision was made
    pub detail: Option<String>,
}

impl AccessLogEntry {
    pub fn new(
        logged: DateTime<Utc>,
        card_id: impl Into<String>,
        action: AccessAction,
        door: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            logged,
            card_id: card_id.into(),
            action,
            door: door.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Repository trait for the access log
pub trait AccessLogRepository: Send + Sync {
    /// Append an entry, returning its id
    async fn create(&self, entry: &AccessLogEntry) -> StorageResult<i64>;

    /// Most recent entries for a door, newest first
    async fn find_by_door(&self, door: &str, limit: i64) -> StorageResult<Vec<AccessLogEntry>>;

    /// Count entries for a card with the given action since `since`
    async fn count_by_card(
        &self,
        card_id: &str,
        action: AccessAction,
        since: DateTime<Utc>,
    ) -> StorageResult<i64>;
}

/// SQLite implementation of [`AccessLogRepository`]
#[derive(Debug, Clone)]
pub struct SqliteAccessLogRepository {
    pool: SqlitePool,
}

impl SqliteAccessLogRepository {
    /// Create a new SQLite access log repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl AccessLogRepository for SqliteAccessLogRepository {
    async fn create(&self, entry: &AccessLogEntry) -> StorageResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO access_log (logged, card_id, action, door, detail)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.logged)
        .bind(&entry.card_id)
        .bind(entry.action)
        .bind(&entry.door)
        .bind(&entry.detail)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn find_by_door(&self, door: &str, limit: i64) -> StorageResult<Vec<AccessLogEntry>> {
        let entries = sqlx::query_as::<_, AccessLogEntry>(
            r#"
            SELECT id, logged, card_id, action, door, detail
            FROM access_log
            WHERE door = ?
            ORDER BY logged DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(door)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    async fn count_by_card(
        &self,
        card_id: &str,
        action: AccessAction,
        since: DateTime<Utc>,
    ) -> StorageResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM access_log
            WHERE card_id = ? AND action = ? AND logged >= ?
            "#,
        )
        .bind(card_id)
        .bind(action)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Database;
    use chrono::Duration;

    #[tokio::test]
    async fn test_create_and_find_by_door() {
        let db = Database::in_memory().await.unwrap();
        let repo = SqliteAccessLogRepository::new(db.pool().clone());
        let now = Utc::now();

        repo.create(
            &AccessLogEntry::new(now - Duration::minutes(1), "40-12345", AccessAction::Allow, "front")
                .with_detail("Optic"),
        )
        .await
        .unwrap();
        repo.create(&AccessLogEntry::new(now, "99-0", AccessAction::Deny, "front"))
            .await
            .unwrap();
        repo.create(&AccessLogEntry::new(now, "40-12345", AccessAction::Allow, "lab"))
            .await
            .unwrap();

        let entries = repo.find_by_door("front", 10).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].card_id, "99-0");
        assert_eq!(entries[0].action, AccessAction::Deny);
        assert_eq!(entries[0].detail, None);
        assert_eq!(entries[1].detail.as_deref(), Some("Optic"));
    }

    #[tokio::test]
    async fn test_count_by_card() {
        let db = Database::in_memory().await.unwrap();
        let repo = SqliteAccessLogRepository::new(db.pool().clone());
        let now = Utc::now();

        for minutes in [1, 2, 90] {
            repo.create(&AccessLogEntry::new(
                now - Duration::minutes(minutes),
                "99-0",
                AccessAction::Deny,
                "front",
            ))
            .await
            .unwrap();
        }

        let recent = repo
            .count_by_card("99-0", AccessAction::Deny, now - Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(recent, 2);

        let allowed = repo
            .count_by_card("99-0", AccessAction::Allow, now - Duration::hours(2))
            .await
            .unwrap();
        assert_eq!(allowed, 0);
    }

    #[test]
    fn test_access_action_display() {
        assert_eq!(AccessAction::Allow.to_string(), "ALLOW");
        assert_eq!(AccessAction::Deny.to_string(), "DENY");
    }
}
