//! SQLite pool shared by the directory source and the audit writer.

use crate::error::{StorageError, StorageResult};
use sqlx::ConnectOptions;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// Where the directory lives and how the pool behaves.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub database_path: String,

    /// Upper bound on pooled connections; every door refresh and the audit
    /// writer draw from the same pool.
    pub max_connections: u32,

    pub acquire_timeout: Duration,

    /// Create the file (and its parent directory) on first start.
    pub create_if_missing: bool,

    /// Apply embedded migrations when connecting.
    pub auto_migrate: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_path: "proxgate.db".to_string(),
            max_connections: 5,
            acquire_timeout: Duration::from_secs(10),
            create_if_missing: true,
            auto_migrate: true,
        }
    }
}

impl DatabaseConfig {
    pub fn new(database_path: impl Into<String>) -> Self {
        Self {
            database_path: database_path.into(),
            ..Default::default()
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    pub fn auto_migrate(mut self, migrate: bool) -> Self {
        self.auto_migrate = migrate;
        self
    }

    /// WAL journaling with foreign keys on; readers never block the writer.
    fn connect_options(&self) -> StorageResult<SqliteConnectOptions> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", self.database_path))
            .map_err(|e| StorageError::Configuration(format!("invalid database path: {e}")))?
            .create_if_missing(self.create_if_missing)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT)
            .disable_statement_logging();
        Ok(options)
    }

    fn ensure_parent_dir(&self) -> StorageResult<()> {
        if !self.create_if_missing {
            return Ok(());
        }
        match Path::new(&self.database_path).parent() {
            Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StorageError::Configuration(format!(
                        "cannot create {}: {e}",
                        parent.display()
                    ))
                })
            }
            _ => Ok(()),
        }
    }
}

/// Connection pool over the proxgate database.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (and by default create and migrate) the database.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use proxgate_storage::connection::{Database, DatabaseConfig};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let db = Database::new(DatabaseConfig::new("/var/lib/proxgate/directory.db").max_connections(4))
    ///     .await?;
    /// db.health_check().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn new(config: DatabaseConfig) -> StorageResult<Self> {
        config.ensure_parent_dir()?;

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect_with(config.connect_options()?)
            .await?;
        let db = Self { pool };

        if config.auto_migrate {
            db.migrate().await?;
        }

        info!(
            path = %config.database_path,
            max_connections = config.max_connections,
            "database ready"
        );
        Ok(db)
    }

    /// Private migrated database on a single connection, for tests and
    /// simulators.
    pub async fn in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        // Each connection to :memory: is its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Apply the migrations under the workspace `migrations/` directory,
    /// embedded at compile time.
    pub async fn migrate(&self) -> StorageResult<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn health_check(&self) -> StorageResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_config_defaults() {
        let config = DatabaseConfig::default();

        assert_eq!(config.database_path, "proxgate.db");
        assert_eq!(config.max_connections, 5);
        assert!(config.create_if_missing);
        assert!(config.auto_migrate);
    }

    #[test]
    fn test_database_config_builder() {
        let config = DatabaseConfig::new("doors.db")
            .max_connections(2)
            .acquire_timeout(Duration::from_secs(1))
            .create_if_missing(false)
            .auto_migrate(false);

        assert_eq!(config.database_path, "doors.db");
        assert_eq!(config.max_connections, 2);
        assert_eq!(config.acquire_timeout, Duration::from_secs(1));
        assert!(!config.create_if_missing);
        assert!(!config.auto_migrate);
    }

    #[tokio::test]
    async fn test_missing_file_without_create_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent").join("proxgate.db");
        let config = DatabaseConfig::new(path.to_str().unwrap()).create_if_missing(false);

        assert!(Database::new(config).await.is_err());
        assert!(!path.parent().unwrap().exists());
    }
}
