//! Database access layer with connection pooling and migrations
//!
//! This module is organized by domain:
//! - `aliases` - Alias rule storage, resolution, and confidence maintenance

use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use tracing::info;

use crate::error::Result;

mod aliases;

pub use aliases::{AliasStats, MaintenanceReport};

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Parse a SQLite datetime string into a DateTime<Utc>
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    // SQLite stores as "YYYY-MM-DD HH:MM:SS" format
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|dt| dt.and_utc())
        .unwrap_or_else(|_| Utc::now())
}

/// Database wrapper with connection pooling
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    /// Path to the database file
    db_path: String,
}

impl Database {
    /// Create a new database connection pool
    pub fn new(path: &str) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::builder().max_size(10).build(manager)?;

        let db = Self {
            pool,
            db_path: path.to_string(),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Get the path to the database file
    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Create a throwaway database (for testing)
    ///
    /// Uses a temporary file rather than `:memory:` because every pooled
    /// connection must see the same database.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = format!(
            "{}/larder_test_{}_{}.db",
            std::env::temp_dir().display(),
            std::process::id(),
            id
        );

        let _ = std::fs::remove_file(&path);

        Self::new(&path)
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            -- WAL mode: readers don't block writers. Creates -wal and -shm
            -- sidecar files alongside the database.
            PRAGMA journal_mode = WAL;

            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;

            -- Learned mappings from raw receipt text to ingredient classes
            CREATE TABLE IF NOT EXISTS alias_rules (
                id INTEGER PRIMARY KEY,
                pattern TEXT NOT NULL,
                pattern_type TEXT NOT NULL,
                ingredient_class TEXT NOT NULL,
                merchant TEXT,
                household_id INTEGER,
                confidence REAL NOT NULL,
                hit_count INTEGER NOT NULL DEFAULT 0,
                miss_count INTEGER NOT NULL DEFAULT 0,
                source TEXT NOT NULL,
                last_used DATETIME DEFAULT CURRENT_TIMESTAMP,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(pattern, pattern_type, ingredient_class, merchant, household_id)
            );

            CREATE INDEX IF NOT EXISTS idx_alias_rules_pattern ON alias_rules(pattern);
            CREATE INDEX IF NOT EXISTS idx_alias_rules_scope
                ON alias_rules(household_id, merchant);

            -- One row per maintenance cycle, for the status command
            CREATE TABLE IF NOT EXISTS alias_maintenance_log (
                id INTEGER PRIMARY KEY,
                run_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                examined INTEGER NOT NULL,
                decayed INTEGER NOT NULL,
                boosted INTEGER NOT NULL,
                pruned INTEGER NOT NULL
            );
            "#,
        )?;

        info!(path = %self.db_path, "Database migrations complete");
        Ok(())
    }
}
