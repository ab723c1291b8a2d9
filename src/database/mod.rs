use anyhow::Result;
use sqlx::{migrate::MigrateDatabase, sqlite::SqlitePoolOptions, Pool, Sqlite};
use tracing::info;

pub mod llm_calls;
pub mod logos;

/// Statements applied on startup. The schema is small enough that embedded
/// idempotent DDL beats a migration directory.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS logos (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        symbol TEXT NOT NULL UNIQUE,
        company_name TEXT NOT NULL,
        source TEXT NOT NULL,
        original_url TEXT NOT NULL,
        has_xs BOOLEAN NOT NULL DEFAULT 0,
        has_s BOOLEAN NOT NULL DEFAULT 0,
        has_m BOOLEAN NOT NULL DEFAULT 0,
        has_l BOOLEAN NOT NULL DEFAULT 0,
        has_xl BOOLEAN NOT NULL DEFAULT 0,
        status TEXT NOT NULL DEFAULT 'pending',
        error_message TEXT,
        created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS llm_calls (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        symbol TEXT NOT NULL,
        provider TEXT NOT NULL,
        model TEXT NOT NULL,
        result_url TEXT,
        success BOOLEAN NOT NULL,
        duration_ms INTEGER,
        created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_logos_symbol ON logos(symbol)",
    "CREATE INDEX IF NOT EXISTS idx_logos_status ON logos(status)",
    "CREATE INDEX IF NOT EXISTS idx_llm_calls_symbol ON llm_calls(symbol)",
];

#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    pub async fn new(url: &str) -> Result<Self> {
        // Create database if it doesn't exist (for SQLite)
        if !Sqlite::database_exists(url).await? {
            Sqlite::create_database(url).await?;
        }

        // Single writer connection; SQLite serializes writes anyway and a
        // second connection just turns contention into SQLITE_BUSY.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await?;

        sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
        sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("Database schema is up to date");
        Ok(())
    }
}
