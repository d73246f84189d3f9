//! SQLite connection pool and schema.
//!
//! The tracker keeps everything it persists in a single `kv_store` table,
//! one row per logical namespace.

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv_store (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

/// Open a pool for `database_url` and make sure the schema exists.
///
/// In-memory databases are private to a single connection, so the pool is
/// capped at one connection, which is never recycled, when `database_url`
/// points at `:memory:`.
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = if database_url.contains(":memory:") {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(4)
    };

    let pool = options.connect(database_url).await?;

    sqlx::query(SCHEMA).execute(&pool).await?;

    tracing::debug!("Database ready at {}", database_url);
    Ok(pool)
}
