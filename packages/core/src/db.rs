//! SQLite pool creation and schema bootstrap.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

/// How long a connection waits on another connection's write lock.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS thresholds (
    id              TEXT PRIMARY KEY NOT NULL,
    name            TEXT NOT NULL UNIQUE,
    utility_type    TEXT NOT NULL,
    threshold_type  TEXT NOT NULL,
    value           REAL NOT NULL,
    threshold_state TEXT NOT NULL,
    period_type     TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_thresholds_lookup
    ON thresholds (utility_type, threshold_type, threshold_state)",
];

/// Open a pool for `database_url` and make sure the schema exists.
///
/// An in-memory database lives per connection, so `sqlite::memory:` is
/// pinned to a single connection. File databases run in WAL mode so readers
/// never block the writer, and writers queue on [`BUSY_TIMEOUT`].
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .busy_timeout(BUSY_TIMEOUT);
    let (options, pool_options) = if database_url.contains(":memory:") {
        let pool_options = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
        (options, pool_options)
    } else {
        let options = options.journal_mode(SqliteJournalMode::Wal);
        (options, SqlitePoolOptions::new().max_connections(5))
    };

    let pool = pool_options.connect_with(options).await?;

    bootstrap(&pool).await?;
    tracing::debug!(database_url, "Database schema ready");

    Ok(pool)
}

async fn bootstrap(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
