//! Schema management
//!
//! The schema is versioned through a `schema_version` table and migrated
//! forward on open. Each migration is a list of single statements because
//! SQLite prepares one statement at a time.

use crate::error::Result;
use sqlx::SqlitePool;
use tracing::debug;

/// Current schema version
pub const SCHEMA_VERSION: i64 = 1;

/// Forward migrations, ordered by version
const MIGRATIONS: &[(i64, &[&str])] = &[(
    1,
    &[
        "CREATE TABLE IF NOT EXISTS team_executions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT NOT NULL,
            team_name TEXT NOT NULL,
            task TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            agent_count INTEGER NOT NULL,
            error TEXT,
            started_at INTEGER NOT NULL,
            completed_at INTEGER
        )",
        "CREATE TABLE IF NOT EXISTS agent_results (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            execution_id INTEGER NOT NULL
                REFERENCES team_executions(id) ON DELETE CASCADE,
            agent_name TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            findings TEXT NOT NULL DEFAULT '[]',
            messages TEXT NOT NULL DEFAULT '[]',
            usage TEXT,
            duration_ms INTEGER,
            error TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )",
        "CREATE TABLE IF NOT EXISTS merge_snapshots (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            execution_id INTEGER NOT NULL
                REFERENCES team_executions(id) ON DELETE CASCADE,
            phase TEXT NOT NULL,
            input_data TEXT NOT NULL,
            output_data TEXT,
            created_at INTEGER NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_executions_session
            ON team_executions(session_id, team_name, started_at)",
        "CREATE INDEX IF NOT EXISTS idx_agent_results_execution
            ON agent_results(execution_id)",
        "CREATE INDEX IF NOT EXISTS idx_snapshots_execution
            ON merge_snapshots(execution_id)",
    ],
)];

/// Create or migrate the schema to [`SCHEMA_VERSION`]
pub async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
        .execute(pool)
        .await?;

    let current: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
        .fetch_one(pool)
        .await?;
    let current = current.unwrap_or(0);

    for (version, statements) in MIGRATIONS {
        if *version <= current {
            continue;
        }
        debug!(version, "Applying schema migration");
        for statement in *statements {
            sqlx::query(statement).execute(pool).await?;
        }
        sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
            .bind(version)
            .execute(pool)
            .await?;
    }

    Ok(())
}
