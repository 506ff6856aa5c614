//! Database schema initialization

use sqlx::SqlitePool;

use crate::error::Result;

/// Initialize the database schema
pub async fn initialize_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(SCHEMA_SQL)
        .execute(pool)
        .await?;

    Ok(())
}

// Timestamps are INTEGER microseconds since the Unix epoch.
const SCHEMA_SQL: &str = r#"
-- Projects (soft-deleted via is_deleted, never removed)
CREATE TABLE IF NOT EXISTS projects (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    color TEXT NOT NULL,
    origin_device TEXT NOT NULL DEFAULT '',
    is_deleted INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_projects_owner_updated ON projects(owner_id, updated_at);

-- Completed timer intervals; project_id is not a foreign key on purpose
CREATE TABLE IF NOT EXISTS timer_sessions (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    project_id TEXT,
    start_time INTEGER NOT NULL,
    end_time INTEGER NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    origin_device TEXT NOT NULL DEFAULT '',
    is_deleted INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_timer_sessions_owner_updated ON timer_sessions(owner_id, updated_at);
CREATE INDEX IF NOT EXISTS idx_timer_sessions_project_id ON timer_sessions(project_id);

-- One watermark per (owner, device)
CREATE TABLE IF NOT EXISTS device_sync_cursors (
    owner_id TEXT NOT NULL,
    device_id TEXT NOT NULL,
    last_sync_time INTEGER NOT NULL,
    previous_sync_time INTEGER,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (owner_id, device_id)
);
"#;
