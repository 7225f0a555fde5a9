//! Schema creation. Every statement is idempotent, so `pctx init` can be
//! run against an existing database.
//!
//! Timestamps are stored as microseconds since the Unix epoch, ids as
//! hyphenated UUID text, list fields as JSON text and vectors as
//! little-endian `f32` BLOBs.

use anyhow::Result;
use sqlx::SqlitePool;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS projects (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        goal TEXT NOT NULL DEFAULT '',
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )
    "#,
    // The project lists are materialized from this log; rows are never
    // updated or deleted.
    r#"
    CREATE TABLE IF NOT EXISTS context_log (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        project_id TEXT NOT NULL REFERENCES projects(id),
        kind TEXT NOT NULL,
        text TEXT NOT NULL,
        created_at INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_context_log_project ON context_log(project_id, seq)",
    r#"
    CREATE TABLE IF NOT EXISTS documents (
        id TEXT PRIMARY KEY,
        project_id TEXT NOT NULL,
        filename TEXT NOT NULL,
        doc_type TEXT NOT NULL,
        raw_text TEXT NOT NULL,
        summary TEXT,
        key_concepts_json TEXT NOT NULL DEFAULT '[]',
        implementation_steps_json TEXT NOT NULL DEFAULT '[]',
        created_at INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_documents_project ON documents(project_id, created_at)",
    r#"
    CREATE TABLE IF NOT EXISTS code_insights (
        id TEXT PRIMARY KEY,
        project_id TEXT NOT NULL,
        code_snippet TEXT NOT NULL,
        language TEXT NOT NULL,
        explanation TEXT,
        components_json TEXT NOT NULL DEFAULT '[]',
        suggestions_json TEXT NOT NULL DEFAULT '[]',
        created_at INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_code_insights_project ON code_insights(project_id, created_at)",
    r#"
    CREATE TABLE IF NOT EXISTS tasks (
        id TEXT PRIMARY KEY,
        project_id TEXT NOT NULL,
        description TEXT NOT NULL,
        priority TEXT NOT NULL,
        priority_rank INTEGER NOT NULL,
        status TEXT NOT NULL,
        source_text TEXT,
        created_at INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_tasks_project ON tasks(project_id, status)",
    r#"
    CREATE TABLE IF NOT EXISTS chat_messages (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        project_id TEXT NOT NULL,
        role TEXT NOT NULL,
        content TEXT NOT NULL,
        context_used_json TEXT NOT NULL DEFAULT '[]',
        drift_warnings_json TEXT NOT NULL DEFAULT '[]',
        routed_module TEXT,
        provider TEXT,
        latency_ms REAL,
        created_at INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_chat_project ON chat_messages(project_id, seq)",
    r#"
    CREATE TABLE IF NOT EXISTS embeddings (
        id TEXT PRIMARY KEY,
        project_id TEXT NOT NULL,
        source_type TEXT NOT NULL,
        source_id TEXT NOT NULL,
        chunk TEXT NOT NULL,
        dims INTEGER NOT NULL,
        vector BLOB NOT NULL,
        created_at INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_embeddings_project ON embeddings(project_id)",
    "CREATE INDEX IF NOT EXISTS idx_embeddings_source ON embeddings(project_id, source_id)",
];

/// Create every table and index that does not exist yet.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
