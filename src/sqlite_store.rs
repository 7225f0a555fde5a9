//! SQLite-backed [`Store`] implementation.
//!
//! Project lists are never stored on the `projects` row. They are rebuilt
//! on read by replaying `context_log` in `seq` order, and appends are a
//! single `INSERT ... SELECT` guarded by the project's existence, so two
//! concurrent appends always both land.
//!
//! Vector search is brute force: every embedding of the project is loaded,
//! decoded from its BLOB and scored with cosine distance in Rust.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use project_context_core::embedding::{blob_to_vec, cosine_distance, vec_to_blob};
use project_context_core::models::{
    Artifact, ArtifactKind, ChatMessage, CodeInsight, ContextEntry, ContextKind, Document,
    EmbeddingRecord, Project, Role, RoutedModule, SourceType, Task, TaskPriority, TaskStatus,
};
use project_context_core::store::{EmbeddingMatch, Store};

use crate::config::Config;
use crate::{db, migrate};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the configured database and create any missing tables.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }
}

fn ts(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_micros()
}

fn from_ts(micros: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros).ok_or_else(|| anyhow!("invalid timestamp {}", micros))
}

fn uuid_col(row: &SqliteRow, col: &str) -> Result<Uuid> {
    let s: String = row.try_get(col)?;
    Uuid::parse_str(&s).with_context(|| format!("invalid uuid in column {}: {}", col, s))
}

fn ts_col(row: &SqliteRow, col: &str) -> Result<DateTime<Utc>> {
    from_ts(row.try_get(col)?)
}

fn json_col<T: serde::de::DeserializeOwned>(row: &SqliteRow, col: &str) -> Result<T> {
    let s: String = row.try_get(col)?;
    serde_json::from_str(&s).with_context(|| format!("invalid JSON in column {}", col))
}

fn priority_rank(p: TaskPriority) -> i64 {
    match p {
        TaskPriority::Low => 0,
        TaskPriority::Medium => 1,
        TaskPriority::High => 2,
    }
}

fn document_from_row(row: &SqliteRow) -> Result<Document> {
    Ok(Document {
        id: uuid_col(row, "id")?,
        project_id: uuid_col(row, "project_id")?,
        filename: row.try_get("filename")?,
        doc_type: row.try_get("doc_type")?,
        raw_text: row.try_get("raw_text")?,
        summary: row.try_get("summary")?,
        key_concepts: json_col(row, "key_concepts_json")?,
        implementation_steps: json_col(row, "implementation_steps_json")?,
        created_at: ts_col(row, "created_at")?,
    })
}

fn code_insight_from_row(row: &SqliteRow) -> Result<CodeInsight> {
    Ok(CodeInsight {
        id: uuid_col(row, "id")?,
        project_id: uuid_col(row, "project_id")?,
        code_snippet: row.try_get("code_snippet")?,
        language: row.try_get("language")?,
        explanation: row.try_get("explanation")?,
        components: json_col(row, "components_json")?,
        suggestions: json_col(row, "suggestions_json")?,
        created_at: ts_col(row, "created_at")?,
    })
}

fn task_from_row(row: &SqliteRow) -> Result<Task> {
    let priority: String = row.try_get("priority")?;
    let status: String = row.try_get("status")?;
    Ok(Task {
        id: uuid_col(row, "id")?,
        project_id: uuid_col(row, "project_id")?,
        description: row.try_get("description")?,
        priority: TaskPriority::parse(&priority)
            .ok_or_else(|| anyhow!("invalid task priority: {}", priority))?,
        status: TaskStatus::parse(&status).ok_or_else(|| anyhow!("invalid task status: {}", status))?,
        source_text: row.try_get("source_text")?,
        created_at: ts_col(row, "created_at")?,
    })
}

fn chat_from_row(row: &SqliteRow) -> Result<ChatMessage> {
    let role: String = row.try_get("role")?;
    let routed: Option<String> = row.try_get("routed_module")?;
    Ok(ChatMessage {
        id: uuid_col(row, "id")?,
        project_id: uuid_col(row, "project_id")?,
        role: Role::parse(&role).ok_or_else(|| anyhow!("invalid chat role: {}", role))?,
        content: row.try_get("content")?,
        context_used: json_col(row, "context_used_json")?,
        drift_warnings: json_col(row, "drift_warnings_json")?,
        routed_module: routed.as_deref().and_then(RoutedModule::parse),
        provider: row.try_get("provider")?,
        latency_ms: row.try_get("latency_ms")?,
        created_at: ts_col(row, "created_at")?,
        seq: row.try_get("seq")?,
    })
}

const DOCUMENT_COLUMNS: &str = "id, project_id, filename, doc_type, raw_text, summary, \
     key_concepts_json, implementation_steps_json, created_at";
const CODE_INSIGHT_COLUMNS: &str = "id, project_id, code_snippet, language, explanation, \
     components_json, suggestions_json, created_at";
const TASK_COLUMNS: &str = "id, project_id, description, priority, status, source_text, created_at";
/// ASCII whitespace stripped by `trim()` before the blank-digest check.
const BLANK_CHARS: &str = "' ' || char(9) || char(10) || char(11) || char(12) || char(13)";
const CHAT_COLUMNS: &str = "seq, id, project_id, role, content, context_used_json, \
     drift_warnings_json, routed_module, provider, latency_ms, created_at";

async fn insert_chat_message<'e, E>(executor: E, msg: &ChatMessage) -> Result<ChatMessage>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let result = sqlx::query(
        "INSERT INTO chat_messages (id, project_id, role, content, context_used_json, \
         drift_warnings_json, routed_module, provider, latency_ms, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(msg.id.to_string())
    .bind(msg.project_id.to_string())
    .bind(msg.role.as_str())
    .bind(&msg.content)
    .bind(serde_json::to_string(&msg.context_used)?)
    .bind(serde_json::to_string(&msg.drift_warnings)?)
    .bind(msg.routed_module.map(|m| m.as_str()))
    .bind(&msg.provider)
    .bind(msg.latency_ms)
    .bind(ts(msg.created_at))
    .execute(executor)
    .await
    .with_context(|| format!("insert chat message {}", msg.id))?;

    let mut saved = msg.clone();
    saved.seq = result.last_insert_rowid();
    Ok(saved)
}

async fn insert_embedding<'e, E>(executor: E, record: &EmbeddingRecord) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        "INSERT INTO embeddings (id, project_id, source_type, source_id, chunk, dims, vector, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(record.id.to_string())
    .bind(record.project_id.to_string())
    .bind(record.source_type.as_str())
    .bind(record.source_id.to_string())
    .bind(&record.chunk)
    .bind(record.vector.len() as i64)
    .bind(vec_to_blob(&record.vector))
    .bind(ts(record.created_at))
    .execute(executor)
    .await?;
    Ok(())
}

#[async_trait]
impl Store for SqliteStore {
    async fn get_project(&self, id: Uuid) -> Result<Option<Project>> {
        let row = sqlx::query("SELECT id, name, goal, created_at, updated_at FROM projects WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let mut project = Project {
            id,
            name: row.try_get("name")?,
            goal: row.try_get("goal")?,
            constraints: Vec::new(),
            decisions: Vec::new(),
            open_questions: Vec::new(),
            created_at: ts_col(&row, "created_at")?,
            updated_at: ts_col(&row, "updated_at")?,
        };

        let entries = sqlx::query(
            "SELECT seq, kind, text, created_at FROM context_log WHERE project_id = ? ORDER BY seq ASC",
        )
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await?;
        for row in &entries {
            let kind: String = row.try_get("kind")?;
            let entry = ContextEntry {
                seq: row.try_get("seq")?,
                project_id: id,
                kind: ContextKind::parse(&kind)
                    .ok_or_else(|| anyhow!("invalid context kind: {}", kind))?,
                text: row.try_get("text")?,
                created_at: ts_col(row, "created_at")?,
            };
            project.apply(&entry);
        }

        Ok(Some(project))
    }

    async fn upsert_project(&self, project: &Project) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO projects (id, name, goal, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(project.id.to_string())
        .bind(&project.name)
        .bind(&project.goal)
        .bind(ts(project.created_at))
        .bind(ts(project.updated_at))
        .execute(&mut *tx)
        .await?
        .rows_affected()
            > 0;

        if inserted {
            for (kind, text) in project.context_items() {
                sqlx::query(
                    "INSERT INTO context_log (project_id, kind, text, created_at) VALUES (?, ?, ?, ?)",
                )
                .bind(project.id.to_string())
                .bind(kind.as_str())
                .bind(text)
                .bind(ts(project.created_at))
                .execute(&mut *tx)
                .await?;
            }
        } else {
            sqlx::query("UPDATE projects SET name = ?, goal = ?, updated_at = ? WHERE id = ?")
                .bind(&project.name)
                .bind(&project.goal)
                .bind(ts(Utc::now()))
                .bind(project.id.to_string())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn append_context_entry(
        &self,
        project_id: Uuid,
        kind: ContextKind,
        text: &str,
    ) -> Result<Option<ContextEntry>> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO context_log (project_id, kind, text, created_at)
            SELECT ?, ?, ?, ?
            WHERE EXISTS (SELECT 1 FROM projects WHERE id = ?)
            "#,
        )
        .bind(project_id.to_string())
        .bind(kind.as_str())
        .bind(text)
        .bind(ts(now))
        .bind(project_id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        sqlx::query("UPDATE projects SET updated_at = MAX(updated_at, ?) WHERE id = ?")
            .bind(ts(now))
            .bind(project_id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(Some(ContextEntry {
            seq: result.last_insert_rowid(),
            project_id,
            kind,
            text: text.to_string(),
            created_at: now,
        }))
    }

    async fn list_recent_artifacts(
        &self,
        project_id: Uuid,
        kind: ArtifactKind,
        limit: usize,
    ) -> Result<Vec<Artifact>> {
        let sql = match kind {
            ArtifactKind::Document => format!(
                "SELECT {} FROM documents WHERE project_id = ? AND trim(COALESCE(summary, ''), {ws}) != '' \
                 ORDER BY created_at DESC, rowid DESC LIMIT ?",
                DOCUMENT_COLUMNS,
                ws = BLANK_CHARS
            ),
            ArtifactKind::CodeInsight => format!(
                "SELECT {} FROM code_insights WHERE project_id = ? AND trim(COALESCE(explanation, ''), {ws}) != '' \
                 ORDER BY created_at DESC, rowid DESC LIMIT ?",
                CODE_INSIGHT_COLUMNS,
                ws = BLANK_CHARS
            ),
            ArtifactKind::Task => format!(
                "SELECT {} FROM tasks WHERE project_id = ? AND trim(description, {ws}) != '' \
                 ORDER BY created_at DESC, rowid DESC LIMIT ?",
                TASK_COLUMNS,
                ws = BLANK_CHARS
            ),
        };

        let rows = sqlx::query(&sql)
            .bind(project_id.to_string())
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| match kind {
                ArtifactKind::Document => document_from_row(row).map(Artifact::Document),
                ArtifactKind::CodeInsight => code_insight_from_row(row).map(Artifact::CodeInsight),
                ArtifactKind::Task => task_from_row(row).map(Artifact::Task),
            })
            .collect()
    }

    async fn list_open_tasks(&self, project_id: Uuid) -> Result<Vec<Task>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM tasks WHERE project_id = ? AND status = 'pending' \
             ORDER BY priority_rank DESC, created_at DESC, rowid DESC",
            TASK_COLUMNS
        ))
        .bind(project_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(task_from_row).collect()
    }

    async fn insert_document(&self, doc: &Document) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO documents ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            DOCUMENT_COLUMNS
        ))
        .bind(doc.id.to_string())
        .bind(doc.project_id.to_string())
        .bind(&doc.filename)
        .bind(&doc.doc_type)
        .bind(&doc.raw_text)
        .bind(&doc.summary)
        .bind(serde_json::to_string(&doc.key_concepts)?)
        .bind(serde_json::to_string(&doc.implementation_steps)?)
        .bind(ts(doc.created_at))
        .execute(&self.pool)
        .await
        .with_context(|| format!("insert document {}", doc.id))?;
        Ok(())
    }

    async fn insert_code_insight(&self, insight: &CodeInsight) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO code_insights ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            CODE_INSIGHT_COLUMNS
        ))
        .bind(insight.id.to_string())
        .bind(insight.project_id.to_string())
        .bind(&insight.code_snippet)
        .bind(&insight.language)
        .bind(&insight.explanation)
        .bind(serde_json::to_string(&insight.components)?)
        .bind(serde_json::to_string(&insight.suggestions)?)
        .bind(ts(insight.created_at))
        .execute(&self.pool)
        .await
        .with_context(|| format!("insert code insight {}", insight.id))?;
        Ok(())
    }

    async fn insert_task(&self, task: &Task) -> Result<()> {
        sqlx::query(
            "INSERT INTO tasks (id, project_id, description, priority, priority_rank, status, source_text, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(task.id.to_string())
        .bind(task.project_id.to_string())
        .bind(&task.description)
        .bind(task.priority.as_str())
        .bind(priority_rank(task.priority))
        .bind(task.status.as_str())
        .bind(&task.source_text)
        .bind(ts(task.created_at))
        .execute(&self.pool)
        .await
        .with_context(|| format!("insert task {}", task.id))?;
        Ok(())
    }

    async fn get_document(&self, id: Uuid) -> Result<Option<Document>> {
        let row = sqlx::query(&format!("SELECT {} FROM documents WHERE id = ?", DOCUMENT_COLUMNS))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(document_from_row).transpose()
    }

    async fn update_document(&self, doc: &Document) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE documents SET summary = ?, key_concepts_json = ?, implementation_steps_json = ? \
             WHERE id = ?",
        )
        .bind(&doc.summary)
        .bind(serde_json::to_string(&doc.key_concepts)?)
        .bind(serde_json::to_string(&doc.implementation_steps)?)
        .bind(doc.id.to_string())
        .execute(&self.pool)
        .await
        .with_context(|| format!("update document {}", doc.id))?;
        Ok(result.rows_affected() > 0)
    }

    async fn save_chat_message(&self, msg: &ChatMessage) -> Result<ChatMessage> {
        insert_chat_message(&self.pool, msg).await
    }

    async fn save_chat_turn(
        &self,
        user: &ChatMessage,
        assistant: &ChatMessage,
    ) -> Result<(ChatMessage, ChatMessage)> {
        let mut tx = self.pool.begin().await?;
        let saved_user = insert_chat_message(&mut *tx, user).await?;
        let saved_assistant = insert_chat_message(&mut *tx, assistant).await?;
        tx.commit().await?;
        Ok((saved_user, saved_assistant))
    }

    async fn list_chat_messages(&self, project_id: Uuid, limit: usize) -> Result<Vec<ChatMessage>> {
        let rows = sqlx::query(&format!(
            "SELECT * FROM (SELECT {} FROM chat_messages WHERE project_id = ? ORDER BY seq DESC LIMIT ?) \
             ORDER BY seq ASC",
            CHAT_COLUMNS
        ))
        .bind(project_id.to_string())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(chat_from_row).collect()
    }

    async fn insert_embeddings(&self, records: &[EmbeddingRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for record in records {
            insert_embedding(&mut *tx, record).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete_embeddings(&self, project_id: Uuid, source_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM embeddings WHERE project_id = ? AND source_id = ?")
            .bind(project_id.to_string())
            .bind(source_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn replace_embeddings(
        &self,
        project_id: Uuid,
        source_id: Uuid,
        records: &[EmbeddingRecord],
    ) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let removed = sqlx::query("DELETE FROM embeddings WHERE project_id = ? AND source_id = ?")
            .bind(project_id.to_string())
            .bind(source_id.to_string())
            .execute(&mut *tx)
            .await?
            .rows_affected();
        for record in records {
            insert_embedding(&mut *tx, record).await?;
        }
        tx.commit().await?;
        Ok(removed)
    }

    async fn embedding_candidates(
        &self,
        project_id: Uuid,
        query_vec: &[f32],
        limit: usize,
    ) -> Result<Vec<EmbeddingMatch>> {
        let rows = sqlx::query(
            "SELECT source_type, source_id, chunk, vector FROM embeddings WHERE project_id = ?",
        )
        .bind(project_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut matches = Vec::with_capacity(rows.len());
        for row in &rows {
            let source_type: String = row.try_get("source_type")?;
            let blob: Vec<u8> = row.try_get("vector")?;
            matches.push(EmbeddingMatch {
                source_type: SourceType::parse(&source_type)
                    .ok_or_else(|| anyhow!("invalid source type: {}", source_type))?,
                source_id: uuid_col(row, "source_id")?,
                chunk: row.try_get("chunk")?,
                distance: cosine_distance(query_vec, &blob_to_vec(&blob)),
            });
        }

        matches.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        matches.truncate(limit);
        Ok(matches)
    }
}
