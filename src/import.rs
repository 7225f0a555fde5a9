//! Bulk import of projects and artifacts from a JSON file.
//!
//! ```json
//! {
//!   "projects":      [{ "id": "…", "name": "Atlas", "goal": "…", "constraints": ["Use PostgreSQL"] }],
//!   "documents":     [{ "project_id": "…", "filename": "design.md", "raw_text": "…", "summary": "…" }],
//!   "code_insights": [{ "project_id": "…", "code_snippet": "…", "language": "rust", "explanation": "…" }],
//!   "tasks":         [{ "project_id": "…", "description": "…", "priority": "high" }]
//! }
//! ```
//!
//! Every top-level key is optional. Projects are upserted; artifacts are
//! inserted and, when an embedder is given, indexed.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

use project_context_core::models::{Artifact, CodeInsight, Document, Project, Task};
use project_context_core::store::Store;

use crate::ingest::{IndexStats, Indexer};

#[derive(Debug, Default, Deserialize)]
pub struct ImportFile {
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub documents: Vec<Document>,
    #[serde(default)]
    pub code_insights: Vec<CodeInsight>,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportStats {
    pub projects: u64,
    pub documents: u64,
    pub code_insights: u64,
    pub tasks: u64,
    pub index: IndexStats,
}

pub fn read_import_file(path: &Path) -> Result<ImportFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read import file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse import file: {}", path.display()))
}

/// Write `file` into `store`. With `indexer = None` nothing is embedded.
pub async fn import(
    store: &dyn Store,
    indexer: Option<&Indexer>,
    file: ImportFile,
) -> Result<ImportStats> {
    let mut stats = ImportStats::default();

    for project in &file.projects {
        store.upsert_project(project).await?;
        stats.projects += 1;
    }

    let mut artifacts = Vec::new();
    for doc in file.documents {
        store.insert_document(&doc).await?;
        stats.documents += 1;
        artifacts.push(Artifact::Document(doc));
    }
    for insight in file.code_insights {
        store.insert_code_insight(&insight).await?;
        stats.code_insights += 1;
        artifacts.push(Artifact::CodeInsight(insight));
    }
    for task in file.tasks {
        store.insert_task(&task).await?;
        stats.tasks += 1;
        artifacts.push(Artifact::Task(task));
    }

    if let Some(indexer) = indexer {
        stats.index = indexer
            .index_all(&artifacts)
            .await
            .context("indexing imported artifacts")?;
    }

    info!(
        projects = stats.projects,
        documents = stats.documents,
        code_insights = stats.code_insights,
        tasks = stats.tasks,
        chunks = stats.index.chunks,
        "import complete"
    );
    Ok(stats)
}
