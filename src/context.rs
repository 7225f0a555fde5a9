//! Context engine: project aggregation, retrieval and prompt assembly.
//!
//! The augmented prompt has four blocks in fixed order:
//!
//! ```text
//! === PROJECT CONTEXT ===      name, goal, constraints, decisions, open questions
//! === RELEVANT KNOWLEDGE ===   one numbered line per retrieved chunk (≤ 500 chars)
//! === RECENT ACTIVITY ===      document / code insight digests (≤ 200 chars), open tasks
//! === USER QUERY ===           the query, verbatim
//! ```
//!
//! Retrieval never fails the caller: an embedding or search error is logged
//! and the prompt is built without the knowledge block.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use project_context_core::models::{
    Artifact, ArtifactKind, CodeInsight, ContextEntry, ContextKind, ContextReference, Document,
    Project, Task,
};
use project_context_core::search::search;
use project_context_core::store::{EmbeddingMatch, Store};

use crate::embedding::{embed, Embedder};
use crate::error::{Error, Result};

/// How many recent documents / code insights go into the prompt.
pub const RECENT_ARTIFACT_LIMIT: usize = 5;
/// Max chars of a retrieved chunk shown in the knowledge block.
pub const KNOWLEDGE_PREVIEW_CHARS: usize = 500;
/// Max chars of a document summary or code explanation in the activity block.
pub const ACTIVITY_PREVIEW_CHARS: usize = 200;
/// Max chars of a [`ContextReference::chunk_preview`].
pub const REFERENCE_PREVIEW_CHARS: usize = 150;

/// Everything the prompt needs to know about a project.
///
/// `project` is `None` (and every list empty) when the project does not
/// exist.
#[derive(Debug, Clone, Default)]
pub struct ProjectContext {
    pub project: Option<Project>,
    pub recent_documents: Vec<Document>,
    pub recent_code_insights: Vec<CodeInsight>,
    pub open_tasks: Vec<Task>,
}

impl ProjectContext {
    pub fn is_empty(&self) -> bool {
        self.project.is_none()
    }
}

/// A prompt ready for the LLM plus attribution for the chunks it drew on.
#[derive(Debug, Clone)]
pub struct AugmentedPrompt {
    pub prompt: String,
    pub references: Vec<ContextReference>,
}

pub struct ContextEngine {
    store: Arc<dyn Store>,
    embedder: Arc<dyn Embedder>,
    top_k: usize,
}

impl ContextEngine {
    pub fn new(store: Arc<dyn Store>, embedder: Arc<dyn Embedder>, top_k: usize) -> Self {
        Self {
            store,
            embedder,
            top_k,
        }
    }

    /// Collect project metadata, the five most recent documents and code
    /// insights that have a digest, and every open task.
    pub async fn aggregate(&self, project_id: Uuid) -> Result<ProjectContext> {
        let Some(project) = self.store.get_project(project_id).await? else {
            return Ok(ProjectContext::default());
        };

        let recent_documents = self
            .store
            .list_recent_artifacts(project_id, ArtifactKind::Document, RECENT_ARTIFACT_LIMIT)
            .await?
            .into_iter()
            .filter_map(|a| match a {
                Artifact::Document(d) => Some(d),
                _ => None,
            })
            .collect();
        let recent_code_insights = self
            .store
            .list_recent_artifacts(project_id, ArtifactKind::CodeInsight, RECENT_ARTIFACT_LIMIT)
            .await?
            .into_iter()
            .filter_map(|a| match a {
                Artifact::CodeInsight(c) => Some(c),
                _ => None,
            })
            .collect();
        let open_tasks = self.store.list_open_tasks(project_id).await?;

        Ok(ProjectContext {
            project: Some(project),
            recent_documents,
            recent_code_insights,
            open_tasks,
        })
    }

    /// Nearest chunks to `query` within the project, best first.
    ///
    /// Any embedding or search failure is logged and yields no chunks.
    pub async fn retrieve_chunks(
        &self,
        project_id: Uuid,
        query: &str,
        top_k: usize,
    ) -> Vec<EmbeddingMatch> {
        match self.try_retrieve(project_id, query, top_k).await {
            Ok(chunks) => {
                info!(
                    %project_id,
                    chunks = chunks.len(),
                    query = %preview(query, 60),
                    "retrieved relevant chunks"
                );
                chunks
            }
            Err(e) => {
                warn!(%project_id, error = %e, "chunk retrieval failed, continuing without RAG");
                Vec::new()
            }
        }
    }

    async fn try_retrieve(
        &self,
        project_id: Uuid,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<EmbeddingMatch>> {
        let query_vec = embed(self.embedder.as_ref(), query).await?;
        search(self.store.as_ref(), project_id, &query_vec, top_k)
            .await
            .map_err(|e| Error::retrieval(format!("{:#}", e)))
    }

    /// Assemble the augmented prompt for `query`.
    ///
    /// For an unknown project the query is returned unchanged with no
    /// references.
    pub async fn build_prompt(&self, project_id: Uuid, query: &str) -> Result<AugmentedPrompt> {
        let context = self.aggregate(project_id).await?;
        if context.is_empty() {
            return Ok(AugmentedPrompt {
                prompt: query.to_string(),
                references: Vec::new(),
            });
        }

        let chunks = self.retrieve_chunks(project_id, query, self.top_k).await;
        let references = chunks
            .iter()
            .map(|c| ContextReference {
                source_type: c.source_type,
                source_id: c.source_id,
                chunk_preview: preview(&c.chunk, REFERENCE_PREVIEW_CHARS),
            })
            .collect();

        Ok(AugmentedPrompt {
            prompt: render_prompt(&context, &chunks, query),
            references,
        })
    }

    /// Append a decision or open question to the project's context log.
    ///
    /// Unknown kinds and unknown projects are logged and ignored.
    pub async fn append_context(
        &self,
        project_id: Uuid,
        kind: &str,
        text: &str,
    ) -> Result<Option<ContextEntry>> {
        let kind = match ContextKind::parse(kind) {
            Some(k @ (ContextKind::Decision | ContextKind::OpenQuestion)) => k,
            _ => {
                warn!(%project_id, kind, "unknown context update type, ignoring");
                return Ok(None);
            }
        };

        let entry = self
            .store
            .append_context_entry(project_id, kind, text)
            .await?;
        match &entry {
            Some(e) => info!(%project_id, kind = %kind, seq = e.seq, "context updated"),
            None => warn!(%project_id, "append_context: project not found"),
        }
        Ok(entry)
    }
}

/// The first `max_chars` characters of `s`.
pub fn preview(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

fn render_prompt(context: &ProjectContext, chunks: &[EmbeddingMatch], query: &str) -> String {
    let mut sections: Vec<String> = Vec::new();

    if let Some(project) = &context.project {
        sections.push("=== PROJECT CONTEXT ===".to_string());
        sections.push(format!("Project: {}", project.name));
        sections.push(format!("Goal: {}", project.goal));
        if !project.constraints.is_empty() {
            sections.push(format!("Constraints: {}", project.constraints.join(", ")));
        }
        if !project.decisions.is_empty() {
            sections.push(format!("Decisions: {}", project.decisions.join(", ")));
        }
        if !project.open_questions.is_empty() {
            sections.push(format!(
                "Open Questions: {}",
                project.open_questions.join(", ")
            ));
        }
    }

    if !chunks.is_empty() {
        sections.push("\n=== RELEVANT KNOWLEDGE ===".to_string());
        for (i, chunk) in chunks.iter().enumerate() {
            sections.push(format!(
                "[{}] ({}) {}",
                i + 1,
                chunk.source_type,
                preview(&chunk.chunk, KNOWLEDGE_PREVIEW_CHARS)
            ));
        }
    }

    sections.push("\n=== RECENT ACTIVITY ===".to_string());
    if !context.recent_documents.is_empty() {
        sections.push("Recent Documents:".to_string());
        for doc in &context.recent_documents {
            sections.push(format!(
                "  - {}: {}",
                doc.filename,
                preview(doc.summary.as_deref().unwrap_or_default(), ACTIVITY_PREVIEW_CHARS)
            ));
        }
    }
    if !context.recent_code_insights.is_empty() {
        sections.push("Recent Code Insights:".to_string());
        for insight in &context.recent_code_insights {
            sections.push(format!(
                "  - [{}] {}",
                insight.language,
                preview(
                    insight.explanation.as_deref().unwrap_or_default(),
                    ACTIVITY_PREVIEW_CHARS
                )
            ));
        }
    }
    if !context.open_tasks.is_empty() {
        sections.push("Open Tasks:".to_string());
        for task in &context.open_tasks {
            sections.push(format!("  - [{}] {}", task.priority, task.description));
        }
    }

    sections.push(format!("\n=== USER QUERY ===\n{}", query));
    sections.join("\n")
}
