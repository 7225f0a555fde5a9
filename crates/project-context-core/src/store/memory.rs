//! In-memory [`Store`] implementation for tests and one-shot tools.
//!
//! All state sits behind a single `std::sync::RwLock`, so an append to a
//! project's context log and the bump of the store-wide sequence happen
//! under the same write guard. Vector search is brute-force cosine
//! distance over every embedding of the project.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::embedding::cosine_distance;
use crate::models::{
    Artifact, ArtifactKind, ChatMessage, CodeInsight, ContextEntry, ContextKind, Document,
    EmbeddingRecord, Project, Task, TaskStatus,
};

use super::{EmbeddingMatch, Store};

#[derive(Default)]
struct State {
    seq: i64,
    projects: Vec<Project>,
    context_log: Vec<ContextEntry>,
    documents: Vec<Document>,
    code_insights: Vec<CodeInsight>,
    tasks: Vec<Task>,
    chat: Vec<ChatMessage>,
    embeddings: Vec<EmbeddingRecord>,
}

impl State {
    fn next_seq(&mut self) -> i64 {
        self.seq += 1;
        self.seq
    }

    fn project_mut(&mut self, id: Uuid) -> Option<&mut Project> {
        self.projects.iter_mut().find(|p| p.id == id)
    }
}

/// In-memory store backed by `Vec`s.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every context entry of a project in `seq` order.
    pub fn context_log(&self, project_id: Uuid) -> Result<Vec<ContextEntry>> {
        Ok(self
            .read()?
            .context_log
            .iter()
            .filter(|e| e.project_id == project_id)
            .cloned()
            .collect())
    }

    /// Number of stored embeddings across all projects.
    pub fn embedding_count(&self) -> Result<usize> {
        Ok(self.read()?.embeddings.len())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get_project(&self, id: Uuid) -> Result<Option<Project>> {
        Ok(self.read()?.projects.iter().find(|p| p.id == id).cloned())
    }

    async fn upsert_project(&self, project: &Project) -> Result<()> {
        let mut state = self.write()?;
        if let Some(existing) = state.project_mut(project.id) {
            existing.name = project.name.clone();
            existing.goal = project.goal.clone();
            existing.updated_at = Utc::now();
            return Ok(());
        }

        let mut stored = project.clone();
        stored.constraints.clear();
        stored.decisions.clear();
        stored.open_questions.clear();
        for (kind, text) in project.context_items() {
            let entry = ContextEntry {
                seq: state.next_seq(),
                project_id: project.id,
                kind,
                text: text.to_string(),
                created_at: project.created_at,
            };
            stored.apply(&entry);
            state.context_log.push(entry);
        }
        state.projects.push(stored);
        Ok(())
    }

    async fn append_context_entry(
        &self,
        project_id: Uuid,
        kind: ContextKind,
        text: &str,
    ) -> Result<Option<ContextEntry>> {
        let mut state = self.write()?;
        if state.project_mut(project_id).is_none() {
            return Ok(None);
        }
        let entry = ContextEntry {
            seq: state.next_seq(),
            project_id,
            kind,
            text: text.to_string(),
            created_at: Utc::now(),
        };
        if let Some(project) = state.project_mut(project_id) {
            project.apply(&entry);
        }
        state.context_log.push(entry.clone());
        Ok(Some(entry))
    }

    async fn list_recent_artifacts(
        &self,
        project_id: Uuid,
        kind: ArtifactKind,
        limit: usize,
    ) -> Result<Vec<Artifact>> {
        let state = self.read()?;
        let mut artifacts: Vec<Artifact> = match kind {
            ArtifactKind::Document => state
                .documents
                .iter()
                .filter(|d| d.project_id == project_id)
                .cloned()
                .map(Artifact::Document)
                .collect(),
            ArtifactKind::CodeInsight => state
                .code_insights
                .iter()
                .filter(|c| c.project_id == project_id)
                .cloned()
                .map(Artifact::CodeInsight)
                .collect(),
            ArtifactKind::Task => state
                .tasks
                .iter()
                .filter(|t| t.project_id == project_id)
                .cloned()
                .map(Artifact::Task)
                .collect(),
        };
        // Later inserts win ties on created_at.
        artifacts.reverse();
        artifacts.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        artifacts.retain(|a| a.digest().is_some());
        artifacts.truncate(limit);
        Ok(artifacts)
    }

    async fn list_open_tasks(&self, project_id: Uuid) -> Result<Vec<Task>> {
        let state = self.read()?;
        let mut tasks: Vec<Task> = state
            .tasks
            .iter()
            .rev()
            .filter(|t| t.project_id == project_id && t.status == TaskStatus::Pending)
            .cloned()
            .collect();
        tasks.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(tasks)
    }

    async fn insert_document(&self, doc: &Document) -> Result<()> {
        let mut state = self.write()?;
        if state.documents.iter().any(|d| d.id == doc.id) {
            bail!("document {} already exists", doc.id);
        }
        state.documents.push(doc.clone());
        Ok(())
    }

    async fn insert_code_insight(&self, insight: &CodeInsight) -> Result<()> {
        let mut state = self.write()?;
        if state.code_insights.iter().any(|c| c.id == insight.id) {
            bail!("code insight {} already exists", insight.id);
        }
        state.code_insights.push(insight.clone());
        Ok(())
    }

    async fn insert_task(&self, task: &Task) -> Result<()> {
        let mut state = self.write()?;
        if state.tasks.iter().any(|t| t.id == task.id) {
            bail!("task {} already exists", task.id);
        }
        state.tasks.push(task.clone());
        Ok(())
    }

    async fn get_document(&self, id: Uuid) -> Result<Option<Document>> {
        Ok(self.read()?.documents.iter().find(|d| d.id == id).cloned())
    }

    async fn update_document(&self, doc: &Document) -> Result<bool> {
        let mut state = self.write()?;
        let Some(stored) = state.documents.iter_mut().find(|d| d.id == doc.id) else {
            return Ok(false);
        };
        stored.summary = doc.summary.clone();
        stored.key_concepts = doc.key_concepts.clone();
        stored.implementation_steps = doc.implementation_steps.clone();
        Ok(true)
    }

    async fn save_chat_message(&self, msg: &ChatMessage) -> Result<ChatMessage> {
        let mut state = self.write()?;
        let mut saved = msg.clone();
        saved.seq = state.next_seq();
        state.chat.push(saved.clone());
        Ok(saved)
    }

    async fn save_chat_turn(
        &self,
        user: &ChatMessage,
        assistant: &ChatMessage,
    ) -> Result<(ChatMessage, ChatMessage)> {
        let mut state = self.write()?;
        let mut saved_user = user.clone();
        saved_user.seq = state.next_seq();
        let mut saved_assistant = assistant.clone();
        saved_assistant.seq = state.next_seq();
        state.chat.push(saved_user.clone());
        state.chat.push(saved_assistant.clone());
        Ok((saved_user, saved_assistant))
    }

    async fn list_chat_messages(&self, project_id: Uuid, limit: usize) -> Result<Vec<ChatMessage>> {
        let state = self.read()?;
        let mut recent: Vec<ChatMessage> = state
            .chat
            .iter()
            .rev()
            .filter(|m| m.project_id == project_id)
            .take(limit)
            .cloned()
            .collect();
        recent.reverse();
        Ok(recent)
    }

    async fn insert_embeddings(&self, records: &[EmbeddingRecord]) -> Result<()> {
        self.write()?.embeddings.extend_from_slice(records);
        Ok(())
    }

    async fn delete_embeddings(&self, project_id: Uuid, source_id: Uuid) -> Result<u64> {
        let mut state = self.write()?;
        let before = state.embeddings.len();
        state
            .embeddings
            .retain(|e| !(e.project_id == project_id && e.source_id == source_id));
        Ok((before - state.embeddings.len()) as u64)
    }

    async fn replace_embeddings(
        &self,
        project_id: Uuid,
        source_id: Uuid,
        records: &[EmbeddingRecord],
    ) -> Result<u64> {
        let mut state = self.write()?;
        let before = state.embeddings.len();
        state
            .embeddings
            .retain(|e| !(e.project_id == project_id && e.source_id == source_id));
        let removed = (before - state.embeddings.len()) as u64;
        state.embeddings.extend_from_slice(records);
        Ok(removed)
    }

    async fn embedding_candidates(
        &self,
        project_id: Uuid,
        query_vec: &[f32],
        limit: usize,
    ) -> Result<Vec<EmbeddingMatch>> {
        let state = self.read()?;
        let mut matches: Vec<EmbeddingMatch> = state
            .embeddings
            .iter()
            .filter(|e| e.project_id == project_id)
            .map(|e| EmbeddingMatch {
                source_type: e.source_type,
                source_id: e.source_id,
                chunk: e.chunk.clone(),
                distance: cosine_distance(query_vec, &e.vector),
            })
            .collect();
        matches.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        matches.truncate(limit);
        Ok(matches)
    }
}
