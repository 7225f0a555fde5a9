//! Storage abstraction for project memory.
//!
//! The [`Store`] trait is the collaborator contract the query pipeline
//! depends on: project lookup, the append-only context log, recent
//! artifacts, open tasks, chat history, and project-scoped embedding
//! candidates. Implementations must be `Send + Sync`.
//!
//! Project lists are never written back wholesale. Every change goes
//! through [`Store::append_context_entry`], which must be atomic with
//! respect to other appends on the same store.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{
    Artifact, ArtifactKind, ChatMessage, CodeInsight, ContextEntry, ContextKind, Document,
    EmbeddingRecord, Project, SourceType, Task,
};

/// One embedded chunk scored against a query vector.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingMatch {
    pub source_type: SourceType,
    pub source_id: Uuid,
    pub chunk: String,
    /// Cosine distance to the query, lower is closer.
    pub distance: f64,
}

/// Abstract storage backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get_project`](Store::get_project) | Project with its materialized lists |
/// | [`upsert_project`](Store::upsert_project) | Create a project or update name/goal |
/// | [`append_context_entry`](Store::append_context_entry) | Atomic append to a project list |
/// | [`list_recent_artifacts`](Store::list_recent_artifacts) | Newest artifacts with a digest |
/// | [`list_open_tasks`](Store::list_open_tasks) | Pending tasks by priority, then recency |
/// | [`get_document`](Store::get_document) | Document lookup by id |
/// | [`update_document`](Store::update_document) | Rewrite a document's derived fields |
/// | [`save_chat_message`](Store::save_chat_message) | Persist one chat message |
/// | [`save_chat_turn`](Store::save_chat_turn) | Persist a question and its answer together |
/// | [`list_chat_messages`](Store::list_chat_messages) | Chat history, oldest first |
/// | [`replace_embeddings`](Store::replace_embeddings) | Swap an artifact's chunks in one step |
/// | [`embedding_candidates`](Store::embedding_candidates) | Project-scoped vector candidates |
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_project(&self, id: Uuid) -> Result<Option<Project>>;

    /// Insert a project, or update the name and goal of an existing one.
    ///
    /// When the project is new, its constraint/decision/question lists are
    /// recorded as context entries in list order. For an existing project
    /// the lists are left untouched; use
    /// [`append_context_entry`](Store::append_context_entry) to grow them.
    async fn upsert_project(&self, project: &Project) -> Result<()>;

    /// Append one entry to a project's context log.
    ///
    /// Returns `None` when the project does not exist.
    async fn append_context_entry(
        &self,
        project_id: Uuid,
        kind: ContextKind,
        text: &str,
    ) -> Result<Option<ContextEntry>>;

    /// Up to `limit` artifacts of `kind`, newest first, skipping those whose
    /// [`digest`](Artifact::digest) is empty.
    async fn list_recent_artifacts(
        &self,
        project_id: Uuid,
        kind: ArtifactKind,
        limit: usize,
    ) -> Result<Vec<Artifact>>;

    /// All pending tasks, ordered by priority descending then creation time
    /// descending.
    async fn list_open_tasks(&self, project_id: Uuid) -> Result<Vec<Task>>;

    async fn insert_document(&self, doc: &Document) -> Result<()>;

    async fn insert_code_insight(&self, insight: &CodeInsight) -> Result<()>;

    async fn insert_task(&self, task: &Task) -> Result<()>;

    async fn get_document(&self, id: Uuid) -> Result<Option<Document>>;

    /// Overwrite `summary`, `key_concepts` and `implementation_steps` of a
    /// stored document. Returns `false` when no document has `doc.id`.
    async fn update_document(&self, doc: &Document) -> Result<bool>;

    /// Persist a chat message and return it with its store-assigned `seq`.
    async fn save_chat_message(&self, msg: &ChatMessage) -> Result<ChatMessage>;

    /// Persist a user message and the assistant reply as one unit: either
    /// both are stored, with consecutive `seq`s in that order, or neither.
    async fn save_chat_turn(
        &self,
        user: &ChatMessage,
        assistant: &ChatMessage,
    ) -> Result<(ChatMessage, ChatMessage)>;

    /// The most recent `limit` messages of a project, oldest first.
    async fn list_chat_messages(&self, project_id: Uuid, limit: usize) -> Result<Vec<ChatMessage>>;

    async fn insert_embeddings(&self, records: &[EmbeddingRecord]) -> Result<()>;

    /// Delete every embedding that references `source_id`. Returns the
    /// number of rows removed.
    async fn delete_embeddings(&self, project_id: Uuid, source_id: Uuid) -> Result<u64>;

    /// Delete the embeddings of `source_id` and insert `records` in their
    /// place, atomically. Returns the number of rows removed.
    async fn replace_embeddings(
        &self,
        project_id: Uuid,
        source_id: Uuid,
        records: &[EmbeddingRecord],
    ) -> Result<u64>;

    /// Up to `limit` embeddings of the project scored against `query_vec`.
    ///
    /// Backends may return candidates in any order; [`crate::search::search`]
    /// sorts and truncates.
    async fn embedding_candidates(
        &self,
        project_id: Uuid,
        query_vec: &[f32],
        limit: usize,
    ) -> Result<Vec<EmbeddingMatch>>;
}
