//! Data model for project memory.
//!
//! A [`Project`] carries the goal and the three append-only context lists
//! (constraints, decisions, open questions). Artifacts ([`Document`],
//! [`CodeInsight`], [`Task`]) are imported or produced by the analysis
//! services and are read-only to the query pipeline. [`EmbeddingRecord`]s
//! hold one chunk of artifact text with its vector, and [`ChatMessage`]s
//! record each turn of a project conversation.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Dimensionality every stored embedding vector is expected to have.
pub const EMBEDDING_DIMS: usize = 768;

fn new_id() -> Uuid {
    Uuid::new_v4()
}

fn now() -> DateTime<Utc> {
    Utc::now()
}

// ============ Projects ============

/// A project and the materialized view of its context log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    #[serde(default = "new_id")]
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub goal: String,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub decisions: Vec<String>,
    #[serde(default)]
    pub open_questions: Vec<String>,
    #[serde(default = "now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "now")]
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn new(name: impl Into<String>, goal: impl Into<String>) -> Self {
        let ts = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            goal: goal.into(),
            constraints: Vec::new(),
            decisions: Vec::new(),
            open_questions: Vec::new(),
            created_at: ts,
            updated_at: ts,
        }
    }

    pub fn with_constraints<I, S>(mut self, constraints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.constraints = constraints.into_iter().map(Into::into).collect();
        self
    }

    /// Fold one log entry into the materialized lists.
    pub fn apply(&mut self, entry: &ContextEntry) {
        match entry.kind {
            ContextKind::Constraint => self.constraints.push(entry.text.clone()),
            ContextKind::Decision => self.decisions.push(entry.text.clone()),
            ContextKind::OpenQuestion => self.open_questions.push(entry.text.clone()),
        }
        if entry.created_at > self.updated_at {
            self.updated_at = entry.created_at;
        }
    }

    /// All list items of the project as `(kind, text)` pairs in list order.
    pub fn context_items(&self) -> Vec<(ContextKind, &str)> {
        let constraints = self
            .constraints
            .iter()
            .map(|t| (ContextKind::Constraint, t.as_str()));
        let decisions = self
            .decisions
            .iter()
            .map(|t| (ContextKind::Decision, t.as_str()));
        let questions = self
            .open_questions
            .iter()
            .map(|t| (ContextKind::OpenQuestion, t.as_str()));
        constraints.chain(decisions).chain(questions).collect()
    }
}

/// Which project list a [`ContextEntry`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextKind {
    Constraint,
    Decision,
    OpenQuestion,
}

impl ContextKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextKind::Constraint => "constraint",
            ContextKind::Decision => "decision",
            ContextKind::OpenQuestion => "open_question",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "constraint" => Some(ContextKind::Constraint),
            "decision" => Some(ContextKind::Decision),
            "open_question" => Some(ContextKind::OpenQuestion),
            _ => None,
        }
    }
}

impl fmt::Display for ContextKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One append to a project's context log.
///
/// `seq` is assigned by the store and is strictly increasing across the
/// whole store, so replaying entries in `seq` order rebuilds every list
/// exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextEntry {
    pub seq: i64,
    pub project_id: Uuid,
    pub kind: ContextKind,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

// ============ Artifacts ============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    #[serde(default = "new_id")]
    pub id: Uuid,
    pub project_id: Uuid,
    pub filename: String,
    #[serde(default = "default_doc_type")]
    pub doc_type: String,
    #[serde(default)]
    pub raw_text: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub key_concepts: Vec<String>,
    #[serde(default)]
    pub implementation_steps: Vec<String>,
    #[serde(default = "now")]
    pub created_at: DateTime<Utc>,
}

fn default_doc_type() -> String {
    "text".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeInsight {
    #[serde(default = "new_id")]
    pub id: Uuid,
    pub project_id: Uuid,
    pub code_snippet: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub components: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default = "now")]
    pub created_at: DateTime<Utc>,
}

fn default_language() -> String {
    "python".to_string()
}

/// Task priority. Ordering is `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
}

impl Default for TaskPriority {
    fn default() -> Self {
        TaskPriority::Medium
    }
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(TaskPriority::Low),
            "medium" => Some(TaskPriority::Medium),
            "high" => Some(TaskPriority::High),
            _ => None,
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Done => "done",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "done" => Some(TaskStatus::Done),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    #[serde(default = "new_id")]
    pub id: Uuid,
    pub project_id: Uuid,
    pub description: String,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub source_text: Option<String>,
    #[serde(default = "now")]
    pub created_at: DateTime<Utc>,
}

/// Selector for [`Store::list_recent_artifacts`](crate::store::Store::list_recent_artifacts).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Document,
    CodeInsight,
    Task,
}

/// Any project-scoped record with a free-text body.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Artifact {
    Document(Document),
    CodeInsight(CodeInsight),
    Task(Task),
}

impl Artifact {
    pub fn id(&self) -> Uuid {
        match self {
            Artifact::Document(d) => d.id,
            Artifact::CodeInsight(c) => c.id,
            Artifact::Task(t) => t.id,
        }
    }

    pub fn kind(&self) -> ArtifactKind {
        match self {
            Artifact::Document(_) => ArtifactKind::Document,
            Artifact::CodeInsight(_) => ArtifactKind::CodeInsight,
            Artifact::Task(_) => ArtifactKind::Task,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            Artifact::Document(d) => d.created_at,
            Artifact::CodeInsight(c) => c.created_at,
            Artifact::Task(t) => t.created_at,
        }
    }

    /// The derived one-paragraph view of the artifact: a document's summary,
    /// a code insight's explanation or a task's description. `None` when
    /// the derived field is missing or blank.
    pub fn digest(&self) -> Option<&str> {
        let text = match self {
            Artifact::Document(d) => d.summary.as_deref(),
            Artifact::CodeInsight(c) => c.explanation.as_deref(),
            Artifact::Task(t) => Some(t.description.as_str()),
        };
        text.filter(|t| !t.trim().is_empty())
    }
}

// ============ Embeddings ============

/// Origin tag of an embedded chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Document,
    Code,
    Task,
    CodeInsight,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Document => "document",
            SourceType::Code => "code",
            SourceType::Task => "task",
            SourceType::CodeInsight => "code_insight",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "document" => Some(SourceType::Document),
            "code" => Some(SourceType::Code),
            "task" => Some(SourceType::Task),
            "code_insight" => Some(SourceType::CodeInsight),
            _ => None,
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One embedded chunk of artifact text.
///
/// `source_id` is a weak reference: nothing enforces that the artifact it
/// names still exists.
#[derive(Debug, Clone)]
pub struct EmbeddingRecord {
    pub id: Uuid,
    pub project_id: Uuid,
    pub source_type: SourceType,
    pub source_id: Uuid,
    pub chunk: String,
    pub vector: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

impl EmbeddingRecord {
    pub fn new(
        project_id: Uuid,
        source_type: SourceType,
        source_id: Uuid,
        chunk: impl Into<String>,
        vector: Vec<f32>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id,
            source_type,
            source_id,
            chunk: chunk.into(),
            vector,
            created_at: Utc::now(),
        }
    }
}

// ============ Chat ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

/// Topic label attached to a chat turn for UI display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutedModule {
    Learning,
    Developer,
    Workflow,
    #[default]
    Rag,
}

impl RoutedModule {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoutedModule::Learning => "learning",
            RoutedModule::Developer => "developer",
            RoutedModule::Workflow => "workflow",
            RoutedModule::Rag => "rag",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "learning" => Some(RoutedModule::Learning),
            "developer" => Some(RoutedModule::Developer),
            "workflow" => Some(RoutedModule::Workflow),
            "rag" => Some(RoutedModule::Rag),
            _ => None,
        }
    }
}

impl fmt::Display for RoutedModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attribution for one retrieved chunk used to answer a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextReference {
    pub source_type: SourceType,
    pub source_id: Uuid,
    pub chunk_preview: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    #[default]
    Medium,
    Low,
}

/// A flagged contradiction between an answer and a project constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftWarning {
    /// `technology_mismatch`, `architecture_change`, `language_violation`,
    /// `process_violation` or `other`.
    #[serde(rename = "type")]
    pub kind: String,
    pub severity: Severity,
    pub description: String,
    pub constraint_violated: String,
}

/// One persisted turn of a project conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub project_id: Uuid,
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub context_used: Vec<ContextReference>,
    #[serde(default)]
    pub drift_warnings: Vec<DriftWarning>,
    #[serde(default)]
    pub routed_module: Option<RoutedModule>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub latency_ms: Option<f64>,
    pub created_at: DateTime<Utc>,
    /// Store-assigned insertion order; `0` until saved.
    #[serde(default)]
    pub seq: i64,
}

impl ChatMessage {
    pub fn new(project_id: Uuid, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id,
            role,
            content: content.into(),
            context_used: Vec::new(),
            drift_warnings: Vec::new(),
            routed_module: None,
            provider: None,
            latency_ms: None,
            created_at: Utc::now(),
            seq: 0,
        }
    }
}
