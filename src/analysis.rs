//! LLM-backed artifact analysis.
//!
//! | Operation | Input | Result |
//! |-----------|-------|--------|
//! | [`summarise`](ArtifactAnalyzer::summarise) | stored document | `summary` rewritten |
//! | [`extract_concepts`](ArtifactAnalyzer::extract_concepts) | stored document | `key_concepts` rewritten |
//! | [`generate_steps`](ArtifactAnalyzer::generate_steps) | stored document | `implementation_steps` rewritten |
//! | [`analyze_code`](ArtifactAnalyzer::analyze_code) | code + language | new [`CodeInsight`] |
//! | [`extract_tasks`](ArtifactAnalyzer::extract_tasks) | transcript or email | new pending [`Task`]s |
//!
//! Every operation asks for JSON through [`LlmOrchestrator::generate_json`],
//! so a reply that is not valid JSON twice surfaces as
//! [`Error::MalformedResponse`]. New artifacts are indexed when an
//! [`Indexer`] is attached; an indexing failure is logged and the artifact
//! stays stored without embeddings.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use project_context_core::models::{
    Artifact, CodeInsight, ContextKind, Document, Project, Task, TaskPriority, TaskStatus,
};
use project_context_core::store::Store;

use crate::context::preview;
use crate::error::{Error, Result};
use crate::ingest::Indexer;
use crate::llm::LlmOrchestrator;
use crate::prompts::{
    code_prompt, extract_tasks_prompt, readme_prompt, CONCEPTS_SYSTEM_PROMPT,
    DEBUG_CODE_SYSTEM_PROMPT, EXPLAIN_CODE_SYSTEM_PROMPT, EXTRACT_TASKS_SYSTEM_PROMPT,
    README_SYSTEM_PROMPT, STEPS_SYSTEM_PROMPT, SUMMARY_DETAILED_SYSTEM_PROMPT,
    SUMMARY_EXAM_SYSTEM_PROMPT, SUMMARY_SHORT_SYSTEM_PROMPT,
};

/// Documents are cut to this many words before analysis.
pub const MAX_DOCUMENT_WORDS: usize = 12_000;
/// Code is cut to this many lines before analysis.
pub const MAX_CODE_LINES: usize = 600;
/// Transcripts are cut to this many characters before task extraction.
pub const MAX_TASK_SOURCE_CHARS: usize = 20_000;
/// Tasks kept from one extraction.
pub const MAX_EXTRACTED_TASKS: usize = 20;
const MAX_CONCEPTS: usize = 10;
/// Stored code snippets are capped at this many characters.
const MAX_SNIPPET_CHARS: usize = 10_000;
const TASK_PREVIEW_COUNT: usize = 5;
const TASK_PREVIEW_CHARS: usize = 200;

// ============ Modes ============

/// Depth of a document summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SummaryLevel {
    #[default]
    Short,
    Detailed,
    ExamReady,
}

impl SummaryLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryLevel::Short => "short",
            SummaryLevel::Detailed => "detailed",
            SummaryLevel::ExamReady => "exam-ready",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "short" => Some(SummaryLevel::Short),
            "detailed" => Some(SummaryLevel::Detailed),
            "exam-ready" => Some(SummaryLevel::ExamReady),
            _ => None,
        }
    }

    fn system_prompt(&self) -> &'static str {
        match self {
            SummaryLevel::Short => SUMMARY_SHORT_SYSTEM_PROMPT,
            SummaryLevel::Detailed => SUMMARY_DETAILED_SYSTEM_PROMPT,
            SummaryLevel::ExamReady => SUMMARY_EXAM_SYSTEM_PROMPT,
        }
    }
}

impl fmt::Display for SummaryLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do with a piece of code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeMode {
    Explain,
    Debug,
    Readme,
}

impl CodeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeMode::Explain => "explain",
            CodeMode::Debug => "debug",
            CodeMode::Readme => "readme",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "explain" => Some(CodeMode::Explain),
            "debug" => Some(CodeMode::Debug),
            "readme" => Some(CodeMode::Readme),
            _ => None,
        }
    }
}

impl fmt::Display for CodeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of text tasks are extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskSource {
    #[default]
    Transcript,
    Email,
}

impl TaskSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskSource::Transcript => "transcript",
            TaskSource::Email => "email",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "transcript" => Some(TaskSource::Transcript),
            "email" => Some(TaskSource::Email),
            _ => None,
        }
    }
}

impl fmt::Display for TaskSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============ LLM replies ============

#[derive(Debug, Deserialize)]
struct SummaryReply {
    #[serde(default)]
    summary: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConceptsReply {
    #[serde(default)]
    concepts: Vec<RawConcept>,
}

#[derive(Debug, Deserialize)]
struct RawConcept {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    definition: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StepsReply {
    #[serde(default)]
    steps: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ExplainReply {
    #[serde(default)]
    overview: Option<String>,
    #[serde(default)]
    components: Vec<RawComponent>,
    #[serde(default)]
    patterns: Vec<String>,
    #[serde(default)]
    complexity: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawComponent {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    purpose: Option<String>,
    #[serde(default)]
    lines: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DebugReply {
    #[serde(default)]
    bugs: Vec<RawBug>,
    #[serde(default)]
    edge_cases: Vec<String>,
    #[serde(default)]
    inefficiencies: Vec<RawInefficiency>,
}

#[derive(Debug, Deserialize)]
struct RawBug {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default)]
    line_hint: Option<String>,
    #[serde(default)]
    fix: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawInefficiency {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    suggestion: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReadmeReply {
    #[serde(default)]
    readme: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawTask {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    assignee_hint: Option<String>,
    #[serde(default)]
    deadline_hint: Option<String>,
}

/// Derived fields of a code insight.
struct InsightParts {
    explanation: String,
    components: Vec<String>,
    suggestions: Vec<String>,
}

fn non_blank(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn non_blank_all(items: Vec<String>) -> impl Iterator<Item = String> {
    items.into_iter().filter_map(|s| non_blank(Some(s)))
}

impl ExplainReply {
    fn into_parts(self) -> Option<InsightParts> {
        let mut explanation = non_blank(self.overview)?;
        if let Some(complexity) = non_blank(self.complexity).filter(|c| c != "N/A") {
            explanation.push_str(&format!("\n\nComplexity: {}", complexity));
        }

        let components = self
            .components
            .into_iter()
            .filter_map(|c| {
                let name = non_blank(c.name)?;
                let label = match non_blank(c.lines) {
                    Some(lines) => format!("{} (lines {})", name, lines),
                    None => name,
                };
                Some(match non_blank(c.purpose) {
                    Some(purpose) => format!("{}: {}", label, purpose),
                    None => label,
                })
            })
            .collect();

        Some(InsightParts {
            explanation,
            components,
            suggestions: non_blank_all(self.patterns).collect(),
        })
    }
}

impl DebugReply {
    fn into_parts(self) -> InsightParts {
        let bugs: Vec<String> = self
            .bugs
            .into_iter()
            .filter_map(|b| {
                let mut line = format!(
                    "- [{}] {}",
                    non_blank(b.severity).unwrap_or_else(|| "info".to_string()),
                    non_blank(b.description)?
                );
                if let Some(hint) = non_blank(b.line_hint) {
                    line.push_str(&format!(" ({})", hint));
                }
                if let Some(fix) = non_blank(b.fix) {
                    line.push_str(&format!(" Fix: {}", fix));
                }
                Some(line)
            })
            .collect();

        let mut explanation = match bugs.len() {
            0 => "No bugs found".to_string(),
            1 => "1 bug found".to_string(),
            n => format!("{} bugs found", n),
        };
        for bug in &bugs {
            explanation.push('\n');
            explanation.push_str(bug);
        }

        let mut suggestions: Vec<String> = self
            .inefficiencies
            .into_iter()
            .filter_map(|i| {
                let description = non_blank(i.description)?;
                Some(match non_blank(i.suggestion) {
                    Some(s) => format!("{}: {}", description, s),
                    None => description,
                })
            })
            .collect();
        suggestions.extend(non_blank_all(self.edge_cases).map(|e| format!("Edge case: {}", e)));

        InsightParts {
            explanation,
            components: Vec::new(),
            suggestions,
        }
    }
}

impl RawTask {
    /// A pending task, or `None` when the description is blank.
    ///
    /// Unknown priorities become `medium`; assignee and deadline hints are
    /// kept in `source_text`.
    fn into_task(self, project_id: Uuid, created_at: DateTime<Utc>) -> Option<Task> {
        let description = non_blank(self.description)?;
        let priority = self
            .priority
            .map(|p| p.trim().to_ascii_lowercase())
            .and_then(|p| TaskPriority::parse(&p))
            .unwrap_or(TaskPriority::Medium);

        let mut hints = Vec::new();
        if let Some(assignee) = non_blank(self.assignee_hint) {
            hints.push(format!("[assignee: {}]", assignee));
        }
        if let Some(deadline) = non_blank(self.deadline_hint) {
            hints.push(format!("[deadline: {}]", deadline));
        }

        Some(Task {
            id: Uuid::new_v4(),
            project_id,
            description,
            priority,
            status: TaskStatus::Pending,
            source_text: (!hints.is_empty()).then(|| hints.join(" ")),
            created_at,
        })
    }
}

// ============ Truncation ============

fn truncate_words(text: &str, max_words: usize) -> (String, bool) {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max_words {
        return (text.to_string(), false);
    }
    (
        format!("{}\n\n[Text truncated for analysis]", words[..max_words].join(" ")),
        true,
    )
}

fn truncate_lines(code: &str, max_lines: usize) -> (String, bool) {
    let lines: Vec<&str> = code.lines().collect();
    if lines.len() <= max_lines {
        return (code.to_string(), false);
    }
    (
        format!(
            "{}\n# ... [{} lines truncated for analysis]",
            lines[..max_lines].join("\n"),
            lines.len() - max_lines
        ),
        true,
    )
}

fn truncate_chars(text: &str, max_chars: usize) -> (String, bool) {
    if text.chars().count() <= max_chars {
        return (text.to_string(), false);
    }
    (
        format!("{}\n\n[... text truncated for analysis ...]", preview(text, max_chars)),
        true,
    )
}

// ============ Analyzer ============

pub struct ArtifactAnalyzer {
    store: Arc<dyn Store>,
    llm: Arc<LlmOrchestrator>,
    indexer: Option<Indexer>,
}

impl ArtifactAnalyzer {
    pub fn new(store: Arc<dyn Store>, llm: Arc<LlmOrchestrator>) -> Self {
        Self {
            store,
            llm,
            indexer: None,
        }
    }

    /// Index every code insight and task this analyzer creates.
    pub fn with_indexer(mut self, indexer: Indexer) -> Self {
        self.indexer = Some(indexer);
        self
    }

    /// Summarise a stored document and save the summary on it.
    pub async fn summarise(&self, document_id: Uuid, level: SummaryLevel) -> Result<Document> {
        let mut doc = self.load_document(document_id).await?;
        let (text, truncated) = truncate_words(&doc.raw_text, MAX_DOCUMENT_WORDS);

        let req = self.llm.request(text).system(level.system_prompt());
        let (reply, generation): (SummaryReply, _) = self.llm.generate_json(&req).await?;
        let summary = non_blank(reply.summary).ok_or_else(|| {
            Error::malformed(format!("{} returned no summary", generation.provider))
        })?;

        doc.summary = Some(summary);
        self.save_document(&doc).await?;
        info!(
            document_id = %doc.id,
            level = %level,
            provider = %generation.provider,
            truncated,
            "document summarised"
        );
        Ok(doc)
    }

    /// Extract up to ten key concepts, stored as `name: definition`.
    pub async fn extract_concepts(&self, document_id: Uuid) -> Result<Document> {
        let mut doc = self.load_document(document_id).await?;
        let (text, _) = truncate_words(&doc.raw_text, MAX_DOCUMENT_WORDS);

        let req = self.llm.request(text).system(CONCEPTS_SYSTEM_PROMPT);
        let (reply, generation): (ConceptsReply, _) = self.llm.generate_json(&req).await?;

        doc.key_concepts = reply
            .concepts
            .into_iter()
            .filter_map(|c| {
                let name = non_blank(c.name)?;
                Some(match non_blank(c.definition) {
                    Some(definition) => format!("{}: {}", name, definition),
                    None => name,
                })
            })
            .take(MAX_CONCEPTS)
            .collect();
        self.save_document(&doc).await?;
        info!(
            document_id = %doc.id,
            concepts = doc.key_concepts.len(),
            provider = %generation.provider,
            "concepts extracted"
        );
        Ok(doc)
    }

    /// Turn a stored document into ordered implementation steps.
    pub async fn generate_steps(&self, document_id: Uuid) -> Result<Document> {
        let mut doc = self.load_document(document_id).await?;
        let (text, _) = truncate_words(&doc.raw_text, MAX_DOCUMENT_WORDS);

        let req = self.llm.request(text).system(STEPS_SYSTEM_PROMPT);
        let (reply, generation): (StepsReply, _) = self.llm.generate_json(&req).await?;

        doc.implementation_steps = non_blank_all(reply.steps).collect();
        self.save_document(&doc).await?;
        info!(
            document_id = %doc.id,
            steps = doc.implementation_steps.len(),
            provider = %generation.provider,
            "implementation steps generated"
        );
        Ok(doc)
    }

    /// Explain, debug or document `code` and store the result as a new
    /// code insight of `project_id`.
    ///
    /// | Mode | `explanation` | `components` | `suggestions` |
    /// |------|---------------|--------------|---------------|
    /// | explain | overview + complexity | `name (lines): purpose` | patterns |
    /// | debug | bug count + one line per bug | empty | inefficiencies, edge cases |
    /// | readme | README Markdown | empty | empty |
    pub async fn analyze_code(
        &self,
        project_id: Uuid,
        code: &str,
        language: &str,
        mode: CodeMode,
    ) -> Result<CodeInsight> {
        if code.trim().is_empty() {
            return Err(Error::invalid_input("code is empty"));
        }
        let project = self.require_project(project_id).await?;
        let (code_for_llm, truncated) = truncate_lines(code, MAX_CODE_LINES);

        let (parts, provider) = match mode {
            CodeMode::Explain => {
                let req = self
                    .llm
                    .request(code_prompt(language, &code_for_llm))
                    .system(EXPLAIN_CODE_SYSTEM_PROMPT);
                let (reply, generation): (ExplainReply, _) = self.llm.generate_json(&req).await?;
                let parts = reply.into_parts().ok_or_else(|| {
                    Error::malformed(format!("{} returned no overview", generation.provider))
                })?;
                (parts, generation.provider)
            }
            CodeMode::Debug => {
                let req = self
                    .llm
                    .request(code_prompt(language, &code_for_llm))
                    .system(DEBUG_CODE_SYSTEM_PROMPT);
                let (reply, generation): (DebugReply, _) = self.llm.generate_json(&req).await?;
                (reply.into_parts(), generation.provider)
            }
            CodeMode::Readme => {
                let req = self
                    .llm
                    .request(readme_prompt(
                        Some(project.name.as_str()),
                        language,
                        &code_for_llm,
                    ))
                    .system(README_SYSTEM_PROMPT);
                let (reply, generation): (ReadmeReply, _) = self.llm.generate_json(&req).await?;
                let readme = non_blank(reply.readme).ok_or_else(|| {
                    Error::malformed(format!("{} returned an empty README", generation.provider))
                })?;
                let parts = InsightParts {
                    explanation: readme,
                    components: Vec::new(),
                    suggestions: Vec::new(),
                };
                (parts, generation.provider)
            }
        };

        let insight = CodeInsight {
            id: Uuid::new_v4(),
            project_id,
            code_snippet: preview(code, MAX_SNIPPET_CHARS),
            language: language.to_string(),
            explanation: Some(parts.explanation),
            components: parts.components,
            suggestions: parts.suggestions,
            created_at: Utc::now(),
        };
        self.store.insert_code_insight(&insight).await?;
        self.index(&Artifact::CodeInsight(insight.clone())).await;

        info!(
            %project_id,
            insight_id = %insight.id,
            mode = %mode,
            language,
            provider = %provider,
            truncated,
            "code analysed"
        );
        Ok(insight)
    }

    /// Extract action items from a transcript or email thread and store
    /// them as pending tasks of `project_id`.
    ///
    /// When any task is found, a decision entry listing the first few is
    /// appended to the project's context. That append is best-effort.
    pub async fn extract_tasks(
        &self,
        project_id: Uuid,
        text: &str,
        source: TaskSource,
    ) -> Result<Vec<Task>> {
        if text.trim().is_empty() {
            return Err(Error::invalid_input("text is empty"));
        }
        self.require_project(project_id).await?;
        let (text, truncated) = truncate_chars(text, MAX_TASK_SOURCE_CHARS);

        let req = self
            .llm
            .request(extract_tasks_prompt(source.as_str(), &text))
            .system(EXTRACT_TASKS_SYSTEM_PROMPT);
        let (raw, generation): (Vec<RawTask>, _) = self.llm.generate_json(&req).await?;

        let now = Utc::now();
        let tasks: Vec<Task> = raw
            .into_iter()
            .filter_map(|r| r.into_task(project_id, now))
            .take(MAX_EXTRACTED_TASKS)
            .collect();

        for task in &tasks {
            self.store.insert_task(task).await?;
        }
        for task in &tasks {
            self.index(&Artifact::Task(task.clone())).await;
        }

        if !tasks.is_empty() {
            let listed = tasks
                .iter()
                .take(TASK_PREVIEW_COUNT)
                .map(|t| t.description.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            let note = format!(
                "[Workflow] {} tasks extracted ({}): {}",
                tasks.len(),
                source,
                preview(&listed, TASK_PREVIEW_CHARS)
            );
            if let Err(e) = self
                .store
                .append_context_entry(project_id, ContextKind::Decision, &note)
                .await
            {
                warn!(%project_id, error = %e, "failed to record task extraction in context");
            }
        }

        info!(
            %project_id,
            source = %source,
            tasks = tasks.len(),
            provider = %generation.provider,
            truncated,
            "tasks extracted"
        );
        Ok(tasks)
    }

    async fn require_project(&self, project_id: Uuid) -> Result<Project> {
        self.store
            .get_project(project_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("project {}", project_id)))
    }

    async fn load_document(&self, document_id: Uuid) -> Result<Document> {
        let doc = self
            .store
            .get_document(document_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("document {}", document_id)))?;
        if doc.raw_text.trim().is_empty() {
            return Err(Error::invalid_input(format!(
                "document {} has no text to analyse",
                document_id
            )));
        }
        Ok(doc)
    }

    async fn save_document(&self, doc: &Document) -> Result<()> {
        if !self.store.update_document(doc).await? {
            return Err(Error::not_found(format!("document {}", doc.id)));
        }
        Ok(())
    }

    async fn index(&self, artifact: &Artifact) {
        let Some(indexer) = &self.indexer else {
            return;
        };
        if let Err(e) = indexer.index_artifact(artifact).await {
            warn!(
                artifact_id = %artifact.id(),
                error = %e,
                "indexing failed, artifact stored without embeddings"
            );
        }
    }
}
