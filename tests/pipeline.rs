//! End-to-end chat turns against the in-memory store.
//!
//! LLM backends and the embedder are scripted in-process, so these tests
//! exercise routing, prompt assembly, failover, drift detection and
//! persistence together without any network.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use project_context::analysis::{ArtifactAnalyzer, TaskSource};
use project_context::config::Config;
use project_context::embedding::{DisabledEmbedder, Embedder};
use project_context::error::Error;
use project_context::llm::{
    GenerateRequest, LlmOrchestrator, LlmProvider, ProviderError, ProviderErrorKind,
};
use project_context::pipeline::{QueryPipeline, CHAT_TEMPERATURE};
use project_context_core::embedding::EmbeddingProvider;
use project_context_core::models::{
    EmbeddingRecord, Project, Role, RoutedModule, Severity, SourceType,
};
use project_context_core::store::memory::InMemoryStore;
use project_context_core::store::Store;

const NO_VIOLATIONS: &str = r#"{"has_violations": false, "violations": []}"#;

// ─── Scripted collaborators ─────────────────────────────────────────

struct ScriptedLlm {
    name: &'static str,
    replies: Mutex<VecDeque<std::result::Result<String, ProviderErrorKind>>>,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl ScriptedLlm {
    fn new(
        name: &'static str,
        replies: Vec<std::result::Result<&str, ProviderErrorKind>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name,
            replies: Mutex::new(replies.into_iter().map(|r| r.map(str::to_string)).collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn name(&self) -> &str {
        self.name
    }

    async fn generate(&self, req: &GenerateRequest) -> std::result::Result<String, ProviderError> {
        self.requests.lock().unwrap().push(req.clone());
        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(kind)) => Err(ProviderError::new(kind, self.name, "scripted failure")),
            None => Ok(NO_VIOLATIONS.to_string()),
        }
    }
}

struct ConstantEmbedder;

impl EmbeddingProvider for ConstantEmbedder {
    fn model_name(&self) -> &str {
        "constant"
    }
    fn dims(&self) -> usize {
        3
    }
}

#[async_trait]
impl Embedder for ConstantEmbedder {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![1.0, 0.0, 0.0]).collect())
    }
}

async fn seeded_store() -> (Arc<InMemoryStore>, Project) {
    let store = Arc::new(InMemoryStore::new());
    let project = Project::new("Atlas", "Ship the billing API")
        .with_constraints(["Must use PostgreSQL for all persistence"]);
    store.upsert_project(&project).await.unwrap();
    store
        .insert_embeddings(&[
            EmbeddingRecord::new(
                project.id,
                SourceType::Document,
                Uuid::new_v4(),
                "Invoices are stored in the invoices table.",
                vec![1.0, 0.0, 0.0],
            ),
            EmbeddingRecord::new(
                project.id,
                SourceType::Task,
                Uuid::new_v4(),
                "Unrelated chunk",
                vec![0.0, 1.0, 0.0],
            ),
        ])
        .await
        .unwrap();
    (store, project)
}

fn pipeline(
    config: &Config,
    store: Arc<InMemoryStore>,
    embedder: Arc<dyn Embedder>,
    primary: Arc<ScriptedLlm>,
    fallback: Option<Arc<ScriptedLlm>>,
) -> QueryPipeline {
    let llm = LlmOrchestrator::new(
        primary,
        fallback.map(|f| f as Arc<dyn LlmProvider>),
    );
    QueryPipeline::new(config, store, embedder, Arc::new(llm)).unwrap()
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn full_turn_answers_flags_drift_and_persists() {
    let (store, project) = seeded_store().await;
    let llm = ScriptedLlm::new(
        "primary",
        vec![Ok("Store the sessions in MongoDB."), Ok(NO_VIOLATIONS)],
    );
    let p = pipeline(
        &Config::default(),
        store.clone(),
        Arc::new(ConstantEmbedder),
        llm.clone(),
        None,
    );

    let resp = p
        .query(project.id, "Where should this function keep session data?")
        .await
        .unwrap();

    assert_eq!(resp.answer, "Store the sessions in MongoDB.");
    assert_eq!(resp.provider, "primary");
    assert_eq!(resp.routed_module, RoutedModule::Developer);
    assert_eq!(resp.context_used.len(), 2);
    assert_eq!(resp.context_used[0].source_type, SourceType::Document);
    assert_eq!(resp.drift_warnings.len(), 1);
    assert_eq!(resp.drift_warnings[0].kind, "technology_mismatch");
    assert_eq!(resp.drift_warnings[0].severity, Severity::High);
    assert!(resp.drift_warnings[0].constraint_violated.contains("PostgreSQL"));

    let requests = llm.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].temperature, CHAT_TEMPERATURE);
    assert!(requests[0].prompt.contains("=== PROJECT CONTEXT ==="));
    assert!(requests[0].prompt.contains("Invoices are stored"));
    assert_eq!(requests[1].temperature, 0.0);

    let history = p.chat_history(project.id, 50).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, Role::User);
    assert_eq!(history[0].routed_module, Some(RoutedModule::Developer));
    assert_eq!(history[1].role, Role::Assistant);
    assert_eq!(history[1].id, resp.message_id);
    assert_eq!(history[1].provider.as_deref(), Some("primary"));
    assert_eq!(history[1].drift_warnings, resp.drift_warnings);
    assert_eq!(history[1].context_used, resp.context_used);
    assert_eq!(history[1].seq, history[0].seq + 1);
}

#[tokio::test]
async fn rate_limited_primary_answers_from_fallback() {
    let (store, project) = seeded_store().await;
    let primary = ScriptedLlm::new("gemini", vec![Err(ProviderErrorKind::RateLimited)]);
    let fallback = ScriptedLlm::new("groq", vec![Ok("Use the invoices table.")]);
    let mut config = Config::default();
    config.drift.semantic = false;
    let p = pipeline(&config, store, Arc::new(ConstantEmbedder), primary, Some(fallback));

    let resp = p.query(project.id, "Where do invoices live?").await.unwrap();
    assert_eq!(resp.provider, "groq");
    assert!(resp.drift_warnings.is_empty());
}

#[tokio::test]
async fn exhausted_chain_fails_and_persists_nothing() {
    let (store, project) = seeded_store().await;
    let primary = ScriptedLlm::new("gemini", vec![Err(ProviderErrorKind::Timeout)]);
    let fallback = ScriptedLlm::new("groq", vec![Err(ProviderErrorKind::ConnectionError)]);
    let p = pipeline(
        &Config::default(),
        store.clone(),
        Arc::new(ConstantEmbedder),
        primary,
        Some(fallback),
    );

    let err = p.query(project.id, "Anything?").await.unwrap_err();
    assert!(matches!(err, Error::AllProvidersFailed(_)));
    assert!(store.list_chat_messages(project.id, 50).await.unwrap().is_empty());
}

#[tokio::test]
async fn retrieval_failure_degrades_to_no_references() {
    let (store, project) = seeded_store().await;
    let llm = ScriptedLlm::new("primary", vec![Ok("Answer without knowledge.")]);
    let p = pipeline(
        &Config::default(),
        store,
        Arc::new(DisabledEmbedder),
        llm.clone(),
        None,
    );

    let resp = p.query(project.id, "Summarize the design document").await.unwrap();
    assert!(resp.context_used.is_empty());
    assert_eq!(resp.routed_module, RoutedModule::Learning);
    let prompt = &llm.requests()[0].prompt;
    assert!(prompt.contains("=== PROJECT CONTEXT ==="));
    assert!(!prompt.contains("=== RELEVANT KNOWLEDGE ==="));
}

#[tokio::test]
async fn unknown_project_sends_raw_query() {
    let store = Arc::new(InMemoryStore::new());
    let llm = ScriptedLlm::new("primary", vec![Ok("Generic answer.")]);
    let p = pipeline(
        &Config::default(),
        store,
        Arc::new(ConstantEmbedder),
        llm.clone(),
        None,
    );

    let resp = p.query(Uuid::new_v4(), "What's the weather?").await.unwrap();
    assert_eq!(resp.routed_module, RoutedModule::Rag);
    assert!(resp.context_used.is_empty());
    assert!(resp.drift_warnings.is_empty());
    // no constraints, so no semantic drift call either
    let requests = llm.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].prompt, "What's the weather?");
}

#[tokio::test]
async fn semantic_violations_are_merged_after_rule_warnings() {
    let (store, project) = seeded_store().await;
    let verdict = r#"```json
{"has_violations": true, "violations": [
  {"type": "architecture_change", "severity": "low", "description": "Suggests a second datastore.", "constraint_violated": "Must use PostgreSQL for all persistence"}
]}
```"#;
    let llm = ScriptedLlm::new("primary", vec![Ok("Add Redis and MongoDB."), Ok(verdict)]);
    let p = pipeline(
        &Config::default(),
        store,
        Arc::new(ConstantEmbedder),
        llm,
        None,
    );

    let resp = p.query(project.id, "How do we cache?").await.unwrap();
    let kinds: Vec<&str> = resp.drift_warnings.iter().map(|w| w.kind.as_str()).collect();
    assert_eq!(
        kinds,
        vec!["technology_mismatch", "technology_mismatch", "architecture_change"]
    );
    assert_eq!(resp.drift_warnings[2].severity, Severity::Low);
}

#[tokio::test]
async fn chat_history_returns_latest_turns_oldest_first() {
    let (store, project) = seeded_store().await;
    let llm = ScriptedLlm::new("primary", vec![Ok("a1"), Ok("a2"), Ok("a3")]);
    let mut config = Config::default();
    config.drift.semantic = false;
    let p = pipeline(&config, store, Arc::new(ConstantEmbedder), llm, None);

    for q in ["q1", "q2", "q3"] {
        p.query(project.id, q).await.unwrap();
    }

    let history = p.chat_history(project.id, 4).await.unwrap();
    let contents: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["q2", "a2", "q3", "a3"]);
}

#[tokio::test]
async fn appended_decision_reaches_next_prompt() {
    let (store, project) = seeded_store().await;
    let llm = ScriptedLlm::new("primary", vec![Ok("ok")]);
    let mut config = Config::default();
    config.drift.semantic = false;
    let p = pipeline(&config, store, Arc::new(ConstantEmbedder), llm.clone(), None);

    p.context()
        .append_context(project.id, "decision", "Invoices are immutable")
        .await
        .unwrap()
        .unwrap();
    p.query(project.id, "Can we edit invoices?").await.unwrap();

    assert!(llm.requests()[0]
        .prompt
        .contains("Decisions: Invoices are immutable"));
}

#[tokio::test]
async fn extracted_tasks_reach_the_next_prompt() {
    let (store, project) = seeded_store().await;
    let llm = ScriptedLlm::new(
        "primary",
        vec![
            Ok(r#"[{"description": "Add an index on invoices.customer_id", "priority": "high"}]"#),
            Ok("Start with the index."),
        ],
    );
    let orchestrator = Arc::new(LlmOrchestrator::new(llm.clone(), None));
    let analyzer = ArtifactAnalyzer::new(store.clone(), orchestrator.clone());

    let tasks = analyzer
        .extract_tasks(
            project.id,
            "Dana: we need an index on customer_id before launch, it's urgent.",
            TaskSource::Transcript,
        )
        .await
        .unwrap();
    assert_eq!(tasks.len(), 1);

    let mut config = Config::default();
    config.drift.semantic = false;
    let p = QueryPipeline::new(&config, store, Arc::new(ConstantEmbedder), orchestrator).unwrap();
    p.query(project.id, "What should I work on next?").await.unwrap();

    let prompt = &llm.requests()[1].prompt;
    assert!(prompt.contains("  - [high] Add an index on invoices.customer_id"));
    assert!(prompt.contains("[Workflow] 1 tasks extracted (transcript)"));
}
