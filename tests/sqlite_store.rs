//! `SqliteStore` against a throwaway database file.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tempfile::TempDir;
use uuid::Uuid;

use project_context::config::Config;
use project_context::sqlite_store::SqliteStore;
use project_context_core::models::{
    Artifact, ArtifactKind, ChatMessage, CodeInsight, ContextKind, ContextReference, Document,
    DriftWarning, EmbeddingRecord, Project, Role, RoutedModule, Severity, SourceType, Task,
    TaskPriority, TaskStatus,
};
use project_context_core::search::search;
use project_context_core::store::Store;

async fn open(tmp: &TempDir) -> SqliteStore {
    let mut config = Config::default();
    config.db.path = tmp.path().join("data").join("pctx.sqlite");
    SqliteStore::open(&config).await.unwrap()
}

fn document(project_id: Uuid, name: &str, summary: Option<&str>, age_mins: i64) -> Document {
    Document {
        id: Uuid::new_v4(),
        project_id,
        filename: name.to_string(),
        doc_type: "md".to_string(),
        raw_text: format!("body of {}", name),
        summary: summary.map(str::to_string),
        key_concepts: vec!["billing".to_string()],
        implementation_steps: Vec::new(),
        created_at: Utc::now() - Duration::minutes(age_mins),
    }
}

fn task(project_id: Uuid, desc: &str, priority: TaskPriority, age_mins: i64) -> Task {
    Task {
        id: Uuid::new_v4(),
        project_id,
        description: desc.to_string(),
        priority,
        status: TaskStatus::Pending,
        source_text: None,
        created_at: Utc::now() - Duration::minutes(age_mins),
    }
}

#[tokio::test]
async fn open_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    open(&tmp).await;
    let store = open(&tmp).await;
    assert!(store.get_project(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn project_lists_are_materialized_from_the_log() {
    let tmp = TempDir::new().unwrap();
    let store = open(&tmp).await;
    let project = Project::new("Atlas", "Ship it").with_constraints(["Use PostgreSQL", "Rust only"]);
    store.upsert_project(&project).await.unwrap();

    let entry = store
        .append_context_entry(project.id, ContextKind::OpenQuestion, "Which queue?")
        .await
        .unwrap()
        .unwrap();
    assert!(entry.seq > 0);

    let loaded = store.get_project(project.id).await.unwrap().unwrap();
    assert_eq!(loaded.name, "Atlas");
    assert_eq!(loaded.constraints, vec!["Use PostgreSQL", "Rust only"]);
    assert_eq!(loaded.open_questions, vec!["Which queue?"]);

    // re-upserting renames but never rewrites the lists
    let mut renamed = project.clone();
    renamed.name = "Atlas v2".to_string();
    renamed.constraints = vec!["something else".to_string()];
    store.upsert_project(&renamed).await.unwrap();
    let loaded = store.get_project(project.id).await.unwrap().unwrap();
    assert_eq!(loaded.name, "Atlas v2");
    assert_eq!(loaded.constraints, vec!["Use PostgreSQL", "Rust only"]);
}

#[tokio::test]
async fn append_to_missing_project_is_none() {
    let tmp = TempDir::new().unwrap();
    let store = open(&tmp).await;
    let res = store
        .append_context_entry(Uuid::new_v4(), ContextKind::Decision, "x")
        .await
        .unwrap();
    assert!(res.is_none());
}

#[tokio::test]
async fn concurrent_appends_are_all_kept() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(open(&tmp).await);
    let project = Project::new("p", "g");
    store.upsert_project(&project).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..16 {
        let store = Arc::clone(&store);
        let id = project.id;
        handles.push(tokio::spawn(async move {
            store
                .append_context_entry(id, ContextKind::Decision, &format!("d{}", i))
                .await
        }));
    }
    for h in handles {
        assert!(h.await.unwrap().unwrap().is_some());
    }

    let loaded = store.get_project(project.id).await.unwrap().unwrap();
    assert_eq!(loaded.decisions.len(), 16);
}

#[tokio::test]
async fn recent_artifacts_newest_first_with_digest() {
    let tmp = TempDir::new().unwrap();
    let store = open(&tmp).await;
    let pid = Uuid::new_v4();
    store.insert_document(&document(pid, "old.md", Some("old"), 30)).await.unwrap();
    store.insert_document(&document(pid, "blank.md", Some("  "), 10)).await.unwrap();
    store.insert_document(&document(pid, "newline.md", Some("\n"), 9)).await.unwrap();
    store.insert_document(&document(pid, "mixed.md", Some(" \t\r\n "), 8)).await.unwrap();
    store.insert_document(&document(pid, "new.md", Some("new"), 1)).await.unwrap();
    store.insert_document(&document(Uuid::new_v4(), "other.md", Some("x"), 0)).await.unwrap();
    store
        .insert_code_insight(&CodeInsight {
            id: Uuid::new_v4(),
            project_id: pid,
            code_snippet: "fn main() {}".to_string(),
            language: "rust".to_string(),
            explanation: Some("Entry point".to_string()),
            components: vec!["main".to_string()],
            suggestions: Vec::new(),
            created_at: Utc::now(),
        })
        .await
        .unwrap();
    store
        .insert_code_insight(&CodeInsight {
            id: Uuid::new_v4(),
            project_id: pid,
            code_snippet: "fn helper() {}".to_string(),
            language: "rust".to_string(),
            explanation: Some("\n\n".to_string()),
            components: Vec::new(),
            suggestions: Vec::new(),
            created_at: Utc::now(),
        })
        .await
        .unwrap();
    store.insert_task(&task(pid, "\t\n", TaskPriority::High, 0)).await.unwrap();
    store.insert_task(&task(pid, "Write migrations", TaskPriority::Low, 5)).await.unwrap();

    let docs = store
        .list_recent_artifacts(pid, ArtifactKind::Document, 5)
        .await
        .unwrap();
    let names: Vec<String> = docs
        .iter()
        .map(|a| match a {
            Artifact::Document(d) => d.filename.clone(),
            _ => panic!("expected a document"),
        })
        .collect();
    assert_eq!(names, vec!["new.md", "old.md"]);
    if let Artifact::Document(d) = &docs[0] {
        assert_eq!(d.key_concepts, vec!["billing"]);
    }

    let insights = store
        .list_recent_artifacts(pid, ArtifactKind::CodeInsight, 5)
        .await
        .unwrap();
    assert_eq!(insights.len(), 1);
    assert_eq!(insights[0].digest(), Some("Entry point"));

    let tasks = store
        .list_recent_artifacts(pid, ArtifactKind::Task, 5)
        .await
        .unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].digest(), Some("Write migrations"));
}

#[tokio::test]
async fn open_tasks_by_priority_then_recency() {
    let tmp = TempDir::new().unwrap();
    let store = open(&tmp).await;
    let pid = Uuid::new_v4();
    store.insert_task(&task(pid, "old high", TaskPriority::High, 30)).await.unwrap();
    store.insert_task(&task(pid, "low", TaskPriority::Low, 1)).await.unwrap();
    store.insert_task(&task(pid, "new high", TaskPriority::High, 5)).await.unwrap();
    store.insert_task(&task(pid, "medium", TaskPriority::Medium, 2)).await.unwrap();
    let mut done = task(pid, "done", TaskPriority::High, 0);
    done.status = TaskStatus::Done;
    store.insert_task(&done).await.unwrap();

    let open = store.list_open_tasks(pid).await.unwrap();
    let names: Vec<&str> = open.iter().map(|t| t.description.as_str()).collect();
    assert_eq!(names, vec!["new high", "old high", "medium", "low"]);
}

#[tokio::test]
async fn chat_messages_round_trip_with_metadata() {
    let tmp = TempDir::new().unwrap();
    let store = open(&tmp).await;
    let pid = Uuid::new_v4();

    let mut user = ChatMessage::new(pid, Role::User, "Which database?");
    user.routed_module = Some(RoutedModule::Rag);
    store.save_chat_message(&user).await.unwrap();

    let mut answer = ChatMessage::new(pid, Role::Assistant, "MongoDB");
    answer.provider = Some("groq".to_string());
    answer.latency_ms = Some(812.4);
    answer.context_used = vec![ContextReference {
        source_type: SourceType::Document,
        source_id: Uuid::new_v4(),
        chunk_preview: "Invoices are stored".to_string(),
    }];
    answer.drift_warnings = vec![DriftWarning {
        kind: "technology_mismatch".to_string(),
        severity: Severity::High,
        description: "Response suggests 'mongodb'".to_string(),
        constraint_violated: "Use PostgreSQL".to_string(),
    }];
    let saved = store.save_chat_message(&answer).await.unwrap();
    assert!(saved.seq > 0);

    let history = store.list_chat_messages(pid, 50).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].content, "Which database?");
    assert_eq!(history[0].routed_module, Some(RoutedModule::Rag));
    assert_eq!(history[1].provider.as_deref(), Some("groq"));
    assert_eq!(history[1].latency_ms, Some(812.4));
    assert_eq!(history[1].context_used, answer.context_used);
    assert_eq!(history[1].drift_warnings, answer.drift_warnings);

    let latest = store.list_chat_messages(pid, 1).await.unwrap();
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].id, answer.id);
}

#[tokio::test]
async fn search_is_project_scoped_and_ordered() {
    let tmp = TempDir::new().unwrap();
    let store = open(&tmp).await;
    let pid = Uuid::new_v4();
    let doc_id = Uuid::new_v4();

    let records = vec![
        EmbeddingRecord::new(pid, SourceType::Document, doc_id, "exact", vec![1.0, 0.0]),
        EmbeddingRecord::new(pid, SourceType::Document, doc_id, "diagonal", vec![1.0, 1.0]),
        EmbeddingRecord::new(pid, SourceType::Task, Uuid::new_v4(), "orthogonal", vec![0.0, 1.0]),
        EmbeddingRecord::new(Uuid::new_v4(), SourceType::Document, Uuid::new_v4(), "foreign", vec![1.0, 0.0]),
    ];
    store.insert_embeddings(&records).await.unwrap();

    let hits = search(&store, pid, &[1.0, 0.0], 2).await.unwrap();
    let chunks: Vec<&str> = hits.iter().map(|h| h.chunk.as_str()).collect();
    assert_eq!(chunks, vec!["exact", "diagonal"]);
    assert!(hits[0].distance <= hits[1].distance);

    let removed = store.delete_embeddings(pid, doc_id).await.unwrap();
    assert_eq!(removed, 2);
    let hits = search(&store, pid, &[1.0, 0.0], 5).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].source_type, SourceType::Task);
}

#[tokio::test]
async fn chat_turn_is_all_or_nothing() {
    let tmp = TempDir::new().unwrap();
    let store = open(&tmp).await;
    let pid = Uuid::new_v4();

    let (user, answer) = store
        .save_chat_turn(
            &ChatMessage::new(pid, Role::User, "Which queue?"),
            &ChatMessage::new(pid, Role::Assistant, "Use the existing one."),
        )
        .await
        .unwrap();
    assert_eq!(answer.seq, user.seq + 1);

    // the reply collides with a stored id, so the question must not land either
    let mut clash = ChatMessage::new(pid, Role::Assistant, "duplicate");
    clash.id = answer.id;
    let res = store
        .save_chat_turn(&ChatMessage::new(pid, Role::User, "Orphan?"), &clash)
        .await;
    assert!(res.is_err());

    let history = store.list_chat_messages(pid, 50).await.unwrap();
    let contents: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["Which queue?", "Use the existing one."]);
}

#[tokio::test]
async fn replace_embeddings_swaps_only_that_source() {
    let tmp = TempDir::new().unwrap();
    let store = open(&tmp).await;
    let pid = Uuid::new_v4();
    let doc_id = Uuid::new_v4();
    store
        .insert_embeddings(&[
            EmbeddingRecord::new(pid, SourceType::Document, doc_id, "old a", vec![1.0, 0.0]),
            EmbeddingRecord::new(pid, SourceType::Document, doc_id, "old b", vec![1.0, 0.0]),
            EmbeddingRecord::new(pid, SourceType::Task, Uuid::new_v4(), "task", vec![0.0, 1.0]),
        ])
        .await
        .unwrap();

    let removed = store
        .replace_embeddings(
            pid,
            doc_id,
            &[EmbeddingRecord::new(pid, SourceType::Document, doc_id, "new", vec![1.0, 0.0])],
        )
        .await
        .unwrap();
    assert_eq!(removed, 2);

    let hits = search(&store, pid, &[1.0, 0.0], 10).await.unwrap();
    let chunks: Vec<&str> = hits.iter().map(|h| h.chunk.as_str()).collect();
    assert_eq!(chunks, vec!["new", "task"]);
}

#[tokio::test]
async fn analysis_fields_update_in_place() {
    let tmp = TempDir::new().unwrap();
    let store = open(&tmp).await;
    let pid = Uuid::new_v4();

    let doc = document(pid, "design.md", None, 0);
    store.insert_document(&doc).await.unwrap();
    let mut analysed = doc.clone();
    analysed.summary = Some("Billing design.".to_string());
    analysed.implementation_steps = vec!["Create tables".to_string()];
    assert!(store.update_document(&analysed).await.unwrap());

    let loaded = store.get_document(doc.id).await.unwrap().unwrap();
    assert_eq!(loaded.summary.as_deref(), Some("Billing design."));
    assert_eq!(loaded.implementation_steps, vec!["Create tables"]);
    assert_eq!(loaded.raw_text, doc.raw_text);

    assert!(store.get_document(Uuid::new_v4()).await.unwrap().is_none());
    let mut missing = analysed.clone();
    missing.id = Uuid::new_v4();
    assert!(!store.update_document(&missing).await.unwrap());
}
