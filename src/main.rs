//! # Project Context CLI (`pctx`)
//!
//! ## Usage
//!
//! ```bash
//! pctx --config ./config/pctx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pctx init` | Create the SQLite database and run schema migrations |
//! | `pctx import <file.json>` | Import projects and artifacts, then index them |
//! | `pctx ask <project> "<question>"` | Run one context-augmented chat turn |
//! | `pctx history <project>` | Print the project's chat history |
//! | `pctx note <project> <kind> "<text>"` | Append a decision or open question |
//! | `pctx route "<question>"` | Print the routed module for a question |
//! | `pctx drift <project> <file>` | Check a text file against the project's constraints |
//! | `pctx analyze summary <document>` | Summarise a stored document |
//! | `pctx analyze concepts <document>` | Extract a document's key concepts |
//! | `pctx analyze steps <document>` | Turn a document into implementation steps |
//! | `pctx analyze code <project> <file>` | Explain, debug or document a source file |
//! | `pctx analyze tasks <project> <file>` | Extract tasks from a transcript or email |
//!
//! Logs go to stderr (`RUST_LOG`, default `info`); command output goes to
//! stdout.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use project_context::analysis::{ArtifactAnalyzer, CodeMode, SummaryLevel, TaskSource};
use project_context::config::{self, Config};
use project_context::context::ContextEngine;
use project_context::drift::DriftDetector;
use project_context::embedding::{create_embedder, DisabledEmbedder};
use project_context::error::Error;
use project_context::import;
use project_context::ingest::Indexer;
use project_context::llm::LlmOrchestrator;
use project_context::pipeline::{ChatResponse, QueryPipeline, DEFAULT_HISTORY_LIMIT};
use project_context::router::IntentRouter;
use project_context::sqlite_store::SqliteStore;
use project_context_core::models::{ChatMessage, CodeInsight, Document, Role, Task};
use project_context_core::store::Store;

/// Project Context CLI: project memory, retrieval-augmented chat and
/// constraint drift detection.
#[derive(Parser)]
#[command(name = "pctx", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/pctx.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and all tables. Safe to run repeatedly.
    Init,

    /// Import projects, documents, code insights and tasks from JSON.
    ///
    /// Artifacts are chunked and embedded unless `embedding.provider` is
    /// `disabled`.
    Import {
        file: PathBuf,
    },

    /// Ask a question in the context of a project.
    Ask {
        project: Uuid,
        question: String,

        /// Print the response as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show the project's chat history, oldest first.
    History {
        project: Uuid,

        #[arg(long, default_value_t = DEFAULT_HISTORY_LIMIT)]
        limit: usize,
    },

    /// Append to the project's decisions or open questions.
    Note {
        project: Uuid,
        /// `decision` or `open_question`.
        kind: String,
        text: String,
    },

    /// Print the module a question would be routed to.
    Route {
        question: String,
    },

    /// Check a text file for drift from the project's constraints.
    Drift {
        project: Uuid,
        file: PathBuf,
    },

    /// Analyse artifacts with the LLM and store the results.
    Analyze {
        #[command(subcommand)]
        target: AnalyzeTarget,
    },
}

#[derive(Subcommand)]
enum AnalyzeTarget {
    /// Summarise a stored document.
    Summary {
        document: Uuid,
        /// `short`, `detailed` or `exam-ready`.
        #[arg(long, default_value = "short")]
        level: String,
    },

    /// Extract the key concepts of a stored document.
    Concepts {
        document: Uuid,
    },

    /// Turn a stored document into implementation steps.
    Steps {
        document: Uuid,
    },

    /// Explain, debug or write a README for a source file. The result is
    /// stored as a code insight.
    Code {
        project: Uuid,
        file: PathBuf,
        /// Defaults to the file extension.
        #[arg(long)]
        language: Option<String>,
        /// `explain`, `debug` or `readme`.
        #[arg(long, default_value = "explain")]
        mode: String,
    },

    /// Extract tasks from a meeting transcript or email thread.
    Tasks {
        project: Uuid,
        file: PathBuf,
        /// `transcript` or `email`.
        #[arg(long, default_value = "transcript")]
        source: String,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_llm(cfg: &Config) -> Result<Arc<LlmOrchestrator>> {
    let orchestrator = LlmOrchestrator::from_config(
        &cfg.llm,
        std::env::var("GEMINI_API_KEY").ok(),
        std::env::var("GROQ_API_KEY").ok(),
    )?;
    Ok(Arc::new(orchestrator))
}

/// An indexer for new artifacts, or `None` when embedding is disabled.
fn build_indexer(cfg: &Config, store: Arc<dyn Store>) -> Result<Option<Indexer>> {
    if !cfg.embedding.is_enabled() {
        warn!("embedding disabled, artifacts stored without embeddings");
        return Ok(None);
    }
    Ok(Some(Indexer::new(
        store,
        create_embedder(&cfg.embedding)?,
        cfg.chunking.max_chars,
    )))
}

fn read_file(file: &Path) -> Result<String> {
    std::fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))
}

async fn require_project(store: &dyn Store, id: Uuid) -> Result<()> {
    if store.get_project(id).await?.is_none() {
        return Err(Error::not_found(format!("project {}", id)).into());
    }
    Ok(())
}

fn print_response(resp: &ChatResponse) {
    println!("{}", resp.answer);
    println!();
    println!(
        "[{}] via {} in {:.1} ms (message {})",
        resp.routed_module, resp.provider, resp.latency_ms, resp.message_id
    );
    if !resp.context_used.is_empty() {
        println!("\nContext used:");
        for (i, r) in resp.context_used.iter().enumerate() {
            println!("  {}. [{}] {}", i + 1, r.source_type, r.chunk_preview.replace('\n', " "));
        }
    }
    if !resp.drift_warnings.is_empty() {
        println!("\nDrift warnings:");
        for w in &resp.drift_warnings {
            println!("  - ({:?}) {}: {}", w.severity, w.kind, w.description);
        }
    }
}

fn print_document(doc: &Document) {
    println!("{} ({})", doc.filename, doc.id);
    if let Some(summary) = &doc.summary {
        println!("\n{}", summary);
    }
    if !doc.key_concepts.is_empty() {
        println!("\nKey concepts:");
        for c in &doc.key_concepts {
            println!("  - {}", c);
        }
    }
    if !doc.implementation_steps.is_empty() {
        println!("\nImplementation steps:");
        for (i, step) in doc.implementation_steps.iter().enumerate() {
            println!("  {}. {}", i + 1, step);
        }
    }
}

fn print_insight(insight: &CodeInsight) {
    println!("{}", insight.explanation.as_deref().unwrap_or_default());
    if !insight.components.is_empty() {
        println!("\nComponents:");
        for c in &insight.components {
            println!("  - {}", c);
        }
    }
    if !insight.suggestions.is_empty() {
        println!("\nNotes:");
        for s in &insight.suggestions {
            println!("  - {}", s);
        }
    }
    println!("\n(code insight {})", insight.id);
}

fn print_task(task: &Task) {
    match &task.source_text {
        Some(hints) => println!("- [{}] {} {}", task.priority, task.description, hints),
        None => println!("- [{}] {}", task.priority, task.description),
    }
}

async fn run_analyze(cfg: &Config, target: AnalyzeTarget) -> Result<()> {
    let store: Arc<dyn Store> = Arc::new(SqliteStore::open(cfg).await?);
    let mut analyzer = ArtifactAnalyzer::new(store.clone(), build_llm(cfg)?);
    if let Some(indexer) = build_indexer(cfg, store)? {
        analyzer = analyzer.with_indexer(indexer);
    }

    match target {
        AnalyzeTarget::Summary { document, level } => {
            let Some(level) = SummaryLevel::parse(&level) else {
                bail!("Unknown summary level '{}' (short, detailed, exam-ready)", level);
            };
            print_document(&analyzer.summarise(document, level).await?);
        }
        AnalyzeTarget::Concepts { document } => {
            print_document(&analyzer.extract_concepts(document).await?);
        }
        AnalyzeTarget::Steps { document } => {
            print_document(&analyzer.generate_steps(document).await?);
        }
        AnalyzeTarget::Code {
            project,
            file,
            language,
            mode,
        } => {
            let Some(mode) = CodeMode::parse(&mode) else {
                bail!("Unknown code mode '{}' (explain, debug, readme)", mode);
            };
            let language = language.unwrap_or_else(|| {
                file.extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or("text")
                    .to_string()
            });
            let code = read_file(&file)?;
            print_insight(&analyzer.analyze_code(project, &code, &language, mode).await?);
        }
        AnalyzeTarget::Tasks {
            project,
            file,
            source,
        } => {
            let Some(source) = TaskSource::parse(&source) else {
                bail!("Unknown task source '{}' (transcript, email)", source);
            };
            let text = read_file(&file)?;
            let tasks = analyzer.extract_tasks(project, &text, source).await?;
            if tasks.is_empty() {
                println!("No tasks found.");
            }
            for task in &tasks {
                print_task(task);
            }
        }
    }
    Ok(())
}

fn print_message(msg: &ChatMessage) {
    let who = match msg.role {
        Role::User => "you",
        Role::Assistant => msg.provider.as_deref().unwrap_or("assistant"),
    };
    println!(
        "--- #{} {} {}",
        msg.seq,
        who,
        msg.created_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!("{}", msg.content);
    if !msg.drift_warnings.is_empty() {
        println!("({} drift warning(s))", msg.drift_warnings.len());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    // No config needed.
    if let Commands::Route { question } = &cli.command {
        let router = IntentRouter::new()?;
        println!("{}", router.route(question));
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            SqliteStore::open(&cfg).await?;
            println!("Database initialized at {}", cfg.db.path.display());
        }
        Commands::Import { file } => {
            let data = import::read_import_file(&file)?;
            let store: Arc<dyn Store> = Arc::new(SqliteStore::open(&cfg).await?);
            let indexer = build_indexer(&cfg, store.clone())?;
            let stats = import::import(store.as_ref(), indexer.as_ref(), data).await?;
            println!(
                "Imported {} project(s), {} document(s), {} code insight(s), {} task(s); {} chunk(s) embedded",
                stats.projects, stats.documents, stats.code_insights, stats.tasks, stats.index.chunks
            );
        }
        Commands::Ask {
            project,
            question,
            json,
        } => {
            let store: Arc<dyn Store> = Arc::new(SqliteStore::open(&cfg).await?);
            require_project(store.as_ref(), project).await?;
            let pipeline =
                QueryPipeline::new(&cfg, store, create_embedder(&cfg.embedding)?, build_llm(&cfg)?)?;
            let resp = pipeline.query(project, &question).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&resp)?);
            } else {
                print_response(&resp);
            }
        }
        Commands::History { project, limit } => {
            let store = SqliteStore::open(&cfg).await?;
            require_project(&store, project).await?;
            let limit = limit.clamp(1, project_context::pipeline::MAX_HISTORY_LIMIT);
            for msg in store.list_chat_messages(project, limit).await? {
                print_message(&msg);
            }
        }
        Commands::Note {
            project,
            kind,
            text,
        } => {
            let store: Arc<dyn Store> = Arc::new(SqliteStore::open(&cfg).await?);
            let engine = ContextEngine::new(store, Arc::new(DisabledEmbedder), cfg.retrieval.top_k);
            match engine.append_context(project, &kind, &text).await? {
                Some(entry) => println!("Added {} #{}", entry.kind, entry.seq),
                None => bail!("Nothing recorded (unknown project or kind '{}')", kind),
            }
        }
        Commands::Drift { project, file } => {
            let answer = read_file(&file)?;
            let store: Arc<dyn Store> = Arc::new(SqliteStore::open(&cfg).await?);
            require_project(store.as_ref(), project).await?;

            let llm = if cfg.drift.semantic {
                match build_llm(&cfg) {
                    Ok(llm) => Some(llm),
                    Err(e) => {
                        warn!(error = %e, "semantic drift layer unavailable, using rules only");
                        None
                    }
                }
            } else {
                None
            };
            let detector = DriftDetector::new(store, llm)?;
            let warnings = detector.check(project, &answer).await;
            if warnings.is_empty() {
                println!("No drift detected.");
            } else {
                println!("{}", serde_json::to_string_pretty(&warnings)?);
            }
        }
        Commands::Analyze { target } => run_analyze(&cfg, target).await?,
        Commands::Route { .. } => {}
    }

    Ok(())
}
