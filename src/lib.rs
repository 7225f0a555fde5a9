//! # Project Context
//!
//! A context-augmented query pipeline for long-running projects.
//!
//! Every chat turn is answered with the project's goal, constraints,
//! decisions, recent artifacts and the most similar embedded chunks folded
//! into the prompt. Generation goes through an ordered provider chain that
//! only fails over on transient errors, and each answer is checked for
//! drift against the project's stated constraints before it is stored.
//!
//! ## Architecture
//!
//! ```text
//!               ┌──────────────┐
//!  query ──────▶│ IntentRouter │── badge
//!               └──────────────┘
//!               ┌───────────────┐   ┌──────────┐
//!         ─────▶│ ContextEngine │──▶│ Embedder │
//!               └──────┬────────┘   └──────────┘
//!                      ▼
//!               ┌──────────────────┐   gemini / groq / ollama
//!               │ LlmOrchestrator  │──▶ failover policy table
//!               └──────┬───────────┘
//!                      ▼
//!               ┌───────────────┐
//!               │ DriftDetector │── rule layer + semantic layer
//!               └──────┬────────┘
//!                      ▼
//!               ┌───────────────┐
//!               │ Store (SQLite │
//!               │  / in-memory) │
//!               └───────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Pipeline error taxonomy |
//! | [`embedding`] | Embedding clients |
//! | [`llm`] | LLM providers and the failover orchestrator |
//! | [`prompts`] | Fixed system instructions |
//! | [`context`] | Aggregation, retrieval and prompt assembly |
//! | [`drift`] | Constraint drift detection |
//! | [`router`] | Intent routing |
//! | [`pipeline`] | One chat turn, end to end |
//! | [`ingest`] | Chunking and embedding of artifacts |
//! | [`analysis`] | LLM summaries, code insights and task extraction |
//! | [`import`] | Bulk JSON import |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |
//! | [`sqlite_store`] | SQLite implementation of the `Store` trait |

pub mod analysis;
pub mod config;
pub mod context;
pub mod db;
pub mod drift;
pub mod embedding;
pub mod error;
pub mod import;
pub mod ingest;
pub mod llm;
pub mod migrate;
pub mod pipeline;
pub mod prompts;
pub mod router;
pub mod sqlite_store;

pub use error::{Error, Result};
