//! One context-augmented chat turn, end to end.
//!
//! # Turn sequence
//!
//! ```text
//! query ──► route ──► build_prompt ──► LLM chain ──► drift check ──► persist ──► ChatResponse
//!             │            │                              │
//!          badge only   soft-fails                    soft-fails
//! ```
//!
//! Only a failure of the whole provider chain (or of the store itself)
//! aborts a turn. The question and the answer are persisted together, so
//! an aborted turn leaves no half of the exchange behind.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use project_context_core::models::{
    ChatMessage, ContextReference, DriftWarning, Role, RoutedModule,
};
use project_context_core::store::Store;

use crate::config::Config;
use crate::context::ContextEngine;
use crate::drift::DriftDetector;
use crate::embedding::Embedder;
use crate::error::Result;
use crate::llm::LlmOrchestrator;
use crate::prompts::CHAT_SYSTEM_PROMPT;
use crate::router::IntentRouter;

/// Sampling temperature for chat answers.
pub const CHAT_TEMPERATURE: f32 = 0.4;
/// Default and maximum page size for [`QueryPipeline::chat_history`].
pub const DEFAULT_HISTORY_LIMIT: usize = 50;
pub const MAX_HISTORY_LIMIT: usize = 200;

/// Result of one chat turn.
#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub answer: String,
    pub context_used: Vec<ContextReference>,
    pub drift_warnings: Vec<DriftWarning>,
    pub routed_module: RoutedModule,
    pub provider: String,
    pub latency_ms: f64,
    /// Id of the persisted assistant message.
    pub message_id: Uuid,
}

pub struct QueryPipeline {
    store: Arc<dyn Store>,
    router: IntentRouter,
    context: ContextEngine,
    llm: Arc<LlmOrchestrator>,
    drift: DriftDetector,
}

impl QueryPipeline {
    /// Wire the pipeline from shared clients.
    ///
    /// The semantic drift layer reuses `llm` unless `drift.semantic` is off.
    pub fn new(
        config: &Config,
        store: Arc<dyn Store>,
        embedder: Arc<dyn Embedder>,
        llm: Arc<LlmOrchestrator>,
    ) -> anyhow::Result<Self> {
        let drift_llm = config.drift.semantic.then(|| llm.clone());
        Ok(Self {
            router: IntentRouter::new()?,
            context: ContextEngine::new(store.clone(), embedder, config.retrieval.top_k),
            drift: DriftDetector::new(store.clone(), drift_llm)?,
            store,
            llm,
        })
    }

    pub fn context(&self) -> &ContextEngine {
        &self.context
    }

    pub fn drift(&self) -> &DriftDetector {
        &self.drift
    }

    pub fn route(&self, query: &str) -> RoutedModule {
        self.router.route(query)
    }

    /// Answer `query` in the context of `project_id` and persist both sides
    /// of the exchange.
    pub async fn query(&self, project_id: Uuid, query: &str) -> Result<ChatResponse> {
        let routed_module = self.router.route(query);
        info!(%project_id, routed_module = %routed_module, "chat query");

        let augmented = self.context.build_prompt(project_id, query).await?;

        let req = self
            .llm
            .request(augmented.prompt)
            .system(CHAT_SYSTEM_PROMPT)
            .temperature(CHAT_TEMPERATURE);
        let generation = self.llm.generate(&req).await?;

        let drift_warnings = self.drift.check(project_id, &generation.text).await;
        let latency_ms = round_tenths(generation.latency_ms);

        let mut user_msg = ChatMessage::new(project_id, Role::User, query);
        user_msg.routed_module = Some(routed_module);

        let mut assistant_msg = ChatMessage::new(project_id, Role::Assistant, generation.text.clone());
        assistant_msg.context_used = augmented.references.clone();
        assistant_msg.drift_warnings = drift_warnings.clone();
        assistant_msg.routed_module = Some(routed_module);
        assistant_msg.provider = Some(generation.provider.clone());
        assistant_msg.latency_ms = Some(latency_ms);
        let (_, saved) = self
            .store
            .save_chat_turn(&user_msg, &assistant_msg)
            .await?;

        info!(
            %project_id,
            provider = %generation.provider,
            latency_ms,
            references = augmented.references.len(),
            drift_warnings = drift_warnings.len(),
            "chat turn complete"
        );

        Ok(ChatResponse {
            answer: generation.text,
            context_used: augmented.references,
            drift_warnings,
            routed_module,
            provider: generation.provider,
            latency_ms,
            message_id: saved.id,
        })
    }

    /// The most recent `limit` messages (clamped to 1..=200), oldest first.
    pub async fn chat_history(&self, project_id: Uuid, limit: usize) -> Result<Vec<ChatMessage>> {
        let limit = limit.clamp(1, MAX_HISTORY_LIMIT);
        Ok(self.store.list_chat_messages(project_id, limit).await?)
    }
}

fn round_tenths(ms: f64) -> f64 {
    (ms * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_tenths() {
        assert_eq!(round_tenths(12.34), 12.3);
        assert_eq!(round_tenths(12.36), 12.4);
        assert_eq!(round_tenths(0.0), 0.0);
    }
}
