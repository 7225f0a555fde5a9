//! Artifact indexing: chunk → embed → store.
//!
//! Each artifact body is split with [`chunk_text`], the chunks are embedded
//! in one batch and one [`EmbeddingRecord`] is written per chunk. Every
//! text of an artifact is embedded before anything is written; the new
//! records then replace the artifact's previous embeddings in one store
//! call. A failed re-index leaves the old chunks searchable.
//!
//! | Artifact | Text | Source type |
//! |----------|------|-------------|
//! | Document | `raw_text` | `document` |
//! | CodeInsight | `code_snippet` | `code` |
//! | CodeInsight | `explanation` | `code_insight` |
//! | Task | `description` | `task` |
//!
//! Unlike retrieval, an embedding failure here is returned to the caller.

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use project_context_core::chunk::chunk_text;
use project_context_core::models::{Artifact, EmbeddingRecord, SourceType};
use project_context_core::store::Store;

use crate::embedding::{embed_batch, Embedder};
use crate::error::Result;

/// Counters for one indexing run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub artifacts: u64,
    pub chunks: u64,
    pub replaced: u64,
}

impl IndexStats {
    fn add(&mut self, other: IndexStats) {
        self.artifacts += other.artifacts;
        self.chunks += other.chunks;
        self.replaced += other.replaced;
    }
}

pub struct Indexer {
    store: Arc<dyn Store>,
    embedder: Arc<dyn Embedder>,
    max_chars: usize,
}

impl Indexer {
    pub fn new(store: Arc<dyn Store>, embedder: Arc<dyn Embedder>, max_chars: usize) -> Self {
        Self {
            store,
            embedder,
            max_chars,
        }
    }

    /// Index every embeddable text of `artifact`.
    pub async fn index_artifact(&self, artifact: &Artifact) -> Result<IndexStats> {
        let (project_id, source_id) = match artifact {
            Artifact::Document(d) => (d.project_id, d.id),
            Artifact::CodeInsight(c) => (c.project_id, c.id),
            Artifact::Task(t) => (t.project_id, t.id),
        };

        let mut records = Vec::new();
        for (source_type, text) in embeddable_texts(artifact) {
            records.extend(
                self.embed_text(project_id, source_type, source_id, text)
                    .await?,
            );
        }

        let replaced = self
            .store
            .replace_embeddings(project_id, source_id, &records)
            .await?;
        let stats = IndexStats {
            artifacts: 1,
            chunks: records.len() as u64,
            replaced,
        };

        info!(
            %project_id,
            %source_id,
            chunks = stats.chunks,
            replaced = stats.replaced,
            "indexed artifact"
        );
        Ok(stats)
    }

    /// Index a list of artifacts, stopping at the first failure.
    pub async fn index_all(&self, artifacts: &[Artifact]) -> Result<IndexStats> {
        let mut total = IndexStats::default();
        for artifact in artifacts {
            total.add(self.index_artifact(artifact).await?);
        }
        Ok(total)
    }

    /// Chunk and embed one text without storing it.
    async fn embed_text(
        &self,
        project_id: Uuid,
        source_type: SourceType,
        source_id: Uuid,
        text: &str,
    ) -> Result<Vec<EmbeddingRecord>> {
        let chunks = chunk_text(text, self.max_chars);
        if chunks.is_empty() {
            debug!(%source_id, source_type = %source_type, "nothing to index");
            return Ok(Vec::new());
        }

        let vectors = embed_batch(self.embedder.as_ref(), &chunks).await?;
        Ok(chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| {
                EmbeddingRecord::new(project_id, source_type, source_id, chunk, vector)
            })
            .collect())
    }

    /// Remove every embedding that references `source_id`.
    pub async fn delete_artifact_embeddings(&self, project_id: Uuid, source_id: Uuid) -> Result<u64> {
        let removed = self.store.delete_embeddings(project_id, source_id).await?;
        if removed > 0 {
            debug!(%project_id, %source_id, removed, "deleted embeddings");
        }
        Ok(removed)
    }
}

fn embeddable_texts(artifact: &Artifact) -> Vec<(SourceType, &str)> {
    match artifact {
        Artifact::Document(d) => vec![(SourceType::Document, d.raw_text.as_str())],
        Artifact::CodeInsight(c) => {
            let mut texts = vec![(SourceType::Code, c.code_snippet.as_str())];
            if let Some(explanation) = c.explanation.as_deref() {
                texts.push((SourceType::CodeInsight, explanation));
            }
            texts
        }
        Artifact::Task(t) => vec![(SourceType::Task, t.description.as_str())],
    }
}
