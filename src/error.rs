//! Error types for the query pipeline.
//!
//! A chat turn can fail with [`Error::AllProvidersFailed`],
//! [`Error::Provider`] (a non-transient failure of the primary provider)
//! or [`Error::Storage`]. Retrieval, embedding for context and drift
//! checking are absorbed where they happen and logged.
//!
//! [`Error::MalformedResponse`] is only raised by JSON generation, which
//! the drift check absorbs and the artifact analysis services return.

use thiserror::Error;

use crate::llm::ProviderError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("generation unavailable: all LLM providers failed ({0})")]
    AllProvidersFailed(String),

    #[error("Malformed LLM response: {0}")]
    MalformedResponse(String),

    #[error("Drift check error: {0}")]
    DriftCheck(String),

    #[error("Storage error: {0:#}")]
    Storage(#[from] anyhow::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::Embedding(msg.into())
    }

    pub fn retrieval(msg: impl Into<String>) -> Self {
        Self::Retrieval(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedResponse(msg.into())
    }

    pub fn drift_check(msg: impl Into<String>) -> Self {
        Self::DriftCheck(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}
