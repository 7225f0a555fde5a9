//! # Project Context Core
//!
//! Storage-agnostic building blocks for Project Context: the project memory
//! data model, the [`store::Store`] collaborator trait with an in-memory
//! implementation, paragraph chunking, vector math and the ordered
//! similarity search used by retrieval.
//!
//! This crate performs no network or filesystem I/O. Embedding clients,
//! LLM providers and the SQLite store live in the `project-context` app
//! crate.

pub mod chunk;
pub mod embedding;
pub mod models;
pub mod search;
pub mod store;
