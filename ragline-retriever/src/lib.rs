//! ragline-retriever: similarity retrieval over a document corpus
//!
//! This crate is the core of the ragline system: it maintains an in-memory
//! vector index of document embeddings, inserts new documents incrementally,
//! and answers similarity queries with a score threshold and result cap. The
//! retrieved documents are assembled into a generation-ready context block
//! for a downstream text generator.
//!
//! ## Key Modules
//!
//! - **[`retrieval`]**: the [`VectorIndex`](retrieval::VectorIndex) and the
//!   [`RetrievalEngine`](retrieval::RetrievalEngine) orchestrating it
//! - **[`error`]**: the operation-level failure taxonomy
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ragline_embed::HashEmbedder;
//! use ragline_retriever::retrieval::{RetrievalConfig, RetrievalEngine};
//! use ragline_store::DocumentStore;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let store = DocumentStore::open_memory().await?;
//! let embedder = Arc::new(HashEmbedder::new(384));
//! let config = RetrievalConfig::for_embedder(embedder.as_ref());
//!
//! let engine = RetrievalEngine::new(store, embedder, config);
//! engine.initialize().await?;
//!
//! let context = engine.generate_context("How do I verify my email?").await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! build/add:  DocumentStore → Embedder → VectorIndex
//! query:      Embedder → VectorIndex → DocumentStore → context block
//! ```
//!
//! The index lives only in memory; the durable store is authoritative and
//! the index is rebuilt from it on process start or explicit rebuild.

pub mod error;
pub mod retrieval;

pub use error::{Result, RetrievalError};
