//! # ragline-embed
//!
//! Embedding boundary for the ragline retrieval system: maps text to
//! fixed-length dense vectors behind the [`Embedder`] trait.
//!
//! ## Providers
//!
//! - [`FastEmbedEmbedder`]: local ONNX inference via fastembed. Downloads the
//!   model on first use and probes its output dimension at load time.
//! - [`HashEmbedder`]: deterministic feature-hashing pseudo-embedder for
//!   tests and offline operation. No model files, no network.
//!
//! ## Contract
//!
//! `embed(text)` returns a vector whose length equals `dimension()` for the
//! lifetime of the embedder, deterministic for a fixed model version, and
//! safe to call concurrently. Empty or whitespace-only input fails with
//! [`EmbedError::EmptyInput`]; callers convert failures into operation-level
//! results rather than crashing.
//!
//! Vectors are returned unnormalized (except for [`HashEmbedder`], which is
//! unit-length by construction). Normalization for cosine similarity is the
//! vector index's responsibility so the metric stays consistent between
//! indexed and query vectors.

pub mod error;
pub mod hash;
pub mod provider;

pub use error::{EmbedError, Result};
pub use hash::HashEmbedder;
pub use provider::{DEFAULT_DIMENSION, DEFAULT_MODEL_ID, Embedder, FastEmbedEmbedder};
