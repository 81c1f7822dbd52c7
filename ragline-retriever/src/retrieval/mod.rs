//! Core retrieval module: the vector index and the engine that drives it.

pub mod engine;
pub mod vector_index;

pub use engine::{EngineState, RetrievalConfig, RetrievalEngine, RetrievedResult};
pub use vector_index::{DimensionMismatch, VectorIndex};
