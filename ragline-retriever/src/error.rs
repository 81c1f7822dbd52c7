//! Error taxonomy of the retrieval engine boundary.

use crate::retrieval::vector_index::DimensionMismatch;
use ragline_embed::EmbedError;
use ragline_store::StoreError;

/// Result type for retrieval operations.
pub type Result<T> = std::result::Result<T, RetrievalError>;

/// Operation-level failures surfaced by the retrieval engine.
///
/// None of these are fatal to the engine: embedding and store failures abort
/// only the operation that hit them, and `EngineBusy` is retryable. The
/// query path never surfaces these at all — it degrades to empty results.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    /// The embedder rejected the input or the model is unavailable
    #[error("embedding failed: {source}")]
    Embedding {
        #[from]
        source: EmbedError,
    },

    /// The durable store could not be read or written
    #[error(transparent)]
    Store {
        #[from]
        source: StoreError,
    },

    /// A vector did not match the index dimension
    #[error(transparent)]
    Index {
        #[from]
        source: DimensionMismatch,
    },

    /// A structural operation (add or rebuild) is already in progress
    #[error("a structural operation is already in progress, retry later")]
    EngineBusy,
}

impl RetrievalError {
    /// Whether the operation can simply be retried by the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::EngineBusy)
    }
}
