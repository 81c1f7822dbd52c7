//! Error types for the document store boundary

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Failures surfacing at the document store boundary.
///
/// Read-path failures map to [`Unavailable`](StoreError::Unavailable) and
/// write-path failures to [`WriteFailed`](StoreError::WriteFailed), matching
/// how the retrieval engine reacts to each: an unavailable store degrades
/// the engine, a failed write aborts only the operation that issued it.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The durable store could not be reached or read
    #[error("document store unavailable: {source}")]
    Unavailable {
        #[source]
        source: sqlx::Error,
    },

    /// A write to the durable store failed
    #[error("document store write failed: {source}")]
    WriteFailed {
        #[source]
        source: sqlx::Error,
    },
}

impl StoreError {
    pub(crate) fn unavailable(source: sqlx::Error) -> Self {
        Self::Unavailable { source }
    }

    pub(crate) fn write_failed(source: sqlx::Error) -> Self {
        Self::WriteFailed { source }
    }
}
