//! Error types for the embedding boundary

/// Result type for embedding operations.
///
/// Convenience alias using [`EmbedError`] as the error type.
pub type Result<T> = std::result::Result<T, EmbedError>;

/// Error type covering every way an embedding request can fail.
///
/// Embedding failures are always local to a single operation: callers are
/// expected to convert them into an operation-level failure rather than
/// letting them terminate the process. The retrieval engine treats all of
/// these as `EmbeddingFailure` at its boundary.
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// The input text was empty or contained only whitespace
    #[error("cannot embed empty input")]
    EmptyInput,

    /// Error when model configuration is invalid
    #[error("invalid embedder configuration: {message}")]
    InvalidConfig { message: String },

    /// Error during model initialization
    #[error("model initialization failed: {source}")]
    ModelInitialization {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Error during embedding generation
    #[error("embedding generation failed: {source}")]
    EmbeddingGeneration {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Async task join errors
    #[error("async task failed: {source}")]
    AsyncTask {
        #[from]
        source: tokio::task::JoinError,
    },
}

impl EmbedError {
    /// Wrap an error that occurred while loading or initializing a model.
    pub fn model_init<E>(source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::ModelInitialization {
            source: source.into(),
        }
    }

    /// Wrap an error that occurred during embedding generation.
    pub fn embedding_gen<E>(source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::EmbeddingGeneration {
            source: source.into(),
        }
    }

    /// Create an invalid configuration error with a custom message.
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_build_matching_variants() {
        let init = EmbedError::model_init(anyhow::anyhow!("onnx session failed"));
        assert!(matches!(init, EmbedError::ModelInitialization { .. }));
        assert!(init.to_string().contains("onnx session failed"));

        let r#gen = EmbedError::embedding_gen(anyhow::anyhow!("inference aborted"));
        assert!(matches!(r#gen, EmbedError::EmbeddingGeneration { .. }));
        assert!(r#gen.to_string().contains("inference aborted"));

        let config = EmbedError::invalid_config("bad dimension");
        assert!(matches!(config, EmbedError::InvalidConfig { .. }));
    }
}
