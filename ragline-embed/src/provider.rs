//! Embedding provider implementations

use crate::error::{EmbedError, Result};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::{Arc, Mutex};

/// Model name reported by [`FastEmbedEmbedder`] when using the default model.
pub const DEFAULT_MODEL_ID: &str = "all-MiniLM-L6-v2";

/// Embedding dimension of the default model.
pub const DEFAULT_DIMENSION: usize = 384;

/// Maps text to a fixed-length dense vector.
///
/// Implementations must be deterministic for a fixed model version and safe
/// to call concurrently (read-only after load). The output length is stable
/// for the lifetime of the embedder and reported by [`dimension`](Self::dimension).
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate an embedding for a single text.
    ///
    /// Fails with [`EmbedError::EmptyInput`] when `text` is empty or
    /// whitespace-only, and with a model error when the backend is
    /// unavailable. Never panics on bad input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Length of the vectors produced by this embedder.
    fn dimension(&self) -> usize;

    /// Stable identifier of the underlying model.
    ///
    /// Persisted alongside each embedding record; records written under a
    /// different model id are not eligible for loading into the index.
    fn model_id(&self) -> &str;
}

/// FastEmbed-based embedder using local ONNX models.
///
/// The model handle is shared behind a mutex because fastembed inference
/// takes `&mut self`; inference runs on the blocking thread pool so the
/// async runtime is never stalled by ONNX execution.
#[derive(Clone)]
pub struct FastEmbedEmbedder {
    model: Arc<Mutex<TextEmbedding>>,
    model_id: String,
    dimension: usize,
}

impl std::fmt::Debug for FastEmbedEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedEmbedder")
            .field("model_id", &self.model_id)
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl FastEmbedEmbedder {
    /// Downloads (if necessary) and loads the default model.
    ///
    /// The output dimension is probed with a test embedding rather than
    /// hardcoded, so a swapped model file cannot silently change the
    /// dimension the caller observes.
    pub async fn create() -> Result<Self> {
        tracing::info!("Initializing fastembed provider for model: {DEFAULT_MODEL_ID}");

        let (model, dimension) =
            tokio::task::spawn_blocking(move || -> Result<(TextEmbedding, usize)> {
                let init_options = InitOptions::new(EmbeddingModel::AllMiniLML6V2)
                    .with_show_download_progress(true);

                let mut model =
                    TextEmbedding::try_new(init_options).map_err(EmbedError::model_init)?;

                // Probe the dimension with a test embedding
                let test_embeddings = model
                    .embed(vec!["test".to_string()], None)
                    .map_err(EmbedError::model_init)?;
                let dimension = test_embeddings
                    .first()
                    .map(|emb| emb.len())
                    .unwrap_or(DEFAULT_DIMENSION);

                tracing::info!("Model loaded successfully. Dimension: {dimension}");
                Ok((model, dimension))
            })
            .await??;

        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            model_id: DEFAULT_MODEL_ID.to_string(),
            dimension,
        })
    }
}

#[async_trait]
impl Embedder for FastEmbedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(EmbedError::EmptyInput);
        }

        let model = Arc::clone(&self.model);
        let text = text.to_string();

        let mut embeddings = tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
            let mut model_guard = model.lock().map_err(|_| {
                EmbedError::invalid_config("embedding model mutex poisoned by a prior panic")
            })?;
            model_guard
                .embed(vec![text], None)
                .map_err(EmbedError::embedding_gen)
        })
        .await??;

        let embedding = if embeddings.is_empty() {
            return Err(EmbedError::invalid_config(
                "model returned no embedding for input text",
            ));
        } else {
            embeddings.swap_remove(0)
        };

        if embedding.len() != self.dimension {
            return Err(EmbedError::invalid_config(format!(
                "expected dimension {}, got {}",
                self.dimension,
                embedding.len()
            )));
        }
        if embedding.iter().any(|v| !v.is_finite()) {
            return Err(EmbedError::invalid_config(
                "non-finite values in embedding",
            ));
        }

        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
