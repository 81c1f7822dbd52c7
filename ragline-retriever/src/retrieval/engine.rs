//! Retrieval engine orchestrating the embedder, vector index, and store.
//!
//! The engine owns the in-memory [`VectorIndex`] and the position→document-id
//! mapping built in lockstep with it. The mapping is never persisted: it is
//! rebuilt from the durable store on process start and on explicit rebuild.
//!
//! ## Pipeline Flow
//!
//! ```text
//! build/add:  DocumentStore → Embedder → VectorIndex
//! query:      Embedder → VectorIndex → DocumentStore
//! ```
//!
//! ## Concurrency discipline
//!
//! Engine internals live behind a `tokio::sync::RwLock`. Queries take the
//! read lock only to search the in-memory index (pure CPU, no I/O under the
//! lock); embedding happens before, and document resolution after, the lock
//! is held. Structural operations (`add_document`, `rebuild`) are serialized
//! by a separate mutex gate acquired with `try_lock`, so a second structural
//! call observes [`RetrievalError::EngineBusy`] instead of blocking or
//! racing. `rebuild` constructs its replacement index off-lock and publishes
//! it with a single write-locked swap: an in-flight query sees either the
//! old index or the new one, never a mix.

use std::sync::Arc;

use ragline_embed::Embedder;
use ragline_store::{Document, DocumentStore};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::vector_index::VectorIndex;
use crate::error::{Result, RetrievalError};

/// Configuration for the retrieval engine.
///
/// The similarity threshold and top-k defaults are tunable parameters, not
/// derived constants; validate them empirically per embedding model.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// Identifier of the embedding model; persisted records under another
    /// model id are excluded from index loads
    pub model_id: String,
    /// Fixed length of all indexed vectors
    pub dimension: usize,
    /// Default number of candidates returned per query
    pub top_k: usize,
    /// Default minimum cosine similarity for a result to qualify
    pub similarity_threshold: f32,
}

impl RetrievalConfig {
    /// Defaults matching the default query budget: top 3 results at a 0.7
    /// similarity floor.
    pub fn new(model_id: impl Into<String>, dimension: usize) -> Self {
        Self {
            model_id: model_id.into(),
            dimension,
            top_k: 3,
            similarity_threshold: 0.7,
        }
    }

    /// Derive model id and dimension from an embedder.
    pub fn for_embedder(embedder: &dyn Embedder) -> Self {
        Self::new(embedder.model_id().to_string(), embedder.dimension())
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold;
        self
    }
}

/// Engine lifecycle state.
///
/// `Degraded` means the durable store was unreachable at the last load:
/// the engine answers queries with empty results instead of failing the
/// caller, and a later successful [`RetrievalEngine::rebuild`] returns it
/// to `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EngineState {
    Uninitialized,
    Ready,
    Rebuilding,
    Degraded,
}

/// A single query hit: the resolved document plus its similarity score.
///
/// Ephemeral and query-scoped; `title` and `content` are duplicated out of
/// the document so context assembly does not reach back into it.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedResult {
    pub document: Document,
    /// Cosine similarity in [-1, 1]; in practice at least the threshold
    pub similarity_score: f32,
    pub title: String,
    pub content: String,
}

/// Separator between context blocks handed to the generation component.
const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Separator between title and content in the canonical embedded text.
const EMBED_TEXT_SEPARATOR: &str = "\n\n";

struct EngineInner {
    index: VectorIndex,
    /// Position → document id, built in lockstep with index insertion.
    /// Append-only; stale positions are only compacted by a rebuild.
    doc_ids: Vec<i64>,
    state: EngineState,
}

/// Orchestrates embedding, vector search, and document resolution.
///
/// The engine is an explicit ownership boundary around the shared index
/// rather than a module-level singleton, so multiple instances (one per
/// test, say) can coexist. Clone-free sharing is done by wrapping the
/// engine itself in an `Arc`.
pub struct RetrievalEngine {
    store: DocumentStore,
    embedder: Arc<dyn Embedder>,
    config: RetrievalConfig,
    inner: RwLock<EngineInner>,
    /// Serializes structural operations; never held across store or
    /// embedder I/O on the add path's hot section
    structural_gate: Mutex<()>,
}

impl std::fmt::Debug for RetrievalEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalEngine")
            .field("config", &self.config)
            .finish()
    }
}

impl RetrievalEngine {
    /// Create an engine in the `Uninitialized` state.
    ///
    /// Call [`initialize`](Self::initialize) before serving queries; an
    /// uninitialized engine answers every query with an empty result.
    pub fn new(store: DocumentStore, embedder: Arc<dyn Embedder>, config: RetrievalConfig) -> Self {
        let inner = EngineInner {
            index: VectorIndex::new(config.dimension),
            doc_ids: Vec::new(),
            state: EngineState::Uninitialized,
        };
        Self {
            store,
            embedder,
            config,
            inner: RwLock::new(inner),
            structural_gate: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Current lifecycle state; the diagnostic flag for degraded operation.
    pub async fn state(&self) -> EngineState {
        self.inner.read().await.state
    }

    /// Current vector count of the live index.
    pub async fn index_size(&self) -> usize {
        self.inner.read().await.index.len()
    }

    /// Load all eligible embedding records from the store into a fresh index.
    ///
    /// Records are visited in ascending document id order so position
    /// assignment is reproducible; records written by a different model or
    /// with a mismatched dimension are skipped, not coerced. On store
    /// failure the engine enters `Degraded` (empty index, empty query
    /// answers) instead of crashing the host process.
    pub async fn initialize(&self) -> Result<()> {
        let _gate = self
            .structural_gate
            .try_lock()
            .map_err(|_| RetrievalError::EngineBusy)?;
        self.reload().await
    }

    /// Discard the in-memory index and mapping and reload from the store.
    ///
    /// Used to compact stale positions after deactivations or updates and to
    /// recover from embedding-model changes or a `Degraded` state. Safe to
    /// call while queries are in flight: readers keep seeing the old index
    /// until the replacement is published in one swap. A concurrent
    /// structural call gets [`RetrievalError::EngineBusy`] and may retry.
    pub async fn rebuild(&self) -> Result<()> {
        let _gate = self
            .structural_gate
            .try_lock()
            .map_err(|_| RetrievalError::EngineBusy)?;
        self.reload().await
    }

    async fn reload(&self) -> Result<()> {
        {
            let mut inner = self.inner.write().await;
            // From Uninitialized there is no old index worth serving, so the
            // lifecycle transition is deferred to publication below
            if inner.state != EngineState::Uninitialized {
                inner.state = EngineState::Rebuilding;
            }
        }

        // Scratch build: no engine lock held while talking to the store
        let records = match self.store.get_embedding_records(&self.config.model_id).await {
            Ok(records) => records,
            Err(e) => {
                warn!("store unreachable during index load, entering degraded mode: {e}");
                let mut inner = self.inner.write().await;
                inner.index = VectorIndex::new(self.config.dimension);
                inner.doc_ids.clear();
                inner.state = EngineState::Degraded;
                return Err(e.into());
            }
        };

        let mut index = VectorIndex::new(self.config.dimension);
        let mut doc_ids = Vec::with_capacity(records.len());
        for record in &records {
            if record.dimension != self.config.dimension {
                warn!(
                    document_id = record.document_id,
                    record_dimension = record.dimension,
                    expected = self.config.dimension,
                    "skipping embedding record with mismatched dimension"
                );
                continue;
            }
            match index.add(&record.vector_f32()) {
                Ok(position) => {
                    debug_assert_eq!(position, doc_ids.len());
                    doc_ids.push(record.document_id);
                }
                Err(e) => {
                    warn!(
                        document_id = record.document_id,
                        "skipping corrupt embedding record: {e}"
                    );
                }
            }
        }

        // Publish atomically: readers see the old index or this one, never a mix
        let size = index.len();
        let mut inner = self.inner.write().await;
        inner.index = index;
        inner.doc_ids = doc_ids;
        inner.state = EngineState::Ready;
        drop(inner);

        info!(size, model_id = %self.config.model_id, "vector index loaded");
        Ok(())
    }

    /// Embed a document and make it retrievable.
    ///
    /// The durable embedding record is written before the in-memory index is
    /// touched: the index is append-only and cannot roll back, so if the
    /// append fails after a successful persist the document is still
    /// recoverable by a later [`rebuild`](Self::rebuild). The reverse order
    /// could leave an index vector with no durable record behind it.
    pub async fn add_document(&self, document: &Document) -> Result<()> {
        let text = canonical_embed_text(document);
        let vector = self.embedder.embed(&text).await?;
        if vector.len() != self.config.dimension {
            return Err(ragline_embed::EmbedError::invalid_config(format!(
                "embedder produced dimension {}, engine is configured for {}",
                vector.len(),
                self.config.dimension
            ))
            .into());
        }

        // Durable record first
        self.store
            .upsert_embedding_record(document.id, &self.config.model_id, &vector)
            .await?;

        // If a rebuild is in flight it reads the store and will pick the
        // record up itself; rejecting here is retryable and loses nothing
        let _gate = self
            .structural_gate
            .try_lock()
            .map_err(|_| RetrievalError::EngineBusy)?;

        let mut inner = self.inner.write().await;
        let position = inner.index.add(&vector)?;
        debug_assert_eq!(position, inner.doc_ids.len());
        inner.doc_ids.push(document.id);
        drop(inner);

        debug!(
            document_id = document.id,
            position, "document added to vector index"
        );
        Ok(())
    }

    /// Retrieve the most relevant active documents for a query.
    ///
    /// Results come back in descending score order, capped at `top_k` and
    /// filtered to scores at or above `threshold` (engine defaults apply
    /// when `None`). Stale index positions — documents deactivated or gone
    /// since the last rebuild — are silently dropped. Retrieval is an
    /// enhancement, not a correctness-critical path: every internal failure
    /// degrades to an empty result instead of reaching the caller.
    pub async fn query(
        &self,
        text: &str,
        top_k: Option<usize>,
        threshold: Option<f32>,
    ) -> Vec<RetrievedResult> {
        let top_k = top_k.unwrap_or(self.config.top_k);
        let threshold = threshold.unwrap_or(self.config.similarity_threshold);

        let query_vector = match self.embedder.embed(text).await {
            Ok(vector) => vector,
            Err(e) => {
                warn!("query embedding failed, returning no results: {e}");
                return Vec::new();
            }
        };

        let hits: Vec<(i64, f32)> = {
            let inner = self.inner.read().await;
            match inner.state {
                EngineState::Uninitialized | EngineState::Degraded => {
                    warn!(state = ?inner.state, "query served without a usable index");
                    return Vec::new();
                }
                // Rebuilding still serves the old index until the swap
                EngineState::Ready | EngineState::Rebuilding => {}
            }
            inner
                .index
                .search(&query_vector, top_k)
                .into_iter()
                .filter(|(_, score)| *score >= threshold)
                .map(|(position, score)| (inner.doc_ids[position], score))
                .collect()
        };

        // Resolve documents outside the lock; hits are already score-ordered
        let mut results = Vec::with_capacity(hits.len());
        for (document_id, similarity_score) in hits {
            match self.store.get_document_if_active(document_id).await {
                Ok(Some(document)) => results.push(RetrievedResult {
                    title: document.title.clone(),
                    content: document.content.clone(),
                    similarity_score,
                    document,
                }),
                Ok(None) => {
                    debug!(document_id, "dropping stale index position");
                }
                Err(e) => {
                    warn!(document_id, "document resolution failed, dropping hit: {e}");
                }
            }
        }
        results
    }

    /// Assemble retrieved documents into a generation-ready context block.
    ///
    /// The exact format — `"Document: <title>\nContent: <content>"` blocks
    /// joined by `"\n\n---\n\n"` — is a contract consumed by the generation
    /// component. Returns the empty string when nothing qualifies.
    pub async fn generate_context(&self, text: &str) -> String {
        let results = self.query(text, None, None).await;
        if results.is_empty() {
            return String::new();
        }

        results
            .iter()
            .map(|r| format!("Document: {}\nContent: {}", r.title, r.content))
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR)
    }
}

/// The canonical text a document is embedded over: title and content joined
/// by a fixed separator, matching the query-side expectation that titles
/// carry retrieval signal.
fn canonical_embed_text(document: &Document) -> String {
    format!(
        "{}{}{}",
        document.title, EMBED_TEXT_SEPARATOR, document.content
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ragline_embed::{EmbedError, HashEmbedder};
    use ragline_store::NewDocument;

    /// Embedder that always fails, simulating a model outage.
    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed(&self, _text: &str) -> ragline_embed::Result<Vec<f32>> {
            Err(EmbedError::invalid_config("model unavailable"))
        }

        fn dimension(&self) -> usize {
            4
        }

        fn model_id(&self) -> &str {
            "failing"
        }
    }

    async fn engine_with_hash_embedder() -> anyhow::Result<(RetrievalEngine, DocumentStore)> {
        let store = DocumentStore::open_memory().await?;
        let embedder = Arc::new(HashEmbedder::new(128));
        let config = RetrievalConfig::for_embedder(embedder.as_ref());
        let engine = RetrievalEngine::new(store.clone(), embedder, config);
        engine.initialize().await?;
        Ok((engine, store))
    }

    #[tokio::test]
    async fn test_lifecycle_reaches_ready() -> anyhow::Result<()> {
        let store = DocumentStore::open_memory().await?;
        let embedder = Arc::new(HashEmbedder::new(32));
        let config = RetrievalConfig::for_embedder(embedder.as_ref());
        let engine = RetrievalEngine::new(store, embedder, config);

        assert_eq!(engine.state().await, EngineState::Uninitialized);
        engine.initialize().await?;
        assert_eq!(engine.state().await, EngineState::Ready);
        assert_eq!(engine.index_size().await, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_query_on_empty_index_is_empty_not_error() -> anyhow::Result<()> {
        let (engine, _store) = engine_with_hash_embedder().await?;
        assert!(engine.query("anything at all", None, None).await.is_empty());
        assert_eq!(engine.generate_context("anything at all").await, "");
        Ok(())
    }

    #[tokio::test]
    async fn test_add_then_query_returns_document() -> anyhow::Result<()> {
        let (engine, store) = engine_with_hash_embedder().await?;

        let doc = store
            .insert_document(&NewDocument::new(
                "Getting Started Guide",
                "Verify your email address, then log in to get your tokens.",
            ))
            .await?;
        engine.add_document(&doc).await?;
        assert_eq!(engine.index_size().await, 1);

        // Re-issue the exact canonical text: similarity 1.0 beats any threshold
        let results = engine
            .query(
                "Getting Started Guide\n\nVerify your email address, then log in to get your tokens.",
                None,
                None,
            )
            .await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document.id, doc.id);
        assert!((results[0].similarity_score - 1.0).abs() < 1e-4);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_embedding_leaves_no_partial_state() -> anyhow::Result<()> {
        let store = DocumentStore::open_memory().await?;
        let embedder = Arc::new(FailingEmbedder);
        let config = RetrievalConfig::for_embedder(embedder.as_ref());
        let engine = RetrievalEngine::new(store.clone(), embedder, config);
        engine.initialize().await?;

        let doc = store
            .insert_document(&NewDocument::new("doc", "content"))
            .await?;
        let err = engine.add_document(&doc).await.unwrap_err();
        assert!(matches!(err, RetrievalError::Embedding { .. }));

        assert_eq!(engine.index_size().await, 0);
        assert_eq!(store.embedding_count("failing").await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_deactivated_document_excluded_until_rebuild() -> anyhow::Result<()> {
        let (engine, store) = engine_with_hash_embedder().await?;

        let doc = store
            .insert_document(&NewDocument::new("tombstone me", "soft deleted content"))
            .await?;
        engine.add_document(&doc).await?;
        store.deactivate_document(doc.id).await?;

        // Vector still in the index, but the stale position is dropped
        assert_eq!(engine.index_size().await, 1);
        let results = engine
            .query("tombstone me\n\nsoft deleted content", None, None)
            .await;
        assert!(results.is_empty());

        // Rebuild compacts the tombstoned vector away
        engine.rebuild().await?;
        assert_eq!(engine.index_size().await, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_rebuild_is_idempotent() -> anyhow::Result<()> {
        let (engine, store) = engine_with_hash_embedder().await?;

        for (title, content) in [("a", "alpha text"), ("b", "beta text"), ("c", "gamma text")] {
            let doc = store.insert_document(&NewDocument::new(title, content)).await?;
            engine.add_document(&doc).await?;
        }

        engine.rebuild().await?;
        let size_first = engine.index_size().await;
        engine.rebuild().await?;
        assert_eq!(engine.index_size().await, size_first);
        assert_eq!(size_first, 3);
        assert_eq!(engine.state().await, EngineState::Ready);
        Ok(())
    }

    #[tokio::test]
    async fn test_records_from_other_models_excluded() -> anyhow::Result<()> {
        let (engine, store) = engine_with_hash_embedder().await?;

        let doc = store
            .insert_document(&NewDocument::new("foreign", "embedded elsewhere"))
            .await?;
        store
            .upsert_embedding_record(doc.id, "some-other-model", &vec![0.5f32; 128])
            .await?;

        engine.rebuild().await?;
        assert_eq!(engine.index_size().await, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_records_with_wrong_dimension_excluded() -> anyhow::Result<()> {
        let (engine, store) = engine_with_hash_embedder().await?;

        let doc = store
            .insert_document(&NewDocument::new("short", "vector from another dimension"))
            .await?;
        // Same model id as the engine, but a 64-length vector against a
        // 128-dim index: must be skipped, not coerced
        store
            .upsert_embedding_record(doc.id, engine.config().model_id.as_str(), &[0.5f32; 64])
            .await?;

        engine.rebuild().await?;
        assert_eq!(engine.index_size().await, 0);
        assert_eq!(engine.state().await, EngineState::Ready);
        Ok(())
    }

    #[tokio::test]
    async fn test_updated_document_reembedded_after_rebuild() -> anyhow::Result<()> {
        let (engine, store) = engine_with_hash_embedder().await?;

        let doc = store
            .insert_document(&NewDocument::new("release notes", "initial draft wording"))
            .await?;
        engine.add_document(&doc).await?;

        // Edit-then-re-embed flow: rewrite the document, embed the new
        // content, and compact the stale position away
        assert!(
            store
                .update_document(doc.id, "release notes", "final published wording")
                .await?
        );
        let updated = store.get_document_if_active(doc.id).await?.unwrap();
        engine.add_document(&updated).await?;
        engine.rebuild().await?;

        assert_eq!(engine.index_size().await, 1);
        let results = engine
            .query("release notes\n\nfinal published wording", None, None)
            .await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content, "final published wording");
        assert!((results[0].similarity_score - 1.0).abs() < 1e-3);
        Ok(())
    }

    #[tokio::test]
    async fn test_structural_gate_reports_busy() -> anyhow::Result<()> {
        let (engine, store) = engine_with_hash_embedder().await?;
        let doc = store
            .insert_document(&NewDocument::new("doc", "content"))
            .await?;

        let gate = engine.structural_gate.try_lock().unwrap();
        let err = engine.add_document(&doc).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(err, RetrievalError::EngineBusy));
        let err = engine.rebuild().await.unwrap_err();
        assert!(matches!(err, RetrievalError::EngineBusy));
        drop(gate);

        // The record was persisted before the gate, so a rebuild recovers it
        engine.rebuild().await?;
        assert_eq!(engine.index_size().await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_generate_context_format() -> anyhow::Result<()> {
        let (engine, store) = engine_with_hash_embedder().await?;
        let doc = store
            .insert_document(&NewDocument::new("Title A", "Body A"))
            .await?;
        engine.add_document(&doc).await?;

        let context = engine.generate_context("Title A\n\nBody A").await;
        assert_eq!(context, "Document: Title A\nContent: Body A");

        // Nothing above threshold: empty string exactly
        let context = engine
            .generate_context("completely unrelated query about nothing")
            .await;
        assert_eq!(context, "");
        Ok(())
    }
}
