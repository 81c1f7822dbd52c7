//! SQLite-backed document and embedding persistence.
//!
//! This module is the durable half of the retrieval system: it owns the
//! corpus documents and, per document, the persisted embedding vector used
//! to rebuild the in-memory index on process start.
//!
//! ## Database Schema
//!
//! ```sql
//! -- Documents table: the corpus, soft-deleted via is_active
//! CREATE TABLE documents (
//!     id INTEGER PRIMARY KEY AUTOINCREMENT,
//!     title TEXT NOT NULL,
//!     content TEXT NOT NULL,
//!     doc_type TEXT NOT NULL DEFAULT 'text',
//!     is_active BOOLEAN NOT NULL DEFAULT TRUE,
//!     created_at INTEGER,                -- unix timestamp
//!     updated_at INTEGER
//! );
//!
//! -- Embeddings table: one record per document (1:1)
//! CREATE TABLE embeddings (
//!     document_id INTEGER PRIMARY KEY REFERENCES documents(id),
//!     embedding_model TEXT NOT NULL,     -- model id the vector came from
//!     dimension INTEGER NOT NULL,
//!     vector BLOB NOT NULL,              -- f16 little-endian
//!     created_at INTEGER
//! );
//! ```
//!
//! Vectors are persisted as f16 blobs to halve storage; callers widen them
//! back to f32 with [`EmbeddingRecord::vector_f32`] before indexing.
//!
//! ## SQLite configuration
//!
//! WAL journal for read/write concurrency, a busy timeout, and foreign keys
//! enforced so an embedding row can never outlive its document.

use crate::error::{Result, StoreError};
use half::f16;
use serde::Serialize;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Row, SqlitePool};
use std::path::Path;

/// A corpus document as stored in the `documents` table.
///
/// Documents are created on ingestion and deactivated (soft-deleted) rather
/// than hard-deleted; content is treated as immutable once embedded unless
/// the document is explicitly re-embedded.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub doc_type: String,
    pub is_active: bool,
    /// Unix timestamp of row creation
    pub created_at: i64,
    /// Unix timestamp of the last update
    pub updated_at: i64,
}

/// Fields required to ingest a new document.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub title: String,
    pub content: String,
    pub doc_type: String,
}

impl NewDocument {
    /// Create a new document payload with the default `"text"` type.
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            doc_type: "text".to_string(),
        }
    }

    pub fn with_doc_type(mut self, doc_type: impl Into<String>) -> Self {
        self.doc_type = doc_type.into();
        self
    }
}

/// Persisted embedding vector for a single document.
///
/// `embedding_model` records which model produced the vector; records from a
/// model other than the one currently configured must be excluded from index
/// loads, not coerced.
#[derive(Debug, Clone)]
pub struct EmbeddingRecord {
    pub document_id: i64,
    pub embedding_model: String,
    pub dimension: usize,
    pub vector: Vec<f16>,
    pub created_at: i64,
}

impl EmbeddingRecord {
    /// Widen the persisted f16 vector back to f32 for indexing.
    pub fn vector_f32(&self) -> Vec<f32> {
        self.vector.iter().map(|v| f32::from(*v)).collect()
    }
}

/// SQLite-backed store for documents and their embedding records.
///
/// All operations are async and map failures to [`StoreError`]: read paths
/// to `Unavailable`, write paths to `WriteFailed`. The store is the sole
/// cross-process synchronization point of the retrieval system and is
/// authoritative on restart.
#[derive(Clone, Debug)]
pub struct DocumentStore {
    pool: SqlitePool,
}

impl DocumentStore {
    /// Opens the store with persistent SQLite storage at the given path.
    pub async fn open(db_path: &Path) -> Result<Self> {
        let pool = SqlitePool::connect_with(
            SqliteConnectOptions::new()
                .filename(db_path)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .busy_timeout(std::time::Duration::from_secs(5))
                .foreign_keys(true)
                .create_if_missing(true),
        )
        .await
        .map_err(StoreError::unavailable)?;
        Self::new_with_pool(pool).await
    }

    /// Opens the store with in-memory SQLite storage for testing.
    pub async fn open_memory() -> Result<Self> {
        let pool = SqlitePool::connect("sqlite::memory:")
            .await
            .map_err(StoreError::unavailable)?;
        Self::new_with_pool(pool).await
    }

    async fn new_with_pool(pool: SqlitePool) -> Result<Self> {
        Self::create_tables(&pool).await?;
        Ok(Self { pool })
    }

    async fn create_tables(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                doc_type TEXT NOT NULL DEFAULT 'text',
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await
        .map_err(StoreError::write_failed)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS embeddings (
                document_id INTEGER PRIMARY KEY,
                embedding_model TEXT NOT NULL,
                dimension INTEGER NOT NULL,
                vector BLOB NOT NULL,
                created_at INTEGER NOT NULL,
                FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(pool)
        .await
        .map_err(StoreError::write_failed)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_embeddings_model ON embeddings(embedding_model)",
        )
        .execute(pool)
        .await
        .map_err(StoreError::write_failed)?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_active ON documents(is_active)")
            .execute(pool)
            .await
            .map_err(StoreError::write_failed)?;

        Ok(())
    }

    /// Insert a document and return it with its assigned id.
    pub async fn insert_document(&self, new: &NewDocument) -> Result<Document> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query(
            r#"
            INSERT INTO documents (title, content, doc_type, is_active, created_at, updated_at)
            VALUES (?1, ?2, ?3, TRUE, ?4, ?4)
            "#,
        )
        .bind(&new.title)
        .bind(&new.content)
        .bind(&new.doc_type)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(StoreError::write_failed)?;

        Ok(Document {
            id: result.last_insert_rowid(),
            title: new.title.clone(),
            content: new.content.clone(),
            doc_type: new.doc_type.clone(),
            is_active: true,
            created_at: now,
            updated_at: now,
        })
    }

    /// Update a document's title and content, bumping `updated_at`.
    ///
    /// The caller is responsible for re-embedding afterwards; the stale
    /// embedding record (and any live index position) is only reconciled by
    /// an explicit re-add or rebuild.
    pub async fn update_document(&self, id: i64, title: &str, content: &str) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query(
            "UPDATE documents SET title = ?1, content = ?2, updated_at = ?3 WHERE id = ?4",
        )
        .bind(title)
        .bind(content)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(StoreError::write_failed)?;
        Ok(result.rows_affected() > 0)
    }

    /// Tombstone a document. Returns false if no such document exists.
    ///
    /// The document's vector stays in any live in-memory index until the
    /// next rebuild; queries filter it out by checking `is_active`.
    pub async fn deactivate_document(&self, id: i64) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();
        let result =
            sqlx::query("UPDATE documents SET is_active = FALSE, updated_at = ?1 WHERE id = ?2")
                .bind(now)
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(StoreError::write_failed)?;
        Ok(result.rows_affected() > 0)
    }

    /// Fetch a document only if it exists and is active.
    pub async fn get_document_if_active(&self, id: i64) -> Result<Option<Document>> {
        let row = sqlx::query(
            "SELECT id, title, content, doc_type, is_active, created_at, updated_at
             FROM documents WHERE id = ?1 AND is_active = TRUE",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::unavailable)?;

        Ok(row.map(Self::row_to_document))
    }

    /// All active documents in ascending id order.
    pub async fn get_active_documents(&self) -> Result<Vec<Document>> {
        let rows = sqlx::query(
            "SELECT id, title, content, doc_type, is_active, created_at, updated_at
             FROM documents WHERE is_active = TRUE ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::unavailable)?;

        Ok(rows.into_iter().map(Self::row_to_document).collect())
    }

    /// Find an active document by exact title.
    pub async fn find_document_by_title(&self, title: &str) -> Result<Option<Document>> {
        let row = sqlx::query(
            "SELECT id, title, content, doc_type, is_active, created_at, updated_at
             FROM documents WHERE title = ?1 AND is_active = TRUE LIMIT 1",
        )
        .bind(title)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::unavailable)?;

        Ok(row.map(Self::row_to_document))
    }

    /// Upsert the embedding record for a document.
    ///
    /// Keyed by document id: an existing record for the same document is
    /// overwritten, never duplicated, including when the model changed.
    pub async fn upsert_embedding_record(
        &self,
        document_id: i64,
        model_id: &str,
        vector: &[f32],
    ) -> Result<()> {
        let narrowed: Vec<f16> = vector.iter().map(|v| f16::from_f32(*v)).collect();
        let vector_bytes: &[u8] = bytemuck::cast_slice(&narrowed);
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO embeddings (document_id, embedding_model, dimension, vector, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(document_id) DO UPDATE SET
                embedding_model = excluded.embedding_model,
                dimension = excluded.dimension,
                vector = excluded.vector,
                created_at = excluded.created_at
            "#,
        )
        .bind(document_id)
        .bind(model_id)
        .bind(vector.len() as i64)
        .bind(vector_bytes)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(StoreError::write_failed)?;

        Ok(())
    }

    /// Embedding records for active documents written by the given model,
    /// in ascending document id order.
    ///
    /// The deterministic order matters: index positions are assigned in load
    /// order, so two loads of the same corpus must visit records identically.
    pub async fn get_embedding_records(&self, model_id: &str) -> Result<Vec<EmbeddingRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT e.document_id, e.embedding_model, e.dimension, e.vector, e.created_at
            FROM embeddings e
            JOIN documents d ON d.id = e.document_id
            WHERE e.embedding_model = ?1 AND d.is_active = TRUE
            ORDER BY e.document_id ASC
            "#,
        )
        .bind(model_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::unavailable)?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let vector_bytes: Vec<u8> = row.get("vector");
            let vector = bytemuck::cast_slice::<u8, f16>(&vector_bytes).to_vec();

            records.push(EmbeddingRecord {
                document_id: row.get("document_id"),
                embedding_model: row.get("embedding_model"),
                dimension: row.get::<i64, _>("dimension") as usize,
                vector,
                created_at: row.get("created_at"),
            });
        }
        Ok(records)
    }

    /// Number of active documents.
    pub async fn document_count(&self) -> Result<usize> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE is_active = TRUE")
                .fetch_one(&self.pool)
                .await
                .map_err(StoreError::unavailable)?;
        Ok(count as usize)
    }

    /// Number of embedding records persisted by the given model.
    pub async fn embedding_count(&self, model_id: &str) -> Result<usize> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM embeddings WHERE embedding_model = ?1")
                .bind(model_id)
                .fetch_one(&self.pool)
                .await
                .map_err(StoreError::unavailable)?;
        Ok(count as usize)
    }

    /// Get the underlying SQLite connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn row_to_document(row: sqlx::sqlite::SqliteRow) -> Document {
        Document {
            id: row.get("id"),
            title: row.get("title"),
            content: row.get("content"),
            doc_type: row.get("doc_type"),
            is_active: row.get("is_active"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[tokio::test]
    async fn test_document_roundtrip() -> Result<()> {
        let store = DocumentStore::open_memory().await?;

        let doc = store
            .insert_document(&NewDocument::new("Getting Started Guide", "1. Sign up"))
            .await?;
        assert!(doc.id > 0);
        assert!(doc.is_active);
        assert_eq!(doc.doc_type, "text");

        let fetched = store.get_document_if_active(doc.id).await?;
        assert_eq!(fetched.unwrap().title, "Getting Started Guide");

        Ok(())
    }

    #[tokio::test]
    async fn test_update_document_rewrites_fields() -> Result<()> {
        let store = DocumentStore::open_memory().await?;
        let doc = store
            .insert_document(&NewDocument::new("old title", "old content"))
            .await?;

        assert!(store.update_document(doc.id, "new title", "new content").await?);
        assert!(!store.update_document(doc.id + 100, "x", "y").await?);

        let fetched = store.get_document_if_active(doc.id).await?.unwrap();
        assert_eq!(fetched.title, "new title");
        assert_eq!(fetched.content, "new content");
        assert!(fetched.updated_at >= fetched.created_at);

        Ok(())
    }

    #[tokio::test]
    async fn test_deactivate_hides_document() -> Result<()> {
        let store = DocumentStore::open_memory().await?;
        let doc = store
            .insert_document(&NewDocument::new("FAQ", "Q and A"))
            .await?;

        assert!(store.deactivate_document(doc.id).await?);
        assert!(store.get_document_if_active(doc.id).await?.is_none());
        assert!(store.get_active_documents().await?.is_empty());

        // Deactivating again still reports the row as touched, but stays hidden
        assert!(store.deactivate_document(doc.id).await?);
        assert!(!store.deactivate_document(doc.id + 100).await?);

        Ok(())
    }

    #[tokio::test]
    async fn test_active_documents_ordered_by_id() -> Result<()> {
        let store = DocumentStore::open_memory().await?;
        for title in ["b", "a", "c"] {
            store
                .insert_document(&NewDocument::new(title, "content"))
                .await?;
        }

        let docs = store.get_active_documents().await?;
        let ids: Vec<i64> = docs.iter().map(|d| d.id).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);

        Ok(())
    }

    #[tokio::test]
    async fn test_embedding_upsert_overwrites() -> Result<()> {
        let store = DocumentStore::open_memory().await?;
        let doc = store
            .insert_document(&NewDocument::new("doc", "content"))
            .await?;

        store
            .upsert_embedding_record(doc.id, "model-a", &[1.0, 0.0, 0.0])
            .await?;
        store
            .upsert_embedding_record(doc.id, "model-a", &[0.0, 1.0, 0.0])
            .await?;

        let records = store.get_embedding_records("model-a").await?;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].dimension, 3);
        assert_eq!(records[0].vector_f32(), vec![0.0, 1.0, 0.0]);

        Ok(())
    }

    #[tokio::test]
    async fn test_records_filtered_by_model_and_activity() -> Result<()> {
        let store = DocumentStore::open_memory().await?;
        let live = store
            .insert_document(&NewDocument::new("live", "content"))
            .await?;
        let dead = store
            .insert_document(&NewDocument::new("dead", "content"))
            .await?;
        let other = store
            .insert_document(&NewDocument::new("other-model", "content"))
            .await?;

        store
            .upsert_embedding_record(live.id, "model-a", &[1.0, 0.0])
            .await?;
        store
            .upsert_embedding_record(dead.id, "model-a", &[0.0, 1.0])
            .await?;
        store
            .upsert_embedding_record(other.id, "model-b", &[1.0, 1.0])
            .await?;
        store.deactivate_document(dead.id).await?;

        let records = store.get_embedding_records("model-a").await?;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].document_id, live.id);

        // The record itself survives deactivation, only the join hides it
        assert_eq!(store.embedding_count("model-a").await?, 2);

        Ok(())
    }

    #[tokio::test]
    async fn test_persistent_open() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let db_path = temp_dir.path().join("ragline.db");

        {
            let store = DocumentStore::open(&db_path).await?;
            store
                .insert_document(&NewDocument::new("persisted", "content"))
                .await?;
        }

        let store = DocumentStore::open(&db_path).await?;
        assert_eq!(store.document_count().await?, 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_find_by_title() -> Result<()> {
        let store = DocumentStore::open_memory().await?;
        store
            .insert_document(&NewDocument::new("AI Chatbot FAQ", "Q: what is this?"))
            .await?;

        assert!(store.find_document_by_title("AI Chatbot FAQ").await?.is_some());
        assert!(store.find_document_by_title("missing").await?.is_none());

        Ok(())
    }
}
