//! # ragline-store
//!
//! Durable storage boundary for the ragline retrieval system: SQLite-backed
//! persistence of corpus documents and their per-document embedding records.
//!
//! The store is deliberately dumb — CRUD plus two invariant-bearing reads:
//!
//! - [`DocumentStore::get_active_documents`] and
//!   [`DocumentStore::get_embedding_records`] return rows in ascending id
//!   order, giving the retrieval engine the deterministic load order it
//!   needs for reproducible index position assignment.
//! - [`DocumentStore::get_embedding_records`] filters by embedding model and
//!   document activity in SQL, so records from a different model never reach
//!   the index.
//!
//! Documents are tombstoned (`is_active = FALSE`) rather than deleted, since
//! the in-memory vector index is append-only and physical removal is
//! deferred to the next rebuild.

pub mod document_store;
pub mod error;

pub use document_store::{Document, DocumentStore, EmbeddingRecord, NewDocument};
pub use error::{Result, StoreError};
