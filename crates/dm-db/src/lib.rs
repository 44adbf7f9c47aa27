//! # dm-db
//!
//! PostgreSQL persistence for Documents RS.
//!
//! This crate provides PostgreSQL database access using SQLx, including:
//!
//! - Connection pool management and schema migrations
//! - A [`DocumentStore`](dm_documents::DocumentStore) backed by `documents` / `files`
//!
//! ## Example
//!
//! ```ignore
//! use dm_db::{Database, PgDocumentStore, PoolConfig};
//!
//! let db = Database::connect(&PoolConfig::from(&config.database)).await?;
//! db.migrate().await?;
//!
//! let store = PgDocumentStore::new(db.pool().clone());
//! let documents = store.query(&DocumentQuery::new().for_owner("Project", 1)).await?;
//! ```

pub mod documents;
pub mod pool;
pub mod repository;

// Re-exports
pub use documents::{count_query, select_query, DocumentRow, PgDocumentStore, PgDocumentTransaction};
pub use pool::{Database, PoolConfig};
pub use repository::{RepositoryError, RepositoryResult};
