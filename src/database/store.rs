//! Document store seam
//!
//! The database tools only talk to these traits. `MongoStore` is the real
//! implementation; tests plug in an in-memory store.

use crate::types::DatabaseError;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

/// How many documents carry a given top-level field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldCount {
    pub field: String,
    pub count: u64,
}

/// Figures from `dbStats`. Sizes are in bytes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatabaseStats {
    pub data_size: f64,
    pub storage_size: f64,
    pub index_size: f64,
    pub collections: u64,
    pub objects: u64,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    fn database_name(&self) -> &str;

    /// Collection names, sorted.
    async fn collection_names(&self) -> Result<Vec<String>, DatabaseError>;

    async fn count_documents(&self, collection: &str) -> Result<u64, DatabaseError>;

    /// Index names; empty for a collection that does not exist.
    async fn index_names(&self, collection: &str) -> Result<Vec<String>, DatabaseError>;

    /// At most `limit` documents matching `filter`, as relaxed extended JSON.
    async fn find(
        &self,
        collection: &str,
        filter: Map<String, Value>,
        limit: u32,
    ) -> Result<Vec<Value>, DatabaseError>;

    /// Top-level field occurrences, most frequent first.
    async fn field_counts(&self, collection: &str) -> Result<Vec<FieldCount>, DatabaseError>;

    async fn stats(&self) -> Result<DatabaseStats, DatabaseError>;
}

/// Opens a store and checks that the server answers before handing it out.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(
        &self,
        uri: &str,
        database: &str,
    ) -> Result<Arc<dyn DocumentStore>, DatabaseError>;
}
