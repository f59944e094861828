//! MongoDB-backed document store

use crate::database::store::{DatabaseStats, DocumentStore, FieldCount, StoreConnector};
use crate::types::DatabaseError;
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::error::ErrorKind;
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection, Database};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Server error code for a missing collection.
const NAMESPACE_NOT_FOUND: i32 = 26;

pub struct MongoConnector {
    timeout: Duration,
}

impl MongoConnector {
    /// `timeout` bounds server selection and each connection attempt.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl StoreConnector for MongoConnector {
    async fn connect(
        &self,
        uri: &str,
        database: &str,
    ) -> Result<Arc<dyn DocumentStore>, DatabaseError> {
        let store = MongoStore::connect(uri, database, self.timeout).await?;
        Ok(Arc::new(store))
    }
}

pub struct MongoStore {
    database: Database,
    name: String,
}

impl MongoStore {
    pub async fn connect(uri: &str, name: &str, timeout: Duration) -> Result<Self, DatabaseError> {
        let connect_error = |e: mongodb::error::Error| DatabaseError::Connect {
            database: name.to_string(),
            reason: e.to_string(),
        };

        let mut options = ClientOptions::parse(uri).await.map_err(connect_error)?;
        options.app_name = Some(env!("CARGO_PKG_NAME").to_string());
        options.server_selection_timeout = Some(timeout);
        options.connect_timeout = Some(timeout);

        let client = Client::with_options(options).map_err(connect_error)?;
        let database = client.database(name);

        // The driver connects lazily; ping so a dead server fails here.
        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(connect_error)?;
        info!("Connected to MongoDB database '{}'", name);

        Ok(Self {
            database,
            name: name.to_string(),
        })
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.database.collection::<Document>(name)
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    fn database_name(&self) -> &str {
        &self.name
    }

    async fn collection_names(&self) -> Result<Vec<String>, DatabaseError> {
        let mut names = self.database.list_collection_names().await?;
        names.sort();
        Ok(names)
    }

    async fn count_documents(&self, collection: &str) -> Result<u64, DatabaseError> {
        Ok(self.collection(collection).count_documents(doc! {}).await?)
    }

    async fn index_names(&self, collection: &str) -> Result<Vec<String>, DatabaseError> {
        match self.collection(collection).list_index_names().await {
            Ok(names) => Ok(names),
            Err(e) => {
                let missing = matches!(
                    e.kind.as_ref(),
                    ErrorKind::Command(command) if command.code == NAMESPACE_NOT_FOUND
                );
                if missing {
                    Ok(Vec::new())
                } else {
                    Err(e.into())
                }
            }
        }
    }

    async fn find(
        &self,
        collection: &str,
        filter: Map<String, Value>,
        limit: u32,
    ) -> Result<Vec<Value>, DatabaseError> {
        let filter =
            Document::try_from(filter).map_err(|e| DatabaseError::InvalidQuery(e.to_string()))?;
        debug!("find {}.{} {} limit {}", self.name, collection, filter, limit);

        let documents: Vec<Document> = self
            .collection(collection)
            .find(filter)
            .limit(i64::from(limit))
            .await?
            .try_collect()
            .await?;

        Ok(documents
            .into_iter()
            .map(|document| Bson::Document(document).into_relaxed_extjson())
            .collect())
    }

    async fn field_counts(&self, collection: &str) -> Result<Vec<FieldCount>, DatabaseError> {
        let pipeline = [
            doc! { "$project": { "pairs": { "$objectToArray": "$$ROOT" } } },
            doc! { "$unwind": "$pairs" },
            doc! { "$group": { "_id": "$pairs.k", "count": { "$sum": 1 } } },
            doc! { "$sort": { "count": -1, "_id": 1 } },
        ];

        let rows: Vec<Document> = self
            .collection(collection)
            .aggregate(pipeline)
            .await?
            .try_collect()
            .await?;

        rows.iter()
            .map(|row| {
                let field = row.get_str("_id").map_err(|e| DatabaseError::Decode {
                    command: "aggregate".to_string(),
                    reason: e.to_string(),
                })?;
                Ok(FieldCount {
                    field: field.to_string(),
                    count: number(row, "count") as u64,
                })
            })
            .collect()
    }

    async fn stats(&self) -> Result<DatabaseStats, DatabaseError> {
        let reply = self.database.run_command(doc! { "dbStats": 1 }).await?;

        Ok(DatabaseStats {
            data_size: number(&reply, "dataSize"),
            storage_size: number(&reply, "storageSize"),
            index_size: number(&reply, "indexSize"),
            collections: number(&reply, "collections") as u64,
            objects: number(&reply, "objects") as u64,
        })
    }
}

/// Numeric field of a server reply; the server picks the width per value.
fn number(document: &Document, key: &str) -> f64 {
    match document.get(key) {
        Some(Bson::Double(value)) => *value,
        Some(Bson::Int32(value)) => f64::from(*value),
        Some(Bson::Int64(value)) => *value as f64,
        _ => 0.0,
    }
}
