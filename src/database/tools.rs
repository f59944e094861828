//! Database management tool provider
//!
//! Connects on first use with the configured connection string;
//! `connect_database` switches to another one. Driver failures come back as
//! error results, never as JSON-RPC errors.

use crate::config::DatabaseSettings;
use crate::database::report::{self, CollectionAnalysis, CollectionSummary, TodoPatterns};
use crate::database::store::{DocumentStore, StoreConnector};
use crate::mcp::tools::{parse_arguments, unknown_tool, ToolProvider};
use crate::rpc::protocol::{CallToolResult, ParameterSpec, Tool};
use crate::types::DatabaseError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub const SERVER_NAME: &str = "database-management";

const TODOS: &str = "todos";
const SAMPLE_SIZE: u32 = 5;
const DEFAULT_QUERY_LIMIT: u32 = 100;
const USER_TODO_LIMIT: u32 = 50;
const PATTERN_TODO_LIMIT: u32 = 1000;

pub struct DatabaseTools {
    connector: Arc<dyn StoreConnector>,
    uri: String,
    database: String,
    store: RwLock<Option<Arc<dyn DocumentStore>>>,
}

impl DatabaseTools {
    pub fn new(connector: Arc<dyn StoreConnector>, settings: &DatabaseSettings) -> Self {
        Self {
            connector,
            uri: settings.uri.clone(),
            database: settings.name.clone(),
            store: RwLock::new(None),
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.store.read().await.is_some()
    }

    /// Current store, connecting with the configured settings on first use.
    async fn store(&self) -> Result<Arc<dyn DocumentStore>, DatabaseError> {
        if let Some(store) = self.store.read().await.as_ref() {
            return Ok(Arc::clone(store));
        }

        let mut slot = self.store.write().await;
        if let Some(store) = slot.as_ref() {
            return Ok(Arc::clone(store));
        }

        let store = self.connector.connect(&self.uri, &self.database).await?;
        *slot = Some(Arc::clone(&store));
        Ok(store)
    }

    async fn connect(&self, args: Value) -> CallToolResult {
        let args: ConnectArgs = match parse_arguments(args) {
            Ok(args) => args,
            Err(result) => return result,
        };

        let uri = args.connection_string.unwrap_or_else(|| self.uri.clone());
        let database = args.database_name.unwrap_or_else(|| self.database.clone());

        // The previous connection stays in use if this one fails.
        match self.connector.connect(&uri, &database).await {
            Ok(store) => {
                *self.store.write().await = Some(store);
                info!("Database tools now use '{}'", database);
                CallToolResult::text(format!(
                    "Successfully connected to MongoDB database '{}'",
                    database
                ))
            }
            Err(e) => {
                error!("Database connection failed: {}", e);
                CallToolResult::error(format!("Failed to connect to MongoDB database\n{}", e))
            }
        }
    }

    async fn collections_info(&self) -> Result<String, DatabaseError> {
        let store = self.store().await?;

        let mut summaries = Vec::new();
        for name in store.collection_names().await? {
            summaries.push(CollectionSummary {
                documents: store.count_documents(&name).await?,
                indexes: store.index_names(&name).await?.len(),
                name,
            });
        }

        Ok(report::format_collections(store.database_name(), &summaries))
    }

    async fn analyze_collection(&self, args: CollectionArgs) -> Result<String, DatabaseError> {
        let store = self.store().await?;
        let name = args.collection_name;

        let analysis = CollectionAnalysis {
            documents: store.count_documents(&name).await?,
            indexes: store.index_names(&name).await?.len(),
            fields: store.field_counts(&name).await?,
            samples: store.find(&name, Map::new(), SAMPLE_SIZE).await?,
            name,
        };

        Ok(report::format_collection_analysis(&analysis))
    }

    async fn execute_query(&self, args: QueryArgs) -> Result<String, DatabaseError> {
        let limit = match args.limit {
            None => DEFAULT_QUERY_LIMIT,
            Some(limit) => query_limit(limit).ok_or_else(|| {
                DatabaseError::InvalidQuery(format!(
                    "limit must be a positive integer, got {}",
                    limit
                ))
            })?,
        };

        let store = self.store().await?;
        let query = Value::Object(args.query.clone());
        let results = store.find(&args.collection_name, args.query, limit).await?;

        Ok(report::format_query_results(&args.collection_name, &query, &results))
    }

    async fn performance_stats(&self) -> Result<String, DatabaseError> {
        let store = self.store().await?;
        let stats = store.stats().await?;

        let mut counts = Vec::new();
        for name in store.collection_names().await? {
            let documents = store.count_documents(&name).await?;
            counts.push((name, documents));
        }

        Ok(report::format_performance(&stats, &counts))
    }

    async fn user_todos(&self, args: UserArgs) -> Result<String, DatabaseError> {
        let store = self.store().await?;

        let mut filter = Map::new();
        filter.insert("userId".to_string(), Value::String(args.user_id.clone()));
        let todos = store.find(TODOS, filter, USER_TODO_LIMIT).await?;

        Ok(report::format_user_todos(&args.user_id, &todos))
    }

    async fn todo_patterns(&self) -> Result<String, DatabaseError> {
        let store = self.store().await?;
        let todos = store.find(TODOS, Map::new(), PATTERN_TODO_LIMIT).await?;
        Ok(report::format_todo_patterns(&TodoPatterns::from_todos(&todos)))
    }
}

#[async_trait]
impl ToolProvider for DatabaseTools {
    fn name(&self) -> &str {
        SERVER_NAME
    }

    fn tools(&self) -> Vec<Tool> {
        tool_definitions()
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
        _cancel: &CancellationToken,
    ) -> CallToolResult {
        let outcome = match name {
            "connect_database" => return self.connect(arguments).await,
            "get_collections_info" => self.collections_info().await,
            "analyze_collection" => match parse_arguments(arguments) {
                Ok(args) => self.analyze_collection(args).await,
                Err(result) => return result,
            },
            "execute_query" => match parse_arguments(arguments) {
                Ok(args) => self.execute_query(args).await,
                Err(result) => return result,
            },
            "get_performance_stats" => self.performance_stats().await,
            "find_todos_by_user" => match parse_arguments(arguments) {
                Ok(args) => self.user_todos(args).await,
                Err(result) => return result,
            },
            "analyze_todo_patterns" => self.todo_patterns().await,
            _ => return unknown_tool(name),
        };

        match outcome {
            Ok(text) => CallToolResult::text(text),
            Err(e) => {
                error!("Database tool '{}' failed: {}", name, e);
                CallToolResult::error(e.to_string())
            }
        }
    }
}

pub fn tool_definitions() -> Vec<Tool> {
    vec![
        Tool::new(
            "connect_database",
            "Connect to the MongoDB database",
            vec![
                (
                    "connection_string",
                    ParameterSpec::string(
                        "MongoDB connection string (default: mongodb://localhost:27017)",
                    ),
                ),
                (
                    "database_name",
                    ParameterSpec::string("Database name (default: todoapp)"),
                ),
            ],
        ),
        Tool::new(
            "get_collections_info",
            "Get information about all collections in the database",
            vec![],
        ),
        Tool::new(
            "analyze_collection",
            "Analyze a specific collection including field statistics and sample data",
            vec![(
                "collection_name",
                ParameterSpec::string("Name of the collection to analyze").required(),
            )],
        ),
        Tool::new(
            "execute_query",
            "Execute a MongoDB query on a collection",
            vec![
                (
                    "collection_name",
                    ParameterSpec::string("Name of the collection to query").required(),
                ),
                (
                    "query",
                    ParameterSpec::object("MongoDB query object").required(),
                ),
                (
                    "limit",
                    ParameterSpec::number("Maximum number of results (default: 100)")
                        .with_default(json!(DEFAULT_QUERY_LIMIT)),
                ),
            ],
        ),
        Tool::new(
            "get_performance_stats",
            "Get database performance statistics and storage information",
            vec![],
        ),
        Tool::new(
            "find_todos_by_user",
            "Find todos for a specific user with detailed analysis",
            vec![(
                "user_id",
                ParameterSpec::string("User ID to search for").required(),
            )],
        ),
        Tool::new(
            "analyze_todo_patterns",
            "Analyze todo patterns and statistics across all users",
            vec![],
        ),
    ]
}

/// Whole numbers in 1..=u32::MAX only.
fn query_limit(value: f64) -> Option<u32> {
    if value.fract() != 0.0 || !(1.0..=u32::MAX as f64).contains(&value) {
        return None;
    }
    Some(value as u32)
}

#[derive(Debug, Deserialize)]
struct ConnectArgs {
    #[serde(default)]
    connection_string: Option<String>,
    #[serde(default)]
    database_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CollectionArgs {
    collection_name: String,
}

#[derive(Debug, Deserialize)]
struct QueryArgs {
    collection_name: String,
    query: Map<String, Value>,
    #[serde(default)]
    limit: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct UserArgs {
    user_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::store::{DatabaseStats, FieldCount};
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    /// In-memory store; filters match top-level fields by equality.
    struct MemoryStore {
        name: String,
        collections: BTreeMap<String, Vec<Value>>,
    }

    #[async_trait]
    impl DocumentStore for MemoryStore {
        fn database_name(&self) -> &str {
            &self.name
        }

        async fn collection_names(&self) -> Result<Vec<String>, DatabaseError> {
            Ok(self.collections.keys().cloned().collect())
        }

        async fn count_documents(&self, collection: &str) -> Result<u64, DatabaseError> {
            Ok(self.collections.get(collection).map_or(0, Vec::len) as u64)
        }

        async fn index_names(&self, collection: &str) -> Result<Vec<String>, DatabaseError> {
            Ok(match self.collections.get(collection) {
                Some(_) => vec!["_id_".to_string()],
                None => Vec::new(),
            })
        }

        async fn find(
            &self,
            collection: &str,
            filter: Map<String, Value>,
            limit: u32,
        ) -> Result<Vec<Value>, DatabaseError> {
            if filter.keys().any(|key| key.starts_with('$')) {
                return Err(DatabaseError::InvalidQuery(
                    "unknown top level operator".to_string(),
                ));
            }

            let documents = self.collections.get(collection).cloned().unwrap_or_default();
            let matches = |document: &Value| {
                filter
                    .iter()
                    .all(|(key, value)| document.get(key) == Some(value))
            };
            Ok(documents
                .into_iter()
                .filter(|document| matches(document))
                .take(limit as usize)
                .collect())
        }

        async fn field_counts(&self, collection: &str) -> Result<Vec<FieldCount>, DatabaseError> {
            let mut counts: BTreeMap<String, u64> = BTreeMap::new();
            for document in self.collections.get(collection).into_iter().flatten() {
                for key in document.as_object().into_iter().flat_map(|o| o.keys()) {
                    *counts.entry(key.clone()).or_default() += 1;
                }
            }

            let mut fields: Vec<FieldCount> = counts
                .into_iter()
                .map(|(field, count)| FieldCount { field, count })
                .collect();
            fields.sort_by(|a, b| b.count.cmp(&a.count));
            Ok(fields)
        }

        async fn stats(&self) -> Result<DatabaseStats, DatabaseError> {
            Ok(DatabaseStats {
                data_size: 2.0 * 1024.0 * 1024.0,
                storage_size: 1024.0 * 1024.0,
                index_size: 0.0,
                collections: self.collections.len() as u64,
                objects: self.collections.values().map(Vec::len).sum::<usize>() as u64,
            })
        }
    }

    /// Hands out the todo fixture for `todoapp`; every other name fails.
    #[derive(Default)]
    struct FakeConnector {
        attempts: Mutex<Vec<(String, String)>>,
    }

    impl FakeConnector {
        fn attempts(&self) -> Vec<(String, String)> {
            self.attempts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl StoreConnector for FakeConnector {
        async fn connect(
            &self,
            uri: &str,
            database: &str,
        ) -> Result<Arc<dyn DocumentStore>, DatabaseError> {
            self.attempts
                .lock()
                .unwrap()
                .push((uri.to_string(), database.to_string()));

            if database != "todoapp" {
                return Err(DatabaseError::Connect {
                    database: database.to_string(),
                    reason: "server selection timeout".to_string(),
                });
            }

            let mut collections = BTreeMap::new();
            collections.insert(
                "todos".to_string(),
                vec![
                    json!({"_id": 1, "title": "Write report", "userId": "alice",
                           "completed": true}),
                    json!({"_id": 2, "title": "Review report", "userId": "alice",
                           "completed": false}),
                    json!({"_id": 3, "title": "Plan sprint", "userId": "bob"}),
                ],
            );
            collections.insert(
                "users".to_string(),
                vec![json!({"_id": "alice"}), json!({"_id": "bob"})],
            );

            Ok(Arc::new(MemoryStore {
                name: database.to_string(),
                collections,
            }))
        }
    }

    fn settings() -> DatabaseSettings {
        DatabaseSettings::default()
    }

    fn tools() -> (DatabaseTools, Arc<FakeConnector>) {
        let connector = Arc::new(FakeConnector::default());
        let tools = DatabaseTools::new(connector.clone(), &settings());
        (tools, connector)
    }

    async fn call(tools: &DatabaseTools, name: &str, arguments: Value) -> CallToolResult {
        tools
            .call_tool(name, arguments, &CancellationToken::new())
            .await
    }

    #[test]
    fn test_tool_definitions() {
        let names: Vec<String> = tool_definitions().into_iter().map(|t| t.name).collect();
        assert_eq!(
            names,
            vec![
                "connect_database",
                "get_collections_info",
                "analyze_collection",
                "execute_query",
                "get_performance_stats",
                "find_todos_by_user",
                "analyze_todo_patterns",
            ]
        );

        let query = &tool_definitions()[3];
        let params = query.parameters();
        assert!(params["query"].required);
        assert_eq!(params["query"].kind, "object");
        assert_eq!(params["limit"].default, Some(json!(100)));
    }

    #[test]
    fn test_query_limit() {
        assert_eq!(query_limit(25.0), Some(25));
        assert_eq!(query_limit(0.0), None);
        assert_eq!(query_limit(-3.0), None);
        assert_eq!(query_limit(2.5), None);
    }

    #[tokio::test]
    async fn test_connects_lazily_with_configured_settings() {
        let (tools, connector) = tools();
        assert!(!tools.is_connected().await);

        let result = call(&tools, "get_collections_info", json!({})).await;
        let text = result.joined_text();
        assert!(!result.is_error(), "{}", text);
        assert!(text.contains("Database: todoapp"));
        assert!(text.contains("Total Collections: 2"));
        assert!(text.contains("todos\n- Documents: 3\n- Indexes: 1"));

        call(&tools, "get_performance_stats", json!({})).await;
        assert_eq!(
            connector.attempts(),
            vec![("mongodb://localhost:27017".to_string(), "todoapp".to_string())]
        );
        assert!(tools.is_connected().await);
    }

    #[tokio::test]
    async fn test_failed_connect_is_error_result_and_keeps_previous() {
        let (tools, _connector) = tools();
        call(&tools, "connect_database", json!({})).await;

        let result = call(&tools, "connect_database", json!({"database_name": "missing"})).await;
        assert!(result.is_error());
        assert!(result.joined_text().contains("server selection timeout"));

        let result = call(&tools, "get_collections_info", json!({})).await;
        assert!(result.joined_text().contains("Database: todoapp"));
    }

    #[tokio::test]
    async fn test_unreachable_database_is_error_result() {
        let connector = Arc::new(FakeConnector::default());
        let settings = DatabaseSettings {
            name: "offline".to_string(),
            ..DatabaseSettings::default()
        };
        let tools = DatabaseTools::new(connector, &settings);

        for name in ["get_collections_info", "get_performance_stats", "analyze_todo_patterns"] {
            let result = call(&tools, name, json!({})).await;
            assert!(result.is_error(), "{} should fail", name);
            assert!(result.joined_text().starts_with("Failed to connect to database 'offline'"));
        }
        assert!(!tools.is_connected().await);
    }

    #[tokio::test]
    async fn test_analyze_collection() {
        let (tools, _connector) = tools();
        let result = call(&tools, "analyze_collection", json!({"collection_name": "todos"})).await;

        let text = result.joined_text();
        assert!(text.starts_with("Collection Analysis: todos"));
        assert!(text.contains("Total Documents: 3"));
        assert!(text.contains("- title: 3 documents"));
        assert!(text.contains("\"Write report\""));
    }

    #[tokio::test]
    async fn test_execute_query() {
        let (tools, _connector) = tools();

        let result = call(
            &tools,
            "execute_query",
            json!({"collection_name": "todos", "query": {"userId": "alice"}, "limit": 1}),
        )
        .await;
        let text = result.joined_text();
        assert!(!result.is_error(), "{}", text);
        assert!(text.contains("Results Found: 1"));

        let result = call(
            &tools,
            "execute_query",
            json!({"collection_name": "todos", "query": {"$where": "1"}}),
        )
        .await;
        assert!(result.is_error());
        assert!(result.joined_text().starts_with("Invalid query"));

        let result = call(
            &tools,
            "execute_query",
            json!({"collection_name": "todos", "query": [1, 2]}),
        )
        .await;
        assert!(result.joined_text().starts_with("Invalid arguments"));

        let result = call(
            &tools,
            "execute_query",
            json!({"collection_name": "todos", "query": {}, "limit": 0}),
        )
        .await;
        assert!(result.is_error());
    }

    #[tokio::test]
    async fn test_todo_tools() {
        let (tools, _connector) = tools();

        let result = call(&tools, "find_todos_by_user", json!({"user_id": "alice"})).await;
        let text = result.joined_text();
        assert!(text.contains("Total Todos Found: 2"));
        assert!(text.contains("1. [done] Write report"));

        let result = call(&tools, "analyze_todo_patterns", json!({})).await;
        let text = result.joined_text();
        assert!(text.contains("Total Todos: 3"));
        assert!(text.contains("Active Users: 2"));
        assert!(text.contains("- 'report': 2 times"));

        let result = call(&tools, "find_todos_by_user", json!({})).await;
        assert!(result.joined_text().starts_with("Invalid arguments"));
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let (tools, connector) = tools();
        let result = call(&tools, "drop_database", json!({})).await;
        assert_eq!(result.joined_text(), "Unknown tool: drop_database");
        assert!(connector.attempts().is_empty());
    }
}
