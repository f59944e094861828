//! Todo database management: document store seam, MongoDB backend, reports
//! and MCP tools

pub mod mongo;
pub mod report;
pub mod store;
pub mod tools;

pub use mongo::{MongoConnector, MongoStore};
pub use store::{DatabaseStats, DocumentStore, FieldCount, StoreConnector};
pub use tools::DatabaseTools;
