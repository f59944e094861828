//! Web search server

pub mod service;
pub mod tools;

pub use service::{SearchEngine, WebSearchService};
pub use tools::SearchTools;
