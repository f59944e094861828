//! Plain-text reports for the database tools

use crate::database::store::{DatabaseStats, FieldCount};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

const TOP_FIELDS: usize = 10;
const SAMPLES_SHOWN: usize = 3;
const RESULTS_SHOWN: usize = 5;
const RECENT_TODOS: usize = 5;
const COMMON_WORDS: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionSummary {
    pub name: String,
    pub documents: u64,
    pub indexes: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionAnalysis {
    pub name: String,
    pub documents: u64,
    pub indexes: usize,
    pub fields: Vec<FieldCount>,
    pub samples: Vec<Value>,
}

/// Completion and wording statistics over a set of todo documents.
#[derive(Debug, Clone, PartialEq)]
pub struct TodoPatterns {
    pub total: usize,
    pub completed: usize,
    pub active_users: usize,
    /// Most frequent lowercase title words, ties in order of first use.
    pub common_words: Vec<(String, usize)>,
}

impl TodoPatterns {
    pub fn from_todos(todos: &[Value]) -> Self {
        let completed = todos.iter().filter(|todo| is_completed(todo)).count();

        let users: HashSet<String> = todos
            .iter()
            .filter_map(|todo| todo.get("userId"))
            .filter_map(user_key)
            .collect();

        // word -> (count, first position)
        let mut words: HashMap<String, (usize, usize)> = HashMap::new();
        let titles = todos
            .iter()
            .filter_map(|todo| todo.get("title").and_then(Value::as_str));
        for word in titles.flat_map(str::split_whitespace) {
            let position = words.len();
            words.entry(word.to_lowercase()).or_insert((0, position)).0 += 1;
        }

        let mut ranked: Vec<(String, (usize, usize))> = words.into_iter().collect();
        ranked.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(a.1 .1.cmp(&b.1 .1)));

        Self {
            total: todos.len(),
            completed,
            active_users: users.len(),
            common_words: ranked
                .into_iter()
                .take(COMMON_WORDS)
                .map(|(word, (count, _))| (word, count))
                .collect(),
        }
    }

    pub fn pending(&self) -> usize {
        self.total - self.completed
    }
}

fn is_completed(todo: &Value) -> bool {
    todo.get("completed").and_then(Value::as_bool).unwrap_or(false)
}

/// Empty and missing ids do not count as a user.
fn user_key(id: &Value) -> Option<String> {
    match id {
        Value::Null => None,
        Value::String(id) if id.is_empty() => None,
        Value::String(id) => Some(id.clone()),
        other => Some(other.to_string()),
    }
}

/// Strings as-is, extended-JSON dates by their text.
fn display_field(todo: &Value, key: &str) -> Option<String> {
    match todo.get(key)? {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        Value::Object(object) => match object.get("$date") {
            Some(Value::String(date)) => Some(date.clone()),
            Some(other) => Some(other.to_string()),
            None => Some(Value::Object(object.clone()).to_string()),
        },
        other => Some(other.to_string()),
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn megabytes(bytes: f64) -> f64 {
    bytes / BYTES_PER_MB
}

fn percent(part: usize, total: usize) -> f64 {
    part as f64 / total as f64 * 100.0
}

pub fn format_collections(database: &str, collections: &[CollectionSummary]) -> String {
    let mut output = format!(
        "Database Collections Overview\n\nDatabase: {}\nTotal Collections: {}\n",
        database,
        collections.len()
    );

    for collection in collections {
        output.push_str(&format!(
            "\n{}\n- Documents: {}\n- Indexes: {}\n",
            collection.name, collection.documents, collection.indexes
        ));
    }

    output
}

pub fn format_collection_analysis(analysis: &CollectionAnalysis) -> String {
    let mut output = format!(
        "Collection Analysis: {}\n\nTotal Documents: {}\nIndexes: {}\n\nField Statistics:\n",
        analysis.name, analysis.documents, analysis.indexes
    );

    for field in analysis.fields.iter().take(TOP_FIELDS) {
        output.push_str(&format!("- {}: {} documents\n", field.field, field.count));
    }

    output.push_str("\nSample Documents:\n");
    for (i, sample) in analysis.samples.iter().take(SAMPLES_SHOWN).enumerate() {
        output.push_str(&format!("{}. {}\n", i + 1, pretty(sample)));
    }

    output
}

pub fn format_query_results(collection: &str, query: &Value, results: &[Value]) -> String {
    let mut output = format!(
        "Query Results\n\nCollection: {}\nQuery: {}\nResults Found: {}\n",
        collection,
        pretty(query),
        results.len()
    );

    for (i, result) in results.iter().take(RESULTS_SHOWN).enumerate() {
        output.push_str(&format!("\nResult {}:\n{}\n", i + 1, pretty(result)));
    }

    if results.len() > RESULTS_SHOWN {
        output.push_str(&format!(
            "\n... and {} more results\n",
            results.len() - RESULTS_SHOWN
        ));
    }

    output
}

pub fn format_performance(stats: &DatabaseStats, collections: &[(String, u64)]) -> String {
    let mut output = format!(
        "Database Performance Statistics\n\n\
         Database Size: {:.2} MB\n\
         Storage Size: {:.2} MB\n\
         Index Size: {:.2} MB\n\
         Total Collections: {}\n\
         Total Objects: {}\n\n\
         Collection Details:\n",
        megabytes(stats.data_size),
        megabytes(stats.storage_size),
        megabytes(stats.index_size),
        stats.collections,
        stats.objects
    );

    for (name, documents) in collections {
        output.push_str(&format!("- {}: {} documents\n", name, documents));
    }

    output
}

pub fn format_user_todos(user_id: &str, todos: &[Value]) -> String {
    let mut output = format!(
        "Todos for User: {}\n\nTotal Todos Found: {}\n\n",
        user_id,
        todos.len()
    );

    if todos.is_empty() {
        output.push_str("No todos found for this user.\n");
        return output;
    }

    let completed = todos.iter().filter(|todo| is_completed(todo)).count();
    output.push_str("Status Breakdown:\n");
    for (label, count) in [("Completed", completed), ("Pending", todos.len() - completed)] {
        if count > 0 {
            output.push_str(&format!("- {}: {}\n", label, count));
        }
    }

    output.push_str("\nRecent Todos:\n");
    for (i, todo) in todos.iter().take(RECENT_TODOS).enumerate() {
        let marker = if is_completed(todo) { "[done]" } else { "[open]" };
        let title = display_field(todo, "title").unwrap_or_else(|| "No title".to_string());
        output.push_str(&format!("{}. {} {}\n", i + 1, marker, title));

        if let Some(description) = display_field(todo, "description").filter(|d| !d.is_empty()) {
            output.push_str(&format!("   Description: {}\n", description));
        }
        let created = display_field(todo, "createdAt").unwrap_or_else(|| "Unknown".to_string());
        output.push_str(&format!("   Created: {}\n", created));
    }

    output
}

pub fn format_todo_patterns(patterns: &TodoPatterns) -> String {
    if patterns.total == 0 {
        return "No todos found in the database.".to_string();
    }

    let mut output = format!(
        "Todo Patterns Analysis\n\n\
         Total Todos: {}\n\
         Completed: {} ({:.1}%)\n\
         Pending: {} ({:.1}%)\n\
         Active Users: {}\n",
        patterns.total,
        patterns.completed,
        percent(patterns.completed, patterns.total),
        patterns.pending(),
        percent(patterns.pending(), patterns.total),
        patterns.active_users
    );

    if patterns.active_users > 0 {
        output.push_str(&format!(
            "\nAverage Todos per User: {:.1}\n",
            patterns.total as f64 / patterns.active_users as f64
        ));
    }

    if !patterns.common_words.is_empty() {
        output.push_str("\nMost Common Words in Titles:\n");
        for (word, count) in &patterns.common_words {
            output.push_str(&format!("- '{}': {} times\n", word, count));
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn todos() -> Vec<Value> {
        vec![
            json!({"title": "Buy milk", "userId": "u1", "completed": true}),
            json!({"title": "buy bread", "userId": "u1", "completed": false,
                   "description": "wholegrain", "createdAt": {"$date": "2024-03-01T10:00:00Z"}}),
            json!({"title": "Fix bike", "userId": "u2"}),
            json!({"title": "Call mom", "userId": ""}),
        ]
    }

    #[test]
    fn test_todo_patterns() {
        let patterns = TodoPatterns::from_todos(&todos());
        assert_eq!(patterns.total, 4);
        assert_eq!(patterns.completed, 1);
        assert_eq!(patterns.pending(), 3);
        assert_eq!(patterns.active_users, 2);
        assert_eq!(patterns.common_words[0], ("buy".to_string(), 2));
        assert_eq!(patterns.common_words[1], ("milk".to_string(), 1));
        assert_eq!(patterns.common_words.len(), 5);

        let text = format_todo_patterns(&patterns);
        assert!(text.contains("Completed: 1 (25.0%)"));
        assert!(text.contains("Pending: 3 (75.0%)"));
        assert!(text.contains("Average Todos per User: 2.0"));
        assert!(text.contains("- 'buy': 2 times"));
    }

    #[test]
    fn test_no_todos() {
        let patterns = TodoPatterns::from_todos(&[]);
        assert_eq!(format_todo_patterns(&patterns), "No todos found in the database.");
        assert!(format_user_todos("u9", &[]).contains("No todos found for this user."));
    }

    #[test]
    fn test_user_todos() {
        let todos = todos();
        let text = format_user_todos("u1", &todos[..2]);
        assert!(text.contains("Total Todos Found: 2"));
        assert!(text.contains("- Completed: 1\n- Pending: 1"));
        assert!(text.contains("1. [done] Buy milk"));
        assert!(text.contains("   Description: wholegrain"));
        assert!(text.contains("   Created: 2024-03-01T10:00:00Z"));
        assert!(text.contains("   Created: Unknown"));
    }

    #[test]
    fn test_query_results_are_truncated() {
        let results: Vec<Value> = (0..7).map(|i| json!({"n": i})).collect();
        let text = format_query_results("todos", &json!({"completed": true}), &results);
        assert!(text.contains("Results Found: 7"));
        assert!(text.contains("Result 5:"));
        assert!(!text.contains("Result 6:"));
        assert!(text.contains("... and 2 more results"));
    }

    #[test]
    fn test_performance_in_megabytes() {
        let stats = DatabaseStats {
            data_size: 3.0 * BYTES_PER_MB,
            storage_size: 1.5 * BYTES_PER_MB,
            index_size: 0.0,
            collections: 2,
            objects: 40,
        };
        let text = format_performance(&stats, &[("todos".to_string(), 38)]);
        assert!(text.contains("Database Size: 3.00 MB"));
        assert!(text.contains("Storage Size: 1.50 MB"));
        assert!(text.contains("- todos: 38 documents"));
    }
}
