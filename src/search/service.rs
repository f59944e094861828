//! Simulated web search
//!
//! No engine is actually queried: results are generated from the query so
//! the search server works offline and deterministically.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// Upper bound on results per query, whatever the caller asks for.
pub const MAX_RESULTS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchEngine {
    Google,
    Bing,
    DuckDuckGo,
}

impl SearchEngine {
    pub const ALL: [SearchEngine; 3] = [Self::Google, Self::Bing, Self::DuckDuckGo];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Bing => "bing",
            Self::DuckDuckGo => "duckduckgo",
        }
    }

    pub fn search_url(&self) -> &'static str {
        match self {
            Self::Google => "https://www.google.com/search",
            Self::Bing => "https://www.bing.com/search",
            Self::DuckDuckGo => "https://duckduckgo.com/html",
        }
    }
}

impl fmt::Display for SearchEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SearchEngine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|engine| engine.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown search engine '{}'", s))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub rank: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub engine: SearchEngine,
    /// Set when the requested engine was unknown and the default was used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_from: Option<String>,
    pub results: Vec<SearchResult>,
}

#[derive(Debug, Clone)]
pub struct WebSearchService {
    default_engine: SearchEngine,
}

impl Default for WebSearchService {
    fn default() -> Self {
        Self::new(SearchEngine::DuckDuckGo)
    }
}

impl WebSearchService {
    pub fn new(default_engine: SearchEngine) -> Self {
        Self { default_engine }
    }

    pub fn default_engine(&self) -> SearchEngine {
        self.default_engine
    }

    pub fn engines(&self) -> &'static [SearchEngine] {
        &SearchEngine::ALL
    }

    /// Search with `engine`, or the default engine when it is `None` or
    /// unknown. At most [`MAX_RESULTS`] results come back.
    pub fn search(&self, query: &str, engine: Option<&str>, num_results: u32) -> SearchResponse {
        let (engine, fallback_from) = match engine {
            None => (self.default_engine, None),
            Some(name) => match name.parse::<SearchEngine>() {
                Ok(engine) => (engine, None),
                Err(e) => {
                    warn!("{}, using {}", e, self.default_engine);
                    (self.default_engine, Some(name.to_string()))
                }
            },
        };

        debug!("Searching '{}' on {} ({})", query, engine, engine.search_url());

        SearchResponse {
            query: query.to_string(),
            engine,
            fallback_from,
            results: simulate_results(query, num_results),
        }
    }
}

fn simulate_results(query: &str, num_results: u32) -> Vec<SearchResult> {
    let slug = query.replace(' ', "-");

    (1..=num_results.min(MAX_RESULTS))
        .map(|rank| SearchResult {
            title: format!("Search Result {} for '{}'", rank, query),
            url: format!("https://example{}.com/{}", rank, slug),
            snippet: format!(
                "This is a simulated search result for the query '{}'. Result number {} provides relevant information about the topic.",
                query, rank
            ),
            rank,
        })
        .collect()
}
