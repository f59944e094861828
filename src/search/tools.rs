//! Web search tool provider

use crate::mcp::tools::{parse_arguments, unknown_tool, ToolProvider};
use crate::rpc::protocol::{CallToolResult, ParameterSpec, Tool};
use crate::search::service::{SearchEngine, SearchResponse, WebSearchService, MAX_RESULTS};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

pub const SERVER_NAME: &str = "web-search";

const ANY_LANGUAGE: &str = "any";

pub struct SearchTools {
    service: WebSearchService,
}

impl SearchTools {
    pub fn new(service: WebSearchService) -> Self {
        Self { service }
    }

    fn search_web(&self, args: Value) -> CallToolResult {
        let args: SearchArgs = match parse_arguments(args) {
            Ok(args) => args,
            Err(result) => return result,
        };

        let response = self.service.search(
            &args.query,
            args.engine.as_deref(),
            args.num_results.unwrap_or(MAX_RESULTS),
        );

        let mut output = format!("Web Search Results for: '{}'\n\n", args.query);
        output.push_str(&format!("Search Engine: {}\n", response.engine));
        if let Some(requested) = &response.fallback_from {
            output.push_str(&format!(
                "Unknown engine '{}', used {} instead\n",
                requested, response.engine
            ));
        }
        output.push_str(&format!("Results Found: {}\n\n", response.results.len()));

        for result in &response.results {
            output.push_str(&format!(
                "{}. {}\n   URL: {}\n   {}\n\n",
                result.rank, result.title, result.url, result.snippet
            ));
        }

        CallToolResult::text(output)
    }

    fn search_engines(&self) -> CallToolResult {
        let mut output = String::from("Available Search Engines:\n\n");
        for engine in self.service.engines() {
            let marker = if *engine == self.service.default_engine() {
                " (default)"
            } else {
                ""
            };
            output.push_str(&format!(
                "- {}{} - {}\n",
                engine,
                marker,
                engine.search_url()
            ));
        }
        CallToolResult::text(output)
    }

    fn search_news(&self, args: Value) -> CallToolResult {
        let args: NewsArgs = match parse_arguments(args) {
            Ok(args) => args,
            Err(result) => return result,
        };

        let response = self.service.search(
            &format!("news {}", args.query),
            Some(SearchEngine::DuckDuckGo.name()),
            args.num_results.unwrap_or(MAX_RESULTS),
        );

        let mut output = format!("News Search Results for: '{}'\n\n", args.query);
        push_results(&mut output, &response, "Source");
        CallToolResult::text(output)
    }

    fn search_technical(&self, args: Value) -> CallToolResult {
        let args: TechnicalArgs = match parse_arguments(args) {
            Ok(args) => args,
            Err(result) => return result,
        };

        let language = args
            .language
            .as_deref()
            .map(str::trim)
            .filter(|language| !language.is_empty() && *language != ANY_LANGUAGE);

        let query = match language {
            Some(language) => format!("{} {}", language, args.query),
            None => args.query.clone(),
        };

        let response =
            self.service
                .search(&query, Some(SearchEngine::DuckDuckGo.name()), MAX_RESULTS);

        let mut output = format!("Technical Search Results for: '{}'\n\n", args.query);
        if let Some(language) = language {
            output.push_str(&format!("Language Focus: {}\n\n", language));
        }
        push_results(&mut output, &response, "Documentation");
        CallToolResult::text(output)
    }
}

impl Default for SearchTools {
    fn default() -> Self {
        Self::new(WebSearchService::default())
    }
}

fn push_results(output: &mut String, response: &SearchResponse, link_label: &str) {
    for result in &response.results {
        output.push_str(&format!(
            "{}. {}\n   {}\n   {}: {}\n\n",
            result.rank, result.title, result.snippet, link_label, result.url
        ));
    }
}

#[async_trait]
impl ToolProvider for SearchTools {
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
        match name {
            "search_web" => self.search_web(arguments),
            "get_search_engines" => self.search_engines(),
            "search_news" => self.search_news(arguments),
            "search_technical" => self.search_technical(arguments),
            _ => unknown_tool(name),
        }
    }
}

pub fn tool_definitions() -> Vec<Tool> {
    vec![
        Tool::new(
            "search_web",
            "Search the web for information on any topic",
            vec![
                (
                    "query",
                    ParameterSpec::string("The search query to look up").required(),
                ),
                (
                    "engine",
                    ParameterSpec::string("Search engine to use (google, bing, duckduckgo)")
                        .with_default(json!("duckduckgo")),
                ),
                (
                    "num_results",
                    ParameterSpec::integer("Number of results to return (at most 5)")
                        .with_default(json!(5)),
                ),
            ],
        ),
        Tool::new(
            "get_search_engines",
            "Get list of available search engines",
            vec![],
        ),
        Tool::new(
            "search_news",
            "Search for recent news articles",
            vec![
                ("query", ParameterSpec::string("News search query").required()),
                (
                    "num_results",
                    ParameterSpec::integer("Number of news articles to return")
                        .with_default(json!(5)),
                ),
            ],
        ),
        Tool::new(
            "search_technical",
            "Search for technical documentation and code examples",
            vec![
                (
                    "query",
                    ParameterSpec::string(
                        "Technical search query (e.g., 'Spring Boot MongoDB integration')",
                    )
                    .required(),
                ),
                (
                    "language",
                    ParameterSpec::string("Programming language to focus on")
                        .with_default(json!(ANY_LANGUAGE)),
                ),
            ],
        ),
    ]
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
    #[serde(default)]
    engine: Option<String>,
    #[serde(default)]
    num_results: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct NewsArgs {
    query: String,
    #[serde(default)]
    num_results: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct TechnicalArgs {
    query: String,
    #[serde(default)]
    language: Option<String>,
}
