//! Web search toolkit
//!
//! DuckDuckGo (instant answer API), Wikipedia (REST summary API) and Google
//! (Custom Search JSON API). Endpoints are overridable for testing.

use async_trait::async_trait;
use parley_models::Environment;
use reqwest::Client;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::http::http_client;
use super::{Tool, ToolArguments, ToolHandler, ToolParameters, ToolResult, Toolkit};
use crate::error::{Result, SocietyError};

const DUCKDUCKGO_URL: &str = "https://api.duckduckgo.com/";
const WIKIPEDIA_URL: &str = "https://en.wikipedia.org/api/rest_v1/page/summary/";
const GOOGLE_URL: &str = "https://www.googleapis.com/customsearch/v1";

/// Search backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchEngine {
    /// `search_duckduckgo`
    DuckDuckGo,
    /// `search_wiki`
    Wikipedia,
    /// `search_google`
    Google,
}

#[derive(Debug, Clone)]
struct Endpoints {
    duckduckgo: String,
    wikipedia: String,
    google: String,
}

/// Toolkit exposing one tool per enabled [`SearchEngine`]
#[derive(Debug, Clone)]
pub struct SearchToolkit {
    client: Client,
    engines: Vec<SearchEngine>,
    endpoints: Endpoints,
    google_api_key: Option<String>,
    google_engine_id: Option<String>,
}

impl SearchToolkit {
    /// All engines enabled. Google credentials (`GOOGLE_API_KEY`,
    /// `SEARCH_ENGINE_ID`) are read from `environment` and checked per call.
    pub fn new(environment: &Environment) -> Result<Self> {
        Ok(Self {
            client: http_client(Duration::from_secs(30))?,
            engines: vec![SearchEngine::DuckDuckGo, SearchEngine::Wikipedia, SearchEngine::Google],
            endpoints: Endpoints {
                duckduckgo: DUCKDUCKGO_URL.to_string(),
                wikipedia: WIKIPEDIA_URL.to_string(),
                google: GOOGLE_URL.to_string(),
            },
            google_api_key: environment.get("GOOGLE_API_KEY").map(str::to_string),
            google_engine_id: environment.get("SEARCH_ENGINE_ID").map(str::to_string),
        })
    }

    /// Restrict the toolkit to `engines`, in that order.
    #[must_use]
    pub fn with_engines(mut self, engines: &[SearchEngine]) -> Self {
        self.engines = engines.to_vec();
        self
    }

    /// Point every engine at `base_url` (paths `/duckduckgo`, `/wiki/`, `/google`).
    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        self.endpoints = Endpoints {
            duckduckgo: format!("{}/duckduckgo", base),
            wikipedia: format!("{}/wiki/", base),
            google: format!("{}/google", base),
        };
        self
    }
}

impl Toolkit for SearchToolkit {
    fn name(&self) -> &'static str {
        "search"
    }

    fn tools(&self) -> Vec<Tool> {
        self.engines
            .iter()
            .map(|engine| {
                let handler = Arc::new(SearchHandler { toolkit: self.clone(), engine: *engine });
                match engine {
                    SearchEngine::DuckDuckGo => Tool::new(
                        "search_duckduckgo",
                        "Search DuckDuckGo for instant answers and related topics.",
                        ToolParameters::new()
                            .add_property("query", "string", "The query to search for", true)
                            .add_property("max_results", "integer", "Maximum results (default 5)", false),
                        handler,
                    ),
                    SearchEngine::Wikipedia => Tool::new(
                        "search_wiki",
                        "Get the summary of the Wikipedia page for an entity.",
                        ToolParameters::new().add_property(
                            "entity",
                            "string",
                            "The entity to look up, e.g. 'CAMEL (multi-agent framework)'",
                            true,
                        ),
                        handler,
                    ),
                    SearchEngine::Google => Tool::new(
                        "search_google",
                        "Search Google and return titles, links and snippets.",
                        ToolParameters::new()
                            .add_property("query", "string", "The query to search for", true)
                            .add_property("num_results", "integer", "Number of results (default 10, max 10)", false),
                        handler,
                    ),
                }
            })
            .collect()
    }
}

struct SearchHandler {
    toolkit: SearchToolkit,
    engine: SearchEngine,
}

impl SearchHandler {
    async fn get_json(&self, url: &str, query: &[(&str, String)], tool: &str) -> Result<(u16, Value)> {
        let response = self
            .toolkit
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| SocietyError::tool(tool, format!("Search request failed: {}", e)))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| SocietyError::tool(tool, format!("Failed to read search response: {}", e)))?;
        let value = serde_json::from_str(&body).unwrap_or(Value::Null);
        Ok((status, value))
    }

    async fn duckduckgo(&self, args: &ToolArguments) -> Result<ToolResult> {
        let query = args.require_string("query")?;
        let max_results = limit(args.get_i64("max_results"), 5, 25);
        let (status, body) = self
            .get_json(
                &self.toolkit.endpoints.duckduckgo,
                &[("q", query.clone()), ("format", "json".to_string()), ("no_html", "1".to_string())],
                &args.tool,
            )
            .await?;
        if status != 200 {
            return Err(SocietyError::tool(&args.tool, format!("DuckDuckGo returned HTTP {}", status)));
        }

        let mut results = Vec::new();
        let abstract_text = body["AbstractText"].as_str().unwrap_or_default();
        if !abstract_text.is_empty() {
            results.push(json!({
                "title": body["Heading"].as_str().unwrap_or(&query),
                "description": abstract_text,
                "url": body["AbstractURL"],
            }));
        }
        collect_topics(&body["RelatedTopics"], &mut results, max_results);
        results.truncate(max_results);

        let results: Vec<Value> = results
            .into_iter()
            .enumerate()
            .map(|(i, mut r)| {
                r["result_id"] = json!(i + 1);
                r
            })
            .collect();

        if results.is_empty() {
            return Ok(ToolResult::success(format!("No results found for '{}'.", query)));
        }
        Ok(ToolResult::success(serde_json::to_string_pretty(&results)?)
            .with_metadata("result_count", results.len().to_string()))
    }

    async fn wikipedia(&self, args: &ToolArguments) -> Result<ToolResult> {
        let entity = args.require_string("entity")?;
        let title = entity.trim().replace(' ', "_");
        let url = format!("{}{}", self.toolkit.endpoints.wikipedia, urlencoding::encode(&title));
        let (status, body) = self.get_json(&url, &[], &args.tool).await?;

        if status == 404 || body["type"].as_str().is_some_and(|t| t.ends_with("not_found")) {
            return Ok(ToolResult::success(format!(
                "There is no page in Wikipedia corresponding to entity {}, please specify another \
                 word to describe the entity to be searched.",
                entity
            )));
        }
        if status != 200 {
            return Err(SocietyError::tool(&args.tool, format!("Wikipedia returned HTTP {}", status)));
        }
        if body["type"].as_str() == Some("disambiguation") {
            return Ok(ToolResult::success(format!(
                "'{}' is ambiguous on Wikipedia; please use a more specific name.",
                entity
            )));
        }
        let extract = body["extract"].as_str().unwrap_or_default();
        Ok(ToolResult::success(extract.to_string())
            .with_metadata("title", body["title"].as_str().unwrap_or(&entity).to_string()))
    }

    async fn google(&self, args: &ToolArguments) -> Result<ToolResult> {
        let query = args.require_string("query")?;
        let (Some(api_key), Some(engine_id)) =
            (&self.toolkit.google_api_key, &self.toolkit.google_engine_id)
        else {
            return Err(SocietyError::tool(
                &args.tool,
                "Google search needs GOOGLE_API_KEY and SEARCH_ENGINE_ID to be set",
            ));
        };
        let num_results = limit(args.get_i64("num_results"), 10, 10);
        let (status, body) = self
            .get_json(
                &self.toolkit.endpoints.google,
                &[
                    ("key", api_key.clone()),
                    ("cx", engine_id.clone()),
                    ("q", query.clone()),
                    ("num", num_results.to_string()),
                ],
                &args.tool,
            )
            .await?;
        if status != 200 {
            let message = body["error"]["message"].as_str().unwrap_or("unknown error");
            return Err(SocietyError::tool(
                &args.tool,
                format!("Google returned HTTP {}: {}", status, message),
            ));
        }

        let results: Vec<Value> = body["items"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .take(num_results)
                    .enumerate()
                    .map(|(i, item)| {
                        json!({
                            "result_id": i + 1,
                            "title": item["title"],
                            "description": item["snippet"],
                            "url": item["link"],
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        if results.is_empty() {
            return Ok(ToolResult::success(format!("No results found for '{}'.", query)));
        }
        Ok(ToolResult::success(serde_json::to_string_pretty(&results)?)
            .with_metadata("result_count", results.len().to_string()))
    }
}

#[async_trait]
impl ToolHandler for SearchHandler {
    async fn execute(&self, args: &ToolArguments) -> Result<ToolResult> {
        debug!(engine = ?self.engine, "Running search");
        match self.engine {
            SearchEngine::DuckDuckGo => self.duckduckgo(args).await,
            SearchEngine::Wikipedia => self.wikipedia(args).await,
            SearchEngine::Google => self.google(args).await,
        }
    }
}

fn limit(requested: Option<i64>, default: usize, max: usize) -> usize {
    requested.map_or(default, |n| usize::try_from(n).unwrap_or(1).clamp(1, max))
}

/// Flatten DuckDuckGo related topics, which may be nested one level in
/// named groups.
fn collect_topics(topics: &Value, out: &mut Vec<Value>, max: usize) {
    for topic in topics.as_array().into_iter().flatten() {
        if out.len() >= max {
            return;
        }
        if let Some(text) = topic["Text"].as_str() {
            let title = text.split(" - ").next().unwrap_or(text);
            out.push(json!({"title": title, "description": text, "url": topic["FirstURL"]}));
        } else if topic["Topics"].is_array() {
            collect_topics(&topic["Topics"], out, max);
        }
    }
}
