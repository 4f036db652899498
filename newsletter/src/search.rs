use crate::error::SearchError;
use agent::llm::Message;
use agent::tools::{FunctionalTool, ToolCall, ToolDefinition};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const SERPER_URL: &str = "https://google.serper.dev/search";
const DEFAULT_RESULTS: usize = 10;
const NO_RESULTS: &str = "No good Google Search Result was found";

#[derive(Serialize)]
struct SearchRequest<'a> {
    q: &'a str,
    num: usize,
}

/// Google results through the serper.dev api.
pub struct SerperSearch {
    http: reqwest::Client,
    api_key: String,
    results: usize,
}

impl SerperSearch {
    pub fn new(api_key: &str) -> Result<Self, SearchError> {
        Ok(Self {
            http: reqwest::Client::builder().build()?,
            api_key: api_key.to_string(),
            results: DEFAULT_RESULTS,
        })
    }

    pub async fn run(&self, query: &str) -> Result<String, SearchError> {
        tracing::debug!(query, "web search");

        let response = self
            .http
            .post(SERPER_URL)
            .header("X-API-KEY", &self.api_key)
            .json(&SearchRequest {
                q: query,
                num: self.results,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let results: Value = response.json().await?;
        Ok(format_results(&results, self.results))
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn attributes(prefix: &str, value: Option<&Value>, out: &mut Vec<String>) {
    if let Some(Value::Object(attributes)) = value {
        for (key, value) in attributes {
            out.push(format!("{}{}: {}.", prefix, key, as_text(value)));
        }
    }
}

/// Flattens a serper response into text. A direct answer wins outright,
/// otherwise knowledge graph facts are followed by the organic results with
/// their links.
fn format_results(results: &Value, k: usize) -> String {
    if let Some(answer_box) = results.get("answerBox") {
        for field in ["answer", "snippet"] {
            if let Some(text) = answer_box.get(field).and_then(Value::as_str) {
                return text.replace('\n', " ");
            }
        }
        if let Some(Value::Array(highlighted)) = answer_box.get("snippetHighlighted") {
            return highlighted.iter().map(as_text).collect::<Vec<_>>().join(", ");
        }
    }

    let mut snippets = Vec::new();

    if let Some(graph) = results.get("knowledgeGraph") {
        let title = graph.get("title").map(as_text).unwrap_or_default();
        if let Some(kind) = graph.get("type") {
            snippets.push(format!("{}: {}.", title, as_text(kind)));
        }
        if let Some(description) = graph.get("description") {
            snippets.push(as_text(description));
        }
        attributes(&format!("{} ", title), graph.get("attributes"), &mut snippets);
    }

    if let Some(Value::Array(organic)) = results.get("organic") {
        for result in organic.iter().take(k) {
            let title = result.get("title").map(as_text).unwrap_or_default();
            let link = result.get("link").map(as_text).unwrap_or_default();
            if let Some(snippet) = result.get("snippet") {
                snippets.push(format!("{} ({}): {}", title, link, as_text(snippet)));
            } else if !link.is_empty() {
                snippets.push(format!("{} ({})", title, link));
            }
            attributes("", result.get("attributes"), &mut snippets);
        }
    }

    if snippets.is_empty() {
        return NO_RESULTS.to_string();
    }

    snippets.join("\n")
}

#[derive(Deserialize, JsonSchema)]
struct SearchArgs {
    /// what to search the web for
    query: String,
}

pub struct SearchInternet {
    search: SerperSearch,
}

impl SearchInternet {
    pub const NAME: &'static str = "search_internet";

    pub fn new(search: SerperSearch) -> Box<Self> {
        Box::new(Self { search })
    }
}

#[async_trait]
impl FunctionalTool for SearchInternet {
    fn definition(&self) -> agent::Result<ToolDefinition> {
        ToolDefinition::new::<SearchArgs>(
            Self::NAME,
            "useful for when you need to search the internet. Returns the top google results with their links.",
        )
    }

    async fn invoke_fn(&mut self, call: &ToolCall) -> agent::Result<Message> {
        let args: SearchArgs = call.args()?;

        let results = self
            .search
            .run(&args.query)
            .await
            .map_err(|err| agent::Error::tool(Self::NAME, err))?;

        Ok(call.result(results))
    }
}
