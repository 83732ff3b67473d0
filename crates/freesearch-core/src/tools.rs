//! Tools exposed to clients: `search` and `summarize`

use async_trait::async_trait;
use freesearch_tools::web_search::DESCRIPTION as SEARCH_DESCRIPTION;
use freesearch_tools::{AnswerSource, NormalizedResult, WebSearch, WebSearchArgs};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use crate::completion::CompletionProvider;
use crate::error::{CoreError, CoreResult};
use crate::prompts::{build_summarize_prompt, TemplateStore};

/// Result of a tool call: the structured payload plus a text rendering for
/// clients that only display text content.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub structured: Value,
    pub text: String,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON schema of the arguments object
    fn input_schema(&self) -> Value;
    async fn call(&self, args: Value) -> CoreResult<ToolOutput>;
}

/// Registry of available tools, listed in name order
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Registry with `search` and `summarize` wired up
    pub fn standard(
        source: Arc<dyn AnswerSource>,
        templates: Arc<TemplateStore>,
        completion: Option<Arc<dyn CompletionProvider>>,
    ) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(SearchTool::new(source)));
        registry.register(Arc::new(SummarizeTool::new(templates, completion)));
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// MCP `tools/list` entries
    pub fn describe(&self) -> Vec<Value> {
        self.tools
            .values()
            .map(|tool| {
                json!({
                    "name": tool.name(),
                    "description": tool.description(),
                    "inputSchema": tool.input_schema(),
                })
            })
            .collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_args<T: for<'de> Deserialize<'de>>(args: Value) -> CoreResult<T> {
    serde_json::from_value(args).map_err(|e| CoreError::InvalidParams(e.to_string()))
}

fn result_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "title": { "type": "string" },
            "url": { "type": "string" },
            "snippet": { "type": "string" }
        },
        "required": ["title", "url", "snippet"]
    })
}

/// Web search via DuckDuckGo, normalized
pub struct SearchTool {
    search: WebSearch,
}

impl SearchTool {
    pub fn new(source: Arc<dyn AnswerSource>) -> Self {
        Self {
            search: WebSearch::new(source),
        }
    }
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        SEARCH_DESCRIPTION
    }

    fn input_schema(&self) -> Value {
        WebSearchArgs::schema()
    }

    async fn call(&self, args: Value) -> CoreResult<ToolOutput> {
        let args: WebSearchArgs = parse_args(args)?;
        info!("search: {}", args.query);

        let output = self.search.search(&args.query).await?;
        let structured = json!(output);
        let text =
            serde_json::to_string_pretty(&structured).unwrap_or_else(|_| structured.to_string());
        Ok(ToolOutput { structured, text })
    }
}

#[derive(Debug, Deserialize)]
struct SummarizeArgs {
    query: String,
    results: Vec<NormalizedResult>,
}

/// Summarize tool payload. `RenderedPrompt` is the degraded mode used when no
/// completion provider is configured: the caller gets the prompt to run itself.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SummarizeOutput {
    Summary {
        summary: String,
    },
    RenderedPrompt {
        #[serde(rename = "renderedPrompt")]
        rendered_prompt: String,
    },
}

impl SummarizeOutput {
    pub fn text(&self) -> String {
        match self {
            SummarizeOutput::Summary { summary } => summary.clone(),
            SummarizeOutput::RenderedPrompt { rendered_prompt } => format!(
                "Please use this prompt with your LLM to generate a summary:\n\n{}",
                rendered_prompt
            ),
        }
    }
}

/// Summarize search results through the prompt template
pub struct SummarizeTool {
    templates: Arc<TemplateStore>,
    completion: Option<Arc<dyn CompletionProvider>>,
}

impl SummarizeTool {
    pub fn new(
        templates: Arc<TemplateStore>,
        completion: Option<Arc<dyn CompletionProvider>>,
    ) -> Self {
        Self {
            templates,
            completion,
        }
    }

    pub async fn summarize(
        &self,
        query: &str,
        results: &[NormalizedResult],
    ) -> CoreResult<SummarizeOutput> {
        let prompt = build_summarize_prompt(&self.templates, query, results)?;

        match &self.completion {
            Some(provider) => Ok(SummarizeOutput::Summary {
                summary: provider.complete(&prompt).await?,
            }),
            None => Ok(SummarizeOutput::RenderedPrompt {
                rendered_prompt: prompt,
            }),
        }
    }
}

#[async_trait]
impl Tool for SummarizeTool {
    fn name(&self) -> &str {
        "summarize"
    }

    fn description(&self) -> &str {
        "Summarize search results using a customizable prompt template"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Original search query" },
                "results": {
                    "type": "array",
                    "description": "Search results to summarize",
                    "items": result_schema()
                }
            },
            "required": ["query", "results"]
        })
    }

    async fn call(&self, args: Value) -> CoreResult<ToolOutput> {
        let args: SummarizeArgs = parse_args(args)?;
        info!(
            "summarize: {} results for {:?}",
            args.results.len(),
            args.query
        );

        let output = self.summarize(&args.query, &args.results).await?;
        Ok(ToolOutput {
            text: output.text(),
            structured: json!(output),
        })
    }
}
