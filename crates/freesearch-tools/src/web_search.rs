//! Search entry point: fetch + normalize, usable directly or as a rig tool
//!
//! [`WebSearch`] is what embedders hold on to. The JSON-RPC `search` tool in
//! freesearch-core calls [`WebSearch::search`]; rig agents get the same
//! behavior through the [`Tool`] impl.

use crate::duckduckgo::{AnswerSource, DuckDuckGoError};
use crate::normalize::{normalize, SearchOutput};
use rig::completion::ToolDefinition;
use rig::tool::Tool;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

pub const DESCRIPTION: &str = "Free web search via DuckDuckGo instant answers. \
    Returns results with title, url and snippet, most authoritative first.";

#[derive(Debug, Error)]
pub enum WebSearchError {
    #[error(transparent)]
    Fetch(#[from] DuckDuckGoError),
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct WebSearchArgs {
    /// Search query
    pub query: String,
}

impl WebSearchArgs {
    /// JSON schema of the argument object, shared by every tool surface
    pub fn schema() -> Value {
        let mut schema = schemars::schema_for!(WebSearchArgs).to_value();
        if let Some(obj) = schema.as_object_mut() {
            obj.remove("$schema");
            obj.remove("title");
        }
        schema
    }
}

#[derive(Clone)]
pub struct WebSearch {
    source: Arc<dyn AnswerSource>,
}

impl WebSearch {
    pub fn new(source: Arc<dyn AnswerSource>) -> Self {
        Self { source }
    }

    pub async fn search(&self, query: &str) -> Result<SearchOutput, WebSearchError> {
        let raw = self.source.fetch(query).await?;
        let results = normalize(&raw);
        info!("search: {} results for {:?}", results.len(), query);
        Ok(SearchOutput { results })
    }
}

impl Tool for WebSearch {
    const NAME: &'static str = "web_search";
    type Error = WebSearchError;
    type Args = WebSearchArgs;
    type Output = SearchOutput;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: DESCRIPTION.to_string(),
            parameters: WebSearchArgs::schema(),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        self.search(&args.query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answer::RawAnswer;
    use async_trait::async_trait;

    struct FixedSource(serde_json::Value);

    #[async_trait]
    impl AnswerSource for FixedSource {
        async fn fetch(&self, _query: &str) -> Result<RawAnswer, DuckDuckGoError> {
            Ok(RawAnswer::from_value(self.0.clone()))
        }
    }

    struct FailingSource;

    #[async_trait]
    impl AnswerSource for FailingSource {
        async fn fetch(&self, _query: &str) -> Result<RawAnswer, DuckDuckGoError> {
            Err(DuckDuckGoError::Exhausted {
                attempts: 3,
                last_error: "HTTP error! status: 500".to_string(),
            })
        }
    }

    #[test]
    fn test_args_schema() {
        let schema = WebSearchArgs::schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"][0], "query");
        assert_eq!(schema["properties"]["query"]["type"], "string");
        assert!(schema.get("$schema").is_none());
    }

    #[tokio::test]
    async fn test_definition() {
        let tool = WebSearch::new(Arc::new(FailingSource));
        let def = tool.definition(String::new()).await;
        assert_eq!(def.name, "web_search");
        assert_eq!(def.parameters, WebSearchArgs::schema());
    }

    #[tokio::test]
    async fn test_rig_call_matches_search() {
        let tool = WebSearch::new(Arc::new(FixedSource(serde_json::json!({
            "Definition": "A small cat.",
            "DefinitionURL": "https://dict.example/kitten"
        }))));

        let direct = tool.search("kitten").await.unwrap();
        let via_rig = tool
            .call(WebSearchArgs {
                query: "kitten".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(direct.results, via_rig.results);
        assert_eq!(direct.results.len(), 1);
        assert_eq!(direct.results[0].title, "Definition");
    }

    #[tokio::test]
    async fn test_failure_keeps_fetch_error() {
        let tool = WebSearch::new(Arc::new(FailingSource));
        let err = tool.search("x").await.unwrap_err();
        assert!(matches!(
            err,
            WebSearchError::Fetch(DuckDuckGoError::Exhausted { attempts: 3, .. })
        ));
        assert!(err.to_string().contains("after 3 attempts"));
    }
}
