//! JSON-RPC 2.0 dispatch shared by the stdio and HTTP transports
//!
//! Speaks the subset of MCP a tool server needs (`initialize`, `ping`,
//! `tools/list`, `tools/call`), plus direct `search` / `summarize` calls and a
//! `prompts/reload` admin method.

use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::prompts::{reload_off_runtime, TemplateStore};
use crate::tools::ToolRegistry;

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "freesearch-mcpserver";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

impl From<&CoreError> for RpcError {
    fn from(err: &CoreError) -> Self {
        let code = match err {
            CoreError::InvalidParams(_) => INVALID_PARAMS,
            CoreError::FetchExhausted { .. } => -32001,
            CoreError::TemplateLoadFailed { .. } => -32002,
            CoreError::TemplateNotFound(_) => -32003,
            CoreError::RenderError { .. } => -32004,
            CoreError::CompletionFailed(_) => -32005,
        };
        Self {
            code,
            message: err.to_string(),
            data: Some(json!({ "kind": err.kind() })),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(error),
        }
    }

    /// True when the envelope itself was unusable (bad JSON or bad shape)
    pub fn is_envelope_error(&self) -> bool {
        matches!(
            self.error,
            Some(RpcError {
                code: PARSE_ERROR | INVALID_REQUEST,
                ..
            })
        )
    }
}

/// A validated incoming message
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Request {
        id: Value,
        method: String,
        params: Value,
    },
    Notification {
        method: String,
        params: Value,
    },
}

impl Incoming {
    /// Validate a JSON-RPC 2.0 envelope
    pub fn parse(value: Value) -> Result<Self, RpcResponse> {
        let id = value.get("id").cloned();
        let invalid = |id: Option<Value>| {
            RpcResponse::failure(
                id.unwrap_or(Value::Null),
                RpcError::new(INVALID_REQUEST, "Invalid Request"),
            )
        };

        let Value::Object(mut envelope) = value else {
            return Err(invalid(None));
        };
        if envelope.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
            return Err(invalid(id));
        }
        let method = match envelope.remove("method") {
            Some(Value::String(method)) => method,
            _ => return Err(invalid(id)),
        };
        if matches!(id, Some(Value::Array(_) | Value::Object(_) | Value::Bool(_))) {
            return Err(invalid(None));
        }
        let params = envelope
            .remove("params")
            .unwrap_or_else(|| Value::Object(Default::default()));

        Ok(match id {
            Some(id) => Incoming::Request { id, method, params },
            None => Incoming::Notification { method, params },
        })
    }
}

/// Routes JSON-RPC methods onto the tool registry and template store
pub struct Dispatcher {
    tools: ToolRegistry,
    templates: Arc<TemplateStore>,
}

impl Dispatcher {
    pub fn new(tools: ToolRegistry, templates: Arc<TemplateStore>) -> Self {
        Self { tools, templates }
    }

    /// Handle one raw message. `None` means nothing should be sent back.
    pub async fn handle_text(&self, text: &str) -> Option<RpcResponse> {
        match serde_json::from_str::<Value>(text) {
            Ok(value) => self.handle_value(value).await,
            Err(e) => {
                warn!("Unparseable JSON-RPC message: {}", e);
                Some(RpcResponse::failure(
                    Value::Null,
                    RpcError::new(PARSE_ERROR, "Parse error"),
                ))
            }
        }
    }

    pub async fn handle_value(&self, value: Value) -> Option<RpcResponse> {
        match Incoming::parse(value) {
            Err(response) => Some(response),
            Ok(Incoming::Request { id, method, params }) => {
                debug!("-> {} (id {})", method, id);
                Some(match self.dispatch(&method, params).await {
                    Ok(result) => RpcResponse::success(id, result),
                    Err(error) => {
                        warn!("{} failed: {}", method, error.message);
                        RpcResponse::failure(id, error)
                    }
                })
            }
            Ok(Incoming::Notification { method, params }) => {
                if !method.starts_with("notifications/") {
                    if let Err(error) = self.dispatch(&method, params).await {
                        debug!("Notification {} failed: {}", method, error.message);
                    }
                }
                None
            }
        }
    }

    async fn dispatch(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        match method {
            "initialize" => Ok(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": { "listChanged": false } },
                "serverInfo": { "name": SERVER_NAME, "version": env!("CARGO_PKG_VERSION") }
            })),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": self.tools.describe() })),
            "tools/call" => self.call_tool(params).await,
            "search" | "summarize" => {
                let tool = self
                    .tools
                    .get(method)
                    .ok_or_else(|| RpcError::new(METHOD_NOT_FOUND, "Method not found"))?;
                let output = tool.call(params).await.map_err(|e| RpcError::from(&e))?;
                Ok(output.structured)
            }
            "prompts/reload" => {
                reload_off_runtime(self.templates.clone())
                    .await
                    .map_err(|e| RpcError::from(&e))?;
                info!("Templates reloaded over RPC");
                Ok(json!({ "templates": self.templates.names() }))
            }
            _ => Err(RpcError::new(METHOD_NOT_FOUND, "Method not found")),
        }
    }

    async fn call_tool(&self, params: Value) -> Result<Value, RpcError> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::new(INVALID_PARAMS, "tools/call requires a tool name"))?;
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| RpcError::new(INVALID_PARAMS, format!("Unknown tool: {}", name)))?;
        let arguments = params
            .get("arguments")
            .cloned()
            .unwrap_or_else(|| json!({}));

        let output = tool.call(arguments).await.map_err(|e| RpcError::from(&e))?;
        Ok(json!({
            "content": [{ "type": "text", "text": output.text }],
            "structuredContent": output.structured,
            "isError": false
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use freesearch_tools::{AnswerSource, DuckDuckGoError, RawAnswer};

    struct FixedSource;

    #[async_trait]
    impl AnswerSource for FixedSource {
        async fn fetch(&self, query: &str) -> Result<RawAnswer, DuckDuckGoError> {
            if query == "down" {
                return Err(DuckDuckGoError::Exhausted {
                    attempts: 3,
                    last_error: "Network error".to_string(),
                });
            }
            Ok(RawAnswer::from_value(json!({
                "Definition": "A small domesticated carnivore.",
                "DefinitionURL": "https://dict.example/cat"
            })))
        }
    }

    fn dispatcher() -> Dispatcher {
        let templates = Arc::new(TemplateStore::new(None).unwrap());
        let tools = ToolRegistry::standard(Arc::new(FixedSource), templates.clone(), None);
        Dispatcher::new(tools, templates)
    }

    async fn request(method: &str, params: Value) -> RpcResponse {
        dispatcher()
            .handle_value(json!({"jsonrpc": "2.0", "id": 1, "method": method, "params": params}))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_initialize() {
        let response = request("initialize", json!({})).await;
        let result = response.result.unwrap();
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(result["serverInfo"]["name"], SERVER_NAME);
    }

    #[tokio::test]
    async fn test_tools_list() {
        let response = request("tools/list", json!({})).await;
        let tools = response.result.unwrap()["tools"].clone();
        assert_eq!(tools[0]["name"], "search");
        assert_eq!(tools[1]["name"], "summarize");
    }

    #[tokio::test]
    async fn test_tools_call_search() {
        let response = request(
            "tools/call",
            json!({"name": "search", "arguments": {"query": "cat"}}),
        )
        .await;
        let result = response.result.unwrap();
        assert_eq!(result["content"][0]["type"], "text");
        assert_eq!(result["structuredContent"]["results"][0]["title"], "Definition");
        assert_eq!(result["isError"], false);
    }

    #[tokio::test]
    async fn test_tools_call_summarize_fallback_text() {
        let response = request(
            "tools/call",
            json!({"name": "summarize", "arguments": {
                "query": "cats",
                "results": [{"title": "A", "url": "", "snippet": "B"}]
            }}),
        )
        .await;
        let result = response.result.unwrap();
        let text = result["content"][0]["text"].as_str().unwrap();
        assert!(text.starts_with("Please use this prompt with your LLM"));
        assert!(result["structuredContent"]["renderedPrompt"]
            .as_str()
            .unwrap()
            .contains("cats"));
    }

    #[tokio::test]
    async fn test_direct_search_method() {
        let response = request("search", json!({"query": "cat"})).await;
        assert_eq!(
            response.result.unwrap()["results"][0]["url"],
            "https://dict.example/cat"
        );
    }

    #[tokio::test]
    async fn test_core_errors_carry_kind() {
        let response = request("search", json!({"query": "down"})).await;
        let error = response.error.unwrap();
        assert_eq!(error.code, -32001);
        assert_eq!(error.data.unwrap()["kind"], "FetchExhausted");
        assert!(error.message.contains("after 3 attempts: Network error"));

        let response = request("summarize", json!({"query": "q"})).await;
        assert_eq!(response.error.unwrap().code, INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_unknown_tool_and_method() {
        let response = request("tools/call", json!({"name": "nope"})).await;
        assert_eq!(response.error.unwrap().code, INVALID_PARAMS);

        let response = request("nope", json!({})).await;
        assert_eq!(response.error.unwrap().code, METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_prompts_reload() {
        let response = request("prompts/reload", json!({})).await;
        let templates = response.result.unwrap()["templates"].clone();
        assert_eq!(templates, json!(["summarize"]));
    }

    #[tokio::test]
    async fn test_notifications_get_no_response() {
        let d = dispatcher();
        assert!(d
            .handle_value(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
            .await
            .is_none());
        assert!(d
            .handle_value(json!({"jsonrpc": "2.0", "method": "ping"}))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_envelope_errors() {
        let d = dispatcher();

        let parse = d.handle_text("{not json").await.unwrap();
        assert_eq!(parse.error.as_ref().unwrap().code, PARSE_ERROR);
        assert_eq!(parse.id, Value::Null);
        assert!(parse.is_envelope_error());

        let no_version = d
            .handle_value(json!({"id": 7, "method": "ping"}))
            .await
            .unwrap();
        assert_eq!(no_version.error.as_ref().unwrap().code, INVALID_REQUEST);
        assert_eq!(no_version.id, json!(7));

        let not_object = d.handle_value(json!([1, 2])).await.unwrap();
        assert!(not_object.is_envelope_error());
    }

    #[test]
    fn test_response_serialization_omits_empty_fields() {
        let ok = serde_json::to_value(RpcResponse::success(json!(1), json!({}))).unwrap();
        assert!(ok.get("error").is_none());
        assert_eq!(ok["jsonrpc"], "2.0");

        let err = serde_json::to_value(RpcResponse::failure(
            json!("a"),
            RpcError::new(METHOD_NOT_FOUND, "Method not found"),
        ))
        .unwrap();
        assert!(err.get("result").is_none());
        assert!(err["error"].get("data").is_none());
    }
}
