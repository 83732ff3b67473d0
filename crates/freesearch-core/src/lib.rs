//! FreeSearch Core Library
//!
//! Template store, prompt building, tool registry and the JSON-RPC
//! transports behind the `freesearch` binary.

pub mod completion;
pub mod config;
pub mod error;
pub mod http;
pub mod prompts;
pub mod rpc;
pub mod stdio;
pub mod tools;

// Re-export key types for convenience
pub use completion::{ChatCompletionClient, CompletionProvider};
pub use config::{CompletionSettings, Config};
pub use error::{CoreError, CoreResult};
pub use prompts::{build_summarize_prompt, TemplateStore};
pub use rpc::{Dispatcher, RpcError, RpcResponse};
pub use tools::{SearchTool, SummarizeOutput, SummarizeTool, Tool, ToolOutput, ToolRegistry};
