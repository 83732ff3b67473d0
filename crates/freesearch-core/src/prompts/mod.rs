//! Prompt templates
//!
//! - template: logic-less template compiler/renderer
//! - store: default + override template sets, hot reload
//! - summarize: prompt builder for the summarize tool

pub mod store;
pub mod summarize;
pub mod template;

pub use store::{reload_off_runtime, PromptTemplateSet, TemplateStore};
pub use summarize::{build_summarize_prompt, SUMMARIZE_TEMPLATE};
pub use template::{CompiledTemplate, TemplateError};
