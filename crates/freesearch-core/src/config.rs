use anyhow::{Context, Result};
use std::path::PathBuf;

use freesearch_tools::duckduckgo::DDG_API_BASE;

#[derive(Debug, Clone)]
pub struct Config {
    /// Instant Answer API base URL
    pub ddg_api_url: String,

    /// Optional YAML file whose templates override the bundled ones
    pub prompt_file: Option<PathBuf>,

    pub http_port: u16,

    // OpenAI-compatible completion endpoint for the summarize tool.
    // Without url + model the tool falls back to returning the prompt.
    pub completion_api_url: Option<String>,
    pub completion_api_key: Option<String>,
    pub completion_model: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            ddg_api_url: std::env::var("DDG_API_URL").unwrap_or_else(|_| DDG_API_BASE.to_string()),

            prompt_file: non_empty_var("PROMPT_FILE").map(PathBuf::from),

            http_port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .context("PORT must be a valid port number")?,

            completion_api_url: non_empty_var("COMPLETION_API_URL"),
            completion_api_key: non_empty_var("COMPLETION_API_KEY"),
            completion_model: non_empty_var("COMPLETION_MODEL"),
        })
    }

    /// Completion endpoint settings, if fully configured
    pub fn completion(&self) -> Option<CompletionSettings> {
        match (&self.completion_api_url, &self.completion_model) {
            (Some(api_url), Some(model)) => Some(CompletionSettings {
                api_url: api_url.clone(),
                api_key: self.completion_api_key.clone(),
                model: model.clone(),
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionSettings {
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
