//! Error kinds surfaced to tool callers
//!
//! Transports map these onto their own envelopes; [`CoreError::kind`] is the
//! stable machine-readable name they carry along.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Failed to fetch DuckDuckGo results after {attempts} attempts: {last_error}")]
    FetchExhausted { attempts: u32, last_error: String },

    #[error("Failed to load prompts from {source_id}: {message}")]
    TemplateLoadFailed { source_id: String, message: String },

    #[error("Template '{0}' not found")]
    TemplateNotFound(String),

    #[error("Failed to render template '{name}': {message}")]
    RenderError { name: String, message: String },

    #[error("Completion failed: {0}")]
    CompletionFailed(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),
}

impl CoreError {
    /// Stable kind name, identical to the variant name
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::FetchExhausted { .. } => "FetchExhausted",
            CoreError::TemplateLoadFailed { .. } => "TemplateLoadFailed",
            CoreError::TemplateNotFound(_) => "TemplateNotFound",
            CoreError::RenderError { .. } => "RenderError",
            CoreError::CompletionFailed(_) => "CompletionFailed",
            CoreError::InvalidParams(_) => "InvalidParams",
        }
    }
}

impl From<freesearch_tools::WebSearchError> for CoreError {
    fn from(err: freesearch_tools::WebSearchError) -> Self {
        match err {
            freesearch_tools::WebSearchError::Fetch(e) => e.into(),
        }
    }
}

impl From<freesearch_tools::DuckDuckGoError> for CoreError {
    fn from(err: freesearch_tools::DuckDuckGoError) -> Self {
        match err {
            freesearch_tools::DuckDuckGoError::Exhausted {
                attempts,
                last_error,
            } => CoreError::FetchExhausted {
                attempts,
                last_error,
            },
            // Client construction never got as far as an attempt
            other => CoreError::FetchExhausted {
                attempts: 0,
                last_error: other.to_string(),
            },
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
