//! FreeSearch Tools - web search over the DuckDuckGo Instant Answer API
//!
//! Modules:
//! - answer: loosely typed Instant Answer response model
//! - duckduckgo: API client with bounded retry
//! - normalize: raw answer -> ordered result list
//! - web_search: search entry point (fetch + normalize), also a rig tool

pub mod answer;
pub mod duckduckgo;
pub mod normalize;
pub mod web_search;

pub use answer::{RawAnswer, RelatedTopic, TopicEntry};
pub use duckduckgo::{AnswerSource, AttemptError, DuckDuckGoClient, DuckDuckGoError, RetryPolicy};
pub use normalize::{normalize, strip_html, NormalizedResult, SearchOutput};
pub use web_search::{WebSearch, WebSearchArgs, WebSearchError};
