//! Summarization prompt builder

use freesearch_tools::NormalizedResult;
use serde_json::json;

use super::store::TemplateStore;
use crate::error::CoreResult;

pub const SUMMARIZE_TEMPLATE: &str = "summarize";

/// Render the `summarize` template for `query` and `results`.
/// Template lookup and render failures pass through unchanged.
pub fn build_summarize_prompt(
    store: &TemplateStore,
    query: &str,
    results: &[NormalizedResult],
) -> CoreResult<String> {
    store.render(
        SUMMARIZE_TEMPLATE,
        &json!({ "query": query, "results": results }),
    )
}
