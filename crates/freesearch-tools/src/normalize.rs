//! Normalization of Instant Answer payloads into a flat result list
//!
//! Output order follows source-field priority, not relevance: instant answer,
//! abstract, definition, flat results, then related topics (direct topics and
//! grouped sub-topics in list order). Callers treat the first entries as the
//! most authoritative.

use once_cell::sync::Lazy;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::answer::{non_empty, RawAnswer};

static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid tag pattern"));

/// Canonical search result record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct NormalizedResult {
    /// Display title
    pub title: String,
    /// Link to the source, empty only when the source had none
    pub url: String,
    /// Plain-text snippet
    pub snippet: String,
}

/// Output of the search tool
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct SearchOutput {
    pub results: Vec<NormalizedResult>,
}

impl NormalizedResult {
    fn new(title: impl Into<String>, url: impl Into<String>, snippet: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            snippet: snippet.into(),
        }
    }
}

/// Remove anything that looks like an HTML tag
pub fn strip_html(text: &str) -> String {
    HTML_TAG.replace_all(text, "").into_owned()
}

/// Stripped secondary text, falling back to the display text when stripping
/// leaves nothing behind. `text` is known to be non-empty.
fn clean_snippet(secondary: Option<&str>, text: &str) -> String {
    let stripped = strip_html(secondary.unwrap_or(text));
    if !stripped.is_empty() {
        return stripped;
    }
    let stripped_text = strip_html(text);
    if stripped_text.is_empty() {
        text.to_string()
    } else {
        stripped_text
    }
}

/// Convert a raw answer into the ordered result list. Never fails; absent
/// or empty fields contribute nothing.
pub fn normalize(raw: &RawAnswer) -> Vec<NormalizedResult> {
    let mut results = Vec::new();
    let heading = non_empty(&raw.heading);

    if let (Some(answer), Some(_)) = (non_empty(&raw.answer), non_empty(&raw.answer_type)) {
        results.push(NormalizedResult::new(
            heading.unwrap_or("Instant Answer"),
            non_empty(&raw.abstract_url).unwrap_or(""),
            answer,
        ));
    }

    if let (Some(abstract_text), Some(url)) =
        (non_empty(&raw.abstract_text), non_empty(&raw.abstract_url))
    {
        results.push(NormalizedResult::new(
            heading.unwrap_or("Summary"),
            url,
            abstract_text,
        ));
    }

    if let (Some(definition), Some(url)) =
        (non_empty(&raw.definition), non_empty(&raw.definition_url))
    {
        results.push(NormalizedResult::new("Definition", url, definition));
    }

    for entry in &raw.results {
        if let (Some(text), Some(url)) = (non_empty(&entry.text), non_empty(&entry.first_url)) {
            let snippet = non_empty(&entry.result).unwrap_or(text);
            results.push(NormalizedResult::new(text, url, snippet));
        }
    }

    for topic in &raw.related_topics {
        if let (Some(text), Some(url)) = (non_empty(&topic.text), non_empty(&topic.first_url)) {
            results.push(NormalizedResult::new(
                text,
                url,
                clean_snippet(non_empty(&topic.result), text),
            ));
        }

        // Not an else-branch: an entry can carry both shapes.
        if let Some(group) = non_empty(&topic.name) {
            for sub in &topic.topics {
                if let (Some(text), Some(url)) = (non_empty(&sub.text), non_empty(&sub.first_url)) {
                    results.push(NormalizedResult::new(
                        format!("{}: {}", group, text),
                        url,
                        clean_snippet(non_empty(&sub.result), text),
                    ));
                }
            }
        }
    }

    results
}
