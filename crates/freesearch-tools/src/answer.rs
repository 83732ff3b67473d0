//! DuckDuckGo Instant Answer response model
//!
//! Nothing in the upstream payload is guaranteed: any field may be missing,
//! empty, or of an unexpected JSON type. Every field here is optional and read
//! leniently, so a wrong-typed field is simply absent instead of failing the
//! whole response.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Raw answer object as returned by the Instant Answer API.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawAnswer {
    #[serde(rename = "Abstract", deserialize_with = "lenient_string")]
    pub abstract_text: Option<String>,
    #[serde(rename = "AbstractText", deserialize_with = "lenient_string")]
    pub abstract_plain: Option<String>,
    #[serde(rename = "AbstractSource", deserialize_with = "lenient_string")]
    pub abstract_source: Option<String>,
    #[serde(rename = "AbstractURL", deserialize_with = "lenient_string")]
    pub abstract_url: Option<String>,
    /// Path of the abstract's image, relative to duckduckgo.com
    #[serde(rename = "Image", deserialize_with = "lenient_string")]
    pub image: Option<String>,
    #[serde(rename = "Heading", deserialize_with = "lenient_string")]
    pub heading: Option<String>,
    #[serde(rename = "Answer", deserialize_with = "lenient_string")]
    pub answer: Option<String>,
    #[serde(rename = "AnswerType", deserialize_with = "lenient_string")]
    pub answer_type: Option<String>,
    #[serde(rename = "Definition", deserialize_with = "lenient_string")]
    pub definition: Option<String>,
    #[serde(rename = "DefinitionSource", deserialize_with = "lenient_string")]
    pub definition_source: Option<String>,
    #[serde(rename = "DefinitionURL", deserialize_with = "lenient_string")]
    pub definition_url: Option<String>,
    #[serde(rename = "Results", deserialize_with = "lenient_list")]
    pub results: Vec<TopicEntry>,
    #[serde(rename = "RelatedTopics", deserialize_with = "lenient_list")]
    pub related_topics: Vec<RelatedTopic>,
    #[serde(rename = "Type", deserialize_with = "lenient_string")]
    pub answer_kind: Option<String>,
}

/// A flat result, or a sub-topic inside a related-topic group
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TopicEntry {
    /// Secondary text, usually an HTML fragment with the link and description
    #[serde(rename = "Result", deserialize_with = "lenient_string")]
    pub result: Option<String>,
    #[serde(rename = "FirstURL", deserialize_with = "lenient_string")]
    pub first_url: Option<String>,
    #[serde(rename = "Text", deserialize_with = "lenient_string")]
    pub text: Option<String>,
}

/// Entry of `RelatedTopics`: either a direct topic, a named group of
/// sub-topics, or (rarely) both at once.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RelatedTopic {
    #[serde(rename = "Result", deserialize_with = "lenient_string")]
    pub result: Option<String>,
    #[serde(rename = "FirstURL", deserialize_with = "lenient_string")]
    pub first_url: Option<String>,
    #[serde(rename = "Text", deserialize_with = "lenient_string")]
    pub text: Option<String>,
    /// Group name, e.g. "Places" or "Film and television"
    #[serde(rename = "Name", deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(rename = "Topics", deserialize_with = "lenient_list")]
    pub topics: Vec<TopicEntry>,
}

impl RawAnswer {
    /// Build from an arbitrary JSON body. Anything that isn't an object
    /// yields an empty answer.
    pub fn from_value(value: Value) -> Self {
        serde_json::from_value(value).unwrap_or_default()
    }
}

/// Returns the string only when it is present and non-empty
pub(crate) fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        _ => None,
    })
}

fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        _ => Vec::new(),
    })
}
