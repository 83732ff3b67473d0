//! Template store: load, merge, compile, render
//!
//! The default set ships inside the binary. An optional override file (YAML,
//! flat `name: body` map) is merged over it per key. Loads are all-or-nothing:
//! a set is parsed and compiled on the side and only swapped in once every
//! entry compiled, so a failed reload leaves the previous templates live.

use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

use super::template::CompiledTemplate;
use crate::error::{CoreError, CoreResult};

pub const DEFAULT_SOURCE_ID: &str = "builtin:prompts.yml";
const DEFAULT_PROMPTS: &str = include_str!("../../config/prompts.yml");

/// Template name -> raw template source
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptTemplateSet(BTreeMap<String, String>);

impl PromptTemplateSet {
    /// Parse a YAML document of `name: body` pairs
    pub fn parse(source_id: &str, text: &str) -> CoreResult<Self> {
        let blank = text
            .lines()
            .map(str::trim)
            .all(|line| line.is_empty() || line.starts_with('#'));
        if blank {
            return Ok(Self::default());
        }

        let entries: Option<BTreeMap<String, String>> =
            serde_yaml::from_str(text).map_err(|e| CoreError::TemplateLoadFailed {
                source_id: source_id.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self(entries.unwrap_or_default()))
    }

    /// Overlay `overrides`; its entries win on key collisions
    pub fn merge(mut self, overrides: PromptTemplateSet) -> Self {
        self.0.extend(overrides.0);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PromptTemplateSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

pub type CompiledSet = HashMap<String, CompiledTemplate>;

/// Compile every entry. The first failure rejects the whole set.
pub fn compile(set: &PromptTemplateSet) -> CoreResult<CompiledSet> {
    set.0
        .iter()
        .map(|(name, source)| {
            CompiledTemplate::compile(source)
                .map(|compiled| (name.clone(), compiled))
                .map_err(|e| CoreError::TemplateLoadFailed {
                    source_id: format!("template '{}'", name),
                    message: e.to_string(),
                })
        })
        .collect()
}

/// Process-wide template state, shared by handle (`Arc<TemplateStore>`)
pub struct TemplateStore {
    default_id: String,
    default_text: String,
    override_path: RwLock<Option<PathBuf>>,
    compiled: RwLock<Arc<CompiledSet>>,
}

impl TemplateStore {
    /// Store with the bundled defaults and an optional override file
    pub fn new(override_path: Option<PathBuf>) -> CoreResult<Self> {
        Self::with_defaults(DEFAULT_SOURCE_ID, DEFAULT_PROMPTS, override_path)
    }

    /// Store whose default set comes from `default_text` instead of the bundled file
    pub fn with_defaults(
        default_id: impl Into<String>,
        default_text: impl Into<String>,
        override_path: Option<PathBuf>,
    ) -> CoreResult<Self> {
        let store = Self {
            default_id: default_id.into(),
            default_text: default_text.into(),
            override_path: RwLock::new(None),
            compiled: RwLock::new(Arc::new(CompiledSet::new())),
        };

        let compiled = compile(&store.load(override_path.as_deref())?)?;
        *write(&store.compiled) = Arc::new(compiled);
        *write(&store.override_path) = override_path;
        Ok(store)
    }

    /// Read the default set, then merge the override file over it if one
    /// exists at `override_path`.
    pub fn load(&self, override_path: Option<&Path>) -> CoreResult<PromptTemplateSet> {
        let mut set = PromptTemplateSet::parse(&self.default_id, &self.default_text)?;

        if let Some(path) = override_path {
            if path.exists() {
                let source_id = path.display().to_string();
                let text =
                    std::fs::read_to_string(path).map_err(|e| CoreError::TemplateLoadFailed {
                        source_id: source_id.clone(),
                        message: e.to_string(),
                    })?;
                let overrides = PromptTemplateSet::parse(&source_id, &text)?;
                debug!("Merging {} templates from {}", overrides.len(), source_id);
                set = set.merge(overrides);
            } else {
                warn!(
                    "Prompt override file {} not found, using defaults",
                    path.display()
                );
            }
        }

        Ok(set)
    }

    /// Render template `name` with `context`
    pub fn render(&self, name: &str, context: &Value) -> CoreResult<String> {
        let compiled = Arc::clone(&read(&self.compiled));
        let template = compiled
            .get(name)
            .ok_or_else(|| CoreError::TemplateNotFound(name.to_string()))?;

        template
            .render(context)
            .map_err(|e| CoreError::RenderError {
                name: name.to_string(),
                message: e.to_string(),
            })
    }

    /// Switch to a new override file and rebuild everything from it.
    /// On failure both the previous path and templates stay in place.
    pub fn set_override(&self, path: impl Into<PathBuf>) -> CoreResult<()> {
        let path = path.into();
        let mut current_path = write(&self.override_path);
        let compiled = compile(&self.load(Some(&path))?)?;

        info!(
            "Loaded {} prompt templates (override: {})",
            compiled.len(),
            path.display()
        );
        *write(&self.compiled) = Arc::new(compiled);
        *current_path = Some(path);
        Ok(())
    }

    /// Re-read the default and current override sources
    pub fn reload(&self) -> CoreResult<()> {
        let current_path = write(&self.override_path);
        let compiled = compile(&self.load(current_path.as_deref())?)?;

        info!(
            "Reloaded {} prompt templates (override: {})",
            compiled.len(),
            current_path
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "none".to_string())
        );
        *write(&self.compiled) = Arc::new(compiled);
        Ok(())
    }

    /// Names of the live templates, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = read(&self.compiled).keys().cloned().collect();
        names.sort();
        names
    }

    pub fn override_path(&self) -> Option<PathBuf> {
        read(&self.override_path).clone()
    }
}

/// Run [`TemplateStore::reload`] on the blocking pool; it reads files.
pub async fn reload_off_runtime(store: Arc<TemplateStore>) -> CoreResult<()> {
    tokio::task::spawn_blocking(move || store.reload())
        .await
        .map_err(|e| CoreError::TemplateLoadFailed {
            source_id: "reload task".to_string(),
            message: e.to_string(),
        })?
}

impl std::fmt::Debug for TemplateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateStore")
            .field("default_id", &self.default_id)
            .field("override_path", &self.override_path())
            .field("templates", &self.names())
            .finish()
    }
}

// A poisoned lock only means another thread panicked mid-swap; the stored
// value is always a complete set, so keep using it.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_bundled_defaults_have_summarize() {
        let store = TemplateStore::new(None).unwrap();
        assert!(store.names().contains(&"summarize".to_string()));
        assert_eq!(store.override_path(), None);
    }

    #[test]
    fn test_default_summarize_renders_query_and_results() {
        let store = TemplateStore::new(None).unwrap();
        let out = store
            .render(
                "summarize",
                &json!({"query": "cats", "results": [{"title": "A", "snippet": "B"}]}),
            )
            .unwrap();

        assert!(out.contains("summarize the following search results for the query"));
        assert!(out.contains("cats"));
        assert!(out.contains("- A"));
        assert!(out.contains("B"));
    }

    #[test]
    fn test_query_is_escaped() {
        let store = TemplateStore::new(None).unwrap();
        let out = store
            .render("summarize", &json!({"query": "a&b <c> \"d\"", "results": []}))
            .unwrap();

        assert!(out.contains("a&amp;b &lt;c&gt; &quot;d&quot;"));
        assert!(!out.contains("<c>"));
    }

    #[test]
    fn test_unknown_template() {
        let store = TemplateStore::new(None).unwrap();
        let err = store.render("nope", &json!({})).unwrap_err();
        assert!(matches!(err, CoreError::TemplateNotFound(ref name) if name == "nope"));
    }

    #[test]
    fn test_override_merges_per_key() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            &dir,
            "custom.yml",
            "summarize: \"CUSTOM {{query}}\"\nbrief: \"{{#each results}}{{title}};{{/each}}\"\n",
        );

        let store = TemplateStore::new(Some(path.clone())).unwrap();
        assert_eq!(store.names(), vec!["brief".to_string(), "summarize".to_string()]);
        assert_eq!(
            store.render("summarize", &json!({"query": "q"})).unwrap(),
            "CUSTOM q"
        );

        let set = store.load(Some(&path)).unwrap();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_set_override_applies_without_restart() {
        let store = TemplateStore::new(None).unwrap();
        let context = json!({"query": "cats", "results": []});
        assert!(!store.render("summarize", &context).unwrap().starts_with("OVERRIDE"));

        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "p.yml", "summarize: \"OVERRIDE {{query}}\"\n");
        store.set_override(&path).unwrap();

        assert_eq!(store.render("summarize", &context).unwrap(), "OVERRIDE cats");
        assert_eq!(store.override_path(), Some(path));
    }

    #[test]
    fn test_reload_picks_up_edits() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "p.yml", "summarize: \"v1\"\n");
        let store = TemplateStore::new(Some(path.clone())).unwrap();
        assert_eq!(store.render("summarize", &json!({})).unwrap(), "v1");

        write_file(&dir, "p.yml", "summarize: \"v2\"\n");
        tokio_test::assert_ok!(store.reload());
        assert_eq!(store.render("summarize", &json!({})).unwrap(), "v2");
    }

    #[tokio::test]
    async fn test_reload_off_runtime() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "p.yml", "summarize: \"before\"\n");
        let store = Arc::new(TemplateStore::new(Some(path)).unwrap());

        write_file(&dir, "p.yml", "summarize: \"after\"\n");
        tokio_test::assert_ok!(reload_off_runtime(store.clone()).await);
        assert_eq!(store.render("summarize", &json!({})).unwrap(), "after");

        write_file(&dir, "p.yml", "summarize: \"{{#each x}}\"\n");
        let err = tokio_test::assert_err!(reload_off_runtime(store.clone()).await);
        assert_eq!(err.kind(), "TemplateLoadFailed");
        assert_eq!(store.render("summarize", &json!({})).unwrap(), "after");
    }

    #[test]
    fn test_failed_reload_keeps_previous_templates() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "p.yml", "summarize: \"good {{query}}\"\n");
        let store = TemplateStore::new(Some(path.clone())).unwrap();

        write_file(&dir, "p.yml", "summarize: [not, a, string\n");
        let err = tokio_test::assert_err!(store.reload());
        assert_eq!(err.kind(), "TemplateLoadFailed");
        assert!(err.to_string().contains("p.yml"));

        assert_eq!(
            store.render("summarize", &json!({"query": "q"})).unwrap(),
            "good q"
        );
    }

    #[test]
    fn test_compile_failure_is_all_or_nothing() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            &dir,
            "p.yml",
            "summarize: \"fine\"\nbroken: \"{{#each results}}never closed\"\n",
        );

        let store = TemplateStore::new(None).unwrap();
        let err = store.set_override(&path).unwrap_err();
        assert_eq!(err.kind(), "TemplateLoadFailed");
        assert!(err.to_string().contains("broken"));

        assert_eq!(store.override_path(), None);
        assert!(!store.names().contains(&"broken".to_string()));
        assert_ne!(store.render("summarize", &json!({})).unwrap(), "fine");
    }

    #[test]
    fn test_missing_override_file_is_ignored() {
        let dir = TempDir::new().unwrap();
        let store = TemplateStore::new(Some(dir.path().join("absent.yml"))).unwrap();
        assert!(store.names().contains(&"summarize".to_string()));
    }

    #[test]
    fn test_render_error_kind() {
        let store =
            TemplateStore::with_defaults("test", "list: \"{{#each query}}x{{/each}}\"", None)
                .unwrap();
        let err = store.render("list", &json!({"query": "text"})).unwrap_err();
        assert_eq!(err.kind(), "RenderError");
    }

    #[test]
    fn test_parse_set() {
        assert!(PromptTemplateSet::parse("empty", "   \n").unwrap().is_empty());
        assert!(PromptTemplateSet::parse("comments", "# nothing here\n")
            .unwrap()
            .is_empty());
        assert!(PromptTemplateSet::parse("bad", "a: {b: c}").is_err());

        let merged = PromptTemplateSet::from_iter([("a", "1"), ("b", "2")])
            .merge(PromptTemplateSet::from_iter([("b", "3"), ("c", "4")]));
        assert_eq!(merged.get("a"), Some("1"));
        assert_eq!(merged.get("b"), Some("3"));
        assert_eq!(merged.get("c"), Some("4"));
        assert_eq!(merged.names().collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }
}
