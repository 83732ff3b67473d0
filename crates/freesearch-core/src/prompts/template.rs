//! Logic-less prompt templates
//!
//! A subset of Handlebars with exactly two constructs:
//!
//! - `{{path}}` interpolation, HTML-escaped; `{{{path}}}` or `{{& path}}` for raw text
//! - `{{#each path}} ... {{/each}}` iteration over a list
//!
//! Paths are dotted (`result.title`), plus `this` / `.` for the current loop
//! item and `@index` for its position. Names resolve against the innermost loop
//! item first and then outward to the root context. `{{! ... }}` is a comment.
//! There is no branching; any other block helper is rejected at compile time.
//! As in Handlebars, a block or comment tag standing alone on its line removes
//! that whole line from the output.

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unterminated tag at byte {0}")]
    Unterminated(usize),

    #[error("empty tag at byte {0}")]
    EmptyTag(usize),

    #[error("invalid path '{0}'")]
    InvalidPath(String),

    #[error("unsupported tag '{0}' (only interpolation and #each are allowed)")]
    Unsupported(String),

    #[error("'#each {path}' opened at byte {offset} is never closed")]
    UnclosedEach { path: String, offset: usize },

    #[error("unexpected closing tag '/{0}'")]
    StrayClose(String),

    #[error("cannot iterate over '{0}': not a list")]
    NotAList(String),

    #[error("cannot interpolate '{0}': value is an object or list")]
    NotScalar(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Path {
    This,
    Index,
    Keys { keys: Vec<String>, local: bool },
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Text(String),
    Var { path: Path, label: String, escape: bool },
    Each { path: Path, label: String, body: Vec<Node> },
}

struct OpenBlock {
    path: Path,
    label: String,
    offset: usize,
    outer: Vec<Node>,
}

#[derive(Clone, Copy)]
struct Scope<'a> {
    value: &'a Value,
    index: Option<usize>,
}

/// A template parsed into a node tree, ready to render any number of times
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledTemplate {
    nodes: Vec<Node>,
}

impl CompiledTemplate {
    pub fn compile(source: &str) -> Result<Self, TemplateError> {
        let mut stack: Vec<OpenBlock> = Vec::new();
        let mut current: Vec<Node> = Vec::new();
        let mut rest = source;
        let mut offset = 0;

        while let Some(start) = rest.find("{{") {
            let tag_offset = offset + start;
            let tag = &rest[start..];

            let (inner, mut consumed, raw) = if let Some(body) = tag.strip_prefix("{{{") {
                let end = body
                    .find("}}}")
                    .ok_or(TemplateError::Unterminated(tag_offset))?;
                (&body[..end], end + 6, true)
            } else {
                let body = &tag[2..];
                let end = body
                    .find("}}")
                    .ok_or(TemplateError::Unterminated(tag_offset))?;
                (&body[..end], end + 4, false)
            };

            let inner = inner.trim();
            if inner.is_empty() {
                return Err(TemplateError::EmptyTag(tag_offset));
            }

            // Block and comment tags alone on their line take the whole line with them
            let mut text_end = start;
            if !raw && inner.starts_with(['#', '/', '!']) {
                if let Some(line) = standalone_line(source, tag_offset, tag_offset + consumed) {
                    text_end -= line.indent;
                    consumed += line.trailing;
                }
            }
            if text_end > 0 {
                current.push(Node::Text(rest[..text_end].to_string()));
            }

            if raw {
                current.push(var_node(inner, false)?);
            } else if inner.starts_with('!') {
                // comment
            } else if let Some(block) = inner.strip_prefix('#') {
                let mut parts = block.split_whitespace();
                match (parts.next(), parts.next(), parts.next()) {
                    (Some("each"), Some(target), None) => stack.push(OpenBlock {
                        path: parse_path(target)?,
                        label: target.to_string(),
                        offset: tag_offset,
                        outer: std::mem::take(&mut current),
                    }),
                    _ => return Err(TemplateError::Unsupported(inner.to_string())),
                }
            } else if let Some(close) = inner.strip_prefix('/') {
                let close = close.trim();
                let open = match stack.pop() {
                    Some(open) if close == "each" => open,
                    _ => return Err(TemplateError::StrayClose(close.to_string())),
                };
                let body = std::mem::replace(&mut current, open.outer);
                current.push(Node::Each {
                    path: open.path,
                    label: open.label,
                    body,
                });
            } else if let Some(target) = inner.strip_prefix('&') {
                current.push(var_node(target.trim(), false)?);
            } else if inner.starts_with(['^', '>', '<', '=']) || inner == "else" {
                return Err(TemplateError::Unsupported(inner.to_string()));
            } else {
                current.push(var_node(inner, true)?);
            }

            rest = &tag[consumed..];
            offset = tag_offset + consumed;
        }

        if !rest.is_empty() {
            current.push(Node::Text(rest.to_string()));
        }

        if let Some(open) = stack.pop() {
            return Err(TemplateError::UnclosedEach {
                path: open.label,
                offset: open.offset,
            });
        }

        Ok(Self { nodes: current })
    }

    /// Render with `context` as the root scope
    pub fn render(&self, context: &Value) -> Result<String, TemplateError> {
        let mut out = String::new();
        let mut scopes = vec![Scope {
            value: context,
            index: None,
        }];
        render_nodes(&self.nodes, &mut scopes, &mut out)?;
        Ok(out)
    }
}

struct StandaloneLine {
    /// Whitespace between the line start and the tag
    indent: usize,
    /// Bytes after the tag up to and including the line break
    trailing: usize,
}

/// Whether the tag spanning `tag_start..tag_end` is the only thing on its line
fn standalone_line(source: &str, tag_start: usize, tag_end: usize) -> Option<StandaloneLine> {
    let line_start = source[..tag_start].rfind('\n').map_or(0, |i| i + 1);
    let before = &source[line_start..tag_start];
    if !before.chars().all(|c| c == ' ' || c == '\t') {
        return None;
    }

    let after = &source[tag_end..];
    let (line_rest, newline) = match after.find('\n') {
        Some(i) => (&after[..i], 1),
        None => (after, 0),
    };
    if !line_rest.chars().all(|c| c == ' ' || c == '\t' || c == '\r') {
        return None;
    }

    Some(StandaloneLine {
        indent: before.len(),
        trailing: line_rest.len() + newline,
    })
}

fn var_node(target: &str, escape: bool) -> Result<Node, TemplateError> {
    Ok(Node::Var {
        path: parse_path(target)?,
        label: target.to_string(),
        escape,
    })
}

fn parse_path(text: &str) -> Result<Path, TemplateError> {
    match text {
        "this" | "." => return Ok(Path::This),
        "@index" => return Ok(Path::Index),
        _ => {}
    }

    let (local, dotted) = match text.strip_prefix("this.") {
        Some(stripped) => (true, stripped),
        None => (false, text),
    };

    let keys: Vec<String> = dotted.split('.').map(str::to_string).collect();
    let valid = keys.iter().all(|k| {
        !k.is_empty()
            && k
                .chars()
                .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '$')
    });
    if !valid {
        return Err(TemplateError::InvalidPath(text.to_string()));
    }

    Ok(Path::Keys { keys, local })
}

fn lookup<'a>(path: &Path, scopes: &[Scope<'a>]) -> Option<&'a Value> {
    let (keys, local) = match path {
        Path::This => return scopes.last().map(|s| s.value),
        Path::Index => return None,
        Path::Keys { keys, local } => (keys, *local),
    };
    let (first, tail) = keys.split_first()?;

    let mut candidates = scopes.iter().rev();
    let found = if local {
        candidates.next()?.value.get(first)
    } else {
        candidates.find_map(|scope| scope.value.get(first))
    };
    let found = found?;

    tail.iter().try_fold(found, |value, key| value.get(key))
}

fn render_nodes<'a>(
    nodes: &[Node],
    scopes: &mut Vec<Scope<'a>>,
    out: &mut String,
) -> Result<(), TemplateError> {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Var {
                path: Path::Index, ..
            } => {
                if let Some(index) = scopes.last().and_then(|s| s.index) {
                    out.push_str(&index.to_string());
                }
            }
            Node::Var {
                path,
                label,
                escape,
            } => {
                let text = match lookup(path, scopes) {
                    None | Some(Value::Null) => continue,
                    Some(Value::String(s)) => s.clone(),
                    Some(Value::Bool(b)) => b.to_string(),
                    Some(Value::Number(n)) => n.to_string(),
                    Some(_) => return Err(TemplateError::NotScalar(label.clone())),
                };
                if *escape {
                    out.push_str(&escape_html(&text));
                } else {
                    out.push_str(&text);
                }
            }
            Node::Each { path, label, body } => match lookup(path, scopes) {
                None | Some(Value::Null) | Some(Value::Bool(false)) => {}
                Some(Value::Array(items)) => {
                    for (index, item) in items.iter().enumerate() {
                        scopes.push(Scope {
                            value: item,
                            index: Some(index),
                        });
                        let rendered = render_nodes(body, scopes, out);
                        scopes.pop();
                        rendered?;
                    }
                }
                Some(_) => return Err(TemplateError::NotAList(label.clone())),
            },
        }
    }
    Ok(())
}

/// Entity-escape text for interpolation
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            '`' => escaped.push_str("&#x60;"),
            '=' => escaped.push_str("&#x3D;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
