//! Path expressions into JSON documents.
//!
//! Supported syntax is a restricted dotted subset:
//!
//! - `.` is the current context itself,
//! - a leading `$` (optionally followed by `.`) switches the scope to the document root,
//! - segments are separated by `.`,
//! - `[*]` is a wildcard marker that contributes no segment,
//! - `[n]` selects array index `n`.
//!
//! Paths are parsed once (at rule build time) into a [`JsonPath`] holding an RFC 6901 pointer,
//! so that resolution itself can never fail.

use std::borrow::Cow;
use std::fmt;

use serde_json::Value;
use thiserror::Error;

/// The self marker.
pub const SELF_MARKER: &str = ".";

const ROOT_MARKER: char = '$';

/// A path expression that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid path '{path}' at position {position}: {message}")]
pub struct PathSyntaxError {
    pub path: String,
    /// Byte offset of the offending segment in `path`.
    pub position: usize,
    pub message: String,
}

/// Whether a path starts from the current context or from the document root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathScope {
    Context,
    Root,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    SelfNode,
    Pointer {
        /// Set when the path is a single plain key, looked up directly before pointer traversal.
        direct_key: Option<String>,
        pointer: String,
    },
}

/// A parsed path expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPath {
    raw: String,
    scope: PathScope,
    target: Target,
}

impl JsonPath {
    /// Parse a path expression.
    pub fn parse(raw: &str) -> Result<Self, PathSyntaxError> {
        if raw.is_empty() {
            return Err(syntax_error(raw, 0, "path is empty"));
        }
        if raw == SELF_MARKER {
            return Ok(Self {
                raw: raw.to_string(),
                scope: PathScope::Context,
                target: Target::SelfNode,
            });
        }

        let (scope, body, offset) = match raw.strip_prefix(ROOT_MARKER) {
            Some(rest) => match rest.strip_prefix('.') {
                Some(rest) => (PathScope::Root, rest, 2),
                None => (PathScope::Root, rest, 1),
            },
            None => (PathScope::Context, raw, 0),
        };

        let segments = parse_segments(raw, body, offset)?;
        let direct_key = (scope == PathScope::Context && !body.contains(['.', '[', ']']))
            .then(|| body.to_string());
        let pointer = segments
            .iter()
            .map(|segment| format!("/{}", escape(segment)))
            .collect();

        Ok(Self {
            raw: raw.to_string(),
            scope,
            target: Target::Pointer { direct_key, pointer },
        })
    }

    /// The expression as written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn scope(&self) -> PathScope {
        self.scope
    }

    /// True for the self marker `.`.
    pub fn is_self(&self) -> bool {
        self.target == Target::SelfNode
    }

    /// The RFC 6901 pointer this path resolves through (`None` for the self marker).
    pub fn pointer(&self) -> Option<&str> {
        match &self.target {
            Target::SelfNode => None,
            Target::Pointer { pointer, .. } => Some(pointer),
        }
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Resolve `path` against `context` (or `root` for `$`-scoped paths).
///
/// Returns `None` when any segment is missing or when a context-scoped path has no context.
pub fn resolve<'a>(context: Option<&'a Value>, root: &'a Value, path: &JsonPath) -> Option<&'a Value> {
    let (direct_key, pointer) = match &path.target {
        Target::SelfNode => return context,
        Target::Pointer { direct_key, pointer } => (direct_key, pointer),
    };
    let scope = match path.scope {
        PathScope::Root => root,
        PathScope::Context => context?,
    };
    if let (Some(key), Value::Object(map)) = (direct_key, scope) {
        if let Some(value) = map.get(key) {
            return Some(value);
        }
    }
    scope.pointer(pointer)
}

/// Parse and resolve in one step. An empty path resolves to `None`.
pub fn resolve_str<'a>(
    context: Option<&'a Value>,
    root: &'a Value,
    path: &str,
) -> Result<Option<&'a Value>, PathSyntaxError> {
    if path.is_empty() {
        return Ok(None);
    }
    let parsed = JsonPath::parse(path)?;
    Ok(resolve(context, root, &parsed))
}

fn parse_segments(raw: &str, body: &str, offset: usize) -> Result<Vec<String>, PathSyntaxError> {
    let mut segments = Vec::new();
    if body.is_empty() {
        return Ok(segments);
    }

    let mut position = offset;
    for part in body.split('.') {
        if part.is_empty() {
            return Err(syntax_error(raw, position, "empty segment"));
        }
        if part.contains(ROOT_MARKER) {
            return Err(syntax_error(
                raw,
                position,
                "root marker '$' is only allowed at the start of a path",
            ));
        }

        let (name, mut brackets) = match part.find('[') {
            Some(idx) => part.split_at(idx),
            None => (part, ""),
        };
        if name.contains(']') {
            return Err(syntax_error(raw, position, "unexpected ']'"));
        }
        if !name.is_empty() {
            segments.push(name.to_string());
        }

        while !brackets.is_empty() {
            let Some(inner) = brackets.strip_prefix('[') else {
                return Err(syntax_error(raw, position, "unexpected text after ']'"));
            };
            let Some(close) = inner.find(']') else {
                return Err(syntax_error(raw, position, "unclosed '['"));
            };
            let selector = &inner[..close];
            if selector == "*" {
                // wildcard contributes no segment
            } else if !selector.is_empty() && selector.bytes().all(|b| b.is_ascii_digit()) {
                segments.push(selector.to_string());
            } else {
                return Err(syntax_error(
                    raw,
                    position,
                    &format!("unsupported selector '[{selector}]'; expected '[*]' or an index"),
                ));
            }
            brackets = &inner[close + 1..];
        }

        position += part.len() + 1;
    }
    Ok(segments)
}

fn escape(segment: &str) -> Cow<'_, str> {
    if segment.contains(['~', '/']) {
        Cow::Owned(segment.replace('~', "~0").replace('/', "~1"))
    } else {
        Cow::Borrowed(segment)
    }
}

fn syntax_error(path: &str, position: usize, message: &str) -> PathSyntaxError {
    PathSyntaxError {
        path: path.to_string(),
        position,
        message: message.to_string(),
    }
}
