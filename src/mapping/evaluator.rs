//! Per-rule evaluation: decide whether a node produces output, with which text, and which JSON
//! context its children see.

use std::borrow::Cow;

use serde_json::Value;
use tracing::trace;

use crate::mapping::path::{resolve, JsonPath};
use crate::types::MappingNode;

/// What the source path of a node resolved to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SourceValue<'a> {
    /// The node has no source path.
    Unset,
    /// The source path resolved to nothing.
    Absent,
    /// A scalar (including `null` and empty strings).
    Scalar,
    /// An object or array.
    Container(&'a Value),
}

/// The outcome of evaluating a node that produces an element.
#[derive(Debug, Clone, PartialEq)]
pub struct Emission<'a> {
    /// Raw (untransformed) element text.
    pub text: Option<Cow<'a, str>>,
    /// True when `text` came from the node's default value.
    pub derived: bool,
    /// Context for the node's children.
    pub child_context: &'a Value,
    pub source: SourceValue<'a>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation<'a> {
    Skip,
    Emit(Emission<'a>),
}

/// Evaluates mapping nodes against one JSON document.
#[derive(Debug, Clone, Copy)]
pub struct RuleEvaluator<'a> {
    root: &'a Value,
}

impl<'a> RuleEvaluator<'a> {
    pub fn new(root: &'a Value) -> Self {
        Self { root }
    }

    /// The document root.
    pub fn root(&self) -> &'a Value {
        self.root
    }

    /// Resolve `path` with `context` as the current scope.
    pub fn resolve(&self, context: &'a Value, path: &JsonPath) -> Option<&'a Value> {
        resolve(Some(context), self.root, path)
    }

    /// A condition holds when its path resolves to anything other than boolean `false`.
    pub fn condition_met(&self, context: &'a Value, condition: &JsonPath) -> bool {
        !matches!(self.resolve(context, condition), None | Some(Value::Bool(false)))
    }

    pub fn evaluate(&self, context: &'a Value, node: &'a MappingNode) -> Evaluation<'a> {
        if let Some(condition) = &node.condition_path {
            if !self.condition_met(context, condition) {
                trace!(output_path = %node.output_path, condition = %condition, "condition not met");
                return Evaluation::Skip;
            }
        }

        let mut child_context = Some(context);
        let mut text = None;
        let source = match &node.source_path {
            None => SourceValue::Unset,
            Some(path) => match self.resolve(context, path) {
                None => {
                    child_context = None;
                    SourceValue::Absent
                }
                Some(value @ (Value::Object(_) | Value::Array(_))) => {
                    child_context = Some(value);
                    SourceValue::Container(value)
                }
                Some(value) => {
                    text = scalar_text(value).filter(|t| !t.is_empty());
                    if text.is_none() {
                        child_context = None;
                    }
                    SourceValue::Scalar
                }
            },
        };

        let mut derived = false;
        if text.is_none() {
            if let Some(default) = &node.default_text {
                text = Some(Cow::Borrowed(default.as_str()));
                derived = true;
                if matches!(source, SourceValue::Unset | SourceValue::Absent) {
                    child_context = Some(context);
                }
            }
        }

        match (&node.source_path, &node.condition_path) {
            (None, None) => {}
            (Some(path), _) => {
                let container = matches!(source, SourceValue::Container(_));
                if text.is_none() && !container {
                    trace!(output_path = %node.output_path, source = %path, "no value at source path");
                    return Evaluation::Skip;
                }
            }
            (None, Some(_)) => child_context = Some(context),
        }

        Evaluation::Emit(Emission {
            text,
            derived,
            child_context: child_context.unwrap_or(context),
            source,
        })
    }
}

/// Text form of a scalar JSON value. `null` and containers have no text.
pub fn scalar_text(value: &Value) -> Option<Cow<'_, str>> {
    match value {
        Value::String(s) => Some(Cow::Borrowed(s.as_str())),
        Value::Number(n) => Some(Cow::Owned(n.to_string())),
        Value::Bool(b) => Some(Cow::Owned(b.to_string())),
        Value::Null | Value::Object(_) | Value::Array(_) => None,
    }
}
