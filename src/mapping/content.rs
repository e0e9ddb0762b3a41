//! Content-producibility check used to elide empty container elements.

use serde_json::Value;

use crate::mapping::evaluator::{scalar_text, RuleEvaluator};
use crate::types::{MappingNode, NodeKind};

/// Would emitting `node` with `value` as its context produce any child content?
///
/// False for nodes without children and for `null` or empty containers. Otherwise true at the
/// first child that is a collector, a derived field whose condition holds, or whose source
/// resolves to a non-empty scalar, an array with at least one producible item, or an object with
/// producible content. Structural children are checked against the same value.
pub fn has_producible_content<'a>(
    evaluator: &RuleEvaluator<'a>,
    value: &'a Value,
    node: &MappingNode,
) -> bool {
    if node.children.is_empty() || is_empty(value) {
        return false;
    }
    node.children
        .iter()
        .any(|child| child_produces(evaluator, value, child))
}

/// Would a single array item produce content for a repeating `node`?
pub fn item_produces<'a>(evaluator: &RuleEvaluator<'a>, item: &'a Value, node: &MappingNode) -> bool {
    match item {
        Value::Null => false,
        Value::Object(_) | Value::Array(_) => has_producible_content(evaluator, item, node),
        _ => true,
    }
}

fn child_produces<'a>(evaluator: &RuleEvaluator<'a>, value: &'a Value, child: &MappingNode) -> bool {
    match child.kind {
        NodeKind::Collector => return true,
        NodeKind::Attribute => return false,
        NodeKind::Structural | NodeKind::Leaf => {}
    }

    if let Some(condition) = &child.condition_path {
        if !evaluator.condition_met(value, condition) {
            return false;
        }
        if child.default_text.is_some() {
            return true;
        }
    }

    match &child.source_path {
        None => has_producible_content(evaluator, value, child),
        Some(path) => match evaluator.resolve(value, path) {
            None | Some(Value::Null) => false,
            Some(Value::Array(items)) => items.iter().any(|item| item_produces(evaluator, item, child)),
            Some(object @ Value::Object(_)) => has_producible_content(evaluator, object, child),
            Some(scalar) => scalar_text(scalar).is_some_and(|text| !text.is_empty()),
        },
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}
