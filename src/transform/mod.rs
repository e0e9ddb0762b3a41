//! Attribute-level transformation: type coercion followed by expression evaluation.
//!
//! A node without an expression passes its raw text through untouched. Otherwise the raw text is
//! coerced to the node's declared type (target type first, source type as fallback) and bound
//! to `val` for the expression. The stringified result replaces the raw text; a unit result
//! keeps the raw text.
//!
//! ```rust
//! use json_xml_mapping::rules::build;
//! use json_xml_mapping::transform::{transform_value, ExpressionEngine};
//! use json_xml_mapping::types::RuleRecord;
//!
//! let tree = build(&[RuleRecord::new("$.qty", "qty")
//!     .with_types("Integer", "Integer")
//!     .with_expression("val * 2")])
//! .tree;
//! let out = transform_value(ExpressionEngine::shared(), "21", &tree.roots()[0]).unwrap();
//! assert_eq!(out, "42");
//! ```

mod expression;
mod functions;

use chrono::NaiveDateTime;
use rhai::Dynamic;
use thiserror::Error;
use tracing::warn;

use crate::error::{MappingError, MappingResult};
use crate::types::{DataType, MappingNode};

pub use expression::{ExpressionEngine, ExpressionError, CACHE_CAPACITY, VALUE_VARIABLE};
pub use functions::{convert_utc_to_eastern, convert_utc_to_eastern_date, FUNCTION_NAMESPACE};

/// Local date-time layout accepted for `Date` values.
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

/// A raw value that does not match its declared type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot coerce '{raw}' to {data_type:?}: {message}")]
pub struct CoercionError {
    pub data_type: DataType,
    pub raw: String,
    pub message: String,
}

/// Transform `raw` for `node`.
///
/// Coercion failures fall back to the untyped text with a warning. Expression failures are
/// returned as [`MappingError::Expression`].
pub fn transform_value(engine: &ExpressionEngine, raw: &str, node: &MappingNode) -> MappingResult<String> {
    let Some(expression) = node.expression.as_deref() else {
        return Ok(raw.to_string());
    };

    let val = coerce(raw, &node.coercion_type()).unwrap_or_else(|err| {
        warn!(output_path = %node.output_path, error = %err, "type coercion failed; using untyped text");
        Dynamic::from(raw.to_string())
    });

    match engine.evaluate(expression, val) {
        Ok(result) if result.is_unit() => Ok(raw.to_string()),
        Ok(result) => Ok(result.to_string()),
        Err(err) => Err(MappingError::Expression {
            output_path: node.output_path.clone(),
            source_path: node
                .source_path
                .as_ref()
                .map(|p| p.as_str().to_string())
                .unwrap_or_default(),
            expression: expression.to_string(),
            raw: raw.to_string(),
            message: err.to_string(),
        }),
    }
}

/// Coerce raw text to a script value of the given type. The literal `null` becomes unit.
pub fn coerce(raw: &str, data_type: &DataType) -> Result<Dynamic, CoercionError> {
    if raw == "null" {
        return Ok(Dynamic::UNIT);
    }
    let fail = |message: String| CoercionError {
        data_type: data_type.clone(),
        raw: raw.to_string(),
        message,
    };
    let s = raw.trim();
    match data_type {
        DataType::Integer => s
            .parse::<i32>()
            .map(|v| Dynamic::from(i64::from(v)))
            .map_err(|e| fail(e.to_string())),
        DataType::Long => s
            .parse::<i64>()
            .map(Dynamic::from)
            .map_err(|e| fail(e.to_string())),
        DataType::Double => s
            .parse::<f64>()
            .map(Dynamic::from)
            .map_err(|e| fail(e.to_string())),
        DataType::Bool => parse_bool(s).map(Dynamic::from).map_err(fail),
        DataType::Date => NaiveDateTime::parse_from_str(s, DATE_TIME_FORMAT)
            .map(|dt| Dynamic::from(dt.format(DATE_TIME_FORMAT).to_string()))
            .map_err(|e| fail(e.to_string())),
        DataType::Utf8 => Ok(Dynamic::from(raw.to_string())),
    }
}

fn parse_bool(s: &str) -> Result<bool, String> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "y" => Ok(true),
        "false" | "f" | "0" | "no" | "n" => Ok(false),
        _ => Err("expected bool (true/false/1/0/yes/no)".to_string()),
    }
}
