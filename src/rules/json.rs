//! JSON rule source.
//!
//! A rule file is a JSON array of rule objects:
//!
//! ```json
//! [
//!   { "outputPath": "person" },
//!   { "sourcePath": "$.name", "outputPath": "name", "parent": "person", "order": 1 },
//!   { "sourcePath": "$.tags[*]", "outputPath": "tags/tag", "parent": "person", "repeating": true },
//!   { "outputPath": "All", "collector": true, "feedPaths": ["$.a[*]", "$.b[*]"] },
//!   { "outputPath": "Status", "conditionPath": "flag", "defaultText": "Active" }
//! ]
//! ```
//!
//! Column-style names (`jPath`, `xPath`, `isList`, `parentXPath`, `sourceFeedJPaths`, ...) are
//! accepted as aliases.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{MappingError, MappingResult};
use crate::types::RuleRecord;

/// A boolean flag written either as a JSON boolean or as text (`"Yes"`).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Text(String),
}

impl Default for Flag {
    fn default() -> Self {
        Flag::Bool(false)
    }
}

impl Flag {
    fn into_field(self) -> String {
        match self {
            Flag::Bool(true) => "Yes".to_string(),
            Flag::Bool(false) => String::new(),
            Flag::Text(s) => s,
        }
    }
}

/// Feed paths as a list or as one `;`-separated string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Feeds {
    List(Vec<String>),
    Joined(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonRule {
    #[serde(default, alias = "jPath", alias = "source_path")]
    source_path: String,
    #[serde(alias = "xPath", alias = "output_path")]
    output_path: String,
    #[serde(default, alias = "isList", alias = "repeat")]
    repeating: Flag,
    #[serde(default, alias = "jsonType", alias = "source_type")]
    source_type: String,
    #[serde(default, alias = "xmlType", alias = "target_type")]
    target_type: String,
    #[serde(default, alias = "exprsn")]
    expression: String,
    #[serde(default)]
    namespace: String,
    #[serde(default, alias = "parentXPath")]
    parent: String,
    #[serde(default)]
    order: Value,
    #[serde(default, alias = "isCollector")]
    collector: Option<Flag>,
    #[serde(default, alias = "sourceFeedJPaths", alias = "feed_paths")]
    feed_paths: Option<Feeds>,
    #[serde(default, alias = "conditionJPath", alias = "condition_path")]
    condition_path: Option<String>,
    #[serde(default, alias = "defaultValue", alias = "default_text")]
    default_text: Option<String>,
}

impl From<JsonRule> for RuleRecord {
    fn from(rule: JsonRule) -> Self {
        let order = match rule.order {
            Value::Null => String::new(),
            Value::String(s) => s,
            other => other.to_string(),
        };
        RuleRecord {
            source_path: rule.source_path,
            output_path: rule.output_path,
            repeat: rule.repeating.into_field(),
            source_type: rule.source_type,
            target_type: rule.target_type,
            expression: rule.expression,
            namespace: rule.namespace,
            parent: rule.parent,
            order,
            collector: rule.collector.map(Flag::into_field),
            feed_paths: rule.feed_paths.map(|feeds| match feeds {
                Feeds::List(list) => list.join(";"),
                Feeds::Joined(joined) => joined,
            }),
            condition_path: rule.condition_path,
            default_text: rule.default_text,
            line: None,
        }
    }
}

/// Read rule records from a JSON rule file.
pub fn read_rules_from_path(path: impl AsRef<Path>) -> MappingResult<Vec<RuleRecord>> {
    let text = fs::read_to_string(path)?;
    read_rules_from_str(&text)
}

/// Read rule records from in-memory JSON text.
pub fn read_rules_from_str(input: &str) -> MappingResult<Vec<RuleRecord>> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(MappingError::RuleSource {
            message: "json rule input is empty".to_string(),
        });
    }
    let value: Value = serde_json::from_str(trimmed)?;
    if !value.is_array() {
        return Err(MappingError::RuleSource {
            message: "json rules must be an array of rule objects".to_string(),
        });
    }
    let rules: Vec<JsonRule> = serde_json::from_value(value)?;
    Ok(rules.into_iter().map(RuleRecord::from).collect())
}
