//! JSON document loading.
//!
//! A conversion input is a single JSON value. Batch inputs may also be newline-delimited JSON
//! (one document per line).

use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::error::{MappingError, MappingResult};

/// Parse one JSON document from a file.
pub fn load_document_from_path(path: impl AsRef<Path>) -> MappingResult<Value> {
    let text = fs::read_to_string(path)?;
    parse_document(&text)
}

/// Parse one JSON document from text.
pub fn parse_document(input: &str) -> MappingResult<Value> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(MappingError::Input {
            message: "json input is empty".to_string(),
        });
    }
    Ok(serde_json::from_str(trimmed)?)
}

/// Parse a batch of documents: a single JSON value, or NDJSON with one document per line.
///
/// A single top-level value is returned as one document (arrays are not split).
pub fn parse_documents(input: &str) -> MappingResult<Vec<Value>> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    // First try parsing as a single JSON value.
    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        return Ok(vec![v]);
    }

    // Fall back to NDJSON.
    let mut values = Vec::new();
    for (i, line) in trimmed.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let v = serde_json::from_str::<Value>(line).map_err(|e| MappingError::Input {
            message: format!("invalid ndjson at line {}: {}", i + 1, e),
        })?;
        values.push(v);
    }
    Ok(values)
}
