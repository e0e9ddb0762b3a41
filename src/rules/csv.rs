//! CSV rule source.

use std::path::Path;

use crate::error::{MappingError, MappingResult};
use crate::types::RuleRecord;

/// Positional columns, in order. Only the first two are required in the header.
pub const POSITIONAL_COLUMNS: [&str; 9] = [
    "source path",
    "output path",
    "repeat",
    "source type",
    "target type",
    "expression",
    "namespace",
    "parent",
    "order",
];

const COLLECTOR_COLUMNS: &[&str] = &["isCollector", "is_collector"];
const FEED_COLUMNS: &[&str] = &["sourceFeedJPaths", "feed_paths"];
const CONDITION_COLUMNS: &[&str] = &["conditionJPath", "condition_path"];
const DEFAULT_COLUMNS: &[&str] = &["defaultValue", "default_value"];

/// Read rule records from a CSV file.
///
/// Rules:
///
/// - The file must have a header row.
/// - The first nine columns are positional (see [`POSITIONAL_COLUMNS`]); header names for them
///   are not checked.
/// - Optional columns (`isCollector`, `sourceFeedJPaths`, `conditionJPath`, `defaultValue`) are
///   found by header name, case-insensitively, wherever they appear.
/// - Short rows are padded with empty fields. Lines starting with `#` are ignored.
pub fn read_rules_from_path(path: impl AsRef<Path>) -> MappingResult<Vec<RuleRecord>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .comment(Some(b'#'))
        .from_path(path)?;
    read_rules_from_reader(&mut rdr)
}

/// Read rule records from in-memory CSV text.
pub fn read_rules_from_str(input: &str) -> MappingResult<Vec<RuleRecord>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .comment(Some(b'#'))
        .from_reader(input.as_bytes());
    read_rules_from_reader(&mut rdr)
}

/// Read rule records from an existing CSV reader.
pub fn read_rules_from_reader<R: std::io::Read>(rdr: &mut csv::Reader<R>) -> MappingResult<Vec<RuleRecord>> {
    let headers = rdr.headers()?.clone();
    if headers.len() < 2 {
        return Err(MappingError::RuleSource {
            message: format!(
                "rule csv needs at least the '{}' and '{}' columns. headers={:?}",
                POSITIONAL_COLUMNS[0],
                POSITIONAL_COLUMNS[1],
                headers.iter().collect::<Vec<_>>()
            ),
        });
    }

    let find = |names: &[&str]| {
        headers
            .iter()
            .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
    };
    let collector_idx = find(COLLECTOR_COLUMNS);
    let feeds_idx = find(FEED_COLUMNS);
    let condition_idx = find(CONDITION_COLUMNS);
    let default_idx = find(DEFAULT_COLUMNS);

    let mut rules = Vec::new();
    for result in rdr.records() {
        let record = result?;
        let field = |idx: usize| record.get(idx).unwrap_or("").trim().to_string();
        let optional = |idx: Option<usize>| idx.map(|i| record.get(i).unwrap_or("").trim().to_string());

        rules.push(RuleRecord {
            source_path: field(0),
            output_path: field(1),
            repeat: field(2),
            source_type: field(3),
            target_type: field(4),
            expression: field(5),
            namespace: field(6),
            parent: field(7),
            order: field(8),
            collector: optional(collector_idx),
            feed_paths: optional(feeds_idx),
            condition_path: optional(condition_idx),
            // Default text is kept verbatim.
            default_text: default_idx.map(|i| record.get(i).unwrap_or("").to_string()),
            line: record.position().map(|p| p.line()),
        });
    }
    Ok(rules)
}
