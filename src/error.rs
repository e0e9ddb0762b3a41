use thiserror::Error;

use crate::mapping::path::PathSyntaxError;

/// Convenience result type for mapping and conversion operations.
pub type MappingResult<T> = Result<T, MappingError>;

/// Error type returned by rule loading, tree building and conversion.
///
/// This is a single error enum shared by the rule sources, the emitter and the unified
/// entrypoint.
#[derive(Debug, Error)]
pub enum MappingError {
    /// Underlying I/O error (e.g. file not found, permission denied).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV rule file could not be read.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON document (or JSON rule file) could not be parsed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The XML writer rejected an event.
    #[error("xml write error: {message}")]
    Xml { message: String },

    /// The JSON input cannot be used as a document (e.g. it is empty).
    #[error("invalid input: {message}")]
    Input { message: String },

    /// The rule source cannot be interpreted (missing columns, unknown format, ...).
    #[error("rule source mismatch: {message}")]
    RuleSource { message: String },

    /// A path expression is malformed.
    #[error(transparent)]
    PathSyntax(#[from] PathSyntaxError),

    /// A field expression failed for the element being produced.
    #[error(
        "expression failed for element '{output_path}' (source '{source_path}'): {message} (expression='{expression}', raw='{raw}')"
    )]
    Expression {
        output_path: String,
        source_path: String,
        expression: String,
        raw: String,
        message: String,
    },

    /// The mapping tree was built with errors and strict building was requested.
    #[error("mapping tree has {count} build error(s); first: {first}")]
    Build { count: usize, first: String },
}
