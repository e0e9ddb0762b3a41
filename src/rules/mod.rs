//! Rule sources and the mapping tree builder.
//!
//! - [`csv`]: CSV rule files (positional columns plus optional named columns)
//! - [`json`]: JSON rule files (array of rule objects)
//! - [`builder`]: assembles flat records into a [`crate::types::MappingTree`]

pub mod builder;
pub mod csv;
pub mod json;

use std::path::Path;

use crate::error::{MappingError, MappingResult};
use crate::types::RuleRecord;

pub use builder::{build, BuildError, BuildOutcome, BuildWarning};

/// Supported rule file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleFormat {
    Csv,
    Json,
}

impl RuleFormat {
    /// Infer the format from a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    /// Infer the format from a path's extension.
    pub fn from_path(path: impl AsRef<Path>) -> MappingResult<Self> {
        let path = path.as_ref();
        let ext = path.extension().and_then(|s| s.to_str()).ok_or_else(|| {
            MappingError::RuleSource {
                message: format!("cannot infer rule format: path has no extension: {}", path.display()),
            }
        })?;
        Self::from_extension(ext).ok_or_else(|| MappingError::RuleSource {
            message: format!("unsupported rule file extension '{ext}' for {}", path.display()),
        })
    }
}

/// Read rule records from a file, inferring the format unless `format` is given.
pub fn read_rules(path: impl AsRef<Path>, format: Option<RuleFormat>) -> MappingResult<Vec<RuleRecord>> {
    let path = path.as_ref();
    let format = match format {
        Some(f) => f,
        None => RuleFormat::from_path(path)?,
    };
    match format {
        RuleFormat::Csv => csv::read_rules_from_path(path),
        RuleFormat::Json => json::read_rules_from_path(path),
    }
}
