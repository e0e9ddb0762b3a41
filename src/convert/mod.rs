//! Conversion entrypoints.
//!
//! Most callers should use [`convert_from_paths`] (from [`unified`]) which:
//!
//! - auto-detects the rule format by file extension (or you can override via [`ConvertOptions`])
//! - builds the mapping tree and streams the XML output
//! - optionally reports build issues, success, failure and alerts to a [`ConversionObserver`]
//!
//! In-memory helpers ([`convert_str`], [`convert_value`], [`write_xml`]) take an already built
//! [`crate::types::MappingTree`] so that one tree can serve many documents.

pub mod json;
pub mod observability;
pub mod unified;

pub use observability::{
    CompositeObserver, ConversionContext, ConversionObserver, ConversionSeverity, FileObserver, StdErrObserver,
    TracingObserver,
};
pub use unified::{
    convert_from_paths, convert_str, convert_value, load_mapping_tree, write_xml, ConversionReport, ConvertOptions,
    ConvertRequest,
};
