//! Unified conversion entrypoint.
//!
//! Most callers should use [`convert_from_paths`], which reads a rule file, builds the mapping
//! tree, parses the JSON input and writes the XML output.
//!
//! - If [`ConvertOptions::rules_format`] is `None`, the rule format is inferred from the rule
//!   file extension (`.csv` or `.json`).
//! - If a [`ConversionObserver`] is provided, build issues, success, failure and alerts are
//!   reported to it.

use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{MappingError, MappingResult};
use crate::mapping::{EmitStats, Emitter, ErrorPolicy};
use crate::rules::{build, read_rules, BuildError, BuildOutcome, BuildWarning, RuleFormat};
use crate::transform::ExpressionEngine;
use crate::types::MappingTree;
use crate::xml::{XmlElementWriter, XmlWriterOptions};

use super::json::{load_document_from_path, parse_document};
use super::observability::{ConversionContext, ConversionObserver, ConversionSeverity};

/// Options controlling unified conversion behavior.
///
/// Use [`Default`] for common cases.
#[derive(Clone)]
pub struct ConvertOptions {
    /// If `None`, infer the rule format from the rule file extension.
    pub rules_format: Option<RuleFormat>,
    /// XML declaration and indentation.
    pub writer: XmlWriterOptions,
    /// What to do when an element's expression fails.
    pub error_policy: ErrorPolicy,
    /// Fail before emission when the mapping tree was built with errors.
    pub strict_build: bool,
    /// Optional observer for logging/alerts.
    pub observer: Option<Arc<dyn ConversionObserver>>,
    /// Severity threshold at which `on_alert` is invoked.
    pub alert_at_or_above: ConversionSeverity,
}

impl fmt::Debug for ConvertOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConvertOptions")
            .field("rules_format", &self.rules_format)
            .field("writer", &self.writer)
            .field("error_policy", &self.error_policy)
            .field("strict_build", &self.strict_build)
            .field("observer_set", &self.observer.is_some())
            .field("alert_at_or_above", &self.alert_at_or_above)
            .finish()
    }
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            rules_format: None,
            writer: XmlWriterOptions::default(),
            error_policy: ErrorPolicy::default(),
            strict_build: false,
            observer: None,
            alert_at_or_above: ConversionSeverity::Critical,
        }
    }
}

/// Outcome of a successful [`convert_from_paths`] call.
#[derive(Debug, Clone)]
pub struct ConversionReport {
    pub stats: EmitStats,
    /// Rules that could not be placed in the tree (their elements were not produced).
    pub build_errors: Vec<BuildError>,
    pub build_warnings: Vec<BuildWarning>,
}

/// Read a rule file and build its mapping tree.
///
/// With `options.strict_build`, any build error fails with [`MappingError::Build`].
pub fn load_mapping_tree(rules_path: impl AsRef<Path>, options: &ConvertOptions) -> MappingResult<BuildOutcome> {
    let rules_path = rules_path.as_ref();
    let records = read_rules(rules_path, options.rules_format)?;
    let outcome = build(&records);
    debug!(
        rules = records.len(),
        nodes = outcome.tree.len(),
        errors = outcome.errors.len(),
        warnings = outcome.warnings.len(),
        "mapping tree built from {}:\n{}",
        rules_path.display(),
        outcome.tree
    );
    if options.strict_build {
        outcome.check_strict()?;
    }
    Ok(outcome)
}

/// Stream the XML for `root` into `out`.
pub fn write_xml<W: Write>(
    root: &Value,
    tree: &MappingTree,
    out: W,
    options: &ConvertOptions,
) -> MappingResult<EmitStats> {
    let mut writer = XmlElementWriter::with_options(out, options.writer);
    Emitter::new(root, ExpressionEngine::shared())
        .with_error_policy(options.error_policy)
        .run(&mut writer, tree)
}

/// Convert a parsed document to an XML string.
pub fn convert_value(root: &Value, tree: &MappingTree, options: &ConvertOptions) -> MappingResult<String> {
    let mut out = Vec::new();
    write_xml(root, tree, &mut out, options)?;
    String::from_utf8(out).map_err(|e| MappingError::Xml { message: e.to_string() })
}

/// Convert JSON text to an XML string.
///
/// ```rust
/// use json_xml_mapping::convert::{convert_str, ConvertOptions};
/// use json_xml_mapping::rules::build;
/// use json_xml_mapping::types::RuleRecord;
/// use json_xml_mapping::xml::XmlWriterOptions;
///
/// # fn main() -> Result<(), json_xml_mapping::MappingError> {
/// let tree = build(&[
///     RuleRecord::new("", "person"),
///     RuleRecord::new("$.name", "name").with_parent("person"),
/// ])
/// .into_strict()?;
///
/// let options = ConvertOptions {
///     writer: XmlWriterOptions { declaration: false, indent: None },
///     ..Default::default()
/// };
/// let xml = convert_str(r#"{"name":"John"}"#, &tree, &options)?;
/// assert_eq!(xml, "<person><name>John</name></person>");
/// # Ok(())
/// # }
/// ```
pub fn convert_str(json: &str, tree: &MappingTree, options: &ConvertOptions) -> MappingResult<String> {
    let root = parse_document(json)?;
    convert_value(&root, tree, options)
}

/// Unified conversion entry point for path-based sources.
///
/// When an observer is configured, this function reports:
///
/// - `on_build_issues` when the rules built with errors or warnings
/// - `on_success` on success, with emission stats
/// - `on_failure` on failure, with a computed severity
/// - `on_alert` on failure when the computed severity is >= `options.alert_at_or_above`
///
/// The output file is removed again if the conversion fails after it was created.
///
/// ```no_run
/// use std::sync::Arc;
///
/// use json_xml_mapping::convert::{convert_from_paths, ConversionSeverity, ConvertOptions, StdErrObserver};
///
/// # fn main() -> Result<(), json_xml_mapping::MappingError> {
/// let opts = ConvertOptions {
///     observer: Some(Arc::new(StdErrObserver::default())),
///     alert_at_or_above: ConversionSeverity::Critical,
///     ..Default::default()
/// };
/// let report = convert_from_paths("company.json", "company_rules.csv", "company.xml", &opts)?;
/// println!("elements={}", report.stats.elements_written);
/// # Ok(())
/// # }
/// ```
pub fn convert_from_paths(
    json_path: impl AsRef<Path>,
    rules_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    options: &ConvertOptions,
) -> MappingResult<ConversionReport> {
    let rules_path = rules_path.as_ref();
    let format = match options.rules_format {
        Some(f) => f,
        None => RuleFormat::from_path(rules_path)?,
    };
    let ctx = ConversionContext {
        input: json_path.as_ref().to_path_buf(),
        rules: rules_path.to_path_buf(),
        format,
        output: output_path.as_ref().to_path_buf(),
    };
    let options = ConvertOptions {
        rules_format: Some(format),
        ..options.clone()
    };

    let result = convert_with_context(&ctx, &options);

    if let Some(obs) = options.observer.as_ref() {
        match &result {
            Ok(report) => obs.on_success(&ctx, report.stats),
            Err(e) => {
                let sev = severity_for_error(e);
                obs.on_failure(&ctx, sev, e);
                if sev >= options.alert_at_or_above {
                    obs.on_alert(&ctx, sev, e);
                }
            }
        }
    }

    result
}

fn convert_with_context(ctx: &ConversionContext, options: &ConvertOptions) -> MappingResult<ConversionReport> {
    let outcome = load_mapping_tree(&ctx.rules, options)?;
    if !outcome.is_clean() {
        if let Some(obs) = options.observer.as_ref() {
            obs.on_build_issues(ctx, outcome.errors.len(), outcome.warnings.len());
        }
    }

    let root = load_document_from_path(&ctx.input)?;
    let file = File::create(&ctx.output)?;
    let stats = write_xml(&root, &outcome.tree, BufWriter::new(file), options).inspect_err(|_| {
        if let Err(e) = fs::remove_file(&ctx.output) {
            warn!(output = %ctx.output.display(), error = %e, "could not remove partial output");
        }
    })?;

    Ok(ConversionReport {
        stats,
        build_errors: outcome.errors,
        build_warnings: outcome.warnings,
    })
}

pub(crate) fn severity_for_error(e: &MappingError) -> ConversionSeverity {
    match e {
        MappingError::Io(_) => ConversionSeverity::Critical,
        MappingError::Csv(err) => match err.kind() {
            ::csv::ErrorKind::Io(_) => ConversionSeverity::Critical,
            _ => ConversionSeverity::Error,
        },
        MappingError::Json(err) if err.is_io() => ConversionSeverity::Critical,
        MappingError::Json(_)
        | MappingError::Xml { .. }
        | MappingError::Input { .. }
        | MappingError::RuleSource { .. }
        | MappingError::PathSyntax(_)
        | MappingError::Expression { .. }
        | MappingError::Build { .. } => ConversionSeverity::Error,
    }
}

/// Convenience helper for callers that want an owned request object.
///
/// This can be useful if you want to enqueue conversion work in a job system.
#[derive(Clone)]
pub struct ConvertRequest {
    /// JSON input document.
    pub json_path: PathBuf,
    /// Rule file.
    pub rules_path: PathBuf,
    /// XML output file.
    pub output_path: PathBuf,
    /// Options controlling conversion.
    pub options: ConvertOptions,
}

impl fmt::Debug for ConvertRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConvertRequest")
            .field("json_path", &self.json_path)
            .field("rules_path", &self.rules_path)
            .field("output_path", &self.output_path)
            .field("options", &self.options)
            .finish()
    }
}

impl ConvertRequest {
    /// Execute the request by calling [`convert_from_paths`].
    pub fn run(&self) -> MappingResult<ConversionReport> {
        convert_from_paths(&self.json_path, &self.rules_path, &self.output_path, &self.options)
    }
}
