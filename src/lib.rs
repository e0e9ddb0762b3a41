//! `json-xml-mapping` converts JSON documents into XML according to a set of flat field-mapping
//! rules.
//!
//! Rules are authored as CSV rows (or JSON rule objects). Each rule names a source path in the
//! input JSON, an output element path, and optionally a parent rule, a sort order, a repeat flag,
//! type hints with an expression, a collector feed list, or a condition with a default value.
//! The rules are assembled once into an ordered [`types::MappingTree`], which is then walked
//! depth-first against each JSON document to stream XML out.
//!
//! The primary entrypoint is [`convert::convert_from_paths`], which infers the rule format from
//! the rule file extension (or you can force one via [`convert::ConvertOptions`]).
//!
//! ## Rule columns
//!
//! The first nine CSV columns are positional:
//!
//! | # | column        | meaning                                                    |
//! |---|---------------|------------------------------------------------------------|
//! | 1 | source path   | `$.a.b` (document root), `a.b` (current context) or `.`    |
//! | 2 | output path   | `wrapper/element`; only the last segment is the rule's tag |
//! | 3 | repeat        | `Yes` to emit one element per array item                   |
//! | 4 | source type   | type hint used to coerce the value before the expression   |
//! | 5 | target type   | type hint; wins over the source type                       |
//! | 6 | expression    | formula over `val`, e.g. `val * 2` or `fmfcn::convert_utc_to_est(val)` |
//! | 7 | namespace     | carried, not interpreted                                   |
//! | 8 | parent        | output path of the parent rule (`Root` or empty for top level) |
//! | 9 | order         | integer sort key among siblings                            |
//!
//! Optional named columns: `isCollector`, `sourceFeedJPaths`, `conditionJPath`, `defaultValue`.
//!
//! ## Quick example: convert files
//!
//! ```no_run
//! use json_xml_mapping::convert::{convert_from_paths, ConvertOptions};
//!
//! # fn main() -> Result<(), json_xml_mapping::MappingError> {
//! let report = convert_from_paths("company.json", "company_rules.csv", "company.xml", &ConvertOptions::default())?;
//! println!("elements={} rule errors={}", report.stats.elements_written, report.build_errors.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## In-memory example
//!
//! ```rust
//! use json_xml_mapping::convert::{convert_str, ConvertOptions};
//! use json_xml_mapping::rules::{build, csv::read_rules_from_str};
//! use json_xml_mapping::xml::XmlWriterOptions;
//!
//! # fn main() -> Result<(), json_xml_mapping::MappingError> {
//! let rules = read_rules_from_str(
//!     "jPath,xPath,isList,jsonType,xmlType,exprsn,namespace,parentXPath,order\n\
//!      ,order,,,,,,,\n\
//!      $.id,id,,,,,,order,1\n\
//!      $.lines[*],lines/sku,Yes,,,,,order,2\n",
//! )?;
//! let tree = build(&rules).into_strict()?;
//!
//! let options = ConvertOptions {
//!     writer: XmlWriterOptions { declaration: false, indent: None },
//!     ..Default::default()
//! };
//! let xml = convert_str(r#"{"id":7,"lines":["A1","B2"]}"#, &tree, &options)?;
//! assert_eq!(xml, "<order><id>7</id><lines><sku>A1</sku><sku>B2</sku></lines></order>");
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`convert`]: unified entrypoints, JSON loading and observer hooks
//! - [`rules`]: CSV/JSON rule sources and the mapping tree builder
//! - [`mapping`]: path resolution, rule evaluation and emission
//! - [`transform`]: type coercion and expression evaluation for element text
//! - [`xml`]: the element writer seam and its quick-xml implementation
//! - [`execution`]: parallel conversion of document batches
//! - [`types`]: rule records and the mapping tree
//! - [`error`]: error types used across the crate

pub mod convert;
pub mod error;
pub mod execution;
pub mod mapping;
pub mod rules;
pub mod transform;
pub mod types;
pub mod xml;

pub use error::{MappingError, MappingResult};
