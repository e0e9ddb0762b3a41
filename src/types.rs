//! Core data model types for mapping rules.
//!
//! Rules arrive as flat [`RuleRecord`]s (one per CSV row or JSON rule object) and are assembled by
//! [`crate::rules::build`] into an immutable [`MappingTree`] of [`MappingNode`]s.

use std::fmt;

use crate::mapping::path::JsonPath;

/// Identifier of the virtual root in the parent registry.
///
/// Rules whose parent column is empty or equal to this identifier become top-level elements.
pub const ROOT_ID: &str = "Root";

/// Logical data type used to coerce a raw value before expression evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataType {
    /// 32-bit signed integer (`Integer`).
    Integer,
    /// 64-bit signed integer (`Long`).
    Long,
    /// 64-bit floating point number (`Double`).
    Double,
    /// Boolean (`Boolean` / `Bool`).
    Bool,
    /// Local date-time in `yyyy-MM-ddTHH:mm:ss.SSS` form (`Date`).
    Date,
    /// Untyped text. Unknown hints fall back to this.
    Utf8,
}

impl DataType {
    /// Parse a declared type hint (case-insensitive). Unknown or empty hints map to [`DataType::Utf8`].
    pub fn from_hint(hint: &str) -> Self {
        match hint.trim().to_ascii_lowercase().as_str() {
            "integer" | "int" | "xs:int" | "xs:integer" => Self::Integer,
            "long" | "xs:long" => Self::Long,
            "double" | "float" | "decimal" | "xs:double" | "xs:decimal" => Self::Double,
            "boolean" | "bool" | "xs:boolean" => Self::Bool,
            "date" | "datetime" | "xs:datetime" => Self::Date,
            _ => Self::Utf8,
        }
    }
}

/// One flat rule record, as read from a rule source.
///
/// All fields are kept as raw text; interpretation (flags, order, feed lists, path syntax) happens
/// in the tree builder so that malformed values can be reported per rule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleRecord {
    /// JSON source path (`$.a.b`, `a.b`, `.` or empty).
    pub source_path: String,
    /// Slash-separated output path; the last segment is the element name.
    pub output_path: String,
    /// Repeat flag (`Yes` means repeating).
    pub repeat: String,
    /// Declared JSON type.
    pub source_type: String,
    /// Declared XML type.
    pub target_type: String,
    /// Optional field expression.
    pub expression: String,
    /// Namespace hint (carried, not interpreted).
    pub namespace: String,
    /// Output path of the parent rule (empty or [`ROOT_ID`] for top-level rules).
    pub parent: String,
    /// Sibling order key.
    pub order: String,
    /// Collector flag (`Yes` means collector), if the column exists.
    pub collector: Option<String>,
    /// Semicolon-joined feed paths, if the column exists.
    pub feed_paths: Option<String>,
    /// Condition path for derived fields, if the column exists.
    pub condition_path: Option<String>,
    /// Default text for derived fields, if the column exists.
    pub default_text: Option<String>,
    /// 1-based line in the rule source, when known.
    pub line: Option<u64>,
}

impl RuleRecord {
    /// Create a rule mapping `source_path` to `output_path`.
    pub fn new(source_path: impl Into<String>, output_path: impl Into<String>) -> Self {
        Self {
            source_path: source_path.into(),
            output_path: output_path.into(),
            ..Default::default()
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = parent.into();
        self
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order.to_string();
        self
    }

    pub fn repeating(mut self) -> Self {
        self.repeat = "Yes".to_string();
        self
    }

    pub fn with_types(mut self, source_type: impl Into<String>, target_type: impl Into<String>) -> Self {
        self.source_type = source_type.into();
        self.target_type = target_type.into();
        self
    }

    pub fn with_expression(mut self, expression: impl Into<String>) -> Self {
        self.expression = expression.into();
        self
    }

    /// Mark the rule as a collector over the given feed paths.
    pub fn collector<I, S>(mut self, feeds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let feeds: Vec<String> = feeds.into_iter().map(|f| f.as_ref().to_string()).collect();
        self.collector = Some("Yes".to_string());
        self.feed_paths = Some(feeds.join(";"));
        self
    }

    /// Make the rule a derived field: emit `default_text` when `condition_path` is present.
    pub fn derived(mut self, condition_path: impl Into<String>, default_text: impl Into<String>) -> Self {
        self.condition_path = Some(condition_path.into());
        self.default_text = Some(default_text.into());
        self
    }
}

/// How a node takes part in emission. Decided once at build time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// No source and no condition: always emitted, exists for its children.
    Structural,
    /// Driven by a source path and/or a condition.
    Leaf,
    /// Output name starts with `@`. Attribute output is not implemented; these are skipped.
    Attribute,
    /// Aggregates feed paths through a structural template child.
    Collector,
}

/// One output element rule in the mapping tree.
#[derive(Debug, Clone, PartialEq)]
pub struct MappingNode {
    /// Parsed source path, `None` for structural and condition-only nodes.
    pub source_path: Option<JsonPath>,
    /// Full output path as declared; also the node's registry identifier.
    pub output_path: String,
    /// Element name (last output path segment).
    pub tag: String,
    /// Ancestor wrapper elements (earlier output path segments), outermost first.
    pub wrappers: Vec<String>,
    pub kind: NodeKind,
    pub repeating: bool,
    pub source_type: String,
    pub target_type: String,
    pub expression: Option<String>,
    pub namespace: Option<String>,
    pub order: i32,
    /// Position of the rule in its source; breaks order ties.
    pub index: usize,
    /// Absolute feed paths of a collector, in declaration order.
    pub feed_paths: Vec<JsonPath>,
    pub condition_path: Option<JsonPath>,
    pub default_text: Option<String>,
    pub children: Vec<MappingNode>,
}

impl MappingNode {
    /// The virtual root that owns all top-level rules.
    pub(crate) fn virtual_root() -> Self {
        Self {
            source_path: None,
            output_path: ROOT_ID.to_string(),
            tag: ROOT_ID.to_string(),
            wrappers: Vec::new(),
            kind: NodeKind::Structural,
            repeating: false,
            source_type: String::new(),
            target_type: String::new(),
            expression: None,
            namespace: None,
            order: 0,
            index: usize::MAX,
            feed_paths: Vec::new(),
            condition_path: None,
            default_text: None,
            children: Vec::new(),
        }
    }

    /// True when the node emits `default_text` gated by `condition_path`.
    pub fn is_derived(&self) -> bool {
        self.condition_path.is_some() && self.default_text.is_some()
    }

    /// The type used to coerce values for this node's expression.
    ///
    /// The declared target type wins; the source type is used when no target type is declared.
    pub fn coercion_type(&self) -> DataType {
        if self.target_type.trim().is_empty() {
            DataType::from_hint(&self.source_type)
        } else {
            DataType::from_hint(&self.target_type)
        }
    }

    /// The structural template of a collector: the child whose source is `.`, else the first child.
    pub fn template(&self) -> Option<&MappingNode> {
        self.children
            .iter()
            .find(|c| c.source_path.as_ref().is_some_and(JsonPath::is_self))
            .or_else(|| self.children.first())
    }

    fn count(&self) -> usize {
        1 + self.children.iter().map(MappingNode::count).sum::<usize>()
    }

    fn fmt_level(&self, f: &mut fmt::Formatter<'_>, level: usize) -> fmt::Result {
        write!(f, "{:indent$}{}", "", self.output_path, indent = level * 2)?;
        if self.kind == NodeKind::Collector {
            let feeds: Vec<&str> = self.feed_paths.iter().map(JsonPath::as_str).collect();
            write!(f, " [collector: {}]", feeds.join(", "))?;
        }
        if let (Some(cond), Some(default)) = (&self.condition_path, &self.default_text) {
            write!(f, " [derived: if {cond} then '{default}']")?;
        }
        writeln!(f)?;
        for child in &self.children {
            child.fmt_level(f, level + 1)?;
        }
        Ok(())
    }
}

/// Immutable, ordered mapping tree rooted at a virtual root.
#[derive(Debug, Clone, PartialEq)]
pub struct MappingTree {
    root: MappingNode,
}

impl MappingTree {
    pub(crate) fn new(root: MappingNode) -> Self {
        Self { root }
    }

    /// The virtual root. It is never emitted itself.
    pub fn root(&self) -> &MappingNode {
        &self.root
    }

    /// Top-level rules, in sorted order.
    pub fn roots(&self) -> &[MappingNode] {
        &self.root.children
    }

    /// Number of rule nodes in the tree (the virtual root excluded).
    pub fn len(&self) -> usize {
        self.root.count() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.root.children.is_empty()
    }

    /// Depth-first search for the first node with the given output path.
    pub fn find(&self, output_path: &str) -> Option<&MappingNode> {
        fn walk<'a>(node: &'a MappingNode, output_path: &str) -> Option<&'a MappingNode> {
            node.children.iter().find_map(|child| {
                if child.output_path == output_path {
                    Some(child)
                } else {
                    walk(child, output_path)
                }
            })
        }
        walk(&self.root, output_path)
    }
}

impl fmt::Display for MappingTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for child in self.roots() {
            child.fmt_level(f, 0)?;
        }
        Ok(())
    }
}
