//! Assemble flat rule records into an ordered [`MappingTree`].
//!
//! Records may arrive in any order. Each pass attaches every record whose parent is already
//! registered; passes repeat until one attaches nothing. Whatever is left is reported, never
//! silently dropped.

use std::collections::HashMap;

use thiserror::Error;
use tracing::{debug, warn};

use crate::error::{MappingError, MappingResult};
use crate::mapping::path::{JsonPath, PathScope, PathSyntaxError};
use crate::types::{MappingNode, MappingTree, NodeKind, RuleRecord, ROOT_ID};

/// A rule that could not be placed in the tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("rule '{output_path}'{} references unknown parent '{parent}'", at_line(.line))]
    UnresolvedParent {
        output_path: String,
        parent: String,
        line: Option<u64>,
    },
    #[error("rule '{output_path}'{} has an invalid path: {error}", at_line(.line))]
    InvalidPath {
        output_path: String,
        path: String,
        #[source]
        error: PathSyntaxError,
        line: Option<u64>,
    },
    #[error("rule{} has an empty output path", at_line(.line))]
    EmptyOutputPath { line: Option<u64> },
    #[error("rule '{output_path}'{}: '{name}' is not a valid element name", at_line(.line))]
    InvalidElementName {
        output_path: String,
        name: String,
        line: Option<u64>,
    },
}

/// A tolerated oddity in a rule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildWarning {
    #[error("rule '{output_path}': order '{raw}' is not an integer; using 0")]
    InvalidOrder { output_path: String, raw: String },
    #[error("collector '{output_path}' has no feed paths")]
    CollectorWithoutFeeds { output_path: String },
    #[error("collector '{output_path}' has no template child")]
    CollectorWithoutTemplate { output_path: String },
    #[error("collector '{output_path}': feed '{feed}' is relative; resolving it from the document root")]
    RelativeFeedPath { output_path: String, feed: String },
}

fn at_line(line: &Option<u64>) -> String {
    line.map(|l| format!(" (line {l})")).unwrap_or_default()
}

/// Result of [`build`]: the tree plus everything that was reported while building it.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub tree: MappingTree,
    pub errors: Vec<BuildError>,
    pub warnings: Vec<BuildWarning>,
}

impl BuildOutcome {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }

    /// [`MappingError::Build`] if any error was reported.
    pub fn check_strict(&self) -> MappingResult<()> {
        match self.errors.first() {
            None => Ok(()),
            Some(first) => Err(MappingError::Build {
                count: self.errors.len(),
                first: first.to_string(),
            }),
        }
    }

    /// The tree, or the error from [`BuildOutcome::check_strict`].
    pub fn into_strict(self) -> MappingResult<MappingTree> {
        self.check_strict()?;
        Ok(self.tree)
    }
}

struct Draft {
    node: MappingNode,
    parent: String,
    children: Vec<usize>,
}

/// Build a mapping tree from flat records.
pub fn build(records: &[RuleRecord]) -> BuildOutcome {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let mut pending = Vec::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        match parse_record(index, record, &mut warnings) {
            Ok(draft) => pending.push(draft),
            Err(err) => errors.push(err),
        }
    }

    let mut arena: Vec<Option<Draft>> = vec![Some(Draft {
        node: MappingNode::virtual_root(),
        parent: String::new(),
        children: Vec::new(),
    })];
    let mut registry: HashMap<String, usize> = HashMap::from([(ROOT_ID.to_string(), 0)]);

    let mut pass = 0;
    loop {
        pass += 1;
        let before = pending.len();
        let mut remaining = Vec::new();
        for draft in pending {
            let parent = if draft.parent.is_empty() {
                Some(0)
            } else {
                registry.get(&draft.parent).copied()
            };
            match parent {
                Some(parent) => {
                    let id = arena.len();
                    registry.entry(draft.node.output_path.clone()).or_insert(id);
                    if let Some(Some(parent)) = arena.get_mut(parent) {
                        parent.children.push(id);
                    }
                    arena.push(Some(draft));
                }
                None => remaining.push(draft),
            }
        }
        debug!(pass, attached = before - remaining.len(), remaining = remaining.len(), "rule attachment pass");
        pending = remaining;
        if pending.is_empty() || pending.len() == before {
            break;
        }
    }

    for draft in pending {
        errors.push(BuildError::UnresolvedParent {
            output_path: draft.node.output_path,
            parent: draft.parent,
            line: records.get(draft.node.index).and_then(|r| r.line),
        });
    }

    let root = assemble(&mut arena, 0).unwrap_or_else(MappingNode::virtual_root);
    collector_warnings(&root, &mut warnings);
    for err in &errors {
        warn!(error = %err, "mapping rule not attached");
    }
    for warning in &warnings {
        warn!(warning = %warning, "mapping rule warning");
    }

    BuildOutcome {
        tree: MappingTree::new(root),
        errors,
        warnings,
    }
}

/// Move a draft out of the arena with its children sorted by `(order, index)`.
fn assemble(arena: &mut [Option<Draft>], id: usize) -> Option<MappingNode> {
    let draft = arena.get_mut(id)?.take()?;
    let mut node = draft.node;
    let mut children: Vec<MappingNode> = draft
        .children
        .into_iter()
        .filter_map(|child| assemble(arena, child))
        .collect();
    children.sort_by_key(|c| (c.order, c.index));
    node.children = children;
    Some(node)
}

fn collector_warnings(node: &MappingNode, warnings: &mut Vec<BuildWarning>) {
    for child in &node.children {
        if child.kind == NodeKind::Collector {
            if child.feed_paths.is_empty() {
                warnings.push(BuildWarning::CollectorWithoutFeeds {
                    output_path: child.output_path.clone(),
                });
            }
            if child.children.is_empty() {
                warnings.push(BuildWarning::CollectorWithoutTemplate {
                    output_path: child.output_path.clone(),
                });
            }
        }
        collector_warnings(child, warnings);
    }
}

fn parse_record(index: usize, record: &RuleRecord, warnings: &mut Vec<BuildWarning>) -> Result<Draft, BuildError> {
    let line = record.line;
    let output_path = record.output_path.trim().to_string();
    let mut segments: Vec<&str> = output_path.split('/').filter(|s| !s.is_empty()).collect();
    let Some(last) = segments.pop() else {
        return Err(BuildError::EmptyOutputPath { line });
    };

    let invalid_name = |name: &str| BuildError::InvalidElementName {
        output_path: output_path.clone(),
        name: name.to_string(),
        line,
    };
    if let Some(bad) = segments.iter().find(|s| !is_element_name(s)) {
        return Err(invalid_name(*bad));
    }
    let attribute = last.starts_with('@');
    if !is_element_name(last.trim_start_matches('@')) || last.matches('@').count() > 1 {
        return Err(invalid_name(last));
    }

    let parse_path = |raw: &str| {
        JsonPath::parse(raw).map_err(|error| BuildError::InvalidPath {
            output_path: output_path.clone(),
            path: raw.to_string(),
            error,
            line,
        })
    };

    let source_path = match record.source_path.trim() {
        "" => None,
        raw => Some(parse_path(raw)?),
    };
    let condition_path = match record.condition_path.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(parse_path(raw)?),
    };
    let feed_paths = record
        .feed_paths
        .as_deref()
        .unwrap_or_default()
        .split(';')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(parse_path)
        .collect::<Result<Vec<_>, _>>()?;
    for feed in feed_paths.iter().filter(|f| f.scope() == PathScope::Context) {
        warnings.push(BuildWarning::RelativeFeedPath {
            output_path: output_path.clone(),
            feed: feed.to_string(),
        });
    }

    let order = match record.order.trim() {
        "" => 0,
        raw => raw.parse::<i32>().unwrap_or_else(|_| {
            warnings.push(BuildWarning::InvalidOrder {
                output_path: output_path.clone(),
                raw: raw.to_string(),
            });
            0
        }),
    };

    let collector = record.collector.as_deref().is_some_and(is_yes);
    let kind = if collector {
        NodeKind::Collector
    } else if attribute {
        NodeKind::Attribute
    } else if source_path.is_none() && condition_path.is_none() {
        NodeKind::Structural
    } else {
        NodeKind::Leaf
    };

    let parent = match record.parent.trim() {
        ROOT_ID => String::new(),
        other => other.to_string(),
    };
    let tag = last.to_string();
    let wrappers = segments.iter().map(|s| s.to_string()).collect();

    Ok(Draft {
        node: MappingNode {
            source_path,
            tag,
            wrappers,
            kind,
            repeating: is_yes(&record.repeat),
            source_type: record.source_type.trim().to_string(),
            target_type: record.target_type.trim().to_string(),
            expression: non_blank(&record.expression),
            namespace: non_blank(&record.namespace),
            order,
            index,
            feed_paths,
            condition_path,
            default_text: record.default_text.as_deref().and_then(non_blank),
            children: Vec::new(),
            output_path,
        },
        parent,
        children: Vec::new(),
    })
}

fn is_yes(flag: &str) -> bool {
    flag.trim().eq_ignore_ascii_case("yes")
}

fn non_blank(s: &str) -> Option<String> {
    (!s.trim().is_empty()).then(|| s.to_string())
}

/// XML element names: a letter or `_` first, then letters, digits, `-`, `_`, `.` or `:`.
fn is_element_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(nodes: &[MappingNode]) -> Vec<&str> {
        nodes.iter().map(|n| n.tag.as_str()).collect()
    }

    #[test]
    fn children_are_sorted_by_order_then_record_index() {
        let outcome = build(&[
            RuleRecord::new("", "root"),
            RuleRecord::new("$.c", "c").with_parent("root").with_order(2),
            RuleRecord::new("$.a", "a").with_parent("root").with_order(1),
            RuleRecord::new("$.b", "b").with_parent("root").with_order(1),
            RuleRecord::new("$.z", "z").with_parent("root"),
        ]);
        assert!(outcome.is_clean());
        assert_eq!(tags(&outcome.tree.roots()[0].children), vec!["z", "a", "b", "c"]);
    }

    #[test]
    fn children_may_precede_their_parents() {
        let outcome = build(&[
            RuleRecord::new("zip", "zip").with_parent("address"),
            RuleRecord::new("$.address", "address").with_parent("person"),
            RuleRecord::new("", "person"),
        ]);
        assert!(outcome.errors.is_empty());
        let person = outcome.tree.find("person").unwrap();
        assert_eq!(tags(&person.children), vec!["address"]);
        assert_eq!(tags(&person.children[0].children), vec!["zip"]);
        assert_eq!(outcome.tree.len(), 3);
    }

    #[test]
    fn unresolved_parents_are_reported() {
        let outcome = build(&[
            RuleRecord::new("", "person"),
            RuleRecord::new("$.x", "x").with_parent("nowhere"),
            RuleRecord::new("y", "y").with_parent("x"),
        ]);
        assert_eq!(outcome.tree.len(), 1);
        assert_eq!(
            outcome.errors,
            vec![
                BuildError::UnresolvedParent {
                    output_path: "x".into(),
                    parent: "nowhere".into(),
                    line: None
                },
                BuildError::UnresolvedParent {
                    output_path: "y".into(),
                    parent: "x".into(),
                    line: None
                },
            ]
        );
        let checked = outcome.check_strict().unwrap_err().to_string();
        let err = outcome.into_strict().unwrap_err();
        assert!(matches!(err, MappingError::Build { count: 2, .. }));
        assert_eq!(err.to_string(), checked);
    }

    #[test]
    fn clean_outcome_passes_strict_check() {
        let outcome = build(&[RuleRecord::new("", "a")]);
        assert!(outcome.check_strict().is_ok());
        assert_eq!(outcome.into_strict().unwrap().len(), 1);
    }

    #[test]
    fn relative_feed_paths_are_reported() {
        let outcome = build(&[
            RuleRecord::new("", "All").collector(["$.a[*]", "b[*]"]),
            RuleRecord::new(".", "Item").with_parent("All"),
        ]);
        assert!(outcome.errors.is_empty());
        assert_eq!(
            outcome.warnings,
            vec![BuildWarning::RelativeFeedPath {
                output_path: "All".into(),
                feed: "b[*]".into(),
            }]
        );
        assert_eq!(outcome.tree.roots()[0].feed_paths.len(), 2);
    }

    #[test]
    fn root_identifier_attaches_at_top_level() {
        let outcome = build(&[
            RuleRecord::new("$.a", "a").with_parent("Root"),
            RuleRecord::new("$.b", "b"),
        ]);
        assert!(outcome.is_clean());
        assert_eq!(tags(outcome.tree.roots()), vec!["a", "b"]);
    }

    #[test]
    fn first_registration_wins_but_duplicates_still_attach() {
        let outcome = build(&[
            RuleRecord::new("$.first", "dup"),
            RuleRecord::new("$.second", "dup"),
            RuleRecord::new("v", "v").with_parent("dup"),
        ]);
        assert!(outcome.is_clean());
        let roots = outcome.tree.roots();
        assert_eq!(roots.len(), 2);
        assert_eq!(roots[0].source_path.as_ref().unwrap().as_str(), "$.first");
        assert_eq!(tags(&roots[0].children), vec!["v"]);
        assert!(roots[1].children.is_empty());
    }

    #[test]
    fn invalid_paths_drop_the_record_and_its_subtree() {
        let outcome = build(&[
            RuleRecord::new("$.a..b", "bad"),
            RuleRecord::new("c", "child").with_parent("bad"),
            RuleRecord::new("$.ok", "ok"),
        ]);
        assert_eq!(tags(outcome.tree.roots()), vec!["ok"]);
        assert!(matches!(
            &outcome.errors[0],
            BuildError::InvalidPath { output_path, path, .. } if output_path == "bad" && path == "$.a..b"
        ));
        assert!(matches!(&outcome.errors[1], BuildError::UnresolvedParent { .. }));
    }

    #[test]
    fn output_paths_split_into_wrappers_and_tag() {
        let outcome = build(&[
            RuleRecord::new("$.items[*]", "list/item").repeating(),
            RuleRecord::new("$.id", "@id"),
            RuleRecord::new("$.x", "/"),
            RuleRecord::new("$.y", "1bad"),
        ]);
        let list = &outcome.tree.roots()[0];
        assert_eq!(list.tag, "item");
        assert_eq!(list.wrappers, vec!["list"]);
        assert!(list.repeating);
        assert_eq!(outcome.tree.roots()[1].kind, NodeKind::Attribute);
        assert_eq!(outcome.errors.len(), 2);
        assert!(matches!(outcome.errors[0], BuildError::EmptyOutputPath { .. }));
        assert!(matches!(&outcome.errors[1], BuildError::InvalidElementName { name, .. } if name == "1bad"));
    }

    #[test]
    fn tolerant_field_parsing() {
        let mut odd = RuleRecord::new("$.a", "a");
        odd.order = "first".into();
        odd.repeat = "YES".into();
        odd.condition_path = Some("   ".into());
        odd.default_text = Some(String::new());
        let collector = RuleRecord::new("", "all").collector([" $.x[*] ", "", "$.y"]);

        let outcome = build(&[odd, collector]);
        assert!(outcome.errors.is_empty());
        assert_eq!(
            outcome.warnings,
            vec![
                BuildWarning::InvalidOrder {
                    output_path: "a".into(),
                    raw: "first".into()
                },
                BuildWarning::CollectorWithoutTemplate {
                    output_path: "all".into()
                },
            ]
        );
        let a = outcome.tree.find("a").unwrap();
        assert_eq!(a.order, 0);
        assert!(a.repeating);
        assert_eq!(a.condition_path, None);
        assert_eq!(a.default_text, None);
        assert_eq!(a.kind, NodeKind::Leaf);

        let all = outcome.tree.find("all").unwrap();
        assert_eq!(all.kind, NodeKind::Collector);
        let feeds: Vec<&str> = all.feed_paths.iter().map(JsonPath::as_str).collect();
        assert_eq!(feeds, vec!["$.x[*]", "$.y"]);
    }

    #[test]
    fn node_kinds() {
        let outcome = build(&[
            RuleRecord::new("", "s"),
            RuleRecord::new("$.v", "l"),
            RuleRecord::new("", "d").derived("flag", "x"),
            RuleRecord::new("", "c").collector(Vec::<String>::new()),
        ]);
        let kinds: Vec<NodeKind> = outcome.tree.roots().iter().map(|n| n.kind).collect();
        assert_eq!(
            kinds,
            vec![NodeKind::Structural, NodeKind::Leaf, NodeKind::Leaf, NodeKind::Collector]
        );
        assert!(outcome
            .warnings
            .contains(&BuildWarning::CollectorWithoutFeeds { output_path: "c".into() }));
    }

    #[test]
    fn collector_template_prefers_the_self_child() {
        let outcome = build(&[
            RuleRecord::new("", "Departments").collector(["$.a[*]"]),
            RuleRecord::new("name", "Label").with_parent("Departments"),
            RuleRecord::new(".", "Department").with_parent("Departments"),
        ]);
        let collector = &outcome.tree.roots()[0];
        assert_eq!(collector.template().unwrap().tag, "Department");
    }

    #[test]
    fn hierarchy_display() {
        let outcome = build(&[
            RuleRecord::new("", "person"),
            RuleRecord::new("$.name", "name").with_parent("person"),
        ]);
        assert_eq!(outcome.tree.to_string(), "person\n  name\n");
    }
}
