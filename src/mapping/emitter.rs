//! Depth-first emission of a mapping tree against one JSON document.

use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::error::MappingResult;
use crate::mapping::content::{has_producible_content, item_produces};
use crate::mapping::evaluator::{scalar_text, Evaluation, RuleEvaluator, SourceValue};
use crate::transform::{transform_value, ExpressionEngine};
use crate::types::{MappingNode, MappingTree, NodeKind};
use crate::xml::ElementWriter;

/// What to do when an element's expression fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Fail the whole run.
    #[default]
    Abort,
    /// Log, count, and skip the element (and its subtree).
    SkipElement,
}

/// Counters collected during one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EmitStats {
    /// Rule elements written (wrappers not included).
    pub elements_written: usize,
    /// Nodes that evaluated to skip or were elided as empty.
    pub nodes_skipped: usize,
    /// Elements dropped under [`ErrorPolicy::SkipElement`].
    pub elements_failed: usize,
    /// Collector feeds that resolved to nothing.
    pub feeds_missing: usize,
    /// Items handed to collector templates.
    pub collector_items: usize,
    /// Elements whose text came from a default value.
    pub defaults_used: usize,
}

/// Run the whole tree against `root` with the shared expression engine and [`ErrorPolicy::Abort`].
pub fn run<W: ElementWriter + ?Sized>(
    writer: &mut W,
    root: &Value,
    tree: &MappingTree,
) -> MappingResult<EmitStats> {
    Emitter::new(root, ExpressionEngine::shared()).run(writer, tree)
}

/// Open output-path wrapper elements, shared by consecutive siblings.
#[derive(Default)]
struct Wrappers<'a> {
    open: Vec<&'a str>,
}

impl<'a> Wrappers<'a> {
    /// Close wrappers not shared with `target`, then open the missing ones.
    fn align<W: ElementWriter + ?Sized>(&mut self, writer: &mut W, target: &'a [String]) -> MappingResult<()> {
        let shared = self
            .open
            .iter()
            .zip(target)
            .take_while(|(open, wanted)| **open == wanted.as_str())
            .count();
        while self.open.len() > shared {
            writer.end_element()?;
            self.open.pop();
        }
        for name in &target[shared..] {
            writer.start_element(name)?;
            self.open.push(name);
        }
        Ok(())
    }

    fn close<W: ElementWriter + ?Sized>(&mut self, writer: &mut W) -> MappingResult<()> {
        self.align(writer, &[])
    }
}

/// Walks a mapping tree and writes elements for one document.
pub struct Emitter<'a> {
    evaluator: RuleEvaluator<'a>,
    engine: &'a ExpressionEngine,
    policy: ErrorPolicy,
    stats: EmitStats,
}

impl<'a> Emitter<'a> {
    pub fn new(root: &'a Value, engine: &'a ExpressionEngine) -> Self {
        Self {
            evaluator: RuleEvaluator::new(root),
            engine,
            policy: ErrorPolicy::default(),
            stats: EmitStats::default(),
        }
    }

    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn stats(&self) -> EmitStats {
        self.stats
    }

    /// Write a full document: every top-level rule, with the document root as context.
    pub fn run<W: ElementWriter + ?Sized>(&mut self, writer: &mut W, tree: &'a MappingTree) -> MappingResult<EmitStats> {
        writer.start_document()?;
        self.emit_children(writer, self.evaluator.root(), tree.roots())?;
        writer.end_document()?;
        Ok(self.stats)
    }

    /// Write `node` (and its subtree) for `context`, including its wrapper elements.
    pub fn emit<W: ElementWriter + ?Sized>(
        &mut self,
        writer: &mut W,
        context: &'a Value,
        node: &'a MappingNode,
    ) -> MappingResult<()> {
        let mut wrappers = Wrappers::default();
        self.emit_node(writer, context, node, &mut wrappers)?;
        wrappers.close(writer)
    }

    fn emit_children<W: ElementWriter + ?Sized>(
        &mut self,
        writer: &mut W,
        context: &'a Value,
        children: &'a [MappingNode],
    ) -> MappingResult<()> {
        let mut wrappers = Wrappers::default();
        for child in children {
            self.emit_node(writer, context, child, &mut wrappers)?;
        }
        wrappers.close(writer)
    }

    fn emit_node<W: ElementWriter + ?Sized>(
        &mut self,
        writer: &mut W,
        context: &'a Value,
        node: &'a MappingNode,
        wrappers: &mut Wrappers<'a>,
    ) -> MappingResult<()> {
        match node.kind {
            NodeKind::Attribute => {
                debug!(output_path = %node.output_path, "attribute output is not supported; skipping");
                self.stats.nodes_skipped += 1;
                return Ok(());
            }
            NodeKind::Collector => return self.emit_collector(writer, context, node, wrappers),
            NodeKind::Structural | NodeKind::Leaf => {}
        }

        let emission = match self.evaluator.evaluate(context, node) {
            Evaluation::Skip => {
                self.stats.nodes_skipped += 1;
                return Ok(());
            }
            Evaluation::Emit(emission) => emission,
        };
        if emission.derived {
            self.stats.defaults_used += 1;
            trace!(output_path = %node.output_path, "using default value");
        }

        if let (SourceValue::Container(container), None) = (emission.source, &emission.text) {
            if node.repeating {
                if let Value::Array(items) = container {
                    return self.emit_items(writer, context, node, items, wrappers);
                }
            }
            if !has_producible_content(&self.evaluator, container, node) {
                trace!(output_path = %node.output_path, "no producible content; eliding element");
                self.stats.nodes_skipped += 1;
                return Ok(());
            }
        }

        let text = match emission.text {
            Some(raw) => match self.transform(&raw, node)? {
                Some(text) => Some(text),
                None => return Ok(()),
            },
            None => None,
        };
        wrappers.align(writer, &node.wrappers)?;
        self.write_element(writer, node, text.as_deref(), emission.child_context)
    }

    /// One element per array item: `null` items are skipped, scalars become text, containers
    /// become the item's context and are written only when they produce content.
    fn emit_items<W: ElementWriter + ?Sized>(
        &mut self,
        writer: &mut W,
        context: &'a Value,
        node: &'a MappingNode,
        items: &'a [Value],
        wrappers: &mut Wrappers<'a>,
    ) -> MappingResult<()> {
        for (index, item) in items.iter().enumerate() {
            match item {
                Value::Null => {
                    trace!(output_path = %node.output_path, index, "null item skipped");
                }
                Value::Object(_) | Value::Array(_) => {
                    if !item_produces(&self.evaluator, item, node) {
                        trace!(output_path = %node.output_path, index, "empty item elided");
                        continue;
                    }
                    wrappers.align(writer, &node.wrappers)?;
                    self.write_element(writer, node, None, item)?;
                }
                scalar => {
                    let raw = scalar_text(scalar).unwrap_or_default();
                    let Some(text) = self.transform(&raw, node)? else {
                        continue;
                    };
                    wrappers.align(writer, &node.wrappers)?;
                    self.write_element(writer, node, Some(text.as_str()), context)?;
                }
            }
        }
        Ok(())
    }

    fn emit_collector<W: ElementWriter + ?Sized>(
        &mut self,
        writer: &mut W,
        context: &'a Value,
        node: &'a MappingNode,
        wrappers: &mut Wrappers<'a>,
    ) -> MappingResult<()> {
        if let Some(condition) = &node.condition_path {
            if !self.evaluator.condition_met(context, condition) {
                trace!(output_path = %node.output_path, "collector condition not met");
                self.stats.nodes_skipped += 1;
                return Ok(());
            }
        }

        let template = node.template();
        let root = self.evaluator.root();
        wrappers.align(writer, &node.wrappers)?;
        writer.start_element(&node.tag)?;

        let mut item_wrappers = Wrappers::default();
        for feed in &node.feed_paths {
            match self.evaluator.resolve(root, feed) {
                None => {
                    debug!(output_path = %node.output_path, feed = %feed, "collector feed not found; skipping");
                    self.stats.feeds_missing += 1;
                }
                Some(Value::Array(items)) => {
                    for item in items {
                        self.emit_collected(writer, item, template, &mut item_wrappers)?;
                    }
                }
                Some(item) => self.emit_collected(writer, item, template, &mut item_wrappers)?,
            }
        }

        item_wrappers.close(writer)?;
        writer.end_element()?;
        self.stats.elements_written += 1;
        Ok(())
    }

    fn emit_collected<W: ElementWriter + ?Sized>(
        &mut self,
        writer: &mut W,
        item: &'a Value,
        template: Option<&'a MappingNode>,
        wrappers: &mut Wrappers<'a>,
    ) -> MappingResult<()> {
        self.stats.collector_items += 1;
        match template {
            Some(template) => self.emit_node(writer, item, template, wrappers),
            None => Ok(()),
        }
    }

    fn write_element<W: ElementWriter + ?Sized>(
        &mut self,
        writer: &mut W,
        node: &'a MappingNode,
        text: Option<&str>,
        child_context: &'a Value,
    ) -> MappingResult<()> {
        writer.start_element(&node.tag)?;
        if let Some(text) = text {
            writer.write_text(text)?;
        }
        self.emit_children(writer, child_context, &node.children)?;
        writer.end_element()?;
        self.stats.elements_written += 1;
        Ok(())
    }

    /// Transform element text. `Ok(None)` means the element was dropped under
    /// [`ErrorPolicy::SkipElement`].
    fn transform(&mut self, raw: &str, node: &MappingNode) -> MappingResult<Option<String>> {
        match transform_value(self.engine, raw, node) {
            Ok(text) => Ok(Some(text)),
            Err(err) => match self.policy {
                ErrorPolicy::Abort => Err(err),
                ErrorPolicy::SkipElement => {
                    warn!(output_path = %node.output_path, error = %err, "skipping element after transformation failure");
                    self.stats.elements_failed += 1;
                    Ok(None)
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::MappingError;
    use crate::rules::build;
    use crate::types::RuleRecord;
    use crate::xml::XmlElementWriter;

    fn tree(records: Vec<RuleRecord>) -> MappingTree {
        let outcome = build(&records);
        assert!(outcome.errors.is_empty(), "{:?}", outcome.errors);
        outcome.tree
    }

    fn render(doc: &Value, tree: &MappingTree) -> (String, EmitStats) {
        let mut writer = XmlElementWriter::fragment();
        let stats = run(&mut writer, doc, tree).unwrap();
        (writer.into_string().unwrap(), stats)
    }

    #[test]
    fn simple_structural_mapping() {
        let doc = json!({ "name": "John", "age": "30" });
        let tree = tree(vec![
            RuleRecord::new("", "person"),
            RuleRecord::new("$.name", "name").with_parent("person").with_order(1),
            RuleRecord::new("$.age", "age").with_parent("person").with_order(2),
        ]);
        let (xml, stats) = render(&doc, &tree);
        assert_eq!(xml, "<person><name>John</name><age>30</age></person>");
        assert_eq!(stats.elements_written, 3);
    }

    #[test]
    fn repeating_array_with_wrapper() {
        let doc = json!({ "items": ["a", "b"] });
        let tree = tree(vec![RuleRecord::new("$.items[*]", "list/item").repeating()]);
        let (xml, _) = render(&doc, &tree);
        assert_eq!(xml, "<list><item>a</item><item>b</item></list>");
    }

    #[test]
    fn null_source_without_default_writes_nothing() {
        let doc = json!({ "age": null });
        let tree = tree(vec![RuleRecord::new("$.name", "name"), RuleRecord::new("$.age", "age")]);
        let (xml, stats) = render(&doc, &tree);
        assert_eq!(xml, "");
        assert_eq!(stats.nodes_skipped, 2);
    }

    #[test]
    fn collector_aggregates_feeds_in_declaration_order() {
        let doc = json!({ "a": [{ "n": "a1" }, { "n": "a2" }], "b": [{ "n": "b1" }] });
        let tree = tree(vec![
            RuleRecord::new("", "All").collector(["$.a[*]", "$.missing[*]", "$.b[*]"]),
            RuleRecord::new("", "Record").with_parent("All"),
            RuleRecord::new("n", "Name").with_parent("Record"),
        ]);
        let (xml, stats) = render(&doc, &tree);
        assert_eq!(
            xml,
            "<All><Record><Name>a1</Name></Record><Record><Name>a2</Name></Record>\
             <Record><Name>b1</Name></Record></All>"
        );
        assert_eq!(stats.collector_items, 3);
        assert_eq!(stats.feeds_missing, 1);
    }

    #[test]
    fn collector_is_written_even_when_empty() {
        let doc = json!({});
        let tree = tree(vec![
            RuleRecord::new("", "All").collector(["$.a[*]"]),
            RuleRecord::new(".", "Record").with_parent("All"),
        ]);
        assert_eq!(render(&doc, &tree).0, "<All></All>");
    }

    #[test]
    fn collector_with_single_value_feed() {
        let doc = json!({ "primary": "p", "others": ["o1", "o2"] });
        let tree = tree(vec![
            RuleRecord::new("", "Names").collector(["$.primary", "$.others[*]"]),
            RuleRecord::new(".", "Name").with_parent("Names"),
        ]);
        assert_eq!(
            render(&doc, &tree).0,
            "<Names><Name>p</Name><Name>o1</Name><Name>o2</Name></Names>"
        );
    }

    #[test]
    fn derived_field_follows_its_condition() {
        let tree = tree(vec![
            RuleRecord::new("", "Row"),
            RuleRecord::new("", "Status").derived("flag", "Active").with_parent("Row"),
        ]);
        let (xml, stats) = render(&json!({ "flag": "x" }), &tree);
        assert_eq!(xml, "<Row><Status>Active</Status></Row>");
        assert_eq!(stats.defaults_used, 1);
        let (xml, stats) = render(&json!({}), &tree);
        assert_eq!(xml, "<Row></Row>");
        assert_eq!(stats.defaults_used, 0);
    }

    #[test]
    fn structural_nodes_are_written_without_data() {
        let tree = tree(vec![
            RuleRecord::new("", "envelope"),
            RuleRecord::new("$.x", "x").with_parent("envelope"),
        ]);
        assert_eq!(render(&json!({}), &tree).0, "<envelope></envelope>");
    }

    #[test]
    fn empty_containers_are_elided() {
        let tree = tree(vec![
            RuleRecord::new("", "person"),
            RuleRecord::new("$.address", "address").with_parent("person"),
            RuleRecord::new("city", "city").with_parent("address"),
        ]);
        for doc in [
            json!({ "address": {} }),
            json!({ "address": { "street": "Main" } }),
            json!({ "address": { "city": null } }),
        ] {
            assert_eq!(render(&doc, &tree).0, "<person></person>", "{doc}");
        }
        assert_eq!(
            render(&json!({ "address": { "city": "Springfield" } }), &tree).0,
            "<person><address><city>Springfield</city></address></person>"
        );
    }

    #[test]
    fn empty_string_children_do_not_keep_containers_alive() {
        let tree_obj = tree(vec![
            RuleRecord::new("", "person"),
            RuleRecord::new("$.address", "address").with_parent("person"),
            RuleRecord::new("city", "city").with_parent("address"),
        ]);
        let (xml, stats) = render(&json!({ "address": { "city": "" } }), &tree_obj);
        assert_eq!(xml, "<person></person>");
        assert_eq!(stats.elements_written, 1);

        let tree_arr = tree(vec![
            RuleRecord::new("$.orders[*]", "orders/order").repeating(),
            RuleRecord::new("id", "id").with_parent("orders/order"),
        ]);
        let doc = json!({ "orders": [{ "id": "" }, { "id": 2 }] });
        assert_eq!(
            render(&doc, &tree_arr).0,
            "<orders><order><id>2</id></order></orders>"
        );
    }

    #[test]
    fn repeating_objects_become_item_contexts() {
        let doc = json!({ "orders": [{ "id": 1 }, null, {}, { "id": 3 }] });
        let tree = tree(vec![
            RuleRecord::new("$.orders[*]", "orders/order").repeating(),
            RuleRecord::new("id", "id").with_parent("orders/order"),
        ]);
        assert_eq!(
            render(&doc, &tree).0,
            "<orders><order><id>1</id></order><order><id>3</id></order></orders>"
        );
    }

    #[test]
    fn repeating_keeps_empty_strings_and_drops_nulls() {
        let doc = json!({ "tags": ["x", "", null, 4] });
        let tree = tree(vec![RuleRecord::new("$.tags", "tag").repeating()]);
        assert_eq!(render(&doc, &tree).0, "<tag>x</tag><tag></tag><tag>4</tag>");
    }

    #[test]
    fn repeating_over_a_scalar_behaves_like_a_single_value() {
        let doc = json!({ "tags": "only" });
        let tree = tree(vec![RuleRecord::new("$.tags", "tag").repeating()]);
        assert_eq!(render(&doc, &tree).0, "<tag>only</tag>");
    }

    #[test]
    fn no_wrappers_when_nothing_is_written() {
        let doc = json!({ "items": [null] });
        let tree = tree(vec![RuleRecord::new("$.items[*]", "list/item").repeating()]);
        assert_eq!(render(&doc, &tree).0, "");
    }

    #[test]
    fn consecutive_siblings_share_wrappers() {
        let doc = json!({ "city": "Springfield", "zip": "12345", "name": "n" });
        let tree = tree(vec![
            RuleRecord::new("$.city", "location/city").with_order(1),
            RuleRecord::new("$.zip", "location/zip").with_order(2),
            RuleRecord::new("$.name", "name").with_order(3),
        ]);
        assert_eq!(
            render(&doc, &tree).0,
            "<location><city>Springfield</city><zip>12345</zip></location><name>n</name>"
        );
    }

    #[test]
    fn relative_and_absolute_sources_agree_at_top_level() {
        let doc = json!({ "a": { "b": "v" } });
        let relative = tree(vec![RuleRecord::new("a.b", "x")]);
        let absolute = tree(vec![RuleRecord::new("$.a.b", "x")]);
        assert_eq!(render(&doc, &relative).0, render(&doc, &absolute).0);
    }

    #[test]
    fn attribute_rules_are_skipped() {
        let doc = json!({ "id": "7", "name": "n" });
        let tree = tree(vec![
            RuleRecord::new("", "person"),
            RuleRecord::new("$.id", "@id").with_parent("person"),
            RuleRecord::new("$.name", "name").with_parent("person"),
        ]);
        assert_eq!(render(&doc, &tree).0, "<person><name>n</name></person>");
    }

    #[test]
    fn expressions_transform_text() {
        let doc = json!({ "qty": 21 });
        let tree = tree(vec![RuleRecord::new("$.qty", "qty")
            .with_types("Integer", "Integer")
            .with_expression("val * 2")]);
        assert_eq!(render(&doc, &tree).0, "<qty>42</qty>");
    }

    #[test]
    fn expression_failure_aborts_by_default() {
        let doc = json!({ "qty": 21 });
        let tree = tree(vec![RuleRecord::new("$.qty", "qty")
            .with_types("Integer", "Integer")
            .with_expression("val / 0")]);
        let mut writer = XmlElementWriter::fragment();
        let err = run(&mut writer, &doc, &tree).unwrap_err();
        assert!(matches!(err, MappingError::Expression { ref output_path, .. } if output_path == "qty"));
    }

    #[test]
    fn expression_failure_can_skip_the_element() {
        let doc = json!({ "qty": 21, "name": "n" });
        let tree = tree(vec![
            RuleRecord::new("", "row"),
            RuleRecord::new("$.qty", "totals/qty")
                .with_parent("row")
                .with_types("Integer", "Integer")
                .with_expression("val / 0"),
            RuleRecord::new("$.name", "name").with_parent("row"),
        ]);
        let mut writer = XmlElementWriter::fragment();
        let stats = Emitter::new(&doc, ExpressionEngine::shared())
            .with_error_policy(ErrorPolicy::SkipElement)
            .run(&mut writer, &tree)
            .unwrap();
        assert_eq!(writer.into_string().unwrap(), "<row><name>n</name></row>");
        assert_eq!(stats.elements_failed, 1);
    }

    #[test]
    fn sibling_order_is_stable_across_runs() {
        let doc = json!({ "a": 1, "b": 2, "c": 3 });
        let tree = tree(vec![
            RuleRecord::new("$.c", "c").with_order(1),
            RuleRecord::new("$.a", "a").with_order(1),
            RuleRecord::new("$.b", "b").with_order(0),
        ]);
        let first = render(&doc, &tree).0;
        assert_eq!(first, "<b>2</b><c>3</c><a>1</a>");
        for _ in 0..5 {
            assert_eq!(render(&doc, &tree).0, first);
        }
    }

    #[test]
    fn emit_writes_a_single_node_for_a_context() {
        let doc = json!({ "item": { "name": "x" } });
        let tree = tree(vec![
            RuleRecord::new("", "out/entry"),
            RuleRecord::new("name", "name").with_parent("out/entry"),
        ]);
        let mut writer = XmlElementWriter::fragment();
        Emitter::new(&doc, ExpressionEngine::shared())
            .emit(&mut writer, &doc["item"], &tree.roots()[0])
            .unwrap();
        assert_eq!(writer.into_string().unwrap(), "<out><entry><name>x</name></entry></out>");
    }
}
