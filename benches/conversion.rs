use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use serde_json::{json, Value};

use json_xml_mapping::convert::{convert_value, ConvertOptions};
use json_xml_mapping::execution::{ExecutionEngine, ExecutionOptions};
use json_xml_mapping::rules::build;
use json_xml_mapping::types::{MappingTree, RuleRecord};

fn orders_tree() -> MappingTree {
    build(&[
        RuleRecord::new("", "Orders"),
        RuleRecord::new("$.orders[*]", "Order").with_parent("Orders").repeating(),
        RuleRecord::new("id", "Id").with_parent("Order").with_order(1),
        RuleRecord::new("customer.name", "Customer").with_parent("Order").with_order(2),
        RuleRecord::new("total", "Total")
            .with_parent("Order")
            .with_order(3)
            .with_types("double", "double")
            .with_expression("val * 1.2"),
        RuleRecord::new("lines[*]", "Lines/Sku").with_parent("Order").with_order(4).repeating(),
        RuleRecord::new("", "Flagged")
            .with_parent("Order")
            .with_order(5)
            .derived("priority", "true"),
        RuleRecord::new("", "OrderRefs").collector(["$.orders[*]"]),
        RuleRecord::new("id", "Ref").with_parent("OrderRefs"),
    ])
    .into_strict()
    .unwrap_or_else(|e| panic!("bench rules must build: {e}"))
}

fn orders_doc(n: usize) -> Value {
    let orders = (0..n)
        .map(|i| {
            json!({
                "id": i,
                "customer": { "name": format!("customer-{i}") },
                "total": (i as f64) * 3.5,
                "lines": ["A", "B", "C"],
                "priority": i % 3 == 0,
            })
        })
        .collect::<Vec<_>>();
    json!({ "orders": orders })
}

fn bench_single_document(c: &mut Criterion) {
    let tree = orders_tree();
    let doc = orders_doc(1_000);
    let options = ConvertOptions::default();

    let mut group = c.benchmark_group("single_document");
    group.throughput(Throughput::Elements(1_000));
    group.bench_function("orders_1000", |b| {
        b.iter(|| convert_value(black_box(&doc), &tree, &options).unwrap_or_default())
    });
    group.finish();
}

fn bench_batch(c: &mut Criterion) {
    let tree = orders_tree();
    let docs = (0..64).map(|_| orders_doc(50)).collect::<Vec<_>>();
    let options = ConvertOptions::default();
    let engine = ExecutionEngine::new(ExecutionOptions::default())
        .unwrap_or_else(|e| panic!("engine must start: {e}"));

    let mut group = c.benchmark_group("batch");
    group.throughput(Throughput::Elements(docs.len() as u64));
    group.bench_function("documents_64", |b| {
        b.iter(|| engine.convert_documents(&tree, black_box(&docs), &options).len())
    });
    group.finish();
}

criterion_group!(benches, bench_single_document, bench_batch);
criterion_main!(benches);
