use criterion::{criterion_group, criterion_main, Criterion};
use nestq_core::prelude::*;
use nestq_exec::Engine;
use nestq_io::MemorySource;
use nestq_operators::Capabilities;
use nestq_planner::{compile_query, Catalog};
use rust_decimal::Decimal;

fn catalog() -> Catalog {
    let line = Schema::new(vec![
        Field::new("sku", DataType::Utf8, false),
        Field::new("qty", DataType::Int64, false),
        Field::new("price", DataType::Decimal, false),
    ]);
    let order = Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("status", DataType::Utf8, false),
        Field::new("lines", DataType::list_of(line), false),
    ]);
    let mut cat = Catalog::new();
    cat.register("orders", order);
    cat
}

fn make_orders(n: usize, lines: usize) -> Vec<Record> {
    (0..n)
        .map(|i| {
            let items: Vec<Record> = (0..lines)
                .map(|l| {
                    Record::new()
                        .with("sku", format!("sku-{}", (i + l) % 17))
                        .with("qty", ((i * 7 + l) % 13) as i64)
                        .with("price", Decimal::new(((i + l * 31) % 1000) as i64, 2))
                })
                .collect();
            Record::new()
                .with("id", i as i64)
                .with("status", if i % 4 == 0 { "closed" } else { "open" })
                .with("lines", items)
        })
        .collect()
}

fn line_stats() -> Selection {
    Selection::aggregate(
        "lines",
        "stats",
        AggregateQuery {
            filter: Some(Predicate::cmp("qty", CompareOp::Gt, 3i64)),
            group: GroupSpec {
                aggregates: vec![
                    AggregateFunction::count("n"),
                    AggregateFunction::new(AggregateKind::Sum, Some("price"), "total"),
                ],
                ..GroupSpec::default()
            },
        },
    )
}

fn bench_nested_aggregate(c: &mut Criterion) {
    let desc = QueryDescriptor::collection(
        "orders",
        CollectionQuery {
            filter: Some(Predicate::count(
                "lines",
                Some(Predicate::cmp("qty", CompareOp::Gte, 10i64)),
                CompareOp::Gte,
                1,
            )),
            order: vec![SortKey::desc("id")],
            select: vec![Selection::field("id"), line_stats()],
            ..CollectionQuery::default()
        },
    );
    let plan = compile_query(&desc, &catalog()).unwrap();
    for (name, caps) in [("fallback", Capabilities::NONE), ("native", Capabilities::ALL)] {
        let source = MemorySource::new("bench")
            .with_root("orders", make_orders(2_000, 8))
            .with_capabilities(caps);
        let engine = Engine::default();
        c.bench_function(&format!("nested_aggregate_{name}"), |b| {
            b.iter(|| {
                let _ = engine
                    .execute(&plan, &source, &RequestContext::new())
                    .unwrap();
            })
        });
    }
}

fn bench_flatten(c: &mut Criterion) {
    let desc = QueryDescriptor::collection(
        "orders",
        CollectionQuery {
            select: vec![
                Selection::field("id"),
                line_stats(),
                Selection::collection("lines", CollectionQuery::default()),
            ],
            flatten: Some(FlattenSpec::new(&[("stats", "s"), ("lines", "l")])),
            ..CollectionQuery::default()
        },
    );
    let plan = compile_query(&desc, &catalog()).unwrap();
    let source = MemorySource::new("bench").with_root("orders", make_orders(1_000, 8));
    for parallel in [1, 4] {
        let engine = Engine::new(EngineConfig {
            max_parallel_tasks: parallel,
            ..EngineConfig::default()
        });
        c.bench_function(&format!("flatten_parallel_{parallel}"), |b| {
            b.iter(|| {
                let _ = engine
                    .execute(&plan, &source, &RequestContext::new())
                    .unwrap();
            })
        });
    }
}

criterion_group!(benches, bench_nested_aggregate, bench_flatten);
criterion_main!(benches);
