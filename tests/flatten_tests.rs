//! Flatten: cross product of sibling results with prefixed fields.

mod test_data_gen;

use nestq_core::prelude::*;
use nestq_exec::Engine;
use nestq_operators::Capabilities;
use test_data_gen::*;

fn fee_totals() -> Selection {
    Selection::aggregate(
        "fees",
        "totals",
        AggregateQuery {
            filter: Some(Predicate::cmp("value", CompareOp::Gt, dec("0.05"))),
            group: GroupSpec {
                aggregates: vec![
                    AggregateFunction::count("count"),
                    AggregateFunction::new(AggregateKind::Sum, Some("value"), "sum"),
                ],
                ..GroupSpec::default()
            },
        },
    )
}

fn flattened(filter: Option<Predicate>, select: Vec<Selection>, paths: &[(&str, &str)]) -> QueryDescriptor {
    QueryDescriptor::collection(
        "accounts",
        CollectionQuery {
            filter,
            select,
            flatten: Some(FlattenSpec::new(paths)),
            ..CollectionQuery::default()
        },
    )
}

#[test]
fn test_aggregate_crossed_with_sibling_collection() {
    let desc = flattened(
        Some(Predicate::cmp("id", CompareOp::Eq, 1i64)),
        vec![
            Selection::field("id"),
            fee_totals(),
            Selection::collection("contacts", CollectionQuery::default()),
        ],
        &[("totals", "t"), ("contacts", "c")],
    );
    let rows = run_everywhere(&desc);
    assert_eq!(rows.len(), 2);
    for row in &rows {
        assert_eq!(int(row, "id"), 1);
        assert_eq!(scalar(row, "t_count"), &Scalar::I64(2));
        assert_eq!(scalar(row, "t_sum"), &Scalar::Decimal(dec("0.13")));
    }
    let emails: Vec<&Scalar> = rows.iter().map(|r| scalar(r, "c_email")).collect();
    assert_eq!(
        emails,
        vec![&Scalar::from("ada@example.org"), &Scalar::from("ops@example.org")]
    );
    assert_eq!(
        serde_json::to_string(&rows[0]).expect("json"),
        r#"{"id":1,"t_count":2,"t_sum":"0.13","c_email":"ada@example.org"}"#
    );
}

#[test]
fn test_empty_child_drops_parent() {
    let desc = flattened(
        None,
        vec![
            Selection::field("id"),
            Selection::collection("fees", CollectionQuery::default()),
            Selection::collection("contacts", CollectionQuery::default()),
        ],
        &[("fees", "f"), ("contacts", "c")],
    );
    let rows = run_everywhere(&desc);
    // account 2 has no fees, account 3 no contacts
    assert_eq!(rows.len(), 3 * 2);
    assert!(rows.iter().all(|r| int(r, "id") == 1));
}

#[test]
fn test_cardinality_is_product_of_children() {
    let desc = flattened(
        None,
        vec![
            Selection::field("id"),
            Selection::collection("orders", CollectionQuery::default()),
            Selection::collection("contacts", CollectionQuery::default()),
        ],
        &[("orders", "o"), ("contacts", "c")],
    );
    let rows = run_everywhere(&desc);
    let per_account = |id: i64| rows.iter().filter(|r| int(r, "id") == id).count();
    assert_eq!(per_account(1), 3 * 2);
    assert_eq!(per_account(2), 1);
    assert_eq!(per_account(3), 0);

    // first declared child varies slowest
    let first: Vec<i64> = rows
        .iter()
        .filter(|r| int(r, "id") == 1)
        .map(|r| int(r, "o_id"))
        .collect();
    assert_eq!(first, vec![10, 10, 11, 11, 12, 12]);
}

#[test]
fn test_no_group_aggregate_flattens_as_singleton() {
    let desc = flattened(
        None,
        vec![Selection::field("id"), fee_totals()],
        &[("totals", "t")],
    );
    let rows = run_everywhere(&desc);
    assert_eq!(ids(&rows), vec![1, 2, 3]);
    assert_eq!(scalar(&rows[1], "t_count"), &Scalar::I64(0));
    assert_eq!(scalar(&rows[2], "t_sum"), &Scalar::Decimal(dec("0.10")));
}

#[test]
fn test_children_evaluated_in_parallel_match_sequential() {
    let desc = flattened(
        None,
        vec![
            Selection::field("id"),
            Selection::field("owner"),
            Selection::collection(
                "orders",
                CollectionQuery {
                    filter: Some(Predicate::cmp("status", CompareOp::Eq, "open")),
                    select: vec![Selection::field("id"), Selection::field("total")],
                    ..CollectionQuery::default()
                },
            ),
            Selection::aggregate(
                "orders",
                "stats",
                AggregateQuery {
                    filter: None,
                    group: GroupSpec {
                        aggregates: vec![AggregateFunction::count("n")],
                        ..GroupSpec::default()
                    },
                },
            ),
        ],
        &[("orders", "o"), ("stats", "s")],
    );
    let source = generated_source(30, Capabilities::NONE);
    let sequential = run(&desc, &source);
    let parallel = run_with(
        &Engine::new(EngineConfig {
            max_parallel_tasks: 4,
            ..EngineConfig::default()
        }),
        &desc,
        &source,
    );
    assert!(!sequential.is_empty());
    assert_eq!(sequential, parallel);
    assert!(sequential.iter().all(|r| int(r, "s_n") == 6));
}

#[test]
fn test_same_child_under_two_prefixes_crosses_with_itself() {
    let desc = flattened(
        Some(Predicate::cmp("id", CompareOp::Eq, 1i64)),
        vec![
            Selection::field("id"),
            Selection::collection("contacts", CollectionQuery::default()),
        ],
        &[("contacts", "a"), ("contacts", "b")],
    );
    let rows = run_everywhere(&desc);
    assert_eq!(rows.len(), 4);
    let pairs: Vec<(&Scalar, &Scalar)> = rows
        .iter()
        .map(|r| (scalar(r, "a_email"), scalar(r, "b_email")))
        .collect();
    let ada = Scalar::from("ada@example.org");
    let ops = Scalar::from("ops@example.org");
    assert_eq!(
        pairs,
        vec![(&ada, &ada), (&ada, &ops), (&ops, &ada), (&ops, &ops)]
    );
}
