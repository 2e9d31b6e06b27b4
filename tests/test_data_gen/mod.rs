//! Shared fixtures for integration tests.
//!
//! One schema, one small hand-written dataset (including the fee/contact
//! account used by the flatten tests), and a generator for larger synthetic
//! trees. Sources can be built with every capability on or off so the same
//! query runs against both backends.

#![allow(dead_code)]

use chrono::NaiveDate;
use rust_decimal::Decimal;

use nestq_core::cancel::RequestContext;
use nestq_core::query::QueryDescriptor;
use nestq_core::types::{Record, Scalar, Value};
use nestq_exec::Engine;
use nestq_io::MemorySource;
use nestq_operators::Capabilities;
use nestq_planner::{compile_query, parse_catalog_yaml, Catalog};

pub const SCHEMA_YAML: &str = r#"
roots:
  accounts:
    - { name: id, type: int }
    - { name: owner, type: string }
    - { name: region, type: string, nullable: true }
    - name: fees
      type: list
      fields:
        - { name: label, type: string }
        - { name: value, type: decimal }
    - name: contacts
      type: list
      fields:
        - { name: email, type: string }
    - name: orders
      type: list
      fields:
        - { name: id, type: int }
        - { name: status, type: string }
        - { name: placed, type: date }
        - { name: total, type: decimal, nullable: true }
        - name: lines
          type: list
          fields:
            - { name: sku, type: string }
            - { name: qty, type: int }
"#;

pub const DATASET_JSON: &str = r#"{
  "accounts": [
    {
      "id": 1, "owner": "ada", "region": "north",
      "fees": [
        { "label": "setup", "value": 0.04 },
        { "label": "monthly", "value": 0.06 },
        { "label": "transfer", "value": 0.07 }
      ],
      "contacts": [ { "email": "ada@example.org" }, { "email": "ops@example.org" } ],
      "orders": [
        { "id": 10, "status": "open", "placed": "2024-03-01", "total": "12.50",
          "lines": [ { "sku": "a", "qty": 1 }, { "sku": "b", "qty": 4 } ] },
        { "id": 11, "status": "closed", "placed": "2024-01-15", "total": "3.10",
          "lines": [ { "sku": "a", "qty": 2 } ] },
        { "id": 12, "status": "open", "placed": "2024-02-20", "total": null,
          "lines": [] }
      ]
    },
    {
      "id": 2, "owner": "bob", "region": null,
      "fees": [],
      "contacts": [ { "email": "bob@example.org" } ],
      "orders": [
        { "id": 20, "status": "open", "placed": "2023-12-31", "total": "7.00",
          "lines": [ { "sku": "c", "qty": 9 } ] }
      ]
    },
    {
      "id": 3, "owner": "cy", "region": "south",
      "fees": [ { "label": "setup", "value": "0.10" } ],
      "contacts": [],
      "orders": []
    }
  ]
}"#;

pub fn catalog() -> Catalog {
    parse_catalog_yaml(SCHEMA_YAML).expect("fixture schema parses")
}

/// The hand-written dataset, advertising `caps` as native.
pub fn source(caps: Capabilities) -> MemorySource {
    let cat = catalog();
    MemorySource::from_json("fixture", DATASET_JSON, cat.roots())
        .expect("fixture dataset loads")
        .with_capabilities(caps)
}

/// Capability sets every conformance test runs against.
pub fn capability_matrix() -> Vec<Capabilities> {
    vec![
        Capabilities::NONE,
        Capabilities::ALL,
        Capabilities {
            filter: true,
            ..Capabilities::NONE
        },
        Capabilities {
            sort: true,
            slice: true,
            ..Capabilities::NONE
        },
        Capabilities {
            count: true,
            group_aggregate: true,
            ..Capabilities::NONE
        },
        Capabilities {
            filter: true,
            group_aggregate: true,
            ..Capabilities::NONE
        },
    ]
}

pub fn run(desc: &QueryDescriptor, source: &MemorySource) -> Vec<Record> {
    run_with(&Engine::default(), desc, source)
}

pub fn run_with(engine: &Engine, desc: &QueryDescriptor, source: &MemorySource) -> Vec<Record> {
    let plan = compile_query(desc, &catalog()).expect("query compiles");
    engine
        .execute(&plan, source, &RequestContext::new())
        .expect("query executes")
}

/// Runs `desc` against every capability set and asserts identical output.
pub fn run_everywhere(desc: &QueryDescriptor) -> Vec<Record> {
    let mut results = capability_matrix()
        .into_iter()
        .map(|caps| (caps, run(desc, &source(caps))));
    let (_, expected) = results.next().expect("matrix is non-empty");
    for (caps, rows) in results {
        assert_eq!(rows, expected, "backend {caps:?} diverged");
    }
    expected
}

pub fn dec(s: &str) -> Decimal {
    s.parse().expect("decimal literal")
}

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("date literal")
}

pub fn scalar<'r>(rec: &'r Record, name: &str) -> &'r Scalar {
    match rec.get(name) {
        Some(Value::Scalar(s)) => s,
        other => panic!("field {name} is not a scalar: {other:?}"),
    }
}

pub fn int(rec: &Record, name: &str) -> i64 {
    match scalar(rec, name) {
        Scalar::I64(v) => *v,
        other => panic!("field {name} is not an integer: {other:?}"),
    }
}

pub fn list<'r>(rec: &'r Record, name: &str) -> Vec<&'r Record> {
    rec.get(name)
        .and_then(Value::as_list)
        .unwrap_or_default()
        .iter()
        .filter_map(Value::as_record)
        .collect()
}

pub fn ids(rows: &[Record]) -> Vec<i64> {
    rows.iter().map(|r| int(r, "id")).collect()
}

/// Synthetic accounts: `n` accounts, each with `orders` orders of `lines`
/// lines. Quantities and totals cycle so filters and groups are non-trivial.
pub fn generate_accounts(n: usize, orders: usize, lines: usize) -> Vec<Record> {
    (0..n)
        .map(|a| {
            let order_records: Vec<Record> = (0..orders)
                .map(|o| {
                    let line_records: Vec<Record> = (0..lines)
                        .map(|l| {
                            Record::new()
                                .with("sku", format!("sku-{}", (a + o + l) % 7))
                                .with("qty", ((a * 3 + o * 5 + l) % 11) as i64)
                        })
                        .collect();
                    Record::new()
                        .with("id", (a * 1000 + o) as i64)
                        .with("status", if o % 3 == 0 { "closed" } else { "open" })
                        .with(
                            "placed",
                            date("2024-01-01") + chrono::Days::new(((a + o) % 90) as u64),
                        )
                        .with("total", Decimal::new(((a + o * 7) % 500) as i64, 2))
                        .with("lines", line_records)
                })
                .collect();
            Record::new()
                .with("id", a as i64)
                .with("owner", format!("owner-{}", a % 13))
                .with(
                    "region",
                    if a % 5 == 0 {
                        Value::Scalar(Scalar::Null)
                    } else {
                        Value::from(["north", "south", "east"][a % 3])
                    },
                )
                .with("fees", Vec::<Record>::new())
                .with("contacts", Vec::<Record>::new())
                .with("orders", order_records)
        })
        .collect()
}

pub fn generated_source(n: usize, caps: Capabilities) -> MemorySource {
    MemorySource::new("generated")
        .with_root("accounts", generate_accounts(n, 6, 4))
        .with_capabilities(caps)
}
