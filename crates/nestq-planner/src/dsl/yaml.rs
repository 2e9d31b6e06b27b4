//! YAML/JSON front-ends for descriptors and record schemas.
//!
//! Query example:
//! ```yaml
//! source: orders
//! collection:
//!   filter: { kind: comparison, path: status, op: eq, value: open }
//!   order: [ { path: placed, direction: desc } ]
//!   slice: { first: 10 }
//!   select:
//!     - { kind: field, path: id }
//!     - kind: aggregate
//!       path: lines
//!       alias: totals
//!       query:
//!         group:
//!           aggregates: [ { kind: sum, target: amount, alias: total } ]
//! ```
//!
//! Schema example:
//! ```yaml
//! roots:
//!   orders:
//!     - { name: id, type: int }
//!     - { name: status, type: string, nullable: true }
//!     - name: lines
//!       type: list
//!       operators: [filter, count, aggregate]
//!       fields:
//!         - { name: amount, type: decimal }
//! ```
//!
//! A list without `operators` accepts every operator.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use nestq_core::path::FieldPath;
use nestq_core::query::QueryDescriptor;
use nestq_core::schema::{DataType, Field, Schema};

use crate::catalog::{Catalog, OperatorSet};
use crate::error::PlanError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDoc {
    pub roots: BTreeMap<String, Vec<FieldDef>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default)]
    pub nullable: bool,
    /// Members of a `record`, or the element of a `list`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldDef>,
    /// Operators a `list` field accepts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operators: Option<Vec<String>>,
}

fn parse_dtype(def: &FieldDef) -> Result<DataType, PlanError> {
    Ok(match def.data_type.as_str() {
        "bool" | "boolean" => DataType::Boolean,
        "int" | "i64" | "int64" => DataType::Int64,
        "decimal" => DataType::Decimal,
        "string" | "str" | "utf8" => DataType::Utf8,
        "date" => DataType::Date,
        "record" | "struct" => DataType::Struct(to_schema(&def.fields)?),
        "list" => DataType::list_of(to_schema(&def.fields)?),
        other => {
            return Err(PlanError::Schema(format!(
                "field '{}': unknown type '{other}'",
                def.name
            )))
        }
    })
}

fn to_schema(fields: &[FieldDef]) -> Result<Schema, PlanError> {
    let mut out = Schema::default();
    for def in fields {
        if out.field_named(&def.name).is_some() {
            return Err(PlanError::Schema(format!("field '{}' declared twice", def.name)));
        }
        out.fields
            .push(Field::new(def.name.clone(), parse_dtype(def)?, def.nullable));
    }
    Ok(out)
}

/// Parse a schema document and run the registration pass over every root.
pub fn parse_catalog_yaml(src: &str) -> Result<Catalog, PlanError> {
    let doc: SchemaDoc = serde_yaml::from_str(src)?;
    let mut catalog = Catalog::new();
    for (root, fields) in &doc.roots {
        catalog.register(root, to_schema(fields)?);
        let mut restricted = Vec::new();
        operator_lists(fields, &FieldPath::new(Vec::new()), &mut restricted);
        for (path, names) in restricted {
            catalog.restrict(root, &path, OperatorSet::from_names(names)?)?;
        }
    }
    Ok(catalog)
}

fn operator_lists<'d>(
    fields: &'d [FieldDef],
    prefix: &FieldPath,
    out: &mut Vec<(FieldPath, &'d [String])>,
) {
    for def in fields {
        let path = prefix.child(&def.name);
        if let Some(names) = &def.operators {
            out.push((path.clone(), names.as_slice()));
        }
        operator_lists(&def.fields, &path, out);
    }
}

pub fn parse_query_yaml(src: &str) -> Result<QueryDescriptor, PlanError> {
    Ok(serde_yaml::from_str(src)?)
}

pub fn parse_query_json(src: &str) -> Result<QueryDescriptor, PlanError> {
    Ok(serde_json::from_str(src)?)
}

/// JSON when the document starts with `{`, YAML otherwise.
pub fn parse_query(src: &str) -> Result<QueryDescriptor, PlanError> {
    if src.trim_start().starts_with('{') {
        parse_query_json(src)
    } else {
        parse_query_yaml(src)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_lists_are_registered() {
        let catalog = parse_catalog_yaml(
            r#"
roots:
  orders:
    - { name: id, type: int }
    - name: lines
      type: list
      fields:
        - { name: amount, type: decimal }
"#,
        )
        .expect("schema");
        let lines = catalog
            .collection("orders", &FieldPath::from("lines"))
            .expect("registered");
        assert_eq!(
            lines.element.field_named("amount").map(|f| &f.data_type),
            Some(&DataType::Decimal)
        );
    }

    #[test]
    fn operators_narrow_a_list_field() {
        let catalog = parse_catalog_yaml(
            r#"
roots:
  orders:
    - name: lines
      type: list
      operators: [filter, count]
      fields:
        - { name: amount, type: decimal }
    - name: notes
      type: list
      fields:
        - { name: text, type: string }
"#,
        )
        .expect("schema");
        let ops = |path: &str| {
            catalog
                .collection("orders", &FieldPath::from(path))
                .map(|f| f.operators.names())
        };
        assert_eq!(ops("lines"), Some(vec!["filter", "count"]));
        assert_eq!(ops("notes").map(|n| n.len()), Some(6));

        let err = parse_catalog_yaml(
            "roots:\n  t:\n    - { name: x, type: int, operators: [filter] }\n",
        )
        .expect_err("scalars take no operators");
        assert!(matches!(err, PlanError::Schema(_)));
    }

    #[test]
    fn unknown_types_are_rejected() {
        let err = parse_catalog_yaml("roots:\n  t:\n    - { name: x, type: float }\n")
            .expect_err("float is not a type");
        assert!(matches!(err, PlanError::Schema(_)));
    }
}
