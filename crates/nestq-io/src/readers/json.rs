//! JSON → `Record`, guided by the declared schema.
//!
//! Fields come out in schema order. Missing fields read as null when the
//! field is nullable; undeclared fields are rejected rather than dropped.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::Value as Json;

use nestq_core::schema::{DataType, Schema};
use nestq_core::types::{Record, Scalar, Value};

use crate::error::{Error, Result};

/// Read `{ "<root>": [ {...}, ... ], ... }` for the given declared roots.
/// Declared roots absent from the document are empty.
pub fn read_dataset<'s>(
    src: &str,
    roots: impl IntoIterator<Item = (&'s str, &'s Schema)>,
) -> Result<BTreeMap<String, Vec<Record>>> {
    let doc: Json = serde_json::from_str(src)?;
    let Json::Object(mut obj) = doc else {
        return Err(invalid("", "dataset must be an object keyed by root name"));
    };
    let mut out = BTreeMap::new();
    for (name, schema) in roots {
        let records = match obj.remove(name) {
            None | Some(Json::Null) => Vec::new(),
            Some(Json::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(i, item)| record_from_json(item, schema, &format!("{name}[{i}]")))
                .collect::<Result<_>>()?,
            Some(_) => return Err(invalid(name, "expected an array of records")),
        };
        out.insert(name.to_string(), records);
    }
    if let Some(extra) = obj.keys().next() {
        return Err(invalid(extra, "root is not declared"));
    }
    Ok(out)
}

pub fn record_from_json(json: &Json, schema: &Schema, path: &str) -> Result<Record> {
    let Json::Object(obj) = json else {
        return Err(invalid(path, "expected an object"));
    };
    if let Some(extra) = obj.keys().find(|k| schema.field_named(k).is_none()) {
        return Err(invalid(&format!("{path}.{extra}"), "field is not declared"));
    }
    let mut rec = Record::new();
    for field in &schema.fields {
        let fpath = format!("{path}.{}", field.name);
        let value = match obj.get(&field.name) {
            None | Some(Json::Null) => {
                if !field.nullable {
                    return Err(invalid(&fpath, "missing value for non-nullable field"));
                }
                Value::Scalar(Scalar::Null)
            }
            Some(v) => value_from_json(v, &field.data_type, &fpath)?,
        };
        rec.push(field.name.clone(), value);
    }
    Ok(rec)
}

fn value_from_json(json: &Json, ty: &DataType, path: &str) -> Result<Value> {
    let mismatch = || invalid(path, &format!("expected {}", ty.name()));
    let scalar = match (ty, json) {
        (_, Json::Null) => Scalar::Null,
        (DataType::Boolean, Json::Bool(b)) => Scalar::Bool(*b),
        (DataType::Int64, Json::Number(n)) => Scalar::I64(n.as_i64().ok_or_else(mismatch)?),
        (DataType::Decimal, Json::Number(n)) => {
            Scalar::Decimal(Decimal::from_str(&n.to_string()).map_err(|_| mismatch())?)
        }
        (DataType::Decimal, Json::String(s)) => {
            Scalar::Decimal(Decimal::from_str(s).map_err(|_| mismatch())?)
        }
        (DataType::Utf8, Json::String(s)) => Scalar::Str(s.clone()),
        (DataType::Date, Json::String(s)) => Scalar::Date(
            NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| mismatch())?,
        ),
        (DataType::Struct(schema), obj @ Json::Object(_)) => {
            return Ok(Value::Record(record_from_json(obj, schema, path)?))
        }
        (DataType::List(inner), Json::Array(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                out.push(value_from_json(item, inner, &format!("{path}[{i}]"))?);
            }
            return Ok(Value::List(out));
        }
        _ => return Err(mismatch()),
    };
    Ok(Value::Scalar(scalar))
}

fn invalid(path: &str, detail: &str) -> Error {
    Error::InvalidRecord {
        path: path.to_string(),
        detail: detail.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nestq_core::path::FieldPath;
    use nestq_core::schema::Field;

    fn schema() -> Schema {
        let item = Schema::new(vec![Field::new("v", DataType::Decimal, false)]);
        Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("day", DataType::Date, true),
            Field::new("items", DataType::list_of(item), true),
        ])
    }

    #[test]
    fn decimals_keep_their_written_digits() {
        let data = read_dataset(
            r#"{"t": [{"id": 1, "items": [{"v": 0.04}, {"v": "0.07"}]}]}"#,
            [("t", &schema())],
        )
        .expect("read");
        let rec = &data["t"][0];
        let items = rec.get("items").and_then(Value::as_list).expect("items");
        let first = items[0].as_record().expect("record");
        assert_eq!(
            first.scalar_at(&FieldPath::from("v")),
            &Scalar::Decimal(Decimal::new(4, 2))
        );
        assert_eq!(rec.get("day"), Some(&Value::Scalar(Scalar::Null)));
    }

    #[test]
    fn undeclared_fields_are_rejected() {
        let err = read_dataset(r#"{"t": [{"id": 1, "extra": true}]}"#, [("t", &schema())])
            .expect_err("extra field");
        assert!(matches!(err, Error::InvalidRecord { path, .. } if path == "t[0].extra"));
    }

    #[test]
    fn non_nullable_fields_are_required() {
        let err = read_dataset(r#"{"t": [{"day": "2024-01-02"}]}"#, [("t", &schema())])
            .expect_err("missing id");
        assert!(matches!(err, Error::InvalidRecord { .. }));
    }
}
