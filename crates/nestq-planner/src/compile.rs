//! Descriptor validation and binding.
//!
//! Pure: runs before any data access, and every failure carries the
//! offending path.

use std::collections::HashSet;

use nestq_core::error::CompileError;
use nestq_core::hash::hash_serde;
use nestq_core::path::FieldPath;
use nestq_core::query::{
    AggregateQuery, CollectionQuery, Predicate, QueryBody, QueryDescriptor, Selection,
};
use nestq_core::schema::{DataType, Field, Schema};
use nestq_operators::{AggregatePipeline, CollectionOp, FlattenPlan};

use crate::catalog::{Catalog, CollectionField};
use crate::error::PlanError;
use crate::plan::{AggregationPlan, CollectionPlan, PlanBody, QueryPlan, SelectionPlan};

/// Where a sequence sits: its catalog key and its display path.
struct Scope<'a> {
    catalog: &'a Catalog,
    root: &'a str,
    prefix: FieldPath,
    display: String,
}

impl<'a> Scope<'a> {
    fn nested(&self, path: &FieldPath) -> Scope<'a> {
        Scope {
            catalog: self.catalog,
            root: self.root,
            prefix: self.prefix.join(path),
            display: format!("{}.{}", self.display, path),
        }
    }

    fn collection(&self, path: &FieldPath, element: &Schema) -> Result<&'a CollectionField, CompileError> {
        let field = element.resolve(path)?;
        self.catalog
            .collection(self.root, &self.prefix.join(path))
            .ok_or_else(|| CompileError::FieldTypeMismatch {
                path: path.to_string(),
                detail: format!("expected a sequence of records, found {}", field.data_type.name()),
            })
    }

    /// Fails unless every used operator is enabled on the registered field.
    fn require(
        &self,
        entry: &CollectionField,
        path: &FieldPath,
        used: &[(bool, &str)],
    ) -> Result<(), CompileError> {
        match used
            .iter()
            .find(|(on, op)| *on && !entry.operators.allows(op))
        {
            Some((_, op)) => Err(CompileError::OperatorNotEnabled {
                path: format!("{}.{}", self.display, path),
                operator: op.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Count predicates need `count` on the counted field, at any depth.
    fn require_counts(&self, pred: &Predicate) -> Result<(), CompileError> {
        match pred {
            Predicate::Comparison { .. } => Ok(()),
            Predicate::And { terms } | Predicate::Or { terms } => {
                terms.iter().try_for_each(|t| self.require_counts(t))
            }
            Predicate::Not { term } => self.require_counts(term),
            Predicate::CollectionCount { path, inner, .. } => {
                // Unknown paths are reported by the predicate compiler.
                if let Some(entry) = self.catalog.collection(self.root, &self.prefix.join(path)) {
                    self.require(entry, path, &[(true, "count")])?;
                }
                match inner {
                    Some(inner) => self.nested(path).require_counts(inner),
                    None => Ok(()),
                }
            }
        }
    }
}

pub fn compile_query(desc: &QueryDescriptor, catalog: &Catalog) -> Result<QueryPlan, PlanError> {
    let element = catalog
        .root(&desc.source)
        .ok_or_else(|| CompileError::UnknownFieldPath {
            path: desc.source.clone(),
        })?;
    let scope = Scope {
        catalog,
        root: &desc.source,
        prefix: FieldPath::new(Vec::new()),
        display: desc.source.clone(),
    };
    let body = match &desc.body {
        QueryBody::Collection(q) => PlanBody::Collection(compile_collection(q, element, &scope)?),
        QueryBody::Aggregate(q) => PlanBody::Aggregate(compile_aggregation(q, element, &scope)?),
    };
    Ok(QueryPlan {
        source: desc.source.clone(),
        fingerprint: hash_serde(desc)?,
        descriptor: desc.clone(),
        body,
    })
}

fn compile_aggregation(
    query: &AggregateQuery,
    element: &Schema,
    scope: &Scope<'_>,
) -> Result<AggregationPlan, CompileError> {
    let filters = query
        .group
        .aggregates
        .iter()
        .filter_map(|f| f.filter.as_ref())
        .chain(query.filter.as_ref());
    for pred in filters {
        scope.require_counts(pred)?;
    }
    Ok(AggregationPlan {
        path: scope.display.clone(),
        element: element.clone(),
        pipeline: AggregatePipeline::compile(query, element, &scope.display)?,
    })
}

fn compile_collection(
    query: &CollectionQuery,
    element: &Schema,
    scope: &Scope<'_>,
) -> Result<CollectionPlan, CompileError> {
    if let Some(pred) = &query.filter {
        scope.require_counts(pred)?;
    }
    let op = CollectionOp::compile(query, element, &scope.display)?;

    let mut names = HashSet::new();
    let mut select = Vec::with_capacity(query.select.len());
    let mut output = Schema::default();
    for sel in &query.select {
        let name = sel.output_name();
        if name.is_empty() {
            return Err(CompileError::unknown(sel.path()));
        }
        if !names.insert(name.clone()) {
            return Err(CompileError::DuplicateAlias {
                path: scope.display.clone(),
                alias: name,
            });
        }
        let (plan, field) = compile_selection(sel, name, element, scope)?;
        select.push(plan);
        output.fields.push(field);
    }

    let flatten = match &query.flatten {
        Some(spec) => {
            let children: Vec<(String, Schema)> = select
                .iter()
                .filter_map(|s| match s {
                    SelectionPlan::Collection { name, plan, .. } => {
                        Some((name.clone(), plan.output.clone()))
                    }
                    SelectionPlan::Aggregate { name, plan, .. } => {
                        Some((name.clone(), plan.output_schema().clone()))
                    }
                    SelectionPlan::Field { .. } => None,
                })
                .collect();
            Some(FlattenPlan::compile(spec, &output, &children, &scope.display)?)
        }
        None => None,
    };

    let output = match (&flatten, select.is_empty()) {
        (Some(f), _) => f.output_schema().clone(),
        (None, true) => element.clone(),
        (None, false) => output,
    };

    Ok(CollectionPlan {
        path: scope.display.clone(),
        element: element.clone(),
        op,
        select,
        flatten,
        output,
    })
}

fn compile_selection(
    sel: &Selection,
    name: String,
    element: &Schema,
    scope: &Scope<'_>,
) -> Result<(SelectionPlan, Field), CompileError> {
    match sel {
        Selection::Field { path, .. } => {
            let field = element.resolve(path)?;
            Ok((
                SelectionPlan::Field {
                    path: path.clone(),
                    name: name.clone(),
                    data_type: field.data_type.clone(),
                },
                Field::new(name, field.data_type.clone(), field.nullable),
            ))
        }
        Selection::Collection { path, query, .. } => {
            let entry = scope.collection(path, element)?;
            scope.require(
                entry,
                path,
                &[
                    (query.filter.is_some(), "filter"),
                    (!query.order.is_empty(), "order"),
                    (query.slice.is_some(), "slice"),
                    (query.flatten.is_some(), "flatten"),
                ],
            )?;
            let plan = compile_collection(query, &entry.element, &scope.nested(path))?;
            let field = Field::new(name.clone(), DataType::list_of(plan.output.clone()), true);
            Ok((
                SelectionPlan::Collection {
                    path: path.clone(),
                    name,
                    plan: Box::new(plan),
                },
                field,
            ))
        }
        Selection::Aggregate { path, query, .. } => {
            let entry = scope.collection(path, element)?;
            scope.require(entry, path, &[(true, "aggregate")])?;
            let plan = compile_aggregation(query, &entry.element, &scope.nested(path))?;
            let field = Field::new(
                name.clone(),
                DataType::list_of(plan.output_schema().clone()),
                false,
            );
            Ok((
                SelectionPlan::Aggregate {
                    path: path.clone(),
                    name,
                    plan: Box::new(plan),
                },
                field,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nestq_core::query::{AggregateFunction, FlattenSpec, GroupSpec};

    fn catalog() -> Catalog {
        let line = Schema::new(vec![
            Field::new("sku", DataType::Utf8, false),
            Field::new("qty", DataType::Int64, false),
        ]);
        let order = Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("lines", DataType::list_of(line), true),
        ]);
        let mut c = Catalog::new();
        c.register("orders", order);
        c
    }

    #[test]
    fn nested_outputs_are_typed_from_their_plans() {
        let desc = QueryDescriptor::collection(
            "orders",
            CollectionQuery {
                select: vec![
                    Selection::field("id"),
                    Selection::aggregate(
                        "lines",
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
                ..CollectionQuery::default()
            },
        );
        let plan = compile_query(&desc, &catalog()).expect("compile");
        let stats = plan
            .output_schema()
            .field_named("stats")
            .and_then(|f| f.data_type.element_schema())
            .expect("stats is a list of records");
        assert_eq!(stats.field_named("n").map(|f| &f.data_type), Some(&DataType::Int64));
    }

    #[test]
    fn duplicate_output_names_are_rejected() {
        let desc = QueryDescriptor::collection(
            "orders",
            CollectionQuery {
                select: vec![Selection::field("id"), Selection::field("id")],
                ..CollectionQuery::default()
            },
        );
        let err = compile_query(&desc, &catalog()).expect_err("duplicate");
        assert!(matches!(
            err.as_compile(),
            Some(CompileError::DuplicateAlias { alias, .. }) if alias == "id"
        ));
    }

    #[test]
    fn collection_selection_needs_a_sequence() {
        let desc = QueryDescriptor::collection(
            "orders",
            CollectionQuery {
                select: vec![Selection::collection("id", CollectionQuery::default())],
                ..CollectionQuery::default()
            },
        );
        let err = compile_query(&desc, &catalog()).expect_err("scalar");
        assert!(matches!(
            err.as_compile(),
            Some(CompileError::FieldTypeMismatch { .. })
        ));
    }

    #[test]
    fn flatten_must_name_a_sibling_selection() {
        let desc = QueryDescriptor::collection(
            "orders",
            CollectionQuery {
                select: vec![Selection::field("id")],
                flatten: Some(FlattenSpec::new(&[("lines", "l")])),
                ..CollectionQuery::default()
            },
        );
        let err = compile_query(&desc, &catalog()).expect_err("not selected");
        assert_eq!(err.as_compile().map(CompileError::path), Some("orders.lines"));
    }

    #[test]
    fn unknown_source_is_reported() {
        let desc = QueryDescriptor::collection("nope", CollectionQuery::default());
        let err = compile_query(&desc, &catalog()).expect_err("unknown root");
        assert_eq!(err.as_compile().map(CompileError::path), Some("nope"));
    }
}
