//! Registration pass over declared record types.
//!
//! Every sequence-of-records field reachable from a root (through nested
//! records and nested sequences) gets a static `CollectionField` entry once,
//! at registration time. Compilation only consults these entries; nothing
//! inspects types at request time.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use nestq_core::path::FieldPath;
use nestq_core::schema::{DataType, Schema};

use crate::error::PlanError;

/// Operators attachable to one collection field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorSet {
    pub filter: bool,
    pub order: bool,
    pub slice: bool,
    pub count: bool,
    pub aggregate: bool,
    pub flatten: bool,
}

impl OperatorSet {
    pub const ALL: OperatorSet = OperatorSet {
        filter: true,
        order: true,
        slice: true,
        count: true,
        aggregate: true,
        flatten: true,
    };

    pub const NONE: OperatorSet = OperatorSet {
        filter: false,
        order: false,
        slice: false,
        count: false,
        aggregate: false,
        flatten: false,
    };

    fn flags(&self) -> [(bool, &'static str); 6] {
        [
            (self.filter, "filter"),
            (self.order, "order"),
            (self.slice, "slice"),
            (self.count, "count"),
            (self.aggregate, "aggregate"),
            (self.flatten, "flatten"),
        ]
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.flags()
            .into_iter()
            .filter_map(|(on, name)| on.then_some(name))
            .collect()
    }

    pub fn allows(&self, operator: &str) -> bool {
        self.flags()
            .into_iter()
            .any(|(on, name)| on && name == operator)
    }

    /// Parse operator names as written in a schema document.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, PlanError> {
        let mut set = OperatorSet::NONE;
        for name in names {
            let flag = match name.as_ref() {
                "filter" => &mut set.filter,
                "order" => &mut set.order,
                "slice" => &mut set.slice,
                "count" => &mut set.count,
                "aggregate" => &mut set.aggregate,
                "flatten" => &mut set.flatten,
                other => return Err(PlanError::Schema(format!("unknown operator '{other}'"))),
            };
            *flag = true;
        }
        Ok(set)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionField {
    pub root: String,
    /// Scope path from the root element: each segment after a sequence starts
    /// inside that sequence's element type.
    pub path: FieldPath,
    pub element: Schema,
    pub operators: OperatorSet,
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    roots: BTreeMap<String, Schema>,
    fields: BTreeMap<(String, FieldPath), CollectionField>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a root sequence and every collection field below it.
    /// Registering the same root again replaces it.
    pub fn register(&mut self, root: &str, element: Schema) -> &mut Self {
        self.fields.retain(|(r, _), _| r != root);
        let mut found = Vec::new();
        walk(&element, &FieldPath::new(Vec::new()), &mut found);
        for (path, schema) in found {
            self.fields.insert(
                (root.to_string(), path.clone()),
                CollectionField {
                    root: root.to_string(),
                    path,
                    element: schema,
                    operators: OperatorSet::ALL,
                },
            );
        }
        self.roots.insert(root.to_string(), element);
        self
    }

    /// Narrow the operators one registered collection field accepts.
    pub fn restrict(
        &mut self,
        root: &str,
        path: &FieldPath,
        operators: OperatorSet,
    ) -> Result<&mut Self, PlanError> {
        let field = self
            .fields
            .get_mut(&(root.to_string(), path.clone()))
            .ok_or_else(|| {
                PlanError::Schema(format!("'{root}.{path}' is not a collection field"))
            })?;
        field.operators = operators;
        Ok(self)
    }

    pub fn root(&self, name: &str) -> Option<&Schema> {
        self.roots.get(name)
    }

    pub fn roots(&self) -> impl Iterator<Item = (&str, &Schema)> {
        self.roots.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn collection(&self, root: &str, path: &FieldPath) -> Option<&CollectionField> {
        self.fields.get(&(root.to_string(), path.clone()))
    }

    pub fn fields(&self) -> impl Iterator<Item = &CollectionField> {
        self.fields.values()
    }
}

fn walk(schema: &Schema, prefix: &FieldPath, out: &mut Vec<(FieldPath, Schema)>) {
    for field in &schema.fields {
        let path = prefix.child(&field.name);
        match &field.data_type {
            DataType::Struct(inner) => walk(inner, &path, out),
            DataType::List(_) => {
                if let Some(element) = field.data_type.element_schema() {
                    out.push((path.clone(), element.clone()));
                    walk(element, &path, out);
                }
            }
            _ => {}
        }
    }
}
