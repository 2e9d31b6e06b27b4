//! Flatten: the cross product of already evaluated sibling sequences.
//!
//! Pure and synchronous. Child evaluation (and its cancellation) happens
//! before `combine` is called.

use nestq_core::error::CompileError;
use nestq_core::query::FlattenSpec;
use nestq_core::schema::{Field, Schema};
use nestq_core::types::{Record, Scalar, Value};

#[derive(Debug, Clone)]
pub struct FlattenPlan {
    /// Parent scalar output fields carried onto every row.
    parent_fields: Vec<String>,
    /// `(child_field, prefix)` in declared order.
    children: Vec<(String, String)>,
    output: Schema,
}

impl FlattenPlan {
    /// `parent` is the parent's output schema; `children` maps each sibling
    /// collection/aggregate output name to its element schema.
    pub fn compile(
        spec: &FlattenSpec,
        parent: &Schema,
        children: &[(String, Schema)],
        path: &str,
    ) -> Result<Self, CompileError> {
        let mut output = Schema::default();
        let mut parent_fields = Vec::new();
        for f in parent.fields.iter().filter(|f| f.data_type.is_scalar()) {
            parent_fields.push(f.name.clone());
            output.fields.push(f.clone());
        }

        let mut plan_children = Vec::with_capacity(spec.paths.len());
        for fp in &spec.paths {
            let (_, child) = children
                .iter()
                .find(|(name, _)| *name == fp.child_field)
                .ok_or_else(|| CompileError::UnknownFieldPath {
                    path: join(path, &fp.child_field),
                })?;
            for f in &child.fields {
                let name = format!("{}_{}", fp.prefix, f.name);
                if output.field_named(&name).is_some() {
                    return Err(CompileError::DuplicateFlattenField {
                        path: join(path, &fp.child_field),
                        field: name,
                    });
                }
                output
                    .fields
                    .push(Field::new(name, f.data_type.clone(), f.nullable));
            }
            plan_children.push((fp.child_field.clone(), fp.prefix.clone()));
        }

        Ok(Self {
            parent_fields,
            children: plan_children,
            output,
        })
    }

    /// Schema of one flattened row.
    pub fn output_schema(&self) -> &Schema {
        &self.output
    }

    /// Child output names, in declared order.
    pub fn child_fields(&self) -> impl Iterator<Item = &str> {
        self.children.iter().map(|(c, _)| c.as_str())
    }

    /// Cross product of `children` (declared order) for one parent. The first
    /// child varies slowest; any empty child yields no rows.
    pub fn combine(&self, parent: &Record, children: &[Vec<Record>]) -> Vec<Record> {
        if children.iter().any(Vec::is_empty) {
            return Vec::new();
        }
        let mut base = Record::new();
        for name in &self.parent_fields {
            let v = parent
                .get(name)
                .cloned()
                .unwrap_or(Value::Scalar(Scalar::Null));
            base.push(name.clone(), v);
        }

        let mut rows = vec![base];
        for ((_, prefix), seq) in self.children.iter().zip(children) {
            let mut next = Vec::with_capacity(rows.len() * seq.len());
            for row in &rows {
                for child in seq {
                    let mut out = row.clone();
                    for (name, value) in child.iter() {
                        out.push(format!("{prefix}_{name}"), value.clone());
                    }
                    next.push(out);
                }
            }
            rows = next;
        }
        rows
    }
}

fn join(path: &str, child: &str) -> String {
    if path.is_empty() {
        child.to_string()
    } else {
        format!("{path}.{child}")
    }
}
