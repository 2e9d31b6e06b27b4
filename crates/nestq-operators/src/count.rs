//! Count predicate: filters an outer element by the cardinality of one of
//! its nested collections.

use nestq_core::error::{CompileError, ExecError};
use nestq_core::path::FieldPath;
use nestq_core::query::{CompareOp, Predicate};
use nestq_core::schema::Schema;
use nestq_core::types::{Record, Value};

use crate::predicate::{self, CompiledPredicate};
use crate::traits::CountSource;

#[derive(Debug, Clone)]
pub struct CountPlan {
    pub path: FieldPath,
    pub element: Schema,
    /// Filters the nested collection only; sort and slice never apply.
    pub inner: Option<CompiledPredicate>,
    pub op: CompareOp,
    pub value: u64,
}

impl CountPlan {
    pub fn compile(
        path: &FieldPath,
        inner: Option<&Predicate>,
        op: CompareOp,
        value: u64,
        schema: &Schema,
    ) -> Result<Self, CompileError> {
        let field = schema.resolve(path)?;
        let element = field
            .data_type
            .element_schema()
            .ok_or_else(|| CompileError::FieldTypeMismatch {
                path: path.to_string(),
                detail: format!(
                    "collection_count needs a sequence of records, found {}",
                    field.data_type.name()
                ),
            })?
            .clone();
        let inner = inner
            .map(|p| predicate::compile(p, &element))
            .transpose()?;
        Ok(Self {
            path: path.clone(),
            element,
            inner,
            op,
            value,
        })
    }

    pub fn holds(&self, count: u64) -> bool {
        self.op.holds(count.cmp(&self.value))
    }
}

/// Records of the sequence-valued field at `path`. Missing and null
/// sequences read as empty.
pub fn nested_records<'r>(
    parent: &'r Record,
    path: &FieldPath,
) -> Result<Vec<&'r Record>, ExecError> {
    let invalid = |detail: &str| ExecError::InvalidData {
        path: path.to_string(),
        detail: detail.to_string(),
    };
    match parent.resolve(path) {
        None => Ok(Vec::new()),
        Some(v) if v.is_null() => Ok(Vec::new()),
        Some(Value::List(items)) => items
            .iter()
            .map(|v| v.as_record().ok_or_else(|| invalid("sequence element is not a record")))
            .collect(),
        Some(_) => Err(invalid("expected a sequence")),
    }
}

/// Counts by walking the already materialized record graph.
#[derive(Debug, Clone, Copy, Default)]
pub struct InMemoryCounts;

impl CountSource for InMemoryCounts {
    fn count(&self, parent: &Record, plan: &CountPlan) -> Result<u64, ExecError> {
        let mut n = 0u64;
        for rec in nested_records(parent, &plan.path)? {
            let keep = match &plan.inner {
                Some(p) => p.eval(rec, self)?,
                None => true,
            };
            if keep {
                n += 1;
            }
        }
        Ok(n)
    }
}
