//! Aggregation pipeline: outer where, group by, per-function aggregates,
//! then having / order / slice over the synthesized group results.
//!
//! Groups come out in first-appearance order. Without keys there is exactly
//! one group, even over an empty input.

use std::collections::HashMap;

use rust_decimal::Decimal;

use nestq_core::error::{CompileError, ExecError};
use nestq_core::path::FieldPath;
use nestq_core::query::{AggregateFunction, AggregateKind, AggregateQuery, GroupSpec};
use nestq_core::schema::{DataType, Field, Schema};
use nestq_core::types::{Record, Scalar, Value};

use crate::predicate::{self, CompiledPredicate};
use crate::slice::Window;
use crate::sort::SortPlan;
use crate::traits::{EvalEnv, Operator};

/// One compiled aggregate function.
#[derive(Debug, Clone)]
pub struct AggregatePlan {
    pub kind: AggregateKind,
    pub target: Option<FieldPath>,
    /// Declared type of the target, when there is one.
    pub target_type: Option<DataType>,
    pub filter: Option<CompiledPredicate>,
    pub separator: String,
    pub order: Option<SortPlan>,
    pub alias: String,
}

impl AggregatePlan {
    fn compile(f: &AggregateFunction, element: &Schema) -> Result<Self, CompileError> {
        let mismatch = |path: &str, detail: String| CompileError::AggregateTypeMismatch {
            path: path.to_string(),
            detail,
        };

        let target_type = match &f.target {
            Some(path) => {
                let field = element.resolve(path)?;
                if !field.data_type.is_scalar() {
                    return Err(mismatch(
                        &path.to_string(),
                        format!("{} over non-scalar {}", f.kind.name(), field.data_type.name()),
                    ));
                }
                Some(field.data_type.clone())
            }
            None if f.kind == AggregateKind::Count => None,
            None => {
                return Err(mismatch(
                    &f.alias,
                    format!("{} needs a target field", f.kind.name()),
                ))
            }
        };

        if let (Some(path), Some(ty)) = (&f.target, &target_type) {
            let ok = match f.kind {
                AggregateKind::Count => true,
                AggregateKind::Sum | AggregateKind::Avg => ty.is_numeric(),
                AggregateKind::Min | AggregateKind::Max => ty.is_orderable(),
                AggregateKind::StringAgg => *ty == DataType::Utf8,
            };
            if !ok {
                return Err(mismatch(
                    &path.to_string(),
                    format!("{} is not defined over {}", f.kind.name(), ty.name()),
                ));
            }
        }

        let separator = match (f.kind, &f.separator) {
            (AggregateKind::StringAgg, None) => {
                return Err(mismatch(&f.alias, "string_agg needs a separator".into()))
            }
            (_, sep) => sep.clone().unwrap_or_default(),
        };

        let filter = f
            .filter
            .as_ref()
            .map(|p| predicate::compile(p, element))
            .transpose()?;
        let order = if f.order.is_empty() {
            None
        } else {
            Some(SortPlan::compile(&f.order, element)?)
        };

        Ok(Self {
            kind: f.kind,
            target: f.target.clone(),
            target_type,
            filter,
            separator,
            order,
            alias: f.alias.clone(),
        })
    }

    fn output_type(&self) -> DataType {
        match self.kind {
            AggregateKind::Count => DataType::Int64,
            AggregateKind::Avg => DataType::Decimal,
            AggregateKind::StringAgg => DataType::Utf8,
            AggregateKind::Sum | AggregateKind::Min | AggregateKind::Max => {
                self.target_type.clone().unwrap_or(DataType::Int64)
            }
        }
    }

    /// Value for one group. `members` is the group base, before this
    /// function's own filter.
    pub fn compute(&self, members: &[Record], env: &EvalEnv<'_>) -> Result<Scalar, ExecError> {
        let mut base: Vec<&Record> = Vec::with_capacity(members.len());
        for rec in members {
            let keep = match &self.filter {
                Some(p) => p.eval(rec, env.counts)?,
                None => true,
            };
            if keep {
                base.push(rec);
            }
        }
        if let Some(order) = &self.order {
            base.sort_by(|a, b| order.compare(a, b));
        }

        let Some(target) = &self.target else {
            return to_i64(base.len(), &self.alias).map(Scalar::I64);
        };
        let values: Vec<&Scalar> = base
            .iter()
            .map(|r| r.scalar_at(target))
            .filter(|s| !s.is_null())
            .collect();

        match self.kind {
            AggregateKind::Count => to_i64(values.len(), &self.alias).map(Scalar::I64),
            AggregateKind::Sum => self.sum(&values, target),
            AggregateKind::Avg => avg(&values, target),
            AggregateKind::Min => extreme(&values, target, std::cmp::Ordering::Less),
            AggregateKind::Max => extreme(&values, target, std::cmp::Ordering::Greater),
            AggregateKind::StringAgg => {
                let mut parts = Vec::with_capacity(values.len());
                for v in &values {
                    parts.push(v.as_str().ok_or_else(|| invalid(target, v))?);
                }
                Ok(Scalar::Str(parts.join(self.separator.as_str())))
            }
        }
    }

    fn sum(&self, values: &[&Scalar], target: &FieldPath) -> Result<Scalar, ExecError> {
        if self.target_type == Some(DataType::Int64) {
            let mut acc = 0i64;
            for v in values {
                let Scalar::I64(n) = v else {
                    return Err(invalid(target, v));
                };
                acc = acc.checked_add(*n).ok_or_else(|| overflow(target))?;
            }
            return Ok(Scalar::I64(acc));
        }
        Ok(Scalar::Decimal(decimal_sum(values, target)?))
    }
}

fn decimal_sum(values: &[&Scalar], target: &FieldPath) -> Result<Decimal, ExecError> {
    let mut acc = Decimal::ZERO;
    for v in values {
        let d = v.as_decimal().ok_or_else(|| invalid(target, v))?;
        acc = acc.checked_add(d).ok_or_else(|| overflow(target))?;
    }
    Ok(acc)
}

fn avg(values: &[&Scalar], target: &FieldPath) -> Result<Scalar, ExecError> {
    if values.is_empty() {
        return Ok(Scalar::Null);
    }
    let total = decimal_sum(values, target)?;
    let n = Decimal::from(values.len() as u64);
    total
        .checked_div(n)
        .map(|d| Scalar::Decimal(d.normalize()))
        .ok_or_else(|| overflow(target))
}

fn extreme(
    values: &[&Scalar],
    target: &FieldPath,
    wanted: std::cmp::Ordering,
) -> Result<Scalar, ExecError> {
    let mut best: Option<&Scalar> = None;
    for &v in values {
        best = match best {
            None => Some(v),
            Some(cur) => {
                let ord = v.compare(cur).ok_or_else(|| invalid(target, v))?;
                if ord == wanted {
                    Some(v)
                } else {
                    Some(cur)
                }
            }
        };
    }
    Ok(best.cloned().unwrap_or(Scalar::Null))
}

fn to_i64(n: usize, alias: &str) -> Result<i64, ExecError> {
    i64::try_from(n).map_err(|_| ExecError::InvalidData {
        path: alias.to_string(),
        detail: format!("count {n} does not fit in an integer"),
    })
}

fn invalid(target: &FieldPath, v: &Scalar) -> ExecError {
    ExecError::InvalidData {
        path: target.to_string(),
        detail: format!("value '{v}' does not match the declared type"),
    }
}

fn overflow(target: &FieldPath) -> ExecError {
    ExecError::InvalidData {
        path: target.to_string(),
        detail: "arithmetic overflow".into(),
    }
}

/// Group by + aggregates + having/order/slice.
#[derive(Debug, Clone)]
pub struct GroupPlan {
    descriptor: GroupSpec,
    pub keys: Vec<FieldPath>,
    pub functions: Vec<AggregatePlan>,
    pub having: Option<CompiledPredicate>,
    pub order: Option<SortPlan>,
    pub window: Option<Window>,
    output: Schema,
}

impl GroupPlan {
    /// True when a per-function filter holds a count predicate.
    pub fn has_counts(&self) -> bool {
        self.functions
            .iter()
            .any(|f| f.filter.as_ref().is_some_and(CompiledPredicate::has_counts))
    }

    pub fn compile(spec: &GroupSpec, element: &Schema, path: &str) -> Result<Self, CompileError> {
        let mut output = Schema::default();
        for key in &spec.keys {
            let field = element.resolve(key)?;
            if !field.data_type.is_scalar() {
                return Err(CompileError::FieldTypeMismatch {
                    path: key.to_string(),
                    detail: format!("group key must be scalar, found {}", field.data_type.name()),
                });
            }
            let parents = &key.segments()[..key.len() - 1];
            output.insert_at(
                parents,
                Field::new(field.name.clone(), field.data_type.clone(), true),
            );
        }

        let mut functions = Vec::with_capacity(spec.aggregates.len());
        for f in &spec.aggregates {
            let plan = AggregatePlan::compile(f, element)?;
            if output.field_named(&plan.alias).is_some() {
                return Err(CompileError::DuplicateAlias {
                    path: path.to_string(),
                    alias: plan.alias.clone(),
                });
            }
            output.fields.push(Field::new(
                plan.alias.clone(),
                plan.output_type(),
                plan.kind != AggregateKind::Count,
            ));
            functions.push(plan);
        }

        let having = spec
            .having
            .as_ref()
            .map(|p| predicate::compile(p, &output))
            .transpose()?;
        let order = if spec.order.is_empty() {
            None
        } else {
            Some(SortPlan::compile(&spec.order, &output)?)
        };
        let window = spec
            .slice
            .as_ref()
            .map(|s| Window::compile(s, path))
            .transpose()?
            .filter(|w| !w.is_identity());

        Ok(Self {
            descriptor: spec.clone(),
            keys: spec.keys.clone(),
            functions,
            having,
            order,
            window,
            output,
        })
    }

    pub fn descriptor(&self) -> &GroupSpec {
        &self.descriptor
    }

    /// Schema of the synthesized group results.
    pub fn output_schema(&self) -> &Schema {
        &self.output
    }

    /// Partition `rows` by key values, keeping first-appearance order.
    pub fn partition(&self, rows: Vec<Record>) -> Vec<(Vec<Scalar>, Vec<Record>)> {
        if self.keys.is_empty() {
            return vec![(Vec::new(), rows)];
        }
        let mut groups: Vec<(Vec<Scalar>, Vec<Record>)> = Vec::new();
        let mut index: HashMap<Vec<Scalar>, usize> = HashMap::new();
        for rec in rows {
            let key: Vec<Scalar> = self.keys.iter().map(|k| rec.scalar_at(k).clone()).collect();
            match index.get(&key) {
                Some(&i) => groups[i].1.push(rec),
                None => {
                    index.insert(key.clone(), groups.len());
                    groups.push((key, vec![rec]));
                }
            }
        }
        groups
    }

    fn group_result(
        &self,
        key: Vec<Scalar>,
        members: &[Record],
        env: &EvalEnv<'_>,
    ) -> Result<Record, ExecError> {
        let mut out = Record::new();
        for (path, value) in self.keys.iter().zip(key) {
            out.insert_at(path, Value::Scalar(value));
        }
        for f in &self.functions {
            out.push(f.alias.clone(), f.compute(members, env)?);
        }
        Ok(out)
    }
}

impl Operator for GroupPlan {
    fn name(&self) -> &'static str {
        "group_aggregate"
    }

    /// `input` is the group base: already filtered by the outer where.
    fn eval(&self, input: Vec<Record>, env: &EvalEnv<'_>) -> Result<Vec<Record>, ExecError> {
        env.ctx.checkpoint()?;
        let mut results = Vec::new();
        for (key, members) in self.partition(input) {
            results.push(self.group_result(key, &members, env)?);
        }
        if let Some(having) = &self.having {
            results = predicate::filter_rows(having, results, env)?;
        }
        if let Some(order) = &self.order {
            order.sort_in_place(&mut results);
        }
        if let Some(window) = self.window {
            results = window.apply(results);
        }
        Ok(results)
    }
}

/// Outer where + group plan, compiled against one element schema.
#[derive(Debug, Clone)]
pub struct AggregatePipeline {
    pub filter: Option<CompiledPredicate>,
    pub group: GroupPlan,
}

impl AggregatePipeline {
    pub fn compile(
        query: &AggregateQuery,
        element: &Schema,
        path: &str,
    ) -> Result<Self, CompileError> {
        Ok(Self {
            filter: query
                .filter
                .as_ref()
                .map(|p| predicate::compile(p, element))
                .transpose()?,
            group: GroupPlan::compile(&query.group, element, path)?,
        })
    }
}

impl Operator for AggregatePipeline {
    fn name(&self) -> &'static str {
        "aggregate"
    }

    fn eval(&self, input: Vec<Record>, env: &EvalEnv<'_>) -> Result<Vec<Record>, ExecError> {
        let base = match &self.filter {
            Some(p) => predicate::filter_rows(p, input, env)?,
            None => input,
        };
        self.group.eval(base, env)
    }
}
