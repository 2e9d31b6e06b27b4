//! Predicate compilation and row-by-row evaluation.
//!
//! Operands are coerced to the declared field type once, at compile time.
//! Null policy: `eq` matches a stored null only against a null operand,
//! `neq` is its negation, and ordering comparisons involving a null on
//! either side are false.

use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use nestq_core::error::{CompileError, ExecError};
use nestq_core::path::FieldPath;
use nestq_core::query::{CompareOp, Predicate};
use nestq_core::schema::{DataType, Schema};
use nestq_core::types::{Record, Scalar};

use crate::count::CountPlan;
use crate::traits::{CountSource, EvalEnv, Operator};

#[derive(Debug, Clone)]
enum Node {
    Compare {
        path: FieldPath,
        op: CompareOp,
        operand: Scalar,
    },
    And(Vec<Node>),
    Or(Vec<Node>),
    Not(Box<Node>),
    Count(Box<CountPlan>),
}

/// A predicate validated against one element schema.
///
/// Keeps the original descriptor so a data source can translate it into its
/// own native filter.
#[derive(Debug, Clone)]
pub struct CompiledPredicate {
    descriptor: Predicate,
    root: Node,
}

pub fn compile(pred: &Predicate, schema: &Schema) -> Result<CompiledPredicate, CompileError> {
    Ok(CompiledPredicate {
        descriptor: pred.clone(),
        root: compile_node(pred, schema)?,
    })
}

fn compile_node(pred: &Predicate, schema: &Schema) -> Result<Node, CompileError> {
    match pred {
        Predicate::Comparison { path, op, value } => {
            let field = schema.resolve_scalar(path)?;
            if op.is_ordering() && !field.data_type.is_orderable() {
                return Err(CompileError::FieldTypeMismatch {
                    path: path.to_string(),
                    detail: format!(
                        "operator '{}' needs an orderable field, found {}",
                        op.symbol(),
                        field.data_type.name()
                    ),
                });
            }
            Ok(Node::Compare {
                path: path.clone(),
                op: *op,
                operand: coerce(value, &field.data_type, path)?,
            })
        }
        Predicate::And { terms } => Ok(Node::And(
            terms
                .iter()
                .map(|t| compile_node(t, schema))
                .collect::<Result<_, _>>()?,
        )),
        Predicate::Or { terms } => Ok(Node::Or(
            terms
                .iter()
                .map(|t| compile_node(t, schema))
                .collect::<Result<_, _>>()?,
        )),
        Predicate::Not { term } => Ok(Node::Not(Box::new(compile_node(term, schema)?))),
        Predicate::CollectionCount {
            path,
            inner,
            op,
            value,
        } => Ok(Node::Count(Box::new(CountPlan::compile(
            path,
            inner.as_deref(),
            *op,
            *value,
            schema,
        )?))),
    }
}

/// Convert a literal operand into the field's type.
///
/// Accepted widenings: integer to decimal, string to decimal, ISO string to
/// date. Null is accepted for every type.
pub fn coerce(value: &Scalar, ty: &DataType, path: &FieldPath) -> Result<Scalar, CompileError> {
    let mismatch = || CompileError::FieldTypeMismatch {
        path: path.to_string(),
        detail: format!("operand '{value}' is not compatible with {}", ty.name()),
    };
    Ok(match (ty, value) {
        (_, Scalar::Null) => Scalar::Null,
        (DataType::Boolean, Scalar::Bool(_))
        | (DataType::Int64, Scalar::I64(_))
        | (DataType::Decimal, Scalar::Decimal(_))
        | (DataType::Utf8, Scalar::Str(_))
        | (DataType::Date, Scalar::Date(_)) => value.clone(),
        (DataType::Decimal, Scalar::I64(v)) => Scalar::Decimal(Decimal::from(*v)),
        (DataType::Decimal, Scalar::Str(s)) => {
            Scalar::Decimal(Decimal::from_str(s.trim()).map_err(|_| mismatch())?)
        }
        (DataType::Date, Scalar::Str(s)) => Scalar::Date(
            NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| mismatch())?,
        ),
        _ => return Err(mismatch()),
    })
}

impl CompiledPredicate {
    pub fn descriptor(&self) -> &Predicate {
        &self.descriptor
    }

    /// True when evaluation needs a `CountSource`.
    pub fn has_counts(&self) -> bool {
        self.descriptor.has_collection_count()
    }

    pub fn eval(&self, rec: &Record, counts: &dyn CountSource) -> Result<bool, ExecError> {
        eval_node(&self.root, rec, counts)
    }
}

fn eval_node(node: &Node, rec: &Record, counts: &dyn CountSource) -> Result<bool, ExecError> {
    match node {
        Node::Compare { path, op, operand } => compare(rec.scalar_at(path), *op, operand, path),
        Node::And(terms) => {
            for t in terms {
                if !eval_node(t, rec, counts)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Node::Or(terms) => {
            for t in terms {
                if eval_node(t, rec, counts)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Node::Not(term) => Ok(!eval_node(term, rec, counts)?),
        Node::Count(plan) => {
            let n = counts.count(rec, plan)?;
            Ok(plan.holds(n))
        }
    }
}

fn compare(
    stored: &Scalar,
    op: CompareOp,
    operand: &Scalar,
    path: &FieldPath,
) -> Result<bool, ExecError> {
    if stored.is_null() || operand.is_null() {
        let eq = stored.is_null() && operand.is_null();
        return Ok(match op {
            CompareOp::Eq => eq,
            CompareOp::Neq => !eq,
            _ => false,
        });
    }
    let ord = stored
        .compare(operand)
        .ok_or_else(|| ExecError::InvalidData {
            path: path.to_string(),
            detail: format!("stored value '{stored}' does not match the declared type"),
        })?;
    Ok(op.holds(ord))
}

/// Keeps the elements that satisfy the predicate, in input order.
pub struct Filter {
    pub predicate: CompiledPredicate,
}

impl Filter {
    pub fn new(predicate: CompiledPredicate) -> Self {
        Self { predicate }
    }
}

impl Operator for Filter {
    fn name(&self) -> &'static str {
        "filter"
    }

    fn eval(&self, input: Vec<Record>, env: &EvalEnv<'_>) -> Result<Vec<Record>, ExecError> {
        filter_rows(&self.predicate, input, env)
    }
}

pub fn filter_rows(
    predicate: &CompiledPredicate,
    input: Vec<Record>,
    env: &EvalEnv<'_>,
) -> Result<Vec<Record>, ExecError> {
    env.ctx.checkpoint()?;
    let mut out = Vec::with_capacity(input.len());
    for rec in input {
        if predicate.eval(&rec, env.counts)? {
            out.push(rec);
        }
    }
    Ok(out)
}
