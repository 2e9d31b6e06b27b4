//! Stable multi-key sort.
//!
//! Nulls go after every non-null value on that key, whatever the direction.

use std::cmp::Ordering;

use nestq_core::error::{CompileError, ExecError};
use nestq_core::path::FieldPath;
use nestq_core::query::{SortDirection, SortSpec};
use nestq_core::schema::Schema;
use nestq_core::types::{Record, Scalar};

use crate::traits::{EvalEnv, Operator};

#[derive(Debug, Clone)]
pub struct SortPlan {
    descriptor: SortSpec,
}

impl SortPlan {
    /// Every key must name a scalar field of `schema`.
    pub fn compile(spec: &SortSpec, schema: &Schema) -> Result<Self, CompileError> {
        for key in spec {
            schema.resolve_scalar(&key.path)?;
        }
        Ok(Self {
            descriptor: spec.clone(),
        })
    }

    pub fn descriptor(&self) -> &SortSpec {
        &self.descriptor
    }

    pub fn is_empty(&self) -> bool {
        self.descriptor.is_empty()
    }

    pub fn compare(&self, a: &Record, b: &Record) -> Ordering {
        for key in &self.descriptor {
            let ord = compare_key(a.scalar_at(&key.path), b.scalar_at(&key.path), key.direction);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    /// Sorted copy; the input slice is left untouched.
    pub fn sorted(&self, input: &[Record]) -> Vec<Record> {
        let mut out = input.to_vec();
        self.sort_in_place(&mut out);
        out
    }

    pub fn sort_in_place(&self, rows: &mut [Record]) {
        if !self.descriptor.is_empty() {
            rows.sort_by(|a, b| self.compare(a, b));
        }
    }

    pub fn paths(&self) -> impl Iterator<Item = &FieldPath> {
        self.descriptor.iter().map(|k| &k.path)
    }
}

fn compare_key(a: &Scalar, b: &Scalar, dir: SortDirection) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => {
            let ord = a.compare(b).unwrap_or(Ordering::Equal);
            match dir {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            }
        }
    }
}

impl Operator for SortPlan {
    fn name(&self) -> &'static str {
        "sort"
    }

    fn eval(&self, mut input: Vec<Record>, _env: &EvalEnv<'_>) -> Result<Vec<Record>, ExecError> {
        self.sort_in_place(&mut input);
        Ok(input)
    }
}
