//! Windowing over an already filtered and sorted sequence.

use serde::{Deserialize, Serialize};

use nestq_core::error::{CompileError, ExecError};
use nestq_core::query::SliceSpec;
use nestq_core::types::Record;

use crate::traits::{EvalEnv, Operator};

/// Validated slice. `first N` is `Range { skip: 0, take: Some(N) }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Window {
    Range { skip: u64, take: Option<u64> },
    /// Tail window; keeps the sequence's order.
    Last(u64),
}

impl Window {
    pub fn all() -> Self {
        Window::Range {
            skip: 0,
            take: None,
        }
    }

    /// Validate `spec`; `path` names the sequence it applies to.
    pub fn compile(spec: &SliceSpec, path: &str) -> Result<Self, CompileError> {
        let invalid = |detail: String| CompileError::InvalidSliceSpec {
            path: path.to_string(),
            detail,
        };
        let non_negative = |name: &str, v: i64| -> Result<u64, CompileError> {
            u64::try_from(v).map_err(|_| invalid(format!("{name} must be >= 0, got {v}")))
        };
        let ranged = spec.skip.is_some() || spec.take.is_some();
        match (spec.first, spec.last) {
            (Some(_), Some(_)) => Err(invalid("first and last are mutually exclusive".into())),
            (Some(_), None) | (None, Some(_)) if ranged => Err(invalid(
                "first/last cannot be combined with skip/take".into(),
            )),
            (Some(n), None) => Ok(Window::Range {
                skip: 0,
                take: Some(non_negative("first", n)?),
            }),
            (None, Some(n)) => Ok(Window::Last(non_negative("last", n)?)),
            (None, None) => Ok(Window::Range {
                skip: spec.skip.map(|v| non_negative("skip", v)).transpose()?.unwrap_or(0),
                take: spec.take.map(|v| non_negative("take", v)).transpose()?,
            }),
        }
    }

    pub fn is_identity(&self) -> bool {
        matches!(
            self,
            Window::Range {
                skip: 0,
                take: None
            }
        )
    }

    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        match *self {
            Window::Range { skip, take } => {
                let it = items.into_iter().skip(clamp(skip));
                match take {
                    Some(n) => it.take(clamp(n)).collect(),
                    None => it.collect(),
                }
            }
            Window::Last(n) => {
                let keep = clamp(n).min(items.len());
                let drop = items.len() - keep;
                items.into_iter().skip(drop).collect()
            }
        }
    }
}

fn clamp(v: u64) -> usize {
    usize::try_from(v).unwrap_or(usize::MAX)
}

impl Operator for Window {
    fn name(&self) -> &'static str {
        "slice"
    }

    fn eval(&self, input: Vec<Record>, _env: &EvalEnv<'_>) -> Result<Vec<Record>, ExecError> {
        Ok(self.apply(input))
    }
}
