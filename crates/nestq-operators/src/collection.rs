//! Collection operator: filter, then sort, then slice over one sequence.
//!
//! A session may take over a prefix of the stages natively; `negotiate`
//! decides the prefix and `finish` runs whatever is left in memory.

use nestq_core::error::{CompileError, ExecError};
use nestq_core::query::CollectionQuery;
use nestq_core::schema::Schema;
use nestq_core::types::Record;

use crate::predicate::{self, CompiledPredicate};
use crate::slice::Window;
use crate::sort::SortPlan;
use crate::traits::{Capabilities, EvalEnv, Operator, Pushdown};

#[derive(Debug, Clone, Default)]
pub struct CollectionOp {
    pub filter: Option<CompiledPredicate>,
    pub order: Option<SortPlan>,
    pub window: Option<Window>,
}

/// Which stages a session applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pushed {
    pub filter: bool,
    pub order: bool,
    pub window: bool,
}

impl Pushed {
    pub fn any(&self) -> bool {
        self.filter || self.order || self.window
    }
}

impl CollectionOp {
    /// Compile the where/order/slice triple of `query`; `path` names the
    /// sequence for error reporting.
    pub fn compile(
        query: &CollectionQuery,
        element: &Schema,
        path: &str,
    ) -> Result<Self, CompileError> {
        let filter = query
            .filter
            .as_ref()
            .map(|p| predicate::compile(p, element))
            .transpose()?;
        let order = if query.order.is_empty() {
            None
        } else {
            Some(SortPlan::compile(&query.order, element)?)
        };
        let window = query
            .slice
            .as_ref()
            .map(|s| Window::compile(s, path))
            .transpose()?
            .filter(|w| !w.is_identity());
        Ok(Self {
            filter,
            order,
            window,
        })
    }

    pub fn is_passthrough(&self) -> bool {
        self.filter.is_none() && self.order.is_none() && self.window.is_none()
    }

    /// Longest stage prefix `caps` can take. Absent stages never block the
    /// ones after them. A filter holding count predicates is only pushed to
    /// sessions that can also count.
    pub fn negotiate<'a>(
        &'a self,
        caps: Capabilities,
        element: &'a Schema,
    ) -> (Pushdown<'a>, Pushed) {
        let mut push = Pushdown::scan(element);
        let mut pushed = Pushed::default();

        let filter_ok = match &self.filter {
            None => true,
            Some(p) => caps.filter && (caps.count || !p.has_counts()),
        };
        if filter_ok && self.filter.is_some() {
            push.filter = self.filter.as_ref();
            pushed.filter = true;
        }
        let order_ok = filter_ok && (self.order.is_none() || caps.sort);
        if order_ok && self.order.is_some() {
            push.order = self.order.as_ref();
            pushed.order = true;
        }
        let window_ok = order_ok && (self.window.is_none() || caps.slice);
        if window_ok && self.window.is_some() {
            push.window = self.window;
            pushed.window = true;
        }
        (push, pushed)
    }

    /// Apply the stages a session did not.
    pub fn finish(
        &self,
        mut rows: Vec<Record>,
        pushed: Pushed,
        env: &EvalEnv<'_>,
    ) -> Result<Vec<Record>, ExecError> {
        if let (Some(pred), false) = (&self.filter, pushed.filter) {
            rows = predicate::filter_rows(pred, rows, env)?;
        }
        if let (Some(order), false) = (&self.order, pushed.order) {
            order.sort_in_place(&mut rows);
        }
        if let (Some(window), false) = (self.window, pushed.window) {
            rows = window.apply(rows);
        }
        Ok(rows)
    }
}

impl Operator for CollectionOp {
    fn name(&self) -> &'static str {
        "collection"
    }

    fn eval(&self, input: Vec<Record>, env: &EvalEnv<'_>) -> Result<Vec<Record>, ExecError> {
        self.finish(input, Pushed::default(), env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nestq_core::query::{CompareOp, Predicate, SliceSpec, SortKey};
    use nestq_core::schema::{DataType, Field};

    fn op() -> CollectionOp {
        let schema = Schema::new(vec![Field::new("n", DataType::Int64, false)]);
        let query = CollectionQuery {
            filter: Some(Predicate::cmp("n", CompareOp::Gt, 0i64)),
            order: vec![SortKey::desc("n")],
            slice: Some(SliceSpec::first(2)),
            ..CollectionQuery::default()
        };
        CollectionOp::compile(&query, &schema, "xs").expect("compile")
    }

    #[test]
    fn stages_are_negotiated_as_a_prefix() {
        let op = op();
        let schema = Schema::default();
        let caps = Capabilities {
            filter: true,
            slice: true,
            ..Capabilities::NONE
        };
        let (push, pushed) = op.negotiate(caps, &schema);
        assert!(push.filter.is_some());
        assert!(push.order.is_none());
        assert!(push.window.is_none(), "slice cannot run before the sort");
        assert_eq!(
            pushed,
            Pushed {
                filter: true,
                order: false,
                window: false
            }
        );
    }

    #[test]
    fn absent_filter_does_not_block_sort_pushdown() {
        let schema = Schema::new(vec![Field::new("n", DataType::Int64, false)]);
        let query = CollectionQuery {
            order: vec![SortKey::asc("n")],
            ..CollectionQuery::default()
        };
        let op = CollectionOp::compile(&query, &schema, "xs").expect("compile");
        let caps = Capabilities {
            sort: true,
            ..Capabilities::NONE
        };
        let (_, pushed) = op.negotiate(caps, &schema);
        assert!(pushed.order);
    }
}
